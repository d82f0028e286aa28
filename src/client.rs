//! HTTP client.
//!
//! [`Client`] is the default [`Transport`] for the write pipeline and the
//! entry point for Flux queries. Query results are decoded while the
//! response body streams in.

use std::pin::Pin;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::flux::{Flux, Parameters};
use crate::parser::{AnnotatedCsvParser, decode_tables};
use crate::point::Point;
use crate::types::{DEFAULT_VALUE_COLUMN, FluxRecord, FluxTable};
use crate::write::{
    BatchOptions, Transport, WriteApi, WriteOptions, WriteOutcome, WriteRequest,
};

/// Client for an InfluxDB server.
///
/// Writes go to the `/write` endpoint, queries to `/api/v2/query`.
/// Cloning is cheap; clones share the connection pool.
///
/// # Example
///
/// ```ignore
/// use influxdb_lineflux::Client;
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new("http://localhost:8086", "my-org", "my-token")?;
///
///     let mut stream = client.query_stream(r#"
///         from(bucket: "sensors")
///         |> range(start: -1h)
///         |> filter(fn: (r) => r._measurement == "temperature")
///     "#).await?;
///
///     while let Some(record) = stream.next().await {
///         let record = record?;
///         println!("Got: {:?}", record);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    org: String,
    token: String,
    credentials: Option<(String, String)>,
}

/// Query payload for the InfluxDB API.
#[derive(Debug, Serialize)]
struct QueryPayload {
    query: String,
    #[serde(rename = "type")]
    query_type: String,
    dialect: QueryDialect,
}

/// CSV dialect settings for query responses.
#[derive(Debug, Serialize)]
struct QueryDialect {
    annotations: Vec<String>,
    #[serde(rename = "commentPrefix")]
    comment_prefix: String,
    #[serde(rename = "dateTimeFormat")]
    date_time_format: String,
    delimiter: String,
    header: bool,
}

impl Default for QueryDialect {
    fn default() -> Self {
        Self {
            annotations: vec![
                "datatype".to_string(),
                "group".to_string(),
                "default".to_string(),
            ],
            comment_prefix: "#".to_string(),
            date_time_format: "RFC3339".to_string(),
            delimiter: ",".to_string(),
            header: true,
        }
    }
}

impl QueryPayload {
    fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            query_type: "flux".to_string(),
            dialect: QueryDialect::default(),
        }
    }
}

/// Error body returned by the server, in either of its two shapes.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Human readable message from an error response body.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.message.or(parsed.error).filter(|m| !m.is_empty());
    match (parsed.code, message) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (None, Some(message)) => message,
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    }
}

/// Batch indices of the lines a `partial write` message reports as
/// unparsable, in batch order.
fn rejected_lines(message: &str, body: &str) -> Vec<usize> {
    const MARKER: &str = "unable to parse '";

    let mut quoted = Vec::new();
    let mut rest = message;
    while let Some(start) = rest.find(MARKER) {
        rest = &rest[start + MARKER.len()..];
        // the server quotes the line verbatim, so the closing quote is the
        // last one before the ':' that starts the reason
        let end = match rest.find("': ") {
            Some(end) => end,
            None => match rest.rfind('\'') {
                Some(end) => end,
                None => break,
            },
        };
        quoted.push(&rest[..end]);
        rest = &rest[end..];
    }

    body.lines()
        .enumerate()
        .filter(|(_, line)| quoted.contains(line))
        .map(|(i, _)| i)
        .collect()
}

impl Client {
    /// Create a new InfluxDB client.
    ///
    /// # Arguments
    ///
    /// * `url` - Base URL of the InfluxDB server (e.g., "http://localhost:8086")
    /// * `org` - Organization name, used by queries
    /// * `token` - Authentication token; empty for none
    pub fn new(
        url: impl Into<String>,
        org: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        Self::with_http_client(reqwest::Client::new(), url, org, token)
    }

    /// Create a new client with a custom reqwest client.
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_http_client(
        http: reqwest::Client,
        url: impl Into<String>,
        org: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let url_str = url.into();
        let base_url = Url::parse(&url_str)
            .map_err(|e| Error::Config(format!("invalid URL '{}': {}", url_str, e)))?;

        Ok(Self {
            http,
            base_url,
            org: org.into(),
            token: token.into(),
            credentials: None,
        })
    }

    /// Authenticate writes with a username and password instead of a token.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Get the base URL.
    pub fn url(&self) -> &Url {
        &self.base_url
    }

    /// Get the organization name.
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Build the full URL for an API endpoint.
    fn endpoint(&self, path: &str) -> String {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url.to_string()
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Token {}", self.token))
        }
    }

    /// Start a batching write pipeline that sends through a clone of this
    /// client.
    pub fn write_api(&self, write_options: WriteOptions, batch_options: BatchOptions) -> WriteApi {
        WriteApi::new(self.clone(), write_options, batch_options)
    }

    /// Write `points` in a single request and wait for the verdict.
    pub async fn write_points(&self, options: &WriteOptions, points: &[Point]) -> Result<()> {
        let mut lines = Vec::with_capacity(points.len());
        for point in points {
            lines.push(point.to_line_protocol(options.precision())?);
        }
        if lines.is_empty() {
            return Ok(());
        }
        let request = WriteRequest::new(options, lines.iter().map(String::as_str));
        match Transport::write(self, request).await? {
            WriteOutcome::Success => Ok(()),
            WriteOutcome::PartialWrite { rejected, reason } => Err(Error::PartialWrite {
                rejected: rejected.len(),
                message: reason,
            }),
            WriteOutcome::Error { status, message } => Err(Error::Transport { status, message }),
        }
    }

    /// Execute a Flux query and return results as an async stream.
    ///
    /// Results are streamed one record at a time, so arbitrarily large
    /// result sets can be processed without holding them in memory.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use futures::StreamExt;
    ///
    /// let mut stream = client.query_stream("from(bucket: \"test\") |> range(start: -1h)").await?;
    ///
    /// let mut count = 0;
    /// while let Some(result) = stream.next().await {
    ///     let record = result?;
    ///     count += 1;
    /// }
    /// println!("Processed {} records", count);
    /// ```
    pub async fn query_stream(
        &self,
        query: impl Into<String>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<FluxRecord>> + Send>>> {
        let mut parser = AnnotatedCsvParser::new(self.query_reader(query.into()).await?);

        // Create an async stream that yields records
        let s = stream! {
            loop {
                match parser.next().await {
                    Ok(Some(record)) => yield Ok(record),
                    Ok(None) => break,       // EOF
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(s))
    }

    /// Execute a Flux query and collect all results into a Vec.
    ///
    /// **Warning**: This loads all results into memory. For large result sets,
    /// use `query_stream()` instead to process records one at a time.
    pub async fn query(&self, query: impl Into<String>) -> Result<Vec<FluxRecord>> {
        let mut stream = self.query_stream(query).await?;
        let mut results = Vec::new();

        while let Some(item) = stream.next().await {
            results.push(item?);
        }

        Ok(results)
    }

    /// Execute a Flux query and decode the response into tables.
    pub async fn query_tables(&self, query: impl Into<String>) -> Result<Vec<FluxTable>> {
        let reader = self.query_reader(query.into()).await?;
        Ok(decode_tables(reader, [DEFAULT_VALUE_COLUMN]).await?)
    }

    /// Print `flux` with `params` and execute it.
    pub async fn query_flux(&self, flux: &Flux, params: &Parameters) -> Result<Vec<FluxTable>> {
        let query = flux.print_with(params)?;
        debug!(%query, "executing flux query");
        self.query_tables(query).await
    }

    /// Send a query and return the response body as an async reader.
    async fn query_reader(&self, query: String) -> Result<impl tokio::io::AsyncRead + Unpin + Send + 'static> {
        let endpoint = self.endpoint("/api/v2/query");
        let payload = QueryPayload::new(query);
        let body = serde_json::to_string(&payload)?;

        let response = self
            .authorize(self.http.request(Method::POST, &endpoint))
            .header("Accept", "application/csv")
            .header("Content-Type", "application/json")
            .query(&[("org", &self.org)])
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            return Err(Error::Transport {
                status: Some(status.as_u16()),
                message: error_message(status, &text),
            });
        }

        // Convert the response body to an async reader
        Ok(StreamReader::new(
            response.bytes_stream().map_err(std::io::Error::other),
        ))
    }
}

#[async_trait]
impl Transport for Client {
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome> {
        let mut params: Vec<(&str, &str)> = vec![
            ("db", request.database.as_str()),
            ("precision", request.precision.as_query_param()),
            ("consistency", request.consistency.as_str()),
        ];
        if let Some(rp) = &request.retention_policy {
            params.push(("rp", rp.as_str()));
        }
        if let Some((username, password)) = &self.credentials {
            params.push(("u", username.as_str()));
            params.push(("p", password.as_str()));
        }

        let sent = self
            .authorize(self.http.post(self.endpoint("/write")))
            .header("Content-Type", "text/plain; charset=utf-8")
            .query(&params)
            .body(request.body.clone())
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                return Ok(WriteOutcome::Error {
                    status: None,
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(WriteOutcome::Success);
        }

        let text = response.text().await?;
        let message = error_message(status, &text);
        if status == StatusCode::BAD_REQUEST && message.contains("partial write") {
            let rejected = rejected_lines(&message, &request.body);
            if !rejected.is_empty() {
                return Ok(WriteOutcome::PartialWrite {
                    rejected,
                    reason: message,
                });
            }
            warn!(%message, "partial write names no line of the batch");
        }

        Ok(WriteOutcome::Error {
            status: Some(status.as_u16()),
            message,
        })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.base_url.as_str())
            .field("org", &self.org)
            .finish_non_exhaustive()
    }
}
