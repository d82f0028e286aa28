//! The boundary between the write pipeline and the network.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::point::Precision;
use crate::write::options::{Consistency, WriteOptions};

/// One batch, ready to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    /// Target database.
    pub database: String,
    /// Retention policy, server default when `None`.
    pub retention_policy: Option<String>,
    /// Precision of the timestamps in `body`.
    pub precision: Precision,
    /// Requested write consistency.
    pub consistency: Consistency,
    /// Newline separated line protocol records.
    pub body: String,
    /// Number of records in `body`.
    pub lines: usize,
}

impl WriteRequest {
    /// Request for `lines` under `options`.
    pub fn new<'a>(options: &WriteOptions, lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut body = String::new();
        let mut count = 0;
        for line in lines {
            if count > 0 {
                body.push('\n');
            }
            body.push_str(line);
            count += 1;
        }
        Self {
            database: options.database().to_string(),
            retention_policy: options.retention_policy().map(str::to_string),
            precision: options.precision(),
            consistency: options.consistency(),
            body,
            lines: count,
        }
    }
}

/// What the server made of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every record was stored.
    Success,
    /// Some records were rejected; indices point into the request's lines.
    PartialWrite {
        /// Zero-based indices of rejected records.
        rejected: Vec<usize>,
        /// Server explanation.
        reason: String,
    },
    /// Nothing was stored.
    Error {
        /// HTTP status, `None` when no response arrived.
        status: Option<u16>,
        /// Server or network explanation.
        message: String,
    },
}

impl WriteOutcome {
    /// Whether a failed request may succeed when sent again: network
    /// failures, throttling and server errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            WriteOutcome::Success => false,
            WriteOutcome::PartialWrite { .. } => true,
            WriteOutcome::Error { status, .. } => retryable_status(*status),
        }
    }
}

/// Whether a failure with `status` is worth retrying. `None` stands for a
/// network failure.
pub fn retryable_status(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(status) => status == 429 || status >= 500,
    }
}

/// Sends batches somewhere.
///
/// `Ok` carries the server's verdict, including rejections. `Err` means the
/// transport itself failed in a way it could not classify.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one batch.
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome> {
        (**self).write(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let options = WriteOptions::builder("db").build().unwrap();
        let request = WriteRequest::new(&options, ["a f=1i", "b f=2i"]);
        assert_eq!(request.body, "a f=1i\nb f=2i");
        assert_eq!(request.lines, 2);
        assert_eq!(request.database, "db");
        assert_eq!(request.precision, Precision::Nanoseconds);
    }

    #[test]
    fn test_retryable_statuses() {
        let error = |status| WriteOutcome::Error {
            status,
            message: String::new(),
        };
        assert!(error(None).is_retryable());
        assert!(error(Some(429)).is_retryable());
        assert!(error(Some(503)).is_retryable());
        assert!(!error(Some(400)).is_retryable());
        assert!(!error(Some(404)).is_retryable());
        assert!(!WriteOutcome::Success.is_retryable());
    }
}
