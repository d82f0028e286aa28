//! Error types for influxdb-lineflux.

use thiserror::Error;

/// Error type for influxdb-lineflux operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to serialize query to JSON.
    #[error("Failed to serialize query: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to parse CSV data.
    #[error("CSV parse error: {0}")]
    Csv(String),

    /// Structural problem in the annotated CSV response.
    #[error("Failed to parse response: {message}")]
    Parse {
        /// Description of what failed to parse.
        message: String,
    },

    /// A data cell could not be parsed with its column's declared datatype.
    #[error("Malformed cell '{value}' in column '{column}': {message}")]
    MalformedCell {
        /// Column name.
        column: String,
        /// Raw cell text.
        value: String,
        /// Underlying parser message.
        message: String,
    },

    /// Unknown data type in annotated CSV.
    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// Missing required annotation in CSV.
    #[error("Missing annotation: {0}")]
    MissingAnnotation(String),

    /// Row has different number of columns than expected.
    #[error("Column count mismatch: expected {expected}, got {actual}")]
    ColumnMismatch {
        /// Expected number of columns.
        expected: usize,
        /// Actual number of columns found.
        actual: usize,
    },

    /// Query returned an error from InfluxDB.
    #[error("Query error from InfluxDB: {message}")]
    QueryError {
        /// Error message returned by InfluxDB.
        message: String,
        /// Optional reference link for debugging.
        reference: Option<String>,
    },

    /// Point is missing required data or carries an empty key.
    #[error("Invalid point: {0}")]
    InvalidPoint(String),

    /// A Flux query referenced a parameter that was never bound.
    #[error("Unbound query parameter: {0}")]
    UnboundParameter(String),

    /// Write request failed at the network or HTTP level.
    #[error("Transport failure (status {status:?}): {message}")]
    Transport {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Server or client side description.
        message: String,
    },

    /// Some lines of a batch were rejected by the server.
    #[error("Partial write, {rejected} line(s) rejected: {message}")]
    PartialWrite {
        /// Number of rejected lines.
        rejected: usize,
        /// Server message.
        message: String,
    },

    /// Write pipeline has been closed.
    #[error("Write pipeline is closed")]
    Closed,

    /// Invalid option value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error during streaming.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for influxdb-lineflux operations.
pub type Result<T> = std::result::Result<T, Error>;
