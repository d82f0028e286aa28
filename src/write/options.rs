//! Write and batching configuration.
//!
//! Both option types are immutable once built. They deserialize from any
//! serde source through their builders, so defaults and validation are the
//! same whether options come from code or from a config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::point::Precision;

/// Write consistency requested from a clustered server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Any node, including hinted handoff.
    Any,
    /// One node.
    #[default]
    One,
    /// A quorum of nodes.
    Quorum,
    /// All nodes.
    All,
}

impl Consistency {
    /// Value of the `consistency` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Consistency::Any => "any",
            Consistency::One => "one",
            Consistency::Quorum => "quorum",
            Consistency::All => "all",
        }
    }
}

/// Destination and encoding of written batches.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "WriteOptionsBuilder")]
pub struct WriteOptions {
    database: String,
    retention_policy: Option<String>,
    consistency: Consistency,
    precision: Precision,
}

impl WriteOptions {
    /// Start building options for `database`.
    pub fn builder(database: impl Into<String>) -> WriteOptionsBuilder {
        WriteOptionsBuilder {
            database: database.into(),
            ..WriteOptionsBuilder::default()
        }
    }

    /// Target database (or bucket through the compatibility API).
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Retention policy, server default when `None`.
    pub fn retention_policy(&self) -> Option<&str> {
        self.retention_policy.as_deref()
    }

    /// Write consistency.
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Timestamp precision of encoded lines.
    pub fn precision(&self) -> Precision {
        self.precision
    }
}

/// Builder for [`WriteOptions`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct WriteOptionsBuilder {
    database: String,
    retention_policy: Option<String>,
    consistency: Consistency,
    precision: Precision,
}

impl WriteOptionsBuilder {
    /// Retention policy.
    pub fn retention_policy(mut self, rp: impl Into<String>) -> Self {
        self.retention_policy = Some(rp.into());
        self
    }

    /// Write consistency.
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Timestamp precision.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<WriteOptions> {
        if self.database.is_empty() {
            return Err(Error::Config("database must not be empty".into()));
        }
        Ok(WriteOptions {
            database: self.database,
            retention_policy: self.retention_policy.filter(|rp| !rp.is_empty()),
            consistency: self.consistency,
            precision: self.precision,
        })
    }
}

impl TryFrom<WriteOptionsBuilder> for WriteOptions {
    type Error = Error;

    fn try_from(builder: WriteOptionsBuilder) -> Result<Self> {
        builder.build()
    }
}

/// Batching, flushing and retry policy of a write pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BatchOptionsBuilder")]
pub struct BatchOptions {
    batch_size: usize,
    flush_interval: Duration,
    jitter_interval: Duration,
    retry_buffer_limit: usize,
    queue_capacity: usize,
    max_retries: u32,
}

impl BatchOptions {
    /// Start from the defaults.
    pub fn builder() -> BatchOptionsBuilder {
        BatchOptionsBuilder::default()
    }

    /// Number of queued items that triggers a flush.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Maximum time between flushes.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Upper bound of the random delay added to each flush interval.
    pub fn jitter_interval(&self) -> Duration {
        self.jitter_interval
    }

    /// Capacity of the retry buffer.
    pub fn retry_buffer_limit(&self) -> usize {
        self.retry_buffer_limit
    }

    /// Capacity of the submission queue.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Send attempts after the first before an item is discarded.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            batch_size: default_batch_size(),
            flush_interval: Duration::from_millis(default_flush_interval()),
            jitter_interval: Duration::ZERO,
            retry_buffer_limit: default_buffer_limit(),
            queue_capacity: default_buffer_limit(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_batch_size() -> usize {
    1000
}

fn default_flush_interval() -> u64 {
    1000 // 1 second
}

fn default_buffer_limit() -> usize {
    10_000
}

fn default_max_retries() -> u32 {
    5
}

/// Builder for [`BatchOptions`]. Intervals are kept in milliseconds.
#[derive(Clone, Debug, Deserialize)]
pub struct BatchOptionsBuilder {
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_flush_interval")]
    flush_interval_ms: u64,
    #[serde(default)]
    jitter_interval_ms: u64,
    #[serde(default = "default_buffer_limit")]
    retry_buffer_limit: usize,
    #[serde(default = "default_buffer_limit")]
    queue_capacity: usize,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
}

impl Default for BatchOptionsBuilder {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval(),
            jitter_interval_ms: 0,
            retry_buffer_limit: default_buffer_limit(),
            queue_capacity: default_buffer_limit(),
            max_retries: default_max_retries(),
        }
    }
}

impl BatchOptionsBuilder {
    /// Number of queued items that triggers a flush.
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Maximum time between flushes.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Upper bound of the random delay added to each flush interval.
    pub fn jitter_interval(mut self, jitter: Duration) -> Self {
        self.jitter_interval_ms = jitter.as_millis() as u64;
        self
    }

    /// Capacity of the retry buffer; 0 disables retries.
    pub fn retry_buffer_limit(mut self, n: usize) -> Self {
        self.retry_buffer_limit = n;
        self
    }

    /// Capacity of the submission queue.
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    /// Send attempts after the first before an item is discarded.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<BatchOptions> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(Error::Config("flush_interval must be positive".into()));
        }
        if self.queue_capacity < self.batch_size {
            return Err(Error::Config(format!(
                "queue_capacity {} is smaller than batch_size {}",
                self.queue_capacity, self.batch_size
            )));
        }
        Ok(BatchOptions {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            jitter_interval: Duration::from_millis(self.jitter_interval_ms),
            retry_buffer_limit: self.retry_buffer_limit,
            queue_capacity: self.queue_capacity,
            max_retries: self.max_retries,
        })
    }
}

impl TryFrom<BatchOptionsBuilder> for BatchOptions {
    type Error = Error;

    fn try_from(builder: BatchOptionsBuilder) -> Result<Self> {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_defaults() {
        let options = BatchOptions::builder().build().unwrap();
        assert_eq!(options, BatchOptions::default());
        assert_eq!(options.batch_size(), 1000);
        assert_eq!(options.flush_interval(), Duration::from_secs(1));
        assert_eq!(options.jitter_interval(), Duration::ZERO);
        assert_eq!(options.retry_buffer_limit(), 10_000);
    }

    #[test]
    fn test_batch_validation() {
        assert!(BatchOptions::builder().batch_size(0).build().is_err());
        assert!(BatchOptions::builder()
            .flush_interval(Duration::ZERO)
            .build()
            .is_err());
        assert!(BatchOptions::builder()
            .batch_size(100)
            .queue_capacity(10)
            .build()
            .is_err());
    }

    #[test]
    fn test_batch_from_json() {
        let options: BatchOptions =
            serde_json::from_str(r#"{"batch_size": 50, "jitter_interval_ms": 250}"#).unwrap();
        assert_eq!(options.batch_size(), 50);
        assert_eq!(options.jitter_interval(), Duration::from_millis(250));
        assert_eq!(options.flush_interval(), Duration::from_secs(1));

        let invalid = serde_json::from_str::<BatchOptions>(r#"{"batch_size": 0}"#);
        assert!(invalid.is_err());
    }

    #[test]
    fn test_write_options() {
        let options = WriteOptions::builder("telegraf")
            .retention_policy("autogen")
            .consistency(Consistency::Quorum)
            .precision(Precision::Seconds)
            .build()
            .unwrap();
        assert_eq!(options.database(), "telegraf");
        assert_eq!(options.retention_policy(), Some("autogen"));
        assert_eq!(options.consistency().as_str(), "quorum");
        assert_eq!(options.precision(), Precision::Seconds);

        assert!(WriteOptions::builder("").build().is_err());
    }

    #[test]
    fn test_write_options_from_json() {
        let options: WriteOptions =
            serde_json::from_str(r#"{"database": "db", "precision": "ms", "consistency": "all"}"#)
                .unwrap();
        assert_eq!(options.precision(), Precision::Milliseconds);
        assert_eq!(options.consistency(), Consistency::All);
        assert_eq!(options.retention_policy(), None);
    }
}
