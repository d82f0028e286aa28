//! # influxdb-lineflux
//!
//! Async InfluxDB client: line protocol writes through a batching pipeline,
//! Flux queries built from composable operators, and streamed decoding of
//! annotated CSV results.
//!
//! ## Writing
//!
//! ```ignore
//! use influxdb_lineflux::{Client, Point};
//! use influxdb_lineflux::write::{BatchOptions, WriteOptions};
//!
//! let client = Client::new("http://localhost:8086", "my-org", "my-token")?;
//! let write_api = client.write_api(WriteOptions::builder("sensors").build()?, BatchOptions::default());
//!
//! write_api.submit(
//!     Point::builder("weather")
//!         .tag("location", "Prague")
//!         .field("temperature", 21.5)
//!         .build()?,
//! )?;
//! write_api.close().await;
//! ```
//!
//! ## Querying
//!
//! ```ignore
//! use influxdb_lineflux::flux::{Flux, FluxDuration, Parameters, Restriction};
//!
//! let flux = Flux::from_bucket("sensors")
//!     .range(FluxDuration::hours(-1))
//!     .filter(Restriction::measurement().equal("weather"))
//!     .mean();
//!
//! for table in client.query_flux(&flux, &Parameters::new()).await? {
//!     for record in &table.records {
//!         println!("{:?} {:?}", record.time(), record.value());
//!     }
//! }
//! ```
//!
//! Large results can be streamed record by record with
//! [`Client::query_stream`], which never holds the whole response in memory.

pub mod client;
pub mod error;
pub mod escape;
pub mod flux;
pub mod line_protocol;
pub mod parser;
pub mod point;
pub mod types;
pub mod value;
pub mod write;

// Re-export main types at crate root
pub use client::Client;
pub use error::{Error, Result};
pub use line_protocol::{LineEncoder, Series};
pub use point::{FieldValue, Point, PointBuilder, Precision, Timestamp, ToPoint};
pub use types::{DataType, FluxColumn, FluxRecord, FluxTable, FluxTableMetadata};
pub use value::Value;
pub use write::WriteApi;

// Re-export parser for advanced use cases
pub use parser::{AnnotatedCsvParser, CsvEvent, DecodeFailure, decode_tables};
