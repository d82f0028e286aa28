//! Async parser for InfluxDB annotated CSV format.
//!
//! This module provides a streaming parser for InfluxDB's annotated CSV format,
//! which is the format returned by the `/api/v2/query` endpoint, and
//! [`decode_tables`], which groups the stream into [`FluxTable`]s.

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::Engine;
use chrono::DateTime;
use csv_async::{AsyncReaderBuilder, StringRecord, Trim};
use futures::StreamExt;
use go_parse_duration::parse_duration;
use ordered_float::OrderedFloat;
use tokio::io::AsyncRead;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::types::{DEFAULT_VALUE_COLUMN, DataType, FluxRecord, FluxTable, FluxTableMetadata};
use crate::value::Value;

/// Internal state of the CSV parser.
#[derive(PartialEq)]
enum ParsingState {
    /// Normal data rows.
    Normal,
    /// Processing annotation rows.
    Annotation,
    /// Error state (InfluxDB returned an error in the CSV).
    Error,
}

/// Item produced by [`AnnotatedCsvParser::next_event`].
#[derive(Clone, Debug, PartialEq)]
pub enum CsvEvent {
    /// A new table starts; following records belong to it.
    Table(FluxTableMetadata),
    /// A data row of the current table.
    Record(FluxRecord),
}

/// Async streaming parser for InfluxDB annotated CSV.
///
/// This parser reads an async byte stream and yields `FluxRecord`s one at a time,
/// without loading the entire response into memory.
///
/// A new table starts at every annotation block, and whenever the `table`
/// column changes value or a blank line separates data rows. The CSV reader
/// skips blank lines, so they are detected from the reader's line count.
///
/// # Example
///
/// ```ignore
/// use influxdb_lineflux::parser::AnnotatedCsvParser;
/// use tokio::io::AsyncRead;
///
/// async fn parse<R: AsyncRead + Unpin + Send>(reader: R) {
///     let mut parser = AnnotatedCsvParser::new(reader);
///     while let Some(record) = parser.next().await.transpose() {
///         match record {
///             Ok(rec) => println!("Got record: {:?}", rec),
///             Err(e) => eprintln!("Parse error: {}", e),
///         }
///     }
/// }
/// ```
pub struct AnnotatedCsvParser<R: AsyncRead + Unpin> {
    csv: csv_async::AsyncReader<R>,
    value_destinations: Vec<String>,
    table_position: i32,
    table: Option<FluxTableMetadata>,
    table_index: Option<String>,
    boundary_pending: bool,
    last_line: u64,
    pending: Option<FluxRecord>,
    parsing_state: ParsingState,
    data_type_annotation_found: bool,
}

impl<R: AsyncRead + Unpin + Send> AnnotatedCsvParser<R> {
    /// Create a new parser from an async reader. Record values come from the
    /// `_value` column.
    pub fn new(reader: R) -> Self {
        Self::with_value_destinations(reader, [DEFAULT_VALUE_COLUMN])
    }

    /// Create a parser that routes the named columns into
    /// [`FluxRecord::values`]. The first name is the primary value.
    pub fn with_value_destinations<S: Into<String>>(
        reader: R,
        value_destinations: impl IntoIterator<Item = S>,
    ) -> Self {
        let csv = AsyncReaderBuilder::new()
            .has_headers(false) // We handle headers/annotations ourselves
            .trim(Trim::Fields)
            .flexible(true)
            .create_reader(reader);

        let mut value_destinations: Vec<String> =
            value_destinations.into_iter().map(Into::into).collect();
        if value_destinations.is_empty() {
            value_destinations.push(DEFAULT_VALUE_COLUMN.to_string());
        }

        Self {
            csv,
            value_destinations,
            table_position: 0,
            table: None,
            table_index: None,
            boundary_pending: false,
            last_line: 1,
            pending: None,
            parsing_state: ParsingState::Normal,
            data_type_annotation_found: false,
        }
    }

    /// Parse and return the next record.
    ///
    /// Returns:
    /// - `Ok(Some(record))` - Successfully parsed a record
    /// - `Ok(None)` - End of stream (EOF)
    /// - `Err(e)` - Parse error
    pub async fn next(&mut self) -> Result<Option<FluxRecord>> {
        loop {
            match self.next_event().await? {
                Some(CsvEvent::Record(record)) => return Ok(Some(record)),
                Some(CsvEvent::Table(_)) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Parse and return the next table start or record.
    pub async fn next_event(&mut self) -> Result<Option<CsvEvent>> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(CsvEvent::Record(record)));
        }

        loop {
            let row = {
                let mut records = self.csv.records();
                match records.next().await {
                    Some(Ok(r)) => r,
                    Some(Err(e)) => {
                        return Err(Error::Csv(format!("CSV read error: {}", e)));
                    }
                    None if self.parsing_state == ParsingState::Error => {
                        return Err(Error::QueryError {
                            message: "Unknown query error".to_string(),
                            reference: None,
                        });
                    }
                    None => return Ok(None), // EOF
                }
            };

            // Lines consumed beyond the row's own terminator were blank
            let line = self.csv.position().line();
            let consumed = line.saturating_sub(self.last_line);
            self.last_line = line;
            let embedded: u64 = row
                .iter()
                .map(|cell| cell.bytes().filter(|b| *b == b'\n').count() as u64)
                .sum();
            let blank_row = row.len() <= 1 && row.get(0).unwrap_or_default().is_empty();
            if (consumed > embedded + 1 || blank_row)
                && self.parsing_state == ParsingState::Normal
            {
                self.boundary_pending = true;
            }

            if blank_row {
                continue;
            }
            if row.len() <= 1 {
                return Err(Error::Parse {
                    message: format!(
                        "Row with a single cell: {}",
                        row.get(0).unwrap_or_default()
                    ),
                });
            }

            // Check for annotation block start (rows starting with '#')
            let first = row.get(0).unwrap_or_default();
            if first.starts_with('#') && self.parsing_state == ParsingState::Normal {
                self.table = Some(FluxTableMetadata::new(self.table_position, row.len() - 1));
                self.parsing_state = ParsingState::Annotation;
                self.data_type_annotation_found = false;
            }

            let Some(table) = self.table.as_mut() else {
                return Err(Error::MissingAnnotation(
                    "No annotations found before data".to_string(),
                ));
            };

            // Validate column count
            if row.len() - 1 != table.columns.len() {
                return Err(Error::ColumnMismatch {
                    expected: table.columns.len(),
                    actual: row.len() - 1,
                });
            }

            match first {
                // Data row (first cell is empty)
                "" => match self.parsing_state {
                    ParsingState::Annotation => {
                        if !self.data_type_annotation_found {
                            return Err(Error::MissingAnnotation(
                                "#datatype annotation not found".to_string(),
                            ));
                        }
                        // Check for error table
                        if row.get(1).unwrap_or_default() == "error" {
                            debug!("response carries an error table");
                            self.parsing_state = ParsingState::Error;
                            continue;
                        }
                        // This is the header row - fill column names
                        for (column, name) in table.columns.iter_mut().zip(row.iter().skip(1)) {
                            column.name = name.to_string();
                            column.tag = column.group
                                && !self.value_destinations.iter().any(|d| d == name);
                        }
                        self.parsing_state = ParsingState::Normal;
                        self.table_index = None;
                        self.boundary_pending = false;
                        return Ok(Some(CsvEvent::Table(self.start_table())));
                    }
                    ParsingState::Error => {
                        // Parse error message from InfluxDB
                        let message = match row.get(1) {
                            Some(m) if !m.is_empty() => m.to_string(),
                            _ => "Unknown query error".to_string(),
                        };
                        let reference = row
                            .get(2)
                            .filter(|r| !r.is_empty())
                            .map(str::to_string);
                        return Err(Error::QueryError { message, reference });
                    }
                    ParsingState::Normal => {
                        let index = table
                            .column("table")
                            .and_then(|c| row.get(c.index + 1))
                            .map(str::to_string);
                        let index_changed = matches!(
                            (&self.table_index, &index),
                            (Some(prev), Some(cur)) if prev != cur
                        );
                        let new_table = index_changed || self.boundary_pending;
                        self.table_index = index;
                        self.boundary_pending = false;

                        if new_table {
                            let metadata = self.start_table();
                            let record = self.parse_record(&row)?;
                            self.pending = Some(record);
                            return Ok(Some(CsvEvent::Table(metadata)));
                        }
                        return self.parse_record(&row).map(|r| Some(CsvEvent::Record(r)));
                    }
                },
                // Annotation rows
                "#datatype" => {
                    self.data_type_annotation_found = true;
                    for (column, cell) in table.columns.iter_mut().zip(row.iter().skip(1)) {
                        column.data_type = DataType::from_str(cell)?;
                    }
                }
                "#group" => {
                    for (column, cell) in table.columns.iter_mut().zip(row.iter().skip(1)) {
                        column.group = cell == "true";
                    }
                }
                "#default" => {
                    for (column, cell) in table.columns.iter_mut().zip(row.iter().skip(1)) {
                        column.default_value = cell.to_string();
                    }
                }
                other => {
                    return Err(Error::Parse {
                        message: format!("Invalid first cell: {}", other),
                    });
                }
            }
        }
    }

    /// Assign the next position to the current table and return a copy of
    /// its metadata.
    fn start_table(&mut self) -> FluxTableMetadata {
        let position = self.table_position;
        self.table_position += 1;
        match self.table.as_mut() {
            Some(table) => {
                table.position = position;
                trace!(position, columns = table.columns.len(), "table started");
                table.clone()
            }
            None => FluxTableMetadata::new(position, 0),
        }
    }

    /// Parse a data row of the current table into a FluxRecord.
    fn parse_record(&self, row: &StringRecord) -> Result<FluxRecord> {
        let Some(table) = self.table.as_ref() else {
            return Err(Error::MissingAnnotation(
                "No annotations found before data".to_string(),
            ));
        };

        let mut columns = BTreeMap::new();
        let mut tags = BTreeMap::new();
        let mut values = BTreeMap::new();
        for (col, cell) in table.columns.iter().zip(row.iter().skip(1)) {
            let raw = if cell.is_empty() {
                col.default_value.as_str()
            } else {
                cell
            };
            let parsed = parse_value(raw, col.data_type, &col.name)?;
            if self.value_destinations.iter().any(|d| *d == col.name) {
                values.insert(col.name.clone(), parsed.clone());
            } else if col.group {
                tags.insert(col.name.clone(), parsed.clone());
            }
            columns.insert(col.name.clone(), parsed);
        }

        Ok(FluxRecord {
            table: table.position,
            columns,
            tags,
            values,
            value_column: self.value_destinations[0].clone(),
        })
    }
}

/// Decoding stopped early. Carries the tables completed before the failure.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct DecodeFailure {
    /// What stopped decoding.
    #[source]
    pub error: Error,
    /// Tables decoded before the failure, the last one possibly incomplete.
    pub tables: Vec<FluxTable>,
}

impl From<DecodeFailure> for Error {
    fn from(failure: DecodeFailure) -> Self {
        failure.error
    }
}

/// Decode a whole annotated CSV response into tables.
///
/// `value_destinations` names the columns routed into
/// [`FluxRecord::values`]; an empty list means `_value`.
pub async fn decode_tables<R, S>(
    reader: R,
    value_destinations: impl IntoIterator<Item = S>,
) -> std::result::Result<Vec<FluxTable>, DecodeFailure>
where
    R: AsyncRead + Unpin + Send,
    S: Into<String>,
{
    let mut parser = AnnotatedCsvParser::with_value_destinations(reader, value_destinations);
    let mut tables: Vec<FluxTable> = Vec::new();

    loop {
        match parser.next_event().await {
            Ok(Some(CsvEvent::Table(metadata))) => tables.push(FluxTable::new(metadata)),
            Ok(Some(CsvEvent::Record(record))) => match tables.last_mut() {
                Some(table) => table.records.push(record),
                None => {
                    return Err(DecodeFailure {
                        error: Error::MissingAnnotation("record before table header".into()),
                        tables,
                    });
                }
            },
            Ok(None) => return Ok(tables),
            Err(error) => return Err(DecodeFailure { error, tables }),
        }
    }
}

/// Parse a string value into a Value based on the data type.
fn parse_value(s: &str, data_type: DataType, column_name: &str) -> Result<Value> {
    // Handle empty strings as null for non-string types
    if s.is_empty() && data_type != DataType::String {
        return Ok(Value::Null);
    }

    let malformed = |message: String| Error::MalformedCell {
        column: column_name.to_string(),
        value: s.to_string(),
        message,
    };

    match data_type {
        DataType::String => Ok(Value::String(s.to_string())),
        DataType::Double => {
            let v = s.parse::<f64>().map_err(|e| malformed(e.to_string()))?;
            Ok(Value::Double(OrderedFloat::from(v)))
        }
        DataType::Bool => {
            if s.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if s.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(malformed("expected true or false".into()))
            }
        }
        DataType::Long => {
            let v = s.parse::<i64>().map_err(|e| malformed(e.to_string()))?;
            Ok(Value::Long(v))
        }
        DataType::UnsignedLong => {
            let v = s.parse::<u64>().map_err(|e| malformed(e.to_string()))?;
            Ok(Value::UnsignedLong(v))
        }
        DataType::Duration => {
            let nanos = parse_duration(s).map_err(|_| malformed("invalid duration".into()))?;
            Ok(Value::Duration(chrono::Duration::nanoseconds(nanos)))
        }
        DataType::Base64Binary => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|e| malformed(e.to_string()))?;
            Ok(Value::Base64Binary(bytes))
        }
        DataType::TimeRFC => {
            let t = DateTime::parse_from_rfc3339(s).map_err(|e| malformed(e.to_string()))?;
            Ok(Value::TimeRFC(t))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_protocol;
    use crate::point::{Point, Precision};

    const TWO_TABLES: &str = "\
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,long,double,string,string,string
#group,false,false,true,true,false,false,false,true,true,true
#default,_result,,,,,,,,,
,result,table,_start,_stop,_time,value1,_value2,value_str,_field,_measurement
,,0,1970-01-01T00:00:10Z,1970-01-01T00:00:20Z,1970-01-01T00:00:10Z,1,1.1,test,free,mem
,,0,1970-01-01T00:00:10Z,1970-01-01T00:00:20Z,1970-01-01T00:00:11Z,2,2.2,test,free,mem
,,1,1970-01-01T00:00:10Z,1970-01-01T00:00:20Z,1970-01-01T00:00:12Z,3,3.3,test,used,mem
,,1,1970-01-01T00:00:10Z,1970-01-01T00:00:20Z,1970-01-01T00:00:13Z,4,4.4,test,used,mem
";

    const ERROR_TABLE: &str = "\
#datatype,string,string
#group,true,true
#default,,
,error,reference
,failed to create physical plan: invalid time bounds from procedure from: bounds contain zero time,897
";

    #[test]
    fn test_parse_value_string() {
        let v = parse_value("hello", DataType::String, "test").unwrap();
        assert_eq!(v, Value::String("hello".to_string()));
    }

    #[test]
    fn test_parse_value_double() {
        let v = parse_value("3.14", DataType::Double, "test").unwrap();
        assert_eq!(v, Value::Double(OrderedFloat::from(3.14)));
    }

    #[test]
    fn test_parse_value_bool() {
        assert_eq!(
            parse_value("true", DataType::Bool, "test").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            parse_value("false", DataType::Bool, "test").unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_parse_value_long() {
        let v = parse_value("-42", DataType::Long, "test").unwrap();
        assert_eq!(v, Value::Long(-42));
    }

    #[test]
    fn test_parse_value_empty_is_null() {
        let v = parse_value("", DataType::Long, "test").unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn test_parse_value_malformed_cell() {
        let err = parse_value("abc", DataType::Long, "count").unwrap_err();
        match err {
            Error::MalformedCell { column, value, .. } => {
                assert_eq!(column, "count");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_value_malformed_bool() {
        for raw in ["banana", "1", "yes"] {
            let err = parse_value(raw, DataType::Bool, "ok").unwrap_err();
            assert!(matches!(
                err,
                Error::MalformedCell { ref column, ref value, .. } if column == "ok" && value == raw
            ));
        }
    }

    #[tokio::test]
    async fn test_two_tables_with_value_destinations() {
        let tables = decode_tables(TWO_TABLES.as_bytes(), ["value1", "_value2", "value_str"])
            .await
            .unwrap();

        assert_eq!(tables.len(), 2);
        for (position, table) in tables.iter().enumerate() {
            assert_eq!(table.metadata.position, position as i32);
            assert_eq!(table.columns().len(), 10);
            assert_eq!(table.records.len(), 2);
            for record in &table.records {
                assert_eq!(record.value(), record.get("value1"));
                assert_eq!(record.table, position as i32);
                assert_eq!(record.values.len(), 3);
                assert!(record.tags.contains_key("_field"));
                assert!(record.tags.contains_key("_start"));
                assert!(!record.tags.contains_key("value_str"));
            }
        }
        assert_eq!(tables[1].records[0].value(), Some(&Value::Long(3)));
        assert_eq!(tables[0].records[0].get_string("result").as_deref(), Some("_result"));

        let value_str = tables[0].metadata.column("value_str").unwrap();
        assert!(value_str.group);
        assert!(!value_str.tag);
        assert!(tables[0].metadata.column("_measurement").unwrap().tag);
    }

    #[tokio::test]
    async fn test_default_value_destination() {
        let csv = "\
#datatype,string,long,string,double
#group,false,false,true,false
#default,_result,,,
,result,table,host,_value
,,0,a,1.5
";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        let record = parser.next().await.unwrap().unwrap();
        assert_eq!(record.value(), Some(&Value::Double(OrderedFloat(1.5))));
        assert_eq!(record.tags.get("host"), Some(&Value::String("a".into())));
        assert!(parser.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redeclared_headers_start_new_table() {
        let csv = "\
#datatype,string,long,long
#group,false,false,false
#default,_result,,
,result,table,_value
,,0,1

#datatype,string,long,string
#group,false,false,false
#default,_result,,
,result,table,_value
,,1,x
";
        let tables = decode_tables(csv.as_bytes(), Vec::<String>::new())
            .await
            .unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].records[0].value(), Some(&Value::Long(1)));
        assert_eq!(
            tables[1].records[0].value(),
            Some(&Value::String("x".into()))
        );
        assert_eq!(tables[1].columns()[2].data_type, DataType::String);
    }

    #[tokio::test]
    async fn test_blank_line_separates_tables() {
        let lines = [
            "#datatype,string,long,long",
            "#group,false,false,false",
            "#default,_result,,",
            ",result,table,_value",
            ",,0,1",
            "",
            ",,0,2",
            ",,0,3",
            "",
        ];
        for terminator in ["\n", "\r\n"] {
            let csv = lines.join(terminator);
            let tables = decode_tables(csv.as_bytes(), ["_value"]).await.unwrap();
            assert_eq!(tables.len(), 2, "terminator {terminator:?}");
            assert_eq!(tables[0].records.len(), 1);
            assert_eq!(tables[1].records.len(), 2);
            assert_eq!(tables[1].metadata.position, 1);
            assert_eq!(tables[1].records[0].value(), Some(&Value::Long(2)));
            assert_eq!(tables[1].records[0].table, 1);
        }
    }

    #[tokio::test]
    async fn test_quoted_newline_is_not_a_boundary() {
        let csv = "\
#datatype,string,long,string
#group,false,false,false
#default,_result,,
,result,table,_value
,,0,\"two\nlines\"
,,0,next
";
        let tables = decode_tables(csv.as_bytes(), ["_value"]).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(
            tables[0].records[0].value(),
            Some(&Value::String("two\nlines".into()))
        );
        assert_eq!(tables[0].records.len(), 2);
    }

    #[tokio::test]
    async fn test_single_cell_row_is_rejected() {
        let csv = "\
#datatype,string,long,long
#group,false,false,false
#default,_result,,
,result,table,_value
,,0,1
garbage
";
        let err = decode_tables(csv.as_bytes(), ["_value"]).await.unwrap_err();
        assert_eq!(err.tables[0].records.len(), 1);
        assert!(matches!(err.error, Error::Parse { .. }));
    }

    #[tokio::test]
    async fn test_truncated_error_table() {
        let csv = "#datatype,string,string\n#group,true,true\n#default,,\n,error,reference\n";
        let err = decode_tables(csv.as_bytes(), ["_value"]).await.unwrap_err();
        assert!(matches!(
            err.error,
            Error::QueryError { ref message, reference: None } if message == "Unknown query error"
        ));
    }

    #[tokio::test]
    async fn test_error_table() {
        let err = decode_tables(ERROR_TABLE.as_bytes(), ["_value"])
            .await
            .unwrap_err();
        assert!(err.tables.is_empty());
        match err.error {
            Error::QueryError { message, reference } => {
                assert!(message.starts_with("failed to create physical plan"));
                assert_eq!(reference.as_deref(), Some("897"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_error_after_data_keeps_partial_tables() {
        let csv = format!(
            "{}\n{}",
            TWO_TABLES,
            ERROR_TABLE.replace(",897", ",")
        );
        let err = decode_tables(csv.as_bytes(), ["value1"]).await.unwrap_err();
        assert_eq!(err.tables.len(), 2);
        assert_eq!(err.tables[1].records.len(), 2);
        assert!(matches!(
            err.error,
            Error::QueryError { reference: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_cell_reports_column() {
        let csv = "\
#datatype,string,long,double
#group,false,false,false
#default,_result,,
,result,table,_value
,,0,not-a-number
";
        let err = decode_tables(csv.as_bytes(), ["_value"]).await.unwrap_err();
        assert_eq!(err.tables.len(), 1);
        assert!(matches!(
            err.error,
            Error::MalformedCell { ref column, .. } if column == "_value"
        ));
    }

    #[tokio::test]
    async fn test_missing_annotations() {
        let csv = ",result,table,_value\n,,0,1\n";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        assert!(matches!(
            parser.next().await,
            Err(Error::MissingAnnotation(_))
        ));
    }

    #[tokio::test]
    async fn test_encoded_point_round_trip() {
        let point = Point::builder("weather")
            .tag("city", "A")
            .field("temp", 21.5)
            .field("count", 3i64)
            .field("ok", true)
            .field("note", "sunny")
            .timestamp(1_500_000_000, Precision::Milliseconds)
            .build()
            .unwrap();
        let line = line_protocol::encode(&point, Precision::Milliseconds).unwrap();
        assert_eq!(
            line,
            "weather,city=A count=3i,note=\"sunny\",ok=true,temp=21.5 1500000000"
        );

        // One row per field, the way the server returns a pivoted point
        let csv = format!(
            "\
#datatype,string,long,dateTime:RFC3339,string,string,double,long,boolean,string
#group,false,false,false,true,true,false,false,false,false
#default,_result,,,,,,,,
,result,table,_time,_measurement,city,temp,count,ok,note
,,0,1970-01-18T08:40:00Z,weather,A,{},{},{},{}
",
            21.5, 3, true, "sunny"
        );
        let tables = decode_tables(csv.as_bytes(), ["temp", "count", "ok", "note"])
            .await
            .unwrap();
        let record = &tables[0].records[0];

        assert_eq!(record.measurement().as_deref(), Some(point.measurement()));
        for (key, value) in point.tags() {
            assert_eq!(record.tags.get(key), Some(&Value::String(value.clone())));
        }
        for (key, field) in point.fields() {
            assert!(record.values[key].matches_field(field), "field {key}");
        }
        let ms = record.time().unwrap().timestamp_millis();
        assert_eq!(ms, point.timestamp().unwrap().value);
    }
}
