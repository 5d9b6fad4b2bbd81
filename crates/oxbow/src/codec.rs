//! Row codec for the flat archive format
//!
//! Converts database row values into the comma-delimited archive text and
//! back. The format is fixed: every field double-quoted regardless of
//! content, `\n` record terminators, first record the uppercased column
//! names. Timestamps are written as ISO-8601 with millisecond precision
//! and a literal `Z` suffix; nested values are written as canonical JSON
//! text (the CSV layer doubles any embedded quotes).
//!
//! The decode direction is a *normalization* pass used by restore: records
//! are read honoring embedded quoted delimiters and newlines, then
//! re-emitted with the same enforced quoting so the output is always a
//! valid load file. Records this codec produced normalize losslessly;
//! malformed records are skipped with a warning rather than failing the
//! whole restore.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use diagnostics::emit;
use diagnostics::log_warn;
use std::io::{Read, Write};

use crate::{ArchiveError, Result};

/// One column value in transit between the database and the archive text.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    /// Timezone-naive timestamp, formatted as-is with a `Z` suffix.
    Timestamp(NaiveDateTime),
    /// Timezone-aware timestamp, converted to UTC before formatting.
    TimestampTz(DateTime<Utc>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
}

/// An ordered row, positionally aligned with its table's column schema.
pub type Row = Vec<Field>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Render one field as archive text. Nulls become the empty field.
pub fn encode_field(field: &Field) -> Result<String> {
    Ok(match field {
        Field::Null => String::new(),
        Field::Bool(b) => b.to_string(),
        Field::Int(n) => n.to_string(),
        Field::Float(x) => x.to_string(),
        Field::Text(s) => s.clone(),
        Field::Date(d) => d.format("%Y-%m-%d").to_string(),
        Field::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        Field::TimestampTz(ts) => ts.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string(),
        Field::Uuid(u) => u.to_string(),
        Field::Json(v) => serde_json::to_string(v)?,
    })
}

/// The archive header record: column names, uppercased.
pub fn header_record(columns: &[String]) -> Vec<String> {
    columns.iter().map(|c| c.to_uppercase()).collect()
}

fn archive_writer<W: Write>(out: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out)
}

/// Serialize a header plus one record per row into archive text.
///
/// Fails if any row's width disagrees with the column schema; the batch
/// selector hands us full rows, so a mismatch here is a codec or schema
/// bug and must not reach object storage.
pub fn serialize_batch(columns: &[String], rows: &[Row]) -> Result<Vec<u8>> {
    let mut w = archive_writer(Vec::new());
    w.write_record(header_record(columns))?;
    for row in rows {
        if row.len() != columns.len() {
            return Err(ArchiveError::MalformedBatch(format!(
                "row has {} fields, schema has {} columns",
                row.len(),
                columns.len()
            )));
        }
        let fields = row.iter().map(encode_field).collect::<Result<Vec<_>>>()?;
        w.write_record(&fields)?;
    }
    w.flush()?;
    w.into_inner()
        .map_err(|e| ArchiveError::MalformedBatch(format!("could not finish batch: {}", e)))
}

/// Outcome of a normalization pass over one archive.
#[derive(Debug)]
pub struct NormalizeReport {
    /// Header columns, exactly as stored in the archive.
    pub columns: Vec<String>,
    /// Data records written to the canonical output.
    pub records: u64,
    /// Malformed records dropped with a warning.
    pub skipped: u64,
}

/// Re-read archive text and re-emit it with canonical quoting.
///
/// The reader tolerates ragged records (`flexible`); anything whose width
/// disagrees with the header, or that the reader cannot parse at all, is
/// skipped with a warning. Everything else passes through unchanged.
pub fn normalize<R: Read, W: Write>(input: R, output: W) -> Result<NormalizeReport> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut writer = archive_writer(output);

    let mut records_iter = reader.records();
    let header = match records_iter.next() {
        Some(record) => record?,
        None => {
            return Err(ArchiveError::MalformedBatch(
                "archive is empty: no header record".to_string(),
            ));
        }
    };
    let columns: Vec<String> = header.iter().map(|c| c.to_string()).collect();
    writer.write_record(&header)?;

    let mut report = NormalizeReport {
        columns,
        records: 0,
        skipped: 0,
    };
    for record in records_iter {
        match record {
            Ok(rec) if rec.len() == report.columns.len() => {
                writer.write_record(&rec)?;
                report.records += 1;
            }
            Ok(rec) => {
                log_warn!(
                    "skipping record with {actual} fields, expected {expected}",
                    actual: rec.len(),
                    expected: report.columns.len()
                );
                report.skipped += 1;
            }
            Err(err) => {
                log_warn!("skipping unreadable record: {err}", err: err.to_string().as_str());
                report.skipped += 1;
            }
        }
    }
    writer.flush()?;
    Ok(report)
}
