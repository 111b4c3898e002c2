#![forbid(unsafe_code)]

use csv::ReaderBuilder;
use mq_record::{RawTable, RawValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Decode CSV text into an untyped `RawTable`.
///
/// This is the whole loader boundary: headers are required, every field is
/// inferred int → float → text, and empty fields become `RawValue::Empty`.
/// Semantic typing (dates, ranges, categories) belongs to the normalizer.
pub fn read_csv_str(source: &str, input: &str) -> Result<RawTable, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned().map_err(IoError::from)?;
    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }

    let header_count = headers.len();
    let row_hint = input.len() / (header_count * 8).max(1);
    let mut rows: Vec<Vec<RawValue>> = Vec::with_capacity(row_hint);

    for row in reader.records() {
        let record = row?;
        let fields = (0..header_count)
            .map(|idx| parse_raw(record.get(idx).unwrap_or_default()))
            .collect();
        rows.push(fields);
    }

    let headers = headers.iter().map(str::to_owned).collect();
    Ok(RawTable::new(source, headers, rows))
}

fn parse_raw(field: &str) -> RawValue {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return RawValue::Empty;
    }

    if let Ok(value) = trimmed.parse::<i64>() {
        return RawValue::Int(value);
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return RawValue::Float(value);
    }

    RawValue::Text(trimmed.to_owned())
}
