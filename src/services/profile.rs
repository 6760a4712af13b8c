use anyhow::{Context, Result};
use log::{info, warn};
use polars::io::json::{JsonFormat, JsonWriter};
use polars::prelude::*;
use std::collections::HashMap;

use crate::error::DatasetError;
use crate::models::profile::{ColumnSummary, DatasetProfile};

/// Rows included in the prompt-grounding sample.
const SAMPLE_ROWS: usize = 5;
/// Schema inference window for CSV parsing.
const INFER_SCHEMA_ROWS: usize = 100;
/// How many category values to keep per non-numeric column.
const TOP_VALUES: usize = 10;

/// Decode an uploaded file as UTF-8, falling back to ISO-8859-1.
///
/// ISO-8859-1 itself decodes any byte sequence, so the fallback is
/// stricter than the encoding: payloads carrying control bytes that never
/// appear in delimited text (below 0x09, or between 0x0e and 0x1f) are
/// rejected as binary rather than decoded into garbage columns.
pub fn decode_text(bytes: &[u8]) -> Result<String, DatasetError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => {
            warn!("Upload is not valid UTF-8, retrying with ISO-8859-1");
            if bytes
                .iter()
                .any(|&b| b < 0x09 || (b > 0x0d && b < 0x20))
            {
                return Err(DatasetError::Decoding);
            }
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
    }
}

/// Parse an uploaded delimited text file into a dataframe.
pub fn load_frame(bytes: &[u8]) -> Result<DataFrame, DatasetError> {
    let text = decode_text(bytes)?;
    let cursor = std::io::Cursor::new(text.into_bytes());
    let df = CsvReader::new(cursor)
        .infer_schema(Some(INFER_SCHEMA_ROWS))
        .has_header(true)
        .finish()
        .map_err(|e| DatasetError::Parse(e.to_string()))?;
    info!(
        "Parsed uploaded CSV: {} rows, {} columns",
        df.height(),
        df.width()
    );
    Ok(df)
}

/// Build the read-only profile of a dataframe used to ground prompts.
///
/// Pure function of the table: no side effects, tolerant of columns whose
/// type supports none of the numeric statistics.
pub fn build_profile(df: &DataFrame) -> Result<DatasetProfile> {
    let row_count = df.height();
    let column_count = df.width();
    let shape_text = format!("{} rows, {} columns", row_count, column_count);

    let mut columns = Vec::with_capacity(column_count);
    for s in df.get_columns() {
        columns.push(summarize_column(s)?);
    }

    let sample_rows = sample_as_json(df)?;

    Ok(DatasetProfile {
        row_count,
        column_count,
        shape_text,
        columns,
        sample_rows,
    })
}

fn summarize_column(s: &Series) -> Result<ColumnSummary> {
    let mut summary = ColumnSummary {
        name: s.name().to_string(),
        data_type: dtype_name(s.dtype()).to_string(),
        null_count: s.null_count(),
        unique_count: s.n_unique().unwrap_or(0),
        ..Default::default()
    };

    if is_numeric(s.dtype()) {
        if let Ok(ca) = s.cast(&DataType::Float64)?.f64() {
            summary.min = ca.min().map(|v| v.to_string());
            summary.max = ca.max().map(|v| v.to_string());
            summary.mean = ca.mean().map(|v| format!("{:.2}", v));
            summary.median = ca.median().map(|v| format!("{:.2}", v));
            summary.std_dev = ca.std(1).map(|v| format!("{:.2}", v));
        }
    } else {
        // Non-numeric columns report category frequencies instead; the
        // numeric fields stay None and render as N/A.
        if let Ok(vc) = s.value_counts(true, false) {
            if let (Ok(vals), Ok(cnts)) = (
                vc.column(s.name()).and_then(|c| c.cast(&DataType::Utf8)),
                vc.column("counts"),
            ) {
                if let (Ok(vals), Ok(cnts)) = (vals.utf8(), cnts.u32()) {
                    let mut freq = HashMap::new();
                    for i in 0..vals.len().min(TOP_VALUES) {
                        if let (Some(v), Some(c)) = (vals.get(i), cnts.get(i)) {
                            freq.insert(v.to_string(), c);
                        }
                    }
                    summary.frequent_values = Some(freq);
                }
            }
        }
    }

    Ok(summary)
}

fn sample_as_json(df: &DataFrame) -> Result<serde_json::Value> {
    let mut head = df.head(Some(SAMPLE_ROWS));
    let mut buf = Vec::new();
    JsonWriter::new(&mut buf)
        .with_json_format(JsonFormat::Json)
        .finish(&mut head)
        .context("Failed to write sample rows to JSON")?;
    let json_string =
        std::str::from_utf8(&buf).context("Failed to convert sample JSON to string")?;
    serde_json::from_str(json_string).context("Failed to parse sample JSON")
}

pub(crate) fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn dtype_name(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Boolean => "boolean",
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            "unsigned integer"
        }
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => "integer",
        DataType::Float32 | DataType::Float64 => "float",
        DataType::Utf8 => "string",
        DataType::Date => "date",
        DataType::Datetime(_, _) => "datetime",
        DataType::Time => "time",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> DataFrame {
        DataFrame::new(vec![
            Series::new("name", &["ann", "bob", "cid"]),
            Series::new("age", &[30i64, 40, 50]),
        ])
        .unwrap()
    }

    #[test]
    fn profile_reports_shape_and_types() {
        let profile = build_profile(&people()).unwrap();
        assert_eq!(profile.row_count, 3);
        assert_eq!(profile.column_count, 2);
        assert_eq!(profile.shape_text, "3 rows, 2 columns");
        assert_eq!(profile.columns[0].data_type, "string");
        assert_eq!(profile.columns[1].data_type, "integer");
    }

    #[test]
    fn text_column_statistics_render_not_applicable() {
        let profile = build_profile(&people()).unwrap();
        let name = &profile.columns[0];
        assert!(name.mean.is_none());
        assert!(name.describe().contains("mean=N/A"));
        let age = &profile.columns[1];
        assert_eq!(age.mean.as_deref(), Some("40.00"));
    }

    #[test]
    fn sample_is_limited_to_head_rows() {
        let ids: Vec<i64> = (0..20).collect();
        let df = DataFrame::new(vec![Series::new("id", &ids)]).unwrap();
        let profile = build_profile(&df).unwrap();
        let rows = profile.sample_rows.as_array().unwrap();
        assert_eq!(rows.len(), SAMPLE_ROWS);
    }

    #[test]
    fn utf8_decoding_with_latin1_fallback() {
        assert_eq!(decode_text(b"a,b\n1,2\n").unwrap(), "a,b\n1,2\n");
        // 0xE9 is é in ISO-8859-1 and invalid as a lone UTF-8 byte.
        let decoded = decode_text(b"caf\xe9\n").unwrap();
        assert_eq!(decoded, "café\n");
        assert!(matches!(
            decode_text(&[0x00, 0x01, 0xff]),
            Err(DatasetError::Decoding)
        ));
    }
}
