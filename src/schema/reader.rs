//! JSON and NDJSON row readers

use crate::error::ComputeError;
use serde::de::DeserializeOwned;

/// Parse a JSON array of rows
pub fn parse_json_rows<T: DeserializeOwned>(json: &str) -> Result<Vec<T>, ComputeError> {
    let rows: Vec<T> = serde_json::from_str(json)?;
    Ok(rows)
}

/// Parse NDJSON (one row per line); blank lines are skipped
pub fn parse_ndjson_rows<T: DeserializeOwned>(ndjson: &str) -> Result<Vec<T>, ComputeError> {
    let mut rows = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(row) => rows.push(row),
            Err(e) => {
                return Err(ComputeError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(rows)
}
