//! Lenient cell decoding
//!
//! Spreadsheet-like stores return numbers as strings, empty cells as `""` and
//! occasionally thousands separators. These helpers turn all of that into
//! `Option<f64>` / `Option<u32>` / `String` without failing the whole row.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl Cell {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Number(_) => None,
            Cell::Text(text) => {
                let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
                if cleaned.is_empty() {
                    return None;
                }
                cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            Cell::Flag(_) => None,
        }
    }
}

/// Decode an optional number from a number, numeric string, empty string or null
pub(crate) fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let cell = Option::<Cell>::deserialize(deserializer)?;
    Ok(cell.and_then(|c| c.as_f64()))
}

/// Decode an optional non-negative whole number
pub(crate) fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = opt_f64(deserializer)?;
    Ok(value.and_then(|v| {
        if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 {
            Some(v as u32)
        } else {
            None
        }
    }))
}

/// Decode a text cell, rendering numbers and booleans as text and null as ""
pub(crate) fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let cell = Option::<Cell>::deserialize(deserializer)?;
    Ok(match cell {
        Some(Cell::Text(text)) => text,
        Some(Cell::Number(n)) => n.to_string(),
        Some(Cell::Flag(b)) => b.to_string(),
        None => String::new(),
    })
}

/// Decode an optional text cell; empty strings become `None`
pub(crate) fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = text(deserializer)?;
    Ok(if value.trim().is_empty() { None } else { Some(value) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Cells {
        #[serde(default, deserialize_with = "opt_f64")]
        value: Option<f64>,
        #[serde(default, deserialize_with = "opt_u32")]
        hour: Option<u32>,
        #[serde(default, deserialize_with = "text")]
        label: String,
    }

    fn cells(json: &str) -> Cells {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_numbers_and_numeric_strings() {
        assert_eq!(cells(r#"{"value": 72.5}"#).value, Some(72.5));
        assert_eq!(cells(r#"{"value": "72.5"}"#).value, Some(72.5));
        assert_eq!(cells(r#"{"value": " 1,204 "}"#).value, Some(1204.0));
    }

    #[test]
    fn test_empty_and_garbage_cells_are_none() {
        assert_eq!(cells(r#"{"value": ""}"#).value, None);
        assert_eq!(cells(r#"{"value": null}"#).value, None);
        assert_eq!(cells(r#"{"value": "n/a"}"#).value, None);
        assert_eq!(cells(r#"{}"#).value, None);
    }

    #[test]
    fn test_hour_must_be_whole() {
        assert_eq!(cells(r#"{"hour": "23"}"#).hour, Some(23));
        assert_eq!(cells(r#"{"hour": 7}"#).hour, Some(7));
        assert_eq!(cells(r#"{"hour": 7.5}"#).hour, None);
        assert_eq!(cells(r#"{"hour": -1}"#).hour, None);
    }

    #[test]
    fn test_text_accepts_numbers() {
        assert_eq!(cells(r#"{"label": 42}"#).label, "42");
        assert_eq!(cells(r#"{"label": null}"#).label, "");
    }
}
