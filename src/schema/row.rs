//! Hourly, daily and manual row definitions

use serde::{Deserialize, Serialize};

use super::lenient;

/// One row of the hourly feed
///
/// Positional order: timestamp, date, hour, metric, value, min, max, source,
/// raw payload. The raw payload is a JSON document stored as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRow {
    #[serde(deserialize_with = "lenient::text")]
    pub timestamp: String,
    #[serde(deserialize_with = "lenient::text")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub hour: Option<u32>,
    #[serde(deserialize_with = "lenient::text")]
    pub metric: String,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub value: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub min: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub max: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub source: String,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub raw: Option<String>,
}

impl HourlyRow {
    /// Build a scalar row without a payload
    pub fn scalar(timestamp: &str, date: &str, metric: &str, value: f64) -> Self {
        HourlyRow {
            timestamp: timestamp.to_string(),
            date: date.to_string(),
            hour: None,
            metric: metric.to_string(),
            value: Some(value),
            min: None,
            max: None,
            source: String::new(),
            raw: None,
        }
    }

    /// Attach a raw payload document
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

/// One row of the pre-aggregated daily feed
///
/// Written by an upstream ingestion job and used only when the hourly feed has
/// nothing for a given date and metric. Sleep fields are in hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyFeedRow {
    #[serde(deserialize_with = "lenient::text")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub steps: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub avg_heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub min_heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub max_heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub resting_heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub hrv: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub sleep_hours: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub deep_sleep_hours: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub rem_sleep_hours: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub core_sleep_hours: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub awake_hours: Option<f64>,
}

/// A manually entered metric for one date (weight, mood, notes, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualEntry {
    #[serde(deserialize_with = "lenient::text")]
    pub date: String,
    #[serde(deserialize_with = "lenient::text")]
    pub metric: String,
    #[serde(default)]
    pub value: serde_json::Value,
}
