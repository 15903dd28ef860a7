//! Summary encoding
//!
//! Wraps a request's day records in a versioned payload carrying producer
//! metadata, so consumers can tell which build and which instance computed it.

use crate::diagnostics::DiagnosticCounts;
use crate::error::ComputeError;
use crate::pipeline::DailySummary;
use crate::types::{DateRange, DayRecord};
use crate::{DAILY_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current summary payload schema version
pub const SUMMARY_VERSION: &str = "1.0.0";

/// Who computed a payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Versioned envelope around a range of day records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub version: String,
    pub producer: SummaryProducer,
    pub computed_at_utc: String,
    pub range: DateRange,
    pub days: Vec<DayRecord>,
    pub diagnostics: DiagnosticCounts,
}

/// Encoder for summary payloads
pub struct SummaryEncoder {
    instance_id: String,
}

impl Default for SummaryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(&self, summary: &DailySummary) -> SummaryPayload {
        SummaryPayload {
            version: SUMMARY_VERSION.to_string(),
            producer: SummaryProducer {
                name: PRODUCER_NAME.to_string(),
                version: DAILY_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            range: summary.range,
            days: summary.days.clone(),
            diagnostics: summary.diagnostics.clone(),
        }
    }

    /// Encode to pretty JSON
    pub fn encode_to_json(&self, summary: &DailySummary) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(&self.encode(summary)).map_err(ComputeError::JsonError)
    }

    /// Encode each day as one compact JSON line
    pub fn encode_to_ndjson(&self, summary: &DailySummary) -> Result<String, ComputeError> {
        let mut out = String::new();
        for day in &summary.days {
            out.push_str(&serde_json::to_string(day).map_err(ComputeError::JsonError)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HeartRateStats, QualityFlag};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn make_summary() -> DailySummary {
        let date = NaiveDate::from_ymd_opt(2026, 1, 29).unwrap();
        DailySummary {
            range: DateRange::single(date),
            days: vec![DayRecord {
                date,
                steps: Some(8412),
                heart_rate: Some(HeartRateStats {
                    avg: 64.2,
                    min: 48.0,
                    max: 131.0,
                    count: 240,
                }),
                heart_rate_distribution: None,
                sleep: None,
                heart_rate_variability: None,
                resting_heart_rate: None,
                manual: BTreeMap::new(),
                flags: vec![QualityFlag::DailyFeedFallback],
            }],
            diagnostics: DiagnosticCounts {
                rows_read: 240,
                ..DiagnosticCounts::default()
            },
        }
    }

    #[test]
    fn test_encode_summary_payload() {
        let encoder = SummaryEncoder::with_instance_id("test-instance".to_string());
        let payload = encoder.encode(&make_summary());

        assert_eq!(payload.version, SUMMARY_VERSION);
        assert_eq!(payload.producer.name, PRODUCER_NAME);
        assert_eq!(payload.producer.version, DAILY_VERSION);
        assert_eq!(payload.producer.instance_id, "test-instance");
        assert_eq!(payload.days.len(), 1);
        assert_eq!(payload.diagnostics.rows_read, 240);
    }

    #[test]
    fn test_encode_to_json_shape() {
        let json = SummaryEncoder::new().encode_to_json(&make_summary()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["range"]["from"], "2026-01-29");
        assert_eq!(parsed["days"][0]["steps"], 8412);
        assert!(parsed["days"][0]["sleep"].is_null());
        assert_eq!(parsed["days"][0]["flags"][0], "daily_feed_fallback");
        assert!(parsed.get("computed_at_utc").is_some());
    }

    #[test]
    fn test_encode_to_ndjson() {
        let ndjson = SummaryEncoder::new().encode_to_ndjson(&make_summary()).unwrap();
        assert_eq!(ndjson.lines().count(), 1);
        let day: DayRecord = serde_json::from_str(ndjson.trim()).unwrap();
        assert_eq!(day.steps, Some(8412));
    }
}
