//! Raw event parsing
//!
//! Turns hourly rows into typed [`Reading`]s. The payload column is decoded
//! once here and mapped onto a tagged [`Payload`]; later stages never look at
//! the raw JSON again.
//!
//! A reading is only dropped when it cannot be placed on any day. Undecodable
//! payloads leave the reading in place with an empty payload so its scalar
//! value still counts.

use crate::diagnostics::Diagnostics;
use crate::error::ComputeError;
use crate::schema::lenient;
use crate::schema::HourlyRow;
use crate::timestamp::{parse_calendar_date, TimestampNormalizer};
use crate::types::{
    AggregatedSleepSession, MetricKind, Payload, QualityFlag, Reading, SleepStageEvent,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};

/// Payload of a `sleep_stage` row
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageWire {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    stage: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    duration_mins: Option<f64>,
}

/// Payload of a `sleep_analysis` row; durations are in hours
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionWire {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    sleep_start: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    sleep_end: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    total_sleep: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    awake: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    deep: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    rem: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    core: Option<f64>,
}

fn hours_to_minutes(hours: Option<f64>) -> Option<f64> {
    hours.map(|h| h * 60.0)
}

/// Parser for hourly rows
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadingParser {
    normalizer: TimestampNormalizer,
}

impl ReadingParser {
    pub fn new(normalizer: TimestampNormalizer) -> Self {
        Self { normalizer }
    }

    /// Parse a batch of rows, recording local failures in `diagnostics`
    pub fn parse_rows(&self, rows: &[HourlyRow], diagnostics: &mut Diagnostics) -> Vec<Reading> {
        diagnostics.counts_mut().rows_read += rows.len();

        let readings: Vec<Reading> = rows
            .iter()
            .filter_map(|row| self.parse_row(row, diagnostics))
            .collect();

        debug!(
            rows = rows.len(),
            readings = readings.len(),
            "parsed hourly rows"
        );
        readings
    }

    /// Parse one row. Returns `None` only when the row cannot be placed on a day.
    pub fn parse_row(&self, row: &HourlyRow, diagnostics: &mut Diagnostics) -> Option<Reading> {
        let metric_kind = MetricKind::from_name(&row.metric);
        let calendar_date = parse_calendar_date(&row.date).ok();

        let timestamp = match self.normalizer.parse(&row.timestamp) {
            Ok(ts) => Some(ts),
            Err(e) => {
                diagnostics.counts_mut().unparseable_timestamps += 1;
                diagnostics.flag(calendar_date, QualityFlag::UnparseableTimestamp);
                debug!(metric = metric_kind.as_str(), error = %e, "timestamp dropped");
                None
            }
        };

        let day = calendar_date.or_else(|| timestamp.map(|ts| ts.date_naive()));
        if day.is_none() {
            diagnostics.counts_mut().unplaceable_rows += 1;
            warn!(
                timestamp = %row.timestamp,
                date = %row.date,
                "row has no usable date, skipping"
            );
            return None;
        }

        let (raw_payload, decoded) = decode_raw(row.raw.as_deref());
        if !decoded {
            diagnostics.counts_mut().malformed_payloads += 1;
            diagnostics.flag(day, QualityFlag::MalformedPayload);
            warn!(metric = metric_kind.as_str(), "raw payload is not valid JSON");
        }

        let payload = match metric_kind {
            MetricKind::SleepStage if decoded => {
                self.typed_payload(self.decode_stage(&raw_payload), day, diagnostics)
            }
            MetricKind::SleepAnalysis if decoded => {
                self.typed_payload(self.decode_session(&raw_payload), day, diagnostics)
            }
            _ => Payload::Opaque,
        };

        Some(Reading {
            timestamp,
            calendar_date,
            hour_of_day: row.hour,
            metric_kind,
            value: row.value,
            min_value: row.min,
            max_value: row.max,
            source: row.source.clone(),
            raw_payload,
            payload,
        })
    }

    fn typed_payload(
        &self,
        decoded: Result<Payload, ComputeError>,
        day: Option<NaiveDate>,
        diagnostics: &mut Diagnostics,
    ) -> Payload {
        match decoded {
            Ok(payload) => payload,
            Err(e) => {
                let counts = diagnostics.counts_mut();
                let flag = match e {
                    ComputeError::UnparseableTimestamp(_) => {
                        counts.unparseable_timestamps += 1;
                        QualityFlag::UnparseableTimestamp
                    }
                    ComputeError::InvalidInterval { .. } => {
                        counts.invalid_intervals += 1;
                        QualityFlag::MalformedPayload
                    }
                    _ => {
                        counts.malformed_payloads += 1;
                        QualityFlag::MalformedPayload
                    }
                };
                diagnostics.flag(day, flag);
                warn!(error = %e, "sleep payload not usable, keeping reading as scalar");
                Payload::Opaque
            }
        }
    }

    fn decode_stage(&self, raw: &serde_json::Value) -> Result<Payload, ComputeError> {
        let wire: StageWire = serde_json::from_value(raw.clone())
            .map_err(|e| ComputeError::MalformedPayload(e.to_string()))?;

        let (start, end, label) = match (wire.start_date, wire.end_date, wire.stage) {
            (Some(start), Some(end), Some(stage)) => (start, end, stage),
            _ => {
                return Err(ComputeError::MalformedPayload(
                    "stage payload needs startDate, endDate and stage".to_string(),
                ))
            }
        };

        let start = self.normalizer.parse(&start)?;
        let end = self.normalizer.parse(&end)?;
        if start >= end {
            return Err(ComputeError::InvalidInterval {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }

        Ok(Payload::Stage(SleepStageEvent {
            reported_duration_minutes: wire.duration_mins,
            ..SleepStageEvent::new(start, end, &label)
        }))
    }

    fn decode_session(&self, raw: &serde_json::Value) -> Result<Payload, ComputeError> {
        let wire: SessionWire = serde_json::from_value(raw.clone())
            .map_err(|e| ComputeError::MalformedPayload(e.to_string()))?;

        let (start, end, total_hours) = match (wire.sleep_start, wire.sleep_end, wire.total_sleep)
        {
            (Some(start), Some(end), Some(total)) => (start, end, total),
            _ => {
                return Err(ComputeError::MalformedPayload(
                    "session payload needs sleepStart, sleepEnd and totalSleep".to_string(),
                ))
            }
        };

        let start = self.normalizer.parse(&start)?;
        let end = self.normalizer.parse(&end)?;
        if start >= end {
            return Err(ComputeError::InvalidInterval {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }

        Ok(Payload::Session(AggregatedSleepSession {
            start,
            end,
            total_sleep_minutes: total_hours * 60.0,
            awake_minutes: hours_to_minutes(wire.awake),
            deep_minutes: hours_to_minutes(wire.deep),
            rem_minutes: hours_to_minutes(wire.rem),
            core_minutes: hours_to_minutes(wire.core),
        }))
    }
}

/// Decode the payload column. Returns the value and whether decoding succeeded;
/// an absent column counts as success with an empty object.
fn decode_raw(raw: Option<&str>) -> (serde_json::Value, bool) {
    let empty = || serde_json::Value::Object(serde_json::Map::new());
    match raw {
        None => (empty(), true),
        Some(text) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value @ serde_json::Value::Object(_)) => (value, true),
            Ok(_) | Err(_) => (empty(), false),
        },
    }
}

/// Stage events carried by parsed readings, in input order
pub fn stage_events(readings: &[Reading]) -> Vec<SleepStageEvent> {
    readings
        .iter()
        .filter_map(|r| match &r.payload {
            Payload::Stage(event) => Some(event.clone()),
            _ => None,
        })
        .collect()
}

/// Aggregated sessions carried by parsed readings, in input order
pub fn sleep_sessions(readings: &[Reading]) -> Vec<AggregatedSleepSession> {
    readings
        .iter()
        .filter_map(|r| match &r.payload {
            Payload::Session(session) => Some(session.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SleepStage;
    use pretty_assertions::assert_eq;

    fn parse(row: HourlyRow) -> (Option<Reading>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let reading = ReadingParser::default().parse_row(&row, &mut diagnostics);
        (reading, diagnostics)
    }

    #[test]
    fn test_parse_stage_row() {
        let row = HourlyRow::scalar("2026-01-28 22:30:00 +0000", "1/28/2026", "sleep_stage", 30.0)
            .with_raw(
                r#"{"startDate":"2026-01-28 22:30:00 +0000","endDate":"2026-01-28 23:00:00 +0000","stage":"core","durationMins":30}"#,
            );
        let (reading, diagnostics) = parse(row);
        let reading = reading.unwrap();

        match reading.payload {
            Payload::Stage(event) => {
                assert_eq!(event.stage, SleepStage::Core);
                assert_eq!(event.label, "core");
                assert_eq!(event.duration_minutes(), 30.0);
                assert_eq!(event.reported_duration_minutes, Some(30.0));
            }
            other => panic!("expected stage payload, got {other:?}"),
        }
        assert_eq!(diagnostics.counts().malformed_payloads, 0);
    }

    #[test]
    fn test_parse_session_row_converts_hours() {
        let row = HourlyRow::scalar("2026-01-29T07:00:00Z", "2026-01-29", "sleep_analysis", 7.0)
            .with_raw(
                r#"{"sleepStart":"2026-01-28T23:00:00Z","sleepEnd":"2026-01-29T07:00:00Z","totalSleep":7,"awake":"0.5","deep":1.25,"rem":1.5}"#,
            );
        let (reading, _) = parse(row);

        match reading.unwrap().payload {
            Payload::Session(session) => {
                assert_eq!(session.total_sleep_minutes, 420.0);
                assert_eq!(session.awake_minutes, Some(30.0));
                assert_eq!(session.deep_minutes, Some(75.0));
                assert_eq!(session.rem_minutes, Some(90.0));
                assert_eq!(session.core_minutes, None);
                assert_eq!(session.window_minutes(), 480.0);
            }
            other => panic!("expected session payload, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_payload_keeps_reading() {
        let row = HourlyRow::scalar("2026-01-28T10:00:00Z", "2026-01-28", "step_count", 120.0)
            .with_raw("{not json");
        let (reading, diagnostics) = parse(row);
        let reading = reading.unwrap();

        assert_eq!(reading.value, Some(120.0));
        assert_eq!(reading.raw_payload, serde_json::json!({}));
        assert_eq!(reading.payload, Payload::Opaque);
        assert_eq!(diagnostics.counts().malformed_payloads, 1);
        assert_eq!(
            diagnostics.flags_for(NaiveDate::from_ymd_opt(2026, 1, 28).unwrap()),
            vec![QualityFlag::MalformedPayload]
        );
    }

    #[test]
    fn test_unparseable_timestamp_keeps_scalar_value() {
        let row = HourlyRow::scalar("sometime", "1/28/2026", "step_count", 300.0);
        let (reading, diagnostics) = parse(row);
        let reading = reading.unwrap();

        assert_eq!(reading.timestamp, None);
        assert_eq!(reading.day(), NaiveDate::from_ymd_opt(2026, 1, 28));
        assert_eq!(diagnostics.counts().unparseable_timestamps, 1);
    }

    #[test]
    fn test_unplaceable_row_is_dropped() {
        let row = HourlyRow::scalar("sometime", "someday", "step_count", 300.0);
        let (reading, diagnostics) = parse(row);
        assert!(reading.is_none());
        assert_eq!(diagnostics.counts().unplaceable_rows, 1);
    }

    #[test]
    fn test_stage_with_bad_times_becomes_opaque() {
        let row = HourlyRow::scalar("2026-01-28T10:00:00Z", "2026-01-28", "sleep_stage", 0.0)
            .with_raw(r#"{"startDate":"garbage","endDate":"2026-01-28T10:00:00Z","stage":"deep"}"#);
        let (reading, diagnostics) = parse(row);
        assert_eq!(reading.unwrap().payload, Payload::Opaque);
        assert_eq!(diagnostics.counts().unparseable_timestamps, 1);

        let row = HourlyRow::scalar("2026-01-28T10:00:00Z", "2026-01-28", "sleep_stage", 0.0)
            .with_raw(r#"{"startDate":"2026-01-28T10:00:00Z","endDate":"2026-01-28T09:00:00Z","stage":"deep"}"#);
        let (reading, diagnostics) = parse(row);
        assert_eq!(reading.unwrap().payload, Payload::Opaque);
        assert_eq!(diagnostics.counts().invalid_intervals, 1);
    }

    #[test]
    fn test_extract_events_and_sessions() {
        let mut diagnostics = Diagnostics::new();
        let rows = vec![
            HourlyRow::scalar("2026-01-28T22:00:00Z", "2026-01-28", "heart_rate", 58.0),
            HourlyRow::scalar("2026-01-28T22:30:00Z", "2026-01-28", "sleep_stage", 0.0).with_raw(
                r#"{"startDate":"2026-01-28T22:30:00Z","endDate":"2026-01-28T23:00:00Z","stage":"rem"}"#,
            ),
            HourlyRow::scalar("2026-01-29T07:00:00Z", "2026-01-29", "sleep_analysis", 0.0).with_raw(
                r#"{"sleepStart":"2026-01-28T23:00:00Z","sleepEnd":"2026-01-29T07:00:00Z","totalSleep":7}"#,
            ),
        ];
        let readings = ReadingParser::default().parse_rows(&rows, &mut diagnostics);

        assert_eq!(readings.len(), 3);
        assert_eq!(stage_events(&readings).len(), 1);
        assert_eq!(sleep_sessions(&readings).len(), 1);
        assert_eq!(diagnostics.counts().rows_read, 3);
    }
}
