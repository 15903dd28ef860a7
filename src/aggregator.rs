//! Daily aggregation
//!
//! Groups everything that survived parsing, dedup and resolution by calendar
//! date and folds it into one [`DayRecord`] per date in the requested range.
//! Missing metrics stay `None`; they are never reported as zero.

use crate::attribution::{attribute_date, clip_session, StageTotals};
use crate::diagnostics::Diagnostics;
use crate::distribution;
use crate::schema::{DailyFeedRow, ManualEntry};
use crate::timestamp::parse_calendar_date;
use crate::types::{
    AggregatedSleepSession, DateRange, DayRecord, HeartRateStats, MeanSummary, MetricKind,
    QualityFlag, Reading, SleepComposition, SleepSource,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, warn};

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn whole(minutes: f64) -> i64 {
    minutes.round() as i64
}

fn mean(values: &[f64]) -> Option<MeanSummary> {
    if values.is_empty() {
        return None;
    }
    Some(MeanSummary {
        avg: round1(values.iter().sum::<f64>() / values.len() as f64),
        count: values.len(),
    })
}

/// Core minutes left after the known components. Stage totals count sleep
/// stages only, so their awake minutes are not part of the total.
fn derived_core(sleep: &SleepComposition) -> i64 {
    let awake = match sleep.source {
        SleepSource::Stages => 0,
        SleepSource::Session | SleepSource::DailyFeed => sleep.awake_minutes.unwrap_or(0),
    };
    (sleep.total_minutes - sleep.deep_minutes.unwrap_or(0) - sleep.rem_minutes.unwrap_or(0) - awake)
        .max(0)
}

/// Everything collected for one date
#[derive(Debug, Default)]
struct DayAccumulator {
    steps: Option<f64>,
    hr_values: Vec<f64>,
    hr_min: Option<f64>,
    hr_max: Option<f64>,
    hrv_values: Vec<f64>,
    resting_values: Vec<f64>,
    stages: Option<StageTotals>,
    session: Option<AggregatedSleepSession>,
    daily: Option<DailyFeedRow>,
    manual: BTreeMap<String, serde_json::Value>,
}

impl DayAccumulator {
    fn add_reading(&mut self, reading: &Reading) {
        let Some(value) = reading.value.filter(|v| v.is_finite()) else {
            return;
        };

        match reading.metric_kind {
            MetricKind::StepCount => {
                self.steps = Some(self.steps.unwrap_or(0.0) + value);
            }
            MetricKind::HeartRate => {
                self.hr_values.push(value);
                let low = reading.min_value.map_or(value, |m| m.min(value));
                let high = reading.max_value.map_or(value, |m| m.max(value));
                self.hr_min = Some(self.hr_min.map_or(low, |m| m.min(low)));
                self.hr_max = Some(self.hr_max.map_or(high, |m| m.max(high)));
            }
            MetricKind::HeartRateVariability => self.hrv_values.push(value),
            MetricKind::RestingHeartRate => self.resting_values.push(value),
            // Sleep rows are handled through their typed payloads
            MetricKind::SleepAnalysis | MetricKind::SleepStage | MetricKind::Other(_) => {}
        }
    }

    fn heart_rate(&self) -> Option<HeartRateStats> {
        let (min, max) = (self.hr_min?, self.hr_max?);
        let mean = mean(&self.hr_values)?;
        Some(HeartRateStats {
            avg: mean.avg,
            min,
            max,
            count: mean.count,
        })
    }

    fn stage_sleep(&self) -> Option<SleepComposition> {
        let stages = self.stages.as_ref().filter(|s| s.sleep_minutes > 0.0)?;
        Some(SleepComposition {
            total_minutes: whole(stages.sleep_minutes),
            deep_minutes: stages.has_deep.then(|| whole(stages.deep_minutes)),
            rem_minutes: stages.has_rem.then(|| whole(stages.rem_minutes)),
            core_minutes: stages.has_core.then(|| whole(stages.core_minutes)),
            awake_minutes: stages.has_awake.then(|| whole(stages.awake_minutes)),
            window_minutes: None,
            source: SleepSource::Stages,
        })
    }

    fn session_sleep(&self) -> Option<SleepComposition> {
        let session = self.session.as_ref()?;
        Some(SleepComposition {
            total_minutes: whole(session.total_sleep_minutes),
            deep_minutes: session.deep_minutes.map(whole),
            rem_minutes: session.rem_minutes.map(whole),
            core_minutes: session.core_minutes.map(whole),
            awake_minutes: session.awake_minutes.map(whole),
            window_minutes: Some(whole(session.resolved_minutes())),
            source: SleepSource::Session,
        })
    }

    fn feed_sleep(&self) -> Option<SleepComposition> {
        let feed = self.daily.as_ref()?;
        let hours = |h: Option<f64>| h.map(|h| whole(h * 60.0));
        Some(SleepComposition {
            total_minutes: hours(feed.sleep_hours)?,
            deep_minutes: hours(feed.deep_sleep_hours),
            rem_minutes: hours(feed.rem_sleep_hours),
            core_minutes: hours(feed.core_sleep_hours),
            awake_minutes: hours(feed.awake_hours),
            window_minutes: None,
            source: SleepSource::DailyFeed,
        })
    }

    fn finish(self, date: NaiveDate, diagnostics: &mut Diagnostics) -> DayRecord {
        let feed = self.daily.as_ref();
        let mut fell_back = false;

        let steps = match self.steps {
            Some(total) => Some(total.round() as i64),
            None => feed.and_then(|f| f.steps).map(|s| {
                fell_back = true;
                s.round() as i64
            }),
        };

        let heart_rate = self.heart_rate().or_else(|| {
            let f = feed?;
            let avg = f.avg_heart_rate?;
            fell_back = true;
            Some(HeartRateStats {
                avg: round1(avg),
                min: f.min_heart_rate.unwrap_or(avg),
                max: f.max_heart_rate.unwrap_or(avg),
                count: 0,
            })
        });

        let heart_rate_variability = mean(&self.hrv_values).or_else(|| {
            let hrv = feed?.hrv?;
            fell_back = true;
            Some(MeanSummary {
                avg: round1(hrv),
                count: 0,
            })
        });

        let resting_heart_rate = mean(&self.resting_values).or_else(|| {
            let resting = feed?.resting_heart_rate?;
            fell_back = true;
            Some(MeanSummary {
                avg: round1(resting),
                count: 0,
            })
        });

        let mut sleep = self.stage_sleep().or_else(|| self.session_sleep());
        if sleep.is_none() {
            sleep = self.feed_sleep();
            fell_back |= sleep.is_some();
        }
        if let Some(composition) = sleep.as_mut() {
            if composition.core_minutes.is_none() {
                let core = derived_core(composition);
                composition.core_minutes = Some(core);
                diagnostics.flag(Some(date), QualityFlag::DerivedCoreSleep);
            }
        }

        if fell_back {
            diagnostics.flag(Some(date), QualityFlag::DailyFeedFallback);
        }

        DayRecord {
            date,
            steps,
            heart_rate,
            heart_rate_distribution: distribution::summarize(&self.hr_values),
            sleep,
            heart_rate_variability,
            resting_heart_rate,
            manual: self.manual,
            flags: diagnostics.flags_for(date),
        }
    }
}

/// Request-scoped accumulator that produces one record per date in a range
#[derive(Debug)]
pub struct DailyAggregator {
    range: DateRange,
    days: BTreeMap<NaiveDate, DayAccumulator>,
}

impl DailyAggregator {
    pub fn new(range: DateRange) -> Self {
        let days = range.days().map(|d| (d, DayAccumulator::default())).collect();
        Self { range, days }
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    fn day_mut(&mut self, date: NaiveDate) -> Option<&mut DayAccumulator> {
        self.days.get_mut(&date)
    }

    /// Add scalar readings, bucketed by their calendar date
    pub fn add_readings(&mut self, readings: &[Reading]) {
        for reading in readings {
            if let Some(day) = reading.day().and_then(|d| self.day_mut(d)) {
                day.add_reading(reading);
            }
        }
    }

    /// Add clipped stage totals per attributed date
    pub fn add_stage_totals(&mut self, totals: BTreeMap<NaiveDate, StageTotals>) {
        for (date, day_totals) in totals {
            if let Some(day) = self.day_mut(date) {
                day.stages = Some(day_totals);
            }
        }
    }

    /// Add an authoritative session, clipped to the day of its end. When
    /// several end on the same date the one with the longest resolved window
    /// is kept.
    pub fn add_session(&mut self, session: &AggregatedSleepSession) {
        let session = clip_session(session);
        let date = attribute_date(session.end);
        let Some(day) = self.day_mut(date) else {
            return;
        };
        let replace = day
            .session
            .as_ref()
            .map_or(true, |current| session.resolved_minutes() > current.resolved_minutes());
        if replace {
            day.session = Some(session);
        }
    }

    /// Add pre-aggregated rows; later rows for a date replace earlier ones
    pub fn add_daily_feed(&mut self, rows: &[DailyFeedRow]) {
        for row in rows {
            match parse_calendar_date(&row.date) {
                Ok(date) => {
                    if let Some(day) = self.day_mut(date) {
                        day.daily = Some(row.clone());
                    }
                }
                Err(e) => warn!(error = %e, "daily feed row skipped"),
            }
        }
    }

    /// Add manual entries; the last entry for a metric wins
    pub fn add_manual(&mut self, entries: &[ManualEntry]) {
        for entry in entries {
            match parse_calendar_date(&entry.date) {
                Ok(date) => {
                    if let Some(day) = self.day_mut(date) {
                        day.manual.insert(entry.metric.clone(), entry.value.clone());
                    }
                }
                Err(e) => warn!(error = %e, metric = %entry.metric, "manual entry skipped"),
            }
        }
    }

    /// Produce one record per date, in date order
    pub fn finish(self, diagnostics: &mut Diagnostics) -> Vec<DayRecord> {
        let records: Vec<DayRecord> = self
            .days
            .into_iter()
            .map(|(date, day)| day.finish(date, diagnostics))
            .collect();

        debug!(
            days = records.len(),
            with_data = records.iter().filter(|r| r.has_data()).count(),
            "aggregated day records"
        );
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::stage_totals_by_day;
    use crate::types::{Payload, SleepStageEvent};
    use chrono::{DateTime, FixedOffset};
    use pretty_assertions::assert_eq;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn reading(at: &str, metric: MetricKind, value: f64) -> Reading {
        let at = ts(at);
        Reading {
            timestamp: Some(at),
            calendar_date: Some(at.date_naive()),
            hour_of_day: None,
            metric_kind: metric,
            value: Some(value),
            min_value: None,
            max_value: None,
            source: String::new(),
            raw_payload: serde_json::json!({}),
            payload: Payload::Opaque,
        }
    }

    fn session(start: &str, end: &str, total: f64, awake: Option<f64>) -> AggregatedSleepSession {
        AggregatedSleepSession {
            start: ts(start),
            end: ts(end),
            total_sleep_minutes: total,
            awake_minutes: awake,
            deep_minutes: Some(60.0),
            rem_minutes: Some(90.0),
            core_minutes: None,
        }
    }

    fn aggregator(from: u32, to: u32) -> DailyAggregator {
        DailyAggregator::new(DateRange::new(date(from), date(to)).unwrap())
    }

    #[test]
    fn test_one_record_per_date_with_nulls() {
        let mut agg = aggregator(28, 30);
        agg.add_readings(&[reading("2026-01-29T10:00:00Z", MetricKind::StepCount, 500.0)]);
        let records = agg.finish(&mut Diagnostics::new());

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].steps, None);
        assert_eq!(records[1].steps, Some(500));
        assert_eq!(records[1].heart_rate, None);
        assert_eq!(records[1].sleep, None);
        assert!(!records[2].has_data());
    }

    #[test]
    fn test_scalar_metrics() {
        let mut agg = aggregator(28, 28);
        let mut with_extremes = reading("2026-01-28T09:00:00Z", MetricKind::HeartRate, 70.0);
        with_extremes.min_value = Some(52.0);
        with_extremes.max_value = Some(131.0);
        agg.add_readings(&[
            reading("2026-01-28T08:00:00Z", MetricKind::StepCount, 1200.0),
            reading("2026-01-28T09:00:00Z", MetricKind::StepCount, 800.0),
            reading("2026-01-28T08:00:00Z", MetricKind::HeartRate, 60.0),
            with_extremes,
            reading("2026-01-28T06:00:00Z", MetricKind::HeartRateVariability, 40.0),
            reading("2026-01-28T07:00:00Z", MetricKind::HeartRateVariability, 45.0),
            reading("2026-01-28T06:00:00Z", MetricKind::RestingHeartRate, 51.0),
        ]);
        let record = agg.finish(&mut Diagnostics::new()).remove(0);

        assert_eq!(record.steps, Some(2000));
        assert_eq!(
            record.heart_rate,
            Some(HeartRateStats {
                avg: 65.0,
                min: 52.0,
                max: 131.0,
                count: 2
            })
        );
        assert_eq!(record.heart_rate_distribution.unwrap().count, 2);
        assert_eq!(record.heart_rate_variability.unwrap().avg, 42.5);
        assert_eq!(record.resting_heart_rate.unwrap().avg, 51.0);
        assert!(record.flags.is_empty());
    }

    #[test]
    fn test_stage_sleep_preferred_over_session() {
        let stages = vec![
            SleepStageEvent::new(ts("2026-01-29T01:00:00Z"), ts("2026-01-29T02:00:00Z"), "deep"),
            SleepStageEvent::new(ts("2026-01-29T02:00:00Z"), ts("2026-01-29T03:30:00Z"), "core"),
        ];
        let mut agg = aggregator(29, 29);
        agg.add_stage_totals(stage_totals_by_day(&stages));
        agg.add_session(&session("2026-01-28T23:00:00Z", "2026-01-29T07:00:00Z", 420.0, None));
        let sleep = agg.finish(&mut Diagnostics::new()).remove(0).sleep.unwrap();

        assert_eq!(sleep.source, SleepSource::Stages);
        assert_eq!(sleep.total_minutes, 150);
        assert_eq!(sleep.deep_minutes, Some(60));
        assert_eq!(sleep.core_minutes, Some(90));
        assert_eq!(sleep.rem_minutes, None);
    }

    #[test]
    fn test_session_sleep_derives_core() {
        let mut agg = aggregator(29, 29);
        agg.add_session(&session(
            "2026-01-29T00:00:00Z",
            "2026-01-29T08:00:00Z",
            420.0,
            Some(30.0),
        ));
        let mut diagnostics = Diagnostics::new();
        let record = agg.finish(&mut diagnostics).remove(0);
        let sleep = record.sleep.unwrap();

        assert_eq!(sleep.source, SleepSource::Session);
        assert_eq!(sleep.total_minutes, 420);
        assert_eq!(sleep.window_minutes, Some(450));
        // 420 - 60 deep - 90 rem - 30 awake
        assert_eq!(sleep.core_minutes, Some(240));
        assert_eq!(record.flags, vec![QualityFlag::DerivedCoreSleep]);
    }

    #[test]
    fn test_cross_midnight_session_is_clipped() {
        let mut agg = aggregator(29, 30);
        agg.add_session(&AggregatedSleepSession {
            start: ts("2026-01-29T23:30:00Z"),
            end: ts("2026-01-30T00:45:00Z"),
            total_sleep_minutes: 75.0,
            awake_minutes: None,
            deep_minutes: None,
            rem_minutes: None,
            core_minutes: None,
        });
        let records = agg.finish(&mut Diagnostics::new());

        assert_eq!(records[0].sleep, None);
        let sleep = records[1].sleep.as_ref().unwrap();
        assert_eq!(sleep.source, SleepSource::Session);
        assert_eq!(sleep.total_minutes, 45);
        assert_eq!(sleep.window_minutes, Some(45));
    }

    #[test]
    fn test_clipped_session_components_rounded_independently() {
        let mut agg = aggregator(29, 29);
        // 360 of 480 window minutes fall on the 29th
        agg.add_session(&session(
            "2026-01-28T22:00:00Z",
            "2026-01-29T06:00:00Z",
            420.0,
            Some(60.0),
        ));
        let sleep = agg.finish(&mut Diagnostics::new()).remove(0).sleep.unwrap();

        assert_eq!(sleep.total_minutes, 315);
        assert_eq!(sleep.deep_minutes, Some(45));
        assert_eq!(sleep.rem_minutes, Some(68));
        assert_eq!(sleep.awake_minutes, Some(45));
        assert_eq!(sleep.window_minutes, Some(360));
        // 315 - 45 deep - 68 rem - 45 awake
        assert_eq!(sleep.core_minutes, Some(157));
    }

    #[test]
    fn test_stage_core_ignores_awake_minutes() {
        let stages = vec![
            SleepStageEvent::new(ts("2026-01-29T01:00:00Z"), ts("2026-01-29T03:00:00Z"), "asleep"),
            SleepStageEvent::new(ts("2026-01-29T03:00:00Z"), ts("2026-01-29T03:30:00Z"), "awake"),
            SleepStageEvent::new(ts("2026-01-29T03:30:00Z"), ts("2026-01-29T04:00:00Z"), "deep"),
        ];
        let mut agg = aggregator(29, 29);
        agg.add_stage_totals(stage_totals_by_day(&stages));
        let sleep = agg.finish(&mut Diagnostics::new()).remove(0).sleep.unwrap();

        assert_eq!(sleep.total_minutes, 150);
        assert_eq!(sleep.awake_minutes, Some(30));
        assert_eq!(sleep.core_minutes, Some(120));
    }

    #[test]
    fn test_longest_session_wins_per_date() {
        let mut agg = aggregator(29, 29);
        agg.add_session(&session("2026-01-29T13:00:00Z", "2026-01-29T13:40:00Z", 35.0, None));
        agg.add_session(&session("2026-01-29T00:00:00Z", "2026-01-29T07:00:00Z", 420.0, None));
        agg.add_session(&session("2026-01-29T15:00:00Z", "2026-01-29T15:20:00Z", 20.0, None));
        let sleep = agg.finish(&mut Diagnostics::new()).remove(0).sleep.unwrap();
        assert_eq!(sleep.total_minutes, 420);
    }

    #[test]
    fn test_daily_feed_fills_missing_metrics_only() {
        let mut agg = aggregator(28, 28);
        agg.add_readings(&[reading("2026-01-28T08:00:00Z", MetricKind::StepCount, 300.0)]);
        agg.add_daily_feed(&[DailyFeedRow {
            date: "1/28/2026".to_string(),
            steps: Some(9000.0),
            avg_heart_rate: Some(66.0),
            sleep_hours: Some(7.5),
            deep_sleep_hours: Some(1.0),
            rem_sleep_hours: Some(1.5),
            core_sleep_hours: Some(5.0),
            ..DailyFeedRow::default()
        }]);
        let record = agg.finish(&mut Diagnostics::new()).remove(0);

        assert_eq!(record.steps, Some(300));
        assert_eq!(record.heart_rate.as_ref().unwrap().avg, 66.0);
        assert_eq!(record.heart_rate.as_ref().unwrap().count, 0);
        assert_eq!(record.heart_rate_distribution, None);
        let sleep = record.sleep.unwrap();
        assert_eq!(sleep.source, SleepSource::DailyFeed);
        assert_eq!(sleep.total_minutes, 450);
        assert_eq!(sleep.core_minutes, Some(300));
        assert_eq!(record.flags, vec![QualityFlag::DailyFeedFallback]);
    }

    #[test]
    fn test_manual_entries_pass_through() {
        let mut agg = aggregator(28, 28);
        agg.add_manual(&[
            ManualEntry {
                date: "2026-01-28".to_string(),
                metric: "weight_kg".to_string(),
                value: serde_json::json!(71.9),
            },
            ManualEntry {
                date: "2026-01-28".to_string(),
                metric: "weight_kg".to_string(),
                value: serde_json::json!(71.4),
            },
            ManualEntry {
                date: "2026-02-02".to_string(),
                metric: "mood".to_string(),
                value: serde_json::json!("ok"),
            },
        ]);
        let record = agg.finish(&mut Diagnostics::new()).remove(0);
        assert_eq!(record.manual.len(), 1);
        assert_eq!(record.manual["weight_kg"], serde_json::json!(71.4));
    }
}
