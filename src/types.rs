//! Core types for the Synheart Daily pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: parsed readings, typed sleep events and sessions, and the per-day
//! output record.

use crate::error::ComputeError;
use chrono::{DateTime, Days, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metric identifier carried in the fourth column of an hourly row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    HeartRate,
    StepCount,
    HeartRateVariability,
    RestingHeartRate,
    SleepAnalysis,
    SleepStage,
    /// Unknown metric names are kept but not aggregated
    #[serde(untagged)]
    Other(String),
}

impl MetricKind {
    /// Map a source metric name onto a kind. Matching ignores case and treats
    /// `-` and spaces like `_`.
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        match normalized.as_str() {
            "heart_rate" => MetricKind::HeartRate,
            "step_count" | "steps" => MetricKind::StepCount,
            "heart_rate_variability" | "hrv" => MetricKind::HeartRateVariability,
            "resting_heart_rate" => MetricKind::RestingHeartRate,
            "sleep_analysis" => MetricKind::SleepAnalysis,
            "sleep_stage" => MetricKind::SleepStage,
            _ => MetricKind::Other(name.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MetricKind::HeartRate => "heart_rate",
            MetricKind::StepCount => "step_count",
            MetricKind::HeartRateVariability => "heart_rate_variability",
            MetricKind::RestingHeartRate => "resting_heart_rate",
            MetricKind::SleepAnalysis => "sleep_analysis",
            MetricKind::SleepStage => "sleep_stage",
            MetricKind::Other(name) => name.as_str(),
        }
    }
}

/// Sleep stage label of a granular stage event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SleepStage {
    Deep,
    Rem,
    Core,
    /// Asleep without a specific stage ("asleep", "asleepUnspecified")
    Asleep,
    Awake,
    InBed,
    Unknown(String),
}

impl SleepStage {
    /// Classify a device label. Labels containing "asleep" are sleep; the
    /// `asleepDeep`/`asleepREM`/`asleepCore` forms keep their component.
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_ascii_lowercase();
        match lower.as_str() {
            "deep" | "asleepdeep" => SleepStage::Deep,
            "rem" | "asleeprem" => SleepStage::Rem,
            "core" | "asleepcore" => SleepStage::Core,
            "awake" => SleepStage::Awake,
            "inbed" | "in_bed" => SleepStage::InBed,
            other if other.contains("asleep") => SleepStage::Asleep,
            _ => SleepStage::Unknown(label.trim().to_string()),
        }
    }

    /// Whether minutes in this stage count toward the sleep total
    pub fn is_sleep(&self) -> bool {
        matches!(
            self,
            SleepStage::Deep | SleepStage::Rem | SleepStage::Core | SleepStage::Asleep
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            SleepStage::Deep => "deep",
            SleepStage::Rem => "rem",
            SleepStage::Core => "core",
            SleepStage::Asleep => "asleep",
            SleepStage::Awake => "awake",
            SleepStage::InBed => "inBed",
            SleepStage::Unknown(label) => label.as_str(),
        }
    }
}

impl From<String> for SleepStage {
    fn from(label: String) -> Self {
        SleepStage::from_label(&label)
    }
}

impl From<SleepStage> for String {
    fn from(stage: SleepStage) -> Self {
        stage.as_str().to_string()
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-stage sleep interval reported by the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepStageEvent {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// Label exactly as the device reported it
    pub label: String,
    pub stage: SleepStage,
    /// Duration as reported by the device, informational only
    pub reported_duration_minutes: Option<f64>,
}

impl SleepStageEvent {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>, label: &str) -> Self {
        Self {
            start,
            end,
            label: label.to_string(),
            stage: SleepStage::from_label(label),
            reported_duration_minutes: None,
        }
    }

    pub fn duration_minutes(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 60.0
    }
}

/// A coarse sleep session with aggregate minutes per stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSleepSession {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub total_sleep_minutes: f64,
    pub awake_minutes: Option<f64>,
    pub deep_minutes: Option<f64>,
    pub rem_minutes: Option<f64>,
    pub core_minutes: Option<f64>,
}

impl AggregatedSleepSession {
    /// Wall-clock length of the session window
    pub fn window_minutes(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 60.0
    }

    /// Sleep plus awake minutes, the duration used once a session is authoritative
    pub fn resolved_minutes(&self) -> f64 {
        self.total_sleep_minutes + self.awake_minutes.unwrap_or(0.0)
    }
}

/// Typed view of a reading's raw payload, decided once at parse time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Stage(SleepStageEvent),
    Session(AggregatedSleepSession),
    /// Scalar readings, undecodable payloads and unknown shapes
    Opaque,
}

/// One parsed observation from the hourly feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Absolute instant; `None` when the timestamp column could not be parsed
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Calendar date column as reported by the source
    pub calendar_date: Option<NaiveDate>,
    pub hour_of_day: Option<u32>,
    pub metric_kind: MetricKind,
    pub value: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub source: String,
    /// Decoded payload blob, `{}` when decoding failed
    pub raw_payload: serde_json::Value,
    pub payload: Payload,
}

impl Reading {
    /// Day this reading's scalar value belongs to. The source's calendar
    /// column wins; the timestamp's local date is the fallback.
    pub fn day(&self) -> Option<NaiveDate> {
        self.calendar_date
            .or_else(|| self.timestamp.map(|ts| ts.date_naive()))
    }
}

/// Inclusive range of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ComputeError> {
        if from > to {
            return Err(ComputeError::InvalidRange {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(Self { from, to })
    }

    /// A range covering one date
    pub fn single(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Every date in the range, in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |d| *d <= to)
    }

    /// The same range with `days` more dates in front
    pub fn extend_back(&self, days: u32) -> Self {
        let from = self
            .from
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { from, to: self.to }
    }
}

/// Diagnostic raised while building a day record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    UnparseableTimestamp,
    MalformedPayload,
    InsufficientEvidence,
    DuplicateEventsDropped,
    DailyFeedFallback,
    DerivedCoreSleep,
}

/// Mean, extremes and sample count of heart-rate readings for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Box-plot statistics of a day's heart-rate samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateDistribution {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub count: usize,
}

/// Arithmetic mean with its sample count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanSummary {
    pub avg: f64,
    pub count: usize,
}

/// Where a day's sleep composition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepSource {
    Stages,
    Session,
    DailyFeed,
}

/// Sleep composition for one night, in whole minutes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepComposition {
    pub total_minutes: i64,
    pub deep_minutes: Option<i64>,
    pub rem_minutes: Option<i64>,
    pub core_minutes: Option<i64>,
    pub awake_minutes: Option<i64>,
    /// Resolved sleep window (sleep + awake) when a session was authoritative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<i64>,
    pub source: SleepSource,
}

/// One summary per calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub steps: Option<i64>,
    pub heart_rate: Option<HeartRateStats>,
    pub heart_rate_distribution: Option<HeartRateDistribution>,
    pub sleep: Option<SleepComposition>,
    pub heart_rate_variability: Option<MeanSummary>,
    pub resting_heart_rate: Option<MeanSummary>,
    /// Manually entered metrics passed through untouched
    #[serde(default)]
    pub manual: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub flags: Vec<QualityFlag>,
}

impl DayRecord {
    /// Whether any metric is present for this date
    pub fn has_data(&self) -> bool {
        self.steps.is_some()
            || self.heart_rate.is_some()
            || self.sleep.is_some()
            || self.heart_rate_variability.is_some()
            || self.resting_heart_rate.is_some()
            || !self.manual.is_empty()
    }
}
