//! Activity evidence for a time window
//!
//! Summarizes heart-rate and step readings that fall inside the exclusive gap
//! between two nested sessions, and scores how awake the wearer looked.

use crate::config::ResolverConfig;
use crate::types::{MetricKind, Reading};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Heart-rate and step summary over `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEvidence {
    pub avg_hr: Option<f64>,
    pub max_hr: Option<f64>,
    pub total_steps: f64,
    /// Step samples whose count exceeds the significance threshold
    pub significant_step_events: usize,
    /// Heart-rate plus step samples in the window
    pub sample_count: usize,
    pub hr_sample_count: usize,
    pub span_minutes: f64,
}

impl ActivityEvidence {
    /// Collect evidence from readings whose timestamp lies in `[start, end)`.
    /// Readings without a parsed timestamp cannot be placed and are skipped.
    pub fn gather(
        readings: &[Reading],
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        config: &ResolverConfig,
    ) -> Self {
        let mut hr_sum = 0.0;
        let mut hr_count = 0usize;
        let mut max_hr: Option<f64> = None;
        let mut total_steps = 0.0;
        let mut step_count = 0usize;
        let mut significant = 0usize;

        let in_window = |r: &&Reading| matches!(r.timestamp, Some(ts) if ts >= start && ts < end);

        for reading in readings.iter().filter(in_window) {
            let Some(value) = reading.value else {
                continue;
            };
            match reading.metric_kind {
                MetricKind::HeartRate => {
                    hr_sum += value;
                    hr_count += 1;
                    let peak = reading.max_value.map_or(value, |m| m.max(value));
                    max_hr = Some(max_hr.map_or(peak, |m: f64| m.max(peak)));
                }
                MetricKind::StepCount => {
                    total_steps += value;
                    step_count += 1;
                    if value > config.significant_step_count {
                        significant += 1;
                    }
                }
                _ => {}
            }
        }

        Self {
            avg_hr: (hr_count > 0).then(|| hr_sum / hr_count as f64),
            max_hr,
            total_steps,
            significant_step_events: significant,
            sample_count: hr_count + step_count,
            hr_sample_count: hr_count,
            span_minutes: ((end - start).num_seconds().max(0)) as f64 / 60.0,
        }
    }

    fn per_hour(&self, amount: f64) -> f64 {
        let hours = self.span_minutes / 60.0;
        if hours > 0.0 {
            amount / hours
        } else {
            0.0
        }
    }

    /// Weighted awake score; at or above the configured cutoff means awake
    pub fn awake_score(&self, config: &ResolverConfig) -> u8 {
        let mut score = 0;
        if self.avg_hr.is_some_and(|hr| hr > config.avg_hr_threshold) {
            score += 2;
        }
        if self.max_hr.is_some_and(|hr| hr > config.max_hr_threshold) {
            score += 1;
        }
        if self.per_hour(self.significant_step_events as f64) > config.significant_steps_per_hour {
            score += 2;
        }
        if self.per_hour(self.total_steps) > config.steps_per_hour {
            score += 2;
        }
        score
    }

    /// A long gap with too few heart-rate samples cannot be judged either way
    pub fn is_inconclusive(&self, config: &ResolverConfig) -> bool {
        self.span_minutes > config.sparse_gap_minutes
            && self.per_hour(self.hr_sample_count as f64) < config.min_hr_samples_per_hour
    }
}
