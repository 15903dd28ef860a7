//! Request-scoped diagnostics
//!
//! Local failures (a bad timestamp, an undecodable payload, an inconclusive
//! gap) never abort a request. They are counted here and attached as flags to
//! the day they affect. One instance lives for one aggregation request.

use crate::types::QualityFlag;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Counters surfaced in the summary payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCounts {
    pub rows_read: usize,
    pub unparseable_timestamps: usize,
    pub malformed_payloads: usize,
    pub invalid_intervals: usize,
    /// Rows with neither a usable date column nor a usable timestamp
    pub unplaceable_rows: usize,
    pub duplicate_stage_events: usize,
    pub duplicate_sessions: usize,
    pub inconclusive_gaps: usize,
}

/// Diagnostics accumulated while serving one request
#[derive(Debug, Default)]
pub struct Diagnostics {
    counts: DiagnosticCounts,
    day_flags: BTreeMap<NaiveDate, BTreeSet<QualityFlag>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a flag to a day; `None` means the day is unknown
    pub fn flag(&mut self, date: Option<NaiveDate>, flag: QualityFlag) {
        if let Some(date) = date {
            self.day_flags.entry(date).or_default().insert(flag);
        }
    }

    pub fn counts(&self) -> &DiagnosticCounts {
        &self.counts
    }

    pub fn counts_mut(&mut self) -> &mut DiagnosticCounts {
        &mut self.counts
    }

    /// Flags recorded for a day, in stable order
    pub fn flags_for(&self, date: NaiveDate) -> Vec<QualityFlag> {
        self.day_flags
            .get(&date)
            .map(|flags| flags.iter().copied().collect())
            .unwrap_or_default()
    }
}
