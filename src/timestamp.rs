//! Timestamp normalization
//!
//! Sources emit instants in three shapes:
//! - `2026-01-28 23:41:10 -0500` (health-export offset format)
//! - locale strings such as `1/28/2026, 11:41:10 PM`
//! - ISO-8601, complete or partial
//!
//! Strategies are tried in that order and the first success wins. The offset
//! format is rewritten into RFC 3339 and parsed strictly; if it matches but the
//! rewrite does not parse, the string is rejected instead of falling through
//! to the lenient parsers.

use crate::error::ComputeError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Which strategy produced a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    OffsetFormat,
    Generic,
    IsoFallback,
}

fn offset_format_re() -> &'static Regex {
    static OFFSET_FORMAT_RE: OnceLock<Regex> = OnceLock::new();
    OFFSET_FORMAT_RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}) (\d{2}:\d{2}:\d{2}(?:\.\d+)?) ([+-]\d{2})(\d{2})$")
            .expect("valid offset timestamp regex")
    })
}

/// Offset-aware formats tried by the generic strategy
const GENERIC_OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"];

/// Offset-less formats tried by the generic strategy, placed in the default offset
const GENERIC_LOCAL_FORMATS: &[&str] = &[
    "%m/%d/%Y, %I:%M:%S %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y, %I:%M %p",
    "%m/%d/%Y, %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Offset-less formats tried after space-to-`T` substitution
const FALLBACK_LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H"];

/// Parses heterogeneous timestamp strings into absolute instants
#[derive(Debug, Clone, Copy)]
pub struct TimestampNormalizer {
    default_offset: FixedOffset,
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl TimestampNormalizer {
    /// Create a normalizer that places offset-less strings in `default_offset`
    pub fn new(default_offset: FixedOffset) -> Self {
        Self { default_offset }
    }

    pub fn default_offset(&self) -> FixedOffset {
        self.default_offset
    }

    /// Parse a timestamp string
    pub fn parse(&self, input: &str) -> Result<DateTime<FixedOffset>, ComputeError> {
        self.parse_with_strategy(input).map(|(ts, _)| ts)
    }

    /// Parse a timestamp string and report which strategy succeeded
    pub fn parse_with_strategy(
        &self,
        input: &str,
    ) -> Result<(DateTime<FixedOffset>, ParseStrategy), ComputeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ComputeError::UnparseableTimestamp(input.to_string()));
        }

        if let Some(caps) = offset_format_re().captures(trimmed) {
            let rewritten = format!("{}T{}{}:{}", &caps[1], &caps[2], &caps[3], &caps[4]);
            return DateTime::parse_from_rfc3339(&rewritten)
                .map(|ts| (ts, ParseStrategy::OffsetFormat))
                .map_err(|_| ComputeError::UnparseableTimestamp(input.to_string()));
        }

        if let Some(ts) = self.parse_generic(trimmed) {
            return Ok((ts, ParseStrategy::Generic));
        }

        if let Some(ts) = self.parse_iso_fallback(trimmed) {
            return Ok((ts, ParseStrategy::IsoFallback));
        }

        Err(ComputeError::UnparseableTimestamp(input.to_string()))
    }

    fn parse_generic(&self, input: &str) -> Option<DateTime<FixedOffset>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
            return Some(ts);
        }
        if let Ok(ts) = DateTime::parse_from_rfc2822(input) {
            return Some(ts);
        }
        for format in GENERIC_OFFSET_FORMATS {
            if let Ok(ts) = DateTime::parse_from_str(input, format) {
                return Some(ts);
            }
        }
        for format in GENERIC_LOCAL_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
                return self.localize(naive);
            }
        }
        // Date-only ISO strings mean local midnight
        NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .and_then(|naive| self.localize(naive))
    }

    fn parse_iso_fallback(&self, input: &str) -> Option<DateTime<FixedOffset>> {
        let candidate = input.replacen(' ', "T", 1);
        if let Ok(ts) = DateTime::parse_from_rfc3339(&candidate) {
            return Some(ts);
        }
        for format in GENERIC_OFFSET_FORMATS {
            if let Ok(ts) = DateTime::parse_from_str(&candidate, format) {
                return Some(ts);
            }
        }
        FALLBACK_LOCAL_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&candidate, format).ok())
            .and_then(|naive| self.localize(naive))
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        naive.and_local_timezone(self.default_offset).single()
    }
}

/// Parse the calendar-date column (`M/D/YYYY` or `YYYY-MM-DD`)
pub fn parse_calendar_date(input: &str) -> Result<NaiveDate, ComputeError> {
    let trimmed = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Ok(date);
    }
    // Some exports write the date column as a full ISO timestamp
    if let Some(prefix) = trimmed.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Ok(date);
        }
    }

    Err(ComputeError::UnparseableDate(input.to_string()))
}
