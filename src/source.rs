//! Row sources
//!
//! The storage backend is a collaborator: it hands back rows for a date range
//! and nothing else. [`RowSource`] is that seam. [`InMemorySource`] serves rows
//! that were already materialized (files, fixtures, tests).

use crate::error::ComputeError;
use crate::schema::{DailyFeedRow, HourlyRow, ManualEntry};
use crate::timestamp::parse_calendar_date;
use crate::types::DateRange;
use chrono::NaiveDate;
use tracing::debug;

/// Producer of the three input feeds
pub trait RowSource: Sync {
    fn fetch_hourly(&self, range: &DateRange) -> Result<Vec<HourlyRow>, ComputeError>;
    fn fetch_daily(&self, range: &DateRange) -> Result<Vec<DailyFeedRow>, ComputeError>;
    fn fetch_manual(&self, range: &DateRange) -> Result<Vec<ManualEntry>, ComputeError>;
}

/// Rows for one request, fetched together
#[derive(Debug, Clone, Default)]
pub struct Feeds {
    pub hourly: Vec<HourlyRow>,
    pub daily: Vec<DailyFeedRow>,
    pub manual: Vec<ManualEntry>,
}

/// Fetch all three feeds concurrently and wait for every one of them
pub fn fetch_feeds<S: RowSource + ?Sized>(
    source: &S,
    hourly_range: &DateRange,
    range: &DateRange,
) -> Result<Feeds, ComputeError> {
    let (hourly, (daily, manual)) = rayon::join(
        || source.fetch_hourly(hourly_range),
        || {
            rayon::join(
                || source.fetch_daily(range),
                || source.fetch_manual(range),
            )
        },
    );

    let feeds = Feeds {
        hourly: hourly?,
        daily: daily?,
        manual: manual?,
    };
    debug!(
        hourly = feeds.hourly.len(),
        daily = feeds.daily.len(),
        manual = feeds.manual.len(),
        "fetched feeds"
    );
    Ok(feeds)
}

/// Rows held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    hourly: Vec<HourlyRow>,
    daily: Vec<DailyFeedRow>,
    manual: Vec<ManualEntry>,
}

impl InMemorySource {
    pub fn new(hourly: Vec<HourlyRow>, daily: Vec<DailyFeedRow>, manual: Vec<ManualEntry>) -> Self {
        Self {
            hourly,
            daily,
            manual,
        }
    }

    pub fn with_hourly(hourly: Vec<HourlyRow>) -> Self {
        Self {
            hourly,
            ..Self::default()
        }
    }
}

/// Date a stored row is filed under: the date column, else the timestamp's
/// leading date. `None` means the row cannot be filtered and is passed on.
fn filed_date(date: &str, timestamp: Option<&str>) -> Option<NaiveDate> {
    parse_calendar_date(date)
        .ok()
        .or_else(|| timestamp.and_then(|ts| parse_calendar_date(ts).ok()))
}

fn in_range(range: &DateRange, date: Option<NaiveDate>) -> bool {
    date.map_or(true, |d| range.contains(d))
}

impl RowSource for InMemorySource {
    fn fetch_hourly(&self, range: &DateRange) -> Result<Vec<HourlyRow>, ComputeError> {
        Ok(self
            .hourly
            .iter()
            .filter(|row| in_range(range, filed_date(&row.date, Some(row.timestamp.as_str()))))
            .cloned()
            .collect())
    }

    fn fetch_daily(&self, range: &DateRange) -> Result<Vec<DailyFeedRow>, ComputeError> {
        Ok(self
            .daily
            .iter()
            .filter(|row| in_range(range, filed_date(&row.date, None)))
            .cloned()
            .collect())
    }

    fn fetch_manual(&self, range: &DateRange) -> Result<Vec<ManualEntry>, ComputeError> {
        Ok(self
            .manual
            .iter()
            .filter(|entry| in_range(range, filed_date(&entry.date, None)))
            .cloned()
            .collect())
    }
}
