//! Day attribution and clipping
//!
//! Sleep intervals belong to the local calendar date of their end instant.
//! A stage interval or authoritative session that crosses local midnight is
//! clipped to `[midnight, end]`; the part before midnight is not credited to
//! the earlier date. Downstream day-over-day comparisons rely on that
//! convention.

use crate::types::{AggregatedSleepSession, SleepStage, SleepStageEvent};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use std::collections::BTreeMap;

/// Local calendar date of an instant, in the instant's own offset
pub fn attribute_date(end: DateTime<FixedOffset>) -> NaiveDate {
    end.date_naive()
}

/// Local midnight that starts the day `at` falls on
pub fn local_midnight(at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let since_midnight = at.naive_local() - at.date_naive().and_time(NaiveTime::MIN);
    at - since_midnight
}

/// Clip an interval to the day of its end. Applying it twice changes nothing.
pub fn clip_to_day(
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
    (start.max(local_midnight(end)).min(end), end)
}

fn minutes_between(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> f64 {
    (end - start).num_seconds().max(0) as f64 / 60.0
}

/// Clip an authoritative session to the day of its end.
///
/// A session only carries aggregate minutes, so every count is scaled by the
/// share of the window left after clipping.
pub fn clip_session(session: &AggregatedSleepSession) -> AggregatedSleepSession {
    let (start, end) = clip_to_day(session.start, session.end);
    let window = minutes_between(session.start, session.end);
    if window <= 0.0 || start == session.start {
        return session.clone();
    }

    let share = minutes_between(start, end) / window;
    let scale = |minutes: f64| minutes * share;
    AggregatedSleepSession {
        start,
        end,
        total_sleep_minutes: scale(session.total_sleep_minutes),
        awake_minutes: session.awake_minutes.map(scale),
        deep_minutes: session.deep_minutes.map(scale),
        rem_minutes: session.rem_minutes.map(scale),
        core_minutes: session.core_minutes.map(scale),
    }
}

/// Clipped stage minutes for one date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTotals {
    /// Deep, REM, core and unspecified asleep minutes
    pub sleep_minutes: f64,
    pub deep_minutes: f64,
    pub rem_minutes: f64,
    pub core_minutes: f64,
    pub awake_minutes: f64,
    pub has_deep: bool,
    pub has_rem: bool,
    pub has_core: bool,
    pub has_awake: bool,
}

impl StageTotals {
    fn add(&mut self, stage: &SleepStage, minutes: f64) {
        match stage {
            SleepStage::Deep => {
                self.deep_minutes += minutes;
                self.has_deep = true;
            }
            SleepStage::Rem => {
                self.rem_minutes += minutes;
                self.has_rem = true;
            }
            SleepStage::Core => {
                self.core_minutes += minutes;
                self.has_core = true;
            }
            SleepStage::Awake => {
                self.awake_minutes += minutes;
                self.has_awake = true;
            }
            SleepStage::Asleep | SleepStage::InBed | SleepStage::Unknown(_) => {}
        }
        if stage.is_sleep() {
            self.sleep_minutes += minutes;
        }
    }
}

/// Sum clipped stage minutes per attributed date
pub fn stage_totals_by_day(events: &[SleepStageEvent]) -> BTreeMap<NaiveDate, StageTotals> {
    let mut totals: BTreeMap<NaiveDate, StageTotals> = BTreeMap::new();

    for event in events {
        let date = attribute_date(event.end);
        let (start, end) = clip_to_day(event.start, event.end);
        totals
            .entry(date)
            .or_default()
            .add(&event.stage, minutes_between(start, end));
    }

    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::Deduplicator;
    use crate::diagnostics::Diagnostics;
    use chrono::Duration;
    use proptest::prelude::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn event(start: &str, end: &str, label: &str) -> SleepStageEvent {
        SleepStageEvent::new(ts(start), ts(end), label)
    }

    #[test]
    fn test_duplicate_interval_counted_once() {
        let events = vec![
            event("2026-01-28T22:30:00Z", "2026-01-28T23:00:00Z", "core"),
            event("2026-01-28T22:30:00Z", "2026-01-28T23:00:00Z", "core"),
        ];
        let kept = Deduplicator::new().dedup_stages(events, &mut Diagnostics::new());
        let totals = stage_totals_by_day(&kept);

        let day = NaiveDate::from_ymd_opt(2026, 1, 28).unwrap();
        assert_eq!(totals[&day].sleep_minutes, 30.0);
        assert_eq!(totals[&day].core_minutes, 30.0);
    }

    #[test]
    fn test_cross_midnight_interval_is_clipped() {
        let events = vec![event(
            "2026-01-28T23:30:00-05:00",
            "2026-01-29T00:45:00-05:00",
            "asleepCore",
        )];
        let totals = stage_totals_by_day(&events);

        assert_eq!(totals.len(), 1);
        let later = NaiveDate::from_ymd_opt(2026, 1, 29).unwrap();
        assert_eq!(totals[&later].sleep_minutes, 45.0);
    }

    fn session(start: &str, end: &str, total: f64) -> AggregatedSleepSession {
        AggregatedSleepSession {
            start: ts(start),
            end: ts(end),
            total_sleep_minutes: total,
            awake_minutes: None,
            deep_minutes: None,
            rem_minutes: None,
            core_minutes: None,
        }
    }

    #[test]
    fn test_cross_midnight_session_is_clipped() {
        let clipped = clip_session(&session("2026-01-29T23:30:00Z", "2026-01-30T00:45:00Z", 75.0));

        assert_eq!(clipped.start, ts("2026-01-30T00:00:00Z"));
        assert_eq!(clipped.end, ts("2026-01-30T00:45:00Z"));
        assert_eq!(clipped.total_sleep_minutes.round(), 45.0);
        assert_eq!(attribute_date(clipped.end), NaiveDate::from_ymd_opt(2026, 1, 30).unwrap());
    }

    #[test]
    fn test_clipped_session_components_scale_with_window() {
        let mut night = session("2026-01-28T22:00:00Z", "2026-01-29T06:00:00Z", 420.0);
        night.awake_minutes = Some(60.0);
        night.deep_minutes = Some(120.0);
        night.rem_minutes = Some(90.0);

        // 360 of the 480 window minutes fall on the 29th
        let clipped = clip_session(&night);
        assert_eq!(clipped.total_sleep_minutes, 315.0);
        assert_eq!(clipped.awake_minutes, Some(45.0));
        assert_eq!(clipped.deep_minutes, Some(90.0));
        assert_eq!(clipped.rem_minutes, Some(67.5));
        assert_eq!(clipped.core_minutes, None);
    }

    #[test]
    fn test_same_day_session_is_unchanged() {
        let nap = session("2026-01-29T13:00:00Z", "2026-01-29T13:40:00Z", 35.0);
        assert_eq!(clip_session(&nap), nap);
    }

    #[test]
    fn test_local_calendar_is_used() {
        // 01:00 UTC on the 29th is still the 28th in UTC-05:00
        let end = ts("2026-01-28T20:00:00-05:00");
        assert_eq!(attribute_date(end), NaiveDate::from_ymd_opt(2026, 1, 28).unwrap());
        assert_eq!(local_midnight(end), ts("2026-01-28T00:00:00-05:00"));
    }

    #[test]
    fn test_awake_and_in_bed_excluded_from_sleep() {
        let events = vec![
            event("2026-01-29T01:00:00Z", "2026-01-29T01:20:00Z", "awake"),
            event("2026-01-29T01:20:00Z", "2026-01-29T02:00:00Z", "deep"),
            event("2026-01-29T00:30:00Z", "2026-01-29T08:00:00Z", "inBed"),
        ];
        let totals = stage_totals_by_day(&events);
        let day = &totals[&NaiveDate::from_ymd_opt(2026, 1, 29).unwrap()];

        assert_eq!(day.sleep_minutes, 40.0);
        assert_eq!(day.awake_minutes, 20.0);
        assert!(day.has_awake);
        assert!(!day.has_rem);
    }

    proptest! {
        #[test]
        fn prop_clip_is_idempotent(start_min in 0i64..4000, len in 1i64..2000, offset_h in -12i32..14) {
            let offset = FixedOffset::east_opt(offset_h * 3600).unwrap();
            let base = ts("2026-01-27T00:00:00Z").with_timezone(&offset);
            let start = base + Duration::minutes(start_min);
            let end = start + Duration::minutes(len);

            let once = clip_to_day(start, end);
            let twice = clip_to_day(once.0, once.1);
            prop_assert_eq!(once, twice);
            prop_assert!(once.0 <= once.1);
            prop_assert_eq!(attribute_date(once.0), attribute_date(end));
        }
    }
}
