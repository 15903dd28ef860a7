//! Duplicate suppression for sleep events
//!
//! Devices and sync jobs replay the same interval more than once. Stage events
//! are identified by `(start, end, label)` with the label as reported, sessions
//! by their window and total sleep. The first occurrence in input order is
//! kept.

use crate::diagnostics::Diagnostics;
use crate::types::{AggregatedSleepSession, QualityFlag, SleepStageEvent};
use chrono::{DateTime, FixedOffset};
use std::collections::HashSet;
use tracing::debug;

type StageKey = (DateTime<FixedOffset>, DateTime<FixedOffset>, String);
type SessionKey = (i64, i64, i64);

fn session_key(session: &AggregatedSleepSession) -> SessionKey {
    (
        session.start.timestamp_millis(),
        session.end.timestamp_millis(),
        (session.total_sleep_minutes * 60.0).round() as i64,
    )
}

/// Seen-key sets for one request
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen_stages: HashSet<StageKey>,
    seen_sessions: HashSet<SessionKey>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the first occurrence of each stage event
    pub fn dedup_stages(
        &mut self,
        events: Vec<SleepStageEvent>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<SleepStageEvent> {
        let before = events.len();
        let mut kept = Vec::with_capacity(before);

        for event in events {
            let key = (event.start, event.end, event.label.clone());
            if self.seen_stages.insert(key) {
                kept.push(event);
            } else {
                diagnostics.counts_mut().duplicate_stage_events += 1;
                diagnostics.flag(
                    Some(event.end.date_naive()),
                    QualityFlag::DuplicateEventsDropped,
                );
            }
        }

        debug!(
            input = before,
            kept = kept.len(),
            "deduplicated stage events"
        );
        kept
    }

    /// Keep the first occurrence of each aggregated session
    pub fn dedup_sessions(
        &mut self,
        sessions: Vec<AggregatedSleepSession>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<AggregatedSleepSession> {
        let before = sessions.len();
        let mut kept = Vec::with_capacity(before);

        for session in sessions {
            if self.seen_sessions.insert(session_key(&session)) {
                kept.push(session);
            } else {
                diagnostics.counts_mut().duplicate_sessions += 1;
                diagnostics.flag(
                    Some(session.end.date_naive()),
                    QualityFlag::DuplicateEventsDropped,
                );
            }
        }

        debug!(input = before, kept = kept.len(), "deduplicated sessions");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn stage(start: &str, end: &str, label: &str) -> SleepStageEvent {
        SleepStageEvent::new(ts(start), ts(end), label)
    }

    #[test]
    fn test_duplicate_stage_counted_once() {
        let mut dedup = Deduplicator::new();
        let mut diagnostics = Diagnostics::new();
        let events = vec![
            stage("2026-01-28T22:30:00Z", "2026-01-28T23:00:00Z", "core"),
            stage("2026-01-28T22:30:00Z", "2026-01-28T23:00:00Z", "core"),
        ];

        let kept = dedup.dedup_stages(events, &mut diagnostics);
        assert_eq!(kept.len(), 1);
        assert_eq!(diagnostics.counts().duplicate_stage_events, 1);
        assert_eq!(
            diagnostics.flags_for(ts("2026-01-28T23:00:00Z").date_naive()),
            vec![QualityFlag::DuplicateEventsDropped]
        );
    }

    #[test]
    fn test_same_interval_different_stage_is_kept() {
        let mut dedup = Deduplicator::new();
        let mut diagnostics = Diagnostics::new();
        let events = vec![
            stage("2026-01-28T22:30:00Z", "2026-01-28T23:00:00Z", "core"),
            stage("2026-01-28T22:30:00Z", "2026-01-28T23:00:00Z", "awake"),
        ];
        assert_eq!(dedup.dedup_stages(events, &mut diagnostics).len(), 2);
    }

    #[test]
    fn test_label_variants_of_one_stage_are_distinct() {
        let mut dedup = Deduplicator::new();
        let mut diagnostics = Diagnostics::new();
        let events = vec![
            stage("2026-01-28T22:30:00Z", "2026-01-28T23:00:00Z", "asleepDeep"),
            stage("2026-01-28T22:30:00Z", "2026-01-28T23:00:00Z", "deep"),
        ];
        let kept = dedup.dedup_stages(events, &mut diagnostics);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].stage, kept[1].stage);
        assert_eq!(diagnostics.counts().duplicate_stage_events, 0);
    }

    #[test]
    fn test_same_instant_in_different_offsets_is_duplicate() {
        let mut dedup = Deduplicator::new();
        let mut diagnostics = Diagnostics::new();
        let events = vec![
            stage("2026-01-28T22:30:00Z", "2026-01-28T23:00:00Z", "deep"),
            stage("2026-01-28T17:30:00-05:00", "2026-01-28T18:00:00-05:00", "deep"),
        ];
        assert_eq!(dedup.dedup_stages(events, &mut diagnostics).len(), 1);
    }

    #[test]
    fn test_duplicate_sessions() {
        let session = AggregatedSleepSession {
            start: ts("2026-01-28T23:00:00Z"),
            end: ts("2026-01-29T07:00:00Z"),
            total_sleep_minutes: 420.0,
            awake_minutes: None,
            deep_minutes: None,
            rem_minutes: None,
            core_minutes: None,
        };
        let mut other = session.clone();
        other.total_sleep_minutes = 400.0;

        let mut dedup = Deduplicator::new();
        let mut diagnostics = Diagnostics::new();
        let kept = dedup.dedup_sessions(
            vec![session.clone(), session, other],
            &mut diagnostics,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(diagnostics.counts().duplicate_sessions, 1);
    }

    fn arb_event() -> impl Strategy<Value = SleepStageEvent> {
        (0i64..6, 1i64..4, 0usize..3).prop_map(|(start_slot, len, label)| {
            let base = ts("2026-01-28T22:00:00Z");
            let start = base + chrono::Duration::minutes(start_slot * 15);
            SleepStageEvent::new(
                start,
                start + chrono::Duration::minutes(len * 15),
                ["deep", "rem", "awake"][label],
            )
        })
    }

    proptest! {
        #[test]
        fn prop_dedup_is_order_independent(
            events in proptest::collection::vec(arb_event(), 0..24),
            seed in any::<u64>(),
        ) {
            let mut shuffled = events.clone();
            let n = shuffled.len();
            if n > 1 {
                let mut state = seed;
                for i in (1..n).rev() {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    shuffled.swap(i, (state >> 33) as usize % (i + 1));
                }
            }

            let key_set = |kept: Vec<SleepStageEvent>| {
                kept.into_iter()
                    .map(|e| (e.start, e.end, e.stage))
                    .collect::<HashSet<_>>()
            };

            let a = Deduplicator::new().dedup_stages(events, &mut Diagnostics::new());
            let b = Deduplicator::new().dedup_stages(shuffled, &mut Diagnostics::new());
            prop_assert_eq!(a.len(), b.len());
            prop_assert_eq!(key_set(a), key_set(b));
        }
    }
}
