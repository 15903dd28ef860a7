//! Session clustering
//!
//! Groups aggregated sleep sessions into maximal runs of temporally
//! overlapping windows. A single sweep over the start-sorted sessions is
//! enough: a session joins the current cluster when it starts before the
//! cluster's latest end.

use crate::types::AggregatedSleepSession;
use chrono::{DateTime, FixedOffset};

/// How the members of a cluster relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterShape {
    Single,
    /// Overlapping, but no member covers the whole cluster
    Sequential,
    /// The earliest-starting member also ends last
    Nested,
}

/// A group of overlapping sessions, ordered by start
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCluster {
    pub members: Vec<AggregatedSleepSession>,
}

impl SessionCluster {
    pub fn start(&self) -> Option<DateTime<FixedOffset>> {
        self.members.first().map(|s| s.start)
    }

    pub fn end(&self) -> Option<DateTime<FixedOffset>> {
        self.members.iter().map(|s| s.end).max()
    }

    /// Whether the earliest-start member also has the latest end
    pub fn is_nested(&self) -> bool {
        match (self.members.first(), self.end()) {
            (Some(first), Some(end)) => self.members.len() > 1 && first.end == end,
            _ => false,
        }
    }

    pub fn shape(&self) -> ClusterShape {
        if self.members.len() <= 1 {
            ClusterShape::Single
        } else if self.is_nested() {
            ClusterShape::Nested
        } else {
            ClusterShape::Sequential
        }
    }
}

/// Partition sessions into overlap clusters, in start order
pub fn cluster_sessions(sessions: &[AggregatedSleepSession]) -> Vec<SessionCluster> {
    let mut sorted: Vec<AggregatedSleepSession> = sessions.to_vec();
    // Ties on start put the wider window first so it leads the cluster
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut clusters: Vec<SessionCluster> = Vec::new();
    let mut current: Vec<AggregatedSleepSession> = Vec::new();
    let mut current_end: Option<DateTime<FixedOffset>> = None;

    for session in sorted {
        match current_end {
            Some(end) if session.start < end => {
                if session.end > end {
                    current_end = Some(session.end);
                }
                current.push(session);
            }
            _ => {
                if !current.is_empty() {
                    clusters.push(SessionCluster {
                        members: std::mem::take(&mut current),
                    });
                }
                current_end = Some(session.end);
                current.push(session);
            }
        }
    }

    if !current.is_empty() {
        clusters.push(SessionCluster { members: current });
    }

    clusters
}
