//! Nested-session resolution
//!
//! Picks the one authoritative session out of a cluster of overlapping
//! sessions. The three cluster shapes are handled by separate branches:
//!
//! - single: the only member wins
//! - sequential: the member with the most total sleep wins
//! - nested: start at the narrowest window and walk outward, expanding only
//!   while the exclusive gap in front of the current window looks asleep
//!
//! Every layer decision is kept on the [`Resolution`] so a result can be
//! audited after the fact.

use crate::cluster::{ClusterShape, SessionCluster};
use crate::config::ResolverConfig;
use crate::evidence::ActivityEvidence;
use crate::types::{AggregatedSleepSession, Reading};
use tracing::debug;

/// What happened when the resolver looked at one outer layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOutcome {
    /// Gap looked asleep; the outer session became the boundary
    Expanded,
    /// Gap looked awake; the inner session stays the boundary
    Awake,
    /// Gap was too sparsely instrumented to judge; expansion stops
    Inconclusive,
}

/// Audit record for one outward step of the nested walk
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDecision {
    pub inner: AggregatedSleepSession,
    pub outer: AggregatedSleepSession,
    pub evidence: ActivityEvidence,
    pub awake_score: u8,
    pub outcome: LayerOutcome,
}

/// Result of resolving one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub authoritative: AggregatedSleepSession,
    pub shape: ClusterShape,
    pub layers: Vec<LayerDecision>,
}

impl Resolution {
    /// Whether the nested walk stopped on an inconclusive gap
    pub fn insufficient_evidence(&self) -> bool {
        self.layers
            .iter()
            .any(|l| l.outcome == LayerOutcome::Inconclusive)
    }

    /// Sleep plus awake minutes of the authoritative session
    pub fn resolved_minutes(&self) -> f64 {
        self.authoritative.resolved_minutes()
    }
}

/// Resolver for session clusters
#[derive(Debug, Clone, Default)]
pub struct SessionResolver {
    config: ResolverConfig,
}

impl SessionResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a cluster against the request's readings.
    /// Returns `None` only for an empty cluster.
    pub fn resolve(&self, cluster: &SessionCluster, readings: &[Reading]) -> Option<Resolution> {
        let shape = cluster.shape();
        let resolution = match shape {
            ClusterShape::Single => Resolution {
                authoritative: cluster.members.first()?.clone(),
                shape,
                layers: Vec::new(),
            },
            ClusterShape::Sequential => Resolution {
                authoritative: Self::most_sleep(&cluster.members)?.clone(),
                shape,
                layers: Vec::new(),
            },
            ClusterShape::Nested => self.resolve_nested(&cluster.members, readings)?,
        };

        debug!(
            shape = ?resolution.shape,
            members = cluster.members.len(),
            layers = resolution.layers.len(),
            start = %resolution.authoritative.start,
            end = %resolution.authoritative.end,
            "resolved session cluster"
        );
        Some(resolution)
    }

    /// First member with the greatest total sleep
    fn most_sleep(members: &[AggregatedSleepSession]) -> Option<&AggregatedSleepSession> {
        members.iter().fold(None, |best, candidate| match best {
            Some(b) if b.total_sleep_minutes >= candidate.total_sleep_minutes => Some(b),
            _ => Some(candidate),
        })
    }

    fn resolve_nested(
        &self,
        members: &[AggregatedSleepSession],
        readings: &[Reading],
    ) -> Option<Resolution> {
        // Narrowest window first; ties keep start order
        let mut layers: Vec<&AggregatedSleepSession> = members.iter().collect();
        layers.sort_by(|a, b| a.window_minutes().total_cmp(&b.window_minutes()));

        let mut current = *layers.first()?;
        let mut decisions = Vec::new();

        for outer in layers.into_iter().skip(1) {
            // Exclusive gap in front of the current boundary
            let gap_end = current.start.max(outer.start);
            let evidence = ActivityEvidence::gather(readings, outer.start, gap_end, &self.config);
            let awake_score = evidence.awake_score(&self.config);

            let outcome = if evidence.is_inconclusive(&self.config) {
                LayerOutcome::Inconclusive
            } else if awake_score >= self.config.awake_score_cutoff {
                LayerOutcome::Awake
            } else {
                LayerOutcome::Expanded
            };

            decisions.push(LayerDecision {
                inner: current.clone(),
                outer: outer.clone(),
                evidence,
                awake_score,
                outcome,
            });

            match outcome {
                LayerOutcome::Expanded => current = outer,
                LayerOutcome::Awake | LayerOutcome::Inconclusive => break,
            }
        }

        Some(Resolution {
            authoritative: current.clone(),
            shape: ClusterShape::Nested,
            layers: decisions,
        })
    }
}
