//! Pipeline orchestration
//!
//! Runs the full computation for one request, from raw hourly rows to one
//! [`DayRecord`] per date. All intermediate state (dedup sets, diagnostics)
//! lives in a [`RequestContext`] that is created per call and dropped after.

use crate::aggregator::DailyAggregator;
use crate::attribution::{attribute_date, stage_totals_by_day};
use crate::cluster::cluster_sessions;
use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::diagnostics::{DiagnosticCounts, Diagnostics};
use crate::distribution;
use crate::encoder::SummaryEncoder;
use crate::error::ComputeError;
use crate::parser::{sleep_sessions, stage_events, ReadingParser};
use crate::resolver::{LayerOutcome, Resolution, SessionResolver};
use crate::schema::{parse_json_rows, HourlyRow};
use crate::source::{fetch_feeds, Feeds, RowSource};
use crate::timestamp::TimestampNormalizer;
use crate::types::{
    AggregatedSleepSession, DateRange, DayRecord, HeartRateDistribution, MetricKind, QualityFlag,
    Reading,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Summarize hourly rows given as a JSON array, using the default configuration.
///
/// # Arguments
/// * `hourly_json` - JSON array of hourly rows (positional arrays or objects)
/// * `from` / `to` - Inclusive calendar date range
///
/// # Returns
/// The encoded summary payload as pretty JSON
///
/// # Example
/// ```ignore
/// let json = hourly_to_summary_json(&rows_json, from, to)?;
/// ```
pub fn hourly_to_summary_json(
    hourly_json: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<String, ComputeError> {
    let range = DateRange::new(from, to)?;
    let hourly: Vec<HourlyRow> = parse_json_rows(hourly_json)?;
    let feeds = Feeds {
        hourly,
        ..Feeds::default()
    };

    let summary = DailyPipeline::new(PipelineConfig::default())?.summarize(&feeds, range);
    SummaryEncoder::new().encode_to_json(&summary)
}

/// State owned by exactly one aggregation request
#[derive(Debug, Default)]
pub struct RequestContext {
    pub diagnostics: Diagnostics,
    dedup: Deduplicator,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Day records for a range plus what went wrong along the way
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub range: DateRange,
    pub days: Vec<DayRecord>,
    pub diagnostics: DiagnosticCounts,
}

/// Result of a single-date query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayQuery {
    pub date: NaiveDate,
    /// Raw rows that belong to the date, in input order
    pub rows: Vec<HourlyRow>,
    /// How many of those rows carried a parseable timestamp
    pub parsed_count: usize,
}

/// One point of a multi-day heart-rate distribution series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionPoint {
    pub date: NaiveDate,
    pub distribution: Option<HeartRateDistribution>,
}

/// Daily summary pipeline
///
/// Holds configuration only; every call builds a fresh [`RequestContext`], so
/// one pipeline can serve any number of requests.
#[derive(Debug, Clone)]
pub struct DailyPipeline {
    config: PipelineConfig,
    parser: ReadingParser,
    resolver: SessionResolver,
}

impl DailyPipeline {
    /// Create a pipeline, validating the configuration
    pub fn new(config: PipelineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        let normalizer = TimestampNormalizer::new(config.default_offset()?);
        Ok(Self {
            parser: ReadingParser::new(normalizer),
            resolver: SessionResolver::new(config.resolver.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Hourly rows are fetched further back than the requested range so a
    /// night that starts before `range.from` can still resolve into it
    pub fn hourly_range(&self, range: &DateRange) -> DateRange {
        range.extend_back(self.config.session_lookback_days)
    }

    /// Fetch the feeds for `range` and summarize them
    pub fn summarize_source<S: RowSource + ?Sized>(
        &self,
        source: &S,
        range: DateRange,
    ) -> Result<DailySummary, ComputeError> {
        let feeds = fetch_feeds(source, &self.hourly_range(&range), &range)?;
        Ok(self.summarize(&feeds, range))
    }

    /// Produce one record per date in `range` from materialized feeds
    pub fn summarize(&self, feeds: &Feeds, range: DateRange) -> DailySummary {
        let mut ctx = RequestContext::new();
        info!(
            from = %range.from,
            to = %range.to,
            hourly_rows = feeds.hourly.len(),
            daily_rows = feeds.daily.len(),
            manual_entries = feeds.manual.len(),
            "summarizing date range"
        );

        // Stage 1: Parse rows into typed readings
        let readings = self.parser.parse_rows(&feeds.hourly, &mut ctx.diagnostics);

        // Stage 2: Drop replayed stage events and sessions
        let events = ctx
            .dedup
            .dedup_stages(stage_events(&readings), &mut ctx.diagnostics);
        let sessions = ctx
            .dedup
            .dedup_sessions(sleep_sessions(&readings), &mut ctx.diagnostics);

        // Stage 3: Cluster overlapping sessions and pick one per cluster
        let resolutions = self.resolve_sessions(&sessions, &readings, &mut ctx);

        // Stage 4: Attribute and clip stage intervals to days
        let stage_totals = stage_totals_by_day(&events);

        // Stage 5: Aggregate per date
        let mut aggregator = DailyAggregator::new(range);
        aggregator.add_readings(&readings);
        aggregator.add_stage_totals(stage_totals);
        for resolution in &resolutions {
            aggregator.add_session(&resolution.authoritative);
        }
        aggregator.add_daily_feed(&feeds.daily);
        aggregator.add_manual(&feeds.manual);
        let days = aggregator.finish(&mut ctx.diagnostics);

        let diagnostics = ctx.diagnostics.counts().clone();
        info!(
            days = days.len(),
            rows_read = diagnostics.rows_read,
            duplicates = diagnostics.duplicate_stage_events + diagnostics.duplicate_sessions,
            inconclusive_gaps = diagnostics.inconclusive_gaps,
            "summary complete"
        );

        DailySummary {
            range,
            days,
            diagnostics,
        }
    }

    fn resolve_sessions(
        &self,
        sessions: &[AggregatedSleepSession],
        readings: &[Reading],
        ctx: &mut RequestContext,
    ) -> Vec<Resolution> {
        let clusters = cluster_sessions(sessions);
        debug!(sessions = sessions.len(), clusters = clusters.len(), "clustered sessions");

        clusters
            .iter()
            .filter_map(|cluster| self.resolver.resolve(cluster, readings))
            .inspect(|resolution| {
                let inconclusive = resolution
                    .layers
                    .iter()
                    .filter(|l| l.outcome == LayerOutcome::Inconclusive)
                    .count();
                if inconclusive > 0 {
                    ctx.diagnostics.counts_mut().inconclusive_gaps += inconclusive;
                    ctx.diagnostics.flag(
                        Some(attribute_date(resolution.authoritative.end)),
                        QualityFlag::InsufficientEvidence,
                    );
                }
            })
            .collect()
    }

    /// Rows that belong to `date`, plus how many parsed cleanly
    pub fn query_day(&self, rows: &[HourlyRow], date: NaiveDate) -> DayQuery {
        let mut diagnostics = Diagnostics::new();
        let mut matched = Vec::new();
        let mut parsed_count = 0;

        for row in rows {
            let Some(reading) = self.parser.parse_row(row, &mut diagnostics) else {
                continue;
            };
            if reading.day() == Some(date) {
                if reading.timestamp.is_some() {
                    parsed_count += 1;
                }
                matched.push(row.clone());
            }
        }

        debug!(%date, rows = matched.len(), parsed_count, "single-date query");
        DayQuery {
            date,
            rows: matched,
            parsed_count,
        }
    }

    /// Fetch one date's rows from a source and query them
    pub fn query_day_source<S: RowSource + ?Sized>(
        &self,
        source: &S,
        date: NaiveDate,
    ) -> Result<DayQuery, ComputeError> {
        let rows = source.fetch_hourly(&DateRange::single(date))?;
        Ok(self.query_day(&rows, date))
    }

    /// Heart-rate five-number summary for every date in `range`
    pub fn distribution_series(&self, rows: &[HourlyRow], range: DateRange) -> Vec<DistributionPoint> {
        let mut diagnostics = Diagnostics::new();
        let readings = self.parser.parse_rows(rows, &mut diagnostics);

        let mut samples: BTreeMap<NaiveDate, Vec<f64>> =
            range.days().map(|d| (d, Vec::new())).collect();
        for reading in readings
            .iter()
            .filter(|r| r.metric_kind == MetricKind::HeartRate)
        {
            if let (Some(day), Some(value)) = (reading.day(), reading.value) {
                if let Some(bucket) = samples.get_mut(&day) {
                    bucket.push(value);
                }
            }
        }

        samples
            .into_iter()
            .map(|(date, values)| DistributionPoint {
                date,
                distribution: distribution::summarize(&values),
            })
            .collect()
    }
}
