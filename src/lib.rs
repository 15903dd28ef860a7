//! Synheart Daily - per-day summaries from irregular wearable telemetry
//!
//! Daily turns multi-source hourly rows (heart rate, steps, sleep stages,
//! aggregated sleep sessions) into one consistent record per calendar date
//! through a deterministic pipeline: timestamp normalization → parsing →
//! deduplication → session clustering and resolution → day attribution →
//! aggregation.
//!
//! ## Modules
//!
//! - **Pipeline**: [`DailyPipeline`] runs one request over materialized rows
//! - **Sources**: [`RowSource`] is the seam to the storage backend
//! - **Encoding**: [`SummaryEncoder`] wraps records in a versioned payload

pub mod aggregator;
pub mod attribution;
pub mod cluster;
pub mod config;
pub mod dedup;
pub mod diagnostics;
pub mod distribution;
pub mod encoder;
pub mod error;
pub mod evidence;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod timestamp;
pub mod types;

pub use config::{PipelineConfig, ResolverConfig};
pub use encoder::{SummaryEncoder, SummaryPayload};
pub use error::{ComputeError, ConfigError};
pub use pipeline::{hourly_to_summary_json, DailyPipeline, DailySummary, DayQuery};
pub use source::{InMemorySource, RowSource};
pub use types::{DateRange, DayRecord, QualityFlag};

/// Daily version embedded in all summary payloads
pub const DAILY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for summary payloads
pub const PRODUCER_NAME: &str = "synheart-daily";
