//! Pipeline configuration
//!
//! The awake-score thresholds used by the nested-session resolver are
//! empirical, so they live here rather than in the resolver. Everything can be
//! loaded from a TOML file; missing keys fall back to the defaults below.

use crate::error::ConfigError;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Thresholds for classifying a gap between nested sleep sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Average heart rate above this adds 2 to the awake score (bpm)
    pub avg_hr_threshold: f64,
    /// Maximum heart rate above this adds 1 (bpm)
    pub max_hr_threshold: f64,
    /// Significant step samples per hour above this adds 2
    pub significant_steps_per_hour: f64,
    /// Total steps per hour above this adds 2
    pub steps_per_hour: f64,
    /// A step sample counts as significant when its count exceeds this
    pub significant_step_count: f64,
    /// Gaps scoring at or above this are awake
    pub awake_score_cutoff: u8,
    /// Gaps longer than this (minutes) are checked for sparse instrumentation
    pub sparse_gap_minutes: f64,
    /// Minimum heart-rate samples per hour for a long gap to be conclusive
    pub min_hr_samples_per_hour: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            avg_hr_threshold: 70.0,
            max_hr_threshold: 85.0,
            significant_steps_per_hour: 1.0,
            steps_per_hour: 20.0,
            significant_step_count: 2.0,
            awake_score_cutoff: 3,
            sparse_gap_minutes: 30.0,
            min_hr_samples_per_hour: 2.0,
        }
    }
}

/// Top-level configuration for one aggregation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Offset applied to timestamps that carry none (minutes east of UTC)
    pub default_utc_offset_minutes: i32,
    /// Days before the requested range whose sessions are still clustered,
    /// so a night that starts before the range can resolve into it
    pub session_lookback_days: u32,
    pub resolver: ResolverConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_utc_offset_minutes: 0,
            session_lookback_days: 1,
            resolver: ResolverConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Render configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Offset used for timestamps that carry none
    pub fn default_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.default_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "default_utc_offset_minutes",
                reason: format!("{} is outside ±24h", self.default_utc_offset_minutes),
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_offset()?;

        let r = &self.resolver;
        let non_negative = [
            ("resolver.avg_hr_threshold", r.avg_hr_threshold),
            ("resolver.max_hr_threshold", r.max_hr_threshold),
            ("resolver.significant_steps_per_hour", r.significant_steps_per_hour),
            ("resolver.steps_per_hour", r.steps_per_hour),
            ("resolver.significant_step_count", r.significant_step_count),
            ("resolver.sparse_gap_minutes", r.sparse_gap_minutes),
            ("resolver.min_hr_samples_per_hour", r.min_hr_samples_per_hour),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{value} must be a non-negative number"),
                });
            }
        }

        if r.awake_score_cutoff > 7 {
            return Err(ConfigError::InvalidValue {
                field: "resolver.awake_score_cutoff",
                reason: format!("{} exceeds the maximum score of 7", r.awake_score_cutoff),
            });
        }

        Ok(())
    }
}
