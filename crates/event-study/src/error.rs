//! Error types for event-study computations.

use crate::returns::ExclusionReason;
use thiserror::Error;

/// Result type for event-study operations.
pub type Result<T> = std::result::Result<T, EventStudyError>;

/// Errors that can occur while running an event study.
#[derive(Debug, Error)]
pub enum EventStudyError {
    /// A required price or benchmark point is absent for one deal and window.
    #[error("Missing observation for deal {deal_id}: {reason}")]
    MissingObservation {
        /// Identifier of the affected deal
        deal_id: String,
        /// Why the observation could not be formed
        reason: ExclusionReason,
    },

    /// No accepted column name matched a logical field
    #[error("Unresolved column for {field}: none of {tried:?} present")]
    UnresolvedColumn {
        /// Logical field that could not be mapped
        field: String,
        /// Literal names that were tried, in order
        tried: Vec<String>,
    },

    /// Insufficient or zero-variance data for a statistic
    #[error("Degenerate sample: {0}")]
    DegenerateSample(String),

    /// Perfectly collinear or constant regressor
    #[error("Regression singularity: {0}")]
    RegressionSingularity(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Benchmark series violates its ordering or value invariants
    #[error("Invalid benchmark series: {0}")]
    InvalidBenchmark(String),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStudyError {
    /// Whether the error is recovered locally (row or statistic level)
    /// rather than aborting the run.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingObservation { .. }
                | Self::DegenerateSample(_)
                | Self::RegressionSingularity(_)
        )
    }
}
