//! Study configuration.
//!
//! [`StudyConfig`] is the single source of tunables for a run. Components do
//! not read it directly: the study narrows it to an [`AnalysisParams`] per
//! event window and passes that value down explicitly.

use crate::{
    EventStudyError, Result, cohort::CohortDefinition, heteroskedasticity::HcType,
    schema::ColumnAliases,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Configuration for a full event-study run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Fraction clipped from each tail when winsorizing abnormal returns.
    pub tail_fraction: f64,
    /// Threshold below which a heteroskedasticity test rejects.
    pub significance_level: f64,
    /// Event window half-lengths in trading days.
    pub windows: Vec<u32>,
    /// Heteroskedasticity-consistent covariance variant for robust errors.
    pub covariance: HcType,
    /// Trading days per year used to annualize volatility.
    pub trading_days_per_year: f64,
    /// Declarative cohort list, evaluated in order.
    pub cohorts: Vec<CohortDefinition>,
    /// Accepted column names per logical field.
    pub columns: ColumnAliases,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            tail_fraction: 0.01,
            significance_level: 0.05,
            windows: vec![3, 10],
            covariance: HcType::default(),
            trading_days_per_year: 252.0,
            cohorts: crate::cohort::default_cohorts(),
            columns: ColumnAliases::default(),
        }
    }
}

impl StudyConfig {
    /// Parses a JSON document layered over the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every tunable is within its domain.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.tail_fraction) {
            return Err(EventStudyError::InvalidConfig(format!(
                "tail_fraction must be in [0, 0.5), got {}",
                self.tail_fraction
            )));
        }
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(EventStudyError::InvalidConfig(format!(
                "significance_level must be in (0, 1), got {}",
                self.significance_level
            )));
        }
        if self.windows.is_empty() {
            return Err(EventStudyError::InvalidConfig(
                "at least one event window is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for &days in &self.windows {
            if days == 0 {
                return Err(EventStudyError::InvalidConfig(
                    "event window length must be positive".to_string(),
                ));
            }
            if !seen.insert(days) {
                return Err(EventStudyError::InvalidConfig(format!(
                    "duplicate event window: {days}"
                )));
            }
        }
        if !(self.trading_days_per_year.is_finite() && self.trading_days_per_year > 0.0) {
            return Err(EventStudyError::InvalidConfig(format!(
                "trading_days_per_year must be positive, got {}",
                self.trading_days_per_year
            )));
        }
        let mut names = HashSet::new();
        for cohort in &self.cohorts {
            if !names.insert(cohort.name.as_str()) {
                return Err(EventStudyError::InvalidConfig(format!(
                    "duplicate cohort name: {}",
                    cohort.name
                )));
            }
        }
        Ok(())
    }

    /// Narrows the configuration to the parameters of one event window.
    pub const fn params(&self, window_days: u32) -> AnalysisParams {
        AnalysisParams {
            tail_fraction: self.tail_fraction,
            significance_level: self.significance_level,
            window_days,
            covariance: self.covariance,
            trading_days_per_year: self.trading_days_per_year,
        }
    }
}

/// Parameters threaded through every component call for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    /// Winsorization tail fraction.
    pub tail_fraction: f64,
    /// Heteroskedasticity significance threshold.
    pub significance_level: f64,
    /// Event window half-length in trading days.
    pub window_days: u32,
    /// Robust covariance variant.
    pub covariance: HcType,
    /// Annualization factor for volatility.
    pub trading_days_per_year: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        StudyConfig::default().params(3)
    }
}
