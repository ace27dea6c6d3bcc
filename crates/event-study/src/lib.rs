#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/event-study/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod association;
pub mod benchmark;
pub mod cohort;
pub mod config;
pub mod deal;
pub mod descriptive;
pub mod error;
pub mod heteroskedasticity;
pub mod ols;
pub mod report;
pub mod returns;
pub mod schema;
pub mod stat;
pub mod study;
pub mod winsorize;

// Re-export core types
pub use benchmark::BenchmarkSeries;
pub use cohort::{CohortDefinition, default_cohorts};
pub use config::{AnalysisParams, StudyConfig};
pub use deal::{AcquirerClass, DealProfile, TargetClass};
pub use error::{EventStudyError, Result};
pub use heteroskedasticity::HcType;
pub use report::{CohortReport, StudyReport, WindowReport, render_summary};
pub use returns::{ExclusionCounts, ExclusionReason};
pub use schema::{ColumnAliases, LogicalField};
pub use stat::Stat;
pub use study::EventStudy;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
