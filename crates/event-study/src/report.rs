//! Report assembly and export.
//!
//! One [`CohortReport`] is produced for every configured cohort in every
//! requested window, including empty cohorts. Reports serialize with serde;
//! [`CohortReport::flat_record`] gives the dotted key-value form and
//! [`WindowReport::summary_frame`] the tabular one. Undefined statistics are
//! JSON `null` and polars null, never zero.

use crate::{
    Result,
    association::CarbonAssociation,
    cohort::{CohortDefinition, memberships},
    descriptive::{DescriptiveStats, SizeEffect, Volatility},
    heteroskedasticity::{HetTest, HeteroskedasticityDiagnostics},
    returns::{AbnormalReturn, ExclusionCounts, ExclusionReason},
};
use polars::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Statistical result for one cohort in one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortReport {
    /// Event window half-length in trading days
    pub window_days: u32,
    /// Cohort name
    pub cohort: String,
    /// Members with a computable abnormal return
    pub sample_size: usize,
    /// Observations left out of any statistic, per reason
    pub exclusions: ExclusionCounts,
    /// Central tendency, dispersion and the t-test
    pub descriptive: DescriptiveStats,
    /// Daily and annualized volatility
    pub volatility: Volatility,
    /// Market-cap quartiles
    pub size_effect: SizeEffect,
    /// Correlation and regression on log carbon intensity
    pub association: CarbonAssociation,
    /// Breusch-Pagan, White and robust re-estimation
    pub heteroskedasticity: HeteroskedasticityDiagnostics,
}

impl CohortReport {
    /// Collects the per-component outputs into one record.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        window_days: u32,
        cohort: impl Into<String>,
        exclusions: ExclusionCounts,
        descriptive: DescriptiveStats,
        volatility: Volatility,
        size_effect: SizeEffect,
        association: CarbonAssociation,
        heteroskedasticity: HeteroskedasticityDiagnostics,
    ) -> Self {
        Self {
            window_days,
            cohort: cohort.into(),
            sample_size: descriptive.sample_size,
            exclusions,
            descriptive,
            volatility,
            size_effect,
            association,
            heteroskedasticity,
        }
    }

    /// Flattens the record into dotted keys.
    ///
    /// Every exclusion reason is present, with zero when nothing was dropped
    /// for it, so records from different cohorts share one key set.
    pub fn flat_record(&self) -> Result<BTreeMap<String, Value>> {
        let mut record = BTreeMap::new();
        flatten("", serde_json::to_value(self)?, &mut record);
        for reason in ExclusionReason::ALL {
            let key = format!("exclusions.{}", serde_json::to_value(reason)?.as_str().unwrap_or_default());
            record.insert(key, Value::from(self.exclusions.get(reason)));
        }
        Ok(record)
    }
}

fn flatten(prefix: &str, value: Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = if prefix.is_empty() { key } else { format!("{prefix}.{key}") };
                flatten(&key, child, out);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf);
        }
    }
}

/// Builds one polars column from JSON leaves sharing a key.
///
/// Counts become `UInt64`, statistics `Float64` (also when every cell is
/// undefined), flags `Boolean` and labels `String`.
fn json_column(name: &str, values: &[Value]) -> Column {
    let defined: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    if !defined.is_empty() && defined.iter().all(|v| v.is_boolean()) {
        let cells: Vec<Option<bool>> = values.iter().map(Value::as_bool).collect();
        Column::new(name.into(), cells)
    } else if !defined.is_empty() && defined.iter().all(|v| v.is_u64()) {
        let cells: Vec<Option<u64>> = values.iter().map(Value::as_u64).collect();
        Column::new(name.into(), cells)
    } else if defined.iter().all(|v| v.is_number()) {
        let cells: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
        Column::new(name.into(), cells)
    } else {
        let cells: Vec<Option<String>> = values
            .iter()
            .map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        Column::new(name.into(), cells)
    }
}

/// Sort key placing provenance columns first.
fn column_order(key: &str) -> (bool, bool, &str) {
    (key != "window_days", key != "cohort", key)
}

/// All cohort results of one window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    /// Event window half-length in trading days
    pub window_days: u32,
    /// Observations with a computable abnormal return
    pub observations: usize,
    /// Deals dropped from the window before segmentation
    pub exclusions: ExclusionCounts,
    /// One record per configured cohort, in configuration order
    pub cohorts: Vec<CohortReport>,
    #[serde(skip)]
    audits: BTreeMap<String, DataFrame>,
}

impl WindowReport {
    /// Creates an empty window report.
    pub const fn new(window_days: u32, observations: usize, exclusions: ExclusionCounts) -> Self {
        Self {
            window_days,
            observations,
            exclusions,
            cohorts: Vec::new(),
            audits: BTreeMap::new(),
        }
    }

    /// Appends a cohort record and its row-level table.
    pub fn push(&mut self, report: CohortReport, audit: DataFrame) {
        self.audits.insert(report.cohort.clone(), audit);
        self.cohorts.push(report);
    }

    /// Record of the named cohort.
    pub fn cohort(&self, name: &str) -> Option<&CohortReport> {
        self.cohorts.iter().find(|c| c.cohort == name)
    }

    /// Row-level abnormal returns behind the named cohort.
    pub fn audit_frame(&self, cohort: &str) -> Option<&DataFrame> {
        self.audits.get(cohort)
    }

    /// Flat records of every cohort.
    pub fn records(&self) -> Result<Vec<BTreeMap<String, Value>>> {
        self.cohorts.iter().map(CohortReport::flat_record).collect()
    }

    /// One row per cohort, one column per flat-record key.
    pub fn summary_frame(&self) -> Result<DataFrame> {
        let records = self.records()?;
        let mut keys: Vec<&String> = records.first().map(|r| r.keys().collect()).unwrap_or_default();
        keys.sort_by(|a, b| column_order(a).cmp(&column_order(b)));

        let columns = keys
            .into_iter()
            .map(|key| {
                let values: Vec<Value> =
                    records.iter().map(|r| r.get(key).cloned().unwrap_or(Value::Null)).collect();
                json_column(key, &values)
            })
            .collect();
        Ok(DataFrame::new(columns)?)
    }
}

/// Row-level table of a cohort's abnormal returns.
pub fn audit_frame(
    members: &[&AbnormalReturn],
    definitions: &[CohortDefinition],
) -> Result<DataFrame> {
    let text = |f: fn(&AbnormalReturn) -> String| -> Vec<String> { members.iter().map(|m| f(m)).collect() };
    let float = |f: fn(&AbnormalReturn) -> f64| -> Vec<f64> { members.iter().map(|m| f(m)).collect() };
    let optional = |f: fn(&AbnormalReturn) -> Option<f64>| -> Vec<Option<f64>> {
        members.iter().map(|m| f(m)).collect()
    };

    Ok(df![
        "deal_id" => text(|m| m.deal_id.clone()),
        "acquirer_name" => text(|m| m.acquirer_name.clone()),
        "target_name" => text(|m| m.target_name.clone()),
        "acquirer_classification" => text(|m| m.profile.acquirer.to_string()),
        "target_classification" => text(|m| m.profile.target.to_string()),
        "announcement_date" => members.iter().map(|m| m.announcement_date).collect::<Vec<_>>(),
        "start_date" => members.iter().map(|m| m.start_date).collect::<Vec<_>>(),
        "end_date" => members.iter().map(|m| m.end_date).collect::<Vec<_>>(),
        "raw_return" => float(|m| m.raw_return),
        "benchmark_return" => float(|m| m.benchmark_return),
        "abnormal_return" => float(|m| m.abnormal_return),
        "winsorized_return" => float(|m| m.winsorized_return),
        "carbon_intensity" => optional(|m| m.carbon_intensity),
        "log_carbon_intensity" => optional(|m| m.carbon_intensity.filter(|c| *c > 0.0).map(f64::ln)),
        "market_cap" => optional(|m| m.market_cap),
        "cohorts" => members.iter().map(|m| memberships(m, definitions).join("|")).collect::<Vec<_>>(),
    ]?)
}

fn write_test(out: &mut String, title: &str, test: &HetTest) -> std::fmt::Result {
    writeln!(out, "\n{title}:")?;
    writeln!(out, "LM Statistic: {:.4}", test.lm_statistic)?;
    writeln!(out, "P-value: {:.4}", test.lm_p_value)?;
    writeln!(out, "F-statistic: {:.4}", test.f_statistic)?;
    writeln!(out, "F-test P-value: {:.4}", test.f_p_value)
}

fn write_window(out: &mut String, window: &WindowReport) -> std::fmt::Result {
    writeln!(out, "Heteroskedasticity Analysis Summary ({}-day window)", window.window_days)?;
    writeln!(out, "{}", "=".repeat(50))?;
    for cohort in &window.cohorts {
        let diag = &cohort.heteroskedasticity;
        writeln!(out, "\n{}", cohort.cohort)?;
        writeln!(out, "{}", "-".repeat(30))?;
        write_test(out, "Breusch-Pagan Test", &diag.breusch_pagan)?;
        write_test(out, "White Test", &diag.white)?;

        let robust = &diag.robust;
        writeln!(out, "\nStandard Errors ({}):", robust.covariance)?;
        writeln!(out, "Coefficient: {:.4}", robust.coefficient)?;
        writeln!(out, "Standard Error: {:.4}", robust.std_error)?;
        writeln!(out, "P-value: {:.4}", robust.p_value)?;
        writeln!(out, "R-squared: {:.4}", robust.r_squared)?;

        writeln!(out, "\nInterpretation:")?;
        writeln!(out, "{}", diag.interpretation)?;
    }
    Ok(())
}

/// Human-readable heteroskedasticity summary of one window.
pub fn render_summary(window: &WindowReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_window(&mut out, window);
    out
}

/// Results of a full study run.
#[derive(Debug, Clone, Serialize)]
pub struct StudyReport {
    /// One report per configured window, in configuration order
    pub windows: Vec<WindowReport>,
}

impl StudyReport {
    /// Report of one window.
    pub fn window(&self, window_days: u32) -> Option<&WindowReport> {
        self.windows.iter().find(|w| w.window_days == window_days)
    }

    /// Flat records of every (window, cohort) pair.
    pub fn records(&self) -> Result<Vec<BTreeMap<String, Value>>> {
        let mut records = Vec::new();
        for window in &self.windows {
            records.extend(window.records()?);
        }
        Ok(records)
    }

    /// Pretty-printed JSON of the whole study.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON object keyed by window, then cohort, mirroring the report layout.
    pub fn to_value(&self) -> Result<Value> {
        let mut root = Map::new();
        for window in &self.windows {
            let mut cohorts = Map::new();
            for cohort in &window.cohorts {
                cohorts.insert(cohort.cohort.clone(), serde_json::to_value(cohort)?);
            }
            root.insert(format!("{}_day", window.window_days), Value::Object(cohorts));
        }
        Ok(Value::Object(root))
    }
}
