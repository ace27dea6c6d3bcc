//! End-to-end study runs.
//!
//! A run resolves the benchmark once, then for each configured window loads
//! the deal table, computes and winsorizes abnormal returns, segments the
//! sample and analyzes every cohort. Windows and cohorts share nothing but
//! the read-only benchmark, so each is a pure function of its inputs.

use crate::{
    Result,
    association,
    benchmark::BenchmarkSeries,
    cohort::{Cohort, segment},
    config::{AnalysisParams, StudyConfig},
    deal::{DealTable, load_deals},
    descriptive::{DescriptiveStats, SizeEffect, Volatility},
    heteroskedasticity::diagnose,
    report::{CohortReport, StudyReport, WindowReport, audit_frame},
    returns::{ExclusionReason, build_window_sample},
};
use polars::prelude::DataFrame;
use tracing::info;

/// A configured event study.
#[derive(Debug, Clone, Default)]
pub struct EventStudy {
    config: StudyConfig,
}

impl EventStudy {
    /// Creates a study after validating `config`.
    pub fn new(config: StudyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The study configuration.
    pub const fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Runs every configured window over the deal and benchmark tables.
    ///
    /// Fails on the first unresolvable column; row-level problems are
    /// recorded as exclusions instead.
    pub fn run(&self, deals: &DataFrame, benchmark: &DataFrame) -> Result<StudyReport> {
        let benchmark = BenchmarkSeries::from_frame(benchmark, &self.config.columns)?;
        info!(
            deals = deals.height(),
            benchmark_days = benchmark.len(),
            windows = ?self.config.windows,
            "starting event study"
        );

        let windows = self
            .config
            .windows
            .iter()
            .map(|&window_days| {
                let table = load_deals(deals, &self.config.columns, window_days)?;
                self.run_window(&table, &benchmark, window_days)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(StudyReport { windows })
    }

    /// Analyzes one window over an already-loaded deal table.
    pub fn run_window(
        &self,
        table: &DealTable,
        benchmark: &BenchmarkSeries,
        window_days: u32,
    ) -> Result<WindowReport> {
        let params = self.config.params(window_days);
        let sample = build_window_sample(table, benchmark, &params)?;
        let mut report = WindowReport::new(window_days, sample.observations.len(), sample.exclusion_counts());

        for cohort in segment(&sample, &self.config.cohorts) {
            let audit = audit_frame(&cohort.members, &self.config.cohorts)?;
            report.push(analyze_cohort(&cohort, &params), audit);
        }
        Ok(report)
    }
}

/// Computes the full statistical record of one cohort.
///
/// Never fails: statistics that cannot be computed are reported undefined.
pub fn analyze_cohort(cohort: &Cohort<'_>, params: &AnalysisParams) -> CohortReport {
    let pairs: Vec<(f64, Option<f64>)> = cohort
        .members
        .iter()
        .map(|m| (m.winsorized_return, m.market_cap))
        .collect();

    let descriptive = DescriptiveStats::from_pairs(&pairs);
    let volatility =
        Volatility::from_std_dev(descriptive.std_dev, params.window_days, params.trading_days_per_year);
    let size_effect = SizeEffect::from_pairs(&pairs);
    let carbon = association::analyze(&cohort.members);
    let heteroskedasticity = diagnose(carbon.regression.as_ref(), params);

    let mut exclusions = cohort.exclusions.clone();
    exclusions.merge(&carbon.exclusions);
    exclusions.add(
        ExclusionReason::MissingMarketCap,
        descriptive.sample_size - descriptive.weighted_count,
    );

    CohortReport::assemble(
        params.window_days,
        cohort.name(),
        exclusions,
        descriptive,
        volatility,
        size_effect,
        carbon.association,
        heteroskedasticity,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        EventStudyError,
        cohort::CohortDefinition,
        deal::{AcquirerClass, Deal, DealProfile, TargetClass},
    };
    use chrono::{Days, NaiveDate};

    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 4).unwrap() + Days::new(offset)
    }

    fn benchmark() -> BenchmarkSeries {
        BenchmarkSeries::from_closes((0..20).map(|i| (day(i), 100.0 + i as f64 * 0.5))).unwrap()
    }

    fn table() -> DealTable {
        let brown_green = DealProfile {
            acquirer: AcquirerClass::Brown,
            target: TargetClass::Green,
        };
        let green_brown = DealProfile {
            acquirer: AcquirerClass::Green,
            target: TargetClass::Brown,
        };
        let deals = (0..8)
            .map(|i| {
                let profile = if i % 2 == 0 { brown_green } else { green_brown };
                let mut deal = Deal::new(format!("D{i}"), profile)
                    .with_price(-3, day(i), 20.0)
                    .with_price(3, day(i + 6), 20.0 + (i as f64 - 3.0) * 0.4)
                    .with_carbon_intensity(10.0 * (i + 1) as f64);
                if i != 5 {
                    deal = deal.with_market_cap(1_000.0 * (i + 1) as f64);
                }
                deal
            })
            .collect();
        DealTable {
            deals,
            rejected: Vec::new(),
        }
    }

    #[test]
    fn test_run_window_reports_every_cohort() {
        let mut config = StudyConfig::default();
        config
            .cohorts
            .push(CohortDefinition::new("Green Acquirer - Neutral Target")
                .with_acquirer(AcquirerClass::Green)
                .with_target(TargetClass::Neutral));
        let study = EventStudy::new(config).unwrap();
        let window = study.run_window(&table(), &benchmark(), 3).unwrap();

        assert_eq!(window.observations, 8);
        let names: Vec<&str> = window.cohorts.iter().map(|c| c.cohort.as_str()).collect();
        assert_eq!(
            names,
            ["All Deals", "Green Target", "Brown Acquirer - Green Target", "Green Acquirer - Neutral Target"]
        );
        assert_eq!(window.cohort("All Deals").unwrap().sample_size, 8);
        assert_eq!(window.cohort("Green Target").unwrap().sample_size, 4);

        let empty = window.cohort("Green Acquirer - Neutral Target").unwrap();
        assert_eq!(empty.sample_size, 0);
        assert!(!empty.descriptive.mean.is_defined());
        assert!(!empty.association.coefficient.is_defined());
        assert!(!empty.heteroskedasticity.breusch_pagan.lm_statistic.is_defined());
        assert_eq!(window.audit_frame("Green Acquirer - Neutral Target").unwrap().height(), 0);
    }

    #[test]
    fn test_market_cap_exclusion_is_counted() {
        let study = EventStudy::default();
        let window = study.run_window(&table(), &benchmark(), 3).unwrap();
        let all = window.cohort("All Deals").unwrap();
        assert_eq!(all.descriptive.weighted_count, 7);
        assert_eq!(all.exclusions.get(ExclusionReason::MissingMarketCap), 1);
        // D5 is Green/Brown, so the green-target cohort loses nothing
        let green = window.cohort("Green Target").unwrap();
        assert_eq!(green.exclusions.get(ExclusionReason::MissingMarketCap), 0);
    }

    #[test]
    fn test_regression_and_diagnostics_share_a_sample() {
        let study = EventStudy::default();
        let window = study.run_window(&table(), &benchmark(), 3).unwrap();
        let all = window.cohort("All Deals").unwrap();
        assert_eq!(all.association.sample_size, 8);
        assert!(all.association.coefficient.is_defined());
        assert_eq!(
            all.heteroskedasticity.robust.coefficient,
            all.association.coefficient
        );
        assert_eq!(all.heteroskedasticity.robust.r_squared, all.association.r_squared);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = StudyConfig {
            windows: vec![3, 3],
            ..StudyConfig::default()
        };
        assert!(matches!(EventStudy::new(config), Err(EventStudyError::InvalidConfig(_))));
    }
}
