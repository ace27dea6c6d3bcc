//! Abnormal-return calculation for one event window.
//!
//! For each deal the raw return runs from the price at offset `-N` to the
//! price at offset `+N`. The benchmark return is taken over the same two
//! calendar dates and the abnormal return is their difference:
//!
//! ```text
//! raw       = (P_post - P_pre) / P_pre
//! benchmark = (B_post - B_pre) / B_pre
//! abnormal  = raw - benchmark
//! ```
//!
//! A deal with any missing input is dropped from the window, never imputed.
//! Once the window's sample is complete, abnormal returns are winsorized over
//! the whole sample before any cohort sees them.

use crate::{
    EventStudyError, Result,
    benchmark::BenchmarkSeries,
    config::AnalysisParams,
    deal::{Deal, DealProfile, DealTable},
    winsorize::winsorize,
};
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Why an observation was left out of a computation.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Pre- or post-window trading date absent
    #[display("missing event date")]
    MissingEventDate,
    /// No price at the start of the window
    #[display("missing pre-window price")]
    MissingPrePrice,
    /// No price at the end of the window
    #[display("missing post-window price")]
    MissingPostPrice,
    /// Zero, negative or non-finite price
    #[display("non-positive price")]
    NonPositivePrice,
    /// Benchmark has no quote on a required date
    #[display("missing benchmark quote")]
    MissingBenchmarkQuote,
    /// Classification label outside the known set
    #[display("unrecognized classification")]
    UnrecognizedClassification,
    /// Carbon intensity absent (regression only)
    #[display("missing carbon intensity")]
    MissingCarbonIntensity,
    /// Carbon intensity cannot be log-transformed (regression only)
    #[display("non-positive carbon intensity")]
    NonPositiveCarbonIntensity,
    /// Market cap absent (weighted mean and size buckets only)
    #[display("missing market cap")]
    MissingMarketCap,
}

impl ExclusionReason {
    /// Every reason, in reporting order.
    pub const ALL: [Self; 9] = [
        Self::MissingEventDate,
        Self::MissingPrePrice,
        Self::MissingPostPrice,
        Self::NonPositivePrice,
        Self::MissingBenchmarkQuote,
        Self::UnrecognizedClassification,
        Self::MissingCarbonIntensity,
        Self::NonPositiveCarbonIntensity,
        Self::MissingMarketCap,
    ];
}

/// Count of excluded observations per reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionCounts(BTreeMap<ExclusionReason, usize>);

impl ExclusionCounts {
    /// Records one exclusion.
    pub fn record(&mut self, reason: ExclusionReason) {
        self.add(reason, 1);
    }

    /// Records `count` exclusions for one reason.
    pub fn add(&mut self, reason: ExclusionReason, count: usize) {
        if count > 0 {
            *self.0.entry(reason).or_default() += count;
        }
    }

    /// Adds every count of `other`.
    pub fn merge(&mut self, other: &Self) {
        for (reason, count) in other.iter() {
            self.add(reason, count);
        }
    }

    /// Count for one reason.
    pub fn get(&self, reason: ExclusionReason) -> usize {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    /// Total exclusions across reasons.
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Whether nothing was excluded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reasons and counts in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (ExclusionReason, usize)> + '_ {
        self.0.iter().map(|(r, n)| (*r, *n))
    }
}

impl FromIterator<ExclusionReason> for ExclusionCounts {
    fn from_iter<T: IntoIterator<Item = ExclusionReason>>(iter: T) -> Self {
        let mut counts = Self::default();
        for reason in iter {
            counts.record(reason);
        }
        counts
    }
}

/// A deal dropped from a window, with enough context to attribute it to cohorts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    /// Identifier of the dropped deal
    pub deal_id: String,
    /// Why it was dropped
    pub reason: ExclusionReason,
    /// Classification pair, when it could be read
    pub profile: Option<DealProfile>,
}

/// Abnormal return of one deal over one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbnormalReturn {
    /// Deal identifier
    pub deal_id: String,
    /// Acquirer name
    pub acquirer_name: String,
    /// Target name
    pub target_name: String,
    /// Announcement date
    pub announcement_date: Option<NaiveDate>,
    /// Date of the pre-window price
    pub start_date: NaiveDate,
    /// Date of the post-window price
    pub end_date: NaiveDate,
    /// Classification pair
    pub profile: DealProfile,
    /// Raw stock return over the window
    pub raw_return: f64,
    /// Benchmark return over the same dates
    pub benchmark_return: f64,
    /// `raw_return - benchmark_return`
    pub abnormal_return: f64,
    /// Abnormal return after winsorization over the window sample
    pub winsorized_return: f64,
    /// Acquirer carbon intensity
    pub carbon_intensity: Option<f64>,
    /// Acquirer market cap
    pub market_cap: Option<f64>,
}

/// Simple return `(post - pre) / pre`.
///
/// Returns `None` unless both prices are positive and finite.
pub fn simple_return(pre: f64, post: f64) -> Option<f64> {
    let valid = |p: f64| p.is_finite() && p > 0.0;
    (valid(pre) && valid(post)).then(|| (post - pre) / pre)
}

/// Computes the abnormal return of one deal over a `window_days` window.
///
/// Fails with [`EventStudyError::MissingObservation`] naming the first
/// missing input.
pub fn compute_abnormal_return(
    deal: &Deal,
    benchmark: &BenchmarkSeries,
    window_days: u32,
) -> Result<AbnormalReturn> {
    observe(deal, benchmark, window_days).map_err(|reason| EventStudyError::MissingObservation {
        deal_id: deal.id.clone(),
        reason,
    })
}

fn observe(
    deal: &Deal,
    benchmark: &BenchmarkSeries,
    window_days: u32,
) -> std::result::Result<AbnormalReturn, ExclusionReason> {
    let offset = window_days as i32;
    let pre = deal.price_at(-offset).copied().unwrap_or_default();
    let post = deal.price_at(offset).copied().unwrap_or_default();

    let pre_price = pre.price.ok_or(ExclusionReason::MissingPrePrice)?;
    let post_price = post.price.ok_or(ExclusionReason::MissingPostPrice)?;
    let raw_return =
        simple_return(pre_price, post_price).ok_or(ExclusionReason::NonPositivePrice)?;

    let (Some(start_date), Some(end_date)) = (pre.date, post.date) else {
        return Err(ExclusionReason::MissingEventDate);
    };
    let benchmark_return = benchmark
        .return_between(start_date, end_date)
        .ok_or(ExclusionReason::MissingBenchmarkQuote)?;

    let abnormal_return = raw_return - benchmark_return;
    Ok(AbnormalReturn {
        deal_id: deal.id.clone(),
        acquirer_name: deal.acquirer_name.clone(),
        target_name: deal.target_name.clone(),
        announcement_date: deal.announcement_date,
        start_date,
        end_date,
        profile: deal.profile,
        raw_return,
        benchmark_return,
        abnormal_return,
        winsorized_return: abnormal_return,
        carbon_intensity: deal.carbon_intensity,
        market_cap: deal.market_cap,
    })
}

/// All observations of one window after winsorization.
#[derive(Debug, Clone, Default)]
pub struct WindowSample {
    /// Event window half-length
    pub window_days: u32,
    /// Observations with a computable abnormal return
    pub observations: Vec<AbnormalReturn>,
    /// Deals dropped while loading or computing returns
    pub exclusions: Vec<Exclusion>,
}

impl WindowSample {
    /// Exclusion counts over the whole window.
    pub fn exclusion_counts(&self) -> ExclusionCounts {
        self.exclusions.iter().map(|e| e.reason).collect()
    }
}

/// Computes and winsorizes the abnormal returns of every deal for one window.
///
/// A [`EventStudyError::MissingObservation`] drops the deal and is recorded
/// as an exclusion; any other error aborts.
pub fn build_window_sample(
    table: &DealTable,
    benchmark: &BenchmarkSeries,
    params: &AnalysisParams,
) -> Result<WindowSample> {
    let mut sample = WindowSample {
        window_days: params.window_days,
        observations: Vec::with_capacity(table.deals.len()),
        exclusions: table.rejected.clone(),
    };

    for deal in &table.deals {
        match compute_abnormal_return(deal, benchmark, params.window_days) {
            Ok(obs) => sample.observations.push(obs),
            Err(EventStudyError::MissingObservation { deal_id, reason }) => {
                debug!(deal = %deal_id, %reason, window = params.window_days, "dropping deal");
                sample.exclusions.push(Exclusion {
                    deal_id,
                    reason,
                    profile: Some(deal.profile),
                });
            }
            Err(err) => return Err(err),
        }
    }

    let raw: Vec<f64> = sample.observations.iter().map(|o| o.abnormal_return).collect();
    let clipped = winsorize(&raw, params.tail_fraction)?;
    for (obs, value) in sample.observations.iter_mut().zip(clipped) {
        obs.winsorized_return = value;
    }

    info!(
        window = params.window_days,
        observations = sample.observations.len(),
        excluded = sample.exclusions.len(),
        "built window sample"
    );
    Ok(sample)
}
