//! Per-cohort summary statistics and the one-sample t-test.
//!
//! All functions take the cohort's winsorized abnormal returns. Statistics
//! that need more data than is available come back undefined rather than
//! as zero.

use crate::{EventStudyError, Result, association::is_constant, stat::Stat};
use polars::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::cmp::Ordering;

fn chunked(values: &[f64]) -> Float64Chunked {
    Float64Chunked::from_slice("return".into(), values)
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    chunked(values).mean()
}

/// Median; the average of the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    chunked(values).median()
}

/// Sample standard deviation with the `n - 1` divisor; `None` for `n < 2`.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    chunked(values).std(1)
}

/// Weighted mean `Σ(r·w) / Σw` over pairs with a positive weight.
///
/// Returns the mean and the number of pairs that carried a weight.
pub fn weighted_mean(pairs: &[(f64, Option<f64>)]) -> (Option<f64>, usize) {
    let (num, den, used) = pairs
        .iter()
        .filter_map(|&(r, w)| w.filter(|w| w.is_finite() && *w > 0.0).map(|w| (r, w)))
        .fold((0.0, 0.0, 0usize), |(num, den, used), (r, w)| {
            (num + r * w, den + w, used + 1)
        });
    ((den > 0.0).then(|| num / den), used)
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
pub fn t_p_value(t: f64, df: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some(2.0 * dist.sf(t.abs()))
}

/// Result of a one-sample t-test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    /// t statistic
    pub t_statistic: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Degrees of freedom (`n - 1`)
    pub df: f64,
}

/// One-sample two-sided t-test of `H0: mean = mu0`.
pub fn one_sample_t_test(values: &[f64], mu0: f64) -> Result<TTest> {
    let n = values.len();
    let sd = sample_std_dev(values)
        .ok_or_else(|| EventStudyError::DegenerateSample(format!("t-test needs n >= 2, got {n}")))?;
    if is_constant(values) {
        return Err(EventStudyError::DegenerateSample(
            "t-test on a zero-variance sample".to_string(),
        ));
    }
    let m = mean(values).unwrap_or_default();
    let df = (n - 1) as f64;
    let t_statistic = (m - mu0) / (sd / (n as f64).sqrt());
    let p_value = t_p_value(t_statistic, df).ok_or_else(|| {
        EventStudyError::DegenerateSample(format!("invalid t distribution with df {df}"))
    })?;
    Ok(TTest {
        t_statistic,
        p_value,
        df,
    })
}

/// Summary statistics of a cohort's abnormal returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveStats {
    /// Number of observations
    pub sample_size: usize,
    /// Mean abnormal return
    pub mean: Stat,
    /// Median abnormal return
    pub median: Stat,
    /// Sample standard deviation
    pub std_dev: Stat,
    /// Market-cap-weighted mean abnormal return
    pub weighted_mean: Stat,
    /// Observations that carried a market cap
    pub weighted_count: usize,
    /// One-sample t statistic against zero
    pub t_statistic: Stat,
    /// Two-sided p-value of the t-test
    pub p_value: Stat,
    /// Observations with a positive abnormal return
    pub positive_count: usize,
    /// Observations with a negative abnormal return
    pub negative_count: usize,
    /// `positive_count / sample_size`
    pub win_ratio: Stat,
}

impl DescriptiveStats {
    /// Describes a cohort from `(return, market cap)` pairs.
    pub fn from_pairs(pairs: &[(f64, Option<f64>)]) -> Self {
        let returns: Vec<f64> = pairs.iter().map(|(r, _)| *r).collect();
        let n = returns.len();
        let (weighted, weighted_count) = weighted_mean(pairs);
        let t_test = one_sample_t_test(&returns, 0.0).ok();
        let positive_count = returns.iter().filter(|r| **r > 0.0).count();
        let negative_count = returns.iter().filter(|r| **r < 0.0).count();

        Self {
            sample_size: n,
            mean: mean(&returns).into(),
            median: median(&returns).into(),
            std_dev: sample_std_dev(&returns).into(),
            weighted_mean: weighted.into(),
            weighted_count,
            t_statistic: t_test.map(|t| t.t_statistic).into(),
            p_value: t_test.map(|t| t.p_value).into(),
            positive_count,
            negative_count,
            win_ratio: (n > 0).then(|| positive_count as f64 / n as f64).into(),
        }
    }
}

/// Volatility of abnormal returns scaled to daily and annual horizons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Volatility {
    /// Standard deviation over the window divided by `sqrt(window_days)`
    pub daily: Stat,
    /// Daily volatility scaled by `sqrt(trading_days_per_year)`
    pub annualized: Stat,
}

impl Volatility {
    /// Scales a window standard deviation.
    pub fn from_std_dev(std_dev: Stat, window_days: u32, trading_days_per_year: f64) -> Self {
        let daily = std_dev.map(|sd| sd / f64::from(window_days).sqrt());
        Self {
            daily,
            annualized: daily.map(|d| d * trading_days_per_year.sqrt()),
        }
    }
}

/// Count and mean abnormal return of one size bucket.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SizeBucket {
    /// Observations in the bucket
    pub count: usize,
    /// Mean abnormal return
    pub mean: Stat,
}

/// Abnormal returns split into market-cap quartiles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SizeEffect {
    /// Smallest quarter by market cap
    pub small: SizeBucket,
    /// Second quarter
    pub medium: SizeBucket,
    /// Third quarter
    pub large: SizeBucket,
    /// Largest quarter
    pub very_large: SizeBucket,
}

impl SizeEffect {
    /// Buckets `(return, market cap)` pairs into four equal-count groups.
    ///
    /// Pairs without a market cap are left out. Bucket `i` holds ranks
    /// `[i·n/4, (i+1)·n/4)`.
    pub fn from_pairs(pairs: &[(f64, Option<f64>)]) -> Self {
        let mut sized: Vec<(f64, f64)> = pairs
            .iter()
            .filter_map(|&(r, cap)| cap.filter(|c| c.is_finite() && *c > 0.0).map(|c| (c, r)))
            .collect();
        sized.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let n = sized.len();
        let mut buckets: [Vec<f64>; 4] = Default::default();
        for (rank, (_, r)) in sized.into_iter().enumerate() {
            buckets[rank * 4 / n].push(r);
        }
        let [small, medium, large, very_large] = buckets.map(|returns| SizeBucket {
            count: returns.len(),
            mean: mean(&returns).into(),
        });
        Self {
            small,
            medium,
            large,
            very_large,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const SAMPLE: [f64; 5] = [0.02, -0.01, 0.03, 0.00, 0.01];

    #[test]
    fn test_closed_form_t_test() {
        let stats = DescriptiveStats::from_pairs(&SAMPLE.map(|r| (r, Some(1.0))));
        assert_eq!(stats.sample_size, 5);
        assert_relative_eq!(stats.mean.value().unwrap(), 0.01, epsilon = 1e-15);
        assert_relative_eq!(stats.median.value().unwrap(), 0.01, epsilon = 1e-15);

        // Σ(x - x̄)² = 0.001, s² = 0.00025
        let sd = 0.00025_f64.sqrt();
        assert_relative_eq!(stats.std_dev.value().unwrap(), sd, epsilon = 1e-12);

        // t = x̄ / (s / √n) = √2
        let t = 0.01 / (sd / 5.0_f64.sqrt());
        assert_relative_eq!(t, std::f64::consts::SQRT_2, epsilon = 1e-9);
        assert_relative_eq!(stats.t_statistic.value().unwrap(), t, epsilon = 1e-9);

        // Student t CDF with 4 df: F(t) = 1/2 + t(t² + 6) / (2(t² + 4)^{3/2})
        let cdf = 0.5 + t * (t * t + 6.0) / (2.0 * (t * t + 4.0).powf(1.5));
        let p = 2.0 * (1.0 - cdf);
        assert_relative_eq!(stats.p_value.value().unwrap(), p, epsilon = 1e-9);
        assert_relative_eq!(p, 0.230_199_6, epsilon = 1e-6);

        assert_relative_eq!(stats.weighted_mean.value().unwrap(), 0.01, epsilon = 1e-15);
        assert_eq!(stats.positive_count, 3);
        assert_eq!(stats.negative_count, 1);
        assert_relative_eq!(stats.win_ratio.value().unwrap(), 0.6);
    }

    #[rstest]
    #[case(1.0)]
    #[case(250.0)]
    #[case(1e6)]
    fn test_equal_weights_reduce_to_mean(#[case] w: f64) {
        let pairs = [0.013, -0.042, 0.007, 0.12, -0.003, 0.051].map(|r| (r, Some(w)));
        let (weighted, used) = weighted_mean(&pairs);
        let returns: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        assert_eq!(used, 6);
        assert_relative_eq!(weighted.unwrap(), mean(&returns).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_weighted_mean_skips_missing_caps() {
        let pairs = [(0.10, Some(3.0)), (0.20, None), (-0.10, Some(1.0))];
        let (weighted, used) = weighted_mean(&pairs);
        assert_eq!(used, 2);
        assert_relative_eq!(weighted.unwrap(), (0.30 - 0.10) / 4.0, epsilon = 1e-12);

        let stats = DescriptiveStats::from_pairs(&pairs);
        assert_eq!(stats.sample_size, 3);
        assert_relative_eq!(stats.mean.value().unwrap(), 0.2 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_cohort_is_all_undefined() {
        let stats = DescriptiveStats::from_pairs(&[]);
        assert_eq!(stats.sample_size, 0);
        assert!(!stats.mean.is_defined());
        assert!(!stats.median.is_defined());
        assert!(!stats.std_dev.is_defined());
        assert!(!stats.weighted_mean.is_defined());
        assert!(!stats.t_statistic.is_defined());
        assert!(!stats.p_value.is_defined());
        assert!(!stats.win_ratio.is_defined());
    }

    #[test]
    fn test_single_observation() {
        let stats = DescriptiveStats::from_pairs(&[(0.05, None)]);
        assert_relative_eq!(stats.mean.value().unwrap(), 0.05);
        assert!(!stats.std_dev.is_defined());
        assert!(!stats.t_statistic.is_defined());
    }

    #[test]
    fn test_zero_variance_t_test_is_degenerate() {
        let err = one_sample_t_test(&[0.01, 0.01, 0.01], 0.0).unwrap_err();
        assert!(matches!(err, EventStudyError::DegenerateSample(_)));
    }

    #[test]
    fn test_median_even_length() {
        assert_relative_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_volatility_scaling() {
        let vol = Volatility::from_std_dev(Stat::new(0.1), 10, 252.0);
        assert_relative_eq!(vol.daily.value().unwrap(), 0.1 / 10.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(
            vol.annualized.value().unwrap(),
            0.1 / 10.0_f64.sqrt() * 252.0_f64.sqrt(),
            epsilon = 1e-12
        );
        assert!(!Volatility::from_std_dev(Stat::UNDEFINED, 10, 252.0).daily.is_defined());
    }

    #[test]
    fn test_size_effect_quartiles() {
        let pairs: Vec<(f64, Option<f64>)> = (1..=8)
            .map(|i| (i as f64 / 100.0, Some(i as f64 * 1_000.0)))
            .chain([(0.5, None)])
            .collect();
        let effect = SizeEffect::from_pairs(&pairs);
        assert_eq!(effect.small.count, 2);
        assert_eq!(effect.very_large.count, 2);
        assert_relative_eq!(effect.small.mean.value().unwrap(), 0.015, epsilon = 1e-12);
        assert_relative_eq!(effect.very_large.mean.value().unwrap(), 0.075, epsilon = 1e-12);

        let empty = SizeEffect::from_pairs(&[(0.1, None)]);
        assert_eq!(empty.large.count, 0);
        assert!(!empty.large.mean.is_defined());
    }
}
