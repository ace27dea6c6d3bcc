//! Association between abnormal return and acquirer carbon intensity.
//!
//! The regressor is `ln(carbon intensity)`, so only deals with a strictly
//! positive intensity take part. Deals dropped here still count in the
//! descriptive statistics of their cohort.

use crate::{
    EventStudyError, Result,
    descriptive::{mean, t_p_value},
    ols::{OlsFit, design_matrix},
    returns::{AbnormalReturn, ExclusionCounts, ExclusionReason},
    stat::Stat,
};
use ndarray::{Array1, Array2};
use serde::Serialize;

/// Relative spread below which a regressor is treated as constant.
const CONSTANT_TOLERANCE: f64 = 1e-12;

/// Paired observations usable by the carbon regression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegressionInput {
    /// `ln(carbon intensity)` per usable deal
    pub log_carbon: Vec<f64>,
    /// Winsorized abnormal return per usable deal
    pub returns: Vec<f64>,
    /// Deals left out of the regression
    pub exclusions: ExclusionCounts,
}

impl RegressionInput {
    /// Collects usable pairs from cohort members.
    pub fn from_members(members: &[&AbnormalReturn]) -> Self {
        let mut input = Self::default();
        for obs in members {
            match obs.carbon_intensity {
                Some(ci) if ci.is_finite() && ci > 0.0 => {
                    input.log_carbon.push(ci.ln());
                    input.returns.push(obs.winsorized_return);
                }
                Some(ci) if ci.is_finite() => {
                    input.exclusions.record(ExclusionReason::NonPositiveCarbonIntensity)
                }
                _ => input.exclusions.record(ExclusionReason::MissingCarbonIntensity),
            }
        }
        input
    }
}

/// Whether every value lies within a negligible spread of the others.
pub fn is_constant(values: &[f64]) -> bool {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let scale = lo.abs().max(hi.abs()).max(1.0);
    !(hi - lo > CONSTANT_TOLERANCE * scale)
}

/// Pearson correlation and its two-sided p-value (t with `n - 2` df).
///
/// `None` when `n < 3` or either series is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len();
    if n < 3 || n != y.len() || is_constant(x) || is_constant(y) {
        return None;
    }
    let (mx, my) = (mean(x)?, mean(y)?);
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let df = (n - 2) as f64;
    let p = if r.abs() < 1.0 {
        t_p_value(r * (df / (1.0 - r * r)).sqrt(), df)?
    } else {
        0.0
    };
    Some((r, p))
}

/// OLS of winsorized abnormal return on `ln(carbon intensity)`.
///
/// Keeps the design matrix so that the heteroskedasticity diagnostics run on
/// exactly the residuals of this fit.
#[derive(Debug, Clone)]
pub struct CarbonRegression {
    /// Design matrix `[1, ln CI]`
    pub design: Array2<f64>,
    /// `ln(carbon intensity)`
    pub log_carbon: Vec<f64>,
    /// Fitted model
    pub fit: OlsFit,
}

impl CarbonRegression {
    /// Fits the regression.
    ///
    /// Fails with [`EventStudyError::DegenerateSample`] below three pairs and
    /// [`EventStudyError::RegressionSingularity`] for a constant regressor.
    pub fn fit(input: &RegressionInput) -> Result<Self> {
        let n = input.returns.len();
        if n < 3 {
            return Err(EventStudyError::DegenerateSample(format!(
                "carbon regression needs at least 3 observations, got {n}"
            )));
        }
        if is_constant(&input.log_carbon) {
            return Err(EventStudyError::RegressionSingularity(
                "carbon intensity is constant across the cohort".to_string(),
            ));
        }
        let design = design_matrix(&[&input.log_carbon]);
        let fit = OlsFit::fit(&design, &Array1::from_vec(input.returns.clone()))?;
        Ok(Self {
            design,
            log_carbon: input.log_carbon.clone(),
            fit,
        })
    }

    /// Number of observations.
    pub fn nobs(&self) -> usize {
        self.fit.nobs
    }

    /// Slope on `ln(carbon intensity)`.
    pub fn slope(&self) -> f64 {
        self.fit.coefficients[1]
    }
}

/// Correlation and regression block of a cohort record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CarbonAssociation {
    /// Pairs with a usable carbon intensity
    pub sample_size: usize,
    /// Pearson correlation of return and log carbon intensity
    pub correlation: Stat,
    /// Two-sided p-value of the correlation
    pub correlation_p_value: Stat,
    /// Regression intercept
    pub intercept: Stat,
    /// Slope on log carbon intensity
    pub coefficient: Stat,
    /// Homoskedastic standard error of the slope
    pub std_error: Stat,
    /// Two-sided p-value of the slope (t with `n - 2` df)
    pub p_value: Stat,
    /// Coefficient of determination
    pub r_squared: Stat,
}

impl CarbonAssociation {
    /// An association block with nothing defined.
    pub const fn undefined(sample_size: usize) -> Self {
        Self {
            sample_size,
            correlation: Stat::UNDEFINED,
            correlation_p_value: Stat::UNDEFINED,
            intercept: Stat::UNDEFINED,
            coefficient: Stat::UNDEFINED,
            std_error: Stat::UNDEFINED,
            p_value: Stat::UNDEFINED,
            r_squared: Stat::UNDEFINED,
        }
    }
}

/// Association block plus the fit the diagnostics need.
#[derive(Debug, Clone)]
pub struct CarbonAnalysis {
    /// Reported statistics
    pub association: CarbonAssociation,
    /// Fitted regression, when one could be estimated
    pub regression: Option<CarbonRegression>,
    /// Cohort members left out of the regression
    pub exclusions: ExclusionCounts,
}

/// Runs correlation and regression over a cohort's members.
pub fn analyze(members: &[&AbnormalReturn]) -> CarbonAnalysis {
    let input = RegressionInput::from_members(members);
    let mut association = CarbonAssociation::undefined(input.returns.len());

    if let Some((r, p)) = pearson(&input.log_carbon, &input.returns) {
        association.correlation = Stat::new(r);
        association.correlation_p_value = Stat::new(p);
    }

    let regression = match CarbonRegression::fit(&input) {
        Ok(regression) => {
            let fit = &regression.fit;
            association.intercept = Stat::new(fit.coefficients[0]);
            association.coefficient = Stat::new(fit.coefficients[1]);
            association.std_error = Stat::new(fit.std_errors[1]);
            association.p_value = fit.p_value(1).into();
            association.r_squared = fit.r_squared().into();
            Some(regression)
        }
        Err(err) => {
            tracing::debug!(%err, pairs = input.returns.len(), "carbon regression undefined");
            None
        }
    };

    CarbonAnalysis {
        association,
        regression,
        exclusions: input.exclusions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::{AcquirerClass, DealProfile, TargetClass};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn obs(ret: f64, ci: Option<f64>) -> AbnormalReturn {
        let day = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        AbnormalReturn {
            deal_id: "D".into(),
            acquirer_name: String::new(),
            target_name: String::new(),
            announcement_date: None,
            start_date: day,
            end_date: day,
            profile: DealProfile {
                acquirer: AcquirerClass::Green,
                target: TargetClass::Green,
            },
            raw_return: ret,
            benchmark_return: 0.0,
            abnormal_return: ret,
            winsorized_return: ret,
            carbon_intensity: ci,
            market_cap: None,
        }
    }

    fn run(rows: &[(f64, Option<f64>)]) -> CarbonAnalysis {
        let owned: Vec<AbnormalReturn> = rows.iter().map(|&(r, ci)| obs(r, ci)).collect();
        let members: Vec<&AbnormalReturn> = owned.iter().collect();
        analyze(&members)
    }

    #[test]
    fn test_regression_on_log_carbon() {
        // ln CI = 1..5, returns chosen so slope 0.8, intercept 0.6, R² 0.64
        let rows: Vec<(f64, Option<f64>)> = [1.0, 3.0, 2.0, 5.0, 4.0]
            .iter()
            .enumerate()
            .map(|(i, r)| (*r, Some(((i + 1) as f64).exp())))
            .collect();
        let analysis = run(&rows);
        let a = analysis.association;

        assert_eq!(a.sample_size, 5);
        assert_relative_eq!(a.coefficient.value().unwrap(), 0.8, epsilon = 1e-9);
        assert_relative_eq!(a.intercept.value().unwrap(), 0.6, epsilon = 1e-9);
        assert_relative_eq!(a.r_squared.value().unwrap(), 0.64, epsilon = 1e-9);
        assert_relative_eq!(a.std_error.value().unwrap(), 0.12_f64.sqrt(), epsilon = 1e-9);
        // r² = R² for a single regressor
        assert_relative_eq!(a.correlation.value().unwrap(), 0.8, epsilon = 1e-9);
        // correlation and slope tests coincide
        assert_relative_eq!(
            a.correlation_p_value.value().unwrap(),
            a.p_value.value().unwrap(),
            epsilon = 1e-9
        );
        assert!(analysis.regression.is_some());
    }

    #[test]
    fn test_constant_carbon_intensity_is_undefined() {
        let rows = [(0.01, Some(120.0)), (0.03, Some(120.0)), (-0.02, Some(120.0)), (0.0, Some(120.0))];
        let analysis = run(&rows);
        let a = analysis.association;
        assert_eq!(a.sample_size, 4);
        assert!(!a.coefficient.is_defined());
        assert!(!a.r_squared.is_defined());
        assert!(!a.correlation.is_defined());
        assert!(analysis.regression.is_none());
    }

    #[test]
    fn test_non_positive_carbon_excluded_from_regression_only() {
        let rows = [
            (0.01, Some(10.0)),
            (0.02, Some(0.0)),
            (0.03, None),
            (0.04, Some(-5.0)),
            (0.05, Some(40.0)),
        ];
        let analysis = run(&rows);
        assert_eq!(analysis.association.sample_size, 2);
        assert_eq!(analysis.exclusions.get(ExclusionReason::NonPositiveCarbonIntensity), 2);
        assert_eq!(analysis.exclusions.get(ExclusionReason::MissingCarbonIntensity), 1);
        assert!(!analysis.association.correlation.is_defined());
    }

    #[rstest]
    #[case(&[], true)]
    #[case(&[1.0, 2.0], false)]
    #[case(&[3.0, 3.0, 3.0], true)]
    #[case(&[1e9, 1e9 + 1e-6, 1e9], true)]
    #[case(&[0.0, 1e-6, 0.0], false)]
    fn test_is_constant(#[case] values: &[f64], #[case] expected: bool) {
        assert_eq!(is_constant(values), expected);
    }

    #[test]
    fn test_pearson_needs_three_points() {
        assert!(pearson(&[1.0, 2.0], &[2.0, 1.0]).is_none());
        let (r, p) = pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap();
        assert_relative_eq!(r, -1.0);
        assert_eq!(p, 0.0);
    }
}
