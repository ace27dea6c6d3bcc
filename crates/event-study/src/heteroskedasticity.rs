//! Heteroskedasticity diagnostics for the carbon regression.
//!
//! Both tests regress the squared OLS residuals `e²` on a set of auxiliary
//! regressors and report the Lagrange-multiplier form `LM = n·R²_aux`
//! (chi-squared with `k` df) next to the auxiliary regression's F test:
//!
//! | test          | auxiliary regressors | k |
//! |---------------|----------------------|---|
//! | Breusch-Pagan | `ln CI`              | 1 |
//! | White         | `ln CI`, `(ln CI)²`  | 2 |
//!
//! When either LM p-value falls below the significance level, the slope's
//! standard error is re-estimated with a sandwich covariance
//!
//! ```text
//! (X'X)^-1 X' diag(ω) X (X'X)^-1,   ω_i = e_i² · scale_i
//! ```
//!
//! where `scale_i` depends on the [`HcType`].

use crate::{
    EventStudyError, Result,
    association::{CarbonRegression, is_constant},
    config::AnalysisParams,
    ols::{OlsFit, design_matrix},
    stat::Stat,
};
use derive_more::Display;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize, Serializer};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use tracing::{debug, warn};

/// Leverage above which `1 - h` is treated as zero.
const MAX_LEVERAGE: f64 = 1.0 - 1e-10;

/// Heteroskedasticity-consistent covariance variant.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum HcType {
    /// White's estimator, `ω = e²`
    HC0,
    /// Degrees-of-freedom corrected, `ω = e² · n / (n - p)`
    HC1,
    /// Leverage corrected, `ω = e² / (1 - h)`
    HC2,
    /// Jackknife approximation, `ω = e² / (1 - h)²`
    #[default]
    HC3,
}

impl HcType {
    fn weight(self, residual: f64, leverage: f64, nobs: usize, nparams: usize) -> Option<f64> {
        let e2 = residual * residual;
        match self {
            Self::HC0 => Some(e2),
            Self::HC1 => Some(e2 * nobs as f64 / (nobs - nparams) as f64),
            Self::HC2 | Self::HC3 if leverage >= MAX_LEVERAGE => None,
            Self::HC2 => Some(e2 / (1.0 - leverage)),
            Self::HC3 => Some(e2 / (1.0 - leverage).powi(2)),
        }
    }
}

/// Sandwich covariance of the coefficients of `fit`.
///
/// Fails with [`EventStudyError::DegenerateSample`] when HC2/HC3 meet an
/// observation with leverage one.
pub fn hc_covariance(fit: &OlsFit, design: &Array2<f64>, hc: HcType) -> Result<Array2<f64>> {
    let leverage = fit.leverage(design);
    let (n, p) = design.dim();
    let omega = fit
        .residuals
        .iter()
        .zip(&leverage)
        .map(|(e, h)| hc.weight(*e, *h, n, p))
        .collect::<Option<Array1<f64>>>()
        .ok_or_else(|| {
            EventStudyError::DegenerateSample(format!("{hc} undefined for an observation with leverage one"))
        })?;

    let weighted = design * &omega.insert_axis(Axis(1));
    let meat = design.t().dot(&weighted);
    Ok(fit.xtx_inv.dot(&meat).dot(&fit.xtx_inv))
}

/// Outcome of one auxiliary-regression test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HetTest {
    /// `n · R²` of the auxiliary regression
    pub lm_statistic: Stat,
    /// Chi-squared p-value of the LM statistic
    pub lm_p_value: Stat,
    /// F statistic of the auxiliary regression
    pub f_statistic: Stat,
    /// p-value of the F statistic
    pub f_p_value: Stat,
    /// Number of auxiliary regressors
    pub df: usize,
}

impl HetTest {
    /// A test that could not be run.
    pub const fn undefined(df: usize) -> Self {
        Self {
            lm_statistic: Stat::UNDEFINED,
            lm_p_value: Stat::UNDEFINED,
            f_statistic: Stat::UNDEFINED,
            f_p_value: Stat::UNDEFINED,
            df,
        }
    }

    /// Whether the LM test rejects homoskedasticity at `alpha`.
    pub fn rejects(&self, alpha: f64) -> Option<bool> {
        self.lm_p_value.value().map(|p| p < alpha)
    }
}

/// Regresses squared residuals on `regressors` and builds the LM and F tests.
pub fn auxiliary_test(residuals: &Array1<f64>, regressors: &[&[f64]]) -> Result<HetTest> {
    let df = regressors.len();
    let squared = residuals.mapv(|e| e * e);
    if is_constant(squared.as_slice().unwrap_or_default()) {
        return Err(EventStudyError::DegenerateSample(
            "squared residuals have no variance".to_string(),
        ));
    }
    let aux = OlsFit::fit(&design_matrix(regressors), &squared)?;
    let r2 = aux.r_squared().ok_or_else(|| {
        EventStudyError::DegenerateSample("squared residuals have no variance".to_string())
    })?;

    let lm = aux.nobs as f64 * r2;
    let lm_p_value = ChiSquared::new(df as f64)
        .map(|chi2| chi2.sf(lm))
        .map_err(|e| EventStudyError::DegenerateSample(e.to_string()))?;
    let f_test = aux.f_test();

    Ok(HetTest {
        lm_statistic: Stat::new(lm),
        lm_p_value: Stat::new(lm_p_value),
        f_statistic: f_test.map(|(f, _)| f).into(),
        f_p_value: f_test.map(|(_, p)| p).into(),
        df,
    })
}

/// Breusch-Pagan test (Koenker's studentized form) on the carbon regression.
pub fn breusch_pagan(regression: &CarbonRegression) -> Result<HetTest> {
    auxiliary_test(&regression.fit.residuals, &[&regression.log_carbon])
}

/// White test on the carbon regression: regressor and its square.
pub fn white(regression: &CarbonRegression) -> Result<HetTest> {
    let squares: Vec<f64> = regression.log_carbon.iter().map(|x| x * x).collect();
    auxiliary_test(&regression.fit.residuals, &[&regression.log_carbon, &squares])
}

/// Covariance estimator behind a reported standard error.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum CovarianceSource {
    /// Homoskedastic OLS covariance
    #[display("OLS")]
    Ordinary,
    /// Sandwich estimator
    #[display("{_0}")]
    Robust(HcType),
}

impl Serialize for CovarianceSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What the diagnostics say about the OLS standard errors.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpretation {
    /// At least one test rejected
    #[display("Evidence of heteroskedasticity detected. Using robust standard errors is recommended.")]
    Heteroskedastic,
    /// Neither test rejected
    #[display("No significant evidence of heteroskedasticity. Standard errors are reliable.")]
    Homoskedastic,
    /// The tests could not be run
    #[display("Heteroskedasticity tests undefined for this sample.")]
    Undefined,
}

/// Slope re-estimated under the interpretation policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RobustEstimate {
    /// Slope on log carbon intensity; identical to the OLS slope
    pub coefficient: Stat,
    /// Standard error from `covariance`
    pub std_error: Stat,
    /// Two-sided p-value of the slope
    pub p_value: Stat,
    /// R² of the regression
    pub r_squared: Stat,
    /// Estimator behind `std_error`
    pub covariance: CovarianceSource,
}

impl RobustEstimate {
    /// An estimate with nothing defined.
    pub const fn undefined() -> Self {
        Self {
            coefficient: Stat::UNDEFINED,
            std_error: Stat::UNDEFINED,
            p_value: Stat::UNDEFINED,
            r_squared: Stat::UNDEFINED,
            covariance: CovarianceSource::Ordinary,
        }
    }
}

/// Diagnostics block of a cohort record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeteroskedasticityDiagnostics {
    /// Breusch-Pagan test
    pub breusch_pagan: HetTest,
    /// White test
    pub white: HetTest,
    /// Whether either test rejected; `None` when neither could run
    pub heteroskedastic: Option<bool>,
    /// Reading of the two tests
    pub interpretation: Interpretation,
    /// Slope standard error under the configured HC estimator, flagged or not
    pub hc_std_error: Stat,
    /// Slope inference chosen by the interpretation policy
    pub robust: RobustEstimate,
}

impl HeteroskedasticityDiagnostics {
    /// A diagnostics block with nothing defined.
    pub const fn undefined() -> Self {
        Self {
            breusch_pagan: HetTest::undefined(1),
            white: HetTest::undefined(2),
            heteroskedastic: None,
            interpretation: Interpretation::Undefined,
            hc_std_error: Stat::UNDEFINED,
            robust: RobustEstimate::undefined(),
        }
    }
}

/// Two-sided p-value of a z statistic.
fn normal_p_value(z: f64) -> Option<f64> {
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some(2.0 * normal.sf(z.abs()))
}

/// Runs both tests on `regression` and applies the interpretation policy.
///
/// The whole block is undefined without a regression, with fewer than four
/// observations, or when the Breusch-Pagan auxiliary regression is
/// degenerate. A White test that alone is singular (a regressor with two
/// distinct values) is reported undefined and the policy uses Breusch-Pagan
/// only.
pub fn diagnose(
    regression: Option<&CarbonRegression>,
    params: &AnalysisParams,
) -> HeteroskedasticityDiagnostics {
    let Some(regression) = regression else {
        return HeteroskedasticityDiagnostics::undefined();
    };
    if regression.nobs() <= 3 {
        debug!(nobs = regression.nobs(), "too few observations for White test");
        return HeteroskedasticityDiagnostics::undefined();
    }
    let breusch_pagan = match breusch_pagan(regression) {
        Ok(test) => test,
        Err(err) => {
            debug!(%err, "Breusch-Pagan test undefined");
            return HeteroskedasticityDiagnostics::undefined();
        }
    };
    let white = white(regression).unwrap_or_else(|err| {
        debug!(%err, "White test undefined");
        HetTest::undefined(2)
    });

    let alpha = params.significance_level;
    let heteroskedastic = match (breusch_pagan.rejects(alpha), white.rejects(alpha)) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(false) || b.unwrap_or(false)),
    };

    let fit = &regression.fit;
    let slope = fit.coefficients[1];
    let hc_std_error: Stat = hc_covariance(fit, &regression.design, params.covariance)
        .map(|cov| cov[[1, 1]].sqrt())
        .into();

    let (interpretation, robust) = if heteroskedastic == Some(true) {
        warn!(
            bp_p = %breusch_pagan.lm_p_value,
            white_p = %white.lm_p_value,
            "heteroskedasticity detected, reporting {} standard errors",
            params.covariance
        );
        let robust = RobustEstimate {
            coefficient: Stat::new(slope),
            std_error: hc_std_error,
            p_value: hc_std_error.value().and_then(|se| normal_p_value(slope / se)).into(),
            r_squared: fit.r_squared().into(),
            covariance: CovarianceSource::Robust(params.covariance),
        };
        (Interpretation::Heteroskedastic, robust)
    } else {
        let robust = RobustEstimate {
            coefficient: Stat::new(slope),
            std_error: Stat::new(fit.std_errors[1]),
            p_value: fit.p_value(1).into(),
            r_squared: fit.r_squared().into(),
            covariance: CovarianceSource::Ordinary,
        };
        (Interpretation::Homoskedastic, robust)
    };

    HeteroskedasticityDiagnostics {
        breusch_pagan,
        white,
        heteroskedastic,
        interpretation,
        hc_std_error,
        robust,
    }
}
