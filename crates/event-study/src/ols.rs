//! Ordinary least squares with an intercept.
//!
//! Sized for the handful of regressors the study needs (the carbon regression
//! and its auxiliary heteroskedasticity regressions), so the normal equations
//! are solved directly, inverting `X'X` with nalgebra:
//!
//! ```text
//! β = (X'X)^-1 X'y
//! Var(β) = σ² (X'X)^-1,   σ² = SSR / (n - p)
//! R² = 1 - SSR / SST
//! ```

use crate::{EventStudyError, Result};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

/// Condition number of `X'X` above which the design is treated as rank deficient.
const MAX_CONDITION_NUMBER: f64 = 1e12;

/// Builds a design matrix with a leading constant column.
pub fn design_matrix(regressors: &[&[f64]]) -> Array2<f64> {
    let n = regressors.first().map_or(0, |r| r.len());
    let mut x = Array2::<f64>::ones((n, regressors.len() + 1));
    for (j, column) in regressors.iter().enumerate() {
        for (i, value) in column.iter().enumerate() {
            x[[i, j + 1]] = *value;
        }
    }
    x
}

/// `(X'X)^-1` for a design matrix `x`.
///
/// Fails with [`EventStudyError::RegressionSingularity`] when the columns of
/// `x` are collinear, judged by the condition number of `X'X`.
pub fn normal_inverse(x: &Array2<f64>) -> Result<Array2<f64>> {
    let gram = x.t().dot(x);
    let p = gram.nrows();
    let xtx = DMatrix::from_fn(p, p, |i, j| gram[[i, j]]);

    let svals = xtx.singular_values();
    let s_max = svals.iter().fold(0.0_f64, |a, &b| a.max(b));
    let s_min = svals.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    if !(s_min * MAX_CONDITION_NUMBER > s_max) {
        return Err(EventStudyError::RegressionSingularity(format!(
            "design matrix is rank deficient (condition number {:.1e})",
            s_max / s_min
        )));
    }

    let inv = xtx
        .try_inverse()
        .ok_or_else(|| EventStudyError::RegressionSingularity("X'X is singular".to_string()))?;
    Ok(Array2::from_shape_fn((p, p), |(i, j)| inv[(i, j)]))
}

/// A fitted OLS model.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Coefficients, intercept first
    pub coefficients: Array1<f64>,
    /// Homoskedastic standard errors
    pub std_errors: Array1<f64>,
    /// Fitted values `Xβ`
    pub fitted: Array1<f64>,
    /// Residuals `y - Xβ`
    pub residuals: Array1<f64>,
    /// `(X'X)^-1`
    pub xtx_inv: Array2<f64>,
    /// Sum of squared residuals
    pub ssr: f64,
    /// Centered total sum of squares
    pub sst: f64,
    /// Number of observations
    pub nobs: usize,
    /// Regressors excluding the intercept
    pub df_model: usize,
    /// `n - p`
    pub df_resid: usize,
}

impl OlsFit {
    /// Fits `y` on `x`; `x` must carry its own constant column.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let (n, p) = x.dim();
        if n != y.len() {
            return Err(EventStudyError::DegenerateSample(format!(
                "{n} design rows but {} responses",
                y.len()
            )));
        }
        if n <= p {
            return Err(EventStudyError::DegenerateSample(format!(
                "regression with {p} parameters needs more than {p} observations, got {n}"
            )));
        }

        let xtx_inv = normal_inverse(x)?;
        let coefficients = xtx_inv.dot(&x.t().dot(y));
        let fitted = x.dot(&coefficients);
        let residuals = y - &fitted;

        let ssr = residuals.mapv(|e| e * e).sum();
        let y_mean = y.mean().unwrap_or_default();
        let sst = y.mapv(|v| (v - y_mean).powi(2)).sum();
        let df_resid = n - p;
        let sigma2 = ssr / df_resid as f64;
        let std_errors = xtx_inv.diag().mapv(|v| (sigma2 * v).sqrt());

        Ok(Self {
            coefficients,
            std_errors,
            fitted,
            residuals,
            xtx_inv,
            ssr,
            sst,
            nobs: n,
            df_model: p - 1,
            df_resid,
        })
    }

    /// `1 - SSR / SST`; `None` when the response is constant.
    pub fn r_squared(&self) -> Option<f64> {
        (self.sst > 0.0).then(|| 1.0 - self.ssr / self.sst)
    }

    /// t statistic of coefficient `j`.
    pub fn t_statistic(&self, j: usize) -> Option<f64> {
        let se = self.std_errors[j];
        (se > 0.0).then(|| self.coefficients[j] / se)
    }

    /// Two-sided p-value of coefficient `j` on `n - p` degrees of freedom.
    pub fn p_value(&self, j: usize) -> Option<f64> {
        crate::descriptive::t_p_value(self.t_statistic(j)?, self.df_resid as f64)
    }

    /// Overall F statistic and its p-value for `H0: all slopes = 0`.
    pub fn f_test(&self) -> Option<(f64, f64)> {
        let r2 = self.r_squared()?;
        if self.df_model == 0 || r2 >= 1.0 {
            return None;
        }
        let (d1, d2) = (self.df_model as f64, self.df_resid as f64);
        let f = (r2 / d1) / ((1.0 - r2) / d2);
        let dist = FisherSnedecor::new(d1, d2).ok()?;
        Some((f, dist.sf(f)))
    }

    /// Leverages `h_ii = x_i' (X'X)^-1 x_i`.
    pub fn leverage(&self, x: &Array2<f64>) -> Array1<f64> {
        let projected = x.dot(&self.xtx_inv);
        (&projected * x).sum_axis(Axis(1))
    }
}
