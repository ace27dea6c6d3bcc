//! Winsorization for outlier handling.
//!
//! Extreme abnormal returns are clipped to the order statistics that bound
//! the configured tails. The bounds are sample values themselves (the
//! nearest retained observation): the `Higher` quantile at `tail` and the
//! `Lower` quantile at `1 - tail`. This keeps
//!
//! - the lower bound at or above the linear `tail` quantile and the upper
//!   bound at or below the linear `1 - tail` quantile;
//! - the sample size unchanged;
//! - winsorizing twice at the same fraction equal to winsorizing once.

use crate::Result;
use polars::prelude::*;

/// Clipping bounds for a sample, or `None` when nothing can be clipped.
///
/// `None` is returned for an empty sample and for samples too small for the
/// two tails to leave any observation between them.
pub fn winsorization_bounds(values: &[f64], tail_fraction: f64) -> Result<Option<(f64, f64)>> {
    let ca = Float64Chunked::from_slice("value".into(), values);
    let lower = ca.quantile(tail_fraction, QuantileMethod::Higher)?;
    let upper = ca.quantile(1.0 - tail_fraction, QuantileMethod::Lower)?;
    Ok(lower.zip(upper).filter(|(lo, hi)| lo <= hi))
}

/// Winsorizes `values` at `tail_fraction` in each tail.
///
/// Values below the lower bound are replaced by it, values above the upper
/// bound likewise. Order and length are preserved.
pub fn winsorize(values: &[f64], tail_fraction: f64) -> Result<Vec<f64>> {
    Ok(match winsorization_bounds(values, tail_fraction)? {
        Some((lower, upper)) => values.iter().map(|v| v.clamp(lower, upper)).collect(),
        None => values.to_vec(),
    })
}
