//! Numeric fields that may be explicitly undefined.
//!
//! Every statistic reported by the engine is a [`Stat`]: either a finite
//! value or the undefined marker. Non-finite inputs (division by zero, NaN
//! from an empty reduction) never leak into a report because the only way
//! to build a defined `Stat` is through a finiteness check.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel used when an undefined statistic is rendered as text.
pub const UNDEFINED_SENTINEL: &str = "undefined";

/// A statistic that is either a finite value or undefined.
///
/// Serializes as a JSON number or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stat(Option<f64>);

impl Stat {
    /// The undefined marker.
    pub const UNDEFINED: Self = Self(None);

    /// Wraps a value, mapping NaN and infinities to undefined.
    pub const fn new(value: f64) -> Self {
        if value.is_finite() { Self(Some(value)) } else { Self(None) }
    }

    /// Returns the value if defined.
    pub const fn value(self) -> Option<f64> {
        self.0
    }

    /// Whether the statistic carries a finite value.
    pub const fn is_defined(self) -> bool {
        self.0.is_some()
    }

    /// Applies `f` to a defined value.
    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        self.0.map_or(Self::UNDEFINED, |v| Self::new(f(v)))
    }
}

impl From<f64> for Stat {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Option<f64>> for Stat {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::UNDEFINED, Self::new)
    }
}

impl<E> From<std::result::Result<f64, E>> for Stat {
    fn from(value: std::result::Result<f64, E>) -> Self {
        value.ok().into()
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => match f.precision() {
                Some(p) => write!(f, "{v:.p$}"),
                None => write!(f, "{v}"),
            },
            None => f.write_str(UNDEFINED_SENTINEL),
        }
    }
}
