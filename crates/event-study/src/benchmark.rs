//! Reference-index series used to compute benchmark returns.
//!
//! The series is loaded once and only read afterwards, so a single instance
//! can be shared across window computations.

use crate::{
    EventStudyError, Result,
    schema::{BenchmarkLevel, ColumnAliases, date_values, f64_values},
};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Level assigned to the first date when chaining daily returns.
const INDEX_BASE: f64 = 100.0;

/// Date-indexed closing levels of a reference index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkSeries {
    closes: BTreeMap<NaiveDate, f64>,
}

impl BenchmarkSeries {
    /// Builds a series from closing prices.
    ///
    /// Dates must be strictly increasing and prices positive and finite.
    pub fn from_closes(points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Result<Self> {
        let mut closes = BTreeMap::new();
        let mut last: Option<NaiveDate> = None;
        for (date, close) in points {
            if let Some(prev) = last
                && date <= prev
            {
                return Err(EventStudyError::InvalidBenchmark(format!(
                    "dates not strictly increasing: {date} follows {prev}"
                )));
            }
            if !(close.is_finite() && close > 0.0) {
                return Err(EventStudyError::InvalidBenchmark(format!(
                    "non-positive close {close} on {date}"
                )));
            }
            closes.insert(date, close);
            last = Some(date);
        }
        Ok(Self { closes })
    }

    /// Builds a series by chaining daily percent returns into an index.
    ///
    /// The first date sits at the index base; each later level is the previous
    /// one scaled by `1 + r / 100`, so a price ratio between two dates equals
    /// the compounded return over the days in between.
    pub fn from_daily_returns(points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Result<Self> {
        let mut level = None;
        let mut levels = Vec::new();
        for (date, pct) in points {
            let next = match level {
                None => INDEX_BASE,
                Some(prev) => prev * (1.0 + pct / 100.0),
            };
            level = Some(next);
            levels.push((date, next));
        }
        Self::from_closes(levels)
    }

    /// Loads the series from a benchmark table.
    ///
    /// Rows with a missing date or level are skipped; those dates simply have
    /// no quote. A table with no usable row at all is rejected.
    pub fn from_frame(df: &DataFrame, aliases: &ColumnAliases) -> Result<Self> {
        let columns = aliases.resolve_benchmark_columns(df)?;
        let dates = date_values(df, &columns.date)?;
        let (name, is_close) = match &columns.level {
            BenchmarkLevel::Close(name) => (name, true),
            BenchmarkLevel::DailyReturnPct(name) => (name, false),
        };
        let values = f64_values(df, name)?;

        let points: Vec<_> = dates
            .into_iter()
            .zip(values)
            .enumerate()
            .filter_map(|(row, pair)| match pair {
                (Some(date), Some(value)) if value.is_finite() => Some((date, value)),
                _ => {
                    debug!(row, "skipping benchmark row without date or level");
                    None
                }
            })
            .collect();

        let series = if is_close {
            Self::from_closes(points)?
        } else {
            Self::from_daily_returns(points)?
        };
        if series.is_empty() {
            return Err(EventStudyError::InvalidBenchmark(
                "no row carries both a date and a level".to_string(),
            ));
        }
        Ok(series)
    }

    /// Closing level on `date`, if quoted.
    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.closes.get(&date).copied()
    }

    /// Simple return between two quoted dates.
    pub fn return_between(&self, start: NaiveDate, end: NaiveDate) -> Option<f64> {
        crate::returns::simple_return(self.close_on(start)?, self.close_on(end)?)
    }

    /// Number of quoted dates.
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    /// Whether the series has no quotes.
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, d).unwrap()
    }

    #[test]
    fn test_rejects_unordered_dates() {
        let err = BenchmarkSeries::from_closes([(day(2), 100.0), (day(1), 101.0)]).unwrap_err();
        assert!(matches!(err, EventStudyError::InvalidBenchmark(_)));
        assert!(BenchmarkSeries::from_closes([(day(1), 100.0), (day(1), 100.0)]).is_err());
    }

    #[test]
    fn test_rejects_non_positive_close() {
        assert!(BenchmarkSeries::from_closes([(day(1), 0.0)]).is_err());
    }

    #[test]
    fn test_return_between_quoted_dates() {
        let series = BenchmarkSeries::from_closes([(day(1), 100.0), (day(2), 104.0)]).unwrap();
        assert_relative_eq!(series.return_between(day(1), day(2)).unwrap(), 0.04, epsilon = 1e-12);
        assert!(series.return_between(day(1), day(3)).is_none());
    }

    #[test]
    fn test_daily_returns_compound() {
        let series =
            BenchmarkSeries::from_daily_returns([(day(1), 2.0), (day(2), 1.0), (day(3), -2.0)])
                .unwrap();
        // Close to close: the return into day 1 is not part of the window
        let expected = 1.01 * 0.98 - 1.0;
        assert_relative_eq!(expected, -0.0102, epsilon = 1e-12);
        assert_relative_eq!(series.return_between(day(1), day(3)).unwrap(), expected, epsilon = 1e-12);
        assert_relative_eq!(series.close_on(day(1)).unwrap(), 100.0);
    }

    #[test]
    fn test_from_frame_skips_blank_rows() {
        let df = df![
            "Date" => [Some("2021-03-01"), Some("2021-03-02"), None, Some("2021-03-04")],
            "Close" => [Some(100.0), None, Some(99.0), Some(102.0)],
        ]
        .unwrap();
        let series = BenchmarkSeries::from_frame(&df, &ColumnAliases::default()).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.close_on(day(2)).is_none());
        assert_relative_eq!(series.return_between(day(1), day(4)).unwrap(), 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_from_frame_without_usable_rows_is_rejected() {
        let df = df![
            "Date" => [Some("2021-03-01"), None],
            "Close" => [None::<f64>, Some(99.0)],
        ]
        .unwrap();
        let err = BenchmarkSeries::from_frame(&df, &ColumnAliases::default()).unwrap_err();
        assert!(matches!(err, EventStudyError::InvalidBenchmark(_)));
    }
}
