//! Column-name resolution for the deal and benchmark tables.
//!
//! Upstream tables have drifted between naming conventions over time, so each
//! logical field maps to an ordered list of accepted literal names. A table is
//! resolved once, at load time, into a fixed set of column names; nothing
//! downstream looks columns up by alias again. A field with no matching name
//! is an [`EventStudyError::UnresolvedColumn`], never an absent field.

use crate::{EventStudyError, Result};
use chrono::NaiveDate;
use derive_more::Display;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder replaced by the event window length in accepted names.
const WINDOW_PLACEHOLDER: &str = "{n}";

/// Logical fields the engine reads from its input tables.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogicalField {
    /// Deal identifier
    #[display("deal id")]
    DealId,
    /// Announcement date
    #[display("announcement date")]
    AnnouncementDate,
    /// Acquirer name
    #[display("acquirer name")]
    AcquirerName,
    /// Target name
    #[display("target name")]
    TargetName,
    /// Acquirer green/brown classification
    #[display("acquirer classification")]
    AcquirerClassification,
    /// Target green/brown/neutral classification
    #[display("target classification")]
    TargetClassification,
    /// Acquirer carbon intensity
    #[display("carbon intensity")]
    CarbonIntensity,
    /// Acquirer market capitalization
    #[display("market cap")]
    MarketCap,
    /// Price at the start of the event window
    #[display("pre-window price")]
    PrePrice,
    /// Price at the end of the event window
    #[display("post-window price")]
    PostPrice,
    /// Trading date of the pre-window price
    #[display("pre-window date")]
    PreDate,
    /// Trading date of the post-window price
    #[display("post-window date")]
    PostDate,
    /// Benchmark quote date
    #[display("benchmark date")]
    BenchmarkDate,
    /// Benchmark closing price
    #[display("benchmark close")]
    BenchmarkClose,
    /// Benchmark daily return in percent
    #[display("benchmark daily return")]
    BenchmarkDailyReturn,
}

/// Ordered accepted names per logical field.
///
/// Names may contain `{n}`, replaced by the event window length. Overrides
/// deserialized from configuration are layered over the default table, so a
/// config only needs to mention the fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<LogicalField, Vec<String>>", into = "BTreeMap<LogicalField, Vec<String>>")]
pub struct ColumnAliases {
    aliases: BTreeMap<LogicalField, Vec<String>>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        use LogicalField::*;

        let table: [(LogicalField, &[&str]); 15] = [
            (DealId, &["Deal ID", "Deal_ID", "Deal Number", "Ticker"]),
            (AnnouncementDate, &["Announce Date", "Announcement Date"]),
            (AcquirerName, &["Acquirer Name", "Acquirer"]),
            (TargetName, &["Target Name", "Target"]),
            (
                AcquirerClassification,
                &["Acquirer_Classification", "Acquirer Classification"],
            ),
            (
                TargetClassification,
                &["Target_Classification", "Target Classification"],
            ),
            (CarbonIntensity, &["Carbon_Intensity", "Carbon Intensity"]),
            (MarketCap, &["Market_Cap (Million $)", "Market Cap", "Market_Cap"]),
            (PrePrice, &["T_minus_{n}_Price ($)", "T-{n}_Price"]),
            (PostPrice, &["T_plus_{n}_Price ($)", "T+{n}_Price"]),
            (PreDate, &["T_minus_{n}_Date", "T-{n}_Date"]),
            (PostDate, &["T_plus_{n}_Date", "T+{n}_Date"]),
            (BenchmarkDate, &["Date", "date"]),
            (BenchmarkClose, &["Close", "Adj Close", "Close ($)"]),
            (BenchmarkDailyReturn, &["Daily_return (%)", "Daily Return (%)"]),
        ];

        Self {
            aliases: table
                .into_iter()
                .map(|(field, names)| (field, names.iter().map(|s| s.to_string()).collect()))
                .collect(),
        }
    }
}

impl From<BTreeMap<LogicalField, Vec<String>>> for ColumnAliases {
    fn from(overrides: BTreeMap<LogicalField, Vec<String>>) -> Self {
        let mut aliases = Self::default();
        aliases.aliases.extend(overrides);
        aliases
    }
}

impl From<ColumnAliases> for BTreeMap<LogicalField, Vec<String>> {
    fn from(value: ColumnAliases) -> Self {
        value.aliases
    }
}

impl ColumnAliases {
    /// Accepted names for a field, with `{n}` left unexpanded.
    pub fn accepted(&self, field: LogicalField) -> &[String] {
        self.aliases.get(&field).map_or(&[], Vec::as_slice)
    }

    /// Accepted names for a field with the window length substituted.
    pub fn candidates(&self, field: LogicalField, window_days: u32) -> Vec<String> {
        let days = window_days.to_string();
        self.accepted(field)
            .iter()
            .map(|name| name.replace(WINDOW_PLACEHOLDER, &days))
            .collect()
    }

    /// Resolves one field against a table.
    ///
    /// The first accepted name present in `df` wins.
    pub fn resolve(&self, df: &DataFrame, field: LogicalField, window_days: u32) -> Result<String> {
        self.try_resolve(df, field, window_days)
            .ok_or_else(|| EventStudyError::UnresolvedColumn {
                field: field.to_string(),
                tried: self.candidates(field, window_days),
            })
    }

    fn try_resolve(&self, df: &DataFrame, field: LogicalField, window_days: u32) -> Option<String> {
        self.candidates(field, window_days)
            .into_iter()
            .find(|name| df.column(name).is_ok())
    }

    /// Resolves every column of the deal table for one event window.
    pub fn resolve_deal_columns(&self, df: &DataFrame, window_days: u32) -> Result<DealColumns> {
        let get = |field| self.resolve(df, field, window_days);
        Ok(DealColumns {
            window_days,
            deal_id: get(LogicalField::DealId)?,
            announcement_date: get(LogicalField::AnnouncementDate)?,
            acquirer_name: get(LogicalField::AcquirerName)?,
            target_name: get(LogicalField::TargetName)?,
            acquirer_classification: get(LogicalField::AcquirerClassification)?,
            target_classification: get(LogicalField::TargetClassification)?,
            carbon_intensity: get(LogicalField::CarbonIntensity)?,
            market_cap: get(LogicalField::MarketCap)?,
            pre_price: get(LogicalField::PrePrice)?,
            post_price: get(LogicalField::PostPrice)?,
            pre_date: get(LogicalField::PreDate)?,
            post_date: get(LogicalField::PostDate)?,
        })
    }

    /// Resolves the benchmark table.
    ///
    /// A closing-price column is preferred; a daily-return column is accepted
    /// in its place. Missing both is unresolved.
    pub fn resolve_benchmark_columns(&self, df: &DataFrame) -> Result<BenchmarkColumns> {
        let date = self.resolve(df, LogicalField::BenchmarkDate, 0)?;
        let level = if let Some(close) = self.try_resolve(df, LogicalField::BenchmarkClose, 0) {
            BenchmarkLevel::Close(close)
        } else if let Some(ret) = self.try_resolve(df, LogicalField::BenchmarkDailyReturn, 0) {
            BenchmarkLevel::DailyReturnPct(ret)
        } else {
            let mut tried = self.candidates(LogicalField::BenchmarkClose, 0);
            tried.extend(self.candidates(LogicalField::BenchmarkDailyReturn, 0));
            return Err(EventStudyError::UnresolvedColumn {
                field: LogicalField::BenchmarkClose.to_string(),
                tried,
            });
        };
        Ok(BenchmarkColumns { date, level })
    }
}

/// Deal-table column names resolved for one event window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealColumns {
    /// Window the price and date columns belong to
    pub window_days: u32,
    /// Deal identifier column
    pub deal_id: String,
    /// Announcement date column
    pub announcement_date: String,
    /// Acquirer name column
    pub acquirer_name: String,
    /// Target name column
    pub target_name: String,
    /// Acquirer classification column
    pub acquirer_classification: String,
    /// Target classification column
    pub target_classification: String,
    /// Carbon intensity column
    pub carbon_intensity: String,
    /// Market cap column
    pub market_cap: String,
    /// Price at offset `-window_days`
    pub pre_price: String,
    /// Price at offset `+window_days`
    pub post_price: String,
    /// Date at offset `-window_days`
    pub pre_date: String,
    /// Date at offset `+window_days`
    pub post_date: String,
}

/// How the benchmark level is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BenchmarkLevel {
    /// Closing prices
    Close(String),
    /// Daily returns in percent, chained into an index
    DailyReturnPct(String),
}

/// Benchmark-table column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkColumns {
    /// Quote date column
    pub date: String,
    /// Level column
    pub level: BenchmarkLevel,
}

/// Reads a column as floats; unparseable cells become `None`.
pub(crate) fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Reads a column as trimmed strings; empty cells become `None`.
pub(crate) fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
        .collect())
}

/// Reads a column of dates stored either as polars dates or as strings.
pub(crate) fn date_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    Ok(str_values(df, name)?
        .into_iter()
        .map(|v| v.as_deref().and_then(parse_date))
        .collect())
}

/// Parses the date layouts seen in upstream tables.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y"];

    let raw = raw.trim();
    // Datetimes carry a time part after a space or 'T'
    let day = raw.split([' ', 'T']).next().unwrap_or(raw);
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn legacy_frame() -> DataFrame {
        deal_frame("T_minus_3_Price ($)", "T_plus_3_Price ($)")
    }

    fn deal_frame(pre_price: &str, post_price: &str) -> DataFrame {
        df![
            "Ticker" => ["AAA"],
            "Announce Date" => ["2021-03-01"],
            "Acquirer Name" => ["Acme"],
            "Target Name" => ["Solar Co"],
            "Acquirer_Classification" => ["Brown"],
            "Target_Classification" => ["Green"],
            "Carbon_Intensity" => [120.0],
            "Market Cap" => [5_000.0],
            pre_price => [10.0],
            post_price => [11.0],
            "T_minus_3_Date" => ["2021-02-24"],
            "T_plus_3_Date" => ["2021-03-04"],
        ]
        .unwrap()
    }

    #[test]
    fn test_resolves_primary_names() {
        let columns = ColumnAliases::default()
            .resolve_deal_columns(&legacy_frame(), 3)
            .unwrap();
        assert_eq!(columns.deal_id, "Ticker");
        assert_eq!(columns.pre_price, "T_minus_3_Price ($)");
        assert_eq!(columns.post_date, "T_plus_3_Date");
        assert_eq!(columns.market_cap, "Market Cap");
    }

    #[test]
    fn test_resolves_alternate_price_scheme() {
        let df = deal_frame("T-3_Price", "T+3_Price");
        let columns = ColumnAliases::default().resolve_deal_columns(&df, 3).unwrap();
        assert_eq!(columns.pre_price, "T-3_Price");
        assert_eq!(columns.post_price, "T+3_Price");
    }

    #[test]
    fn test_missing_window_is_unresolved() {
        let err = ColumnAliases::default()
            .resolve_deal_columns(&legacy_frame(), 10)
            .unwrap_err();
        match err {
            EventStudyError::UnresolvedColumn { field, tried } => {
                assert_eq!(field, "pre-window price");
                assert_eq!(tried, vec!["T_minus_10_Price ($)", "T-10_Price"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_config_override_layers_over_defaults() {
        let aliases: ColumnAliases =
            serde_json::from_str(r#"{"carbon_intensity": ["CI (t/$m)"]}"#).unwrap();
        assert_eq!(aliases.accepted(LogicalField::CarbonIntensity), ["CI (t/$m)"]);
        assert_eq!(aliases.accepted(LogicalField::DealId)[0], "Deal ID");
    }

    #[test]
    fn test_benchmark_falls_back_to_daily_returns() {
        let df = df![
            "Date" => ["2021-01-04"],
            "Daily_return (%)" => [0.5],
        ]
        .unwrap();
        let columns = ColumnAliases::default().resolve_benchmark_columns(&df).unwrap();
        assert_eq!(columns.level, BenchmarkLevel::DailyReturnPct("Daily_return (%)".into()));
    }

    #[test]
    fn test_benchmark_without_level_is_unresolved() {
        let df = df!["Date" => ["2021-01-04"], "Volume" => [1.0]].unwrap();
        let err = ColumnAliases::default().resolve_benchmark_columns(&df).unwrap_err();
        assert!(matches!(err, EventStudyError::UnresolvedColumn { .. }));
    }

    #[rstest]
    #[case("2021-03-04", Some((2021, 3, 4)))]
    #[case("04-03-2021", Some((2021, 3, 4)))]
    #[case("03/04/2021", Some((2021, 3, 4)))]
    #[case("2021-03-04 00:00:00", Some((2021, 3, 4)))]
    #[case("2021-03-04T09:30:00", Some((2021, 3, 4)))]
    #[case("not a date", None)]
    fn test_parse_date(#[case] raw: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let expected = expected.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(parse_date(raw), expected);
    }

    #[test]
    fn test_date_values_from_polars_dates() {
        let dates = [NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()];
        let df = df!["Date" => dates].unwrap();
        let values = date_values(&df, "Date").unwrap();
        assert_eq!(values, vec![Some(dates[0])]);
    }
}
