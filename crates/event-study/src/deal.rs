//! Deal records and their loading from the upstream deal table.

use crate::{
    Result,
    returns::{Exclusion, ExclusionReason},
    schema::{ColumnAliases, date_values, f64_values, str_values},
};
use chrono::NaiveDate;
use derive_more::Display;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// Environmental classification of an acquirer.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum AcquirerClass {
    /// Low carbon intensity
    Green,
    /// High carbon intensity
    Brown,
}

/// Environmental classification of a target.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TargetClass {
    /// Green business
    Green,
    /// Brown business
    Brown,
    /// Neither keyword list matched
    Neutral,
}

/// Error returned for an unrecognized classification label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized classification: {0:?}")]
pub struct ParseClassError(pub String);

impl FromStr for AcquirerClass {
    type Err = ParseClassError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "green" => Ok(Self::Green),
            "brown" => Ok(Self::Brown),
            _ => Err(ParseClassError(s.to_string())),
        }
    }
}

impl FromStr for TargetClass {
    type Err = ParseClassError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "green" => Ok(Self::Green),
            "brown" => Ok(Self::Brown),
            "neutral" => Ok(Self::Neutral),
            _ => Err(ParseClassError(s.to_string())),
        }
    }
}

/// The classification pair cohort predicates are evaluated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealProfile {
    /// Acquirer classification
    pub acquirer: AcquirerClass,
    /// Target classification
    pub target: TargetClass,
}

/// A price observation at one trading-day offset from announcement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PricePoint {
    /// Trading date of the observation
    pub date: Option<NaiveDate>,
    /// Closing price
    pub price: Option<f64>,
}

/// One M&A announcement.
#[derive(Debug, Clone, PartialEq)]
pub struct Deal {
    /// Deal identifier
    pub id: String,
    /// Announcement date
    pub announcement_date: Option<NaiveDate>,
    /// Acquirer name
    pub acquirer_name: String,
    /// Target name
    pub target_name: String,
    /// Acquirer carbon intensity (emissions / sales)
    pub carbon_intensity: Option<f64>,
    /// Acquirer market capitalization, positive when present
    pub market_cap: Option<f64>,
    /// Classification pair
    pub profile: DealProfile,
    /// Price observations keyed by signed trading-day offset
    pub prices: BTreeMap<i32, PricePoint>,
}

impl Deal {
    /// Creates a deal with no price observations.
    pub fn new(id: impl Into<String>, profile: DealProfile) -> Self {
        Self {
            id: id.into(),
            announcement_date: None,
            acquirer_name: String::new(),
            target_name: String::new(),
            carbon_intensity: None,
            market_cap: None,
            profile,
            prices: BTreeMap::new(),
        }
    }

    /// Records a price at `offset`, replacing any earlier one.
    pub fn with_price(mut self, offset: i32, date: NaiveDate, price: f64) -> Self {
        self.prices.insert(
            offset,
            PricePoint {
                date: Some(date),
                price: Some(price),
            },
        );
        self
    }

    /// Sets the acquirer carbon intensity.
    pub fn with_carbon_intensity(mut self, carbon_intensity: f64) -> Self {
        self.carbon_intensity = Some(carbon_intensity);
        self
    }

    /// Sets the acquirer market cap; non-positive values are treated as missing.
    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap).filter(|c| c.is_finite() && *c > 0.0);
        self
    }

    /// Price observation at a signed offset.
    pub fn price_at(&self, offset: i32) -> Option<&PricePoint> {
        self.prices.get(&offset)
    }
}

/// Deals loaded for one event window, plus the rows rejected while loading.
#[derive(Debug, Clone, Default)]
pub struct DealTable {
    /// Parsed deals
    pub deals: Vec<Deal>,
    /// Rows that could not become deals
    pub rejected: Vec<Exclusion>,
}

/// Loads the deal table for one event window.
///
/// Columns are resolved once through `aliases`; an unresolvable column
/// aborts the load. Rows whose classification is not recognized are
/// rejected rather than guessed.
pub fn load_deals(df: &DataFrame, aliases: &ColumnAliases, window_days: u32) -> Result<DealTable> {
    let columns = aliases.resolve_deal_columns(df, window_days)?;
    let offset = window_days as i32;

    let ids = str_values(df, &columns.deal_id)?;
    let announced = date_values(df, &columns.announcement_date)?;
    let acquirers = str_values(df, &columns.acquirer_name)?;
    let targets = str_values(df, &columns.target_name)?;
    let acquirer_classes = str_values(df, &columns.acquirer_classification)?;
    let target_classes = str_values(df, &columns.target_classification)?;
    let carbon = f64_values(df, &columns.carbon_intensity)?;
    let caps = f64_values(df, &columns.market_cap)?;
    let pre_prices = f64_values(df, &columns.pre_price)?;
    let post_prices = f64_values(df, &columns.post_price)?;
    let pre_dates = date_values(df, &columns.pre_date)?;
    let post_dates = date_values(df, &columns.post_date)?;

    let mut table = DealTable::default();
    for row in 0..df.height() {
        let id = ids[row].clone().unwrap_or_else(|| format!("row-{row}"));

        let acquirer = acquirer_classes[row].as_deref().map(AcquirerClass::from_str);
        let target = target_classes[row].as_deref().map(TargetClass::from_str);
        let profile = match (acquirer, target) {
            (Some(Ok(acquirer)), Some(Ok(target))) => DealProfile { acquirer, target },
            _ => {
                debug!(deal = %id, "rejecting row with unrecognized classification");
                table.rejected.push(Exclusion {
                    deal_id: id,
                    reason: ExclusionReason::UnrecognizedClassification,
                    profile: None,
                });
                continue;
            }
        };

        let mut deal = Deal::new(id, profile);
        deal.announcement_date = announced[row];
        deal.acquirer_name = acquirers[row].clone().unwrap_or_default();
        deal.target_name = targets[row].clone().unwrap_or_default();
        deal.carbon_intensity = carbon[row].filter(|c| c.is_finite());
        deal.market_cap = caps[row].filter(|c| c.is_finite() && *c > 0.0);
        deal.prices.insert(
            -offset,
            PricePoint {
                date: pre_dates[row],
                price: pre_prices[row],
            },
        );
        deal.prices.insert(
            offset,
            PricePoint {
                date: post_dates[row],
                price: post_prices[row],
            },
        );
        table.deals.push(deal);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Green", Ok(AcquirerClass::Green))]
    #[case(" brown ", Ok(AcquirerClass::Brown))]
    #[case("Neutral", Err(ParseClassError("Neutral".into())))]
    fn test_parse_acquirer_class(
        #[case] raw: &str,
        #[case] expected: std::result::Result<AcquirerClass, ParseClassError>,
    ) {
        assert_eq!(raw.parse::<AcquirerClass>(), expected);
    }

    #[test]
    fn test_parse_target_class() {
        assert_eq!("NEUTRAL".parse::<TargetClass>(), Ok(TargetClass::Neutral));
        assert!("unknown".parse::<TargetClass>().is_err());
    }

    #[test]
    fn test_load_deals() {
        let df = df![
            "Deal ID" => ["D1", "D2", "D3"],
            "Announce Date" => ["2021-03-01", "2021-04-01", "2021-05-03"],
            "Acquirer Name" => ["Acme", "Beta", "Gamma"],
            "Target Name" => ["Sun", "Wind", "Coal"],
            "Acquirer_Classification" => ["Brown", "Green", "Purple"],
            "Target_Classification" => ["Green", "Neutral", "Brown"],
            "Carbon_Intensity" => [Some(120.0), None, Some(3.0)],
            "Market Cap" => [Some(5_000.0), Some(-1.0), None],
            "T_minus_3_Price ($)" => [Some(10.0), Some(20.0), Some(30.0)],
            "T_plus_3_Price ($)" => [Some(11.0), None, Some(33.0)],
            "T_minus_3_Date" => ["2021-02-24", "2021-03-29", "2021-04-28"],
            "T_plus_3_Date" => ["2021-03-04", "2021-04-07", "2021-05-06"],
        ]
        .unwrap();

        let table = load_deals(&df, &ColumnAliases::default(), 3).unwrap();
        assert_eq!(table.deals.len(), 2);
        assert_eq!(table.rejected.len(), 1);
        assert_eq!(table.rejected[0].deal_id, "D3");
        assert_eq!(
            table.rejected[0].reason,
            ExclusionReason::UnrecognizedClassification
        );

        let d1 = &table.deals[0];
        assert_eq!(d1.profile.acquirer, AcquirerClass::Brown);
        assert_eq!(d1.profile.target, TargetClass::Green);
        assert_eq!(d1.carbon_intensity, Some(120.0));
        assert_eq!(d1.price_at(-3).unwrap().price, Some(10.0));
        assert_eq!(
            d1.price_at(3).unwrap().date,
            NaiveDate::from_ymd_opt(2021, 3, 4)
        );

        let d2 = &table.deals[1];
        assert_eq!(d2.carbon_intensity, None);
        assert_eq!(d2.market_cap, None);
        assert_eq!(d2.price_at(3).unwrap().price, None);
    }

    #[test]
    fn test_load_deals_unresolved_column_is_fatal() {
        let df = df!["Deal ID" => ["D1"]].unwrap();
        assert!(load_deals(&df, &ColumnAliases::default(), 3).is_err());
    }
}
