#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::common::{ContractViolation, UtcSeconds, Validate};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    /// 1-based calendar index.
    pub fn index(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_index(index: u8) -> Option<Month> {
        Month::ALL.get(usize::from(index.checked_sub(1)? )).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Month> {
        Month::ALL.iter().copied().find(|m| m.as_str().eq_ignore_ascii_case(s))
    }
}

/// One month's observation. "N/A" and missing values are both carried
/// as None; the calculator skips them without short-circuiting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyEntry {
    pub strategy: Option<String>,
    pub benchmark: Option<String>,
}

/// Nested mapping year -> month -> observation, ordered on both keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyReturns(pub BTreeMap<u16, BTreeMap<Month, MonthlyEntry>>);

impl MonthlyReturns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, year: u16, month: Month, entry: MonthlyEntry) {
        self.0.entry(year).or_default().insert(month, entry);
    }

    pub fn get(&self, year: u16, month: Month) -> Option<&MonthlyEntry> {
        self.0.get(&year).and_then(|months| months.get(&month))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    /// Maximum (year, month) present in the mapping. Queries beyond it
    /// anchor back to this month.
    pub fn last_observed(&self) -> Option<(u16, Month)> {
        self.0
            .iter()
            .rev()
            .find_map(|(year, months)| months.keys().max().map(|m| (*year, *m)))
    }
}

/// One display row of the performance table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfTriple {
    pub strategy: String,
    pub benchmark: String,
    pub difference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceFields {
    pub ytd: PerfTriple,
    pub one_year: PerfTriple,
    pub three_year: PerfTriple,
    pub since_inception: PerfTriple,
}

/// Strategy page content as seen by the core: opaque CMS copy plus
/// the monthly-returns mapping and the computed display fields that
/// only the performance calculator may write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyContent {
    pub slug: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub benchmark_name: String,
    pub risk_level: String,
    pub holdings_count: Option<u32>,
    pub inception_date: Option<Date>,
    pub monthly_returns: MonthlyReturns,
    pub performance: PerformanceFields,
    pub performance_last_updated: Option<UtcSeconds>,
}

impl Validate for StrategyContent {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.slug.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "strategy_content.slug",
            });
        }
        if self.title.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "strategy_content.title",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_strategy_01_month_index_round_trip() {
        for m in Month::ALL {
            assert_eq!(Month::from_index(m.index()), Some(m));
        }
        assert!(Month::from_index(0).is_none());
        assert!(Month::from_index(13).is_none());
        assert_eq!(Month::from_str_loose("feb"), Some(Month::Feb));
    }

    #[test]
    fn at_strategy_02_last_observed_is_max_year_month() {
        let mut r = MonthlyReturns::new();
        assert!(r.last_observed().is_none());
        r.insert(2023, Month::Dec, MonthlyEntry::default());
        r.insert(2024, Month::Jan, MonthlyEntry::default());
        r.insert(2024, Month::Feb, MonthlyEntry::default());
        assert_eq!(r.last_observed(), Some((2024, Month::Feb)));
    }
}
