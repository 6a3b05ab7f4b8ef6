#![forbid(unsafe_code)]

//! Trailing-return calculator for strategy pages. Monthly returns
//! arrive as loosely formatted percentage strings from the CMS; this
//! module parses them exactly, compounds them, and writes the twelve
//! display fields back onto the page content.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use time::Date;

use verdant_contracts::strategy::{
    Month, MonthlyReturns, PerfTriple, PerformanceFields, StrategyContent,
};
use verdant_contracts::UtcSeconds;

/// Shown in the three-year column until a strategy has enough
/// history to make the figure meaningful.
pub const NOT_AVAILABLE: &str = "-";

const THREE_YEAR_WINDOW_MONTHS: usize = 36;
const THREE_YEAR_MIN_OBSERVATIONS: usize = 30;

/// Parses a human-entered percentage string to a fractional return.
/// Accepts surrounding whitespace and quotes, a trailing `%`, and a
/// comma decimal separator. "N/A", empty, and unparseable input all
/// read as 0.0.
pub fn parse_percentage(raw: &str) -> f64 {
    let cleaned: String = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .trim_end_matches('%')
        .replace(',', ".");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("n/a") {
        return 0.0;
    }
    match cleaned.parse::<Decimal>() {
        Ok(d) => (d / Decimal::from(100)).to_f64().unwrap_or(0.0),
        Err(_) => 0.0,
    }
}

/// Two-decimal percentage rendering of a fractional return.
pub fn format_percentage(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Like [`format_percentage`] but with an explicit sign, for the
/// strategy-minus-benchmark difference columns.
pub fn format_signed_percentage(value: f64) -> String {
    let pct = value * 100.0;
    if pct >= 0.0 {
        format!("+{pct:.2}%")
    } else {
        format!("{pct:.2}%")
    }
}

/// Geometric compounding: ∏(1 + rᵢ) − 1.
pub fn compound(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

fn annualize(cumulative: f64, years: f64) -> f64 {
    if years <= 0.0 {
        return cumulative;
    }
    (1.0 + cumulative).powf(1.0 / years) - 1.0
}

fn triple(strategy: f64, benchmark: f64) -> PerfTriple {
    PerfTriple {
        strategy: format_percentage(strategy),
        benchmark: format_percentage(benchmark),
        difference: format_signed_percentage(strategy - benchmark),
    }
}

fn unavailable_triple() -> PerfTriple {
    PerfTriple {
        strategy: NOT_AVAILABLE.to_string(),
        benchmark: NOT_AVAILABLE.to_string(),
        difference: NOT_AVAILABLE.to_string(),
    }
}

/// All observed months up to and including the anchor, chronological.
/// Returns (year, month, strategy return, benchmark return).
fn observed_up_to(
    returns: &MonthlyReturns,
    anchor: (u16, Month),
) -> Vec<(u16, Month, f64, f64)> {
    let mut out = Vec::new();
    for (year, months) in &returns.0 {
        for (month, entry) in months {
            if (*year, *month) > anchor {
                continue;
            }
            let s = entry.strategy.as_deref().map(parse_percentage);
            let b = entry.benchmark.as_deref().map(parse_percentage);
            out.push((*year, *month, s.unwrap_or(0.0), b.unwrap_or(0.0)));
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Recomputes every display field from the monthly returns and
    /// stamps `performance_last_updated`. A query date past the last
    /// observed month anchors back to it.
    pub fn recompute(&self, content: &mut StrategyContent, today: Date, now: UtcSeconds) {
        content.performance = self.compute_fields(content, today);
        content.performance_last_updated = Some(now);
    }

    pub fn compute_fields(&self, content: &StrategyContent, today: Date) -> PerformanceFields {
        let Some(last) = content.monthly_returns.last_observed() else {
            return PerformanceFields {
                ytd: triple(0.0, 0.0),
                one_year: triple(0.0, 0.0),
                three_year: unavailable_triple(),
                since_inception: triple(0.0, 0.0),
            };
        };
        let query = (
            today.year().max(0) as u16,
            Month::from_index(u8::from(today.month())).unwrap_or(Month::Dec),
        );
        let anchor = if query < last { query } else { last };
        let observed = observed_up_to(&content.monthly_returns, anchor);

        PerformanceFields {
            ytd: self.ytd(&content.monthly_returns, anchor),
            one_year: self.trailing(&observed, 12, None),
            three_year: self.three_year(content, &observed, today),
            since_inception: self.since_inception(content, &observed),
        }
    }

    /// Year-to-date: January through the anchor month of the anchor
    /// year. The strategy leg stops at its first missing month; the
    /// benchmark leg accumulates independently over the same span.
    fn ytd(&self, returns: &MonthlyReturns, anchor: (u16, Month)) -> PerfTriple {
        let (year, last_month) = anchor;
        let mut strategy = Vec::new();
        let mut benchmark = Vec::new();
        let mut strategy_stopped = false;
        for month in Month::ALL {
            if month > last_month {
                break;
            }
            let entry = returns.get(year, month);
            match entry.and_then(|e| e.strategy.as_deref()) {
                Some(raw) if !strategy_stopped => strategy.push(parse_percentage(raw)),
                _ => strategy_stopped = true,
            }
            if let Some(raw) = entry.and_then(|e| e.benchmark.as_deref()) {
                benchmark.push(parse_percentage(raw));
            }
        }
        triple(compound(&strategy), compound(&benchmark))
    }

    /// Trailing-N compounded return over the most recent observed
    /// months, optionally annualized over `years`.
    fn trailing(
        &self,
        observed: &[(u16, Month, f64, f64)],
        window: usize,
        years: Option<f64>,
    ) -> PerfTriple {
        let tail: Vec<&(u16, Month, f64, f64)> =
            observed.iter().rev().take(window).rev().collect();
        let strategy: Vec<f64> = tail.iter().map(|(_, _, s, _)| *s).collect();
        let benchmark: Vec<f64> = tail.iter().map(|(_, _, _, b)| *b).collect();
        let mut s = compound(&strategy);
        let mut b = compound(&benchmark);
        if let Some(years) = years {
            s = annualize(s, years);
            b = annualize(b, years);
        }
        triple(s, b)
    }

    fn three_year(
        &self,
        content: &StrategyContent,
        observed: &[(u16, Month, f64, f64)],
        today: Date,
    ) -> PerfTriple {
        let old_enough = content
            .inception_date
            .map(|inception| {
                let elapsed_days = (today - inception).whole_days();
                elapsed_days >= 3 * 365
            })
            .unwrap_or(false);
        let window: Vec<&(u16, Month, f64, f64)> = observed
            .iter()
            .rev()
            .take(THREE_YEAR_WINDOW_MONTHS)
            .collect();
        if !old_enough || window.len() < THREE_YEAR_MIN_OBSERVATIONS {
            return unavailable_triple();
        }
        let years = window.len() as f64 / 12.0;
        self.trailing(observed, THREE_YEAR_WINDOW_MONTHS, Some(years))
    }

    /// Since inception: every observed month, annualized only once the
    /// track record spans more than one year.
    fn since_inception(
        &self,
        _content: &StrategyContent,
        observed: &[(u16, Month, f64, f64)],
    ) -> PerfTriple {
        let strategy: Vec<f64> = observed.iter().map(|(_, _, s, _)| *s).collect();
        let benchmark: Vec<f64> = observed.iter().map(|(_, _, _, b)| *b).collect();
        let s = compound(&strategy);
        let b = compound(&benchmark);
        let years = observed.len() as f64 / 12.0;
        if years > 1.0 {
            triple(annualize(s, years), annualize(b, years))
        } else {
            triple(s, b)
        }
    }
}
