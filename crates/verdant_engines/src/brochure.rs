#![forbid(unsafe_code)]

//! Brochure content aggregation. Pulls firm, team, strategy, and DDQ
//! content through the page-store boundary, refreshes strategy
//! performance, and produces the normalized model the PDF renderers
//! consume. Missing pages never fail a build; fixed stubs stand in.

use time::Date;

use verdant_contracts::brochure::{
    BrochureKind, BrochureModel, BrochureOptions, BrochureSection, DdqContent, DdqSection,
    FirmOverview, TeamInfo,
};
use verdant_contracts::strategy::StrategyContent;
use verdant_contracts::UtcSeconds;
use verdant_storage::PageStore;

use crate::performance::{parse_percentage, PerformanceCalculator};

pub const STANDARD_DISCLAIMER: &str = "Past performance does not guarantee future results. \
All investments involve risk, including possible loss of principal. This material is for \
informational purposes only and does not constitute investment advice.";

const EXECUTIVE_SUMMARY_STRATEGY_LIMIT: usize = 3;

fn default_firm_overview() -> FirmOverview {
    FirmOverview {
        firm_name: "Verdant Capital Advisors".to_string(),
        tagline: "Ethical investing, rigorously applied.".to_string(),
        philosophy: "We build concentrated portfolios of companies that meet strict \
ethical criteria, and we hold them for the long term."
            .to_string(),
        highlights: vec![
            "Fully transparent screening criteria".to_string(),
            "Fiduciary, fee-only advice".to_string(),
            "Proxy voting aligned with client values".to_string(),
        ],
    }
}

fn default_ddq_shell() -> DdqContent {
    DdqContent {
        sections: vec![DdqSection {
            heading: "Due Diligence Questionnaire".to_string(),
            body: "Full DDQ responses are available on request.".to_string(),
        }],
    }
}

/// Summary figures across all strategies in a model.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStatistics {
    pub strategy_count: usize,
    pub average_ytd: f64,
}

/// One row of the strategy performance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformanceRow {
    pub title: String,
    pub ytd: String,
    pub one_year: String,
    pub three_year: String,
    pub since_inception: String,
}

pub fn performance_table(strategies: &[StrategyContent]) -> Vec<PerformanceRow> {
    strategies
        .iter()
        .map(|s| PerformanceRow {
            title: s.title.clone(),
            ytd: s.performance.ytd.strategy.clone(),
            one_year: s.performance.one_year.strategy.clone(),
            three_year: s.performance.three_year.strategy.clone(),
            since_inception: s.performance.since_inception.strategy.clone(),
        })
        .collect()
}

pub fn aggregate_statistics(strategies: &[StrategyContent]) -> AggregateStatistics {
    let count = strategies.len();
    let average_ytd = if count == 0 {
        0.0
    } else {
        strategies
            .iter()
            .map(|s| parse_percentage(&s.performance.ytd.strategy))
            .sum::<f64>()
            / count as f64
    };
    AggregateStatistics {
        strategy_count: count,
        average_ytd,
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrochureAggregator {
    calculator: PerformanceCalculator,
}

impl BrochureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(
        &self,
        kind: BrochureKind,
        options: &BrochureOptions,
        store: &dyn PageStore,
        today: Date,
        now: UtcSeconds,
    ) -> BrochureModel {
        let firm_overview = store
            .firm_overview()
            .cloned()
            .unwrap_or_else(default_firm_overview);
        let team = store.team().cloned().unwrap_or_default();
        let ddq = store.ddq_sections().cloned().unwrap_or_else(default_ddq_shell);

        let strategies = self.select_strategies(kind, options, store, today, now);
        let sections = self.select_sections(kind, options);

        BrochureModel {
            kind,
            firm_overview,
            team,
            strategies,
            ddq,
            sections,
            generated_date: today,
            disclaimer: STANDARD_DISCLAIMER.to_string(),
            prospect_name: options.prospect_name.clone(),
        }
    }

    fn select_strategies(
        &self,
        kind: BrochureKind,
        options: &BrochureOptions,
        store: &dyn PageStore,
        today: Date,
        now: UtcSeconds,
    ) -> Vec<StrategyContent> {
        let mut picked: Vec<StrategyContent> = match (kind, options.strategy_slug.as_deref()) {
            (BrochureKind::StrategyPerformance, Some(slug)) => {
                store.get_strategy(slug).cloned().into_iter().collect()
            }
            _ => store.strategies().into_iter().cloned().collect(),
        };
        // Display fields come from the calculator, never from whatever
        // happened to be stored on the page.
        for strategy in &mut picked {
            self.calculator.recompute(strategy, today, now);
        }
        if kind == BrochureKind::ExecutiveSummary {
            picked.truncate(EXECUTIVE_SUMMARY_STRATEGY_LIMIT);
        }
        picked
    }

    fn select_sections(&self, kind: BrochureKind, options: &BrochureOptions) -> Vec<BrochureSection> {
        match kind {
            BrochureKind::ExecutiveSummary => vec![
                BrochureSection::Overview,
                BrochureSection::Team,
                BrochureSection::Strategies,
            ],
            BrochureKind::StrategyPerformance => {
                vec![BrochureSection::Overview, BrochureSection::Strategies]
            }
            BrochureKind::DdqPackage => vec![
                BrochureSection::Overview,
                BrochureSection::DdqFull,
                BrochureSection::Team,
                BrochureSection::Strategies,
            ],
            BrochureKind::CustomProspect => options
                .sections
                .clone()
                .unwrap_or_else(|| BrochureSection::DEFAULT_PROSPECT.to_vec()),
        }
    }
}
