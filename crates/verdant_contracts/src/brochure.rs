#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use time::Date;

use crate::strategy::StrategyContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrochureKind {
    ExecutiveSummary,
    StrategyPerformance,
    DdqPackage,
    CustomProspect,
}

impl BrochureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BrochureKind::ExecutiveSummary => "executive-summary",
            BrochureKind::StrategyPerformance => "strategy-performance",
            BrochureKind::DdqPackage => "ddq-package",
            BrochureKind::CustomProspect => "custom-prospect",
        }
    }

    /// Attachment filename for the rendered document.
    pub fn filename(self) -> String {
        format!("{}.pdf", self.as_str())
    }
}

/// Sections a custom prospect brochure may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrochureSection {
    Overview,
    Strategies,
    Team,
    DdqSummary,
    DdqFull,
}

impl BrochureSection {
    pub const DEFAULT_PROSPECT: [BrochureSection; 4] = [
        BrochureSection::Overview,
        BrochureSection::Strategies,
        BrochureSection::Team,
        BrochureSection::DdqSummary,
    ];
}

/// Caller options for a brochure build. A missing strategy slug on a
/// strategy-performance brochure means all strategies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrochureOptions {
    pub strategy_slug: Option<String>,
    pub sections: Option<Vec<BrochureSection>>,
    pub prospect_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmOverview {
    pub firm_name: String,
    pub tagline: String,
    pub philosophy: String,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub role: String,
    pub bio: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdqSection {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdqContent {
    pub sections: Vec<DdqSection>,
}

/// Everything the PDF renderers need, fully resolved. Missing upstream
/// pages are substituted with default stubs before this is built, so a
/// model always renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrochureModel {
    pub kind: BrochureKind,
    pub firm_overview: FirmOverview,
    pub team: TeamInfo,
    pub strategies: Vec<StrategyContent>,
    pub ddq: DdqContent,
    pub sections: Vec<BrochureSection>,
    pub generated_date: Date,
    pub disclaimer: String,
    pub prospect_name: Option<String>,
}
