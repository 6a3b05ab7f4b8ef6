#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use verdant_contracts::brochure::{DdqContent, FirmOverview, TeamInfo};
use verdant_contracts::strategy::StrategyContent;
use verdant_contracts::ticket::{NewTicket, SupportTicket, TicketId, TicketStatus};
use verdant_contracts::{UtcSeconds, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreId {
    Remote,
    Cache,
    Embedded,
}

impl StoreId {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreId::Remote => "remote",
            StoreId::Cache => "cache",
            StoreId::Embedded => "embedded",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    Contract(verdant_contracts::ContractViolation),
    DuplicateRow { key: String },
    MissingRow { key: String },
    Unavailable { store: StoreId, detail: String },
}

impl From<verdant_contracts::ContractViolation> for StorageError {
    fn from(v: verdant_contracts::ContractViolation) -> Self {
        StorageError::Contract(v)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCounts {
    pub total: u64,
    pub open: u64,
    pub resolved: u64,
}

/// Ticket persistence interface. The embedded-local store and the
/// remote store present the same surface; the router picks which one
/// a pipeline writes through.
pub trait TicketStore {
    /// Assigns the id and both timestamps; returns the stored row.
    fn insert(&mut self, new: NewTicket, now: UtcSeconds) -> Result<SupportTicket, StorageError>;

    fn update_external_reference(
        &mut self,
        id: TicketId,
        reference: String,
        now: UtcSeconds,
    ) -> Result<(), StorageError>;

    fn get(&self, id: TicketId) -> Option<&SupportTicket>;

    fn counts(&self) -> TicketCounts;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory ticket store with monotonic id assignment.
#[derive(Debug, Default)]
pub struct MemTicketStore {
    rows: BTreeMap<TicketId, SupportTicket>,
    next_id: u64,
}

impl MemTicketStore {
    pub fn new_in_memory() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &SupportTicket> {
        self.rows.values()
    }
}

impl TicketStore for MemTicketStore {
    fn insert(&mut self, new: NewTicket, now: UtcSeconds) -> Result<SupportTicket, StorageError> {
        new.validate()?;
        let id = TicketId(self.next_id);
        let row = SupportTicket::v1(id, new, now)?;
        self.rows.insert(id, row.clone());
        self.next_id += 1;
        Ok(row)
    }

    fn update_external_reference(
        &mut self,
        id: TicketId,
        reference: String,
        now: UtcSeconds,
    ) -> Result<(), StorageError> {
        let row = self.rows.get_mut(&id).ok_or_else(|| StorageError::MissingRow {
            key: format!("ticket:{}", id.0),
        })?;
        row.stamp_external_reference(reference, now)?;
        Ok(())
    }

    fn get(&self, id: TicketId) -> Option<&SupportTicket> {
        self.rows.get(&id)
    }

    fn counts(&self) -> TicketCounts {
        let mut c = TicketCounts::default();
        for row in self.rows.values() {
            c.total += 1;
            match row.status {
                TicketStatus::New | TicketStatus::Open | TicketStatus::InProgress => c.open += 1,
                TicketStatus::Resolved => c.resolved += 1,
                TicketStatus::Closed => {}
            }
        }
        c
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: u64,
    pub title: String,
    pub publication: String,
    pub url: String,
    pub published_at: UtcSeconds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteNavigation {
    pub primary: Vec<NavLink>,
    pub footer: Vec<NavLink>,
}

/// Read-only boundary over the CMS page tree. The core never edits
/// pages; it only reads resolved content for brochures and the JSON
/// API.
pub trait PageStore {
    fn get_strategy(&self, slug: &str) -> Option<&StrategyContent>;
    fn strategies(&self) -> Vec<&StrategyContent>;
    fn firm_overview(&self) -> Option<&FirmOverview>;
    fn team(&self) -> Option<&TeamInfo>;
    fn ddq_sections(&self) -> Option<&DdqContent>;
    fn media_items(&self) -> &[MediaItem];
    fn navigation(&self) -> &SiteNavigation;
}

#[derive(Debug, Default)]
pub struct MemPageStore {
    strategies: BTreeMap<String, StrategyContent>,
    firm_overview: Option<FirmOverview>,
    team: Option<TeamInfo>,
    ddq: Option<DdqContent>,
    media_items: Vec<MediaItem>,
    navigation: SiteNavigation,
}

impl MemPageStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    /// Store seeded with the site's standing navigation. Content pages
    /// stay empty until loaded; brochure building fills gaps with
    /// default stubs.
    pub fn with_default_navigation() -> Self {
        let mut s = Self::default();
        s.navigation = SiteNavigation {
            primary: vec![
                NavLink {
                    label: "About".to_string(),
                    url: "/about/".to_string(),
                },
                NavLink {
                    label: "Strategies".to_string(),
                    url: "/strategies/".to_string(),
                },
                NavLink {
                    label: "Process".to_string(),
                    url: "/process/".to_string(),
                },
                NavLink {
                    label: "Contact".to_string(),
                    url: "/contact/".to_string(),
                },
            ],
            footer: vec![
                NavLink {
                    label: "Disclosures".to_string(),
                    url: "/disclosures/".to_string(),
                },
                NavLink {
                    label: "Privacy Policy".to_string(),
                    url: "/privacy/".to_string(),
                },
                NavLink {
                    label: "Form ADV".to_string(),
                    url: "/adv/".to_string(),
                },
            ],
        };
        s
    }

    pub fn upsert_strategy(&mut self, content: StrategyContent) -> Result<(), StorageError> {
        content.validate()?;
        self.strategies.insert(content.slug.clone(), content);
        Ok(())
    }

    pub fn set_firm_overview(&mut self, overview: FirmOverview) {
        self.firm_overview = Some(overview);
    }

    pub fn set_team(&mut self, team: TeamInfo) {
        self.team = Some(team);
    }

    pub fn set_ddq(&mut self, ddq: DdqContent) {
        self.ddq = Some(ddq);
    }

    pub fn push_media_item(&mut self, item: MediaItem) {
        self.media_items.push(item);
    }
}

impl PageStore for MemPageStore {
    fn get_strategy(&self, slug: &str) -> Option<&StrategyContent> {
        self.strategies.get(slug)
    }

    fn strategies(&self) -> Vec<&StrategyContent> {
        self.strategies.values().collect()
    }

    fn firm_overview(&self) -> Option<&FirmOverview> {
        self.firm_overview.as_ref()
    }

    fn team(&self) -> Option<&TeamInfo> {
        self.team.as_ref()
    }

    fn ddq_sections(&self) -> Option<&DdqContent> {
        self.ddq.as_ref()
    }

    fn media_items(&self) -> &[MediaItem] {
        &self.media_items
    }

    fn navigation(&self) -> &SiteNavigation {
        &self.navigation
    }
}
