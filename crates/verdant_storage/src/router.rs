#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::stores::StoreId;

/// Entity classes the router knows how to place. Everything the core
/// persists or reads maps onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    SupportTicket,
    StrategyPage,
    MediaItem,
    HomePage,
    AuthUser,
    Session,
}

impl EntityClass {
    pub const ALL: [EntityClass; 6] = [
        EntityClass::SupportTicket,
        EntityClass::StrategyPage,
        EntityClass::MediaItem,
        EntityClass::HomePage,
        EntityClass::AuthUser,
        EntityClass::Session,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityClass::SupportTicket => "support_ticket",
            EntityClass::StrategyPage => "strategy_page",
            EntityClass::MediaItem => "media_item",
            EntityClass::HomePage => "home_page",
            EntityClass::AuthUser => "auth_user",
            EntityClass::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRoute {
    pub read: StoreId,
    pub write: StoreId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterConfigError {
    OverlappingSets { entity: EntityClass },
}

/// Placement rules for reads, writes, and migrations. The remote
/// store is authoritative; the cache is a read-side optimization that
/// may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRouter {
    cached: BTreeSet<EntityClass>,
    remote_only: BTreeSet<EntityClass>,
}

impl DatabaseRouter {
    /// Production table: cache dormant, volatile entities pinned to
    /// the remote store.
    pub fn mvp_v1() -> Self {
        Self {
            cached: BTreeSet::new(),
            remote_only: [
                EntityClass::SupportTicket,
                EntityClass::AuthUser,
                EntityClass::Session,
            ]
            .into_iter()
            .collect(),
        }
    }

    pub fn with_sets(
        cached: BTreeSet<EntityClass>,
        remote_only: BTreeSet<EntityClass>,
    ) -> Result<Self, RouterConfigError> {
        if let Some(entity) = cached.intersection(&remote_only).next() {
            return Err(RouterConfigError::OverlappingSets { entity: *entity });
        }
        Ok(Self { cached, remote_only })
    }

    pub fn cached_set(&self) -> &BTreeSet<EntityClass> {
        &self.cached
    }

    pub fn read_store(&self, entity: EntityClass) -> StoreId {
        if self.cached.contains(&entity) {
            StoreId::Cache
        } else {
            StoreId::Remote
        }
    }

    /// Writes never target the cache.
    pub fn write_store(&self, _entity: EntityClass) -> StoreId {
        StoreId::Remote
    }

    pub fn route(&self, entity: EntityClass) -> DatabaseRoute {
        DatabaseRoute {
            read: self.read_store(entity),
            write: self.write_store(entity),
        }
    }

    /// Cross-entity relations are always permitted; the stores hold
    /// overlapping copies of one logical schema.
    pub fn allow_relation(&self, _a: EntityClass, _b: EntityClass) -> bool {
        true
    }

    pub fn allow_migrate(&self, store: StoreId, entity: EntityClass) -> bool {
        match store {
            StoreId::Cache => self.cached.contains(&entity),
            StoreId::Remote | StoreId::Embedded => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_router_01_writes_never_target_cache() {
        let mut cached = BTreeSet::new();
        cached.insert(EntityClass::StrategyPage);
        let r = DatabaseRouter::with_sets(cached, BTreeSet::new()).unwrap();
        for entity in EntityClass::ALL {
            assert_eq!(r.write_store(entity), StoreId::Remote);
        }
        assert_eq!(r.read_store(EntityClass::StrategyPage), StoreId::Cache);
        assert_eq!(r.read_store(EntityClass::SupportTicket), StoreId::Remote);
    }

    #[test]
    fn at_router_02_default_cached_set_is_empty() {
        let r = DatabaseRouter::mvp_v1();
        assert!(r.cached_set().is_empty());
        for entity in EntityClass::ALL {
            assert_eq!(r.read_store(entity), StoreId::Remote);
        }
    }

    #[test]
    fn at_router_03_overlapping_sets_refused() {
        let mut cached = BTreeSet::new();
        cached.insert(EntityClass::SupportTicket);
        let mut remote_only = BTreeSet::new();
        remote_only.insert(EntityClass::SupportTicket);
        assert_eq!(
            DatabaseRouter::with_sets(cached, remote_only),
            Err(RouterConfigError::OverlappingSets {
                entity: EntityClass::SupportTicket
            })
        );
    }

    #[test]
    fn at_router_04_cache_migrations_limited_to_cached_set() {
        let mut cached = BTreeSet::new();
        cached.insert(EntityClass::MediaItem);
        let r = DatabaseRouter::with_sets(cached, BTreeSet::new()).unwrap();
        assert!(r.allow_migrate(StoreId::Cache, EntityClass::MediaItem));
        assert!(!r.allow_migrate(StoreId::Cache, EntityClass::SupportTicket));
        assert!(r.allow_migrate(StoreId::Remote, EntityClass::SupportTicket));
        assert!(r.allow_relation(EntityClass::SupportTicket, EntityClass::AuthUser));
    }
}
