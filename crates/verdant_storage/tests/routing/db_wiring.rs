#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use verdant_storage::{
    CacheRow, CacheSyncEngine, DatabaseRouter, EntityClass, MemCacheStore, RemoteRowSource,
    StorageError, StoreId, SyncRequest,
};

struct PageSource {
    pages: Vec<CacheRow>,
}

impl RemoteRowSource for PageSource {
    fn fetch_batch(
        &self,
        entity: EntityClass,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CacheRow>, StorageError> {
        if entity != EntityClass::StrategyPage {
            return Ok(Vec::new());
        }
        Ok(self
            .pages
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[test]
fn dbw_routing_01_production_routes_are_remote_everywhere() {
    let router = DatabaseRouter::mvp_v1();
    for entity in EntityClass::ALL {
        let route = router.route(entity);
        assert_eq!(route.read, StoreId::Remote);
        assert_eq!(route.write, StoreId::Remote);
    }
}

#[test]
fn dbw_routing_02_cached_entity_reads_flow_to_cache_after_sync() {
    let cached: BTreeSet<EntityClass> = [EntityClass::StrategyPage].into_iter().collect();
    let router = DatabaseRouter::with_sets(cached, BTreeSet::new()).unwrap();
    assert_eq!(router.read_store(EntityClass::StrategyPage), StoreId::Cache);
    assert_eq!(router.write_store(EntityClass::StrategyPage), StoreId::Remote);

    let engine = CacheSyncEngine::new(router);
    let source = PageSource {
        pages: vec![
            CacheRow {
                id: 1,
                payload: b"growth".to_vec(),
            },
            CacheRow {
                id: 2,
                payload: b"income".to_vec(),
            },
        ],
    };
    let mut cache = MemCacheStore::new_in_memory();
    let report = engine.sync(&SyncRequest::default(), &source, &mut cache);
    assert_eq!(report.total_synced(), 2);
    assert!(report.failed_entities().is_empty());
    assert_eq!(cache.entity_rows(EntityClass::StrategyPage).len(), 2);
}

#[test]
fn dbw_routing_03_migrations_gate_on_store_and_entity() {
    let cached: BTreeSet<EntityClass> = [EntityClass::MediaItem].into_iter().collect();
    let remote_only: BTreeSet<EntityClass> = [EntityClass::SupportTicket].into_iter().collect();
    let router = DatabaseRouter::with_sets(cached, remote_only).unwrap();
    assert!(router.allow_migrate(StoreId::Cache, EntityClass::MediaItem));
    assert!(!router.allow_migrate(StoreId::Cache, EntityClass::AuthUser));
    assert!(router.allow_migrate(StoreId::Remote, EntityClass::AuthUser));
    assert!(router.allow_migrate(StoreId::Embedded, EntityClass::SupportTicket));
}
