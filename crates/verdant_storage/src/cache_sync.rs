#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::router::{DatabaseRouter, EntityClass};
use crate::stores::StorageError;

pub const SYNC_BATCH_SIZE: usize = 100;

/// One row as moved between stores. Identifiers are preserved
/// verbatim; the payload is the serialized row body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRow {
    pub id: u64,
    pub payload: Vec<u8>,
}

fn content_hash(payload: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(payload);
    h.finalize().into()
}

/// Batched read access to the authoritative store.
pub trait RemoteRowSource {
    /// Rows for `entity` in stable id order, at most `limit`, starting
    /// at `offset`.
    fn fetch_batch(
        &self,
        entity: EntityClass,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CacheRow>, StorageError>;
}

/// In-memory cache being refreshed. Writes happen per entity behind a
/// staged commit so a failed entity leaves its cached rows untouched.
#[derive(Debug, Default)]
pub struct MemCacheStore {
    rows: BTreeMap<(EntityClass, u64), CacheRow>,
    hashes: BTreeMap<(EntityClass, u64), [u8; 32]>,
    writes: u64,
}

impl MemCacheStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn entity_rows(&self, entity: EntityClass) -> Vec<&CacheRow> {
        self.rows
            .iter()
            .filter(|((e, _), _)| *e == entity)
            .map(|(_, row)| row)
            .collect()
    }

    /// Physical writes performed since construction. Unchanged rows
    /// are skipped on re-sync, so this is the idempotence witness.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    fn clear_entity(&mut self, entity: EntityClass) -> u64 {
        let keys: Vec<(EntityClass, u64)> = self
            .rows
            .keys()
            .filter(|(e, _)| *e == entity)
            .copied()
            .collect();
        let cleared = keys.len() as u64;
        for key in &keys {
            self.rows.remove(key);
            self.hashes.remove(key);
        }
        if cleared > 0 {
            self.writes += cleared;
        }
        cleared
    }

    fn upsert(&mut self, entity: EntityClass, row: CacheRow) {
        let key = (entity, row.id);
        let hash = content_hash(&row.payload);
        if self.hashes.get(&key) == Some(&hash) {
            return;
        }
        self.rows.insert(key, row);
        self.hashes.insert(key, hash);
        self.writes += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// Restrict the run to one entity; None means every cached entity.
    pub entity: Option<EntityClass>,
    /// Purge the entity in cache before copying.
    pub clear: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySyncOutcome {
    pub entity: EntityClass,
    pub synced: u64,
    pub cleared: u64,
    pub error: Option<StorageError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub outcomes: Vec<EntitySyncOutcome>,
}

impl SyncReport {
    pub fn total_synced(&self) -> u64 {
        self.outcomes.iter().map(|o| o.synced).sum()
    }

    pub fn failed_entities(&self) -> Vec<EntityClass> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_some())
            .map(|o| o.entity)
            .collect()
    }
}

/// Copies cached entities from the authoritative store into the
/// cache. Entities are processed independently in declared order; a
/// failure is recorded in the report and the run continues.
#[derive(Debug)]
pub struct CacheSyncEngine {
    router: DatabaseRouter,
    batch_size: usize,
}

impl CacheSyncEngine {
    pub fn new(router: DatabaseRouter) -> Self {
        Self {
            router,
            batch_size: SYNC_BATCH_SIZE,
        }
    }

    pub fn sync(
        &self,
        request: &SyncRequest,
        source: &dyn RemoteRowSource,
        cache: &mut MemCacheStore,
    ) -> SyncReport {
        let entities: Vec<EntityClass> = match request.entity {
            Some(entity) => vec![entity],
            None => EntityClass::ALL
                .iter()
                .copied()
                .filter(|e| self.router.cached_set().contains(e))
                .collect(),
        };

        let mut report = SyncReport::default();
        for entity in entities {
            report
                .outcomes
                .push(self.sync_entity(entity, request.clear, source, cache));
        }
        report
    }

    fn sync_entity(
        &self,
        entity: EntityClass,
        clear: bool,
        source: &dyn RemoteRowSource,
        cache: &mut MemCacheStore,
    ) -> EntitySyncOutcome {
        // Fetch everything before touching the cache so a mid-stream
        // source failure leaves the cached rows as they were.
        let mut staged: Vec<CacheRow> = Vec::new();
        let mut offset = 0usize;
        loop {
            let batch = match source.fetch_batch(entity, offset, self.batch_size) {
                Ok(batch) => batch,
                Err(e) => {
                    return EntitySyncOutcome {
                        entity,
                        synced: 0,
                        cleared: 0,
                        error: Some(e),
                    }
                }
            };
            let got = batch.len();
            staged.extend(batch);
            if got < self.batch_size {
                break;
            }
            offset += got;
        }

        let cleared = if clear { cache.clear_entity(entity) } else { 0 };
        let synced = staged.len() as u64;
        for row in staged {
            cache.upsert(entity, row);
        }
        EntitySyncOutcome {
            entity,
            synced,
            cleared,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    struct FixedSource {
        rows: BTreeMap<EntityClass, Vec<CacheRow>>,
        failing: BTreeSet<EntityClass>,
    }

    impl RemoteRowSource for FixedSource {
        fn fetch_batch(
            &self,
            entity: EntityClass,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<CacheRow>, StorageError> {
            if self.failing.contains(&entity) {
                return Err(StorageError::Unavailable {
                    store: crate::stores::StoreId::Remote,
                    detail: "connection reset".to_string(),
                });
            }
            let rows = self.rows.get(&entity).map(Vec::as_slice).unwrap_or(&[]);
            Ok(rows
                .iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn row(id: u64, payload: &str) -> CacheRow {
        CacheRow {
            id,
            payload: payload.as_bytes().to_vec(),
        }
    }

    fn engine_with_cached(entities: &[EntityClass]) -> CacheSyncEngine {
        let router =
            DatabaseRouter::with_sets(entities.iter().copied().collect(), BTreeSet::new()).unwrap();
        CacheSyncEngine::new(router)
    }

    #[test]
    fn at_cache_sync_01_resync_without_clear_is_idempotent() {
        let engine = engine_with_cached(&[EntityClass::StrategyPage]);
        let source = FixedSource {
            rows: [(
                EntityClass::StrategyPage,
                vec![row(1, "growth"), row(2, "income")],
            )]
            .into_iter()
            .collect(),
            failing: BTreeSet::new(),
        };
        let mut cache = MemCacheStore::new_in_memory();
        let request = SyncRequest::default();

        let first = engine.sync(&request, &source, &mut cache);
        assert_eq!(first.total_synced(), 2);
        let writes_after_first = cache.write_count();

        let second = engine.sync(&request, &source, &mut cache);
        assert_eq!(second.total_synced(), 2);
        assert_eq!(cache.write_count(), writes_after_first);
        assert_eq!(cache.entity_rows(EntityClass::StrategyPage).len(), 2);
    }

    #[test]
    fn at_cache_sync_02_one_failure_does_not_abort_the_rest() {
        let engine = engine_with_cached(&[EntityClass::StrategyPage, EntityClass::MediaItem]);
        let source = FixedSource {
            rows: [(EntityClass::MediaItem, vec![row(5, "press")])]
                .into_iter()
                .collect(),
            failing: [EntityClass::StrategyPage].into_iter().collect(),
        };
        let mut cache = MemCacheStore::new_in_memory();

        let report = engine.sync(&SyncRequest::default(), &source, &mut cache);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failed_entities(), vec![EntityClass::StrategyPage]);
        assert_eq!(cache.entity_rows(EntityClass::MediaItem).len(), 1);
    }

    #[test]
    fn at_cache_sync_03_failed_entity_keeps_prior_cache_rows() {
        let engine = engine_with_cached(&[EntityClass::StrategyPage]);
        let good = FixedSource {
            rows: [(EntityClass::StrategyPage, vec![row(1, "growth")])]
                .into_iter()
                .collect(),
            failing: BTreeSet::new(),
        };
        let mut cache = MemCacheStore::new_in_memory();
        engine.sync(&SyncRequest::default(), &good, &mut cache);

        let bad = FixedSource {
            rows: BTreeMap::new(),
            failing: [EntityClass::StrategyPage].into_iter().collect(),
        };
        let report = engine.sync(
            &SyncRequest {
                entity: Some(EntityClass::StrategyPage),
                clear: true,
            },
            &bad,
            &mut cache,
        );
        assert!(report.outcomes[0].error.is_some());
        assert_eq!(report.outcomes[0].cleared, 0);
        assert_eq!(cache.entity_rows(EntityClass::StrategyPage).len(), 1);
    }

    #[test]
    fn at_cache_sync_04_clear_purges_before_copy_and_preserves_ids() {
        let engine = engine_with_cached(&[EntityClass::MediaItem]);
        let stale = FixedSource {
            rows: [(EntityClass::MediaItem, vec![row(9, "old"), row(10, "old2")])]
                .into_iter()
                .collect(),
            failing: BTreeSet::new(),
        };
        let mut cache = MemCacheStore::new_in_memory();
        engine.sync(&SyncRequest::default(), &stale, &mut cache);

        let fresh = FixedSource {
            rows: [(EntityClass::MediaItem, vec![row(10, "new")])]
                .into_iter()
                .collect(),
            failing: BTreeSet::new(),
        };
        let report = engine.sync(
            &SyncRequest {
                entity: Some(EntityClass::MediaItem),
                clear: true,
            },
            &fresh,
            &mut cache,
        );
        assert_eq!(report.outcomes[0].cleared, 2);
        assert_eq!(report.outcomes[0].synced, 1);
        let rows = cache.entity_rows(EntityClass::MediaItem);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 10);
        assert_eq!(rows[0].payload, b"new".to_vec());
    }

    #[test]
    fn at_cache_sync_05_batches_page_through_large_entities() {
        let engine = engine_with_cached(&[EntityClass::StrategyPage]);
        let rows: Vec<CacheRow> = (0..250).map(|i| row(i, "p")).collect();
        let source = FixedSource {
            rows: [(EntityClass::StrategyPage, rows)].into_iter().collect(),
            failing: BTreeSet::new(),
        };
        let mut cache = MemCacheStore::new_in_memory();
        let report = engine.sync(&SyncRequest::default(), &source, &mut cache);
        assert_eq!(report.total_synced(), 250);
        assert_eq!(cache.entity_rows(EntityClass::StrategyPage).len(), 250);
    }
}
