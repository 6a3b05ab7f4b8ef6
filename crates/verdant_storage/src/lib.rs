#![forbid(unsafe_code)]

pub mod cache_sync;
pub mod router;
pub mod stores;

pub use cache_sync::{
    CacheRow, CacheSyncEngine, EntitySyncOutcome, MemCacheStore, RemoteRowSource, SyncReport,
    SyncRequest, SYNC_BATCH_SIZE,
};
pub use router::{DatabaseRoute, DatabaseRouter, EntityClass, RouterConfigError};
pub use stores::{
    MediaItem, MemPageStore, MemTicketStore, NavLink, PageStore, SiteNavigation, StorageError,
    StoreId, TicketCounts, TicketStore,
};
