//! Durable coordinator state
//!
//! Handles:
//! - Persisting the active cycle (record, commitment, ledger, execution state)
//! - Restoring it after a restart
//! - Storage health checks
//!
//! Stores only write what they are handed; the coordinator guarantees that
//! revisions reach them in increasing order.

mod file;
mod memory;
mod postgres;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use postgres::PgStateStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::coordination::Cycle;
use crate::error::{CoordinatorError, CoordinatorResult};

use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// The active cycle, if one was ever saved
    async fn load(&self) -> CoordinatorResult<Option<Cycle>>;

    /// Persist a cycle and make it the active one
    async fn save(&self, cycle: &Cycle) -> CoordinatorResult<()>;

    async fn health_check(&self) -> CoordinatorResult<()>;
}

/// Open the configured backend
pub async fn open(config: &StorageConfig) -> CoordinatorResult<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.backend {
        StorageBackend::File => Arc::new(FileStateStore::open(&config.data_dir).await?),
        StorageBackend::Memory => Arc::new(MemoryStateStore::new()),
        StorageBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                CoordinatorError::Config("storage.database_url is not set".to_string())
            })?;
            let store = PgStateStore::new(url, config.max_connections, config.min_connections).await?;
            store.run_migrations().await?;
            Arc::new(store)
        }
    };

    Ok(store)
}
