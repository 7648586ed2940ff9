//! In-process store, state does not survive a restart

use super::StateStore;
use crate::coordination::Cycle;
use crate::error::CoordinatorResult;

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStateStore {
    /// Cycles keyed by commitment hash
    cycles: RwLock<HashMap<String, Cycle>>,
    active: RwLock<Option<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cycle_count(&self) -> usize {
        self.cycles.read().await.len()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> CoordinatorResult<Option<Cycle>> {
        let active = self.active.read().await.clone();
        Ok(match active {
            Some(key) => self.cycles.read().await.get(&key).cloned(),
            None => None,
        })
    }

    async fn save(&self, cycle: &Cycle) -> CoordinatorResult<()> {
        let key = format!("{:?}", cycle.commitment);
        self.cycles.write().await.insert(key.clone(), cycle.clone());
        *self.active.write().await = Some(key);
        Ok(())
    }

    async fn health_check(&self) -> CoordinatorResult<()> {
        Ok(())
    }
}
