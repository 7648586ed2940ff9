//! Process-wide cache of the account configuration

use super::{AccountConfig, AccountResolver};
use crate::error::{CollaboratorError, CoordinatorError, CoordinatorResult};

use ethers::types::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Account config as returned by a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub config: AccountConfig,
    /// Last good value served because a fetch after invalidation failed
    pub stale: bool,
}

struct CachedConfig {
    config: AccountConfig,
    stale: bool,
}

/// Caches the account configuration and refreshes it on demand
pub struct AccountDirectory {
    address: Address,
    resolver: Arc<dyn AccountResolver>,
    fetch_timeout: Duration,
    cached: RwLock<Option<CachedConfig>>,
    /// Bumped on every invalidation so that a fetch started earlier is not cached
    generation: AtomicU64,
}

impl AccountDirectory {
    pub fn new(address: Address, resolver: Arc<dyn AccountResolver>, fetch_timeout: Duration) -> Self {
        Self {
            address,
            resolver,
            fetch_timeout,
            cached: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve the account configuration, fetching it when nothing current is cached.
    ///
    /// A failed fetch falls back to the last cached value when there is one.
    pub async fn resolve(&self) -> CoordinatorResult<AccountConfig> {
        Ok(self.lookup().await?.config)
    }

    /// Like `resolve`, but tells whether the value is a stale fallback
    pub async fn lookup(&self) -> CoordinatorResult<Resolved> {
        if let Some(entry) = self.cached.read().await.as_ref() {
            if !entry.stale {
                return Ok(Resolved {
                    config: entry.config.clone(),
                    stale: false,
                });
            }
        }
        self.fetch().await
    }

    /// Cached value, or the single-party fallback when nothing was resolved yet
    pub async fn current_or_default(&self) -> AccountConfig {
        self.cached()
            .await
            .map(|resolved| resolved.config)
            .unwrap_or_else(|| AccountConfig::fallback(self.address))
    }

    /// Cached value without triggering a fetch
    pub async fn cached(&self) -> Option<Resolved> {
        self.cached.read().await.as_ref().map(|entry| Resolved {
            config: entry.config.clone(),
            stale: entry.stale,
        })
    }

    /// Mark the cached value stale so the next resolve fetches again.
    ///
    /// The value itself is kept as the fallback for a failed fetch.
    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(entry) = self.cached.write().await.as_mut() {
            entry.stale = true;
        }
        debug!("Account config cache invalidated for {:?}", self.address);
    }

    /// Fetch a fresh value, keeping the previous one if the fetch fails
    pub async fn refresh(&self) -> CoordinatorResult<Resolved> {
        self.invalidate().await;
        self.fetch().await
    }

    async fn fetch(&self) -> CoordinatorResult<Resolved> {
        let generation = self.generation.load(Ordering::SeqCst);

        let fetched = match timeout(
            self.fetch_timeout,
            self.resolver.fetch_account_config(self.address),
        )
        .await
        {
            Ok(Ok(raw)) => AccountConfig::normalize(self.address, raw),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CollaboratorError::Unavailable(format!(
                "account resolution timed out after {:?}",
                self.fetch_timeout
            ))),
        };

        match fetched {
            Ok(config) => {
                crate::metrics::record_account_resolution(true);
                let mut cached = self.cached.write().await;
                if self.generation.load(Ordering::SeqCst) == generation {
                    *cached = Some(CachedConfig {
                        config: config.clone(),
                        stale: false,
                    });
                }
                info!(
                    "Resolved account {:?}: {} of {} approvers",
                    self.address,
                    config.threshold,
                    config.approvers.len()
                );
                Ok(Resolved {
                    config,
                    stale: false,
                })
            }
            Err(e) => {
                crate::metrics::record_account_resolution(false);
                if let Some(previous) = self.cached().await {
                    warn!("Account resolution failed, keeping cached config: {}", e);
                    return Ok(Resolved {
                        config: previous.config,
                        stale: true,
                    });
                }
                Err(CoordinatorError::Resolution(e.to_string()))
            }
        }
    }
}
