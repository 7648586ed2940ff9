//! Safe Cosigner - multi-party signing coordinator for Safe multisig accounts
//!
//! The cosigner builds one Safe transaction at a time, collects owner
//! signatures over its EIP-712 commitment hash, and executes it once the
//! account's threshold of distinct owners has approved.

use anyhow::{Context, Result};
use ethers::types::Address;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

mod account;
mod api;
mod chain;
mod config;
mod coordination;
mod error;
mod ledger;
mod metrics;
mod record;
mod signing;
mod state;
mod tx;

use account::{AccountDirectory, AccountResolver, StaticAccountResolver};
use chain::{ChainProvider, SafeAccountResolver};
use config::Settings;
use coordination::{Broadcaster, Coordinator, CoordinatorOptions, DisabledBroadcaster};
use metrics::MetricsServer;
use signing::{EcdsaIdentityResolver, Eip712SafeHasher};
use tx::SafeExecutor;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Safe Cosigner v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let account = Address::from_str(&settings.coordinator.account_address)
        .context("Invalid account address")?;
    info!(
        "Coordinating Safe {:?} on chain {}",
        account, settings.coordinator.chain_id
    );

    let provider = Arc::new(ChainProvider::new(
        settings.coordinator.chain_id,
        &settings.rpc_urls(),
    )?);

    // Account config: pinned in the config file, or read from the Safe
    let resolver: Arc<dyn AccountResolver> = match &settings.account {
        Some(pinned) => {
            info!("Using static account config ({} approvers)", pinned.approvers.len());
            Arc::new(StaticAccountResolver::from_settings(pinned)?)
        }
        None => Arc::new(SafeAccountResolver::new(provider.clone())),
    };
    let options = CoordinatorOptions::from(&settings.coordinator);
    let directory = Arc::new(AccountDirectory::new(
        account,
        resolver,
        options.collaborator_timeout,
    ));

    let broadcaster: Arc<dyn Broadcaster> = match SafeExecutor::load_wallet(&settings.wallet)? {
        Some(wallet) => Arc::new(SafeExecutor::new(
            provider.clone(),
            &settings.coordinator,
            wallet,
        )?),
        None => {
            warn!("No sender wallet configured - execution is disabled");
            Arc::new(DisabledBroadcaster)
        }
    };

    // Initialize state store
    let store = state::open(&settings.storage).await?;
    info!("State store ready ({:?} backend)", settings.storage.backend);

    let hasher = Eip712SafeHasher::new(settings.coordinator.chain_id, account);
    info!("EIP-712 domain separator {:?}", hasher.domain_separator());

    let coordinator = Arc::new(Coordinator::new(
        directory.clone(),
        Arc::new(hasher),
        Arc::new(EcdsaIdentityResolver::new()),
        broadcaster,
        store,
        options,
    ));
    coordinator.restore().await?;

    // Warm the account cache; failures fall back until the next resolve
    if let Err(e) = directory.resolve().await {
        warn!("Initial account resolution failed: {}", e);
    }

    // Start API server
    let api_handle = tokio::spawn({
        let api_config = settings.api.clone();
        let coordinator = coordinator.clone();
        async move {
            if let Err(e) = api::run_server(api_config, coordinator).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Chain health loop
    let health_handle = tokio::spawn({
        let provider = provider.clone();
        async move {
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                if !provider.health_check().await {
                    warn!("Chain {} health check failed", provider.chain_id());
                }
            }
        }
    });

    info!("Safe Cosigner is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Safe Cosigner stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,safe_cosigner=debug,sqlx=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
