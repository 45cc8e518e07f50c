use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use shared::message::{Message, MessageType};
use ssdp_discoveryd::config::{Config, DiscoveryConfig};
use ssdp_discoveryd::net::interfaces::LocalInterface;
use ssdp_discoveryd::{DiscoveryService, InterfacePool, Scope};

const DEFAULT_CONFIG_PATH: &str = "/etc/ssdp-discovery/discoveryd.toml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ssdp_discoveryd=info,shared=info"))
        )
        .init();

    tracing::info!("Starting ssdp-discoveryd");

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)?,
        None => {
            tracing::info!("No config file, using defaults");
            Config::default()
        }
    };

    let interfaces = LocalInterface::enumerate().context("Failed to list network interfaces")?;
    let interfaces = config.discovery.select(interfaces);
    if interfaces.is_empty() {
        tracing::warn!("No interface qualifies for {:?}", config.discovery.ip_stack);
    }
    for iface in &interfaces {
        tracing::info!("Using interface {} ({} address(es))", iface.name, iface.addrs.len());
    }

    let scope = Scope::new();
    let (pool, messages) =
        InterfacePool::new(&config.discovery.control_point_name, interfaces, &scope);
    if !config.discovery.accept_search_requests {
        pool.set_filter(Some(Arc::new(|m: &Message| m.kind() != MessageType::Search)));
    }

    let (service, mut notifications) = DiscoveryService::new(
        Arc::new(pool),
        messages,
        scope.clone(),
        config.notifications.capacity,
    );

    if config.discovery.search_on_start {
        search(service.pool(), &config.discovery);
    }

    if config.discovery.search_interval_secs > 0 {
        let pool = Arc::clone(service.pool());
        let discovery = config.discovery.clone();
        let cancel = scope.child_token();
        scope.spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(discovery.search_interval_secs));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => search(&pool, &discovery),
                }
            }
        });
    }

    // Consumer: one JSON line per notification
    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!("Failed to serialize notification: {}", e),
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    service.stop();
    scope.wait().await;
    drop(service);

    if let Err(e) = printer.await {
        tracing::error!("Notification printer task failed: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Search every interface with the configured target and MX
fn search(pool: &InterfacePool, discovery: &DiscoveryConfig) {
    for name in pool.active_interfaces() {
        if let Some(member) = pool.member(&name) {
            member.search(discovery.search_target.as_deref(), discovery.max_wait_secs);
        }
    }
}
