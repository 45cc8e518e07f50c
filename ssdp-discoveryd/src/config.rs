use std::path::Path;
use serde::Deserialize;
use anyhow::{Context, Result};

use crate::discovery::NOTIFICATION_CAPACITY;
use crate::net::interfaces::{IpStack, LocalInterface};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Sent as CPFN.UPNP.ORG in searches
    #[serde(default = "default_control_point_name")]
    pub control_point_name: String,
    #[serde(default)]
    pub ip_stack: IpStack,
    /// Interface allow-list; empty means every qualifying interface
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default = "default_search_on_start")]
    pub search_on_start: bool,
    pub search_target: Option<String>,
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u32,
    /// Periodic re-search; 0 disables it
    #[serde(default)]
    pub search_interval_secs: u64,
    #[serde(default)]
    pub accept_search_requests: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_control_point_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "ssdp-discoveryd".to_string())
}

fn default_search_on_start() -> bool {
    true
}

fn default_max_wait() -> u32 {
    1
}

fn default_capacity() -> usize {
    NOTIFICATION_CAPACITY
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            control_point_name: default_control_point_name(),
            ip_stack: IpStack::default(),
            interfaces: Vec::new(),
            search_on_start: default_search_on_start(),
            search_target: None,
            max_wait_secs: default_max_wait(),
            search_interval_secs: 0,
            accept_search_requests: false,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl DiscoveryConfig {
    /// Interfaces passing both the IP stack filter and the allow-list
    pub fn select(&self, interfaces: Vec<LocalInterface>) -> Vec<LocalInterface> {
        self.ip_stack
            .select(interfaces)
            .into_iter()
            .filter(|iface| self.interfaces.is_empty() || self.interfaces.contains(&iface.name))
            .collect()
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
