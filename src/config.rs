use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/room-chat.json";
pub const DEFAULT_ROOM: &str = "default-room";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Rendezvous nodes, as multiaddrs ending in `/p2p/<PeerId>`.
    #[serde(default)]
    pub bootstrap_nodes: Vec<String>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_true")]
    pub enable_mdns: bool,
    #[serde(default = "default_identity_key_path")]
    pub identity_key_path: String,
    /// 0 waits for the announcement indefinitely.
    #[serde(default = "default_announce_timeout_secs")]
    pub announce_timeout_secs: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_listen_addr() -> String {
    "/ip4/0.0.0.0/tcp/0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_identity_key_path() -> String {
    "data/client_key.pk".to_string()
}

fn default_announce_timeout_secs() -> u64 {
    60
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_status_interval_secs() -> u64 {
    5
}

fn default_idle_timeout_secs() -> u64 {
    24 * 60 * 60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bootstrap_nodes: Vec::new(),
            listen_addr: default_listen_addr(),
            enable_mdns: default_true(),
            identity_key_path: default_identity_key_path(),
            announce_timeout_secs: default_announce_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            status_interval_secs: default_status_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl AppConfig {
    pub fn announce_timeout(&self) -> Option<Duration> {
        match self.announce_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}

/// Puts `entry` first in the bootstrap list of the config at `path`.
pub fn persist_bootstrap_node(path: &str, entry: &str) {
    let mut config = load_config(path);
    config.bootstrap_nodes.retain(|node| node != entry);
    config.bootstrap_nodes.insert(0, entry.to_string());

    if let Err(err) = save_config(path, &config) {
        log::error!("Failed to write bootstrap config {}: {err}", path);
    } else {
        log::info!("Persisted bootstrap node {} to {}", entry, path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path() -> String {
        std::env::temp_dir()
            .join(format!("room-chat-{}", uuid::Uuid::new_v4()))
            .join("config.json")
            .to_string_lossy()
            .to_string()
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"enable_mdns": false, "settle_delay_ms": 0}"#).unwrap();

        assert!(!config.enable_mdns);
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.listen_addr, "/ip4/0.0.0.0/tcp/0");
        assert_eq!(config.announce_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.status_interval(), Duration::from_secs(5));
    }

    #[test]
    fn zero_announce_timeout_means_unbounded() {
        let config = AppConfig {
            announce_timeout_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.announce_timeout(), None);
    }

    #[test]
    fn missing_file_gives_defaults() {
        assert_eq!(load_config(&temp_config_path()), AppConfig::default());
    }

    #[test]
    fn persisted_bootstrap_node_moves_to_front() {
        let path = temp_config_path();
        persist_bootstrap_node(&path, "/ip4/1.2.3.4/tcp/4001/p2p/a");
        persist_bootstrap_node(&path, "/ip4/5.6.7.8/tcp/4001/p2p/b");
        persist_bootstrap_node(&path, "/ip4/1.2.3.4/tcp/4001/p2p/a");

        let config = load_config(&path);
        assert_eq!(
            config.bootstrap_nodes,
            vec!["/ip4/1.2.3.4/tcp/4001/p2p/a", "/ip4/5.6.7.8/tcp/4001/p2p/b"]
        );

        if let Some(dir) = Path::new(&path).parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }
}
