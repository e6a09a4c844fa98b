//! Configuration for the follow node.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    /// Where the lead is.
    pub lead: LeadEndpoint,
    /// Peer listener settings.
    pub peers: PeerSettings,
    /// Event loop tuning.
    pub event_loop: EventLoopSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// The lead's TCP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadEndpoint {
    /// Host or IP of the lead.
    pub host: String,
    /// Control port of the lead.
    pub port: u16,
}

/// Peer listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerSettings {
    /// Address to bind for incoming peers. Port 0 picks an ephemeral
    /// port, published at startup.
    pub listen_addr: String,
}

/// Event loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopSettings {
    /// Bounded poll timeout in milliseconds.
    pub poll_timeout_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            lead: LeadEndpoint::default(),
            peers: PeerSettings::default(),
            event_loop: EventLoopSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for LeadEndpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 12345,
        }
    }
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:0".into(),
        }
    }
}

impl Default for EventLoopSettings {
    fn default() -> Self {
        Self { poll_timeout_ms: 10 }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl FollowConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The lead's `host:port` dial string.
    pub fn lead_addr(&self) -> String {
        format!("{}:{}", self.lead.host, self.lead.port)
    }

    /// The bounded poll timeout as a `Duration`.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.event_loop.poll_timeout_ms.max(1))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = FollowConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("listen_addr"));
        assert!(text.contains("poll_timeout_ms"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = FollowConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: FollowConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.lead.port, 12345);
        assert_eq!(parsed.event_loop.poll_timeout_ms, 10);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: FollowConfig = toml::from_str("[lead]\nport = 9000\n").unwrap();
        assert_eq!(parsed.lead.port, 9000);
        assert_eq!(parsed.lead.host, "127.0.0.1");
        assert_eq!(parsed.peers.listen_addr, "0.0.0.0:0");
    }

    #[test]
    fn lead_addr_joins_host_and_port() {
        let cfg = FollowConfig::default();
        assert_eq!(cfg.lead_addr(), "127.0.0.1:12345");
    }

    #[test]
    fn poll_timeout_has_a_floor() {
        let mut cfg = FollowConfig::default();
        cfg.event_loop.poll_timeout_ms = 0;
        assert_eq!(cfg.poll_timeout(), Duration::from_millis(1));
    }
}
