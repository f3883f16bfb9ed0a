//! Relay configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the relay can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::time::Duration;

use anontalk_shared::constants::{DEFAULT_RELAY_PORT, SWEEP_INTERVAL_SECS, SWEEP_THRESHOLD_SECS};
use anontalk_shared::ChannelName;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address for the HTTP/WebSocket listener.
    /// Env: `LISTEN_ADDR`
    /// Default: `0.0.0.0:8765`
    pub listen_addr: SocketAddr,

    /// How often the presence sweep runs.
    /// Env: `SWEEP_INTERVAL_SECS`
    /// Default: 30
    pub sweep_interval: Duration,

    /// Heartbeat age after which the sweep marks a user offline.
    /// Env: `SWEEP_THRESHOLD_SECS`
    /// Default: 60
    pub sweep_threshold: Duration,

    /// Channel seeded at startup.
    /// Env: `DEFAULT_CHANNEL`
    /// Default: `general`
    pub default_channel: ChannelName,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], DEFAULT_RELAY_PORT).into(),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            sweep_threshold: Duration::from_secs(SWEEP_THRESHOLD_SECS),
            default_channel: ChannelName::default_channel(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = get("LISTEN_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.listen_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid LISTEN_ADDR, using default"),
            }
        }

        if let Some(secs) = parse_secs(&get, "SWEEP_INTERVAL_SECS") {
            config.sweep_interval = secs;
        }

        if let Some(secs) = parse_secs(&get, "SWEEP_THRESHOLD_SECS") {
            config.sweep_threshold = secs;
        }

        if let Some(name) = get("DEFAULT_CHANNEL") {
            match ChannelName::normalize(&name) {
                Some(channel) => config.default_channel = channel,
                None => tracing::warn!(value = %name, "Invalid DEFAULT_CHANNEL, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_secs(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = get(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid duration, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr, ([0, 0, 0, 0], 8765).into());
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.sweep_threshold, Duration::from_secs(60));
        assert_eq!(config.default_channel.as_str(), "general");
    }

    #[test]
    fn test_overrides() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("SWEEP_INTERVAL_SECS", "5"),
            ("SWEEP_THRESHOLD_SECS", "10"),
            ("DEFAULT_CHANNEL", " Lobby "),
        ]));
        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.sweep_threshold, Duration::from_secs(10));
        assert_eq!(config.default_channel.as_str(), "lobby");
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("LISTEN_ADDR", "not an addr"),
            ("SWEEP_INTERVAL_SECS", "0"),
            ("SWEEP_THRESHOLD_SECS", "soon"),
            ("DEFAULT_CHANNEL", "  "),
        ]));
        let defaults = RelayConfig::default();
        assert_eq!(config.listen_addr, defaults.listen_addr);
        assert_eq!(config.sweep_interval, defaults.sweep_interval);
        assert_eq!(config.sweep_threshold, defaults.sweep_threshold);
        assert_eq!(config.default_channel, defaults.default_channel);
    }
}
