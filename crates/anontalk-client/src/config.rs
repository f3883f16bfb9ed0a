//! Client configuration loaded from environment variables.
//!
//! Everything has a default so a client can start against a local relay
//! with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use anontalk_shared::constants::{
    DEFAULT_RELAY_PORT, GRAPH_ENDPOINT_PATH, HEARTBEAT_SECS, STALENESS_WINDOW_SECS,
};

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay's graph endpoint.
    /// Env: `RELAY_URL`
    /// Default: `ws://localhost:8765/gun`
    pub relay_url: String,

    /// Pinning service API key. Media uploads fail without it.
    /// Env: `PINATA_API_KEY`
    pub pinata_api_key: Option<String>,

    /// Pinning service API secret.
    /// Env: `PINATA_SECRET_KEY`
    pub pinata_secret_key: Option<String>,

    /// Presence heartbeat period.
    /// Env: `HEARTBEAT_SECS`
    /// Default: 15 s
    pub heartbeat_period: Duration,

    /// Age after which a peer's presence reads as offline. Must lie strictly
    /// between one and two heartbeat periods.
    /// Env: `STALENESS_SECS`
    /// Default: 30 s
    pub staleness_window: Duration,

    /// Directory holding the session database.
    /// Env: `ANONTALK_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: format!("ws://localhost:{DEFAULT_RELAY_PORT}{GRAPH_ENDPOINT_PATH}"),
            pinata_api_key: None,
            pinata_secret_key: None,
            heartbeat_period: Duration::from_secs(HEARTBEAT_SECS),
            staleness_window: Duration::from_secs(STALENESS_WINDOW_SECS),
            data_dir: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("relay_url", &self.relay_url)
            .field("pinata_configured", &self.pinata_api_key.is_some())
            .field("heartbeat_period", &self.heartbeat_period)
            .field("staleness_window", &self.staleness_window)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = get("RELAY_URL").filter(|u| !u.is_empty()) {
            config.relay_url = url;
        }

        config.pinata_api_key = get("PINATA_API_KEY").filter(|k| !k.is_empty());
        config.pinata_secret_key = get("PINATA_SECRET_KEY").filter(|k| !k.is_empty());

        let heartbeat = parse_secs(&get, "HEARTBEAT_SECS");
        let staleness = parse_secs(&get, "STALENESS_SECS");
        let period = heartbeat.unwrap_or(config.heartbeat_period);
        let window = staleness.unwrap_or(config.staleness_window);

        if window_fits_period(period, window) {
            config.heartbeat_period = period;
            config.staleness_window = window;
        } else {
            tracing::warn!(
                heartbeat = ?period,
                staleness = ?window,
                "Staleness window must lie between one and two heartbeat periods, using defaults"
            );
        }

        if let Some(dir) = get("ANONTALK_DATA_DIR").filter(|d| !d.is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        config
    }

    /// Both Pinata credentials, if configured.
    pub fn pinata_credentials(&self) -> Option<(&str, &str)> {
        self.pinata_api_key
            .as_deref()
            .zip(self.pinata_secret_key.as_deref())
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

/// A heartbeat must always land inside the window, and one missed heartbeat
/// must be enough to go stale.
fn window_fits_period(period: Duration, window: Duration) -> bool {
    window > period && window < period * 2
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
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.relay_url, "ws://localhost:8765/gun");
        assert_eq!(config.heartbeat_period, Duration::from_secs(15));
        assert_eq!(config.staleness_window, Duration::from_secs(30));
        assert!(config.pinata_credentials().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("RELAY_URL", "ws://relay.example:9000/gun"),
            ("PINATA_API_KEY", "key"),
            ("PINATA_SECRET_KEY", "secret"),
            ("HEARTBEAT_SECS", "10"),
            ("STALENESS_SECS", "15"),
            ("ANONTALK_DATA_DIR", "/tmp/anontalk"),
        ]));
        assert_eq!(config.relay_url, "ws://relay.example:9000/gun");
        assert_eq!(config.pinata_credentials(), Some(("key", "secret")));
        assert_eq!(config.heartbeat_period, Duration::from_secs(10));
        assert_eq!(config.staleness_window, Duration::from_secs(15));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/anontalk")));
    }

    #[test]
    fn test_window_outside_bounds_falls_back() {
        // Window equal to the period: a single late heartbeat would flap.
        let config = ClientConfig::from_lookup(lookup(&[("STALENESS_SECS", "15")]));
        assert_eq!(config.staleness_window, Duration::from_secs(30));

        // Window of two periods or more tolerates a missed heartbeat.
        let config = ClientConfig::from_lookup(lookup(&[
            ("HEARTBEAT_SECS", "10"),
            ("STALENESS_SECS", "20"),
        ]));
        assert_eq!(config.heartbeat_period, Duration::from_secs(15));
        assert_eq!(config.staleness_window, Duration::from_secs(30));
    }

    #[test]
    fn test_garbage_durations_ignored() {
        let config = ClientConfig::from_lookup(lookup(&[("HEARTBEAT_SECS", "soon")]));
        assert_eq!(config.heartbeat_period, Duration::from_secs(15));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("PINATA_API_KEY", "key-123"),
            ("PINATA_SECRET_KEY", "secret-456"),
        ]));
        let printed = format!("{config:?}");
        assert!(!printed.contains("key-123"));
        assert!(!printed.contains("secret-456"));
    }
}
