use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How sessions share the device controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    /// sessions commission in parallel, controller callbacks are routed by node id
    Concurrent,
    /// only one session talks to controller at a time
    Serialized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    pub scan_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub commissioning_timeout_ms: u64,
    pub session_policy: SessionPolicy,
    /// first id handed out when no id state exists yet
    pub first_device_id: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            commissioning_timeout_ms: 120_000,
            session_policy: SessionPolicy::Concurrent,
            first_device_id: 1,
        }
    }
}

impl PairingConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
    pub fn commissioning_timeout(&self) -> Duration {
        Duration::from_millis(self.commissioning_timeout_ms)
    }
}

pub(crate) fn config_path(base: &str) -> String {
    format!("{}/config.json", base)
}

pub(crate) fn device_ids_path(base: &str) -> String {
    format!("{}/device_ids.json", base)
}

pub(crate) fn load_config(base: &str) -> Result<PairingConfig> {
    let path = config_path(base);
    let data = std::fs::read_to_string(&path).context(format!("reading config from {}", path))?;
    serde_json::from_str(&data).context("parsing config.json")
}

pub(crate) fn save_config(base: &str, config: &PairingConfig) -> Result<()> {
    let path = config_path(base);
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, data).context(format!("writing config to {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let c: PairingConfig =
            serde_json::from_str(r#"{"scan_timeout_ms": 500, "session_policy": "serialized"}"#).unwrap();
        assert_eq!(c.scan_timeout(), Duration::from_millis(500));
        assert_eq!(c.session_policy, SessionPolicy::Serialized);
        assert_eq!(c.commissioning_timeout(), Duration::from_secs(120));
        assert_eq!(c.first_device_id, 1);
    }

    #[test]
    fn config_round_trip_on_disk() {
        let dir = std::env::temp_dir().join("matpair_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let base = dir.to_str().unwrap();

        assert!(load_config(base).is_err());
        let c = PairingConfig {
            first_device_id: 1000,
            ..Default::default()
        };
        save_config(base, &c).unwrap();
        let loaded = load_config(base).unwrap();
        assert_eq!(loaded.first_device_id, 1000);
        assert_eq!(loaded.session_policy, SessionPolicy::Concurrent);
    }
}
