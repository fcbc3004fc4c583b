//! Plain configuration struct for the host bridge: public fields,
//! `Default` impl, optional `serde::Deserialize` behind the `config`
//! feature — the same shape as `machine-amiga::config`'s model/region
//! structs under its `mcp`-gated `serde_json` dependency.

use std::time::Duration;

#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub device_path: String,
    pub baud_rate: u32,
    pub reconnect_backoff_ms: u64,
    pub keepalive_interval_ms: u64,
    pub ring_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_path: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            reconnect_backoff_ms: 500,
            keepalive_interval_ms: 5_000,
            ring_capacity: 4096,
        }
    }
}

impl BridgeConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}

#[cfg(feature = "config")]
pub fn load_from_json_file(path: &std::path::Path) -> Result<BridgeConfig, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}
