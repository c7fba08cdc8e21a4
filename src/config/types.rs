use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::MonitorMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub wifi: WifiConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub dispatch: DispatchKind,
}

/// Where monitor callbacks are marshaled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchKind {
    /// A dedicated worker thread, one timeline for all updates
    Worker,
    /// Directly on the notifying thread
    Inline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    Notify,
    Poll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub mode: AudioMode,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Network on which audio stays unmuted
    pub allowed_ssid: String,
    pub enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            dispatch: DispatchKind::Worker,
        }
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mode: AudioMode::Notify,
            poll_interval_ms: 500,
        }
    }
}

impl WifiConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl AudioConfig {
    pub fn monitor_mode(&self) -> MonitorMode {
        match self.mode {
            AudioMode::Notify => MonitorMode::Notify,
            AudioMode::Poll => MonitorMode::Poll(Duration::from_millis(self.poll_interval_ms)),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.wifi.poll_interval_ms == 0 {
            bail!("wifi.poll_interval_ms must be greater than zero");
        }
        if self.audio.poll_interval_ms == 0 {
            bail!("audio.poll_interval_ms must be greater than zero");
        }
        if self.agent.enabled && self.agent.allowed_ssid.trim().is_empty() {
            bail!("agent.enabled requires a non-empty agent.allowed_ssid");
        }
        Ok(())
    }
}
