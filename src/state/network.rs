use serde::Serialize;
use std::fmt;

use super::change::ChangeDetector;
use crate::error::ErrorKind;

/// Connectivity snapshot published by the WiFi monitor.
///
/// `ssid` is only meaningful while `connected` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkState {
    pub connected: bool,
    pub ssid: String,
    pub error: Option<ErrorKind>,
}

impl NetworkState {
    pub fn connected(ssid: impl Into<String>) -> Self {
        Self {
            connected: true,
            ssid: ssid.into(),
            error: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ssid: String::new(),
            error: None,
        }
    }

    /// Disconnected state carrying the reason the read failed.
    pub fn degraded(error: ErrorKind) -> Self {
        Self {
            error: Some(error),
            ..Self::disconnected()
        }
    }

    /// SSID, if connected.
    pub fn current_ssid(&self) -> Option<&str> {
        if self.connected {
            Some(&self.ssid)
        } else {
            None
        }
    }

    pub fn is_connected_to(&self, ssid: &str) -> bool {
        self.current_ssid() == Some(ssid)
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl ChangeDetector for NetworkState {
    fn differs_from(&self, previous: &Self) -> bool {
        self.connected != previous.connected || self.ssid != previous.ssid
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.connected, self.error) {
            (true, _) => write!(f, "Connected to {}", self.ssid),
            (false, Some(error)) => write!(f, "Unavailable ({})", error),
            (false, None) => write!(f, "Not connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssid_is_hidden_while_disconnected() {
        let mut state = NetworkState::disconnected();
        state.ssid = "stale".to_string();
        assert_eq!(state.current_ssid(), None);
        assert!(!state.is_connected_to("stale"));
    }

    #[test]
    fn test_display_renders_degraded_state() {
        let state = NetworkState::degraded(ErrorKind::PermissionDenied);
        assert!(state.to_string().starts_with("Unavailable"));
        assert_eq!(
            NetworkState::connected("home-5g").to_string(),
            "Connected to home-5g"
        );
        assert_eq!(NetworkState::disconnected().to_string(), "Not connected");
    }
}
