use crate::state::NetworkState;

/// "Mute unless connected to the allow-listed network."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutePolicy {
    allowed_ssid: String,
}

impl MutePolicy {
    pub fn new(allowed_ssid: impl Into<String>) -> Self {
        Self {
            allowed_ssid: allowed_ssid.into(),
        }
    }

    pub fn allowed_ssid(&self) -> &str {
        &self.allowed_ssid
    }

    /// Desired mute state for `network`. Degraded states count as
    /// disconnected.
    pub fn should_mute(&self, network: &NetworkState) -> bool {
        !network.is_connected_to(&self.allowed_ssid)
    }
}
