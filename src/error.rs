//! Error types shared by the monitors, the model and the native seams.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced across the component boundary.
///
/// These are returned as typed results from `initialize`, `set_volume`,
/// `toggle_mute` and `set_mute`; they are also carried inside a degraded
/// [`NetworkState`](crate::state::NetworkState) so renderers can explain why
/// a network is shown as disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The platform refused enumeration or subscription (location/network permission).
    #[error("permission denied - enable location access for network enumeration")]
    PermissionDenied,

    /// No default playback device is currently bound.
    #[error("no default playback device available")]
    DeviceUnavailable,

    /// Volume argument outside 0..=100.
    #[error("volume must be between 0 and 100")]
    OutOfRange,

    /// Any other native initialization or I/O failure.
    #[error("native service unavailable")]
    Unavailable,
}

/// Errors reported by the native adapters behind the `system` traits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("access denied by the platform")]
    PermissionDenied,

    #[error("no default playback device")]
    NoDevice,

    #[error("native call failed: {0}")]
    Failed(String),
}

impl NativeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NativeError::Failed(message.into())
    }
}

impl From<NativeError> for ErrorKind {
    fn from(error: NativeError) -> Self {
        match error {
            NativeError::PermissionDenied => ErrorKind::PermissionDenied,
            NativeError::NoDevice => ErrorKind::DeviceUnavailable,
            NativeError::Failed(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<std::io::Error> for NativeError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => NativeError::PermissionDenied,
            _ => NativeError::Failed(error.to_string()),
        }
    }
}
