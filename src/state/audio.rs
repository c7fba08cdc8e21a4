use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

use super::change::ChangeDetector;

/// Playback device snapshot published by the audio monitor.
///
/// When `is_available` is false, `volume_percent` and `is_muted` carry no
/// information; use [`volume`](Self::volume) and [`muted`](Self::muted) to
/// read them as "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioDeviceState {
    pub device_name: String,
    pub volume_percent: u8,
    pub is_muted: bool,
    pub is_available: bool,
    pub timestamp: SystemTime,
}

impl AudioDeviceState {
    pub fn available(device_name: impl Into<String>, volume_percent: u8, is_muted: bool) -> Self {
        Self {
            device_name: device_name.into(),
            volume_percent: volume_percent.min(100),
            is_muted,
            is_available: true,
            timestamp: SystemTime::now(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            device_name: String::new(),
            volume_percent: 0,
            is_muted: false,
            is_available: false,
            timestamp: SystemTime::now(),
        }
    }

    pub fn volume(&self) -> Option<u8> {
        self.is_available.then_some(self.volume_percent)
    }

    pub fn muted(&self) -> Option<bool> {
        self.is_available.then_some(self.is_muted)
    }
}

impl Default for AudioDeviceState {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl ChangeDetector for AudioDeviceState {
    fn differs_from(&self, previous: &Self) -> bool {
        if self.is_available != previous.is_available {
            return true;
        }
        if !self.is_available {
            // Nothing else is meaningful on either side
            return false;
        }
        self.device_name != previous.device_name
            || self.volume_percent != previous.volume_percent
            || self.is_muted != previous.is_muted
    }
}

impl fmt::Display for AudioDeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_available {
            return write!(f, "No audio device available (volume unknown)");
        }
        write!(
            f,
            "{}: {}%{}",
            self.device_name,
            self.volume_percent,
            if self.is_muted { " (MUTED)" } else { "" }
        )
    }
}
