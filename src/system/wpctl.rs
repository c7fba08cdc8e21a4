//! PipeWire playback control through `wpctl`.
//!
//! `wpctl` has no subscription interface, so this adapter reports no push
//! notifications and the audio monitor falls back to polling.

use std::process::Command;
use tracing::debug;

use super::listeners::ListenerRegistry;
use super::traits::{
    AudioSystemInterface, ListenerId, NativeCallback, PlaybackDevice, VolumeReading,
};
use crate::error::NativeError;

const DEFAULT_SINK: &str = "@DEFAULT_AUDIO_SINK@";

pub struct WpctlAudioSystem {
    // Accepted for contract completeness, never fired
    listeners: ListenerRegistry,
}

impl WpctlAudioSystem {
    pub fn new() -> Self {
        Self {
            listeners: ListenerRegistry::new(),
        }
    }

    fn wpctl(&self, args: &[&str]) -> Result<std::process::Output, NativeError> {
        debug!("Running wpctl {}", args.join(" "));
        Ok(Command::new("wpctl").args(args).output()?)
    }
}

impl Default for WpctlAudioSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSystemInterface for WpctlAudioSystem {
    fn default_playback_device(&self) -> Result<Option<PlaybackDevice>, NativeError> {
        let output = self.wpctl(&["inspect", DEFAULT_SINK])?;
        if !output.status.success() {
            // wpctl cannot resolve the alias when no sink exists
            return Ok(None);
        }
        Ok(parse_inspect(&String::from_utf8_lossy(&output.stdout)))
    }

    fn read_volume(&self, device: &PlaybackDevice) -> Result<VolumeReading, NativeError> {
        let output = self.wpctl(&["get-volume", &device.id])?;
        if !output.status.success() {
            return Err(NativeError::NoDevice);
        }
        parse_volume(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            NativeError::failed("unexpected wpctl get-volume output")
        })
    }

    fn write_volume(&self, device: &PlaybackDevice, percent: u8) -> Result<(), NativeError> {
        let level = format!("{:.2}", f32::from(percent) / 100.0);
        let output = self.wpctl(&["set-volume", &device.id, &level])?;
        if !output.status.success() {
            return Err(NativeError::failed("wpctl set-volume failed"));
        }
        Ok(())
    }

    fn write_mute(&self, device: &PlaybackDevice, muted: bool) -> Result<(), NativeError> {
        let flag = if muted { "1" } else { "0" };
        let output = self.wpctl(&["set-mute", &device.id, flag])?;
        if !output.status.success() {
            return Err(NativeError::failed("wpctl set-mute failed"));
        }
        Ok(())
    }

    fn add_default_device_listener(
        &self,
        callback: NativeCallback,
    ) -> Result<ListenerId, NativeError> {
        Ok(self.listeners.add((), callback))
    }

    fn add_volume_listener(
        &self,
        _device: &PlaybackDevice,
        callback: NativeCallback,
    ) -> Result<ListenerId, NativeError> {
        Ok(self.listeners.add((), callback))
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn supports_change_notifications(&self) -> bool {
        false
    }
}

/// Parses `wpctl inspect` into the node id and its human-readable name.
pub(crate) fn parse_inspect(output: &str) -> Option<PlaybackDevice> {
    let mut lines = output.lines();
    let header = lines.next()?;
    let id = header
        .strip_prefix("id ")?
        .split(',')
        .next()?
        .trim()
        .to_string();

    let mut description = None;
    let mut node_name = None;
    for line in lines {
        let line = line.trim_start_matches(['*', ' ']);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "node.description" => description = Some(value),
            "node.name" => node_name = Some(value),
            _ => {}
        }
    }

    let name = description.or(node_name).unwrap_or_else(|| id.clone());
    Some(PlaybackDevice::new(id, name))
}

/// Parses `Volume: 0.40` / `Volume: 0.40 [MUTED]`.
pub(crate) fn parse_volume(output: &str) -> Option<VolumeReading> {
    let rest = output.trim().strip_prefix("Volume:")?.trim();
    let mut parts = rest.split_whitespace();
    let level: f32 = parts.next()?.parse().ok()?;
    let is_muted = parts.any(|part| part == "[MUTED]");
    let percent = (level * 100.0).round().clamp(0.0, 100.0) as u8;
    Some(VolumeReading {
        volume_percent: percent,
        is_muted,
    })
}
