use device_state_monitor::system::{InterfaceConnection, MockAudioCall, MockAudioSystem};
use device_state_monitor::{
    AudioDeviceState, AudioMonitor, DispatchBridge, ErrorKind, NetworkState, ObservableModel,
    PolicyAgent, WifiMonitor, WorkerDispatcher,
};
use std::sync::Arc;

mod test_utils;
use test_utils::{AudioSystemBuilder, Recorder, WifiSystemBuilder};

/// Dedup: consecutive notifications with identical (connected, ssid) publish once
#[cfg(test)]
mod dedup {
    use super::*;

    #[test]
    fn test_repeated_wifi_notifications_publish_once() {
        let system = WifiSystemBuilder::new().connected("wlan0", "home-5g").build();
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::inline());
        let recorder: Recorder<NetworkState> = Recorder::new();
        let _subscription = monitor.on_change(recorder.handler());

        monitor.initialize().unwrap();
        for _ in 0..5 {
            system.trigger_connection_change();
        }

        assert_eq!(recorder.values(), vec![NetworkState::connected("home-5g")]);
        // One read to initialize, then one per notification even though nothing was published
        assert_eq!(system.enumerate_call_count(), 6);
    }

    #[test]
    fn test_interface_reshuffle_with_same_result_is_silent() {
        let system = WifiSystemBuilder::new()
            .disconnected("wlan1")
            .connected("wlan0", "home-5g")
            .build();
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::inline());
        monitor.initialize().unwrap();
        let recorder: Recorder<NetworkState> = Recorder::new();
        let _subscription = monitor.on_change(recorder.handler());

        system.set_interfaces(vec![
            InterfaceConnection::connected("wlan0", "home-5g"),
            InterfaceConnection::disconnected("wlan1"),
        ]);
        system.trigger_connection_change();

        assert!(recorder.is_empty());
    }

    #[test]
    fn test_repeated_audio_notifications_publish_once() {
        let system = AudioSystemBuilder::new()
            .default_device("Speakers", 40, false)
            .build();
        let monitor = AudioMonitor::new(system.clone(), DispatchBridge::inline());
        let recorder: Recorder<AudioDeviceState> = Recorder::new();
        let _subscription = monitor.on_change(recorder.handler());

        system.emit_volume_change("Speakers", 60, false);
        system.emit_volume_notification("Speakers");
        system.emit_volume_notification("Speakers");

        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.values()[0].volume(), Some(60));
    }
}

/// Commands: range checking and the toggle round-trip
#[cfg(test)]
mod commands {
    use super::*;

    #[test]
    fn test_out_of_range_volume_is_rejected_without_side_effects() {
        let system = AudioSystemBuilder::new()
            .default_device("Speakers", 40, false)
            .build();
        let monitor = AudioMonitor::new(system.clone(), DispatchBridge::inline());
        let before = monitor.current();
        let recorder: Recorder<AudioDeviceState> = Recorder::new();
        let _subscription = monitor.on_change(recorder.handler());

        for percent in [-50, -1, 101, 250] {
            assert_eq!(monitor.set_volume(percent), Err(ErrorKind::OutOfRange));
        }

        assert!(recorder.is_empty());
        assert!(system.get_calls().is_empty());
        let after = monitor.current();
        assert_eq!(after.volume(), before.volume());
        assert_eq!(after.muted(), before.muted());
        assert_eq!(after.device_name, before.device_name);
    }

    #[test]
    fn test_toggle_mute_twice_round_trips() {
        let system = AudioSystemBuilder::new()
            .default_device("Speakers", 40, false)
            .build();
        let monitor = AudioMonitor::new(system.clone(), DispatchBridge::inline());
        let recorder: Recorder<AudioDeviceState> = Recorder::new();
        let _subscription = monitor.on_change(recorder.handler());

        let first = monitor.toggle_mute().unwrap();
        let published_first = monitor.current().muted();
        let second = monitor.toggle_mute().unwrap();
        let published_second = monitor.current().muted();

        assert_eq!((first, second), (true, false));
        assert_eq!(published_first, Some(true));
        assert_eq!(published_second, Some(false));
        assert_eq!(
            system.get_calls(),
            vec![MockAudioCall::SetMute(true), MockAudioCall::SetMute(false)]
        );
        let muted: Vec<bool> = recorder.values().iter().map(|s| s.is_muted).collect();
        assert_eq!(muted, vec![true, false]);
    }
}

/// Disposal is idempotent for both monitors
#[cfg(test)]
mod disposal {
    use super::*;

    #[test]
    fn test_double_dispose_is_noop() {
        let wifi_system = WifiSystemBuilder::new().connected("wlan0", "home-5g").build();
        let audio_system = AudioSystemBuilder::new()
            .default_device("Speakers", 40, false)
            .build();

        let wifi = WifiMonitor::new(wifi_system.clone(), DispatchBridge::inline());
        let audio = AudioMonitor::new(audio_system.clone(), DispatchBridge::inline());
        wifi.initialize().unwrap();

        wifi.dispose();
        wifi.dispose();
        audio.dispose();
        audio.dispose();

        assert_eq!(wifi_system.listener_count(), 0);
        assert_eq!(audio_system.listener_count(), 0);

        // Dropping after explicit disposal must not release anything twice
        drop(wifi);
        drop(audio);
    }
}

/// Default device changes are published even when nothing matches the prior snapshot
#[cfg(test)]
mod default_device {
    use super::*;

    #[test]
    fn test_switch_to_headset_publishes_single_full_state() {
        let system = AudioSystemBuilder::new()
            .default_device("Speakers", 40, false)
            .device("Headset", 70, true)
            .build();
        let worker = WorkerDispatcher::spawn("default-device-test").unwrap();
        let monitor = AudioMonitor::new(system.clone(), DispatchBridge::queued(worker.clone()));
        let recorder: Recorder<AudioDeviceState> = Recorder::new();
        let _subscription = monitor.on_change(recorder.handler());

        system.switch_default_device(Some("Headset"));
        worker.flush();

        let published = recorder.values();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].device_name, "Headset");
        assert_eq!(published[0].volume_percent, 70);
        assert!(published[0].is_muted);
        assert!(published[0].is_available);

        // Volume notifications now come from the new device only
        system.emit_volume_change("Headset", 30, true);
        worker.flush();
        assert_eq!(recorder.len(), 2);
        worker.shutdown();
    }

    #[test]
    fn test_device_switch_to_same_levels_still_publishes() {
        let system = AudioSystemBuilder::new()
            .default_device("Speakers", 50, false)
            .device("Monitor", 50, false)
            .build();
        let monitor = AudioMonitor::new(system.clone(), DispatchBridge::inline());
        let recorder: Recorder<AudioDeviceState> = Recorder::new();
        let _subscription = monitor.on_change(recorder.handler());

        system.switch_default_device(Some("Monitor"));

        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.values()[0].device_name, "Monitor");
    }
}

/// Policy agent scenarios against the real audio monitor
#[cfg(test)]
mod policy {
    use super::*;

    fn setup(
        initially_muted: bool,
    ) -> (
        Arc<ObservableModel>,
        PolicyAgent,
        MockAudioSystem,
    ) {
        let system = AudioSystemBuilder::new()
            .default_device("Speakers", 40, initially_muted)
            .build();
        let audio = Arc::new(AudioMonitor::new(system.clone(), DispatchBridge::inline()));
        let model = ObservableModel::new();
        model.bind_audio(audio.as_ref());
        let agent = PolicyAgent::new(model.clone(), audio, "home-5g");
        agent.enable().unwrap();
        (model, agent, system)
    }

    #[test]
    fn test_allowed_network_unmutes_exactly_once() {
        let (model, _agent, system) = setup(true);

        model.publish_network(NetworkState::connected("home-5g"));
        assert_eq!(system.mute_calls(), vec![false]);

        model.publish_network(NetworkState::connected("home-5g"));
        assert_eq!(system.mute_calls(), vec![false]);
    }

    #[test]
    fn test_foreign_network_mutes_exactly_once() {
        let (model, _agent, system) = setup(false);

        model.publish_network(NetworkState::connected("coffeeshop"));

        assert_eq!(system.mute_calls(), vec![true]);
        assert_eq!(model.audio().muted(), Some(true));
    }

    #[test]
    fn test_permission_error_state_mutes() {
        let (model, _agent, system) = setup(false);

        model.publish_network(NetworkState::degraded(ErrorKind::PermissionDenied));

        assert_eq!(system.mute_calls(), vec![true]);
    }
}
