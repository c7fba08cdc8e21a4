use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::signals::{SignalHandler, SignalType};
use crate::agent::PolicyAgent;
use crate::audio::{AudioMonitor, MonitorMode};
use crate::config::{Config, ConfigLoader, DispatchKind};
use crate::dispatch::{DispatchBridge, DispatchMode, Dispatcher, WorkerDispatcher};
use crate::model::ObservableModel;
use crate::system::{
    AudioSystemInterface, FileSystemInterface, PlatformAudioSystem, PlatformWifiSystem,
    WifiSystemInterface,
};
use crate::wifi::WifiMonitor;

/// Wires both monitors, the observable model and the policy agent together
/// and owns their lifecycle.
pub struct MonitorService<W: WifiSystemInterface, A: AudioSystemInterface> {
    config: Config,
    worker: Option<Arc<WorkerDispatcher>>,
    model: Arc<ObservableModel>,
    wifi: WifiMonitor<W>,
    audio: Arc<AudioMonitor<A>>,
    agent: Option<PolicyAgent>,
}

impl<W: WifiSystemInterface, A: AudioSystemInterface> MonitorService<W, A> {
    pub fn new(wifi_system: W, audio_system: A, config: Config) -> Result<Self> {
        config.validate().context("Refusing to start with invalid configuration")?;

        let worker = match config.general.dispatch {
            DispatchKind::Worker => match WorkerDispatcher::spawn("state-dispatch") {
                Ok(worker) => Some(worker),
                Err(e) => {
                    warn!("Could not start dispatch worker, delivering inline: {}", e);
                    None
                }
            },
            DispatchKind::Inline => None,
        };
        let bridge = DispatchBridge::new(
            worker
                .clone()
                .map(|worker| worker as Arc<dyn Dispatcher>),
        );

        let model = ObservableModel::new();
        let wifi = WifiMonitor::new(wifi_system, bridge.clone());
        let audio = Arc::new(AudioMonitor::with_mode(
            audio_system,
            bridge,
            config.audio.monitor_mode(),
        ));
        model.bind_wifi(&wifi);
        model.bind_audio(audio.as_ref());

        Ok(Self {
            config,
            worker,
            model,
            wifi,
            audio,
            agent: None,
        })
    }

    /// Arms the agent (when configured) and then the WiFi monitor, so the
    /// first connectivity snapshot already goes through the policy.
    pub fn start(&mut self) -> Result<()> {
        info!(
            "Starting device state monitor ({} dispatch)",
            self.dispatch_mode()
        );
        self.configure_agent(false)?;

        if let Err(kind) = self.wifi.initialize() {
            // Degraded state is already published; keep running for audio
            warn!("WiFi monitor unavailable: {}", kind);
        }
        Ok(())
    }

    /// Applies a reloaded configuration to the running service.
    pub fn apply_config(&mut self, config: Config) -> Result<()> {
        config.validate().context("Reloaded configuration is invalid")?;

        for setting in restart_required(&self.config, &config) {
            warn!("Changing {} requires a restart, keeping the current value", setting);
        }

        match config.audio.monitor_mode() {
            MonitorMode::Poll(interval) => {
                self.audio
                    .start_polling(interval)
                    .map_err(|kind| anyhow::anyhow!("Failed to restart audio polling: {}", kind))?;
            }
            MonitorMode::Notify if self.audio.uses_notifications() => self.audio.stop_polling(),
            MonitorMode::Notify => {
                if self.config.audio.monitor_mode() != MonitorMode::Notify {
                    // Native listeners are only armed at construction
                    warn!("Switching audio.mode to notify requires a restart, polling continues");
                }
            }
        }

        self.config = config;
        self.configure_agent(true)?;
        if !self.wifi.is_armed() {
            if let Err(kind) = self.wifi.initialize() {
                warn!("WiFi monitor still unavailable: {}", kind);
            }
        }
        info!("Configuration applied");
        Ok(())
    }

    /// Replaces the agent according to `[agent]`. A re-armed agent evaluates
    /// the current network immediately when `evaluate_now` is set.
    fn configure_agent(&mut self, evaluate_now: bool) -> Result<()> {
        if let Some(previous) = self.agent.take() {
            previous.disable();
        }

        let agent_config = &self.config.agent;
        if agent_config.allowed_ssid.is_empty() {
            info!("No allow-listed network configured, policy agent inactive");
            return Ok(());
        }

        let agent = PolicyAgent::new(
            self.model.clone(),
            self.audio.clone(),
            agent_config.allowed_ssid.clone(),
        );
        if agent_config.enabled {
            agent.enable().context("Failed to enable policy agent")?;
            if evaluate_now {
                agent.apply(&self.model.network());
            }
        }
        self.agent = Some(agent);
        Ok(())
    }

    /// Stops the agent, releases every native subscription and drains the
    /// dispatch worker. Safe to call more than once.
    pub fn shutdown(&mut self) {
        info!("Shutting down device state monitor");
        if let Some(agent) = self.agent.take() {
            agent.disable();
        }
        self.model.unbind_all();
        self.wifi.dispose();
        self.audio.dispose();
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        info!("Service shutdown completed");
    }

    /// Blocks until every update queued so far has been delivered.
    pub fn flush(&self) {
        if let Some(worker) = &self.worker {
            worker.flush();
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &Arc<ObservableModel> {
        &self.model
    }

    pub fn wifi(&self) -> &WifiMonitor<W> {
        &self.wifi
    }

    pub fn audio(&self) -> &Arc<AudioMonitor<A>> {
        &self.audio
    }

    pub fn agent(&self) -> Option<&PolicyAgent> {
        self.agent.as_ref()
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.wifi.dispatch_mode()
    }

    /// Runs until SIGINT/SIGTERM. SIGHUP reloads the configuration through
    /// `loader` and re-arms the agent.
    pub async fn run<F: FileSystemInterface>(&mut self, loader: &ConfigLoader<F>) -> Result<()> {
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<SignalType>();
        let signal_handler = SignalHandler::with_sender(signal_tx);
        let shutdown_flag = signal_handler.shutdown_flag();

        let listener = signal_handler.clone();
        tokio::spawn(async move {
            if let Err(e) = listener.listen_for_signals().await {
                error!("Signal handler error: {}", e);
            }
        });

        info!("Service started successfully, entering main loop");

        loop {
            tokio::select! {
                signal = signal_rx.recv() => {
                    match signal {
                        Some(SignalType::Shutdown) => {
                            info!("Shutdown signal received, stopping service");
                            break;
                        }
                        Some(SignalType::Reload) => {
                            let reloaded = loader
                                .reload_config()
                                .and_then(|config| self.apply_config(config));
                            if let Err(e) = reloaded {
                                error!("Failed to reload configuration: {:#}", e);
                            }
                        }
                        None => {
                            warn!("Signal channel closed");
                            break;
                        }
                    }
                }
                _ = sleep(Duration::from_millis(250)) => {
                    if shutdown_flag.load(Ordering::Relaxed) {
                        info!("Shutdown flag set, stopping service");
                        break;
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }
}

impl<W: WifiSystemInterface, A: AudioSystemInterface> Drop for MonitorService<W, A> {
    fn drop(&mut self) {
        if let Some(agent) = self.agent.take() {
            agent.disable();
        }
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

/// Settings that are read once at startup and cannot change on reload.
fn restart_required(current: &Config, next: &Config) -> Vec<&'static str> {
    let mut settings = Vec::new();
    if next.general.dispatch != current.general.dispatch {
        settings.push("general.dispatch");
    }
    if next.wifi.poll_interval_ms != current.wifi.poll_interval_ms {
        settings.push("wifi.poll_interval_ms");
    }
    settings
}

// Convenience constructor for production use with the platform adapters
impl MonitorService<PlatformWifiSystem, PlatformAudioSystem> {
    pub fn new_production(config: Config) -> Result<Self> {
        let wifi_system = PlatformWifiSystem::new(config.wifi.poll_interval());
        debug!("WiFi backend: {}", wifi_system.backend_name());
        let audio_system = PlatformAudioSystem::new();
        Self::new(wifi_system, audio_system, config)
    }
}
