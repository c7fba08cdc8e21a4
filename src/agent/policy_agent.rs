use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::policy::MutePolicy;
use crate::audio::AudioMonitor;
use crate::error::ErrorKind;
use crate::model::{ObservableModel, Subscription};
use crate::state::NetworkState;
use crate::system::AudioSystemInterface;

/// Mute command surface the agent drives.
pub trait MuteControl: Send + Sync {
    /// Mute state of the last published snapshot, `None` when unknown.
    fn last_known_mute(&self) -> Option<bool>;

    fn set_mute(&self, muted: bool) -> Result<bool, ErrorKind>;
}

impl<A: AudioSystemInterface> MuteControl for AudioMonitor<A> {
    fn last_known_mute(&self) -> Option<bool> {
        self.current().muted()
    }

    fn set_mute(&self, muted: bool) -> Result<bool, ErrorKind> {
        AudioMonitor::set_mute(self, muted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("no allow-listed network configured")]
    NoAllowedNetwork,
}

/// Applies [`MutePolicy`] to every network transition published by the model.
///
/// Enabling subscribes to the model's network stream; disabling drops the
/// subscription and leaves the current mute state as it is. Nothing is
/// evaluated on enable itself; call [`apply`](Self::apply) to act on the
/// current snapshot.
pub struct PolicyAgent {
    model: Arc<ObservableModel>,
    audio: Arc<dyn MuteControl>,
    policy: MutePolicy,
    subscription: Mutex<Option<Subscription>>,
}

impl PolicyAgent {
    pub fn new(
        model: Arc<ObservableModel>,
        audio: Arc<dyn MuteControl>,
        allowed_ssid: impl Into<String>,
    ) -> Self {
        Self {
            model,
            audio,
            policy: MutePolicy::new(allowed_ssid),
            subscription: Mutex::new(None),
        }
    }

    pub fn allowed_ssid(&self) -> &str {
        self.policy.allowed_ssid()
    }

    pub fn is_enabled(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn enable(&self) -> Result<(), AgentError> {
        let mut subscription = self.subscription.lock().unwrap_or_else(|e| e.into_inner());
        if subscription.is_some() {
            return Ok(());
        }
        self.subscribe(&mut subscription)
    }

    pub fn disable(&self) {
        let mut subscription = self.subscription.lock().unwrap_or_else(|e| e.into_inner());
        Self::unsubscribe(&mut subscription);
    }

    /// Flips the enabled state and returns the new one. The check and the
    /// flip happen under one lock so concurrent toggles alternate.
    pub fn toggle(&self) -> Result<bool, AgentError> {
        let mut subscription = self.subscription.lock().unwrap_or_else(|e| e.into_inner());
        if subscription.is_some() {
            Self::unsubscribe(&mut subscription);
            Ok(false)
        } else {
            self.subscribe(&mut subscription)?;
            Ok(true)
        }
    }

    fn subscribe(&self, slot: &mut Option<Subscription>) -> Result<(), AgentError> {
        if self.policy.allowed_ssid().is_empty() {
            return Err(AgentError::NoAllowedNetwork);
        }

        let policy = self.policy.clone();
        let audio = self.audio.clone();
        *slot = Some(self.model.subscribe_network(move |network| {
            enforce(&policy, audio.as_ref(), network);
        }));
        info!(
            "Policy agent enabled, audio stays on only on '{}'",
            self.policy.allowed_ssid()
        );
        Ok(())
    }

    fn unsubscribe(slot: &mut Option<Subscription>) {
        if let Some(subscription) = slot.take() {
            subscription.cancel();
            info!("Policy agent disabled");
        }
    }

    /// Evaluates the rule against `network` right away. Returns the mute
    /// command issued, if any.
    pub fn apply(&self, network: &NetworkState) -> Option<bool> {
        enforce(&self.policy, self.audio.as_ref(), network)
    }
}

fn enforce(policy: &MutePolicy, audio: &dyn MuteControl, network: &NetworkState) -> Option<bool> {
    let mute = policy.should_mute(network);
    if audio.last_known_mute() == Some(mute) {
        debug!("Audio already {}, nothing to do", if mute { "muted" } else { "unmuted" });
        return None;
    }

    match audio.set_mute(mute) {
        Ok(confirmed) => info!("{} -> muted={}", network, confirmed),
        Err(e) => warn!("Policy agent could not set mute={} ({}): {}", mute, network, e),
    }
    Some(mute)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mute control that records commands and reflects them immediately.
    #[derive(Default)]
    struct RecordingMute {
        muted: Mutex<Option<bool>>,
        commands: Mutex<Vec<bool>>,
        fail: Mutex<Option<ErrorKind>>,
    }

    impl MuteControl for RecordingMute {
        fn last_known_mute(&self) -> Option<bool> {
            *self.muted.lock().unwrap()
        }

        fn set_mute(&self, muted: bool) -> Result<bool, ErrorKind> {
            self.commands.lock().unwrap().push(muted);
            if let Some(kind) = *self.fail.lock().unwrap() {
                return Err(kind);
            }
            *self.muted.lock().unwrap() = Some(muted);
            Ok(muted)
        }
    }

    fn agent_with(initial: Option<bool>) -> (PolicyAgent, Arc<ObservableModel>, Arc<RecordingMute>) {
        let model = ObservableModel::new();
        let audio = Arc::new(RecordingMute::default());
        *audio.muted.lock().unwrap() = initial;
        let agent = PolicyAgent::new(model.clone(), audio.clone(), "home-5g");
        (agent, model, audio)
    }

    #[test]
    fn test_allowed_network_unmutes_once() {
        let (agent, model, audio) = agent_with(Some(true));
        agent.enable().unwrap();

        model.publish_network(NetworkState::connected("home-5g"));
        model.publish_network(NetworkState::connected("home-5g"));

        assert_eq!(*audio.commands.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_other_network_mutes_once() {
        let (agent, model, audio) = agent_with(Some(false));
        agent.enable().unwrap();

        model.publish_network(NetworkState::connected("coffeeshop"));

        assert_eq!(*audio.commands.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_unknown_mute_state_still_issues_command() {
        let (agent, model, audio) = agent_with(None);
        agent.enable().unwrap();

        model.publish_network(NetworkState::degraded(ErrorKind::PermissionDenied));

        assert_eq!(*audio.commands.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_failed_command_is_absorbed() {
        let (agent, model, audio) = agent_with(None);
        *audio.fail.lock().unwrap() = Some(ErrorKind::DeviceUnavailable);
        agent.enable().unwrap();

        model.publish_network(NetworkState::connected("coffeeshop"));

        assert_eq!(*audio.commands.lock().unwrap(), vec![true]);
        assert!(agent.is_enabled());
    }

    #[test]
    fn test_disable_stops_reacting_and_keeps_mute() {
        let (agent, model, audio) = agent_with(Some(false));
        agent.enable().unwrap();
        model.publish_network(NetworkState::connected("coffeeshop"));

        agent.disable();
        model.publish_network(NetworkState::connected("home-5g"));

        assert_eq!(*audio.commands.lock().unwrap(), vec![true]);
        assert_eq!(audio.last_known_mute(), Some(true));
    }

    #[test]
    fn test_toggle_and_enable_idempotence() {
        let (agent, model, audio) = agent_with(Some(false));

        assert_eq!(agent.toggle(), Ok(true));
        agent.enable().unwrap();
        model.publish_network(NetworkState::connected("coffeeshop"));
        // A second enable must not double-subscribe
        assert_eq!(*audio.commands.lock().unwrap(), vec![true]);

        assert_eq!(agent.toggle(), Ok(false));
        assert!(!agent.is_enabled());
    }

    #[test]
    fn test_concurrent_toggles_alternate() {
        let (agent, model, audio) = agent_with(Some(false));
        let agent = Arc::new(agent);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let agent = agent.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| agent.toggle().unwrap())
                        .count()
                })
            })
            .collect();
        let enabled: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // 400 flips from disabled: half of them enabled, and it ends disabled
        assert_eq!(enabled, 200);
        assert!(!agent.is_enabled());
        model.publish_network(NetworkState::connected("coffeeshop"));
        assert!(audio.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_allow_list_cannot_enable() {
        let model = ObservableModel::new();
        let agent = PolicyAgent::new(model, Arc::new(RecordingMute::default()), "");

        assert_eq!(agent.enable(), Err(AgentError::NoAllowedNetwork));
        assert_eq!(agent.toggle(), Err(AgentError::NoAllowedNetwork));
        assert!(!agent.is_enabled());
    }

    #[test]
    fn test_apply_evaluates_current_snapshot() {
        let (agent, _model, audio) = agent_with(Some(false));

        assert_eq!(agent.apply(&NetworkState::disconnected()), Some(true));
        assert_eq!(agent.apply(&NetworkState::disconnected()), None);
        assert_eq!(*audio.commands.lock().unwrap(), vec![true]);
    }
}
