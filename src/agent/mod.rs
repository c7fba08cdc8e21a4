pub mod policy;
pub mod policy_agent;

pub use policy::MutePolicy;
pub use policy_agent::{AgentError, MuteControl, PolicyAgent};
