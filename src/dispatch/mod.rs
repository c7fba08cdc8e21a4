pub mod bridge;
pub mod poller;
pub mod worker;

pub use bridge::{DispatchBridge, DispatchMode, Dispatcher, Job};
pub use poller::Poller;
pub use worker::WorkerDispatcher;
