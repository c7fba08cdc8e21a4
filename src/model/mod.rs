pub mod observable;
pub mod subscribers;

pub use observable::{ObservableModel, StateChange};
pub use subscribers::{Subscribers, Subscription};
