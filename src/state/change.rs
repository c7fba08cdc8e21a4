//! Semantic comparison of state snapshots.
//!
//! Both monitors run every fresh read through [`has_changed`] before
//! publishing, so re-announcements of an identical state never reach
//! subscribers.

/// Field-wise semantic equality between two snapshots.
///
/// Unlike `PartialEq`, implementations ignore bookkeeping fields such as
/// timestamps or attached error details.
pub trait ChangeDetector {
    fn differs_from(&self, previous: &Self) -> bool;
}

/// Returns true when `current` must be published given the last published
/// snapshot. Nothing published yet always counts as a change.
pub fn has_changed<T: ChangeDetector>(previous: Option<&T>, current: &T) -> bool {
    match previous {
        Some(previous) => current.differs_from(previous),
        None => true,
    }
}
