//! Copy-on-store capability
//!
//! A variable with copy-on-store enabled passes every incoming value (and
//! every value handed out by `get`) through its [`Snapshot`] implementation.
//! `Clone` is the default, which is already a deep copy for owned data. Types
//! holding shared handles (`Arc<Mutex<_>>` and friends) need an explicit
//! implementation to be isolated from external mutation.
//!
//! When a snapshot fails the variable falls back to the original value, so a
//! failing snapshot silently aliases handle types.

use thiserror::Error;

/// Reason a snapshot could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("snapshot failed: {0}")]
pub struct SnapshotError(pub String);

impl SnapshotError {
    /// Create a snapshot error
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Produces an independent copy of a stored value
pub trait Snapshot<T>: Send + Sync {
    /// Copy `value` so later mutation of either side is not observable by the other
    fn snapshot(&self, value: &T) -> Result<T, SnapshotError>;
}

impl<T, F> Snapshot<T> for F
where
    F: Fn(&T) -> Result<T, SnapshotError> + Send + Sync,
{
    fn snapshot(&self, value: &T) -> Result<T, SnapshotError> {
        self(value)
    }
}

/// Snapshot through `Clone`
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneSnapshot;

impl<T: Clone> Snapshot<T> for CloneSnapshot {
    fn snapshot(&self, value: &T) -> Result<T, SnapshotError> {
        Ok(value.clone())
    }
}
