//! Tracked variables with append-only history
//!
//! A [`TrackedVariable`] owns a current value plus every value it has ever
//! held. Each successful `set` or `rollback` appends exactly one
//! [`ChangeRecord`]; nothing is ever edited or removed.
//!
//! # Locking
//!
//! History and the frozen flag sit behind one re-entrant lock per variable.
//! Validation and the append happen under that lock; listeners run after it
//! is released, so a listener may read the variable freely. Another thread can
//! observe a new value before its listeners have fired.
//!
//! Validator and listener lists are copied at the start of each dispatch.
//! Registrations made while a `set` is in flight apply from the next `set`.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, warn};

use crate::error::{AlmaError, Result};
use crate::listener::ChangeListener;
use crate::record::{ChangeRecord, HistoryDiff, INITIAL_LABEL};
use crate::snapshot::{CloneSnapshot, Snapshot, SnapshotError};
use crate::validator::{ValidationError, Validator};

/// Label used by [`TrackedVariable::reset`]
pub const RESET_LABEL: &str = "reset to initial";

/// Construction options for a [`TrackedVariable`]
pub struct VariableOptions<T> {
    pub(crate) copy_on_store: bool,
    pub(crate) snapshot: Arc<dyn Snapshot<T>>,
    pub(crate) validators: Vec<Arc<dyn Validator<T>>>,
    pub(crate) listeners: Vec<Arc<dyn ChangeListener<T>>>,
}

impl<T> VariableOptions<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Defaults: copy-on-store through `Clone`, no validators, no listeners
    pub fn new() -> Self {
        VariableOptions {
            copy_on_store: true,
            snapshot: Arc::new(CloneSnapshot),
            validators: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Enable or disable copy-on-store
    ///
    /// With the default [`CloneSnapshot`] this only isolates owned data. Values
    /// backed by shared handles such as `Arc<Mutex<_>>` alias either way unless
    /// a custom [`snapshot`](Self::snapshot) is supplied.
    pub fn copy_on_store(mut self, enabled: bool) -> Self {
        self.copy_on_store = enabled;
        self
    }

    /// Replace the snapshot capability used when copy-on-store is enabled
    pub fn snapshot(mut self, snapshot: impl Snapshot<T> + 'static) -> Self {
        self.snapshot = Arc::new(snapshot);
        self
    }

    /// Closure form of [`VariableOptions::snapshot`]
    pub fn snapshot_with<F>(self, f: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<T, SnapshotError> + Send + Sync + 'static,
    {
        self.snapshot(f)
    }

    /// Append a validator
    pub fn validator(mut self, validator: impl Validator<T> + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Closure form of [`VariableOptions::validator`]
    pub fn validate_with<F>(self, f: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator(f)
    }

    /// Append a listener
    pub fn listener(mut self, listener: impl ChangeListener<T> + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Closure form of [`VariableOptions::listener`]
    pub fn on_change<F>(self, f: F) -> Self
    where
        F: Fn(&TrackedVariable<T>, &ChangeRecord<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listener(f)
    }
}

impl<T> Default for VariableOptions<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

struct VariableState<T> {
    history: Vec<Arc<ChangeRecord<T>>>,
    frozen: bool,
}

impl<T> VariableState<T> {
    fn latest(&self) -> &Arc<ChangeRecord<T>> {
        // history always holds the initial record
        &self.history[self.history.len() - 1]
    }
}

/// A value that records its full mutation history
pub struct TrackedVariable<T> {
    name: String,
    copy_on_store: bool,
    snapshot: Arc<dyn Snapshot<T>>,
    state: ReentrantMutex<RefCell<VariableState<T>>>,
    validators: RwLock<Vec<Arc<dyn Validator<T>>>>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener<T>>>>,
}

impl<T> TrackedVariable<T> {
    /// The name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether stored values are snapshotted
    pub fn copy_on_store(&self) -> bool {
        self.copy_on_store
    }
}

impl<T> TrackedVariable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a variable with default options
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        Self::with_options(name, initial, VariableOptions::new())
    }

    /// Create a variable holding a single `"initial"` record
    ///
    /// Validators and listeners are not invoked for the initial value.
    pub fn with_options(name: impl Into<String>, initial: T, options: VariableOptions<T>) -> Self {
        let variable = TrackedVariable {
            name: name.into(),
            copy_on_store: options.copy_on_store,
            snapshot: options.snapshot,
            state: ReentrantMutex::new(RefCell::new(VariableState {
                history: Vec::new(),
                frozen: false,
            })),
            validators: RwLock::new(options.validators),
            listeners: RwLock::new(options.listeners),
        };

        let stored = variable.store(initial);
        let record = ChangeRecord::new(0, stored, Utc::now(), Some(INITIAL_LABEL.to_string()));
        variable
            .state
            .lock()
            .borrow_mut()
            .history
            .push(Arc::new(record));
        variable
    }

    /// Current value
    pub fn get(&self) -> T {
        let current = self.last_change();
        self.hand_out(&current.value)
    }

    /// Update the current value
    ///
    /// # Errors
    ///
    /// [`AlmaError::Frozen`] if the variable is frozen, [`AlmaError::Validation`]
    /// if a validator rejects `value`. Nothing is recorded on failure.
    pub fn set(&self, value: T) -> Result<&Self> {
        self.set_inner(value, None)
    }

    /// Update the current value and annotate the new record
    pub fn set_with_label(&self, value: T, label: impl Into<String>) -> Result<&Self> {
        self.set_inner(value, Some(label.into()))
    }

    /// Copy of the full change history, oldest first
    pub fn history(&self) -> Vec<Arc<ChangeRecord<T>>> {
        self.state.lock().borrow().history.clone()
    }

    /// Number of records in the history (never zero)
    pub fn history_len(&self) -> usize {
        self.state.lock().borrow().history.len()
    }

    /// Most recent record; the initial record if nothing was set
    pub fn last_change(&self) -> Arc<ChangeRecord<T>> {
        Arc::clone(self.state.lock().borrow().latest())
    }

    /// Restore the value recorded at `index` by appending a new record
    ///
    /// The restored value goes through validators and listeners exactly like
    /// a regular `set`.
    ///
    /// # Errors
    ///
    /// [`AlmaError::Frozen`] if frozen, [`AlmaError::Rollback`] if `index` is
    /// negative or not below the current history length.
    pub fn rollback(&self, index: isize) -> Result<&Self> {
        self.rollback_inner(index, None)
    }

    /// Rollback with an explicit label for the new record
    pub fn rollback_with_label(&self, index: isize, label: impl Into<String>) -> Result<&Self> {
        self.rollback_inner(index, Some(label.into()))
    }

    /// Restore the initial value
    pub fn reset(&self) -> Result<&Self> {
        self.rollback_with_label(0, RESET_LABEL)
    }

    /// Reject all further mutations
    pub fn freeze(&self) -> &Self {
        self.state.lock().borrow_mut().frozen = true;
        self
    }

    /// Allow mutations again
    pub fn thaw(&self) -> &Self {
        self.state.lock().borrow_mut().frozen = false;
        self
    }

    /// Whether changes are currently rejected
    pub fn is_frozen(&self) -> bool {
        self.state.lock().borrow().frozen
    }

    /// Register a validator, run after all previously registered ones
    pub fn add_validator(&self, validator: impl Validator<T> + 'static) -> &Self {
        self.validators.write().push(Arc::new(validator));
        self
    }

    /// Closure form of [`TrackedVariable::add_validator`]
    pub fn validate_with<F>(&self, f: F) -> &Self
    where
        F: Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.add_validator(f)
    }

    /// Register a listener, notified after all previously registered ones
    pub fn add_listener(&self, listener: impl ChangeListener<T> + 'static) -> &Self {
        self.listeners.write().push(Arc::new(listener));
        self
    }

    /// Closure form of [`TrackedVariable::add_listener`]
    pub fn on_change<F>(&self, f: F) -> &Self
    where
        F: Fn(&TrackedVariable<T>, &ChangeRecord<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_listener(f)
    }

    /// One entry per pair of adjacent records
    pub fn diff(&self) -> Vec<HistoryDiff<T>> {
        self.history()
            .windows(2)
            .map(|pair| HistoryDiff::between(&pair[0], &pair[1]))
            .collect()
    }

    /// Compare the current value against a raw value
    pub fn value_eq(&self, other: &T) -> bool
    where
        T: PartialEq,
    {
        self.get() == *other
    }

    fn set_inner(&self, value: T, label: Option<String>) -> Result<&Self> {
        let record = {
            let guard = self.state.lock();
            self.commit(&guard, value, label)?
        };
        self.notify(&record);
        Ok(self)
    }

    fn rollback_inner(&self, index: isize, label: Option<String>) -> Result<&Self> {
        let record = {
            let guard = self.state.lock();
            let target = {
                let state = guard.borrow();
                if state.frozen {
                    return Err(AlmaError::frozen(&self.name));
                }
                let len = state.history.len();
                match usize::try_from(index) {
                    Ok(position) if position < len => Arc::clone(&state.history[position]),
                    _ => return Err(AlmaError::rollback(&self.name, index, len)),
                }
            };
            let label = label
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| format!("rollback to index {}", index));
            self.commit(&guard, target.value.clone(), Some(label))?
        };
        self.notify(&record);
        Ok(self)
    }

    /// Validate and append under the caller's lock acquisition
    fn commit(
        &self,
        state: &RefCell<VariableState<T>>,
        value: T,
        label: Option<String>,
    ) -> Result<Arc<ChangeRecord<T>>> {
        if state.borrow().frozen {
            return Err(AlmaError::frozen(&self.name));
        }

        let validators = self.validators.read().clone();
        for validator in &validators {
            validator
                .validate(&value)
                .map_err(|reason| AlmaError::validation(&self.name, reason))?;
        }

        let stored = self.store(value);
        let mut state = state.borrow_mut();
        let timestamp = next_timestamp(state.latest().timestamp);
        let record = Arc::new(ChangeRecord::new(
            state.history.len(),
            stored,
            timestamp,
            label,
        ));
        state.history.push(Arc::clone(&record));

        debug!(
            variable = %self.name,
            index = record.index,
            label = record.label().unwrap_or(""),
            "Recorded change"
        );
        Ok(record)
    }

    fn notify(&self, record: &ChangeRecord<T>) {
        let listeners = self.listeners.read().clone();
        for (position, listener) in listeners.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_change(self, record))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        variable = %self.name,
                        listener = position,
                        "Change listener failed, ignoring: {:#}",
                        err
                    );
                }
                Err(_) => {
                    warn!(
                        variable = %self.name,
                        listener = position,
                        "Change listener panicked, ignoring"
                    );
                }
            }
        }
    }

    fn store(&self, value: T) -> T {
        if !self.copy_on_store {
            return value;
        }
        match self.snapshot.snapshot(&value) {
            Ok(copy) => copy,
            Err(err) => {
                warn!(variable = %self.name, "Storing original value: {}", err);
                value
            }
        }
    }

    fn hand_out(&self, value: &T) -> T {
        if !self.copy_on_store {
            return value.clone();
        }
        self.snapshot
            .snapshot(value)
            .unwrap_or_else(|_| value.clone())
    }
}

fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

impl<T> PartialEq for TrackedVariable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for TrackedVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock();
        let state = guard.borrow();
        write!(
            f,
            "TrackedVariable(name={:?}, value={:?}, history_len={}{})",
            self.name,
            state.latest().value,
            state.history.len(),
            if state.frozen { " [frozen]" } else { "" }
        )
    }
}

impl<T: fmt::Debug> fmt::Display for TrackedVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
