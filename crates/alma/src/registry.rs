//! Named registry of tracked variables
//!
//! The registry lock only guards the name mapping. It is never held while a
//! variable's own lock is taken, so `snapshot` copies the mapping first and
//! reads each variable afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::AlmaConfig;
use crate::error::{AlmaError, Result};
use crate::listener::{ChangeListener, TracingListener};
use crate::record::ChangeRecord;
use crate::snapshot::{Snapshot, SnapshotError};
use crate::validator::{ValidationError, Validator};
use crate::variable::{TrackedVariable, VariableOptions};

/// Options for [`VariableRegistry::watch`]
pub struct WatchOptions<T> {
    copy_on_store: Option<bool>,
    snapshot: Option<Arc<dyn Snapshot<T>>>,
    validators: Vec<Arc<dyn Validator<T>>>,
    listeners: Vec<Arc<dyn ChangeListener<T>>>,
    overwrite: bool,
}

impl<T> WatchOptions<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Options with registry defaults
    pub fn new() -> Self {
        WatchOptions {
            copy_on_store: None,
            snapshot: None,
            validators: Vec::new(),
            listeners: Vec::new(),
            overwrite: false,
        }
    }

    /// Override the registry's default copy-on-store policy
    ///
    /// See [`VariableOptions::copy_on_store`] for how this interacts with
    /// shared-handle types.
    pub fn copy_on_store(mut self, enabled: bool) -> Self {
        self.copy_on_store = Some(enabled);
        self
    }

    /// Snapshot strategy for stored values
    pub fn snapshot(mut self, snapshot: impl Snapshot<T> + 'static) -> Self {
        self.snapshot = Some(Arc::new(snapshot));
        self
    }

    /// Snapshot strategy from a closure
    pub fn snapshot_with<F>(self, f: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<T, SnapshotError> + Send + Sync + 'static,
    {
        self.snapshot(f)
    }

    /// Add an initial validator
    pub fn validator(mut self, validator: impl Validator<T> + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Add an initial validator from a closure
    pub fn validate_with<F>(self, f: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator(f)
    }

    /// Add an initial listener
    pub fn listener(mut self, listener: impl ChangeListener<T> + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Add an initial listener from a closure
    pub fn on_change<F>(self, f: F) -> Self
    where
        F: Fn(&TrackedVariable<T>, &ChangeRecord<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listener(f)
    }

    /// Replace an existing registration instead of failing
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub(crate) fn into_variable_options(self, config: &AlmaConfig) -> (VariableOptions<T>, bool) {
        let mut options = VariableOptions::new()
            .copy_on_store(self.copy_on_store.unwrap_or(config.default_copy_on_store));
        if let Some(snapshot) = self.snapshot {
            options.snapshot = snapshot;
        }
        options.validators = self.validators;
        options.listeners = self.listeners;
        if config.trace_changes {
            options.listeners.push(Arc::new(TracingListener));
        }
        (options, self.overwrite)
    }
}

impl<T> Default for WatchOptions<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe mapping from names to tracked variables
pub struct VariableRegistry<T> {
    vars: RwLock<HashMap<String, Arc<TrackedVariable<T>>>>,
    config: AlmaConfig,
}

impl<T> VariableRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty registry with default configuration
    pub fn new() -> Self {
        Self::with_config(AlmaConfig::default())
    }

    /// Create an empty registry
    pub fn with_config(config: AlmaConfig) -> Self {
        Self {
            vars: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Configuration applied to new variables
    pub fn config(&self) -> &AlmaConfig {
        &self.config
    }

    /// Create and register a variable
    ///
    /// # Errors
    ///
    /// [`AlmaError::DuplicateName`] if `name` is taken and overwrite was not
    /// requested. A replaced variable keeps working for callers that still
    /// hold it, but is no longer reachable through the registry.
    pub fn watch(
        &self,
        name: impl Into<String>,
        initial: T,
        options: WatchOptions<T>,
    ) -> Result<Arc<TrackedVariable<T>>> {
        let name = name.into();
        let (options, overwrite) = options.into_variable_options(&self.config);

        if !overwrite && self.contains(&name) {
            return Err(AlmaError::duplicate_name(name));
        }
        let var = Arc::new(TrackedVariable::with_options(name.clone(), initial, options));

        let mut vars = self.vars.write();
        if !overwrite && vars.contains_key(&name) {
            return Err(AlmaError::duplicate_name(name));
        }
        if vars.insert(name.clone(), Arc::clone(&var)).is_some() {
            debug!(variable = %name, "Replaced registered variable");
        } else {
            debug!(variable = %name, "Registered variable");
        }
        Ok(var)
    }

    /// Look up a registered variable
    pub fn get_var(&self, name: &str) -> Result<Arc<TrackedVariable<T>>> {
        self.vars
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AlmaError::not_found(name))
    }

    /// Copy of the current name mapping; the variables themselves are shared
    pub fn all_vars(&self) -> HashMap<String, Arc<TrackedVariable<T>>> {
        self.vars.read().clone()
    }

    /// Remove a registration
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.vars
            .write()
            .remove(name)
            .ok_or_else(|| AlmaError::not_found(name))?;
        debug!(variable = %name, "Unregistered variable");
        Ok(())
    }

    /// Current value of every registered variable
    ///
    /// Each value is read atomically on its own; the map as a whole is not a
    /// transaction across variables.
    pub fn snapshot(&self) -> HashMap<String, T> {
        self.all_vars()
            .into_iter()
            .map(|(name, var)| (name, var.get()))
            .collect()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.vars.read().contains_key(name)
    }

    /// Number of registered variables
    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl<T> Default for VariableRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for VariableRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.vars.read().keys().cloned().collect();
        names.sort();
        write!(f, "VariableRegistry({:?})", names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::RangeValidator;
    use std::sync::Mutex;

    #[test]
    fn test_watch_returns_registered_variable() {
        let registry = VariableRegistry::new();
        let var = registry.watch("temp", 0, WatchOptions::new()).unwrap();
        assert_eq!(var.name(), "temp");
        assert!(Arc::ptr_eq(&var, &registry.get_var("temp").unwrap()));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let registry = VariableRegistry::new();
        registry.watch("x", 0, WatchOptions::new()).unwrap();
        let err = registry.watch("x", 1, WatchOptions::new()).unwrap_err();
        assert!(matches!(err, AlmaError::DuplicateName(ref name) if name == "x"));
        assert_eq!(registry.get_var("x").unwrap().get(), 0);
    }

    #[test]
    fn test_overwrite_replaces_variable() {
        let registry = VariableRegistry::new();
        let old = registry.watch("x", 0, WatchOptions::new()).unwrap();
        old.set(5).unwrap();

        let new = registry
            .watch("x", 1, WatchOptions::new().overwrite(true))
            .unwrap();
        assert_eq!(registry.get_var("x").unwrap().get(), 1);
        assert_eq!(new.history_len(), 1);
        // the replaced instance is still usable by whoever holds it
        assert_eq!(old.get(), 5);
    }

    #[test]
    fn test_get_var_missing() {
        let registry = VariableRegistry::<i32>::new();
        assert!(matches!(
            registry.get_var("missing"),
            Err(AlmaError::NotFound(_))
        ));
    }

    #[test]
    fn test_unregister() {
        let registry = VariableRegistry::new();
        let held = registry.watch("tmp", 0, WatchOptions::new()).unwrap();
        registry.unregister("tmp").unwrap();
        assert!(registry.get_var("tmp").is_err());
        assert!(matches!(
            registry.unregister("tmp"),
            Err(AlmaError::NotFound(_))
        ));
        held.set(1).unwrap();
        assert_eq!(held.get(), 1);
    }

    #[test]
    fn test_snapshot_reads_current_values() {
        let registry = VariableRegistry::new();
        registry.watch("a", 1, WatchOptions::new()).unwrap();
        registry.watch("b", 2, WatchOptions::new()).unwrap().set(3).unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"], 1);
        assert_eq!(snapshot["b"], 3);
    }

    #[test]
    fn test_all_vars_is_independent_copy() {
        let registry = VariableRegistry::new();
        registry.watch("a", 1, WatchOptions::new()).unwrap();
        let mut all = registry.all_vars();
        all.clear();
        assert_eq!(registry.len(), 1);

        let all = registry.all_vars();
        all["a"].set(10).unwrap();
        assert_eq!(registry.get_var("a").unwrap().get(), 10);
    }

    #[test]
    fn test_names_sorted() {
        let registry = VariableRegistry::new();
        for name in ["c", "a", "b"] {
            registry.watch(name, 0, WatchOptions::new()).unwrap();
        }
        assert_eq!(registry.names(), vec!["a", "b", "c"]);
        assert_eq!(format!("{:?}", registry), "VariableRegistry([\"a\", \"b\", \"c\"])");
    }

    #[test]
    fn test_watch_options_are_applied() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let registry = VariableRegistry::new();
        let var = registry
            .watch(
                "age",
                0,
                WatchOptions::new()
                    .copy_on_store(false)
                    .validate_with(|v: &i32| {
                        if *v < 0 {
                            Err(ValidationError::new("negative"))
                        } else {
                            Ok(())
                        }
                    })
                    .on_change(move |_, record| {
                        sink.lock().unwrap().push(record.value);
                        Ok(())
                    }),
            )
            .unwrap();

        assert!(!var.copy_on_store());
        assert!(var.set(-1).is_err());
        var.set(4).unwrap();
        assert_eq!(*events.lock().unwrap(), vec![4]);
    }

    #[test]
    fn test_watch_does_not_validate_initial_value() {
        let registry = VariableRegistry::new();
        let var = registry
            .watch(
                "level",
                -1,
                WatchOptions::new().validator(RangeValidator::new(0, 10)),
            )
            .unwrap();
        assert_eq!(var.get(), -1);
        assert_eq!(registry.snapshot()["level"], -1);
        assert!(matches!(var.set(11), Err(AlmaError::Validation { .. })));
        assert_eq!(var.history_len(), 1);
    }

    #[test]
    fn test_config_default_copy_policy() {
        let registry = VariableRegistry::with_config(AlmaConfig {
            default_copy_on_store: false,
            trace_changes: true,
        });
        let var = registry.watch("x", 0, WatchOptions::new()).unwrap();
        assert!(!var.copy_on_store());
        let explicit = registry
            .watch("y", 0, WatchOptions::new().copy_on_store(true))
            .unwrap();
        assert!(explicit.copy_on_store());
        explicit.set(1).unwrap();
        assert_eq!(explicit.get(), 1);
    }
}
