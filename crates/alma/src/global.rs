//! Process-wide default registry
//!
//! [`DefaultRegistry`] is one namespace shared by variables of any value type.
//! A name is unique across the whole namespace: watching `"port"` as a `u16`
//! and then as a `String` fails unless overwrite is requested. Typed lookups
//! report [`AlmaError::TypeMismatch`] when the stored variable holds another
//! type.
//!
//! The instance behind [`default_registry`] is created on first use and lives
//! until the process exits. Tests and embedders that need isolation should
//! construct their own registry instead.

use std::any::{self, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::AlmaConfig;
use crate::error::{AlmaError, Result};
use crate::registry::WatchOptions;
use crate::variable::TrackedVariable;

static DEFAULT_CONFIG: OnceLock<AlmaConfig> = OnceLock::new();
static DEFAULT_REGISTRY: OnceLock<DefaultRegistry> = OnceLock::new();

struct Entry {
    type_name: &'static str,
    var: Arc<dyn Any + Send + Sync>,
}

impl Entry {
    fn new<T>(var: Arc<TrackedVariable<T>>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            type_name: any::type_name::<T>(),
            var,
        }
    }

    fn downcast<T>(&self, name: &str) -> Result<Arc<TrackedVariable<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        Arc::clone(&self.var)
            .downcast::<TrackedVariable<T>>()
            .map_err(|_| AlmaError::type_mismatch(name, any::type_name::<T>(), self.type_name))
    }
}

/// Single namespace of tracked variables with mixed value types
pub struct DefaultRegistry {
    vars: RwLock<HashMap<String, Entry>>,
    config: AlmaConfig,
}

impl DefaultRegistry {
    /// Create an empty namespace with default configuration
    pub fn new() -> Self {
        Self::with_config(AlmaConfig::default())
    }

    /// Create an empty namespace
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
    /// [`AlmaError::DuplicateName`] if `name` is taken by a variable of any
    /// type and overwrite was not requested.
    pub fn watch<T>(
        &self,
        name: impl Into<String>,
        initial: T,
        options: WatchOptions<T>,
    ) -> Result<Arc<TrackedVariable<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
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
        match vars.insert(name.clone(), Entry::new(Arc::clone(&var))) {
            Some(previous) => debug!(
                variable = %name,
                previous_type = previous.type_name,
                "Replaced registered variable"
            ),
            None => debug!(
                variable = %name,
                value_type = any::type_name::<T>(),
                "Registered variable"
            ),
        }
        Ok(var)
    }

    /// Look up a registered variable holding `T`
    ///
    /// # Errors
    ///
    /// [`AlmaError::NotFound`] if nothing is registered under `name`, and
    /// [`AlmaError::TypeMismatch`] if the variable holds another type.
    pub fn get_var<T>(&self, name: &str) -> Result<Arc<TrackedVariable<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.vars
            .read()
            .get(name)
            .ok_or_else(|| AlmaError::not_found(name))?
            .downcast(name)
    }

    /// Every registered variable holding `T`
    pub fn all_vars<T>(&self) -> HashMap<String, Arc<TrackedVariable<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.vars
            .read()
            .iter()
            .filter_map(|(name, entry)| Some((name.clone(), entry.downcast::<T>(name).ok()?)))
            .collect()
    }

    /// Current value of every registered variable holding `T`
    pub fn snapshot<T>(&self) -> HashMap<String, T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.all_vars::<T>()
            .into_iter()
            .map(|(name, var)| (name, var.get()))
            .collect()
    }

    /// Remove a registration regardless of its type
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.vars
            .write()
            .remove(name)
            .ok_or_else(|| AlmaError::not_found(name))?;
        debug!(variable = %name, "Unregistered variable");
        Ok(())
    }

    /// Whether `name` is registered under any type
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

impl Default for DefaultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefaultRegistry({:?})", self.names())
    }
}

/// Configuration used by the default registry, read from the environment once
pub fn default_config() -> &'static AlmaConfig {
    DEFAULT_CONFIG.get_or_init(|| {
        AlmaConfig::load().unwrap_or_else(|err| {
            warn!("Falling back to default alma configuration: {}", err);
            AlmaConfig::default()
        })
    })
}

/// The process-wide registry behind [`watch`]
pub fn default_registry() -> &'static DefaultRegistry {
    DEFAULT_REGISTRY.get_or_init(|| {
        debug!("Creating default registry");
        DefaultRegistry::with_config(default_config().clone())
    })
}

/// Create a variable in the default registry
///
/// # Errors
///
/// [`AlmaError::DuplicateName`] if `name` is already registered.
pub fn watch<T>(name: impl Into<String>, initial: T) -> Result<Arc<TrackedVariable<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    default_registry().watch(name, initial, WatchOptions::new())
}

/// [`watch`] with explicit options
pub fn watch_with<T>(
    name: impl Into<String>,
    initial: T,
    options: WatchOptions<T>,
) -> Result<Arc<TrackedVariable<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    default_registry().watch(name, initial, options)
}
