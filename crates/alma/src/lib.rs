#![warn(missing_docs)]

//! Time-travel variables for alma
//!
//! A [`TrackedVariable`] wraps a value and records every change as an
//! immutable, timestamped [`ChangeRecord`]. Rollback appends a new record
//! instead of rewriting history. Validators can veto changes and listeners
//! are told about the ones that land. A [`VariableRegistry`] manages many
//! named variables of one type, and [`watch`] goes through the process-wide
//! [`DefaultRegistry`], whose single namespace accepts any value type.
//!
//! ```
//! let score = alma::watch("doc-score", 0).unwrap();
//! score.set(10).unwrap().set(20).unwrap().set(30).unwrap();
//! assert_eq!(score.get(), 30);
//! assert_eq!(score.history().len(), 4);
//!
//! score.rollback(1).unwrap();
//! assert_eq!(score.get(), 10);
//! assert_eq!(score.last_change().label(), Some("rollback to index 1"));
//! ```

pub mod config;
pub mod error;
pub mod global;
pub mod listener;
pub mod record;
pub mod registry;
pub mod snapshot;
pub mod validator;
pub mod variable;

// Re-export public API
pub use config::AlmaConfig;
pub use error::{AlmaError, Result};
pub use global::{default_config, default_registry, watch, watch_with, DefaultRegistry};
pub use listener::{ChangeListener, ChannelListener, TracingListener};
pub use record::{ChangeRecord, HistoryDiff, INITIAL_LABEL};
pub use registry::{VariableRegistry, WatchOptions};
pub use snapshot::{CloneSnapshot, Snapshot, SnapshotError};
pub use validator::{
    NotEmptyValidator, PredicateValidator, RangeValidator, ValidationError, Validator,
};
pub use variable::{TrackedVariable, VariableOptions, RESET_LABEL};
