//! Change records and history diffs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label attached to the first record of every variable
pub const INITIAL_LABEL: &str = "initial";

/// An immutable snapshot of a single value change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord<T> {
    /// Position in the history (0 = initial value)
    pub index: usize,
    /// Snapshot of the value at this point
    pub value: T,
    /// When the change was recorded
    pub timestamp: DateTime<Utc>,
    /// Optional human-readable annotation
    pub label: Option<String>,
}

impl<T> ChangeRecord<T> {
    pub(crate) fn new(
        index: usize,
        value: T,
        timestamp: DateTime<Utc>,
        label: Option<String>,
    ) -> Self {
        ChangeRecord {
            index,
            value,
            timestamp,
            label,
        }
    }

    /// Label of this record, if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl<T: fmt::Debug> fmt::Display for ChangeRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {:?} at {}",
            self.index,
            self.value,
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f")
        )?;
        if let Some(label) = &self.label {
            write!(f, " [{}]", label)?;
        }
        Ok(())
    }
}

/// Transition between two adjacent history records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDiff<T> {
    /// Index of the earlier record
    pub from_index: usize,
    /// Index of the later record
    pub to_index: usize,
    /// Value before the transition
    pub from_value: T,
    /// Value after the transition
    pub to_value: T,
    /// Milliseconds between the two records, rounded to 3 decimal places
    pub elapsed_ms: f64,
}

impl<T: Clone> HistoryDiff<T> {
    pub(crate) fn between(from: &ChangeRecord<T>, to: &ChangeRecord<T>) -> Self {
        HistoryDiff {
            from_index: from.index,
            to_index: to.index,
            from_value: from.value.clone(),
            to_value: to.value.clone(),
            elapsed_ms: elapsed_ms(from.timestamp, to.timestamp),
        }
    }
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    let ms = match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64,
    };
    (ms.max(0.0) * 1000.0).round() / 1000.0
}
