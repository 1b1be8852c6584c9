//! Change listeners
//!
//! Listeners are notified after every successful `set` (rollbacks included),
//! once the variable's lock has been released. A listener that returns an
//! error or panics is logged and skipped; the caller of `set` never sees it.

use anyhow::anyhow;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info;

use crate::record::ChangeRecord;
use crate::variable::TrackedVariable;

/// Observer of committed changes
pub trait ChangeListener<T>: Send + Sync {
    /// Called with the variable and the record that was just appended
    fn on_change(&self, variable: &TrackedVariable<T>, record: &ChangeRecord<T>)
        -> anyhow::Result<()>;
}

impl<T, F> ChangeListener<T> for F
where
    F: Fn(&TrackedVariable<T>, &ChangeRecord<T>) -> anyhow::Result<()> + Send + Sync,
{
    fn on_change(
        &self,
        variable: &TrackedVariable<T>,
        record: &ChangeRecord<T>,
    ) -> anyhow::Result<()> {
        self(variable, record)
    }
}

/// Logs every change at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl<T> ChangeListener<T> for TracingListener {
    fn on_change(
        &self,
        variable: &TrackedVariable<T>,
        record: &ChangeRecord<T>,
    ) -> anyhow::Result<()> {
        info!(
            variable = %variable.name(),
            index = record.index,
            label = record.label().unwrap_or(""),
            timestamp = %record.timestamp,
            "Variable changed"
        );
        Ok(())
    }
}

/// Forwards a copy of every record to an unbounded channel
///
/// Once the receiver is dropped each notification fails, which the variable
/// discards like any other listener failure.
pub struct ChannelListener<T> {
    sender: UnboundedSender<ChangeRecord<T>>,
}

impl<T> ChannelListener<T> {
    /// Wrap an existing sender
    pub fn new(sender: UnboundedSender<ChangeRecord<T>>) -> Self {
        Self { sender }
    }

    /// Create a listener together with the receiving end of its channel
    pub fn channel() -> (Self, UnboundedReceiver<ChangeRecord<T>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl<T> ChangeListener<T> for ChannelListener<T>
where
    T: Clone + Send + Sync,
{
    fn on_change(
        &self,
        variable: &TrackedVariable<T>,
        record: &ChangeRecord<T>,
    ) -> anyhow::Result<()> {
        self.sender
            .send(record.clone())
            .map_err(|_| anyhow!("change receiver for '{}' was dropped", variable.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_forwards_records() {
        let (listener, mut receiver) = ChannelListener::<i32>::channel();
        let var = TrackedVariable::new("x", 0);
        var.add_listener(listener);

        var.set(1).unwrap().set_with_label(2, "second").unwrap();

        let first = receiver.try_recv().unwrap();
        let second = receiver.try_recv().unwrap();
        assert_eq!((first.index, first.value), (1, 1));
        assert_eq!((second.index, second.value), (2, 2));
        assert_eq!(second.label(), Some("second"));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_channel_listener_reports_dropped_receiver() {
        let (listener, receiver) = ChannelListener::<i32>::channel();
        drop(receiver);
        let var = TrackedVariable::new("x", 0);
        let record = var.last_change();
        assert!(listener.on_change(&var, &record).is_err());
    }

    #[test]
    fn test_tracing_listener_never_fails() {
        let var = TrackedVariable::new("x", "a".to_string());
        var.add_listener(TracingListener);
        var.set("b".to_string()).unwrap();
        assert_eq!(var.get(), "b");
        assert!(TracingListener.on_change(&var, &var.last_change()).is_ok());
    }

    // generic listener code only needs the bounds of the trait itself
    fn forward<T, L: ChangeListener<T>>(
        listener: &L,
        variable: &TrackedVariable<T>,
        record: &ChangeRecord<T>,
    ) -> anyhow::Result<String> {
        listener.on_change(variable, record)?;
        Ok(format!("{}:{}", variable.name(), variable.copy_on_store()))
    }

    #[test]
    fn test_identity_accessors_in_generic_listener_code() {
        let (channel, mut receiver) = ChannelListener::<Vec<u8>>::channel();
        let var = TrackedVariable::new("bytes", vec![1u8]);
        let record = ChangeRecord::clone(&var.last_change());

        assert_eq!(forward(&TracingListener, &var, &record).unwrap(), "bytes:true");
        assert_eq!(forward(&channel, &var, &record).unwrap(), "bytes:true");
        assert_eq!(receiver.try_recv().unwrap().value, vec![1u8]);
    }
}
