//! In-process observer registry backed by unbounded channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::core::{EventChannel, ObserverId, WorkerError};

/// Registry of connected observers.
///
/// Each observer owns the receiving half of an unbounded channel, so a send
/// never waits on a slow observer. An observer whose receiver is gone is
/// pruned the first time a send to it fails.
#[derive(Default)]
pub struct ObserverHub {
    next_id: AtomicU64,
    observers: RwLock<HashMap<ObserverId, UnboundedSender<String>>>,
}

impl ObserverHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer and return its id and message stream.
    pub fn register(&self) -> (ObserverId, UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = unbounded_channel();
        self.observers.write().insert(id, tx);
        tracing::debug!(observer = id, "observer registered");
        (id, rx)
    }

    /// Remove an observer; returns `true` if it was registered.
    pub fn unregister(&self, observer: ObserverId) -> bool {
        let removed = self.observers.write().remove(&observer).is_some();
        if removed {
            tracing::debug!(observer, "observer unregistered");
        }
        removed
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

impl EventChannel for ObserverHub {
    fn observers(&self) -> Vec<ObserverId> {
        self.observers.read().keys().copied().collect()
    }

    fn send(&self, observer: ObserverId, message: &str) -> Result<(), WorkerError> {
        let sent = {
            let observers = self.observers.read();
            let Some(tx) = observers.get(&observer) else {
                return Err(WorkerError::Channel(format!("observer {observer} is not registered")));
            };
            tx.send(message.to_owned()).is_ok()
        };
        if sent {
            Ok(())
        } else {
            self.unregister(observer);
            Err(WorkerError::Channel(format!("observer {observer} disconnected")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_send() {
        let hub = ObserverHub::new();
        let (id, mut rx) = hub.register();
        hub.send(id, "hello").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");
        assert_eq!(hub.observers(), vec![id]);
    }

    #[test]
    fn test_dead_observer_is_pruned() {
        let hub = ObserverHub::new();
        let (id, rx) = hub.register();
        drop(rx);
        assert!(hub.send(id, "x").is_err());
        assert!(hub.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let hub = ObserverHub::new();
        let (a, _ra) = hub.register();
        let (b, _rb) = hub.register();
        assert_ne!(a, b);
        assert!(hub.unregister(a));
        assert!(!hub.unregister(a));
        assert_eq!(hub.len(), 1);
    }
}
