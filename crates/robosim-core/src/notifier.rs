//! Change notification.
//!
//! The factory reports every committed mutation as a [`ModelChange`] to an
//! injected [`FactoryNotifier`]. Notifications are delivered synchronously,
//! after the factory has released its floor lock, so observers may query the
//! factory freely.
//!
//! Observer failures never reach the mutation that caused them: the
//! [`LocalNotifier`] logs them and moves on. Slow sinks should hang off a
//! [`ChannelObserver`] instead of doing work on the agent's thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::error::ObserverError;
use crate::geometry::Position;
use crate::id::{ComponentId, ObserverId};

// ---------------------------------------------------------------------------
// Changes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelChange {
    ComponentAdded(ComponentId),
    ComponentRemoved(ComponentId),
    /// A component's state changed without moving (door toggled, targets
    /// edited).
    ComponentUpdated(ComponentId),
    ComponentMoved {
        id: ComponentId,
        from: Position,
        to: Position,
    },
    SimulationStarted,
    SimulationStopped,
}

/// Discriminant tag for changes, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    ComponentAdded,
    ComponentRemoved,
    ComponentUpdated,
    ComponentMoved,
    SimulationStarted,
    SimulationStopped,
}

impl ModelChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ModelChange::ComponentAdded(_) => ChangeKind::ComponentAdded,
            ModelChange::ComponentRemoved(_) => ChangeKind::ComponentRemoved,
            ModelChange::ComponentUpdated(_) => ChangeKind::ComponentUpdated,
            ModelChange::ComponentMoved { .. } => ChangeKind::ComponentMoved,
            ModelChange::SimulationStarted => ChangeKind::SimulationStarted,
            ModelChange::SimulationStopped => ChangeKind::SimulationStopped,
        }
    }

    /// The component the change is about, if any.
    pub fn component(&self) -> Option<ComponentId> {
        match self {
            ModelChange::ComponentAdded(id)
            | ModelChange::ComponentRemoved(id)
            | ModelChange::ComponentUpdated(id)
            | ModelChange::ComponentMoved { id, .. } => Some(*id),
            ModelChange::SimulationStarted | ModelChange::SimulationStopped => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Receives model changes.
pub trait Observer: Send + Sync {
    fn model_changed(&self, change: &ModelChange) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&ModelChange) + Send + Sync,
{
    fn model_changed(&self, change: &ModelChange) -> Result<(), ObserverError> {
        self(change);
        Ok(())
    }
}

/// The notification capability a factory is constructed with.
pub trait FactoryNotifier: Send + Sync {
    fn notify(&self, change: &ModelChange);
    fn add_observer(&self, observer: Arc<dyn Observer>) -> ObserverId;
    /// Returns `false` if no observer with that id was registered.
    fn remove_observer(&self, id: ObserverId) -> bool;
}

// ---------------------------------------------------------------------------
// LocalNotifier
// ---------------------------------------------------------------------------

/// In-process fan-out to registered observers, in registration order.
#[derive(Default)]
pub struct LocalNotifier {
    observers: Mutex<Vec<(ObserverId, Arc<dyn Observer>)>>,
    next_id: AtomicU64,
}

impl LocalNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl FactoryNotifier for LocalNotifier {
    fn notify(&self, change: &ModelChange) {
        // Snapshot the list so observers can (un)register while being called.
        let observers: Vec<_> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (id, observer) in observers {
            if let Err(err) = observer.model_changed(change) {
                warn!(observer = id.0, kind = ?change.kind(), %err, "observer failed");
            }
        }
    }

    fn add_observer(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }
}

// ---------------------------------------------------------------------------
// ChannelObserver
// ---------------------------------------------------------------------------

/// Forwards every change into an `mpsc` channel. Fails with
/// [`ObserverError::Disconnected`] once the receiver is dropped.
pub struct ChannelObserver {
    sender: Sender<ModelChange>,
}

impl ChannelObserver {
    pub fn new() -> (Self, Receiver<ModelChange>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl Observer for ChannelObserver {
    fn model_changed(&self, change: &ModelChange) -> Result<(), ObserverError> {
        self.sender
            .send(change.clone())
            .map_err(|_| ObserverError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    #[test]
    fn observers_receive_changes_in_order() {
        let notifier = LocalNotifier::new();
        let (observer, rx) = ChannelObserver::new();
        notifier.add_observer(Arc::new(observer));

        notifier.notify(&ModelChange::SimulationStarted);
        notifier.notify(&ModelChange::SimulationStopped);

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![ModelChange::SimulationStarted, ModelChange::SimulationStopped]
        );
    }

    #[test]
    fn removed_observer_stops_receiving() {
        let notifier = LocalNotifier::new();
        let (observer, rx) = ChannelObserver::new();
        let id = notifier.add_observer(Arc::new(observer));

        assert!(notifier.remove_observer(id));
        assert!(!notifier.remove_observer(id));
        notifier.notify(&ModelChange::SimulationStarted);
        assert!(rx.try_recv().is_err());
        assert_eq!(notifier.observer_count(), 0);
    }

    // -----------------------------------------------------------------------
    // Failure isolation
    // -----------------------------------------------------------------------

    #[test]
    fn failing_observer_does_not_block_others() {
        let notifier = LocalNotifier::new();
        let (dead, dead_rx) = ChannelObserver::new();
        drop(dead_rx);
        notifier.add_observer(Arc::new(dead));
        let (live, live_rx) = ChannelObserver::new();
        notifier.add_observer(Arc::new(live));

        notifier.notify(&ModelChange::SimulationStopped);
        assert_eq!(live_rx.try_recv(), Ok(ModelChange::SimulationStopped));
    }

    #[test]
    fn closures_are_observers() {
        let notifier = LocalNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        notifier.add_observer(Arc::new(move |change: &ModelChange| {
            sink.lock().unwrap().push(change.kind());
        }));
        notifier.notify(&ModelChange::SimulationStarted);
        assert_eq!(*seen.lock().unwrap(), vec![ChangeKind::SimulationStarted]);
    }

    #[test]
    fn change_exposes_component() {
        assert_eq!(ModelChange::SimulationStarted.component(), None);
    }
}
