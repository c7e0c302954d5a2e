use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a component (room, machine, robot, ...) on the factory floor.
    pub struct ComponentId;
}

/// Identifies an observer registered with a notifier. Returned by
/// `add_observer` and used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObserverId(pub u64);
