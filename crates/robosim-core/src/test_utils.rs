//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::battery::Battery;
use crate::component::Component;
use crate::config::SimulationConfig;
use crate::error::ObserverError;
use crate::factory::Factory;
use crate::fixed::Fixed64;
use crate::geometry::{Circle, PositionedShape, Rectangle};
use crate::id::ComponentId;
use crate::notifier::{ModelChange, Observer};
use crate::path::PathStrategy;

// ===========================================================================
// Factories
// ===========================================================================

/// Config with a short tick so threaded tests finish quickly.
pub fn fast_config() -> SimulationConfig {
    SimulationConfig {
        tick_interval_ms: 2,
        ..SimulationConfig::default()
    }
}

/// An empty 200x200 floor with [`fast_config`].
pub fn open_floor() -> Factory {
    Factory::builder("Test Floor", 200, 200)
        .config(fast_config())
        .build()
        .expect("valid test factory")
}

// ===========================================================================
// Components
// ===========================================================================

pub fn add_machine(factory: &Factory, name: &str, rect: Rectangle) -> ComponentId {
    factory
        .add_component(Component::machine(name, rect).expect("valid machine"))
        .expect("machine added")
}

pub fn add_conveyor(factory: &Factory, name: &str, shape: impl Into<PositionedShape>) -> ComponentId {
    factory
        .add_component(Component::conveyor(name, shape).expect("valid conveyor"))
        .expect("conveyor added")
}

/// A radius-2 robot (4x4 footprint) with speed 5 and a full battery of 10.
pub fn add_robot(factory: &Factory, name: &str, x: i32, y: i32, strategy: PathStrategy) -> ComponentId {
    let robot = Component::robot(
        name,
        Circle::new(x, y, 2),
        Battery::new(Fixed64::from_num(10)),
        5,
        strategy,
    )
    .expect("valid robot");
    factory.add_component(robot).expect("robot added")
}

// ===========================================================================
// Observation
// ===========================================================================

/// Records every change it sees.
#[derive(Default)]
pub struct RecordingObserver {
    changes: Mutex<Vec<ModelChange>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn changes(&self) -> Vec<ModelChange> {
        self.changes.lock().expect("recorder poisoned").clone()
    }
}

impl Observer for RecordingObserver {
    fn model_changed(&self, change: &ModelChange) -> Result<(), ObserverError> {
        self.changes
            .lock()
            .expect("recorder poisoned")
            .push(change.clone());
        Ok(())
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
