//! Headless simulation runs.
//!
//! [`run`] loads a layout, starts every execution context, reports robot
//! status at a fixed interval, stops after the requested wall-clock time,
//! and returns a [`RunSummary`]. The summary's overlap count is the number of
//! mobile-component pairs overlapping in the final snapshot, which must be
//! zero.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use robosim_core::config::SimulationConfig;
use robosim_core::factory::Factory;
use robosim_core::geometry::Position;
use robosim_core::notifier::ModelChange;
use robosim_core::path::PathStrategy;
use robosim_core::persistence::{FactoryPersistence, FactorySnapshot};
use robosim_data::{JsonFileStore, load_config, load_factory};
use tracing::info;

use crate::error::DemoError;

/// The sample layout shipped with this crate.
pub const PUCK_FACTORY_LAYOUT: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/layouts/puck_factory.toml");

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub layout: PathBuf,
    /// Simulation config file; defaults apply when absent.
    pub config: Option<PathBuf>,
    pub duration: Duration,
    pub status_interval: Duration,
    /// Directory of a [`JsonFileStore`] that receives the final snapshot.
    pub store: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            layout: PathBuf::from(PUCK_FACTORY_LAYOUT),
            config: None,
            duration: Duration::from_secs(10),
            status_interval: Duration::from_secs(1),
            store: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RobotStatus {
    pub name: String,
    pub position: Position,
    pub strategy: PathStrategy,
    pub target: Option<String>,
    pub visits: u64,
    pub blocked: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub factory: String,
    pub elapsed: Duration,
    pub moves: u64,
    pub robots: Vec<RobotStatus>,
    pub overlaps: usize,
}

/// Robots of a snapshot, in insertion order.
pub fn robot_statuses(snapshot: &FactorySnapshot) -> Vec<RobotStatus> {
    snapshot
        .iter()
        .filter_map(|(_, c)| {
            let state = c.robot_state()?;
            let target = state
                .current_target
                .and_then(|t| snapshot.components.get(t))
                .map(|t| t.name().to_string());
            Some(RobotStatus {
                name: c.name().to_string(),
                position: c.position(),
                strategy: state.strategy,
                target,
                visits: state.visits,
                blocked: state.blocked,
            })
        })
        .collect()
}

/// Pairs of mobile components whose shapes overlap.
pub fn count_overlaps(snapshot: &FactorySnapshot) -> usize {
    let mobile: Vec<_> = snapshot.iter().filter(|(_, c)| c.is_mobile()).collect();
    let mut overlaps = 0;
    for (i, (_, a)) in mobile.iter().enumerate() {
        for (_, b) in &mobile[i + 1..] {
            if a.shape().overlaps(b.shape()) {
                overlaps += 1;
            }
        }
    }
    overlaps
}

/// Run a layout to completion, calling `on_status` every
/// `options.status_interval` with the time elapsed and the robots' status.
pub fn run(
    options: &RunOptions,
    mut on_status: impl FnMut(Duration, &[RobotStatus]),
) -> Result<RunSummary, DemoError> {
    let config = match &options.config {
        Some(path) => load_config(path).map_err(|source| DemoError::DataLoad {
            file: path.clone(),
            source,
        })?,
        None => SimulationConfig::default(),
    };
    let persistence = match &options.store {
        Some(dir) => Some(Arc::new(JsonFileStore::open(dir)?) as Arc<dyn FactoryPersistence>),
        None => None,
    };
    let factory = load_factory(&options.layout, config, persistence).map_err(|source| {
        DemoError::DataLoad {
            file: options.layout.clone(),
            source,
        }
    })?;

    let moves = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&moves);
    factory.add_observer(Arc::new(move |change: &ModelChange| {
        if matches!(change, ModelChange::ComponentMoved { .. }) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }));

    let started = Instant::now();
    factory.start_simulation()?;
    while started.elapsed() < options.duration {
        let remaining = options.duration.saturating_sub(started.elapsed());
        thread::sleep(options.status_interval.min(remaining));
        on_status(started.elapsed(), &robot_statuses(&factory.snapshot()));
    }
    factory.stop_simulation()?;

    Ok(summarize(&factory, started.elapsed(), moves.load(Ordering::Relaxed)))
}

fn summarize(factory: &Factory, elapsed: Duration, moves: u64) -> RunSummary {
    let snapshot = factory.snapshot();
    let summary = RunSummary {
        factory: factory.name().to_string(),
        elapsed,
        moves,
        robots: robot_statuses(&snapshot),
        overlaps: count_overlaps(&snapshot),
    };
    info!(
        factory = %summary.factory,
        moves = summary.moves,
        overlaps = summary.overlaps,
        "run finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use robosim_core::geometry::Rectangle;
    use robosim_core::test_utils::*;

    #[test]
    fn statuses_name_the_current_target() {
        let factory = open_floor();
        let machine = add_machine(&factory, "Machine", Rectangle::new(50, 50, 15, 15));
        let robot = add_robot(&factory, "Robot", 5, 5, PathStrategy::Library);
        factory.add_robot_target(robot, machine).unwrap();

        factory.start_simulation().unwrap();
        assert!(wait_until(Duration::from_secs(10), || {
            robot_statuses(&factory.snapshot())[0].target.is_some()
        }));
        factory.stop_simulation().unwrap();

        let statuses = robot_statuses(&factory.snapshot());
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "Robot");
        assert_eq!(statuses[0].strategy, PathStrategy::Library);
        assert_eq!(statuses[0].target.as_deref(), Some("Machine"));
    }

    #[test]
    fn overlapping_robots_are_counted() {
        let factory = open_floor();
        add_robot(&factory, "A", 10, 10, PathStrategy::Custom);
        add_robot(&factory, "B", 12, 10, PathStrategy::Custom);
        add_robot(&factory, "C", 100, 100, PathStrategy::Custom);
        assert_eq!(count_overlaps(&factory.snapshot()), 1);
    }
}
