//! Headless runner for robosim factories.
//!
//! The `robosim` binary wraps [`runner::run`]; the library half exists so the
//! same run can be driven from tests.

pub mod error;
pub mod runner;

pub use error::DemoError;
pub use runner::{PUCK_FACTORY_LAYOUT, RobotStatus, RunOptions, RunSummary, run};
