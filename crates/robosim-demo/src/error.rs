use std::path::PathBuf;

use robosim_core::error::{PersistenceError, SimulationError};

/// Errors that can occur in the headless runner.
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    /// Failed to load the layout or config file.
    #[error("could not load {file}: {source}")]
    DataLoad {
        file: PathBuf,
        source: robosim_data::DataLoadError,
    },

    /// Starting or stopping the simulation failed.
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// The snapshot store could not be opened.
    #[error("snapshot store error: {0}")]
    Persistence(#[from] PersistenceError),
}
