//! Error types shared across the engine.
//!
//! Move rejections and unreachable targets are not errors: the arbiter
//! reports a zero displacement and the path finder an empty route. Only
//! construction-time problems and collaborator failures surface here.

use crate::id::ComponentId;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Invalid shapes, names, or factory setup, reported at construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("component name must not be empty")]
    EmptyName,
    #[error("a component named {0:?} already exists")]
    DuplicateName(String),
    #[error("factory dimensions must be non-zero, got {width}x{height}")]
    ZeroSizedFactory { width: u32, height: u32 },
    #[error("{field} must be non-zero")]
    ZeroSetting { field: &'static str },
    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("polygon outline intersects itself")]
    SelfIntersectingPolygon,
    #[error("door of length {length} at offset {offset} does not fit a wall of length {wall}")]
    DoorOutsideWall { offset: u32, length: u32, wall: u32 },
    #[error("unknown component {0:?}")]
    UnknownComponent(ComponentId),
    #[error("component {0:?} is not a robot")]
    NotARobot(ComponentId),
    #[error("component {0:?} is not a room")]
    NotARoom(ComponentId),
    #[error("component {0:?} is not a door")]
    NotADoor(ComponentId),
    #[error("component {0:?} is missing from or repeated in the component order")]
    OrderMismatch(ComponentId),
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Failures of the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("factory id must not be empty")]
    MissingId,
    #[error("no stored factory with id {0:?}")]
    NotFound(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Failure reported by an observer. Logged by the notifier, never propagated
/// to the mutation that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserverError {
    #[error("observer disconnected")]
    Disconnected,
    #[error("observer failed: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// Simulation lifecycle
// ---------------------------------------------------------------------------

/// Errors returned by `start_simulation` / `stop_simulation`.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("failed to spawn execution context for {name:?}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
}
