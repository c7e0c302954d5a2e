//! Serde structs for factory layout files.
//!
//! A layout lists the fixed furniture of a floor by kind, then the robots.
//! Cross-references (robot targets) are by component name and are resolved
//! when the factory is built.

use robosim_core::component::WallSide;
use robosim_core::error::ConfigurationError;
use robosim_core::geometry::{Circle, Polygon, Position, PositionedShape, Rectangle};
use robosim_core::path::PathStrategy;
use serde::{Deserialize, Serialize};

// ===========================================================================
// Shapes
// ===========================================================================

/// An axis-aligned rectangle: `{ x, y, width, height }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectData {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl From<RectData> for Rectangle {
    fn from(r: RectData) -> Self {
        Rectangle::new(r.x, r.y, r.width, r.height)
    }
}

/// Any shape, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeData {
    Rectangle {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    Circle {
        x: i32,
        y: i32,
        radius: u32,
    },
    /// Outline vertices as `[x, y]` pairs.
    Polygon { vertices: Vec<(i32, i32)> },
}

impl ShapeData {
    pub fn to_shape(&self) -> Result<PositionedShape, ConfigurationError> {
        Ok(match self {
            ShapeData::Rectangle {
                x,
                y,
                width,
                height,
            } => Rectangle::new(*x, *y, *width, *height).into(),
            ShapeData::Circle { x, y, radius } => Circle::new(*x, *y, *radius).into(),
            ShapeData::Polygon { vertices } => {
                Polygon::new(vertices.iter().map(|&(x, y)| Position::new(x, y)).collect())?.into()
            }
        })
    }
}

// ===========================================================================
// Components
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorData {
    pub name: String,
    pub wall: WallSide,
    pub offset: u32,
    pub length: u32,
    #[serde(default = "default_true")]
    pub open: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomData {
    pub name: String,
    pub rect: RectData,
    #[serde(default)]
    pub doors: Vec<DoorData>,
}

/// A named rectangle: areas, machines, and charging stations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectComponentData {
    pub name: String,
    pub rect: RectData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConveyorData {
    pub name: String,
    pub shape: ShapeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotData {
    pub name: String,
    /// Top-left corner of the robot's bounding square.
    pub x: i32,
    pub y: i32,
    pub radius: u32,
    pub battery: f64,
    /// Falls back to the simulation config's `robot_speed`.
    #[serde(default)]
    pub speed: Option<u32>,
    #[serde(default)]
    pub strategy: PathStrategy,
    /// Component names, visited round-robin.
    #[serde(default)]
    pub targets: Vec<String>,
}

// ===========================================================================
// Layout
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub rooms: Vec<RoomData>,
    #[serde(default)]
    pub areas: Vec<RectComponentData>,
    #[serde(default)]
    pub machines: Vec<RectComponentData>,
    #[serde(default)]
    pub conveyors: Vec<ConveyorData>,
    #[serde(default)]
    pub charging_stations: Vec<RectComponentData>,
    #[serde(default)]
    pub robots: Vec<RobotData>,
}
