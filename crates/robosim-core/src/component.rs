//! Components placed on the factory floor.
//!
//! A [`Component`] is a named shape plus a [`ComponentKind`]. The kind decides
//! mobility and whether other shapes may sit on top of it:
//!
//! | kind              | mobile | overlayable |
//! |-------------------|--------|-------------|
//! | room (walls)      | no     | no          |
//! | door              | no     | yes         |
//! | area              | no     | yes         |
//! | machine           | no     | yes         |
//! | conveyor          | no     | no          |
//! | charging station  | no     | yes         |
//! | robot             | yes    | yes         |
//!
//! Rooms only collide along their one-unit walls, minus any open doors.

use serde::{Deserialize, Serialize};

use crate::battery::Battery;
use crate::error::ConfigurationError;
use crate::geometry::{Circle, Position, PositionedShape, Rectangle};
use crate::id::ComponentId;
use crate::path::PathStrategy;

/// Thickness of room walls.
pub const WALL_THICKNESS: u32 = 1;

// ---------------------------------------------------------------------------
// Styles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// How a renderer should draw a component. Purely descriptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentStyle {
    pub fill: Option<Rgb>,
    pub stroke: Rgb,
    pub stroke_width: u32,
    pub dashed: bool,
}

impl ComponentStyle {
    pub const fn outline(stroke: Rgb) -> Self {
        Self {
            fill: None,
            stroke,
            stroke_width: 1,
            dashed: false,
        }
    }

    pub const fn filled(fill: Rgb, stroke: Rgb) -> Self {
        Self {
            fill: Some(fill),
            stroke,
            stroke_width: 1,
            dashed: false,
        }
    }

    /// Style a robot switches to while it is blocked.
    pub const fn robot_blocked() -> Self {
        Self {
            fill: Some(Rgb(255, 0, 0)),
            stroke: Rgb(255, 0, 0),
            stroke_width: 2,
            dashed: true,
        }
    }

    /// Default style for a kind of component.
    pub fn for_kind(kind: &ComponentKind) -> Self {
        match kind {
            ComponentKind::Room { .. } => Self {
                stroke_width: 2,
                ..Self::outline(Rgb(0, 0, 0))
            },
            ComponentKind::Door { .. } => Self::filled(Rgb(255, 255, 255), Rgb(128, 128, 128)),
            ComponentKind::Area => Self {
                dashed: true,
                ..Self::outline(Rgb(0, 0, 255))
            },
            ComponentKind::Machine => Self::filled(Rgb(0, 128, 0), Rgb(0, 0, 0)),
            ComponentKind::Conveyor => Self::filled(Rgb(128, 128, 128), Rgb(0, 0, 0)),
            ComponentKind::ChargingStation { .. } => {
                Self::filled(Rgb(255, 215, 0), Rgb(0, 0, 0))
            }
            ComponentKind::Robot(_) => Self::filled(Rgb(0, 0, 255), Rgb(0, 0, 0)),
        }
    }
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallSide {
    Top,
    Right,
    Bottom,
    Left,
}

/// A door cut into one of a room's walls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorOpening {
    pub door: ComponentId,
    pub wall: WallSide,
    /// Distance from the start of the wall (left or top end).
    pub offset: u32,
    pub length: u32,
    pub open: bool,
}

/// Mutable state of a robot. The behavior owned by the robot's execution
/// context writes to it through the factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotState {
    pub battery: Battery,
    pub speed: u32,
    pub strategy: PathStrategy,
    /// Visited round-robin.
    pub targets: Vec<ComponentId>,
    pub current_target: Option<ComponentId>,
    /// Destination of the last move rejected because another mobile
    /// component occupied it.
    pub memorized: Option<Position>,
    pub blocked: bool,
    /// Arrivals at a target after travelling to it. Ticks spent parked on
    /// a reached target do not count.
    pub visits: u64,
}

impl RobotState {
    pub fn new(battery: Battery, speed: u32, strategy: PathStrategy) -> Self {
        Self {
            battery,
            speed,
            strategy,
            targets: Vec::new(),
            current_target: None,
            memorized: None,
            blocked: false,
            visits: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentKind {
    Room { openings: Vec<DoorOpening> },
    Door {
        room: ComponentId,
        wall: WallSide,
        offset: u32,
        length: u32,
        open: bool,
    },
    Area,
    Machine,
    Conveyor,
    ChargingStation { charging: bool },
    Robot(RobotState),
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    name: String,
    shape: PositionedShape,
    kind: ComponentKind,
    style: ComponentStyle,
}

impl Component {
    /// Build a component with the default style of its kind.
    pub fn new(
        name: impl Into<String>,
        shape: impl Into<PositionedShape>,
        kind: ComponentKind,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        let style = ComponentStyle::for_kind(&kind);
        Ok(Self {
            name,
            shape: shape.into(),
            kind,
            style,
        })
    }

    pub fn room(name: impl Into<String>, rect: Rectangle) -> Result<Self, ConfigurationError> {
        Self::new(name, rect, ComponentKind::Room { openings: Vec::new() })
    }

    pub fn area(name: impl Into<String>, rect: Rectangle) -> Result<Self, ConfigurationError> {
        Self::new(name, rect, ComponentKind::Area)
    }

    pub fn machine(name: impl Into<String>, rect: Rectangle) -> Result<Self, ConfigurationError> {
        Self::new(name, rect, ComponentKind::Machine)
    }

    pub fn conveyor(
        name: impl Into<String>,
        shape: impl Into<PositionedShape>,
    ) -> Result<Self, ConfigurationError> {
        Self::new(name, shape, ComponentKind::Conveyor)
    }

    pub fn charging_station(
        name: impl Into<String>,
        rect: Rectangle,
    ) -> Result<Self, ConfigurationError> {
        Self::new(name, rect, ComponentKind::ChargingStation { charging: false })
    }

    pub fn robot(
        name: impl Into<String>,
        body: Circle,
        battery: Battery,
        speed: u32,
        strategy: PathStrategy,
    ) -> Result<Self, ConfigurationError> {
        if speed == 0 {
            return Err(ConfigurationError::ZeroSetting { field: "speed" });
        }
        Self::new(
            name,
            body,
            ComponentKind::Robot(RobotState::new(battery, speed, strategy)),
        )
    }

    pub fn with_style(mut self, style: ComponentStyle) -> Self {
        self.style = style;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &PositionedShape {
        &self.shape
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut ComponentKind {
        &mut self.kind
    }

    pub fn style(&self) -> ComponentStyle {
        self.style
    }

    /// The style to draw right now: blocked robots switch to
    /// [`ComponentStyle::robot_blocked`].
    pub fn effective_style(&self) -> ComponentStyle {
        match &self.kind {
            ComponentKind::Robot(state) if state.blocked => ComponentStyle::robot_blocked(),
            _ => self.style,
        }
    }

    pub fn position(&self) -> Position {
        self.shape.position()
    }

    pub fn bounding_box(&self) -> Rectangle {
        self.shape.bounding_box()
    }

    pub(crate) fn move_to(&mut self, to: Position) {
        self.shape = self.shape.translated_to(to);
    }

    /// The bounding rectangle this component would occupy at `at`.
    pub fn footprint_at(&self, at: Position) -> Rectangle {
        let bounds = self.bounding_box();
        Rectangle::at(at, bounds.width, bounds.height)
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self.kind, ComponentKind::Robot(_))
    }

    /// Whether `_other` may coexist on this component's footprint. Depends
    /// only on the kind today.
    pub fn can_be_overlaid(&self, _other: &PositionedShape) -> bool {
        !matches!(
            self.kind,
            ComponentKind::Room { .. } | ComponentKind::Conveyor
        )
    }

    pub fn robot_state(&self) -> Option<&RobotState> {
        match &self.kind {
            ComponentKind::Robot(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn robot_state_mut(&mut self) -> Option<&mut RobotState> {
        match &mut self.kind {
            ComponentKind::Robot(state) => Some(state),
            _ => None,
        }
    }

    /// Collision test. Rooms collide only with their wall segments.
    pub fn overlaps(&self, shape: &PositionedShape) -> bool {
        match &self.kind {
            ComponentKind::Room { openings } => {
                self.bounding_box().intersects(&shape.bounding_box())
                    && wall_segments(&self.bounding_box(), openings)
                        .iter()
                        .any(|wall| shape.overlaps_rect(wall))
            }
            _ => self.shape.overlaps(shape),
        }
    }

    /// True if this component overlaps `shape` and refuses to share space.
    pub fn obstructs(&self, shape: &PositionedShape) -> bool {
        self.overlaps(shape) && !self.can_be_overlaid(shape)
    }

    /// The zone a robot must touch to count as having reached this
    /// component. Solid components are approached from a one-step margin.
    pub fn reach_zone(&self, step: u32) -> PositionedShape {
        if self.can_be_overlaid(&self.shape) {
            self.shape.clone()
        } else {
            self.bounding_box().grown(step).into()
        }
    }
}

// ---------------------------------------------------------------------------
// Walls
// ---------------------------------------------------------------------------

/// Length of a room wall along its own axis.
pub fn wall_length(room: &Rectangle, wall: WallSide) -> u32 {
    match wall {
        WallSide::Top | WallSide::Bottom => room.width,
        WallSide::Left | WallSide::Right => room.height,
    }
}

/// The rectangle covered by `length` units of `wall`, starting `offset`
/// units from its left or top end.
pub fn wall_section(room: &Rectangle, wall: WallSide, offset: u32, length: u32) -> Rectangle {
    let t = WALL_THICKNESS;
    let off = offset as i32;
    match wall {
        WallSide::Top => Rectangle::new(room.left() + off, room.top(), length, t),
        WallSide::Bottom => Rectangle::new(room.left() + off, room.bottom() - t as i32, length, t),
        WallSide::Left => Rectangle::new(room.left(), room.top() + off, t, length),
        WallSide::Right => Rectangle::new(room.right() - t as i32, room.top() + off, t, length),
    }
}

/// Solid wall pieces of a room once open doors are carved out.
pub fn wall_segments(room: &Rectangle, openings: &[DoorOpening]) -> Vec<Rectangle> {
    let mut segments = Vec::new();
    for wall in [WallSide::Top, WallSide::Right, WallSide::Bottom, WallSide::Left] {
        let length = wall_length(room, wall);
        // Openings from unvalidated snapshots are clipped to the wall.
        let mut gaps: Vec<(u32, u32)> = openings
            .iter()
            .filter(|o| o.open && o.wall == wall)
            .map(|o| {
                let end = o.offset.saturating_add(o.length).min(length);
                (o.offset.min(length), end)
            })
            .collect();
        gaps.sort_unstable();
        let mut start = 0;
        for (gap_start, gap_end) in gaps {
            if gap_start > start {
                segments.push(wall_section(room, wall, start, gap_start - start));
            }
            start = start.max(gap_end);
        }
        if length > start {
            segments.push(wall_section(room, wall, start, length - start));
        }
    }
    segments
}
