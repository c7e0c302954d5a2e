//! Step-capped motion between two positions.

use serde::{Deserialize, Serialize};

use crate::geometry::Position;

/// An immutable request to move from `source` toward `target`, covering at
/// most `speed` units per axis in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Motion {
    source: Position,
    target: Position,
    speed: u32,
}

impl Motion {
    pub fn new(source: Position, target: Position, speed: u32) -> Self {
        Self {
            source,
            target,
            speed,
        }
    }

    pub fn source(&self) -> Position {
        self.source
    }

    pub fn target(&self) -> Position {
        self.target
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    /// The position actually reached after one step: each axis moves toward
    /// the target by at most `speed`.
    pub fn step_position(&self) -> Position {
        let cap = self.speed.min(i32::MAX as u32) as i32;
        let dx = (self.target.x - self.source.x).clamp(-cap, cap);
        let dy = (self.target.y - self.source.y).clamp(-cap, cap);
        self.source.offset(dx, dy)
    }

    /// Manhattan length of the step. Zero when source equals target or the
    /// speed is zero.
    pub fn displacement(&self) -> u32 {
        self.source.manhattan_distance(&self.step_position())
    }

    /// True if one step lands exactly on the target.
    pub fn reaches_target(&self) -> bool {
        self.step_position() == self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_motion_reaches_target() {
        let m = Motion::new(Position::new(5, 5), Position::new(10, 5), 5);
        assert_eq!(m.step_position(), Position::new(10, 5));
        assert_eq!(m.displacement(), 5);
        assert!(m.reaches_target());
    }

    #[test]
    fn long_motion_is_capped_per_axis() {
        let m = Motion::new(Position::new(0, 0), Position::new(20, -12), 5);
        assert_eq!(m.step_position(), Position::new(5, -5));
        assert_eq!(m.displacement(), 10);
        assert!(!m.reaches_target());
    }

    #[test]
    fn zero_length_and_zero_speed_have_no_displacement() {
        let p = Position::new(3, 3);
        assert_eq!(Motion::new(p, p, 5).displacement(), 0);
        assert_eq!(Motion::new(p, Position::new(9, 9), 0).displacement(), 0);
    }
}
