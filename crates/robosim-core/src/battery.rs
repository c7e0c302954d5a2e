//! Passive battery value carried by robots.
//!
//! Nothing in the engine drains or recharges it yet; `consume` and `charge`
//! are plain arithmetic on the level and neither clamps.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battery {
    capacity: Fixed64,
    level: Fixed64,
}

impl Battery {
    /// A fully charged battery.
    pub fn new(capacity: Fixed64) -> Self {
        Self {
            capacity,
            level: capacity,
        }
    }

    pub fn capacity(&self) -> Fixed64 {
        self.capacity
    }

    pub fn level(&self) -> Fixed64 {
        self.level
    }

    /// Subtract `energy` and return the new level. May go below zero.
    pub fn consume(&mut self, energy: Fixed64) -> Fixed64 {
        self.level -= energy;
        self.level
    }

    /// Add `energy` and return the new level. May exceed capacity.
    pub fn charge(&mut self, energy: Fixed64) -> Fixed64 {
        self.level += energy;
        self.level
    }
}
