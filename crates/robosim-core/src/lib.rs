//! Robosim Core -- a concurrent factory-floor simulation engine.
//!
//! A [`factory::Factory`] holds fixed structures (rooms, doors, areas,
//! machines, conveyors, charging stations) and robots. Starting the
//! simulation gives every component its own execution context; robots use
//! theirs to walk a cyclic list of targets while the factory arbitrates
//! every move under a single lock.
//!
//! # Move Arbitration
//!
//! [`factory::Factory::move_component`] is the only way a position changes.
//! It checks the footprint at the target against obstacles and other mobile
//! components, then commits a step capped at the mover's speed, all inside
//! one critical section:
//!
//! ```rust,ignore
//! let motion = Motion::new(here, waypoint, speed);
//! let moved = factory.move_component(&motion, robot);
//! if moved == 0 {
//!     // rejected, nothing changed
//! }
//! ```
//!
//! # Key Types
//!
//! - [`factory::Factory`] -- Root container, collision arbiter, and
//!   start/stop of execution contexts.
//! - [`component::Component`] -- Named shape plus kind; decides mobility and
//!   overlay rules.
//! - [`geometry::PositionedShape`] -- Rectangle, circle, and polygon shapes
//!   with a symmetric `overlaps` predicate.
//! - [`path::PathFinder`] -- Route search over a free-space grid, with a
//!   hand-written and a library-backed Dijkstra strategy.
//! - [`robot::RobotBehavior`] -- Targeting, blocking, and deadlock escape.
//! - [`notifier::FactoryNotifier`] -- Change notification capability.
//! - [`persistence::FactoryPersistence`] -- Snapshot storage capability.

pub mod battery;
pub mod behavior;
pub mod component;
pub mod config;
pub mod error;
pub mod factory;
pub mod fixed;
pub mod geometry;
pub mod id;
pub mod motion;
pub mod notifier;
pub mod path;
pub mod persistence;
pub mod robot;
pub mod runtime;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
