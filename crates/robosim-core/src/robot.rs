//! Robot behavior: targeting, route following, blocking, deadlock escape.
//!
//! One [`RobotBehavior`] lives in each robot's execution context. Per step it
//!
//! 1. picks the next target round-robin once the current one is reached
//!    (or gone), asking the path finder for a fresh route;
//! 2. chooses a destination: the memorized one if a previous move was
//!    refused because another robot stood there, else the next waypoint;
//! 3. asks the factory to move there and reacts to the answer.
//!
//! A refused move with another robot in the way is memorized. If that robot
//! in turn waits for our cell, the two are deadlocked and this robot sidesteps
//! into the first free neighboring cell (up, right, down, left) before
//! planning again.

use std::sync::Arc;
use std::vec;

use tracing::{debug, trace};

use crate::behavior::{Behavior, StepContext, StepOutcome};
use crate::factory::Factory;
use crate::geometry::{Position, PositionedShape};
use crate::id::ComponentId;
use crate::motion::Motion;
use crate::path::PathFinder;

pub struct RobotBehavior {
    finder: Arc<dyn PathFinder>,
    /// Index of the next target to pick in the robot's target list.
    cursor: usize,
    route: vec::IntoIter<Position>,
    waypoint: Option<Position>,
    /// Set once the robot moves; an arrival only counts as a visit after travel.
    travelled: bool,
}

impl RobotBehavior {
    pub fn new(finder: Arc<dyn PathFinder>) -> Self {
        Self {
            finder,
            cursor: 0,
            route: Vec::new().into_iter(),
            waypoint: None,
            travelled: false,
        }
    }

    fn replan(&mut self, factory: &Factory, robot: ComponentId, target: ComponentId) {
        let route = self.finder.find_path(factory, robot, target);
        trace!(robot = ?robot, target = ?target, len = route.len(), "route planned");
        self.route = route.into_iter();
        self.waypoint = None;
    }

    /// Advance the round-robin cursor, skipping targets that no longer exist.
    fn next_target(&mut self, factory: &Factory, targets: &[ComponentId]) -> Option<ComponentId> {
        for _ in 0..targets.len() {
            let candidate = targets[self.cursor % targets.len()];
            self.cursor = (self.cursor + 1) % targets.len();
            if factory.component(candidate).is_some() {
                return Some(candidate);
            }
        }
        None
    }

    /// Held waypoint, or the next route position that differs from `here`.
    fn next_waypoint(&mut self, here: Position) -> Option<Position> {
        if let Some(w) = self.waypoint.filter(|&w| w != here) {
            return Some(w);
        }
        self.waypoint = self.route.by_ref().find(|&p| p != here);
        self.waypoint
    }
}

impl Behavior for RobotBehavior {
    fn step(&mut self, ctx: &StepContext<'_>) -> StepOutcome {
        let factory = ctx.factory();
        let robot = ctx.component();
        let step = factory.config().grid_step;
        let Some(me) = factory.component(robot) else {
            return StepOutcome::Idle;
        };
        let Some(state) = me.robot_state().cloned() else {
            return StepOutcome::Idle;
        };
        if state.targets.is_empty() {
            return StepOutcome::Idle;
        }

        // -- Targeting --
        let reached = state
            .current_target
            .and_then(|t| factory.has_reached(robot, t, step));
        if !matches!(reached, Some(false)) {
            let Some(target) = self.next_target(factory, &state.targets) else {
                return StepOutcome::Idle;
            };
            let arrived = reached == Some(true) && self.travelled;
            if arrived {
                self.travelled = false;
            }
            factory.update_robot(robot, |r| {
                r.current_target = Some(target);
                if arrived {
                    r.visits += 1;
                }
            });
            if arrived {
                debug!(robot = %me.name(), "target reached");
            }
            if factory.has_reached(robot, target, step) == Some(true) {
                return StepOutcome::Arrived;
            }
            self.replan(factory, robot, target);
        }
        let Some(target) = factory.component(robot).and_then(|c| c.robot_state()?.current_target)
        else {
            return StepOutcome::Idle;
        };

        // -- Destination --
        let here = me.position();
        let destination = match state.memorized {
            Some(m) => m,
            None => match self.next_waypoint(here) {
                Some(w) => w,
                None => {
                    factory.update_robot(robot, |r| r.blocked = true);
                    debug!(robot = %me.name(), "no route, blocked");
                    self.replan(factory, robot, target);
                    return StepOutcome::Blocked;
                }
            },
        };

        if ctx.is_cancelled() {
            return StepOutcome::Cancelled;
        }

        // -- Move --
        let displacement = ctx.try_move(&Motion::new(here, destination, state.speed));
        if displacement > 0 {
            self.travelled = true;
            factory.update_robot(robot, |r| {
                r.memorized = None;
                r.blocked = false;
            });
            return StepOutcome::Moved { displacement };
        }
        if ctx.is_cancelled() {
            return StepOutcome::Cancelled;
        }

        let wanted: PositionedShape = me.footprint_at(destination).into();
        if !factory.has_mobile_component_at(&wanted, Some(robot)) {
            // Something fixed is in the way now; the route is stale.
            factory.update_robot(robot, |r| r.memorized = None);
            self.replan(factory, robot, target);
            return StepOutcome::Waiting;
        }

        factory.update_robot(robot, |r| r.memorized = Some(destination));
        if !factory.is_deadlocked(robot) {
            return StepOutcome::Waiting;
        }

        debug!(robot = %me.name(), "deadlock detected");
        if let Some(cell) = factory.free_neighbouring_position(robot) {
            factory.update_robot(robot, |r| r.memorized = Some(cell));
            if ctx.try_move(&Motion::new(here, cell, state.speed)) > 0 {
                self.travelled = true;
                factory.update_robot(robot, |r| {
                    r.memorized = None;
                    r.blocked = false;
                });
            }
        }
        self.replan(factory, robot, target);
        StepOutcome::Escaped
    }
}
