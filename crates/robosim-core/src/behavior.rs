//! Recurring behavior units run by execution contexts.

use std::sync::Arc;

use crate::component::{Component, ComponentKind};
use crate::config::SimulationConfig;
use crate::factory::Factory;
use crate::id::ComponentId;
use crate::motion::Motion;
use crate::robot::RobotBehavior;
use crate::runtime::StopSignal;

/// What one behavior step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to do (fixed component, or robot without targets).
    Idle,
    Moved { displacement: u32 },
    /// The robot is on its current target.
    Arrived,
    /// Move rejected; the destination is memorized for the next cycle.
    Waiting,
    /// No route to the current target.
    Blocked,
    /// A deadlock was detected and an escape move attempted.
    Escaped,
    /// Cancellation was observed before committing.
    Cancelled,
}

/// One unit of recurring work. Invoked repeatedly by the component's
/// execution context until the simulation stops.
pub trait Behavior: Send {
    fn step(&mut self, ctx: &StepContext<'_>) -> StepOutcome;
}

/// Builds a fresh behavior each time the simulation starts.
pub type BehaviorFactory = Arc<dyn Fn(ComponentId) -> Box<dyn Behavior> + Send + Sync>;

/// Everything a step may touch: the factory, the component it drives, and
/// the cancellation signal of its context.
pub struct StepContext<'a> {
    factory: &'a Factory,
    component: ComponentId,
    signal: &'a StopSignal,
}

impl<'a> StepContext<'a> {
    pub fn new(factory: &'a Factory, component: ComponentId, signal: &'a StopSignal) -> Self {
        Self {
            factory,
            component,
            signal,
        }
    }

    pub fn factory(&self) -> &'a Factory {
        self.factory
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_stopped()
    }

    /// Ask the arbiter to move this context's component. The arbiter refuses
    /// once cancellation has been requested.
    pub fn try_move(&self, motion: &Motion) -> u32 {
        self.factory
            .arbitrate(motion, self.component, Some(self.signal))
    }
}

/// Behavior of fixed components.
#[derive(Debug, Default)]
pub struct Idle;

impl Behavior for Idle {
    fn step(&mut self, _ctx: &StepContext<'_>) -> StepOutcome {
        StepOutcome::Idle
    }
}

/// The behavior a component gets when no custom one is installed.
pub(crate) fn default_behavior(component: &Component, config: &SimulationConfig) -> Box<dyn Behavior> {
    match component.kind() {
        ComponentKind::Robot(state) => {
            Box::new(RobotBehavior::new(state.strategy.finder(config.grid_step)))
        }
        _ => Box::new(Idle),
    }
}
