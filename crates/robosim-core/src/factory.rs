//! The factory: root container and collision arbiter.
//!
//! All spatial state lives on one floor behind one mutex. Every query
//! and every move takes that lock exactly once, so a check followed by a
//! commit inside [`Factory::move_component`] can never interleave with
//! another agent's move. Notifications are sent after the lock is released.
//!
//! # Lock order
//!
//! `runtime` -> `behaviors` -> `floor`. The floor lock is never held while
//! acquiring another lock, and execution contexts only ever take the floor
//! lock.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use slotmap::SlotMap;
use tracing::{debug, error, info};

use crate::behavior::{BehaviorFactory, default_behavior};
use crate::component::{
    Component, ComponentKind, DoorOpening, RobotState, WallSide, wall_length, wall_section,
};
use crate::config::SimulationConfig;
use crate::error::{ConfigurationError, SimulationError};
use crate::geometry::{Position, PositionedShape, Rectangle};
use crate::id::{ComponentId, ObserverId};
use crate::motion::Motion;
use crate::notifier::{FactoryNotifier, LocalNotifier, ModelChange, Observer};
use crate::path::PathQuery;
use crate::persistence::{FactoryPersistence, FactorySnapshot};
use crate::runtime::{AgentHandle, Runtime, StopSignal, shutdown};

/// Escape probe order: up, right, down, left.
pub const ESCAPE_DIRECTIONS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

// ---------------------------------------------------------------------------
// Floor
// ---------------------------------------------------------------------------

/// Component storage. Only ever accessed under the factory's floor lock.
#[derive(Default)]
pub(crate) struct Floor {
    components: SlotMap<ComponentId, Component>,
    order: Vec<ComponentId>,
}

impl Floor {
    fn iter(&self) -> impl Iterator<Item = (ComponentId, &Component)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.components.get(id).map(|c| (id, c)))
    }

    fn obstacle_at(&self, shape: &PositionedShape, excluding: Option<ComponentId>) -> bool {
        self.iter()
            .any(|(id, c)| Some(id) != excluding && c.obstructs(shape))
    }

    fn mobile_at(&self, shape: &PositionedShape, excluding: Option<ComponentId>) -> Option<ComponentId> {
        self.iter()
            .find(|(id, c)| Some(*id) != excluding && c.is_mobile() && c.overlaps(shape))
            .map(|(id, _)| id)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.components.values().any(|c| c.name() == name)
    }

    /// Check a floor restored from a snapshot against the rules
    /// [`Factory::add_component`] enforces one component at a time.
    fn validate(&self) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::with_capacity(self.order.len());
        for &id in &self.order {
            if !self.components.contains_key(id) || !seen.insert(id) {
                return Err(ConfigurationError::OrderMismatch(id));
            }
        }
        if let Some(id) = self.components.keys().find(|id| !seen.contains(id)) {
            return Err(ConfigurationError::OrderMismatch(id));
        }

        let mut names = HashSet::with_capacity(self.order.len());
        for (id, component) in self.iter() {
            if !names.insert(component.name()) {
                return Err(ConfigurationError::DuplicateName(component.name().to_string()));
            }
            match component.kind() {
                ComponentKind::Door {
                    room,
                    wall,
                    offset,
                    length,
                    ..
                } => {
                    let room_rect = room_rect(self, *room)?;
                    check_door_fits(&room_rect, *wall, *offset, *length)?;
                }
                ComponentKind::Room { openings } => {
                    let rect = component.bounding_box();
                    for opening in openings {
                        match self.components.get(opening.door).map(Component::kind) {
                            Some(ComponentKind::Door { room, .. }) if *room == id => {}
                            Some(_) => return Err(ConfigurationError::NotADoor(opening.door)),
                            None => return Err(ConfigurationError::UnknownComponent(opening.door)),
                        }
                        check_door_fits(&rect, opening.wall, opening.offset, opening.length)?;
                    }
                }
                ComponentKind::Robot(state) => {
                    if let Some(missing) = state
                        .targets
                        .iter()
                        .find(|t| !self.components.contains_key(**t))
                    {
                        return Err(ConfigurationError::UnknownComponent(*missing));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct FactoryBuilder {
    name: String,
    width: u32,
    height: u32,
    config: SimulationConfig,
    notifier: Option<Arc<dyn FactoryNotifier>>,
    persistence: Option<Arc<dyn FactoryPersistence>>,
    floor: Floor,
}

impl FactoryBuilder {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            config: SimulationConfig::default(),
            notifier: None,
            persistence: None,
            floor: Floor::default(),
        }
    }

    /// Start from a stored snapshot; its components keep their ids.
    pub fn from_snapshot(snapshot: FactorySnapshot) -> Self {
        let mut builder = Self::new(snapshot.name, snapshot.width, snapshot.height);
        builder.floor = Floor {
            components: snapshot.components,
            order: snapshot.order,
        };
        builder
    }

    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn FactoryNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn FactoryPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn build(self) -> Result<Factory, ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigurationError::ZeroSizedFactory {
                width: self.width,
                height: self.height,
            });
        }
        self.config.validate()?;
        self.floor.validate()?;
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(LocalNotifier::new()));
        Ok(Factory {
            inner: Arc::new(FactoryInner {
                name: self.name,
                bounds: Rectangle::new(0, 0, self.width, self.height),
                config: self.config,
                floor: Mutex::new(self.floor),
                runtime: Mutex::new(Runtime::default()),
                behaviors: Mutex::new(BTreeMap::new()),
                notifier,
                persistence: self.persistence,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

pub(crate) struct FactoryInner {
    name: String,
    bounds: Rectangle,
    config: SimulationConfig,
    floor: Mutex<Floor>,
    runtime: Mutex<Runtime>,
    behaviors: Mutex<BTreeMap<ComponentId, BehaviorFactory>>,
    notifier: Arc<dyn FactoryNotifier>,
    persistence: Option<Arc<dyn FactoryPersistence>>,
}

impl Drop for FactoryInner {
    fn drop(&mut self) {
        // Contexts notice on their next upgrade; this only shortens the wait.
        let runtime = self.runtime.get_mut().unwrap_or_else(PoisonError::into_inner);
        for agent in runtime.agents.values() {
            agent.signal();
        }
    }
}

/// Shared handle to a factory. Cloning is cheap; all clones see the same
/// floor.
#[derive(Clone)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("name", &self.inner.name)
            .field("bounds", &self.inner.bounds)
            .field("components", &self.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Factory {
    /// A factory with the default config and a [`LocalNotifier`].
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Result<Self, ConfigurationError> {
        FactoryBuilder::new(name, width, height).build()
    }

    pub fn builder(name: impl Into<String>, width: u32, height: u32) -> FactoryBuilder {
        FactoryBuilder::new(name, width, height)
    }

    /// Read snapshot `id` from `persistence` and rebuild the factory around
    /// it. The same persistence receives the snapshot taken on stop.
    pub fn load(
        persistence: Arc<dyn FactoryPersistence>,
        id: &str,
        config: SimulationConfig,
    ) -> Result<Self, SimulationError> {
        let snapshot = persistence.read(id)?;
        let factory = FactoryBuilder::from_snapshot(snapshot)
            .config(config)
            .persistence(persistence)
            .build()?;
        Ok(factory)
    }

    pub(crate) fn from_inner(inner: Arc<FactoryInner>) -> Self {
        Self { inner }
    }

    fn lock_floor(&self) -> MutexGuard<'_, Floor> {
        // A behavior that panicked mid-step must not take the floor down
        // with it.
        self.inner.floor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_runtime(&self) -> MutexGuard<'_, Runtime> {
        self.inner.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, change: ModelChange) {
        self.inner.notifier.notify(&change);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn width(&self) -> u32 {
        self.inner.bounds.width
    }

    pub fn height(&self) -> u32 {
        self.inner.bounds.height
    }

    pub fn bounds(&self) -> Rectangle {
        self.inner.bounds
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.inner.config
    }

    pub fn notifier(&self) -> &Arc<dyn FactoryNotifier> {
        &self.inner.notifier
    }

    pub fn add_observer(&self, observer: Arc<dyn Observer>) -> ObserverId {
        self.inner.notifier.add_observer(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.notifier.remove_observer(id)
    }

    pub fn len(&self) -> usize {
        self.lock_floor().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of one component as it is right now.
    pub fn component(&self, id: ComponentId) -> Option<Component> {
        self.lock_floor().components.get(id).cloned()
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.lock_floor()
            .iter()
            .find(|(_, c)| c.name() == name)
            .map(|(id, _)| id)
    }

    /// Copies of all components, in insertion order.
    pub fn components(&self) -> Vec<(ComponentId, Component)> {
        self.lock_floor()
            .iter()
            .map(|(id, c)| (id, c.clone()))
            .collect()
    }

    pub fn robot_ids(&self) -> Vec<ComponentId> {
        self.lock_floor()
            .iter()
            .filter(|(_, c)| c.is_mobile())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn snapshot(&self) -> FactorySnapshot {
        let floor = self.lock_floor();
        FactorySnapshot {
            name: self.inner.name.clone(),
            width: self.width(),
            height: self.height(),
            components: floor.components.clone(),
            order: floor.order.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Child management
    // -----------------------------------------------------------------------

    /// Add a component. Names must be unique. Door components also carve
    /// their opening into the room they belong to. If the simulation is
    /// running the component gets its own execution context immediately.
    pub fn add_component(&self, component: Component) -> Result<ComponentId, ConfigurationError> {
        let id = {
            let mut floor = self.lock_floor();
            if floor.name_taken(component.name()) {
                return Err(ConfigurationError::DuplicateName(component.name().to_string()));
            }
            let opening = match component.kind() {
                ComponentKind::Door {
                    room,
                    wall,
                    offset,
                    length,
                    open,
                } => {
                    let room_rect = room_rect(&floor, *room)?;
                    check_door_fits(&room_rect, *wall, *offset, *length)?;
                    Some((
                        *room,
                        DoorOpening {
                            door: ComponentId::default(),
                            wall: *wall,
                            offset: *offset,
                            length: *length,
                            open: *open,
                        },
                    ))
                }
                ComponentKind::Robot(state) => {
                    if let Some(missing) = state
                        .targets
                        .iter()
                        .find(|t| !floor.components.contains_key(**t))
                    {
                        return Err(ConfigurationError::UnknownComponent(*missing));
                    }
                    None
                }
                _ => None,
            };
            let id = floor.components.insert(component);
            floor.order.push(id);
            if let Some((room, mut opening)) = opening {
                opening.door = id;
                if let Some(ComponentKind::Room { openings }) =
                    floor.components.get_mut(room).map(Component::kind_mut)
                {
                    openings.push(opening);
                }
            }
            id
        };
        debug!(component = ?id, "component added");
        self.spawn_if_running(id);
        self.notify(ModelChange::ComponentAdded(id));
        Ok(id)
    }

    /// Add a door of `length` units to one wall of `room`, `offset` units
    /// from the wall's left or top end.
    pub fn add_door(
        &self,
        room: ComponentId,
        name: impl Into<String>,
        wall: WallSide,
        offset: u32,
        length: u32,
        open: bool,
    ) -> Result<ComponentId, ConfigurationError> {
        let room_rect = room_rect(&self.lock_floor(), room)?;
        check_door_fits(&room_rect, wall, offset, length)?;
        let door = Component::new(
            name,
            wall_section(&room_rect, wall, offset, length),
            ComponentKind::Door {
                room,
                wall,
                offset,
                length,
                open,
            },
        )?;
        self.add_component(door)
    }

    /// Open or close a door, updating its room's walls.
    pub fn set_door_open(&self, door: ComponentId, open: bool) -> Result<(), ConfigurationError> {
        let room = {
            let mut floor = self.lock_floor();
            let room = match floor.components.get_mut(door).map(Component::kind_mut) {
                Some(ComponentKind::Door { room, open: state, .. }) => {
                    *state = open;
                    *room
                }
                Some(_) => return Err(ConfigurationError::NotADoor(door)),
                None => return Err(ConfigurationError::UnknownComponent(door)),
            };
            if let Some(ComponentKind::Room { openings }) =
                floor.components.get_mut(room).map(Component::kind_mut)
            {
                for opening in openings.iter_mut().filter(|o| o.door == door) {
                    opening.open = open;
                }
            }
            room
        };
        self.notify(ModelChange::ComponentUpdated(door));
        self.notify(ModelChange::ComponentUpdated(room));
        Ok(())
    }

    /// Remove a component, stopping its execution context if the simulation
    /// is running. Robots drop it from their targets and a removed room takes
    /// its doors with it. Returns false if it was not present.
    pub fn remove_component(&self, id: ComponentId) -> bool {
        let (retargeted, doors) = {
            let mut floor = self.lock_floor();
            let Some(removed) = floor.components.remove(id) else {
                return false;
            };
            floor.order.retain(|&other| other != id);
            let mut doors = Vec::new();
            match removed.kind() {
                ComponentKind::Door { room, .. } => {
                    if let Some(ComponentKind::Room { openings }) =
                        floor.components.get_mut(*room).map(Component::kind_mut)
                    {
                        openings.retain(|o| o.door != id);
                    }
                }
                ComponentKind::Room { openings } => doors.extend(openings.iter().map(|o| o.door)),
                _ => {}
            }
            // Robots forget the removed component so no target dangles.
            let mut retargeted = Vec::new();
            for (robot, component) in floor.components.iter_mut() {
                if let ComponentKind::Robot(state) = component.kind_mut() {
                    let before = state.targets.len();
                    state.targets.retain(|&t| t != id);
                    let was_current = state.current_target == Some(id);
                    if was_current {
                        state.current_target = None;
                    }
                    if was_current || state.targets.len() != before {
                        retargeted.push(robot);
                    }
                }
            }
            (retargeted, doors)
        };
        let agent = self.lock_runtime().agents.remove(&id);
        if let Some(agent) = agent {
            agent.signal();
            agent.join(id);
        }
        self.inner
            .behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        debug!(component = ?id, "component removed");
        self.notify(ModelChange::ComponentRemoved(id));
        for robot in retargeted {
            self.notify(ModelChange::ComponentUpdated(robot));
        }
        for door in doors {
            self.remove_component(door);
        }
        true
    }

    pub fn add_robot_target(&self, robot: ComponentId, target: ComponentId) -> Result<(), ConfigurationError> {
        {
            let mut floor = self.lock_floor();
            if !floor.components.contains_key(target) {
                return Err(ConfigurationError::UnknownComponent(target));
            }
            robot_state_mut(&mut floor, robot)?.targets.push(target);
        }
        self.notify(ModelChange::ComponentUpdated(robot));
        Ok(())
    }

    /// Remove every occurrence of `target` from the robot's list. Returns
    /// whether anything was removed.
    pub fn remove_robot_target(&self, robot: ComponentId, target: ComponentId) -> Result<bool, ConfigurationError> {
        let removed = {
            let mut floor = self.lock_floor();
            let state = robot_state_mut(&mut floor, robot)?;
            let before = state.targets.len();
            state.targets.retain(|&t| t != target);
            state.targets.len() != before
        };
        if removed {
            self.notify(ModelChange::ComponentUpdated(robot));
        }
        Ok(removed)
    }

    /// Install a custom behavior for a component, replacing its default one
    /// from the next start on.
    pub fn set_behavior(&self, id: ComponentId, behavior: BehaviorFactory) -> Result<(), ConfigurationError> {
        if !self.lock_floor().components.contains_key(id) {
            return Err(ConfigurationError::UnknownComponent(id));
        }
        self.inner
            .behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, behavior);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Occupancy queries
    // -----------------------------------------------------------------------

    /// True iff some component overlaps `shape` and cannot be overlaid by it.
    pub fn has_obstacle_at(&self, shape: &PositionedShape) -> bool {
        self.lock_floor().obstacle_at(shape, None)
    }

    /// True iff some mobile component other than `excluding` overlaps `shape`.
    pub fn has_mobile_component_at(&self, shape: &PositionedShape, excluding: Option<ComponentId>) -> bool {
        self.lock_floor().mobile_at(shape, excluding).is_some()
    }

    /// The first mobile component (insertion order) other than `excluding`
    /// overlapping `shape`.
    pub fn mobile_component_at(
        &self,
        shape: &PositionedShape,
        excluding: Option<ComponentId>,
    ) -> Option<ComponentId> {
        self.lock_floor().mobile_at(shape, excluding)
    }

    // -----------------------------------------------------------------------
    // Arbitration
    // -----------------------------------------------------------------------

    /// Move a component one capped step toward `motion.target()`. Returns the
    /// Manhattan displacement, or 0 if the move was rejected and nothing
    /// changed.
    pub fn move_component(&self, motion: &Motion, id: ComponentId) -> u32 {
        self.arbitrate(motion, id, None)
    }

    pub(crate) fn arbitrate(&self, motion: &Motion, id: ComponentId, signal: Option<&StopSignal>) -> u32 {
        let (from, to) = {
            let mut floor = self.lock_floor();
            if signal.is_some_and(StopSignal::is_stopped) {
                return 0;
            }
            let Some(component) = floor.components.get(id) else {
                return 0;
            };
            let from = component.position();
            if from != motion.source() {
                debug!(component = ?id, ?from, source = ?motion.source(), "stale motion rejected");
                return 0;
            }
            let to = motion.step_position();
            if to == from {
                return 0;
            }
            let target_fp = component.footprint_at(motion.target());
            let step_fp = component.footprint_at(to);
            let bounds = self.inner.bounds;
            if !bounds.contains_rect(&target_fp) || !bounds.contains_rect(&step_fp) {
                return 0;
            }
            let swept: PositionedShape = component.footprint_at(from).swept_to(to).into();
            let target_fp: PositionedShape = target_fp.into();
            let step_fp: PositionedShape = step_fp.into();
            if floor.obstacle_at(&target_fp, Some(id)) || floor.obstacle_at(&swept, Some(id)) {
                return 0;
            }
            if floor.mobile_at(&target_fp, Some(id)).is_some()
                || floor.mobile_at(&step_fp, Some(id)).is_some()
            {
                return 0;
            }
            if let Some(component) = floor.components.get_mut(id) {
                component.move_to(to);
            }
            (from, to)
        };
        self.notify(ModelChange::ComponentMoved { id, from, to });
        from.manhattan_distance(&to)
    }

    // -----------------------------------------------------------------------
    // Robot support
    // -----------------------------------------------------------------------

    /// True when `robot` has a memorized destination occupied by another
    /// mobile component whose own memorized destination is `robot`'s current
    /// position. Read under a single lock.
    pub fn is_deadlocked(&self, robot: ComponentId) -> bool {
        let floor = self.lock_floor();
        let Some(me) = floor.components.get(robot) else {
            return false;
        };
        let Some(wanted) = me.robot_state().and_then(|s| s.memorized) else {
            return false;
        };
        let probe: PositionedShape = me.footprint_at(wanted).into();
        let Some(other) = floor.mobile_at(&probe, Some(robot)) else {
            return false;
        };
        floor
            .components
            .get(other)
            .and_then(Component::robot_state)
            .and_then(|s| s.memorized)
            == Some(me.position())
    }

    /// First neighboring cell, `speed` away in the escape probe order, that
    /// lies inside the factory and is free of obstacles and other mobile
    /// components.
    pub fn free_neighbouring_position(&self, robot: ComponentId) -> Option<Position> {
        let floor = self.lock_floor();
        let me = floor.components.get(robot)?;
        let speed = me.robot_state()?.speed as i32;
        let from = me.position();
        ESCAPE_DIRECTIONS
            .iter()
            .map(|&(dx, dy)| from.offset(dx * speed, dy * speed))
            .find(|&cell| {
                let fp = me.footprint_at(cell);
                let swept: PositionedShape = me.footprint_at(from).swept_to(cell).into();
                self.inner.bounds.contains_rect(&fp)
                    && !floor.obstacle_at(&swept, Some(robot))
                    && floor.mobile_at(&fp.into(), Some(robot)).is_none()
            })
    }

    /// Snapshot of what a path search for `source` toward `target` needs,
    /// taken under one lock. `None` if either component is missing.
    pub fn path_query(&self, source: ComponentId, target: ComponentId, step: u32) -> Option<PathQuery> {
        let floor = self.lock_floor();
        let mover = floor.components.get(source)?;
        let reach = floor.components.get(target)?.reach_zone(step);
        let bounds = mover.bounding_box();
        let obstacles = floor
            .iter()
            .filter(|(id, c)| *id != source && !c.is_mobile())
            .map(|(_, c)| c.clone())
            .collect();
        Some(PathQuery {
            bounds: self.inner.bounds,
            origin: bounds.origin,
            footprint: (bounds.width, bounds.height),
            reach,
            obstacles,
            step,
        })
    }

    /// Whether `component`'s footprint currently overlaps `target`'s reach
    /// zone. Matches the goal test of the path finder. `None` if either is
    /// missing.
    pub fn has_reached(&self, component: ComponentId, target: ComponentId, step: u32) -> Option<bool> {
        let floor = self.lock_floor();
        let me = floor.components.get(component)?;
        let zone = floor.components.get(target)?.reach_zone(step);
        Some(zone.overlaps_rect(&me.bounding_box()))
    }

    /// Apply `update` to a robot's state under the floor lock.
    pub(crate) fn update_robot<R>(
        &self,
        robot: ComponentId,
        update: impl FnOnce(&mut RobotState) -> R,
    ) -> Option<R> {
        let mut floor = self.lock_floor();
        floor
            .components
            .get_mut(robot)
            .and_then(Component::robot_state_mut)
            .map(update)
    }

    // -----------------------------------------------------------------------
    // Simulation lifecycle
    // -----------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.lock_runtime().running
    }

    /// Spawn one execution context per component. No-op if already running.
    pub fn start_simulation(&self) -> Result<(), SimulationError> {
        let mut runtime = self.lock_runtime();
        if runtime.running {
            debug!(factory = %self.name(), "start ignored, already running");
            return Ok(());
        }
        runtime.running = true;
        let members: Vec<ComponentId> = self.lock_floor().order.clone();
        for id in members {
            if let Err(err) = self.spawn_agent(&mut runtime, id) {
                let agents = std::mem::take(&mut runtime.agents);
                runtime.running = false;
                drop(runtime);
                shutdown(agents);
                return Err(err);
            }
        }
        let count = runtime.agents.len();
        drop(runtime);
        info!(factory = %self.name(), agents = count, "simulation started");
        self.notify(ModelChange::SimulationStarted);
        Ok(())
    }

    /// Cancel and join every execution context, then hand a snapshot to the
    /// persistence collaborator. No-op if not running.
    pub fn stop_simulation(&self) -> Result<(), SimulationError> {
        let agents = {
            let mut runtime = self.lock_runtime();
            if !runtime.running {
                debug!(factory = %self.name(), "stop ignored, not running");
                return Ok(());
            }
            runtime.running = false;
            std::mem::take(&mut runtime.agents)
        };
        shutdown(agents);
        info!(factory = %self.name(), "simulation stopped");
        self.notify(ModelChange::SimulationStopped);
        if let Some(persistence) = &self.inner.persistence {
            persistence.persist(&self.snapshot())?;
        }
        Ok(())
    }

    fn spawn_if_running(&self, id: ComponentId) {
        let mut runtime = self.lock_runtime();
        if !runtime.running || runtime.agents.contains_key(&id) {
            return;
        }
        if let Err(err) = self.spawn_agent(&mut runtime, id) {
            error!(component = ?id, %err, "could not start execution context");
        }
    }

    fn spawn_agent(&self, runtime: &mut Runtime, id: ComponentId) -> Result<(), SimulationError> {
        let custom = self
            .inner
            .behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();
        let Some(component) = self.component(id) else {
            return Ok(());
        };
        let behavior = match custom {
            Some(make) => make(id),
            None => default_behavior(&component, &self.inner.config),
        };
        let agent = AgentHandle::spawn(
            Arc::downgrade(&self.inner),
            id,
            component.name(),
            behavior,
            self.inner.config.tick_interval(),
        )
        .map_err(|source| SimulationError::Spawn {
            name: component.name().to_string(),
            source,
        })?;
        runtime.agents.insert(id, agent);
        Ok(())
    }
}

fn room_rect(floor: &Floor, room: ComponentId) -> Result<Rectangle, ConfigurationError> {
    match floor.components.get(room) {
        Some(c) if matches!(c.kind(), ComponentKind::Room { .. }) => Ok(c.bounding_box()),
        Some(_) => Err(ConfigurationError::NotARoom(room)),
        None => Err(ConfigurationError::UnknownComponent(room)),
    }
}

fn check_door_fits(room: &Rectangle, wall: WallSide, offset: u32, length: u32) -> Result<(), ConfigurationError> {
    let available = wall_length(room, wall);
    if length == 0 || offset.checked_add(length).is_none_or(|end| end > available) {
        return Err(ConfigurationError::DoorOutsideWall {
            offset,
            length,
            wall: available,
        });
    }
    Ok(())
}

fn robot_state_mut(
    floor: &mut Floor,
    robot: ComponentId,
) -> Result<&mut RobotState, ConfigurationError> {
    match floor.components.get_mut(robot) {
        Some(c) => c
            .robot_state_mut()
            .ok_or(ConfigurationError::NotARobot(robot)),
        None => Err(ConfigurationError::UnknownComponent(robot)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChangeKind;
    use crate::path::PathStrategy;
    use crate::persistence::MemoryPersistence;
    use crate::test_utils::*;
    use std::sync::Barrier;
    use std::thread;

    fn rect(x: i32, y: i32, w: u32, h: u32) -> PositionedShape {
        Rectangle::new(x, y, w, h).into()
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn invalid_factories_are_rejected() {
        assert_eq!(
            Factory::new("", 10, 10).unwrap_err(),
            ConfigurationError::EmptyName
        );
        assert_eq!(
            Factory::new("f", 0, 10).unwrap_err(),
            ConfigurationError::ZeroSizedFactory { width: 0, height: 10 }
        );
        let bad = SimulationConfig {
            grid_step: 0,
            ..SimulationConfig::default()
        };
        assert!(Factory::builder("f", 10, 10).config(bad).build().is_err());
    }

    // -----------------------------------------------------------------------
    // Child management
    // -----------------------------------------------------------------------

    #[test]
    fn add_and_remove_notify_observers() {
        let factory = open_floor();
        let recorder = RecordingObserver::new();
        factory.add_observer(recorder.clone());

        let machine = add_machine(&factory, "Machine", Rectangle::new(0, 0, 5, 5));
        assert_eq!(factory.len(), 1);
        assert_eq!(factory.component_id("Machine"), Some(machine));
        assert!(factory.remove_component(machine));
        assert!(!factory.remove_component(machine));
        assert!(factory.is_empty());

        assert_eq!(
            recorder.changes(),
            vec![
                ModelChange::ComponentAdded(machine),
                ModelChange::ComponentRemoved(machine)
            ]
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let factory = open_floor();
        add_machine(&factory, "Machine", Rectangle::new(0, 0, 5, 5));
        let again = Component::machine("Machine", Rectangle::new(10, 0, 5, 5)).unwrap();
        assert_eq!(
            factory.add_component(again),
            Err(ConfigurationError::DuplicateName("Machine".to_string()))
        );
    }

    #[test]
    fn robot_targets_must_exist() {
        let factory = open_floor();
        let robot = add_robot(&factory, "Robot", 0, 0, PathStrategy::Custom);
        let machine = add_machine(&factory, "Machine", Rectangle::new(50, 50, 5, 5));

        assert_eq!(
            factory.add_robot_target(machine, robot),
            Err(ConfigurationError::NotARobot(machine))
        );
        factory.add_robot_target(robot, machine).unwrap();
        assert_eq!(factory.remove_robot_target(robot, machine), Ok(true));
        assert_eq!(factory.remove_robot_target(robot, machine), Ok(false));

        factory.remove_component(machine);
        assert_eq!(
            factory.add_robot_target(robot, machine),
            Err(ConfigurationError::UnknownComponent(machine))
        );
    }

    #[test]
    fn doors_open_and_close_room_walls() {
        let factory = open_floor();
        let room = factory
            .add_component(Component::room("Room", Rectangle::new(20, 20, 75, 75)).unwrap())
            .unwrap();
        let door = factory
            .add_door(room, "Entrance", WallSide::Bottom, 10, 20, true)
            .unwrap();

        let passage = rect(30, 90, 4, 9);
        assert!(!factory.has_obstacle_at(&passage));

        factory.set_door_open(door, false).unwrap();
        assert!(factory.has_obstacle_at(&passage));

        factory.set_door_open(door, true).unwrap();
        assert!(factory.remove_component(door));
        assert!(factory.has_obstacle_at(&passage));
    }

    #[test]
    fn door_must_fit_its_wall() {
        let factory = open_floor();
        let room = factory
            .add_component(Component::room("Room", Rectangle::new(0, 0, 30, 30)).unwrap())
            .unwrap();
        assert_eq!(
            factory.add_door(room, "Door", WallSide::Left, 20, 20, true),
            Err(ConfigurationError::DoorOutsideWall {
                offset: 20,
                length: 20,
                wall: 30
            })
        );
        assert_eq!(
            factory.add_door(room, "Door", WallSide::Left, u32::MAX, 5, true),
            Err(ConfigurationError::DoorOutsideWall {
                offset: u32::MAX,
                length: 5,
                wall: 30
            })
        );
        let machine = add_machine(&factory, "Machine", Rectangle::new(50, 50, 5, 5));
        assert_eq!(
            factory.add_door(machine, "Door", WallSide::Left, 0, 5, true),
            Err(ConfigurationError::NotARoom(machine))
        );
    }

    #[test]
    fn removing_a_room_removes_its_doors() {
        let factory = open_floor();
        let room = factory
            .add_component(Component::room("Room", Rectangle::new(20, 20, 75, 75)).unwrap())
            .unwrap();
        let door = factory
            .add_door(room, "Entrance", WallSide::Bottom, 10, 20, true)
            .unwrap();
        assert!(factory.remove_component(room));
        assert!(factory.component(door).is_none());
        assert!(factory.is_empty());
    }

    #[test]
    fn removed_component_leaves_robot_targets() {
        let factory = open_floor();
        let recorder = RecordingObserver::new();
        let robot = add_robot(&factory, "Robot", 0, 0, PathStrategy::Custom);
        let gone = add_machine(&factory, "Gone", Rectangle::new(50, 50, 5, 5));
        let kept = add_machine(&factory, "Kept", Rectangle::new(100, 100, 5, 5));
        factory.add_robot_target(robot, gone).unwrap();
        factory.add_robot_target(robot, kept).unwrap();
        factory.add_robot_target(robot, gone).unwrap();
        factory.update_robot(robot, |r| r.current_target = Some(gone)).unwrap();
        factory.add_observer(recorder.clone());

        factory.remove_component(gone);
        let state = factory.component(robot).unwrap().robot_state().cloned().unwrap();
        assert_eq!(state.targets, vec![kept]);
        assert_eq!(state.current_target, None);
        assert_eq!(
            recorder.changes(),
            vec![
                ModelChange::ComponentRemoved(gone),
                ModelChange::ComponentUpdated(robot)
            ]
        );
    }

    #[test]
    fn zero_area_components_obstruct_nothing() {
        let factory = open_floor();
        add_conveyor(&factory, "Seam", Rectangle::new(12, 0, 0, 200));
        let robot = add_robot(&factory, "Robot", 10, 5, PathStrategy::Custom);

        assert!(!factory.has_obstacle_at(&rect(10, 5, 4, 4)));
        assert!(!factory.has_obstacle_at(&rect(15, 5, 4, 4)));
        let moved = factory.move_component(&Motion::new(Position::new(10, 5), Position::new(15, 5), 5), robot);
        assert_eq!(moved, 5);
    }

    // -----------------------------------------------------------------------
    // Occupancy queries
    // -----------------------------------------------------------------------

    #[test]
    fn only_solid_components_are_obstacles() {
        let factory = open_floor();
        add_machine(&factory, "Machine", Rectangle::new(50, 50, 15, 15));
        add_conveyor(&factory, "Conveyor", Rectangle::new(100, 100, 10, 10));
        let robot = add_robot(&factory, "Robot", 150, 150, PathStrategy::Custom);

        assert!(!factory.has_obstacle_at(&rect(55, 55, 4, 4)));
        assert!(factory.has_obstacle_at(&rect(105, 105, 4, 4)));
        assert!(!factory.has_obstacle_at(&rect(150, 150, 4, 4)));
        assert!(!factory.has_obstacle_at(&rect(110, 100, 4, 4)));

        assert!(factory.has_mobile_component_at(&rect(150, 150, 4, 4), None));
        assert!(!factory.has_mobile_component_at(&rect(150, 150, 4, 4), Some(robot)));
        assert_eq!(factory.mobile_component_at(&rect(151, 151, 2, 2), None), Some(robot));
    }

    // -----------------------------------------------------------------------
    // Arbitration
    // -----------------------------------------------------------------------

    #[test]
    fn successful_move_commits_and_notifies() {
        let factory = open_floor();
        let robot = add_robot(&factory, "Robot", 5, 5, PathStrategy::Custom);
        let recorder = RecordingObserver::new();
        factory.add_observer(recorder.clone());

        let motion = Motion::new(Position::new(5, 5), Position::new(30, 5), 5);
        assert_eq!(factory.move_component(&motion, robot), 5);
        assert_eq!(factory.component(robot).unwrap().position(), Position::new(10, 5));
        assert_eq!(
            recorder.changes(),
            vec![ModelChange::ComponentMoved {
                id: robot,
                from: Position::new(5, 5),
                to: Position::new(10, 5)
            }]
        );
    }

    #[test]
    fn rejected_moves_change_nothing() {
        let factory = open_floor();
        add_conveyor(&factory, "Conveyor", Rectangle::new(20, 0, 10, 10));
        let robot = add_robot(&factory, "Robot", 15, 0, PathStrategy::Custom);
        add_robot(&factory, "Other", 15, 5, PathStrategy::Custom);
        let recorder = RecordingObserver::new();
        factory.add_observer(recorder.clone());
        let here = Position::new(15, 0);

        // into the conveyor
        assert_eq!(factory.move_component(&Motion::new(here, Position::new(20, 0), 5), robot), 0);
        // onto the other robot
        assert_eq!(factory.move_component(&Motion::new(here, Position::new(15, 5), 5), robot), 0);
        // out of bounds
        assert_eq!(factory.move_component(&Motion::new(here, Position::new(15, -5), 5), robot), 0);
        // stale source
        assert_eq!(
            factory.move_component(&Motion::new(Position::new(0, 0), Position::new(10, 0), 5), robot),
            0
        );
        // zero length
        assert_eq!(factory.move_component(&Motion::new(here, here, 5), robot), 0);

        assert_eq!(factory.component(robot).unwrap().position(), here);
        assert!(recorder.changes().is_empty());
    }

    #[test]
    fn move_cannot_tunnel_through_thin_wall() {
        let factory = open_floor();
        add_conveyor(&factory, "Wall", Rectangle::new(9, 0, 1, 50));
        let robot = add_robot(&factory, "Robot", 5, 20, PathStrategy::Custom);
        let motion = Motion::new(Position::new(5, 20), Position::new(10, 20), 5);
        assert_eq!(factory.move_component(&motion, robot), 0);
    }

    #[test]
    fn racing_movers_into_one_cell_exactly_one_wins() {
        for _ in 0..20 {
            let factory = open_floor();
            let cell = Position::new(50, 50);
            let starts = [(45, 50), (55, 50), (50, 45), (50, 55)];
            let robots: Vec<_> = starts
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| add_robot(&factory, &format!("R{i}"), x, y, PathStrategy::Custom))
                .collect();
            let barrier = Arc::new(Barrier::new(robots.len()));

            let handles: Vec<_> = robots
                .iter()
                .zip(starts)
                .map(|(&robot, (x, y))| {
                    let factory = factory.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        factory.move_component(&Motion::new(Position::new(x, y), cell, 5), robot)
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&moved| moved > 0)
                .count();
            assert_eq!(winners, 1);
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn snapshot_round_trip_keeps_ids() {
        let factory = open_floor();
        let machine = add_machine(&factory, "Machine", Rectangle::new(50, 50, 15, 15));
        let robot = add_robot(&factory, "Robot", 5, 5, PathStrategy::Library);
        factory.add_robot_target(robot, machine).unwrap();

        let restored = FactoryBuilder::from_snapshot(factory.snapshot())
            .config(fast_config())
            .build()
            .unwrap();
        assert_eq!(restored.name(), "Test Floor");
        assert_eq!(restored.components(), factory.components());
        let state = restored.component(robot).unwrap().robot_state().cloned().unwrap();
        assert_eq!(state.targets, vec![machine]);
    }

    #[test]
    fn snapshot_with_repeated_names_is_rejected() {
        let factory = open_floor();
        add_machine(&factory, "Machine", Rectangle::new(50, 50, 15, 15));
        let mut snapshot = factory.snapshot();
        let twin = Component::machine("Machine", Rectangle::new(80, 80, 5, 5)).unwrap();
        let twin = snapshot.components.insert(twin);
        snapshot.order.push(twin);

        assert_eq!(
            FactoryBuilder::from_snapshot(snapshot).build().err(),
            Some(ConfigurationError::DuplicateName("Machine".to_string()))
        );
    }

    #[test]
    fn snapshot_order_must_match_components() {
        let factory = open_floor();
        let machine = add_machine(&factory, "Machine", Rectangle::new(50, 50, 15, 15));
        let robot = add_robot(&factory, "Robot", 5, 5, PathStrategy::Custom);

        let mut repeated = factory.snapshot();
        repeated.order.push(machine);
        assert_eq!(
            FactoryBuilder::from_snapshot(repeated).build().err(),
            Some(ConfigurationError::OrderMismatch(machine))
        );

        let mut missing = factory.snapshot();
        missing.order.retain(|&id| id != robot);
        assert_eq!(
            FactoryBuilder::from_snapshot(missing).build().err(),
            Some(ConfigurationError::OrderMismatch(robot))
        );

        let mut unknown = factory.snapshot();
        unknown.components.remove(machine);
        assert_eq!(
            FactoryBuilder::from_snapshot(unknown).build().err(),
            Some(ConfigurationError::OrderMismatch(machine))
        );
    }

    #[test]
    fn snapshot_robot_targets_must_exist() {
        let factory = open_floor();
        let machine = add_machine(&factory, "Machine", Rectangle::new(50, 50, 15, 15));
        let robot = add_robot(&factory, "Robot", 5, 5, PathStrategy::Custom);
        factory.add_robot_target(robot, machine).unwrap();

        let mut snapshot = factory.snapshot();
        snapshot.components.remove(machine);
        snapshot.order.retain(|&id| id != machine);
        assert_eq!(
            FactoryBuilder::from_snapshot(snapshot).build().err(),
            Some(ConfigurationError::UnknownComponent(machine))
        );
    }

    #[test]
    fn snapshot_doors_must_fit_their_walls() {
        let factory = open_floor();
        let room = factory
            .add_component(Component::room("Room", Rectangle::new(0, 0, 30, 30)).unwrap())
            .unwrap();
        let door = factory.add_door(room, "Door", WallSide::Left, 5, 5, true).unwrap();

        let mut snapshot = factory.snapshot();
        if let Some(ComponentKind::Door { offset, .. }) =
            snapshot.components.get_mut(door).map(Component::kind_mut)
        {
            *offset = u32::MAX;
        }
        let store = Arc::new(MemoryPersistence::new());
        store.persist(&snapshot).unwrap();
        assert!(matches!(
            Factory::load(store, "Test Floor", fast_config()),
            Err(SimulationError::Configuration(ConfigurationError::DoorOutsideWall { .. }))
        ));
    }

    #[test]
    fn load_reads_from_persistence() {
        let store = Arc::new(MemoryPersistence::new());
        let factory = open_floor();
        add_machine(&factory, "Machine", Rectangle::new(50, 50, 15, 15));
        store.persist(&factory.snapshot()).unwrap();

        let loaded = Factory::load(store.clone(), "Test Floor", fast_config()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(matches!(
            Factory::load(store, "missing", fast_config()),
            Err(SimulationError::Persistence(_))
        ));
    }

    #[test]
    fn set_behavior_requires_known_component() {
        let factory = open_floor();
        let machine = add_machine(&factory, "Machine", Rectangle::new(50, 50, 15, 15));
        factory.remove_component(machine);
        let idle: BehaviorFactory =
            Arc::new(|_: ComponentId| Box::new(crate::behavior::Idle) as Box<dyn crate::behavior::Behavior>);
        let result = factory.set_behavior(machine, idle);
        assert_eq!(result, Err(ConfigurationError::UnknownComponent(machine)));
    }

    #[test]
    fn door_toggle_reports_updates() {
        let factory = open_floor();
        let room = factory
            .add_component(Component::room("Room", Rectangle::new(0, 0, 30, 30)).unwrap())
            .unwrap();
        let door = factory.add_door(room, "Door", WallSide::Top, 5, 10, true).unwrap();
        let recorder = RecordingObserver::new();
        factory.add_observer(recorder.clone());
        factory.set_door_open(door, false).unwrap();
        let kinds: Vec<_> = recorder.changes().iter().map(ModelChange::kind).collect();
        assert_eq!(kinds, vec![ChangeKind::ComponentUpdated; 2]);
    }
}
