//! Turning layout files into live factories.
//!
//! Furniture is added in a fixed order (rooms with their doors, areas,
//! machines, conveyors, charging stations, robots) so component ids and the
//! execution-context start order are reproducible for a given file.

use std::path::Path;
use std::sync::Arc;

use robosim_core::battery::Battery;
use robosim_core::component::Component;
use robosim_core::config::SimulationConfig;
use robosim_core::factory::{Factory, FactoryBuilder};
use robosim_core::fixed::f64_to_fixed64;
use robosim_core::geometry::Circle;
use robosim_core::persistence::FactoryPersistence;
use tracing::{debug, info};

use crate::loader::{DataLoadError, deserialize_file};
use crate::schema::LayoutData;

/// Read a layout file (RON, TOML, or JSON).
pub fn load_layout(path: &Path) -> Result<LayoutData, DataLoadError> {
    deserialize_file(path)
}

/// Read a simulation config file. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<SimulationConfig, DataLoadError> {
    let config: SimulationConfig = deserialize_file(path)?;
    config.validate()?;
    Ok(config)
}

/// Load a layout file and build its factory.
pub fn load_factory(
    path: &Path,
    config: SimulationConfig,
    persistence: Option<Arc<dyn FactoryPersistence>>,
) -> Result<Factory, DataLoadError> {
    let layout = load_layout(path)?;
    let mut builder = Factory::builder(&layout.name, layout.width, layout.height).config(config);
    if let Some(persistence) = persistence {
        builder = builder.persistence(persistence);
    }
    populate(builder, &layout)
}

/// Build a factory from an already parsed layout.
pub fn build_factory(layout: &LayoutData, config: SimulationConfig) -> Result<Factory, DataLoadError> {
    populate(
        Factory::builder(&layout.name, layout.width, layout.height).config(config),
        layout,
    )
}

fn populate(builder: FactoryBuilder, layout: &LayoutData) -> Result<Factory, DataLoadError> {
    let factory = builder.build()?;
    let default_speed = factory.config().robot_speed;

    for room in &layout.rooms {
        let id = factory.add_component(Component::room(&room.name, room.rect.into())?)?;
        for door in &room.doors {
            factory.add_door(id, &door.name, door.wall, door.offset, door.length, door.open)?;
        }
    }
    for area in &layout.areas {
        factory.add_component(Component::area(&area.name, area.rect.into())?)?;
    }
    for machine in &layout.machines {
        factory.add_component(Component::machine(&machine.name, machine.rect.into())?)?;
    }
    for conveyor in &layout.conveyors {
        factory.add_component(Component::conveyor(&conveyor.name, conveyor.shape.to_shape()?)?)?;
    }
    for station in &layout.charging_stations {
        factory.add_component(Component::charging_station(&station.name, station.rect.into())?)?;
    }

    for robot in &layout.robots {
        let component = Component::robot(
            &robot.name,
            Circle::new(robot.x, robot.y, robot.radius),
            Battery::new(f64_to_fixed64(robot.battery)),
            robot.speed.unwrap_or(default_speed),
            robot.strategy,
        )?;
        let id = factory.add_component(component)?;
        for target in &robot.targets {
            let target_id = factory
                .component_id(target)
                .ok_or_else(|| DataLoadError::UnresolvedTarget {
                    robot: robot.name.clone(),
                    target: target.clone(),
                })?;
            factory.add_robot_target(id, target_id)?;
        }
        debug!(robot = %robot.name, targets = robot.targets.len(), "robot placed");
    }

    info!(factory = %factory.name(), components = factory.len(), "layout loaded");
    Ok(factory)
}
