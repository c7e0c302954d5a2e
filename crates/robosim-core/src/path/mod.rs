//! Path finding over a free-space grid.
//!
//! A search snapshots the obstacles under the factory lock
//! ([`Factory::path_query`]), then builds a [`FreeSpaceGrid`] and runs
//! single-source shortest paths outside the lock. Two interchangeable
//! strategies compute the distance field:
//!
//! - [`CustomPathFinder`] -- binary-heap Dijkstra written here.
//! - [`LibraryPathFinder`] -- `pathfinding::prelude::dijkstra_all`.
//!
//! Both hand the distance field to the same reconstruction, which always
//! steps back to the lowest-ordered predecessor, so for an unchanged floor
//! the strategies return identical routes.

pub mod custom;
pub mod grid;
pub mod library;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::factory::Factory;
use crate::geometry::{Position, PositionedShape, Rectangle};
use crate::id::ComponentId;

pub use custom::CustomPathFinder;
pub use grid::FreeSpaceGrid;
pub use library::LibraryPathFinder;

/// Each vertex links to its orthogonal neighbors only.
pub const GRID_CONNECTIVITY: usize = 4;

/// Finds a route for `source` to reach `target`.
///
/// The returned positions are grid vertices one step apart, excluding the
/// vertex the source already sits on. Empty when no goal is reachable.
pub trait PathFinder: Send + Sync {
    fn find_path(&self, factory: &Factory, source: ComponentId, target: ComponentId) -> Vec<Position>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStrategy {
    #[default]
    Custom,
    Library,
}

impl PathStrategy {
    pub fn finder(self, step: u32) -> Arc<dyn PathFinder> {
        match self {
            PathStrategy::Custom => Arc::new(CustomPathFinder::new(step)),
            PathStrategy::Library => Arc::new(LibraryPathFinder::new(step)),
        }
    }
}

/// Everything a search needs, copied out of the factory in one go.
#[derive(Debug, Clone)]
pub struct PathQuery {
    pub bounds: Rectangle,
    /// Current anchor of the source.
    pub origin: Position,
    /// Bounding width and height of the source.
    pub footprint: (u32, u32),
    /// Zone the route must end in.
    pub reach: PositionedShape,
    /// Every fixed component except the source.
    pub obstacles: Vec<Component>,
    pub step: u32,
}

/// Shared driver: build the grid, compute distances with `distances`, and
/// reconstruct the canonical route.
pub(crate) fn plan_route(
    query: &PathQuery,
    distances: impl FnOnce(&FreeSpaceGrid, Position) -> BTreeMap<Position, u32>,
) -> Vec<Position> {
    let grid = FreeSpaceGrid::build(query);
    let Some(start) = grid.nearest_vertex(query.origin) else {
        return Vec::new();
    };
    let goals = grid.goal_vertices(&query.reach);
    if goals.is_empty() {
        return Vec::new();
    }
    let dist = distances(&grid, start);
    let Some((_, goal)) = goals
        .iter()
        .filter_map(|g| dist.get(g).map(|d| (*d, *g)))
        .min()
    else {
        return Vec::new();
    };
    let mut route = reconstruct(&grid, &dist, start, goal);
    if start != query.origin {
        // snap onto the grid first
        route.insert(0, start);
    }
    route
}

fn reconstruct(
    grid: &FreeSpaceGrid,
    dist: &BTreeMap<Position, u32>,
    start: Position,
    goal: Position,
) -> Vec<Position> {
    let mut route = Vec::new();
    let mut current = goal;
    while current != start {
        route.push(current);
        let Some(&d) = dist.get(&current) else {
            return Vec::new();
        };
        let previous = grid
            .neighbors(current)
            .iter()
            .copied()
            .filter(|n| d > 0 && dist.get(n) == Some(&(d - 1)))
            .min();
        match previous {
            Some(p) => current = p,
            None => return Vec::new(),
        }
    }
    route.reverse();
    route
}
