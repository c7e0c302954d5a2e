//! Dijkstra from the `pathfinding` crate.

use std::collections::BTreeMap;

use pathfinding::prelude::dijkstra_all;

use crate::factory::Factory;
use crate::geometry::Position;
use crate::id::ComponentId;
use crate::path::{FreeSpaceGrid, PathFinder, plan_route};

#[derive(Debug, Clone, Copy)]
pub struct LibraryPathFinder {
    step: u32,
}

impl LibraryPathFinder {
    pub fn new(step: u32) -> Self {
        Self { step }
    }
}

impl PathFinder for LibraryPathFinder {
    fn find_path(&self, factory: &Factory, source: ComponentId, target: ComponentId) -> Vec<Position> {
        let Some(query) = factory.path_query(source, target, self.step) else {
            return Vec::new();
        };
        plan_route(&query, distances)
    }
}

fn distances(grid: &FreeSpaceGrid, start: Position) -> BTreeMap<Position, u32> {
    let reachable = dijkstra_all(&start, |p: &Position| {
        grid.neighbors(*p)
            .iter()
            .map(|&n| (n, 1u32))
            .collect::<Vec<_>>()
    });
    let mut dist: BTreeMap<Position, u32> = reachable
        .into_iter()
        .map(|(p, (_parent, cost))| (p, cost))
        .collect();
    dist.insert(start, 0);
    dist
}
