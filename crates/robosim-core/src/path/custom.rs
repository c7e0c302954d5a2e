//! Hand-written Dijkstra over the free-space grid.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use crate::factory::Factory;
use crate::geometry::Position;
use crate::id::ComponentId;
use crate::path::{FreeSpaceGrid, PathFinder, plan_route};

#[derive(Debug, Clone, Copy)]
pub struct CustomPathFinder {
    step: u32,
}

impl CustomPathFinder {
    pub fn new(step: u32) -> Self {
        Self { step }
    }
}

impl PathFinder for CustomPathFinder {
    fn find_path(&self, factory: &Factory, source: ComponentId, target: ComponentId) -> Vec<Position> {
        let Some(query) = factory.path_query(source, target, self.step) else {
            return Vec::new();
        };
        plan_route(&query, distances)
    }
}

/// Unit-weight shortest distances from `start` to every reachable vertex.
pub fn distances(grid: &FreeSpaceGrid, start: Position) -> BTreeMap<Position, u32> {
    let mut dist = BTreeMap::new();
    let mut heap = BinaryHeap::new();
    dist.insert(start, 0u32);
    heap.push(Reverse((0u32, start)));

    while let Some(Reverse((d, p))) = heap.pop() {
        if dist.get(&p).is_some_and(|&best| d > best) {
            continue;
        }
        for &next in grid.neighbors(p) {
            let candidate = d + 1;
            if dist.get(&next).is_none_or(|&best| candidate < best) {
                dist.insert(next, candidate);
                heap.push(Reverse((candidate, next)));
            }
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rectangle;
    use crate::path::PathQuery;

    #[test]
    fn distances_count_grid_steps() {
        let query = PathQuery {
            bounds: Rectangle::new(0, 0, 20, 20),
            origin: Position::new(0, 0),
            footprint: (4, 4),
            reach: Rectangle::new(15, 15, 4, 4).into(),
            obstacles: Vec::new(),
            step: 5,
        };
        let grid = FreeSpaceGrid::build(&query);
        let dist = distances(&grid, Position::new(0, 0));
        assert_eq!(dist[&Position::new(0, 0)], 0);
        assert_eq!(dist[&Position::new(15, 15)], 6);
        assert_eq!(dist.len(), 16);
    }
}
