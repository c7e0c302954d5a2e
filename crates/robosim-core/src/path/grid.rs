//! Uniform free-space grid.
//!
//! Vertices sit every `step` units from the factory origin. A vertex is free
//! when the source's footprint placed there stays inside the factory and
//! overlaps no obstacle. Two orthogonal neighbors are linked only if the
//! footprint can slide between them without touching an obstacle, which
//! keeps routes from tunnelling through walls thinner than a step.

use std::collections::{BTreeMap, BTreeSet};

use crate::component::Component;
use crate::geometry::{Position, PositionedShape, Rectangle};
use crate::path::PathQuery;

pub struct FreeSpaceGrid {
    step: i32,
    footprint: (u32, u32),
    free: BTreeSet<Position>,
    edges: BTreeMap<Position, Vec<Position>>,
}

impl FreeSpaceGrid {
    pub fn build(query: &PathQuery) -> Self {
        let step = query.step.max(1) as i32;
        let (width, height) = query.footprint;
        let bounds = query.bounds;

        let mut candidates = Vec::new();
        let mut y = bounds.top();
        while y + height as i32 <= bounds.bottom() {
            let mut x = bounds.left();
            while x + width as i32 <= bounds.right() {
                candidates.push(Position::new(x, y));
                x += step;
            }
            y += step;
        }

        let is_clear = |rect: Rectangle| clear_of(&query.obstacles, &rect.into());
        let footprint_at = |p: Position| Rectangle::at(p, width, height);

        #[cfg(feature = "parallel")]
        let free: BTreeSet<Position> = {
            use rayon::prelude::*;
            candidates
                .par_iter()
                .copied()
                .filter(|&p| is_clear(footprint_at(p)))
                .collect::<Vec<_>>()
                .into_iter()
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let free: BTreeSet<Position> = candidates
            .into_iter()
            .filter(|&p| is_clear(footprint_at(p)))
            .collect();

        let mut edges: BTreeMap<Position, Vec<Position>> = BTreeMap::new();
        for &p in &free {
            // Link forward only; the sweep is symmetric so both ends get the edge.
            for next in [p.offset(step, 0), p.offset(0, step)] {
                if free.contains(&next) && is_clear(footprint_at(p).swept_to(next)) {
                    edges.entry(p).or_default().push(next);
                    edges.entry(next).or_default().push(p);
                }
            }
        }

        Self {
            step,
            footprint: (width, height),
            free,
            edges,
        }
    }

    pub fn step(&self) -> u32 {
        self.step as u32
    }

    pub fn is_free(&self, p: Position) -> bool {
        self.free.contains(&p)
    }

    pub fn vertex_count(&self) -> usize {
        self.free.len()
    }

    pub fn vertices(&self) -> impl Iterator<Item = Position> + '_ {
        self.free.iter().copied()
    }

    pub fn neighbors(&self, p: Position) -> &[Position] {
        self.edges.get(&p).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The free vertex closest to `p` by Manhattan distance, lowest
    /// position on ties.
    pub fn nearest_vertex(&self, p: Position) -> Option<Position> {
        self.free
            .iter()
            .min_by_key(|v| (v.manhattan_distance(&p), **v))
            .copied()
    }

    /// Free vertices whose footprint overlaps `zone`, in position order.
    pub fn goal_vertices(&self, zone: &PositionedShape) -> Vec<Position> {
        let (width, height) = self.footprint;
        self.free
            .iter()
            .copied()
            .filter(|&v| zone.overlaps_rect(&Rectangle::at(v, width, height)))
            .collect()
    }
}

fn clear_of(obstacles: &[Component], shape: &PositionedShape) -> bool {
    !obstacles.iter().any(|c| c.obstructs(shape))
}
