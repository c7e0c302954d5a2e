//! Integer positions and positioned shapes.
//!
//! Every shape is anchored at the top-left corner of its bounding box.
//! [`PositionedShape::overlaps`] is the single collision predicate used by the
//! arbiter and the path finder. Shapes that merely touch along an edge do not
//! overlap, and the predicate is symmetric for every pair of variants.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// An integer position on the factory floor. Ordered by `(x, y)`; that order
/// is the tie-break wherever the engine picks "the lowest coordinate".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another position.
    pub fn manhattan_distance(&self, other: &Position) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    pub fn offset(self, dx: i32, dy: i32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }
}

// ---------------------------------------------------------------------------
// Rectangle
// ---------------------------------------------------------------------------

/// Axis-aligned rectangle. Covers the half-open ranges
/// `[x, x + width)` and `[y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub origin: Position,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            origin: Position::new(x, y),
            width,
            height,
        }
    }

    pub const fn at(origin: Position, width: u32, height: u32) -> Self {
        Self {
            origin,
            width,
            height,
        }
    }

    pub fn left(&self) -> i32 {
        self.origin.x
    }

    pub fn top(&self) -> i32 {
        self.origin.y
    }

    pub fn right(&self) -> i32 {
        self.origin.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.origin.y + self.height as i32
    }

    /// Open-interval intersection: rectangles sharing only an edge do not
    /// intersect, and empty rectangles intersect nothing.
    pub fn intersects(&self, other: &Rectangle) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if `other` lies entirely within `self` (edges may coincide).
    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        other.left() >= self.left()
            && other.top() >= self.top()
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Strict interior test for a point given in doubled coordinates.
    fn contains_doubled(&self, px: i64, py: i64) -> bool {
        px > 2 * self.left() as i64
            && px < 2 * self.right() as i64
            && py > 2 * self.top() as i64
            && py < 2 * self.bottom() as i64
    }

    /// Grow the rectangle by `by` units on every side.
    pub fn grown(&self, by: u32) -> Rectangle {
        Rectangle::new(
            self.left() - by as i32,
            self.top() - by as i32,
            self.width + 2 * by,
            self.height + 2 * by,
        )
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rectangle) -> Rectangle {
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rectangle::new(left, top, (right - left) as u32, (bottom - top) as u32)
    }

    /// The area covered while sliding this rectangle to `to`.
    pub fn swept_to(&self, to: Position) -> Rectangle {
        self.union(&Rectangle::at(to, self.width, self.height))
    }

    pub fn corners(&self) -> [Position; 4] {
        [
            Position::new(self.left(), self.top()),
            Position::new(self.right(), self.top()),
            Position::new(self.right(), self.bottom()),
            Position::new(self.left(), self.bottom()),
        ]
    }

    fn edges(&self) -> [(Position, Position); 4] {
        let [a, b, c, d] = self.corners();
        [(a, b), (b, c), (c, d), (d, a)]
    }
}

// ---------------------------------------------------------------------------
// Circle
// ---------------------------------------------------------------------------

/// A circle inscribed in the square `[origin, origin + 2 * radius)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Circle {
    pub origin: Position,
    pub radius: u32,
}

impl Circle {
    pub const fn new(x: i32, y: i32, radius: u32) -> Self {
        Self {
            origin: Position::new(x, y),
            radius,
        }
    }

    pub fn center(&self) -> Position {
        self.origin.offset(self.radius as i32, self.radius as i32)
    }

    pub fn bounding_box(&self) -> Rectangle {
        Rectangle::at(self.origin, 2 * self.radius, 2 * self.radius)
    }

    fn overlaps_rect(&self, rect: &Rectangle) -> bool {
        if !self.bounding_box().intersects(rect) {
            return false;
        }
        let center = self.center();
        let nearest_x = center.x.clamp(rect.left(), rect.right());
        let nearest_y = center.y.clamp(rect.top(), rect.bottom());
        let dx = (center.x - nearest_x) as i64;
        let dy = (center.y - nearest_y) as i64;
        let r = self.radius as i64;
        dx * dx + dy * dy < r * r
    }

    fn overlaps_circle(&self, other: &Circle) -> bool {
        if !self.bounding_box().intersects(&other.bounding_box()) {
            return false;
        }
        let (a, b) = (self.center(), other.center());
        let dx = (a.x - b.x) as i64;
        let dy = (a.y - b.y) as i64;
        let reach = (self.radius + other.radius) as i64;
        dx * dx + dy * dy < reach * reach
    }
}

// ---------------------------------------------------------------------------
// Polygon
// ---------------------------------------------------------------------------

/// A simple (non-self-intersecting) polygon with at least three vertices.
/// Only constructible through [`Polygon::new`], which validates the outline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PolygonOutline", into = "PolygonOutline")]
pub struct Polygon {
    vertices: Vec<Position>,
    bounds: Rectangle,
}

#[derive(Serialize, Deserialize)]
struct PolygonOutline {
    vertices: Vec<Position>,
}

impl TryFrom<PolygonOutline> for Polygon {
    type Error = ConfigurationError;

    fn try_from(outline: PolygonOutline) -> Result<Self, Self::Error> {
        Polygon::new(outline.vertices)
    }
}

impl From<Polygon> for PolygonOutline {
    fn from(polygon: Polygon) -> Self {
        PolygonOutline {
            vertices: polygon.vertices,
        }
    }
}

impl Polygon {
    pub fn new(vertices: Vec<Position>) -> Result<Self, ConfigurationError> {
        if vertices.len() < 3 {
            return Err(ConfigurationError::TooFewVertices(vertices.len()));
        }
        let bounds = vertex_bounds(&vertices);
        let polygon = Polygon { vertices, bounds };
        if polygon.self_intersects() {
            return Err(ConfigurationError::SelfIntersectingPolygon);
        }
        Ok(polygon)
    }

    pub fn vertices(&self) -> &[Position] {
        &self.vertices
    }

    pub fn bounding_box(&self) -> Rectangle {
        self.bounds
    }

    fn edges(&self) -> impl Iterator<Item = (Position, Position)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    fn translated_to(&self, to: Position) -> Polygon {
        let dx = to.x - self.bounds.left();
        let dy = to.y - self.bounds.top();
        Polygon {
            vertices: self.vertices.iter().map(|v| v.offset(dx, dy)).collect(),
            bounds: Rectangle::at(to, self.bounds.width, self.bounds.height),
        }
    }

    fn self_intersects(&self) -> bool {
        let edges: Vec<_> = self.edges().collect();
        let n = edges.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let adjacent = j == i + 1 || (i == 0 && j == n - 1);
                if adjacent {
                    continue;
                }
                let (a, b) = edges[i];
                let (c, d) = edges[j];
                if segments_touch(a, b, c, d) {
                    return true;
                }
            }
        }
        false
    }

    /// Even-odd ray cast for a point in doubled coordinates. Points exactly
    /// on the outline may land either way.
    fn contains_doubled(&self, px: i64, py: i64) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            let (ax, ay) = (2 * a.x as i64, 2 * a.y as i64);
            let (bx, by) = (2 * b.x as i64, 2 * b.y as i64);
            if (ay > py) != (by > py) {
                // x coordinate of the crossing, compared without division
                let lhs = (px - ax) * (by - ay);
                let rhs = (bx - ax) * (py - ay);
                if (by > ay && lhs < rhs) || (by < ay && lhs > rhs) {
                    inside = !inside;
                }
            }
        }
        inside
    }

    fn contains_vertex_of(&self, points: &[Position]) -> bool {
        points
            .iter()
            .any(|p| self.contains_doubled(2 * p.x as i64, 2 * p.y as i64))
    }

    fn overlaps_rect(&self, rect: &Rectangle) -> bool {
        if !self.bounds.intersects(rect) {
            return false;
        }
        if self
            .vertices
            .iter()
            .any(|v| rect.contains_doubled(2 * v.x as i64, 2 * v.y as i64))
        {
            return true;
        }
        if self
            .edges()
            .any(|(a, b)| rect.contains_doubled((a.x + b.x) as i64, (a.y + b.y) as i64))
        {
            return true;
        }
        let center = (
            (rect.left() + rect.right()) as i64,
            (rect.top() + rect.bottom()) as i64,
        );
        if rect.width > 0 && rect.height > 0 && self.contains_doubled(center.0, center.1) {
            return true;
        }
        if self.contains_vertex_of(&rect.corners()) && rect.width > 0 && rect.height > 0 {
            return true;
        }
        self.edges().any(|(a, b)| {
            rect.edges()
                .iter()
                .any(|&(c, d)| segments_cross(a, b, c, d))
        })
    }

    fn overlaps_polygon(&self, other: &Polygon) -> bool {
        if !self.bounds.intersects(&other.bounds) {
            return false;
        }
        if self.contains_vertex_of(&other.vertices) || other.contains_vertex_of(&self.vertices) {
            return true;
        }
        let midpoint_inside = |outer: &Polygon, inner: &Polygon| {
            inner
                .edges()
                .any(|(a, b)| outer.contains_doubled((a.x + b.x) as i64, (a.y + b.y) as i64))
        };
        if midpoint_inside(self, other) || midpoint_inside(other, self) {
            return true;
        }
        self.edges()
            .any(|(a, b)| other.edges().any(|(c, d)| segments_cross(a, b, c, d)))
    }
}

fn vertex_bounds(vertices: &[Position]) -> Rectangle {
    let left = vertices.iter().map(|v| v.x).min().unwrap_or(0);
    let right = vertices.iter().map(|v| v.x).max().unwrap_or(0);
    let top = vertices.iter().map(|v| v.y).min().unwrap_or(0);
    let bottom = vertices.iter().map(|v| v.y).max().unwrap_or(0);
    Rectangle::new(left, top, (right - left) as u32, (bottom - top) as u32)
}

fn orientation(a: Position, b: Position, c: Position) -> i64 {
    let abx = (b.x - a.x) as i64;
    let aby = (b.y - a.y) as i64;
    let acx = (c.x - a.x) as i64;
    let acy = (c.y - a.y) as i64;
    (abx * acy - aby * acx).signum()
}

/// Proper crossing: each segment strictly separates the other's endpoints.
fn segments_cross(a: Position, b: Position, c: Position, d: Position) -> bool {
    orientation(a, b, c) * orientation(a, b, d) < 0 && orientation(c, d, a) * orientation(c, d, b) < 0
}

fn on_segment(a: Position, b: Position, p: Position) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Inclusive intersection test, counting shared points and collinear overlap.
fn segments_touch(a: Position, b: Position, c: Position, d: Position) -> bool {
    let (o1, o2) = (orientation(a, b, c), orientation(a, b, d));
    let (o3, o4) = (orientation(c, d, a), orientation(c, d, b));
    if o1 * o2 < 0 && o3 * o4 < 0 {
        return true;
    }
    (o1 == 0 && on_segment(a, b, c))
        || (o2 == 0 && on_segment(a, b, d))
        || (o3 == 0 && on_segment(c, d, a))
        || (o4 == 0 && on_segment(c, d, b))
}

// ---------------------------------------------------------------------------
// PositionedShape
// ---------------------------------------------------------------------------

/// A shape anchored on the floor. Tagged with `"type"` when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionedShape {
    Rectangle(Rectangle),
    Circle(Circle),
    Polygon(Polygon),
}

impl From<Rectangle> for PositionedShape {
    fn from(rect: Rectangle) -> Self {
        PositionedShape::Rectangle(rect)
    }
}

impl From<Circle> for PositionedShape {
    fn from(circle: Circle) -> Self {
        PositionedShape::Circle(circle)
    }
}

impl From<Polygon> for PositionedShape {
    fn from(polygon: Polygon) -> Self {
        PositionedShape::Polygon(polygon)
    }
}

impl PositionedShape {
    /// Anchor: top-left corner of the bounding box.
    pub fn position(&self) -> Position {
        self.bounding_box().origin
    }

    pub fn bounding_box(&self) -> Rectangle {
        match self {
            PositionedShape::Rectangle(r) => *r,
            PositionedShape::Circle(c) => c.bounding_box(),
            PositionedShape::Polygon(p) => p.bounding_box(),
        }
    }

    pub fn width(&self) -> u32 {
        self.bounding_box().width
    }

    pub fn height(&self) -> u32 {
        self.bounding_box().height
    }

    /// The same shape with its anchor moved to `to`.
    pub fn translated_to(&self, to: Position) -> PositionedShape {
        match self {
            PositionedShape::Rectangle(r) => Rectangle::at(to, r.width, r.height).into(),
            PositionedShape::Circle(c) => Circle {
                origin: to,
                radius: c.radius,
            }
            .into(),
            PositionedShape::Polygon(p) => p.translated_to(to).into(),
        }
    }

    pub fn overlaps(&self, other: &PositionedShape) -> bool {
        use PositionedShape as S;
        match (self, other) {
            (S::Rectangle(a), S::Rectangle(b)) => a.intersects(b),
            (S::Rectangle(r), S::Circle(c)) | (S::Circle(c), S::Rectangle(r)) => c.overlaps_rect(r),
            (S::Circle(a), S::Circle(b)) => a.overlaps_circle(b),
            (S::Polygon(a), S::Polygon(b)) => a.overlaps_polygon(b),
            (S::Polygon(p), other) | (other, S::Polygon(p)) => {
                p.overlaps_rect(&other.bounding_box())
            }
        }
    }

    pub fn overlaps_rect(&self, rect: &Rectangle) -> bool {
        self.overlaps(&PositionedShape::Rectangle(*rect))
    }
}
