//! Geometry engine for layer shapes.
//!
//! Shapes live on the source integer grid. A [Region] is an immutable, merged
//! set of [Polygon]s kept in canonical form, so two regions covering the same
//! point set compare equal. Boolean operations are delegated to the `geo`
//! crate and snapped back onto the grid.

use std::fmt;

use derive_more::{Add, Sub};
use geo::{BooleanOps, Coord, Intersects, LineString, MultiPolygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source-grid coordinate
pub type Int = i64;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Degenerate polygon with {0} distinct vertices")]
    Degenerate(usize),
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Add, Sub, Serialize, Deserialize,
)]
pub struct Point {
    pub x: Int,
    pub y: Int,
}

impl Point {
    pub fn new(x: Int, y: Int) -> Point {
        Point { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned rectangle with `p0` at the lower-left and `p1` at the upper-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub p0: Point,
    pub p1: Point,
}

impl Rect {
    /// Creates a rectangle spanning two arbitrary corners.
    pub fn new(a: Point, b: Point) -> Rect {
        Rect {
            p0: Point::new(a.x.min(b.x), a.y.min(b.y)),
            p1: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Square of half-width `half` centered on `center`.
    pub fn from_center(center: Point, half: Int) -> Rect {
        let d = Point::new(half, half);
        Rect::new(center - d, center + d)
    }

    pub fn width(&self) -> Int {
        self.p1.x - self.p0.x
    }

    pub fn height(&self) -> Int {
        self.p1.y - self.p0.y
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            p0: Point::new(self.p0.x.min(other.p0.x), self.p0.y.min(other.p0.y)),
            p1: Point::new(self.p1.x.max(other.p1.x), self.p1.y.max(other.p1.y)),
        }
    }

    /// True if the closed rectangles share at least one point.
    pub fn touches(&self, other: &Rect) -> bool {
        self.p0.x <= other.p1.x
            && other.p0.x <= self.p1.x
            && self.p0.y <= other.p1.y
            && other.p0.y <= self.p1.y
    }

    /// Canonical polygon with the same outline. The rectangle must not be degenerate.
    pub fn to_polygon(&self) -> Polygon {
        Polygon {
            hull: vec![
                self.p0,
                Point::new(self.p1.x, self.p0.y),
                self.p1,
                Point::new(self.p0.x, self.p1.y),
            ],
            holes: Vec::new(),
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} - {}", self.p0, self.p1)
    }
}

/// Polygon with an outer hull and optional holes.
///
/// Hulls wind counter-clockwise and holes clockwise; every ring starts at its
/// smallest vertex and carries no repeated or collinear vertices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Polygon {
    hull: Vec<Point>,
    holes: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(points: impl IntoIterator<Item = Point>) -> Result<Polygon, GeometryError> {
        Self::with_holes(points, Vec::<Vec<Point>>::new())
    }

    pub fn with_holes<I, H>(hull: I, holes: H) -> Result<Polygon, GeometryError>
    where
        I: IntoIterator<Item = Point>,
        H: IntoIterator<Item = Vec<Point>>,
    {
        let hull: Vec<Point> = hull.into_iter().collect();
        let n = hull.len();
        let hull = canonical_ring(hull, true).ok_or(GeometryError::Degenerate(n))?;
        let mut holes: Vec<Vec<Point>> = holes
            .into_iter()
            .filter_map(|h| canonical_ring(h, false))
            .collect();
        holes.sort();
        Ok(Polygon { hull, holes })
    }

    pub fn hull(&self) -> &[Point] {
        &self.hull
    }

    pub fn holes(&self) -> &[Vec<Point>] {
        &self.holes
    }

    pub fn bbox(&self) -> Rect {
        let mut bbox = Rect::new(self.hull[0], self.hull[0]);
        for p in &self.hull[1..] {
            bbox = bbox.union(&Rect::new(*p, *p));
        }
        bbox
    }

    /// True if the polygon is exactly its own bounding box.
    pub fn is_box(&self) -> bool {
        self.holes.is_empty() && *self == self.bbox().to_polygon()
    }

    /// Twice the enclosed area, holes excluded.
    pub fn area2(&self) -> i128 {
        signed_area2(&self.hull) + self.holes.iter().map(|h| signed_area2(h)).sum::<i128>()
    }

    /// Edges of the hull and every hole.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        std::iter::once(&self.hull)
            .chain(self.holes.iter())
            .flat_map(|ring| {
                (0..ring.len()).map(move |i| (ring[i], ring[(i + 1) % ring.len()]))
            })
    }

    /// Splits the polygon into horizontal trapezoids.
    ///
    /// The polygon is cut along a horizontal line through every vertex. Each
    /// resulting piece spans one band between two adjacent cut lines; for
    /// rectilinear input every piece is a rectangle.
    pub fn decompose_trapezoids(&self) -> Vec<Polygon> {
        let edges: Vec<(Point, Point)> = self.edges().filter(|(a, b)| a.y != b.y).collect();
        let mut ys: Vec<Int> = edges.iter().flat_map(|(a, b)| [a.y, b.y]).collect();
        ys.sort_unstable();
        ys.dedup();

        let mut pieces = Vec::new();
        for band in ys.windows(2) {
            let (y0, y1) = (band[0], band[1]);
            let mid = (y0 as f64 + y1 as f64) / 2.0;

            let mut crossings: Vec<(f64, Int, Int)> = edges
                .iter()
                .filter(|(a, b)| (a.y.min(b.y) as f64) < mid && mid < (a.y.max(b.y) as f64))
                .map(|(a, b)| (x_at(a, b, mid), x_at(a, b, y0 as f64), x_at(a, b, y1 as f64)))
                .map(|(m, lo, hi)| (m, lo.round() as Int, hi.round() as Int))
                .collect();
            crossings.sort_by(|l, r| l.0.total_cmp(&r.0));

            for pair in crossings.chunks_exact(2) {
                let (left, right) = (pair[0], pair[1]);
                let piece = Polygon::new([
                    Point::new(left.1, y0),
                    Point::new(right.1, y0),
                    Point::new(right.2, y1),
                    Point::new(left.2, y1),
                ]);
                if let Ok(piece) = piece {
                    pieces.push(piece);
                }
            }
        }
        pieces
    }

    fn to_geo(&self) -> geo::Polygon<f64> {
        geo::Polygon::new(
            ring_to_geo(&self.hull),
            self.holes.iter().map(|h| ring_to_geo(h)).collect(),
        )
    }

    fn from_geo(poly: &geo::Polygon<f64>) -> Option<Polygon> {
        let hull = ring_from_geo(poly.exterior());
        let holes = poly.interiors().iter().map(ring_from_geo);
        Polygon::with_holes(hull, holes).ok()
    }
}

impl From<Rect> for Polygon {
    fn from(rect: Rect) -> Polygon {
        rect.to_polygon()
    }
}

/// Immutable merged set of polygons on one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Region {
    polygons: Vec<Polygon>,
}

impl Region {
    pub fn new() -> Region {
        Region::default()
    }

    /// Merges arbitrary, possibly overlapping polygons into a region.
    pub fn from_polygons(polygons: impl IntoIterator<Item = Polygon>) -> Region {
        let mut polygons = polygons.into_iter();
        let first = match polygons.next() {
            Some(p) => p,
            None => return Region::new(),
        };
        let mut merged = MultiPolygon::new(vec![first.to_geo()]);
        for p in polygons {
            merged = merged.union(&MultiPolygon::new(vec![p.to_geo()]));
        }
        Region::from_geo(&merged)
    }

    pub fn from_rects(rects: impl IntoIterator<Item = Rect>) -> Region {
        Region::from_polygons(
            rects
                .into_iter()
                .filter(|r| !r.is_degenerate())
                .map(Polygon::from),
        )
    }

    pub fn from_rect(rect: Rect) -> Region {
        Region::from_rects([rect])
    }

    /// Wraps polygons already known to be disjoint.
    fn from_merged(mut polygons: Vec<Polygon>) -> Region {
        polygons.sort();
        polygons.dedup();
        Region { polygons }
    }

    fn from_geo(multi: &MultiPolygon<f64>) -> Region {
        Region::from_merged(multi.iter().filter_map(Polygon::from_geo).collect())
    }

    fn to_geo(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(self.polygons.iter().map(Polygon::to_geo).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Polygon> {
        self.polygons.iter()
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn bbox(&self) -> Option<Rect> {
        self.polygons
            .iter()
            .map(Polygon::bbox)
            .reduce(|a, b| a.union(&b))
    }

    /// Twice the covered area.
    pub fn area2(&self) -> i128 {
        self.polygons.iter().map(Polygon::area2).sum()
    }

    pub fn union(&self, other: &Region) -> Region {
        match (self.is_empty(), other.is_empty()) {
            (_, true) => self.clone(),
            (true, false) => other.clone(),
            (false, false) => Region::from_geo(&self.to_geo().union(&other.to_geo())),
        }
    }

    /// Set difference `self - other`.
    pub fn minus(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return self.clone();
        }
        Region::from_geo(&self.to_geo().difference(&other.to_geo()))
    }

    pub fn intersection(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return Region::new();
        }
        Region::from_geo(&self.to_geo().intersection(&other.to_geo()))
    }

    /// Polygons of `self` sharing at least one point with `other`.
    ///
    /// Polygons of `self` that meet only at a vertex count as one shape, so a
    /// hit on either selects both.
    pub fn interacting(&self, other: &Region) -> Region {
        let shapes = located(&self.polygons);
        let others = located(&other.polygons);
        let mut hit: Vec<bool> = shapes
            .iter()
            .map(|s| others.iter().any(|o| meets(s, o)))
            .collect();
        let mut frontier: Vec<usize> = (0..shapes.len()).filter(|&i| hit[i]).collect();
        while let Some(i) = frontier.pop() {
            for j in 0..shapes.len() {
                if !hit[j] && meets(&shapes[i], &shapes[j]) {
                    hit[j] = true;
                    frontier.push(j);
                }
            }
        }
        let polygons = self
            .polygons
            .iter()
            .zip(hit)
            .filter_map(|(p, hit)| hit.then(|| p.clone()))
            .collect();
        // A subset of a merged region is itself merged
        Region { polygons }
    }
}

type Located = (Rect, geo::Polygon<f64>);

fn located(polygons: &[Polygon]) -> Vec<Located> {
    polygons.iter().map(|p| (p.bbox(), p.to_geo())).collect()
}

fn meets(a: &Located, b: &Located) -> bool {
    a.0.touches(&b.0) && a.1.intersects(&b.1)
}

impl<'a> IntoIterator for &'a Region {
    type Item = &'a Polygon;
    type IntoIter = std::slice::Iter<'a, Polygon>;

    fn into_iter(self) -> Self::IntoIter {
        self.polygons.iter()
    }
}

fn x_at(a: &Point, b: &Point, y: f64) -> f64 {
    let (ax, ay, bx, by) = (a.x as f64, a.y as f64, b.x as f64, b.y as f64);
    ax + (bx - ax) * (y - ay) / (by - ay)
}

fn cross(o: Point, a: Point, b: Point) -> i128 {
    let (ax, ay) = ((a.x - o.x) as i128, (a.y - o.y) as i128);
    let (bx, by) = ((b.x - o.x) as i128, (b.y - o.y) as i128);
    ax * by - ay * bx
}

fn signed_area2(ring: &[Point]) -> i128 {
    (0..ring.len())
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
            a.x as i128 * b.y as i128 - b.x as i128 * a.y as i128
        })
        .sum()
}

/// Normalizes a ring: drops repeated and collinear vertices, fixes the winding
/// and rotates it to start at its smallest vertex. Returns `None` for rings
/// enclosing no area.
fn canonical_ring(points: Vec<Point>, ccw: bool) -> Option<Vec<Point>> {
    let mut ring = points;
    loop {
        ring.dedup();
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        let n = ring.len();
        if n < 3 {
            return None;
        }
        let kept: Vec<Point> = (0..n)
            .filter(|&i| cross(ring[(i + n - 1) % n], ring[i], ring[(i + 1) % n]) != 0)
            .map(|i| ring[i])
            .collect();
        if kept.len() == n {
            break;
        }
        ring = kept;
    }

    let area = signed_area2(&ring);
    if area == 0 {
        return None;
    }
    if (area > 0) != ccw {
        ring.reverse();
    }
    let start = (0..ring.len()).min_by_key(|&i| ring[i]).unwrap_or(0);
    ring.rotate_left(start);
    Some(ring)
}

fn ring_to_geo(ring: &[Point]) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|p| Coord {
            x: p.x as f64,
            y: p.y as f64,
        })
        .collect();
    if let Some(first) = coords.first().cloned() {
        coords.push(first);
    }
    LineString::new(coords)
}

fn ring_from_geo(ring: &LineString<f64>) -> Vec<Point> {
    ring.coords()
        .map(|c| Point::new(c.x.round() as Int, c.y.round() as Int))
        .collect()
}
