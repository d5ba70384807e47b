use gds21::{GdsBoundary, GdsBox, GdsElement, GdsLibrary, GdsPath, GdsPoint, GdsTextElem};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::collect::PinLabel;
use crate::config::LayerSpec;
use crate::geometry::{Int, Point, Polygon, Rect};
use crate::warnln;

#[derive(Debug, Error)]
pub enum GdsError {
    #[error("Cell not found: {0}")]
    InvalidCell(String),
    #[error("Failed to read layout {0}: {1}")]
    Load(String, String),
    #[error("Invalid database unit in {0}: {1}")]
    Units(String, f64),
}

/// Read access to one layout file.
///
/// The collector only sees cells, per-layer shapes and labels through this
/// trait, so anything that can answer these queries can feed the pipeline.
pub trait LayoutSource {
    /// Name used in reports, usually the file name
    fn name(&self) -> &str;

    /// Top cells in file order
    fn cells(&self) -> Vec<String>;

    /// Source grid units per micron
    fn dbu_per_micron(&self) -> f64;

    /// Every shape of `cell` on `layer`, as polygons
    fn shapes(&self, cell: &str, layer: LayerSpec) -> Result<Vec<Polygon>, GdsError>;

    /// Every text label of `cell` on `layer`
    fn labels(&self, cell: &str, layer: LayerSpec) -> Result<Vec<PinLabel>, GdsError>;
}

/// [LayoutSource] backed by a GDSII library
#[derive(Debug, Clone)]
pub struct GdsSource {
    name: String,
    db_unit: f64,
    order: Vec<String>,
    cells: HashMap<String, Vec<GdsElement>>,
}

impl GdsSource {
    pub fn load(path: &Path) -> Result<GdsSource, GdsError> {
        let name = path.display().to_string();
        let lib = GdsLibrary::load(path).map_err(|e| GdsError::Load(name.clone(), e.to_string()))?;
        GdsSource::from_library(name, lib)
    }

    pub fn from_library(name: impl Into<String>, lib: GdsLibrary) -> Result<GdsSource, GdsError> {
        let name = name.into();
        let db_unit = lib.units.db_unit();
        if !(db_unit > 0.0) {
            return Err(GdsError::Units(name, db_unit));
        }
        let order = lib.structs.iter().map(|s| s.name.clone()).collect();
        Ok(GdsSource {
            name,
            db_unit,
            order,
            cells: hash_lib(lib),
        })
    }

    fn elems(&self, cell: &str) -> Result<&[GdsElement], GdsError> {
        self.cells
            .get(cell)
            .map(|e| e.as_slice())
            .ok_or_else(|| GdsError::InvalidCell(cell.to_string()))
    }
}

impl LayoutSource for GdsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn cells(&self) -> Vec<String> {
        let referenced: HashSet<&str> = self
            .cells
            .values()
            .flatten()
            .filter_map(|elem| match elem {
                GdsElement::GdsStructRef(s) => Some(s.name.as_str()),
                GdsElement::GdsArrayRef(a) => Some(a.name.as_str()),
                _ => None,
            })
            .collect();
        self.order
            .iter()
            .filter(|name| !referenced.contains(name.as_str()))
            .cloned()
            .collect()
    }

    fn dbu_per_micron(&self) -> f64 {
        let dbu = 1e-6 / self.db_unit;
        // Snap float noise from the unit record (1e-6 / 1e-9 is not exactly 1000)
        if (dbu - dbu.round()).abs() < 1e-6 {
            dbu.round()
        } else {
            dbu
        }
    }

    fn shapes(&self, cell: &str, layer: LayerSpec) -> Result<Vec<Polygon>, GdsError> {
        let mut shapes = Vec::new();
        for elem in self.elems(cell)? {
            match elem {
                GdsElement::GdsBoundary(b) if on_layer(layer, b.layer, b.datatype) => {
                    shapes.extend(boundary(cell, b));
                }
                GdsElement::GdsBox(b) if on_layer(layer, b.layer, b.boxtype) => {
                    shapes.extend(gds_box(b));
                }
                GdsElement::GdsPath(p) if on_layer(layer, p.layer, p.datatype) => {
                    shapes.extend(path(cell, p).into_iter().map(|r| r.to_polygon()));
                }
                _ => {}
            }
        }
        Ok(shapes)
    }

    fn labels(&self, cell: &str, layer: LayerSpec) -> Result<Vec<PinLabel>, GdsError> {
        Ok(self
            .elems(cell)?
            .iter()
            .filter_map(|elem| match elem {
                GdsElement::GdsTextElem(t) if on_layer(layer, t.layer, t.texttype) => Some(label(t)),
                _ => None,
            })
            .collect())
    }
}

pub fn hash_lib(lib: GdsLibrary) -> HashMap<String, Vec<GdsElement>> {
    // Hash cells by name for fast lookup
    lib.structs.into_iter().map(|s| (s.name, s.elems)).collect()
}

fn on_layer(spec: LayerSpec, layer: i16, datatype: i16) -> bool {
    spec.layer == layer && spec.datatype == datatype
}

fn point(p: &GdsPoint) -> Point {
    Point::new(p.x as Int, p.y as Int)
}

fn boundary(cell: &str, b: &GdsBoundary) -> Option<Polygon> {
    match Polygon::new(b.xy.iter().map(point)) {
        Ok(polygon) => Some(polygon),
        Err(e) => {
            warnln!("Skipping boundary on {}/{} in cell {cell}: {e}", b.layer, b.datatype);
            None
        }
    }
}

fn gds_box(b: &GdsBox) -> Option<Polygon> {
    let rect = b
        .xy
        .iter()
        .map(|p| Rect::new(point(p), point(p)))
        .reduce(|a, r| a.union(&r))?;
    (!rect.is_degenerate()).then(|| rect.to_polygon())
}

fn label(t: &GdsTextElem) -> PinLabel {
    PinLabel {
        name: t.string.trim().to_string(),
        anchor: point(&t.xy),
    }
}

/// Converts a Manhattan path into one rectangle per segment.
fn path(cell: &str, p: &GdsPath) -> Vec<Rect> {
    let width = p.width.unwrap_or(0).abs() as Int;
    if width == 0 || p.xy.len() < 2 {
        return Vec::new();
    }
    // Odd widths put the extra unit above or right of the centerline
    let side = (width / 2, width - width / 2);
    let reach = side.1;
    let (begin, end) = match p.path_type.unwrap_or(0) {
        1 | 2 => (reach, reach),
        4 => (
            p.begin_extn.unwrap_or(0) as Int,
            p.end_extn.unwrap_or(0) as Int,
        ),
        _ => (0, 0),
    };

    let last = p.xy.len() - 2;
    let mut rects = Vec::new();
    for (i, seg) in p.xy.windows(2).enumerate() {
        let (a, b) = (point(&seg[0]), point(&seg[1]));
        if a == b {
            continue;
        }
        if a.x != b.x && a.y != b.y {
            warnln!("Skipping non-Manhattan path segment {a} - {b} in cell {cell}");
            continue;
        }
        // Interior joints extend far enough to cover the corner
        let head = if i == 0 { begin } else { reach };
        let tail = if i == last { end } else { reach };
        rects.push(segment(a, b, side, head, tail));
    }
    rects
}

fn segment(a: Point, b: Point, (lo, hi): (Int, Int), head: Int, tail: Int) -> Rect {
    let (dx, dy) = ((b.x - a.x).signum(), (b.y - a.y).signum());
    let start = a - Point::new(dx * head, dy * head);
    let stop = b + Point::new(dx * tail, dy * tail);
    // Perpendicular extent
    let below = Point::new(dy.abs() * lo, dx.abs() * lo);
    let above = Point::new(dy.abs() * hi, dx.abs() * hi);
    let rect = Rect::new(start, stop);
    Rect::new(rect.p0 - below, rect.p1 + above)
}
