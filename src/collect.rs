//! Layer collection: per-cell merged regions, pin labels and site size.

use serde::{Deserialize, Serialize};

use crate::config::LayerMap;
use crate::gds::{GdsError, LayoutSource};
use crate::geometry::{Int, Point, Region};
use crate::warnln;

/// Conductor and via layer roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    M1,
    M2,
    V1,
}

impl Layer {
    /// Output order for obstructions
    pub const ALL: [Layer; 3] = [Layer::M1, Layer::M2, Layer::V1];
}

/// Named text marker on a conductor label layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinLabel {
    pub name: String,
    pub anchor: Point,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteSize {
    pub width: Int,
    pub height: Int,
}

/// Everything the resolver needs from one cell
#[derive(Debug, Clone, Default)]
pub struct CellLayers {
    pub name: String,
    pub m1: Region,
    pub m2: Region,
    pub v1: Region,
    pub m1_labels: Vec<PinLabel>,
    pub m2_labels: Vec<PinLabel>,
    pub size: SiteSize,
}

impl CellLayers {
    pub fn region(&self, layer: Layer) -> &Region {
        match layer {
            Layer::M1 => &self.m1,
            Layer::M2 => &self.m2,
            Layer::V1 => &self.v1,
        }
    }
}

/// Reads the layers of `cell` that the resolver works on.
///
/// # Arguments
/// * `source` - Layout holding the cell
/// * `cell` - Cell name, as listed by [LayoutSource::cells]
/// * `layers` - GDS layer and datatype for each role
///
/// # Returns
/// Merged M1, M2 and V1 regions, the labels on both label layers, and the
/// upper-right corner of the boundary shapes as the site size. A cell with
/// no boundary shapes gets a zero size and a warning.
pub fn collect<S: LayoutSource + ?Sized>(
    source: &S,
    cell: &str,
    layers: &LayerMap,
) -> Result<CellLayers, GdsError> {
    let merged = |spec| source.shapes(cell, spec).map(Region::from_polygons);

    let boundary = source.shapes(cell, layers.boundary)?;
    let size = boundary
        .iter()
        .map(|p| p.bbox().p1)
        .reduce(|a, b| Point::new(a.x.max(b.x), a.y.max(b.y)))
        .map(|corner| SiteSize {
            width: corner.x,
            height: corner.y,
        });
    let size = match size {
        Some(size) => size,
        None => {
            warnln!("No boundary shapes in cell {cell}; using a zero size");
            SiteSize::default()
        }
    };

    Ok(CellLayers {
        name: cell.to_string(),
        m1: merged(layers.m1)?,
        m2: merged(layers.m2)?,
        v1: merged(layers.v1)?,
        m1_labels: source.labels(cell, layers.m1_label)?,
        m2_labels: source.labels(cell, layers.m2_label)?,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerSpec;
    use crate::geometry::{Polygon, Rect};
    use std::collections::HashMap;

    /// In-memory layout keyed by (layer, datatype)
    #[derive(Default)]
    struct MemSource {
        pub shapes: HashMap<LayerSpec, Vec<Polygon>>,
        pub labels: HashMap<LayerSpec, Vec<PinLabel>>,
    }

    impl MemSource {
        pub fn rect(&mut self, spec: LayerSpec, x0: Int, y0: Int, x1: Int, y1: Int) -> &mut Self {
            let rect = Rect::new(Point::new(x0, y0), Point::new(x1, y1));
            self.shapes.entry(spec).or_default().push(rect.to_polygon());
            self
        }

        pub fn label(&mut self, spec: LayerSpec, name: &str, x: Int, y: Int) -> &mut Self {
            self.labels.entry(spec).or_default().push(PinLabel {
                name: name.into(),
                anchor: Point::new(x, y),
            });
            self
        }
    }

    impl LayoutSource for MemSource {
        fn name(&self) -> &str {
            "memory"
        }

        fn cells(&self) -> Vec<String> {
            vec!["CELL".into()]
        }

        fn dbu_per_micron(&self) -> f64 {
            1000.0
        }

        fn shapes(&self, _cell: &str, layer: LayerSpec) -> Result<Vec<Polygon>, GdsError> {
            Ok(self.shapes.get(&layer).cloned().unwrap_or_default())
        }

        fn labels(&self, _cell: &str, layer: LayerSpec) -> Result<Vec<PinLabel>, GdsError> {
            Ok(self.labels.get(&layer).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn merges_layers_and_sizes_cell() {
        let map = LayerMap::default();
        let mut src = MemSource::default();
        src.rect(map.m1, 0, 0, 10, 10)
            .rect(map.m1, 10, 0, 20, 10)
            .rect(map.v1, 2, 2, 4, 4)
            .rect(map.boundary, 0, 0, 1600, 800)
            .rect(map.boundary, 0, 0, 800, 1200)
            .label(map.m1_label, "A", 5, 5);

        let cell = collect(&src, "CELL", &map).unwrap();
        assert_eq!(cell.m1.len(), 1);
        assert_eq!(
            cell.m1.bbox(),
            Some(Rect::new(Point::new(0, 0), Point::new(20, 10)))
        );
        assert!(cell.m2.is_empty());
        assert_eq!(cell.v1.len(), 1);
        assert_eq!(cell.m1_labels.len(), 1);
        assert!(cell.m2_labels.is_empty());
        assert_eq!(
            cell.size,
            SiteSize {
                width: 1600,
                height: 1200
            }
        );
    }

    #[test]
    fn missing_boundary_gives_zero_size() {
        let map = LayerMap::default();
        let mut src = MemSource::default();
        src.rect(map.m1, 0, 0, 10, 10);
        let cell = collect(&src, "CELL", &map).unwrap();
        assert_eq!(cell.size, SiteSize::default());
    }
}
