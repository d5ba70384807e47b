//! Pin connectivity resolution.
//!
//! Each label is traced from the conductor polygon under its anchor, through
//! the vias that land on that polygon, onto the other conductor layer and back
//! down through any further vias on the bridging shapes. The resolver works
//! purely on the source grid; scaling happens at assembly.

use crate::collect::{CellLayers, Layer, PinLabel};
use crate::geometry::{Rect, Region};
use crate::warnln;

/// Probe half-width around a label anchor, in grid units
const PROBE: i64 = 1;

/// Pin name to per-layer geometry, in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinGeometry {
    pins: Vec<(String, Vec<(Layer, Region)>)>,
}

impl PinGeometry {
    pub fn new() -> PinGeometry {
        PinGeometry::default()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&[(Layer, Region)]> {
        self.pins
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[(Layer, Region)])> {
        self.pins
            .iter()
            .map(|(n, entries)| (n.as_str(), entries.as_slice()))
    }

    /// Adds geometry for `name`, merging into any earlier entry of the same pin.
    pub fn insert(&mut self, name: &str, entries: Vec<(Layer, Region)>) {
        match self.pins.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => merge_entries(existing, entries),
            None => {
                let mut fresh = Vec::with_capacity(entries.len());
                merge_entries(&mut fresh, entries);
                self.pins.push((name.to_string(), fresh));
            }
        }
    }
}

fn merge_entries(existing: &mut Vec<(Layer, Region)>, entries: Vec<(Layer, Region)>) {
    for (layer, region) in entries {
        match existing.iter_mut().find(|(l, _)| *l == layer) {
            Some((_, current)) => *current = current.union(&region),
            None => existing.push((layer, region)),
        }
    }
}

/// Per-layer union of every shape assigned to a pin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claimed {
    pub m1: Region,
    pub m2: Region,
    pub v1: Region,
}

impl Claimed {
    pub fn region(&self, layer: Layer) -> &Region {
        match layer {
            Layer::M1 => &self.m1,
            Layer::M2 => &self.m2,
            Layer::V1 => &self.v1,
        }
    }

    fn add(&mut self, layer: Layer, region: &Region) {
        let slot = match layer {
            Layer::M1 => &mut self.m1,
            Layer::M2 => &mut self.m2,
            Layer::V1 => &mut self.v1,
        };
        *slot = slot.union(region);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub pins: PinGeometry,
    pub claimed: Claimed,
}

/// Traces every label of `cell` into pin geometry.
///
/// M1 labels run first, then M2 labels. A name seen again has its geometry
/// union-merged into the existing entry, with a warning.
///
/// # Arguments
/// * `cell` - Merged layers and labels of one cell
///
/// # Returns
/// The pins in first-seen order, and the union of every traced shape per
/// layer as the claimed geometry.
pub fn resolve(cell: &CellLayers) -> Resolution {
    let mut resolution = Resolution::default();
    let passes = [
        (Layer::M1, Layer::M2, &cell.m1_labels),
        (Layer::M2, Layer::M1, &cell.m2_labels),
    ];
    for (origin, other, labels) in passes {
        for label in labels {
            let entries = trace(label, origin, other, cell);
            for (layer, region) in &entries {
                resolution.claimed.add(*layer, region);
            }
            if resolution.pins.get(&label.name).is_some() {
                warnln!(
                    "Duplicate label {} in cell {}; merging its geometry",
                    label.name,
                    cell.name
                );
            }
            resolution.pins.insert(&label.name, entries);
        }
    }
    resolution
}

fn trace(label: &PinLabel, origin: Layer, other: Layer, cell: &CellLayers) -> Vec<(Layer, Region)> {
    let conductor = cell.region(origin);
    let via = cell.region(Layer::V1);

    let probe = Region::from_rect(Rect::from_center(label.anchor, PROBE));
    let frag = conductor.interacting(&probe);

    let bridge_via = via.interacting(&frag);
    if bridge_via.is_empty() {
        return vec![(origin, frag)];
    }

    let bridge_other = cell.region(other).interacting(&bridge_via);
    let far_via = via.interacting(&bridge_other).minus(&bridge_via);
    let far_frag = conductor.interacting(&far_via);

    vec![
        (origin, frag.union(&far_frag)),
        (other, bridge_other),
        (Layer::V1, bridge_via.union(&far_via)),
    ]
}
