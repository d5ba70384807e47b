use crate::collect::{CellLayers, Layer};
use crate::geometry::Region;
use crate::resolve::Claimed;

/// Unclaimed shapes per layer, non-empty layers only, in [Layer::ALL] order
pub type ObstructionGeometry = Vec<(Layer, Region)>;

pub fn obstructions(cell: &CellLayers, claimed: &Claimed) -> ObstructionGeometry {
    Layer::ALL
        .iter()
        .map(|&layer| (layer, cell.region(layer).minus(claimed.region(layer))))
        .filter(|(_, region)| !region.is_empty())
        .collect()
}
