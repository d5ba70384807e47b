//!
//! # Macro Assembly
//!
//! Converts resolved pin and obstruction regions into a [LefMacro].
//! Classification, scaling and rectangle decomposition all happen here.
//!

use lef21::{
    LefForeign, LefGeometry, LefLayerGeometries, LefMacro, LefMacroClass, LefPin, LefPoint,
    LefPort, LefShape, LefSymmetry,
};
use thiserror::Error;

use crate::collect::{Layer, SiteSize};
use crate::config::{Config, ConfigError, LayerNames, PinClassifier};
use crate::geometry::{Point, Polygon, Rect, Region};
use crate::lef::{self, LefError};
use crate::obstruct::ObstructionGeometry;
use crate::resolve::PinGeometry;
use crate::warnln;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("Non-rectilinear shape {bbox} on {layer} of {owner} in cell {cell}")]
    NonRectilinear {
        cell: String,
        owner: String,
        layer: String,
        bbox: Rect,
    },
    #[error(transparent)]
    Lef(#[from] LefError),
}

/// Per-run settings for [assemble]
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub site: String,
    /// Output units per source grid unit
    pub scaling_factor: f64,
    pub rectangles_only: bool,
    pub strict: bool,
    pub classifier: PinClassifier,
    pub layer_names: LayerNames,
}

impl AssemblyOptions {
    pub fn from_config(config: &Config, dbu_per_micron: f64) -> Result<AssemblyOptions, ConfigError> {
        Ok(AssemblyOptions {
            site: config.site.clone(),
            scaling_factor: config.scaling_factor(dbu_per_micron),
            rectangles_only: config.rectangles_only,
            strict: config.strict,
            classifier: PinClassifier::new(&config.pins)?,
            layer_names: config.layer_names.clone(),
        })
    }
}

pub fn assemble(
    name: &str,
    size: SiteSize,
    pins: &PinGeometry,
    obstructions: &ObstructionGeometry,
    opts: &AssemblyOptions,
) -> Result<LefMacro, AssembleError> {
    MacroAssembler { name, opts }.assemble(size, pins, obstructions)
}

/// # Macro Assembler
#[derive(Debug)]
struct MacroAssembler<'a> {
    name: &'a str,
    opts: &'a AssemblyOptions,
}

impl<'a> MacroAssembler<'a> {
    fn assemble(
        &self,
        size: SiteSize,
        pins: &PinGeometry,
        obstructions: &ObstructionGeometry,
    ) -> Result<LefMacro, AssembleError> {
        lef::check_name(self.name)?;
        let mut lefmac = LefMacro::new(self.name);
        lefmac.class = Some(LefMacroClass::Core { tp: None });
        lefmac.foreign = Some(LefForeign {
            cell_name: self.name.to_string(),
            pt: Some(LefPoint::default()),
            orient: Default::default(),
        });
        lefmac.origin = Some(LefPoint::default());
        let corner = self.export_point(Point::new(size.width, size.height))?;
        lefmac.size = Some((corner.x, corner.y));
        lefmac.symmetry = Some(vec![LefSymmetry::X, LefSymmetry::Y]);
        lefmac.site = Some(self.opts.site.clone());

        for (pin, entries) in pins.iter() {
            lefmac.pins.push(self.export_pin(pin, entries)?);
        }
        // Every obstruction layer lands in the one OBS block
        for (layer, region) in obstructions {
            if let Some(geoms) = self.export_layer_shapes("OBS", *layer, region)? {
                lefmac.obs.push(geoms);
            }
        }
        Ok(lefmac)
    }

    fn export_pin(&self, name: &str, entries: &[(Layer, Region)]) -> Result<LefPin, AssembleError> {
        lef::check_name(name)?;
        let class = self.opts.classifier.classify(name);
        let mut lefport = LefPort::default();
        for (layer, region) in entries {
            if let Some(geoms) = self.export_layer_shapes(name, *layer, region)? {
                lefport.layers.push(geoms);
            }
        }
        if lefport.layers.is_empty() {
            warnln!("Pin {name} of cell {} has no geometry", self.name);
        }
        let mut pin = LefPin::default();
        pin.name = name.to_string();
        pin.direction = Some(class.direction.into());
        pin.use_ = Some(class.use_.into());
        pin.shape = class.shape.map(Into::into);
        pin.ports = vec![lefport];
        Ok(pin)
    }

    /// Exports the polygons of `region`, or `None` if nothing survives.
    fn export_layer_shapes(
        &self,
        owner: &str,
        layer: Layer,
        region: &Region,
    ) -> Result<Option<LefLayerGeometries>, AssembleError> {
        let layer_name = self.opts.layer_names.name(layer);
        let mut geometries = Vec::new();
        for polygon in region {
            if self.opts.rectangles_only {
                for piece in polygon.decompose_trapezoids() {
                    if let Some(rect) = self.rectilinear(owner, layer_name, &piece)? {
                        geometries.push(self.export_rect(&rect)?);
                    }
                }
            } else if polygon.is_box() {
                geometries.push(self.export_rect(&polygon.bbox())?);
            } else if !polygon.holes().is_empty() {
                warnln!(
                    "Shape {} on {layer_name} of {owner} has holes; writing it as trapezoids",
                    polygon.bbox()
                );
                for piece in polygon.decompose_trapezoids() {
                    geometries.push(self.export_polygon(&piece)?);
                }
            } else {
                geometries.push(self.export_polygon(polygon)?);
            }
        }
        if geometries.is_empty() {
            return Ok(None);
        }
        let mut layer_geom = LefLayerGeometries::default();
        layer_geom.layer_name = layer_name.to_string();
        layer_geom.geometries = geometries;
        Ok(Some(layer_geom))
    }

    /// Applies the strict/lenient policy to a decomposed piece.
    fn rectilinear(
        &self,
        owner: &str,
        layer: &str,
        piece: &Polygon,
    ) -> Result<Option<Rect>, AssembleError> {
        if piece.is_box() {
            return Ok(Some(piece.bbox()));
        }
        if self.opts.strict {
            return Err(AssembleError::NonRectilinear {
                cell: self.name.to_string(),
                owner: owner.to_string(),
                layer: layer.to_string(),
                bbox: piece.bbox(),
            });
        }
        warnln!(
            "Dropping non-rectilinear shape {} on {layer} of {owner} in cell {}",
            piece.bbox(),
            self.name
        );
        Ok(None)
    }

    fn export_rect(&self, rect: &Rect) -> Result<LefGeometry, AssembleError> {
        let shape = LefShape::Rect(self.export_point(rect.p0)?, self.export_point(rect.p1)?);
        Ok(LefGeometry::Shape(shape))
    }

    fn export_polygon(&self, polygon: &Polygon) -> Result<LefGeometry, AssembleError> {
        if polygon.is_box() {
            return self.export_rect(&polygon.bbox());
        }
        let points = polygon
            .hull()
            .iter()
            .map(|p| self.export_point(*p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LefGeometry::Shape(LefShape::Polygon(points)))
    }

    fn export_point(&self, p: Point) -> Result<LefPoint, AssembleError> {
        let f = self.opts.scaling_factor;
        Ok(LefPoint::new(
            lef::decimal(p.x as f64 * f)?,
            lef::decimal(p.y as f64 * f)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lef21::{LefDecimal, LefPinDirection, LefPinShape, LefPinUse};

    fn opts() -> AssemblyOptions {
        AssemblyOptions::from_config(&Config::default(), 1000.0).unwrap()
    }

    fn region(x0: i64, y0: i64, x1: i64, y1: i64) -> Region {
        Region::from_rect(Rect::new(Point::new(x0, y0), Point::new(x1, y1)))
    }

    fn triangle() -> Region {
        Region::from_polygons([Polygon::new([
            Point::new(0, 0),
            Point::new(160, 0),
            Point::new(0, 160),
        ])
        .unwrap()])
    }

    fn pins(names: &[&str]) -> PinGeometry {
        let mut pins = PinGeometry::new();
        for (i, name) in names.iter().enumerate() {
            let x = i as i64 * 100;
            pins.insert(name, vec![(Layer::M1, region(x, 0, x + 16, 160))]);
        }
        pins
    }

    fn layer_names(layers: &[LefLayerGeometries]) -> Vec<&str> {
        layers.iter().map(|l| l.layer_name.as_str()).collect()
    }

    #[test]
    fn classifies_pins() {
        let mac = assemble(
            "INVx1",
            SiteSize::default(),
            &pins(&["VDD", "VSS", "Y", "A"]),
            &Vec::new(),
            &opts(),
        )
        .unwrap();
        let classes: Vec<_> = mac
            .pins
            .iter()
            .map(|p| (p.name.as_str(), p.direction.clone(), p.use_, p.shape))
            .collect();
        assert_eq!(
            classes,
            vec![
                (
                    "VDD",
                    Some(LefPinDirection::Inout),
                    Some(LefPinUse::Power),
                    Some(LefPinShape::Abutment)
                ),
                (
                    "VSS",
                    Some(LefPinDirection::Inout),
                    Some(LefPinUse::Ground),
                    Some(LefPinShape::Abutment)
                ),
                (
                    "Y",
                    Some(LefPinDirection::Output { tristate: false }),
                    Some(LefPinUse::Signal),
                    None
                ),
                ("A", Some(LefPinDirection::Inout), Some(LefPinUse::Signal), None),
            ]
        );
    }

    #[test]
    fn scales_geometry_and_size() {
        let obs = vec![(Layer::M2, region(0, 0, 1600, 1600))];
        let size = SiteSize {
            width: 1600,
            height: 3200,
        };
        let mac = assemble("INVx1", size, &PinGeometry::new(), &obs, &opts()).unwrap();
        assert_eq!(mac.size, Some((LefDecimal::from(100), LefDecimal::from(200))));
        assert_eq!(layer_names(&mac.obs), vec!["M2"]);
        assert_eq!(
            mac.obs[0].geometries,
            vec![LefGeometry::Shape(LefShape::Rect(
                LefPoint::new(0, 0),
                LefPoint::new(100, 100)
            ))]
        );
    }

    #[test]
    fn fractional_coordinates_are_rounded() {
        let obs = vec![(Layer::M1, region(0, 0, 1, 3))];
        let mac = assemble("C", SiteSize::default(), &PinGeometry::new(), &obs, &opts()).unwrap();
        match &mac.obs[0].geometries[..] {
            [LefGeometry::Shape(LefShape::Rect(_, p1))] => {
                assert_eq!(p1.to_string(), "0.0625 0.1875")
            }
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn macro_metadata() {
        let mac = assemble(
            "NAND2x1",
            SiteSize::default(),
            &PinGeometry::new(),
            &Vec::new(),
            &opts(),
        )
        .unwrap();
        assert_eq!(mac.class, Some(LefMacroClass::Core { tp: None }));
        let foreign = mac.foreign.as_ref().unwrap();
        assert_eq!(foreign.cell_name, "NAND2x1");
        assert_eq!(foreign.pt, Some(LefPoint::new(0, 0)));
        assert_eq!(mac.origin, Some(LefPoint::new(0, 0)));
        assert_eq!(mac.symmetry, Some(vec![LefSymmetry::X, LefSymmetry::Y]));
        assert_eq!(mac.site.as_deref(), Some("asap7sc7p5t"));
        assert!(mac.obs.is_empty());
    }

    #[test]
    fn strict_rejects_triangle() {
        let obs = vec![(Layer::M1, triangle())];
        let err = assemble("C", SiteSize::default(), &PinGeometry::new(), &obs, &opts());
        assert!(matches!(err, Err(AssembleError::NonRectilinear { .. })));
    }

    #[test]
    fn lenient_drops_triangle() {
        let mut opts = opts();
        opts.strict = false;
        let obs = vec![(Layer::M1, triangle()), (Layer::M2, region(0, 0, 16, 16))];
        let mac = assemble("C", SiteSize::default(), &PinGeometry::new(), &obs, &opts).unwrap();
        assert_eq!(layer_names(&mac.obs), vec!["M2"]);
    }

    #[test]
    fn polygon_mode_keeps_outlines() {
        let mut opts = opts();
        opts.rectangles_only = false;
        opts.scaling_factor = 1.0;
        let obs = vec![(Layer::M1, triangle())];
        let mac = assemble("C", SiteSize::default(), &PinGeometry::new(), &obs, &opts).unwrap();
        match &mac.obs[0].geometries[..] {
            [LefGeometry::Shape(LefShape::Polygon(points))] => assert_eq!(points.len(), 3),
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn empty_pin_is_still_emitted() {
        let mut pins = PinGeometry::new();
        pins.insert("B", vec![(Layer::M1, Region::new())]);
        let mac = assemble("C", SiteSize::default(), &pins, &Vec::new(), &opts()).unwrap();
        assert_eq!(mac.pins.len(), 1);
        assert_eq!(mac.pins[0].ports.len(), 1);
        assert!(mac.pins[0].ports[0].layers.is_empty());
    }

    #[test]
    fn label_with_whitespace_fails_the_cell() {
        let err = assemble("C", SiteSize::default(), &pins(&["A B"]), &Vec::new(), &opts());
        assert!(matches!(
            err,
            Err(AssembleError::Lef(LefError::InvalidName(name))) if name == "A B"
        ));
    }
}
