//! Run configuration: layer map, pin classification table and output options.
//!
//! Configuration files are YAML or JSON, chosen by extension. Every field has
//! a default, so an empty file (or no file at all) reproduces the stock ASAP7
//! flow.

use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collect::Layer;
use crate::lef::{PinDirection, PinShape, PinUse};
use crate::LefgenResult;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported configuration file extension: {0}")]
    FileType(String),
    #[error("Invalid pin pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("{0} must be a positive number")]
    NonPositive(&'static str),
}

/// GDS (layer, datatype) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerSpec {
    pub layer: i16,
    pub datatype: i16,
}

impl LayerSpec {
    pub const fn new(layer: i16, datatype: i16) -> LayerSpec {
        LayerSpec { layer, datatype }
    }
}

/// Logical to physical layer map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerMap {
    pub m1: LayerSpec,
    pub m1_label: LayerSpec,
    pub m2: LayerSpec,
    pub m2_label: LayerSpec,
    pub v1: LayerSpec,
    /// Marker layer whose extent sets the cell size
    pub boundary: LayerSpec,
}

impl Default for LayerMap {
    fn default() -> Self {
        LayerMap {
            m1: LayerSpec::new(19, 0),
            m1_label: LayerSpec::new(19, 251),
            m2: LayerSpec::new(20, 0),
            m2_label: LayerSpec::new(20, 251),
            v1: LayerSpec::new(21, 0),
            boundary: LayerSpec::new(13, 0),
        }
    }
}

/// Layer names written to LEF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerNames {
    pub m1: String,
    pub m2: String,
    pub v1: String,
}

impl Default for LayerNames {
    fn default() -> Self {
        LayerNames {
            m1: "M1".into(),
            m2: "M2".into(),
            v1: "V1".into(),
        }
    }
}

impl LayerNames {
    pub fn name(&self, layer: Layer) -> &str {
        match layer {
            Layer::M1 => &self.m1,
            Layer::M2 => &self.m2,
            Layer::V1 => &self.v1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One file per cell
    Separate,
    /// Every cell appended to one library file
    Merged,
}

/// Direction, use and shape assigned to a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinClass {
    pub direction: PinDirection,
    #[serde(rename = "use")]
    pub use_: PinUse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<PinShape>,
}

impl PinClass {
    pub const fn new(direction: PinDirection, use_: PinUse, shape: Option<PinShape>) -> PinClass {
        PinClass {
            direction,
            use_,
            shape,
        }
    }
}

/// One row of the classification table; `pattern` must match the whole pin name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinRule {
    pub pattern: String,
    #[serde(flatten)]
    pub class: PinClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinTable {
    pub rules: Vec<PinRule>,
    pub default: PinClass,
}

impl Default for PinTable {
    fn default() -> Self {
        let rule = |pattern: &str, class| PinRule {
            pattern: pattern.into(),
            class,
        };
        PinTable {
            rules: vec![
                rule(
                    "VDD",
                    PinClass::new(PinDirection::Inout, PinUse::Power, Some(PinShape::Abutment)),
                ),
                rule(
                    "VSS",
                    PinClass::new(PinDirection::Inout, PinUse::Ground, Some(PinShape::Abutment)),
                ),
                rule("Y", PinClass::new(PinDirection::Output, PinUse::Signal, None)),
            ],
            default: PinClass::new(PinDirection::Inout, PinUse::Signal, None),
        }
    }
}

/// Compiled [PinTable]. First matching rule wins.
#[derive(Debug, Clone)]
pub struct PinClassifier {
    rules: Vec<(Regex, PinClass)>,
    default: PinClass,
}

impl PinClassifier {
    pub fn new(table: &PinTable) -> Result<PinClassifier, ConfigError> {
        let rules = table
            .rules
            .iter()
            .map(|rule| {
                Regex::new(&format!("^(?:{})$", rule.pattern))
                    .map(|re| (re, rule.class))
                    .map_err(|source| ConfigError::Pattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PinClassifier {
            rules,
            default: table.default,
        })
    }

    pub fn classify(&self, name: &str) -> PinClass {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(name))
            .map(|(_, class)| *class)
            .unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layers: LayerMap,
    pub layer_names: LayerNames,
    pub pins: PinTable,
    pub site: String,
    /// Output length units per micron
    pub units_per_micron: f64,
    /// Extra divisor applied on top of the unit conversion
    pub scale_divisor: f64,
    /// Decompose every shape into rectangles
    pub rectangles_only: bool,
    /// Fail a cell on non-rectilinear shapes instead of dropping them
    pub strict: bool,
    pub mode: OutputMode,
    /// Library file name used in merged mode
    pub library: String,
    pub extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            layers: LayerMap::default(),
            layer_names: LayerNames::default(),
            pins: PinTable::default(),
            site: "asap7sc7p5t".into(),
            units_per_micron: 1000.0,
            scale_divisor: 16.0,
            rectangles_only: true,
            strict: true,
            mode: OutputMode::Separate,
            library: "asap7sc7p5t_28_L_1x_220121a".into(),
            extension: "lef".into(),
        }
    }
}

impl Config {
    /// Output units per source grid unit
    pub fn scaling_factor(&self, dbu_per_micron: f64) -> f64 {
        self.units_per_micron / dbu_per_micron / self.scale_divisor
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.units_per_micron > 0.0) {
            return Err(ConfigError::NonPositive("units_per_micron"));
        }
        if !(self.scale_divisor > 0.0) {
            return Err(ConfigError::NonPositive("scale_divisor"));
        }
        PinClassifier::new(&self.pins)?;
        Ok(())
    }

    /// Path of the merged library file in `dir`
    pub fn library_file(&self, dir: &Path) -> std::path::PathBuf {
        dir.join(format!("{}.{}", self.library, self.extension))
    }
}

/// Reads a [Config] from a YAML or JSON file.
pub fn read(filename: &Path) -> LefgenResult<Config> {
    let ext = filename
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let file = fs::File::open(filename)?;
    let rdr = io::BufReader::new(file);

    let config: Config = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_reader(rdr)?,
        "json" => serde_json::from_reader(rdr)?,
        other => return Err(ConfigError::FileType(other.to_string()).into()),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_classification() {
        let classifier = PinClassifier::new(&PinTable::default()).unwrap();
        assert_eq!(
            classifier.classify("VDD"),
            PinClass::new(PinDirection::Inout, PinUse::Power, Some(PinShape::Abutment))
        );
        assert_eq!(
            classifier.classify("VSS"),
            PinClass::new(PinDirection::Inout, PinUse::Ground, Some(PinShape::Abutment))
        );
        assert_eq!(
            classifier.classify("Y"),
            PinClass::new(PinDirection::Output, PinUse::Signal, None)
        );
        assert_eq!(
            classifier.classify("A"),
            PinClass::new(PinDirection::Inout, PinUse::Signal, None)
        );
        // Whole-name matches only
        assert_eq!(classifier.classify("VDDA").use_, PinUse::Signal);
    }

    #[test]
    fn scaling_factor_matches_asap7_flow() {
        let config = Config::default();
        assert_eq!(config.scaling_factor(1000.0), 0.0625);
    }

    #[test]
    fn yaml_overrides_keep_defaults() {
        let text = r#"
site: coreSite
mode: merged
layers:
  v1: { layer: 25, datatype: 0 }
pins:
  rules:
    - { pattern: "VDD|VPWR", direction: inout, use: power, shape: abutment }
    - { pattern: "CLK", direction: input, use: clock }
"#;
        let config: Config = serde_yaml::from_str(text).unwrap();
        assert_eq!(config.site, "coreSite");
        assert_eq!(config.mode, OutputMode::Merged);
        assert_eq!(config.layers.v1, LayerSpec::new(25, 0));
        assert_eq!(config.layers.m1, LayerSpec::new(19, 0));
        assert_eq!(config.scale_divisor, 16.0);

        let classifier = PinClassifier::new(&config.pins).unwrap();
        assert_eq!(classifier.classify("VPWR").use_, PinUse::Power);
        assert_eq!(classifier.classify("CLK").direction, PinDirection::Input);
        assert_eq!(classifier.classify("Y").direction, PinDirection::Inout);
    }

    #[test]
    fn bad_pattern_is_reported() {
        let mut table = PinTable::default();
        table.rules[0].pattern = "(".into();
        assert!(matches!(
            PinClassifier::new(&table),
            Err(ConfigError::Pattern { .. })
        ));
    }

    #[test]
    fn reads_json_and_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("flow.json");
        fs::write(&json, r#"{ "units_per_micron": 2000, "strict": false }"#).unwrap();
        let config = read(&json).unwrap();
        assert_eq!(config.units_per_micron, 2000.0);
        assert!(!config.strict);

        let toml = dir.path().join("flow.toml");
        fs::write(&toml, "").unwrap();
        assert!(read(&toml).is_err());
    }
}
