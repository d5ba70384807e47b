//!
//! # LEF Glue
//!
//! Pin-table enums as they appear in configuration files, their lef21
//! counterparts, and conversion of output distances into [LefDecimal]s.
//!

use lef21::{LefDecimal, LefLibrary, LefPinDirection, LefPinShape, LefPinUse};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decimal places kept in output distances
const PRECISION: u32 = 6;

#[derive(Debug, Error)]
pub enum LefError {
    #[error("Invalid LEF identifier: {0:?}")]
    InvalidName(String),
    #[error("Distance {0} cannot be written to LEF")]
    Number(f64),
    #[error("Could not write LEF: {0}")]
    Write(String),
}

pub type LefResult<T> = Result<T, LefError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinDirection {
    Input,
    Output,
    Inout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinUse {
    Signal,
    Power,
    Ground,
    Clock,
    Analog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinShape {
    Abutment,
    Ring,
    Feedthru,
}

impl From<PinDirection> for LefPinDirection {
    fn from(dir: PinDirection) -> Self {
        match dir {
            PinDirection::Input => LefPinDirection::Input,
            PinDirection::Output => LefPinDirection::Output { tristate: false },
            PinDirection::Inout => LefPinDirection::Inout,
        }
    }
}

impl From<PinUse> for LefPinUse {
    fn from(use_: PinUse) -> Self {
        match use_ {
            PinUse::Signal => LefPinUse::Signal,
            PinUse::Power => LefPinUse::Power,
            PinUse::Ground => LefPinUse::Ground,
            PinUse::Clock => LefPinUse::Clock,
            PinUse::Analog => LefPinUse::Analog,
        }
    }
}

impl From<PinShape> for LefPinShape {
    fn from(shape: PinShape) -> Self {
        match shape {
            PinShape::Abutment => LefPinShape::Abutment,
            PinShape::Ring => LefPinShape::Ring,
            PinShape::Feedthru => LefPinShape::FeedThru,
        }
    }
}

/// Rounds `val` to the output precision, without trailing zeros.
pub fn decimal(val: f64) -> LefResult<LefDecimal> {
    LefDecimal::from_f64_retain(val)
        .map(|d| d.round_dp(PRECISION).normalize())
        .ok_or(LefError::Number(val))
}

/// Rejects names LEF cannot carry as a single token.
pub fn check_name(name: &str) -> LefResult<()> {
    let invalid = |c: char| c.is_whitespace() || c == ';' || c == '#' || c == '"';
    if name.is_empty() || name.chars().any(invalid) {
        return Err(LefError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Encodes `lib` as LEF text.
pub fn to_string(lib: &LefLibrary) -> LefResult<String> {
    // lef21 errors carry no Display and are not Send
    lib.to_string().map_err(|e| LefError::Write(format!("{e:?}")))
}
