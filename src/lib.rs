pub mod assemble;
pub mod batch;
pub mod collect;
pub mod config;
pub mod export;
pub mod gds;
pub mod geometry;
pub mod lef;
pub mod obstruct;
pub mod resolve;

use dialoguer::Confirm;
use serde::Serialize;
use thiserror::Error;

pub const VER: &str = env!("CARGO_PKG_VERSION");

#[macro_export]
macro_rules! errorln {
    ($($arg:tt)*) => {
        eprintln!("\x1b[31mERROR: {}\x1b[0m", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! warnln {
    ($($arg:tt)*) => {
        eprintln!("\x1b[33mWARNING: {}\x1b[0m", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! infoln {
    ($($arg:tt)*) => {
        eprintln!("\x1b[32mINFO: {}\x1b[0m", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! vprintln {
    ($verbose:expr, $($arg:tt)*) => {
        if $verbose {
            println!($($arg)*);
        }
    };
}

#[derive(Debug, Error)]
pub enum LefgenError {
    #[error(transparent)]
    Gds(#[from] gds::GdsError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Lef(#[from] lef::LefError),
    #[error(transparent)]
    Assemble(#[from] assemble::AssembleError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

pub type LefgenResult<T> = Result<T, LefgenError>;

pub enum QueryDefault {
    Yes,
    No,
}

/// Asks a yes/no question. Non-interactive runs take `default` without asking.
pub fn query(prompt: &str, interactive: bool, default: QueryDefault) -> LefgenResult<bool> {
    let default = matches!(default, QueryDefault::Yes);
    if !interactive {
        return Ok(default);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

/// Outcome of one cell
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub file: String,
    pub cell: String,
    pub pins: usize,
    pub obstructions: usize,
    pub ok: bool,
    /// Output path on success, error message on failure
    pub detail: String,
}

impl Report {
    pub fn failure(file: &str, cell: &str, err: &LefgenError) -> Report {
        Report {
            file: file.to_string(),
            cell: cell.to_string(),
            pins: 0,
            obstructions: 0,
            ok: false,
            detail: err.to_string(),
        }
    }
}

pub type Reports = Vec<Report>;
