//! Batch driver: every top cell of every layout file in a directory.

use lef21::LefMacro;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assemble::{assemble, AssemblyOptions};
use crate::collect::collect;
use crate::config::{Config, OutputMode};
use crate::export::{self, MergedWriter};
use crate::gds::{GdsSource, LayoutSource};
use crate::obstruct::obstructions;
use crate::resolve::resolve;
use crate::{errorln, vprintln, LefgenError, LefgenResult, Report, Reports};

const LAYOUT_EXTENSIONS: [&str; 3] = ["gds", "gds2", "gdsii"];

fn is_layout(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| LAYOUT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Layout files under `input`, recursively, in sorted order. A single file is
/// returned as-is.
pub fn layout_files(input: &Path) -> LefgenResult<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut files = Vec::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(input)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            files.extend(layout_files(&path)?);
        } else if is_layout(&path) {
            files.push(path);
        }
    }
    Ok(files)
}

/// Runs the full pipeline on one cell.
pub fn process_cell<S: LayoutSource + ?Sized>(
    source: &S,
    cell: &str,
    config: &Config,
    opts: &AssemblyOptions,
) -> LefgenResult<LefMacro> {
    let layers = collect(source, cell, &config.layers)?;
    let resolution = resolve(&layers);
    let obs = obstructions(&layers, &resolution.claimed);
    Ok(assemble(cell, layers.size, &resolution.pins, &obs, opts)?)
}

fn success(file: &str, mac: &LefMacro, detail: String) -> Report {
    Report {
        file: file.to_string(),
        cell: mac.name.clone(),
        pins: mac.pins.len(),
        obstructions: mac.obs.len(),
        ok: true,
        detail,
    }
}

/// Converts every layout under `input` into `output`.
///
/// Cells of one file run in parallel. Failures are recorded per cell and
/// never stop the batch. Only setup errors are returned as `Err`: an
/// unreadable input directory, or an output directory or library file that
/// cannot be written.
///
/// # Arguments
/// * `config` - Validated run configuration, including the output mode
/// * `input` - Layout file, or directory searched recursively for layouts
/// * `output` - Output directory, created if missing
/// * `truncate` - Start the merged library afresh instead of appending
/// * `verbose` - Print per-file and per-cell progress
///
/// # Returns
/// One [Report] per cell, in file order and then cell order. An unreadable
/// layout file contributes a single failed report with cell `-`.
pub fn run(
    config: &Config,
    input: &Path,
    output: &Path,
    truncate: bool,
    verbose: bool,
) -> LefgenResult<Reports> {
    config.validate()?;
    let files = layout_files(input)?;
    fs::create_dir_all(output)?;

    let mut merged = match config.mode {
        OutputMode::Merged => Some(MergedWriter::open(&config.library_file(output), truncate)?),
        OutputMode::Separate => None,
    };

    let mut reports = Reports::new();
    for path in files.iter() {
        let file = path.display().to_string();
        let source = match GdsSource::load(path) {
            Ok(source) => source,
            Err(e) => {
                let e: LefgenError = e.into();
                errorln!("{}", e);
                reports.push(Report::failure(&file, "-", &e));
                continue;
            }
        };
        let opts = AssemblyOptions::from_config(config, source.dbu_per_micron())?;
        let cells = source.cells();
        vprintln!(verbose, "Processing {} ({} cells)", file, cells.len());

        let outcomes: Vec<(String, LefgenResult<(LefMacro, Option<PathBuf>)>)> = cells
            .par_iter()
            .map(|cell| {
                let result = process_cell(&source, cell, config, &opts).and_then(|mac| {
                    let written = match config.mode {
                        OutputMode::Separate => {
                            Some(export::write_separate(output, &config.extension, &mac)?)
                        }
                        OutputMode::Merged => None,
                    };
                    Ok((mac, written))
                });
                (cell.clone(), result)
            })
            .collect();

        for (cell, outcome) in outcomes {
            let outcome = outcome.and_then(|(mac, written)| {
                let detail = match (&mut merged, written) {
                    (Some(wtr), _) => {
                        wtr.append(&mac);
                        wtr.path().display().to_string()
                    }
                    (None, Some(path)) => path.display().to_string(),
                    (None, None) => String::new(),
                };
                Ok(success(&file, &mac, detail))
            });
            match outcome {
                Ok(report) => {
                    vprintln!(verbose, "  {} -> {}", cell, report.detail);
                    reports.push(report);
                }
                Err(e) => {
                    errorln!("Cell {} in {}: {}", cell, file, e);
                    reports.push(Report::failure(&file, &cell, &e));
                }
            }
        }
    }

    if let Some(wtr) = merged {
        wtr.finish()?;
    }
    Ok(reports)
}
