use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use lefgen::config::{self, Config, OutputMode};
use lefgen::{batch, errorln, export, infoln, query, vprintln, QueryDefault};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory (or single file) of GDSII layouts
    input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// YAML or JSON configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Append every macro to one library file
    #[arg(short, long)]
    merged: bool,

    /// Library name for merged output
    #[arg(short, long)]
    library: Option<String>,

    #[arg(long)]
    site: Option<String>,

    /// Output units per micron
    #[arg(long)]
    units: Option<f64>,

    /// Scale divisor
    #[arg(long)]
    divisor: Option<f64>,

    /// Keep non-rectangular shapes as POLYGONs
    #[arg(long)]
    polygons: bool,

    /// Drop non-rectilinear pieces instead of failing the cell
    #[arg(long)]
    lenient: bool,

    /// Worker threads
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Truncate an existing library file without asking
    #[arg(short, long)]
    force: bool,

    /// Write the batch summary as CSV
    #[arg(short, long)]
    report: Option<PathBuf>,

    #[arg(short, long)]
    quiet: bool,
}

fn expand(path: &Path) -> Result<PathBuf, Box<dyn Error>> {
    Ok(shellexpand::path::full(path)?.into_owned())
}

fn build_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => config::read(&expand(path)?)?,
        None => Config::default(),
    };

    if args.merged {
        config.mode = OutputMode::Merged;
    }
    if let Some(library) = &args.library {
        config.library = library.clone();
    }
    if let Some(site) = &args.site {
        config.site = site.clone();
    }
    if let Some(units) = args.units {
        config.units_per_micron = units;
    }
    if let Some(divisor) = args.divisor {
        config.scale_divisor = divisor;
    }
    if args.polygons {
        config.rectangles_only = false;
    }
    if args.lenient {
        config.strict = false;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let verbose = !args.quiet;

    vprintln!(verbose, "Reading configuration...");
    let config = build_config(&args)?;

    if let Some(jobs) = args.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()?;
    }

    let input = expand(&args.input)?;
    let output = expand(&args.output)?;

    // An existing library is appended to unless the user says otherwise
    let mut truncate = args.force;
    let library = config.library_file(&output);
    if config.mode == OutputMode::Merged && !args.force && library.exists() {
        let append = query(
            format!("'{}' already exists. Append?", library.to_string_lossy()).as_str(),
            !args.quiet,
            QueryDefault::Yes,
        )?;
        truncate = !append;
        if truncate {
            infoln!("Truncating {}", library.display());
        }
    }

    let reports = batch::run(&config, &input, &output, truncate, verbose)?;

    if verbose {
        print!("{}", export::summary(&reports));
    }
    if let Some(path) = &args.report {
        export::export_csv(&reports, &expand(path)?)?;
    }

    let failed = reports.iter().filter(|r| !r.ok).count();
    if failed > 0 {
        errorln!("{} of {} cells failed", failed, reports.len());
        process::exit(1);
    }
    Ok(())
}
