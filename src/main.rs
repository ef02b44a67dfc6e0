//! Crop water demand from station weather and vegetation index rasters.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use crop_et::{run_et0, run_etc_from_table, run_ndvi, run_season, RunConfig, DEFAULT_NODATA};

#[derive(Debug, Parser)]
#[command(name = "crop-et", about = "Daily crop evapotranspiration maps for a growing season")]
struct Cli {
    /// Run configuration (TOML)
    #[arg(short, long, default_value = "crop_et.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute daily ET0 and write the weather table with an et0_mm_day column
    Et0,
    /// Compute daily and seasonal ETc rasters from the ET0 table
    Etc,
    /// ET0 followed by ETc
    Run,
    /// Derive an NDVI raster from red and near-infrared band files
    Ndvi {
        #[arg(long)]
        red: PathBuf,
        #[arg(long)]
        nir: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn load_config(path: &Path) -> anyhow::Result<RunConfig> {
    RunConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crop_et=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Et0 => {
            let config = load_config(&cli.config)?;
            let build = run_et0(&config).context("computing ET0")?;
            tracing::info!(
                "{} rows computed, {} failed",
                build.report.computed(),
                build.report.failed()
            );
        }
        Command::Etc => {
            let config = load_config(&cli.config)?;
            let report = run_etc_from_table(&config).context("computing ETc")?;
            tracing::info!("{} days written, {} skipped", report.written(), report.skipped());
        }
        Command::Run => {
            let config = load_config(&cli.config)?;
            let (build, report) = run_season(&config).context("running season")?;
            tracing::info!(
                "ET0: {} rows failed; ETc: {} days written, {} skipped",
                build.report.failed(),
                report.written(),
                report.skipped()
            );
        }
        Command::Ndvi { red, nir, output } => {
            // The nodata sentinel comes from the config when one is present
            let nodata = RunConfig::from_file(&cli.config)
                .map(|c| c.raster.nodata)
                .unwrap_or(DEFAULT_NODATA);
            run_ndvi(&red, &nir, &output, nodata).context("computing NDVI")?;
        }
    }
    Ok(())
}
