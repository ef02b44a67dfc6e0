use std::path::Path;

use tracing::info;

use crate::config::RunConfig;
use crate::error::{EtError, Result};
use crate::et0::{build_et0_series, Et0Build, Et0Series};
use crate::fusion::{FusionEngine, FusionSettings, SeasonReport};
use crate::kc;
use crate::penman::FaoPenmanMonteith;
use crate::raster::{GeoTiffStore, Raster};
use crate::snapshots::SnapshotSet;
use crate::weather::WeatherTable;

impl RunConfig {
    pub fn fusion_settings(&self) -> FusionSettings {
        FusionSettings {
            start: self.season.start,
            end: self.season.end,
            nodata: self.raster.nodata,
            missing_et0: self.policy.missing_et0,
            mode: self.policy.fusion,
            mask_never_valid_total: self.policy.mask_never_valid_total,
        }
    }
}

/// Compute ET0 for the configured weather table and write the augmented
/// table to `paths.et0_csv`.
pub fn run_et0(config: &RunConfig) -> Result<Et0Build> {
    let table = WeatherTable::from_path(&config.paths.weather_csv)?;
    if table.is_empty() {
        return Err(EtError::InvalidInput(format!(
            "weather table {} has no rows",
            config.paths.weather_csv.display()
        )));
    }
    info!(
        "Loaded {} weather rows from {}",
        table.len(),
        config.paths.weather_csv.display()
    );

    let build = build_et0_series(&table, &FaoPenmanMonteith, &config.station);
    table.write_with_et0_to_path(&config.paths.et0_csv, &build.column)?;
    info!("ET0 table written to {}", config.paths.et0_csv.display());
    Ok(build)
}

/// Run the fusion over the configured season from an ET0 series.
pub fn run_etc(config: &RunConfig, series: &Et0Series) -> Result<SeasonReport> {
    let snapshots =
        SnapshotSet::discover(&config.paths.snapshot_dir, &config.raster.snapshot_prefix)?;
    let mut engine = FusionEngine::new(
        config.fusion_settings(),
        snapshots,
        &config.paths.etc_dir,
        GeoTiffStore,
    );
    engine.run(series)
}

// ETc from the ET0 table previously written by `run_et0`
pub fn run_etc_from_table(config: &RunConfig) -> Result<SeasonReport> {
    let series = Et0Series::from_table_path(&config.paths.et0_csv)?;
    if series.is_empty() {
        return Err(EtError::InvalidInput(format!(
            "ET0 table {} has no dated rows",
            config.paths.et0_csv.display()
        )));
    }
    run_etc(config, &series)
}

pub fn run_season(config: &RunConfig) -> Result<(Et0Build, SeasonReport)> {
    let build = run_et0(config)?;
    let report = run_etc(config, &build.series)?;
    Ok((build, report))
}

/// Derive an NDVI GeoTIFF from red and near-infrared band files; the output
/// takes the red band's georeferencing.
pub fn run_ndvi(red: &Path, nir: &Path, output: &Path, nodata: f32) -> Result<Raster> {
    let red = Raster::read(red)?.normalize_nodata(nodata);
    let nir = Raster::read(nir)?.normalize_nodata(nodata);
    let ndvi = Raster {
        grid: kc::ndvi(&red.grid, &nir.grid, nodata)?,
        profile: red.profile.with_nodata(nodata),
    };
    ndvi.write(output)?;
    info!("NDVI written to {}", output.display());
    Ok(ndvi)
}
