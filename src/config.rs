use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{EtError, Result};
use crate::fusion::{FusionMode, MissingEt0Policy};
use crate::raster::DEFAULT_NODATA;

// Weather station location used by the reference ET model
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Station {
    pub latitude_deg: f64, // Station latitude [degrees, negative south]
    pub elevation_m: f64,  // Station elevation above sea level [m]
}

impl Station {
    pub fn latitude_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }
}

// Closed date range simulated by the fusion engine
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Season {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RasterSettings {
    pub nodata: f32,             // Sentinel written to every derived raster
    pub snapshot_prefix: String, // Required filename prefix for snapshots, empty = any
}

impl Default for RasterSettings {
    fn default() -> Self {
        RasterSettings {
            nodata: DEFAULT_NODATA,
            snapshot_prefix: "NDVI".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paths {
    pub weather_csv: PathBuf,
    pub et0_csv: PathBuf,
    pub snapshot_dir: PathBuf,
    pub etc_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub missing_et0: MissingEt0Policy,
    pub fusion: FusionMode,
    pub mask_never_valid_total: bool, // Season total gets nodata where no day was valid
}

/// Settings for one pipeline run, read from a TOML file.
///
/// ```toml
/// [station]
/// latitude_deg = -33.0
/// elevation_m = 950.0
///
/// [season]
/// start = "2023-09-01"
/// end = "2024-04-30"
///
/// [paths]
/// weather_csv = "data/meteorological/weather.csv"
/// et0_csv = "results/et0/weather_with_et0.csv"
/// snapshot_dir = "results/ndvi_maps"
/// etc_dir = "results/etc_maps"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub station: Station,
    pub season: Season,
    #[serde(default)]
    pub raster: RasterSettings,
    pub paths: Paths,
    #[serde(default)]
    pub policy: Policy,
}

impl RunConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let toml_str = fs::read_to_string(path).map_err(|e| EtError::io(path, e))?;
        Self::from_toml_str(&toml_str)
    }

    fn validate(&self) -> Result<()> {
        if self.season.start > self.season.end {
            return Err(EtError::Config(format!(
                "season start {} is after season end {}",
                self.season.start, self.season.end
            )));
        }
        if !(-90.0..=90.0).contains(&self.station.latitude_deg) {
            return Err(EtError::Config(format!(
                "station latitude {} is outside [-90, 90]",
                self.station.latitude_deg
            )));
        }
        if !self.station.elevation_m.is_finite() {
            return Err(EtError::Config("station elevation must be finite".into()));
        }
        if !self.raster.nodata.is_finite() {
            return Err(EtError::Config("nodata sentinel must be finite".into()));
        }
        Ok(())
    }
}
