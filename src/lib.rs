mod config;
mod error;
mod et0;
mod fusion;
mod kc;
mod penman;
mod pipeline;
mod raster;
mod snapshots;
mod weather;

pub use config::{Paths, Policy, RasterSettings, RunConfig, Season, Station};
pub use error::{EtError, Result};
pub use et0::{build_et0_series, Et0Build, Et0Report, Et0Series, RowOutcome};
pub use fusion::{
    daily_file_name, DayOutcome, FusionEngine, FusionMode, FusionSettings, MissingEt0Policy,
    SeasonReport, SeasonState, SkipReason, SEASON_TOTAL_FILE,
};
pub use kc::{blend, etc_from_kc, kc_from_index, kc_from_ndvi, ndvi};
pub use penman::{Et0Input, FaoPenmanMonteith, ReferenceEtModel};
pub use pipeline::{run_et0, run_etc, run_etc_from_table, run_ndvi, run_season};
pub use raster::{
    GeoTiffStore, GeoTransform, Grid, Raster, RasterProfile, RasterStore, DEFAULT_NODATA,
};
pub use snapshots::{capture_date, Selection, SnapshotSet};
pub use weather::{WeatherRecord, WeatherTable};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn it_works() {
        let mut set = SnapshotSet::new();
        let day = NaiveDate::from_ymd_opt(2023, 9, 15).unwrap();
        set.insert(day, "NDVI_20230915.tif");
        let kc = kc_from_ndvi(&Grid::from_element(1, 1, 0.5), DEFAULT_NODATA);
        let etc = etc_from_kc(&kc, 5.0, DEFAULT_NODATA);
        assert_eq!(set.select(day).map(|s| s.held()), Some(day));
        assert!((etc[(0, 0)] - 3.0).abs() < 1e-5);
    }
}
