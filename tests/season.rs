use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use crop_et::{
    run_et0, run_etc_from_table, run_ndvi, run_season, DayOutcome, EtError, GeoTransform, Grid,
    Raster, RasterProfile, RunConfig, Selection, DEFAULT_NODATA,
};

const ND: f32 = DEFAULT_NODATA;

fn profile() -> RasterProfile {
    RasterProfile {
        width: 3,
        height: 2,
        transform: Some(GeoTransform::from_origin(-70.0, -33.0, 10.0, 10.0)),
        epsg: Some(32719),
        nodata: Some(ND),
    }
}

fn write_weather(path: &Path, first: u32, last: u32) {
    let mut csv = String::from(
        "date,min_temp,max_temp,mean_relative_humidity,wind_speed_at_2m,solar_radiation\n",
    );
    for day in first..=last {
        csv.push_str(&format!("2023-09-{day:02},8.0,24.0,45,2.0,20.0\n"));
    }
    fs::write(path, csv).unwrap();
}

fn config(root: &Path, start: &str, end: &str) -> RunConfig {
    let toml_str = format!(
        r#"
        [station]
        latitude_deg = -33.0
        elevation_m = 950.0

        [season]
        start = "{start}"
        end = "{end}"

        [paths]
        weather_csv = '{root}/weather.csv'
        et0_csv = '{root}/results/et0.csv'
        snapshot_dir = '{root}/ndvi'
        etc_dir = '{root}/results/etc'
        "#,
        root = root.display()
    );
    RunConfig::from_toml_str(&toml_str).unwrap()
}

#[test]
fn single_snapshot_season_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_weather(&root.join("weather.csv"), 1, 16);
    let ndvi = Raster::new(
        Grid::from_row_slice(2, 3, &[0.5, 0.8, ND, 0.2, -0.4, 0.9]),
        profile(),
    )
    .unwrap();
    ndvi.write(root.join("ndvi").join("NDVI_dummy_20230915.tif"))
        .unwrap();

    let config = config(root, "2023-09-01", "2023-09-16");
    let (build, report) = run_season(&config).unwrap();

    assert_eq!(build.report.failed(), 0);
    assert!(build.column.iter().all(|v| v.is_some_and(|et0| et0 > 0.0)));
    let et0 = build.column[0].unwrap();

    assert_eq!(report.days.len(), 16);
    assert_eq!(report.written(), 16);
    let snapshot = NaiveDate::from_ymd_opt(2023, 9, 15).unwrap();
    assert!(report.days.iter().all(|d| matches!(
        d,
        DayOutcome::Written { selection, .. } if selection.held() == snapshot
    )));
    assert!(matches!(
        report.days.last(),
        Some(DayOutcome::Written {
            selection: Selection::AfterLast(_),
            ..
        })
    ));

    let etc_dir = root.join("results").join("etc");
    let first_day = Raster::read(etc_dir.join("ETc_20230901.tif")).unwrap();
    assert_eq!(first_day.profile, profile());
    assert_relative_eq!(first_day.grid[(0, 0)], 0.6 * et0 as f32, max_relative = 1e-5);
    assert_eq!(first_day.grid[(0, 2)], ND);

    // The season total is the pixel-wise sum of the daily rasters on disk
    let mut expected = Grid::zeros(2, 3);
    for day in 1..=16 {
        let daily = Raster::read(etc_dir.join(format!("ETc_202309{day:02}.tif"))).unwrap();
        assert_eq!(daily.grid[(0, 2)], ND);
        for (r, c) in [(0, 0), (0, 1), (1, 0), (1, 1), (1, 2)] {
            expected[(r, c)] += daily.grid[(r, c)];
        }
    }
    let total = Raster::read(etc_dir.join("ETc_season_total.tif")).unwrap();
    assert_eq!(total.profile, profile());
    for (r, c) in [(0, 0), (0, 1), (1, 0), (1, 1), (1, 2)] {
        assert_relative_eq!(total.grid[(r, c)], expected[(r, c)], max_relative = 1e-5);
    }
    // Never-valid pixels keep the zero they started from
    assert_eq!(total.grid[(0, 2)], 0.0);
    assert_eq!(total.profile.nodata, Some(ND));

    // The ET0 table keeps the input rows and gains a column
    let table = fs::read_to_string(root.join("results").join("et0.csv")).unwrap();
    assert_eq!(table.lines().count(), 17);
    assert!(table.lines().next().unwrap().ends_with(",et0_mm_day"));
}

#[test]
fn data_gap_days_contribute_zero() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_weather(&root.join("weather.csv"), 1, 2);
    Raster::new(Grid::from_element(2, 3, 0.5), profile())
        .unwrap()
        .write(root.join("ndvi").join("NDVI_20230901.tif"))
        .unwrap();

    let config = config(root, "2023-09-01", "2023-09-04");
    let build = run_et0(&config).unwrap();
    let report = run_etc_from_table(&config).unwrap();
    assert_eq!(report.written(), 4);

    let gap = Raster::read(root.join("results/etc/ETc_20230903.tif")).unwrap();
    assert!(gap.grid.iter().all(|&v| v == 0.0));

    let observed = (build.column[0].unwrap() + build.column[1].unwrap()) as f32;
    assert_relative_eq!(report.total.grid[(0, 0)], 0.6 * observed, max_relative = 1e-5);
}

#[test]
fn missing_weather_table_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), "2023-09-01", "2023-09-02");
    assert!(matches!(run_et0(&config), Err(EtError::MissingInput(_))));
}

#[test]
fn missing_snapshots_abort() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_weather(&root.join("weather.csv"), 1, 2);
    fs::create_dir_all(root.join("ndvi")).unwrap();
    let config = config(root, "2023-09-01", "2023-09-02");
    assert!(matches!(run_season(&config), Err(EtError::NoSnapshots(_))));
}

#[test]
fn ndvi_from_band_files() {
    let dir = tempfile::tempdir().unwrap();
    let red_path = dir.path().join("B04.tif");
    let nir_path = dir.path().join("B08.tif");
    let mut band_profile = profile();
    band_profile.nodata = None;
    Raster::new(Grid::from_element(2, 3, 1000.0), band_profile.clone())
        .unwrap()
        .write(&red_path)
        .unwrap();
    let nir_values = [3000.0, 1000.0, 0.0, 0.0, 2000.0, 1000.0];
    Raster::new(Grid::from_row_slice(2, 3, &nir_values), band_profile)
        .unwrap()
        .write(&nir_path)
        .unwrap();

    let out = dir.path().join("NDVI_20230915.tif");
    run_ndvi(&red_path, &nir_path, &out, ND).unwrap();
    let ndvi = Raster::read(&out).unwrap();
    assert_eq!(ndvi.profile.nodata, Some(ND));
    assert_relative_eq!(ndvi.grid[(0, 0)], 0.5, epsilon = 1e-6);
    assert_relative_eq!(ndvi.grid[(0, 1)], 0.0, epsilon = 1e-6);
    assert_relative_eq!(ndvi.grid[(1, 0)], -1.0, epsilon = 1e-6);
}
