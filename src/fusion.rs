use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use nalgebra::DMatrix;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{EtError, Result};
use crate::et0::Et0Series;
use crate::kc::{blend, etc_from_kc, kc_from_ndvi};
use crate::raster::{Grid, Raster, RasterProfile, RasterStore};
use crate::snapshots::{Selection, SnapshotSet};

pub const SEASON_TOTAL_FILE: &str = "ETc_season_total.tif";

// What to use for ET0 on a day with no (or a null) value in the series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingEt0Policy {
    #[default]
    Zero, // ETc is zero at every valid pixel that day
    ForwardFill, // Last ET0 seen this season, zero before any
    SkipDay,     // No output and no contribution
}

// How a coefficient grid is chosen for a day between two snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    #[default]
    HoldPrevious, // Keep the last observed snapshot until the next one
    Linear, // Blend the two neighbours by elapsed time
}

#[derive(Debug, Clone, Copy)]
pub struct FusionSettings {
    pub start: NaiveDate,
    pub end: NaiveDate, // Inclusive
    pub nodata: f32,
    pub missing_et0: MissingEt0Policy,
    pub mode: FusionMode,
    pub mask_never_valid_total: bool, // Write nodata where no day was valid
}

#[derive(Debug)]
pub enum SkipReason {
    NoSnapshot,
    MissingEt0,
    Failed(EtError),
}

#[derive(Debug)]
pub enum DayOutcome {
    Written {
        date: NaiveDate,
        selection: Selection,
        et0: f64,
        valid_pixels: usize,
        path: PathBuf,
    },
    Skipped {
        date: NaiveDate,
        reason: SkipReason,
    },
}

impl DayOutcome {
    pub fn date(&self) -> NaiveDate {
        match self {
            DayOutcome::Written { date, .. } | DayOutcome::Skipped { date, .. } => *date,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, DayOutcome::Written { .. })
    }
}

#[derive(Debug)]
pub struct SeasonReport {
    pub days: Vec<DayOutcome>,
    pub total: Raster,
    pub total_path: PathBuf,
}

impl SeasonReport {
    pub fn written(&self) -> usize {
        self.days.iter().filter(|d| d.is_written()).count()
    }

    pub fn skipped(&self) -> usize {
        self.days.len() - self.written()
    }
}

/// Day cursor and running per-pixel totals of one season.
#[derive(Debug, Clone)]
pub struct SeasonState {
    current: Option<NaiveDate>,
    total: Grid,
    valid_days: DMatrix<u32>, // Days each pixel received a valid ETc
    profile: RasterProfile,   // Geometry of the season total
    last_et0: Option<f64>,
}

impl SeasonState {
    pub fn new(start: NaiveDate, profile: RasterProfile) -> Self {
        let (rows, cols) = profile.shape();
        SeasonState {
            current: Some(start),
            total: Grid::zeros(rows, cols),
            valid_days: DMatrix::zeros(rows, cols),
            profile,
            last_et0: None,
        }
    }

    pub fn current(&self) -> Option<NaiveDate> {
        self.current
    }

    pub fn total(&self) -> &Grid {
        &self.total
    }

    /// Add every non-`nodata` pixel of `etc` into the running total and
    /// return how many were added. `etc` must have the state's shape.
    pub fn accumulate(&mut self, etc: &Grid, nodata: f32) -> usize {
        let mut added = 0;
        for ((sum, days), &value) in self
            .total
            .iter_mut()
            .zip(self.valid_days.iter_mut())
            .zip(etc.iter())
        {
            if value != nodata {
                *sum += value;
                *days += 1;
                added += 1;
            }
        }
        added
    }

    /// Season total as a raster declaring `nodata`. Pixels never valid on
    /// any day keep their zero sum unless `mask_never_valid` is set.
    pub fn total_raster(&self, nodata: f32, mask_never_valid: bool) -> Raster {
        let grid = if mask_never_valid {
            self.total.zip_map(&self.valid_days, |sum, days| {
                if days == 0 { nodata } else { sum }
            })
        } else {
            self.total.clone()
        };
        Raster {
            grid,
            profile: self.profile.with_nodata(nodata),
        }
    }
}

pub fn daily_file_name(date: NaiveDate) -> String {
    format!("ETc_{}.tif", date.format("%Y%m%d"))
}

/**
Fuses the daily ET0 series with the vegetation index snapshots.

For every day of the season the engine picks a coefficient grid from the
snapshots, scales it by that day's ET0, writes the daily ETc raster and adds
its valid pixels into the season total. Failures of a single day are recorded
in the report and the scan continues.
*/
pub struct FusionEngine<S: RasterStore> {
    settings: FusionSettings,
    snapshots: SnapshotSet,
    output_dir: PathBuf,
    store: S,
    coefficients: HashMap<NaiveDate, Raster>, // Kc per capture date, derived once
}

impl<S: RasterStore> FusionEngine<S> {
    pub fn new(
        settings: FusionSettings,
        snapshots: SnapshotSet,
        output_dir: impl Into<PathBuf>,
        store: S,
    ) -> Self {
        FusionEngine {
            settings,
            snapshots,
            output_dir: output_dir.into(),
            store,
            coefficients: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // Crop coefficient raster for one capture date
    fn coefficients(&mut self, date: NaiveDate) -> Result<Raster> {
        if let Some(kc) = self.coefficients.get(&date) {
            return Ok(kc.clone());
        }
        let path = self
            .snapshots
            .path(date)
            .ok_or_else(|| EtError::MissingInput(PathBuf::from(date.to_string())))?
            .to_path_buf();
        let nodata = self.settings.nodata;
        let ndvi = self.store.read(&path)?.normalize_nodata(nodata);
        let kc = Raster {
            grid: kc_from_ndvi(&ndvi.grid, nodata),
            profile: ndvi.profile,
        };
        self.coefficients.insert(date, kc.clone());
        Ok(kc)
    }

    // Geometry of the season total: the earliest snapshot that can be read
    fn reference_profile(&mut self) -> Result<RasterProfile> {
        let dates: Vec<NaiveDate> = self.snapshots.dates().collect();
        let mut last_error = None;
        for date in dates {
            match self.coefficients(date) {
                Ok(kc) => return Ok(kc.profile),
                Err(e) => {
                    warn!("Snapshot for {date} cannot serve as reference: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| EtError::NoSnapshots(self.output_dir.clone())))
    }

    fn day_et0(
        &self,
        state: &mut SeasonState,
        series: &Et0Series,
        date: NaiveDate,
    ) -> Option<f64> {
        if let Some(value) = series.get(date) {
            state.last_et0 = Some(value);
            return Some(value);
        }
        match self.settings.missing_et0 {
            MissingEt0Policy::Zero => {
                warn!("No ET0 for {date}, using 0");
                Some(0.0)
            }
            MissingEt0Policy::ForwardFill => {
                let value = state.last_et0.unwrap_or(0.0);
                warn!("No ET0 for {date}, carrying forward {value}");
                Some(value)
            }
            MissingEt0Policy::SkipDay => None,
        }
    }

    fn day_coefficients(&mut self, selection: Selection, date: NaiveDate) -> Result<Raster> {
        match (self.settings.mode, selection) {
            (FusionMode::Linear, Selection::Between { prev, next }) => {
                let earlier = self.coefficients(prev)?;
                let later = match self.coefficients(next) {
                    Ok(kc) => kc,
                    Err(e) => {
                        warn!("{date}: snapshot {next} unreadable, holding {prev}: {e}");
                        return Ok(earlier);
                    }
                };
                let span = (next - prev).num_days() as f32;
                let weight = (date - prev).num_days() as f32 / span;
                Ok(Raster {
                    grid: blend(&earlier.grid, &later.grid, weight, self.settings.nodata)?,
                    profile: earlier.profile,
                })
            }
            _ => self.coefficients(selection.held()),
        }
    }

    // Compute and write one day's ETc raster
    fn day_etc(
        &mut self,
        state: &SeasonState,
        selection: Selection,
        date: NaiveDate,
        et0: f64,
    ) -> Result<(Raster, PathBuf)> {
        let nodata = self.settings.nodata;
        let kc = self.day_coefficients(selection, date)?;
        if kc.grid.shape() != state.total.shape() {
            return Err(EtError::ShapeMismatch {
                expected: state.total.shape(),
                found: kc.grid.shape(),
            });
        }
        let etc = Raster {
            grid: etc_from_kc(&kc.grid, et0 as f32, nodata),
            profile: kc.profile.with_nodata(nodata),
        };
        let path = self.output_dir.join(daily_file_name(date));
        self.store.write(&path, &etc)?;
        Ok((etc, path))
    }

    fn simulate_day(
        &mut self,
        state: &mut SeasonState,
        series: &Et0Series,
        date: NaiveDate,
    ) -> DayOutcome {
        let Some(et0) = self.day_et0(state, series, date) else {
            warn!("Skipping {date}: no ET0");
            return DayOutcome::Skipped {
                date,
                reason: SkipReason::MissingEt0,
            };
        };

        let Some(selection) = self.snapshots.select(date) else {
            warn!("Skipping {date}: no vegetation index snapshot available");
            return DayOutcome::Skipped {
                date,
                reason: SkipReason::NoSnapshot,
            };
        };
        debug!("{date}: {selection:?}, ET0 = {et0:.2}");

        match self.day_etc(state, selection, date, et0) {
            Ok((etc, path)) => {
                let valid_pixels = state.accumulate(&etc.grid, self.settings.nodata);
                DayOutcome::Written {
                    date,
                    selection,
                    et0,
                    valid_pixels,
                    path,
                }
            }
            Err(e) => {
                warn!(
                    "Skipping ETc for {date} (snapshot {}): {e}",
                    selection.held()
                );
                DayOutcome::Skipped {
                    date,
                    reason: SkipReason::Failed(e),
                }
            }
        }
    }

    /// Simulate the state's current day and advance it by one day.
    /// Returns `None` once the season end has been passed.
    pub fn step(&mut self, state: &mut SeasonState, series: &Et0Series) -> Option<DayOutcome> {
        let date = state.current.filter(|d| *d <= self.settings.end)?;
        let outcome = self.simulate_day(state, series, date);
        state.current = date.succ_opt();
        Some(outcome)
    }

    pub fn start(&mut self) -> Result<SeasonState> {
        if self.snapshots.is_empty() {
            return Err(EtError::NoSnapshots(self.output_dir.clone()));
        }
        let profile = self.reference_profile()?;
        Ok(SeasonState::new(self.settings.start, profile))
    }

    /**
    Run the whole season and write the accumulated total.

    Errors only when no snapshot can be read at all or the total cannot be
    written; everything else is reported per day.
    */
    pub fn run(&mut self, series: &Et0Series) -> Result<SeasonReport> {
        let mut state = self.start()?;
        info!(
            "Simulating ETc from {} to {} over {} snapshots",
            self.settings.start,
            self.settings.end,
            self.snapshots.len()
        );

        let mut days = Vec::new();
        while let Some(outcome) = self.step(&mut state, series) {
            days.push(outcome);
        }

        let total = state.total_raster(
            self.settings.nodata,
            self.settings.mask_never_valid_total,
        );
        let total_path = self.output_dir.join(SEASON_TOTAL_FILE);
        self.store.write(&total_path, &total)?;

        let report = SeasonReport {
            days,
            total,
            total_path,
        };
        info!(
            "Season done: {} days written, {} skipped, total in {}",
            report.written(),
            report.skipped(),
            report.total_path.display()
        );
        Ok(report)
    }
}
