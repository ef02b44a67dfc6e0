use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::Station;
use crate::error::{EtError, Result};
use crate::penman::{Et0Input, ReferenceEtModel};
use crate::weather::{self, WeatherTable};

/// Daily reference evapotranspiration keyed by date; `None` marks a day whose
/// weather row could not be evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Et0Series {
    values: BTreeMap<NaiveDate, Option<f64>>,
}

impl Et0Series {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, value: Option<f64>) {
        self.values.insert(date, value);
    }

    // `None` when the date is absent or its value is null
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.values.get(&date).copied().flatten()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.values.contains_key(&date)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read the `date` / `et0_mm_day` columns of a previously written table.
    pub fn from_table_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| EtError::io(path, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| EtError::MissingColumn(name.to_string()))
        };
        let date_idx = position(weather::DATE_COLUMN)?;
        let et0_idx = position(weather::ET0_COLUMN)?;

        let mut series = Et0Series::new();
        for row in reader.records() {
            let row = row?;
            let raw_date = row.get(date_idx).unwrap_or("");
            let date = match weather::parse_date(raw_date) {
                Ok(date) => date,
                Err(e) => {
                    warn!("Skipping ET0 row: {e}");
                    continue;
                }
            };
            let value = row
                .get(et0_idx)
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite());
            series.values.entry(date).or_insert(value);
        }
        Ok(series)
    }
}

// Result of evaluating one weather row
#[derive(Debug)]
pub enum RowOutcome {
    Computed { date: NaiveDate, et0: f64 },
    Failed { row: usize, date: String, error: EtError },
}

#[derive(Debug, Default)]
pub struct Et0Report {
    pub outcomes: Vec<RowOutcome>,
}

impl Et0Report {
    pub fn computed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RowOutcome::Computed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.computed()
    }
}

/// ET0 for every weather row: the per-row column (same order as the table),
/// the series keyed by date, and the per-row outcomes.
#[derive(Debug)]
pub struct Et0Build {
    pub column: Vec<Option<f64>>,
    pub series: Et0Series,
    pub report: Et0Report,
}

/// Evaluate the reference ET model on every row of the weather table.
///
/// A row that cannot be parsed or that the model rejects gets a null value;
/// the remaining rows are still evaluated.
pub fn build_et0_series<M: ReferenceEtModel>(
    table: &WeatherTable,
    model: &M,
    station: &Station,
) -> Et0Build {
    let mut column = Vec::with_capacity(table.len());
    let mut series = Et0Series::new();
    let mut report = Et0Report::default();

    for row in 0..table.len() {
        let result = table.record(row).and_then(|record| {
            let input = Et0Input {
                min_temp: record.min_temp,
                max_temp: record.max_temp,
                mean_temp: record.mean_temp(),
                rh_mean: record.rh_mean,
                wind_speed_2m: record.wind_speed_2m,
                solar_radiation: record.solar_radiation,
                elevation: station.elevation_m,
                latitude: station.latitude_rad(),
                day_of_year: record.day_of_year(),
            };
            model.et0(&input).map(|et0| (record.date, et0))
        });

        // The first row for a date owns it
        let result = match result {
            Ok((date, et0)) => match series.values.entry(date) {
                Entry::Vacant(slot) => {
                    slot.insert(Some(et0));
                    Ok((date, et0))
                }
                Entry::Occupied(_) => Err(EtError::InvalidInput(format!("duplicate date {date}"))),
            },
            Err(e) => {
                if let Ok(date) = table.date(row) {
                    series.values.entry(date).or_insert(None);
                }
                Err(e)
            }
        };

        match result {
            Ok((date, et0)) => {
                column.push(Some(et0));
                report.outcomes.push(RowOutcome::Computed { date, et0 });
            }
            Err(error) => {
                let date = table.raw_date(row).to_string();
                warn!("Failed to compute ET0 for date {date}: {error}");
                column.push(None);
                report.outcomes.push(RowOutcome::Failed { row, date, error });
            }
        }
    }

    info!(
        "ET0 computed for {} of {} weather rows",
        report.computed(),
        table.len()
    );
    Et0Build {
        column,
        series,
        report,
    }
}
