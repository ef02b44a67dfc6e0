use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::StringRecord;

use crate::error::{EtError, Result};

pub const DATE_COLUMN: &str = "date";
pub const MIN_TEMP_COLUMN: &str = "min_temp";
pub const MAX_TEMP_COLUMN: &str = "max_temp";
pub const RH_COLUMN: &str = "mean_relative_humidity";
pub const WIND_COLUMN: &str = "wind_speed_at_2m";
pub const SOLAR_COLUMN: &str = "solar_radiation";
pub const ET0_COLUMN: &str = "et0_mm_day";

const REQUIRED_COLUMNS: [&str; 6] = [
    DATE_COLUMN,
    MIN_TEMP_COLUMN,
    MAX_TEMP_COLUMN,
    RH_COLUMN,
    WIND_COLUMN,
    SOLAR_COLUMN,
];

// One day of station observations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherRecord {
    pub date: NaiveDate,
    pub min_temp: f64,        // [°C]
    pub max_temp: f64,        // [°C]
    pub rh_mean: f64,         // [%]
    pub wind_speed_2m: f64,   // [m/s]
    pub solar_radiation: f64, // [MJ m-2 day-1]
}

impl WeatherRecord {
    pub fn mean_temp(&self) -> f64 {
        (self.min_temp + self.max_temp) / 2.0
    }

    pub fn day_of_year(&self) -> u32 {
        self.date.ordinal()
    }
}

/// A weather table kept as raw text so that every input column and the
/// row order survive into the output table.
#[derive(Debug, Clone)]
pub struct WeatherTable {
    headers: StringRecord,
    rows: Vec<StringRecord>,
    columns: HashMap<String, usize>,
}

impl WeatherTable {
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let columns: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();

        for required in REQUIRED_COLUMNS {
            if !columns.contains_key(required) {
                return Err(EtError::MissingColumn(required.to_string()));
            }
        }

        let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(WeatherTable {
            headers,
            rows,
            columns,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| EtError::io(path, e))?;
        Self::from_reader(file)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn field<'a>(&self, row: &'a StringRecord, column: &str) -> Option<&'a str> {
        self.columns
            .get(column)
            .and_then(|&i| row.get(i))
            .filter(|s| !s.is_empty())
    }

    // Raw date text of a row, for diagnostics
    pub fn raw_date(&self, index: usize) -> &str {
        self.rows
            .get(index)
            .and_then(|row| self.field(row, DATE_COLUMN))
            .unwrap_or("")
    }

    // Parse only the date of a row
    pub fn date(&self, index: usize) -> Result<NaiveDate> {
        parse_date(self.raw_date(index))
    }

    /// Parse one row into a typed record.
    ///
    /// A row with an unparsable date or a missing/non-numeric required field
    /// yields `EtError::InvalidInput` naming the offending column.
    pub fn record(&self, index: usize) -> Result<WeatherRecord> {
        let row = self
            .rows
            .get(index)
            .ok_or_else(|| EtError::InvalidInput(format!("row {index} out of range")))?;

        let number = |column: &str| -> Result<f64> {
            let raw = self
                .field(row, column)
                .ok_or_else(|| EtError::InvalidInput(format!("missing {column}")))?;
            raw.parse::<f64>()
                .map_err(|_| EtError::InvalidInput(format!("{column} '{raw}' is not numeric")))
        };

        Ok(WeatherRecord {
            date: self.date(index)?,
            min_temp: number(MIN_TEMP_COLUMN)?,
            max_temp: number(MAX_TEMP_COLUMN)?,
            rh_mean: number(RH_COLUMN)?,
            wind_speed_2m: number(WIND_COLUMN)?,
            solar_radiation: number(SOLAR_COLUMN)?,
        })
    }

    /// Write the table with an appended `et0_mm_day` column; `None` becomes an
    /// empty field.
    pub fn write_with_et0<W: std::io::Write>(&self, writer: W, et0: &[Option<f64>]) -> Result<()> {
        if et0.len() != self.rows.len() {
            return Err(EtError::InvalidInput(format!(
                "{} ET0 values for {} weather rows",
                et0.len(),
                self.rows.len()
            )));
        }

        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        let mut headers = self.headers.clone();
        headers.push_field(ET0_COLUMN);
        writer.write_record(&headers)?;

        for (row, value) in self.rows.iter().zip(et0) {
            let mut out = row.clone();
            // Short rows are padded so the new column lines up
            while out.len() < self.headers.len() {
                out.push_field("");
            }
            match value {
                Some(v) => out.push_field(&v.to_string()),
                None => out.push_field(""),
            }
            writer.write_record(&out)?;
        }
        writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn write_with_et0_to_path(
        &self,
        path: impl AsRef<Path>,
        et0: &[Option<f64>],
    ) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EtError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| EtError::io(path, e))?;
        self.write_with_et0(file, et0)
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    // A midnight timestamp such as "2023-09-01 00:00:00" is also accepted
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|t| t.date()))
        .map_err(|_| EtError::InvalidInput(format!("date '{raw}' is not YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
date,min_temp,max_temp,mean_relative_humidity,wind_speed_at_2m,solar_radiation,station
2023-09-01,5.2,21.0,45,2.1,18.5,lujan
2023-09-02,abc,22.0,40,1.9,19.0,lujan
2023-09-03,6.0,,50,2.0,17.0,lujan
";

    #[test]
    fn parses_valid_row() {
        let table = WeatherTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        let record = table.record(0).unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2023, 9, 1).unwrap());
        approx::assert_relative_eq!(record.mean_temp(), 13.1, epsilon = 1e-12);
        assert_eq!(record.day_of_year(), 244);
    }

    #[test]
    fn malformed_fields_are_row_errors() {
        let table = WeatherTable::from_reader(CSV.as_bytes()).unwrap();
        assert!(matches!(table.record(1), Err(EtError::InvalidInput(_))));
        assert!(matches!(table.record(2), Err(EtError::InvalidInput(_))));
        // The date is still readable on a malformed row
        assert_eq!(table.date(1).unwrap(), NaiveDate::from_ymd_opt(2023, 9, 2).unwrap());
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let csv = "date,min_temp\n2023-09-01,1.0\n";
        assert!(matches!(
            WeatherTable::from_reader(csv.as_bytes()),
            Err(EtError::MissingColumn(c)) if c == MAX_TEMP_COLUMN
        ));
    }

    #[test]
    fn output_keeps_columns_and_appends_et0() {
        let table = WeatherTable::from_reader(CSV.as_bytes()).unwrap();
        let mut out = Vec::new();
        table
            .write_with_et0(&mut out, &[Some(3.5), None, None])
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with(",station,et0_mm_day"));
        assert!(lines[1].ends_with(",lujan,3.5"));
        assert!(lines[2].ends_with(",lujan,"));
    }

    #[test]
    fn date_with_time_suffix() {
        assert_eq!(
            parse_date("2024-01-15 00:00:00").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert!(parse_date("15/01/2024").is_err());
        assert!(parse_date("2023-09-01junk").is_err());
        assert!(parse_date("2023-09-01 00:00").is_err());
    }
}
