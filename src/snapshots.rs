use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{EtError, Result};

// Which snapshot(s) apply to a simulated day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Exact(NaiveDate),       // Day is a capture date
    BeforeFirst(NaiveDate), // Only a later snapshot exists
    AfterLast(NaiveDate),   // Only an earlier snapshot exists
    Between { prev: NaiveDate, next: NaiveDate },
}

impl Selection {
    // The snapshot used under the hold-previous policy
    pub fn held(&self) -> NaiveDate {
        match *self {
            Selection::Exact(d) | Selection::BeforeFirst(d) | Selection::AfterLast(d) => d,
            Selection::Between { prev, .. } => prev,
        }
    }
}

/// Capture dates of the available vegetation index rasters and their files.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSet {
    files: BTreeMap<NaiveDate, PathBuf>,
}

impl SnapshotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, path: impl Into<PathBuf>) {
        self.files.insert(date, path.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn path(&self, date: NaiveDate) -> Option<&Path> {
        self.files.get(&date).map(PathBuf::as_path)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.files.keys().copied()
    }

    /// Locate `day` among the capture dates: latest date `<= day` and earliest
    /// date `>= day`. `None` only when the set is empty.
    pub fn select(&self, day: NaiveDate) -> Option<Selection> {
        let prev = self.files.range(..=day).next_back().map(|(d, _)| *d);
        let next = self.files.range(day..).next().map(|(d, _)| *d);
        match (prev, next) {
            (Some(p), Some(n)) if p == n => Some(Selection::Exact(p)),
            (Some(prev), Some(next)) => Some(Selection::Between { prev, next }),
            (None, Some(n)) => Some(Selection::BeforeFirst(n)),
            (Some(p), None) => Some(Selection::AfterLast(p)),
            (None, None) => None,
        }
    }

    /**
    Scan `dir` for GeoTIFFs named `<prefix>..._YYYYMMDD.tif(f)`.

    Files whose stem does not end in a valid date are skipped with a warning.
    An empty `prefix` accepts any name. A missing directory is a
    `MissingInput` error; an empty result is `NoSnapshots`.
    */
    pub fn discover(dir: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| EtError::io(dir, e))?;

        let mut set = SnapshotSet::new();
        for entry in entries {
            let path = entry.map_err(|e| EtError::io(dir, e))?.path();
            let is_tiff = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_tiff || !stem.starts_with(prefix) {
                continue;
            }
            match capture_date(stem) {
                Some(date) => {
                    if let Some(previous) = set.files.insert(date, path.clone()) {
                        warn!(
                            "Two snapshots for {date}: {} replaces {}",
                            path.display(),
                            previous.display()
                        );
                    }
                }
                None => warn!("No capture date in snapshot name {}", path.display()),
            }
        }

        if set.is_empty() {
            return Err(EtError::NoSnapshots(dir.to_path_buf()));
        }
        info!("Found {} snapshots in {}", set.len(), dir.display());
        Ok(set)
    }
}

// Trailing `YYYYMMDD` of a file stem, e.g. `NDVI_dummy_20230915`
pub fn capture_date(stem: &str) -> Option<NaiveDate> {
    let digits = stem.rsplit('_').next()?;
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}
