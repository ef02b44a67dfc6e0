use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the ET0 / Kc / ETc pipeline.
///
/// Failures confined to one weather row or one simulated day are not
/// propagated with this type; they are recorded in the run reports.
#[derive(Error, Debug)]
pub enum EtError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TIFF error on {}: {source}", path.display())]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Missing input: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Missing column '{0}' in weather table")]
    MissingColumn(String),

    #[error("No vegetation index snapshots found in {}", .0.display())]
    NoSnapshots(PathBuf),

    #[error("Unsupported raster: {0}")]
    UnsupportedRaster(String),

    #[error("Grid shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid model input: {0}")]
    InvalidInput(String),
}

impl EtError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            EtError::MissingInput(path)
        } else {
            EtError::Io { path, source }
        }
    }

    pub(crate) fn tiff(path: impl Into<PathBuf>, source: tiff::TiffError) -> Self {
        match source {
            tiff::TiffError::IoError(e) => EtError::io(path, e),
            other => EtError::Tiff {
                path: path.into(),
                source: other,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, EtError>;
