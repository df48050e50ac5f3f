use std::path::PathBuf;

use thiserror::Error;

/// Why a single geocoding lookup failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeocodeFailure {
    #[error("no match found")]
    NotFound,
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by the geocoding service")]
    RateLimited,
    #[error("{0}")]
    Service(String),
}

/// Every way a pipeline run can abort. None of these are retried.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Could not load {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Column '{0}' not found")]
    ColumnMissing(String),

    #[error("Invalid coordinate '{value}' in column '{column}' of row {row}")]
    InvalidCoordinate {
        row: usize,
        column: String,
        value: String,
    },

    #[error("The collection has no CRS set")]
    CrsNotSet,

    #[error("Unsupported CRS '{0}'")]
    UnsupportedCrs(String),

    #[error("CRS mismatch between {left} and {right}")]
    CrsMismatch { left: String, right: String },

    #[error("Geocoding '{query}' failed: {reason}")]
    Geocode {
        query: String,
        reason: GeocodeFailure,
    },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Cannot {operation} a {geometry_type} geometry")]
    UnsupportedGeometry {
        operation: &'static str,
        geometry_type: &'static str,
    },

    #[error("Could not project coordinate ({x}, {y}): {reason}")]
    Projection { x: f64, y: f64, reason: String },

    #[error("Could not write {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },
}

impl PipelineError {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
