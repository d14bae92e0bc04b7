//! Error types for binning.

use thiserror::Error;

/// Errors that can occur while configuring or running the binning engine.
#[derive(Error, Debug)]
pub enum BinningError {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A bin index outside `[0, num_bins)`.
    #[error("bin index {index} is outside grid range [0, {num_bins})")]
    IndexOutOfRange { index: i64, num_bins: i64 },

    /// A row outside `[0, num_rows)`.
    #[error("row {row} is outside grid range [0, {num_rows})")]
    RowOutOfRange { row: usize, num_rows: usize },

    /// A bin index that does not lie in the given row.
    #[error("bin index {index} is not part of row {row}")]
    BinNotInRow { index: i64, row: usize },

    /// Latitude or longitude is not a finite number.
    #[error("invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// An observation carries the wrong number of variable values.
    #[error("observation has {actual} variable values, expected {expected}")]
    VariableCountMismatch { expected: usize, actual: usize },

    /// A bin was aggregated into or completed after it was already completed.
    #[error("{kind} bin {index} has already been completed")]
    BinAlreadyCompleted { kind: &'static str, index: i64 },

    /// A bin was used as completed before completion.
    #[error("{kind} bin {index} has not been completed")]
    BinNotCompleted { kind: &'static str, index: i64 },

    /// A spatial bin handed to a temporal bin with a different index.
    #[error("spatial bin index {actual} does not belong to temporal bin {expected}")]
    IndexMismatch { expected: i64, actual: i64 },

    /// A bin record ended early.
    #[error("truncated bin record: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Bytes left over after the last complete bin record.
    #[error("{0} trailing bytes after the last bin record")]
    TrailingBytes(usize),

    /// A row arrived at the reprojector after a later row was already written.
    #[error("row {row} arrived after row {last_row} was already written")]
    RowOutOfOrder { row: usize, last_row: usize },

    /// Temporal bins arrived at the reprojector out of index order.
    #[error("bin index {index} arrived after bin index {previous}")]
    BinOutOfOrder { index: i64, previous: i64 },

    /// A row was handed to the reprojector without any bins.
    #[error("no bins supplied for row {0}")]
    EmptyRow(usize),

    /// A reprojector operation was called in the wrong state.
    #[error("reprojector cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// The raster consumer rejected a pixel.
    #[error("raster output failed: {0}")]
    Output(String),

    /// The worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BinningError {
    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an Output error.
    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }

    /// Whether this error indicates a broken engine or upstream contract
    /// rather than bad input data.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::BinAlreadyCompleted { .. }
                | Self::BinNotCompleted { .. }
                | Self::IndexMismatch { .. }
                | Self::RowOutOfOrder { .. }
                | Self::BinOutOfOrder { .. }
                | Self::EmptyRow(_)
                | Self::InvalidState { .. }
        )
    }
}

impl From<serde_yaml::Error> for BinningError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BinningError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for binning operations.
pub type Result<T> = std::result::Result<T, BinningError>;
