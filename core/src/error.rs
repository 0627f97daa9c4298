use thiserror::Error;

use crate::buhlmann::TissueState;

/// Error type for plan construction and the planner services.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("invalid gas mix: {0}")]
    InvalidGasMix(String),

    #[error("no active gas usable at {depth_m:.0} m")]
    NoGasForDepth { depth_m: f64 },

    #[error("ascent cannot clear the ceiling at {depth_m:.0} m within {max_stop_min} minutes")]
    Unplannable {
        depth_m: f64,
        max_stop_min: u32,
        /// Tissue state at the stop that failed to clear.
        tissue: TissueState,
    },

    #[error("planner service cancelled")]
    Cancelled,
}

/// Error type for the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported data file version {0}")]
    UnsupportedVersion(u32),

    #[error("malformed data file: {0}")]
    Malformed(String),

    #[error("no platform data directory available")]
    NoDataDir,
}
