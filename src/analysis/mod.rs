/// Analysis layer: everything computed from a loaded stack.
///
/// ```text
///  RasterStack ──► stats   (per-layer summary, covariance / correlation)
///       │     ──► calc    (per-pixel functions, standardization)
///       │     ──► sample  (random pixel time series)
///       │     ──► zonal   (statistics per burn-scar zone)
///       │     ──► pca     (components from the covariance, score maps)
///       └────► overlay (cell-wise combination, deviation maps)
/// ```

pub mod calc;
pub mod overlay;
pub mod pca;
pub mod sample;
pub mod stats;
pub mod zonal;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("need at least {needed} complete cells, found {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("per-pixel function returned {got} values, expected {expected}")]
    CalcArity { expected: usize, got: usize },

    #[error("eigen decomposition did not produce real components")]
    Decomposition,

    #[error("unknown zone {0}")]
    UnknownZone(crate::data::model::ZoneId),

    #[error("deviation needs a table of zonal means, got {0:?}")]
    NotZonalMeans(zonal::ZonalStat),
}
