use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TIFF error in {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("Shape mismatch or conversion error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Unsupported pixel format in {0}")]
    UnsupportedPixelFormat(PathBuf),

    #[error("invalid date pattern: {0}")]
    DatePattern(#[from] regex::Error),

    #[error("no acquisition date in '{file}': {reason}")]
    DateParse { file: String, reason: String },

    #[error("bad glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("no dated rasters matched {0}")]
    NoRasters(String),

    #[error("{what} is not aligned with the reference grid: {detail}")]
    Misaligned { what: String, detail: String },

    #[error("crop extent {0} does not overlap the raster")]
    EmptyCrop(String),

    #[error("invalid geometry in feature {feature}: {reason}")]
    InvalidGeometry { feature: usize, reason: String },

    #[error("malformed zone file {path}: {reason}")]
    ZoneFile { path: PathBuf, reason: String },

    #[error("invalid geometries and no fallback zone raster configured")]
    NoZoneFallback(#[source] Box<RasterError>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("PNG encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl RasterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RasterError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn tiff(path: impl Into<PathBuf>, source: tiff::TiffError) -> Self {
        RasterError::Tiff {
            path: path.into(),
            source,
        }
    }
}
