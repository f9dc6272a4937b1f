/* Error taxonomy: fatal load errors abort the pipeline, everything local to a chunk or a date becomes a warning */

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrsError {
    #[error("unsupported coordinate reference system: {0}")]
    Unsupported(String),
    #[error("coordinate ({x}, {y}) is outside the domain of {crs}")]
    OutOfDomain { crs: String, x: f64, y: f64 },
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to read raster {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode raster")]
    Tiff(#[from] tiff::TiffError),
    #[error("raster is not georeferenced: {0}")]
    MissingGeoreference(&'static str),
    #[error("unsupported raster layout: {0}")]
    UnsupportedLayout(String),
    #[error("raster has {actual} samples, expected {expected}")]
    SampleCount { expected: usize, actual: usize },
    #[error("window rows {row_start}..{row_end}, cols {col_start}..{col_end} is outside the raster")]
    WindowOutOfBounds {
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    },
    #[error("raster reader was poisoned by a panic in another worker")]
    Poisoned,
    #[error(transparent)]
    Crs(#[from] CrsError),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read building table")]
    Table(#[from] polars::error::PolarsError),
    #[error("'geometry' column not found in building table")]
    MissingGeometryColumn,
    #[error("row {row}: cannot parse geometry {text:?}: {reason}")]
    InvalidWkt { row: usize, text: String, reason: String },
    #[error("failed to read region boundary {path:?}: {reason}")]
    Boundary { path: PathBuf, reason: String },
    #[error("region boundary {0:?} contains no polygons")]
    EmptyBoundary(PathBuf),
    #[error("unsupported boundary format: {0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Crs(#[from] CrsError),
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Crs(#[from] CrsError),
    #[error("building {index} has non-finite coordinates")]
    NonFiniteCoordinates { index: usize },
    #[error("failed to assemble classified buildings")]
    Table(#[from] polars::error::PolarsError),
    #[error("failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML configuration")]
    Parse(#[from] toml::de::Error),
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,
    #[error("flood mask date {0:?} is listed more than once")]
    DuplicateDate(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}
