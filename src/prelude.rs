/* Common imports for library users */

pub use crate::{
    config::{PipelineConfig, Policies},
    encoding::{
        buildings::{read_buildings_csv, read_buildings_str, write_csv_file},
        geotiff::GeoTiffRaster,
    },
    error::{ClassifyError, ConfigError, CrsError, LoadError, PipelineError, RasterError},
    geom::{
        boundary::RegionBoundary,
        crs::{Crs, Transformer, reproject},
        parse_geometry::{BuildingTable, InvalidWktPolicy, parse_buildings},
        raster::{FloodRaster, PixelWindow, RasterInfo, RasterSource},
    },
    pipeline::{
        aggregate::{
            AssessmentOutcome, FloodAssessment, FloodMask, Summary, TrendPoint, Warning, assess_dates,
            assess_dates_with, percent_affected,
        },
        assess, assess_frame,
        classify::{ChunkFailure, Classification, ClassifierOptions, FloodClassifier},
        filter::{BoundaryMatches, filter_to_region},
    },
    rasterization::zonal::{ZonalOptions, ZonalStats, zonal_stats},
};
