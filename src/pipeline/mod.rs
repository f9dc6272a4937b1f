/* End-to-end flood assessment: parse, filter to the region, classify every date */

pub mod aggregate;
pub mod classify;
pub mod filter;

use crate::{
    config::PipelineConfig,
    encoding::buildings::read_buildings_csv,
    error::PipelineError,
    geom::{boundary::RegionBoundary, parse_geometry::parse_buildings},
    pipeline::{
        aggregate::{AssessmentOutcome, assess_dates},
        classify::FloodClassifier,
        filter::filter_to_region,
    },
};
use polars::prelude::DataFrame;

pub fn assess(config: &PipelineConfig) -> Result<AssessmentOutcome, PipelineError> {
    config.validate()?;
    let frame = read_buildings_csv(&config.buildings)?;
    assess_frame(frame, config)
}

// same as `assess` for a building table that is already in memory
pub fn assess_frame(frame: DataFrame, config: &PipelineConfig) -> Result<AssessmentOutcome, PipelineError> {
    config.validate()?;

    // fatal load errors surface before any classification runs
    let boundary = RegionBoundary::load(&config.boundary)?;
    let buildings = parse_buildings(frame, config.policies.invalid_wkt)?;
    let inside = filter_to_region(&buildings, &boundary, config.policies.boundary_matches)?;

    let classifier = FloodClassifier::new(config.classifier)?;
    Ok(assess_dates(&classifier, inside, &config.flood_mask))
}
