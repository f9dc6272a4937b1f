/*
Detect buildings affected by floods.
Building footprints are filtered to a region and sampled against one binary flood mask per date.
*/

pub mod encoding {
    pub mod buildings;
    pub mod geotiff;
}
pub mod geom {
    pub mod boundary;
    pub mod crs;
    pub mod edges;
    pub mod parse_geometry;
    pub mod raster;
}
pub mod rasterization {
    pub mod burn_geometry;
    pub mod burners;
    pub mod visitors;
    pub mod zonal;
}
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prelude;

#[cfg(feature = "python")]
mod python;

pub use pipeline::{assess, assess_frame};
