/* Keep the buildings that touch the region boundary */

use crate::{
    error::LoadError,
    geom::{boundary::RegionBoundary, crs::Crs, parse_geometry::BuildingTable},
};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use serde::Deserialize;

// how often a building touching several boundary polygons is emitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryMatches {
    #[default]
    Once,
    PerPolygon,
}

pub fn filter_to_region(
    buildings: &BuildingTable,
    boundary: &RegionBoundary,
    matches: BoundaryMatches,
) -> Result<BuildingTable, LoadError> {
    // the boundary index is always in EPSG:4326
    let reprojected;
    let buildings = if *buildings.crs() == Crs::WGS84 {
        buildings
    } else {
        reprojected = buildings.reproject(&Crs::WGS84)?;
        &reprojected
    };

    let mut hits: Vec<Vec<usize>> = Vec::with_capacity(buildings.len());
    buildings
        .geometries()
        .par_iter()
        .map(|geometry| boundary.matches(geometry))
        .collect_into_vec(&mut hits);

    let indices: Vec<usize> = match matches {
        BoundaryMatches::Once => hits
            .iter()
            .enumerate()
            .filter(|(_, polygons)| !polygons.is_empty())
            .map(|(row, _)| row)
            .collect(),
        BoundaryMatches::PerPolygon => hits
            .iter()
            .enumerate()
            .flat_map(|(row, polygons)| std::iter::repeat(row).take(polygons.len()))
            .collect(),
    };

    let inside = buildings.take(&indices)?;
    log::info!(
        "{} of {} buildings intersect the region boundary",
        inside.len(),
        buildings.len()
    );
    Ok(inside)
}
