/*
Parse the WKT `geometry` column of a building table.
Rows are kept when their cleaned text starts with POINT, POLYGON or MULTIPOLYGON.
*/

use crate::{
    encoding::buildings::write_csv,
    error::{CrsError, LoadError},
    geom::crs::{Crs, Transformer},
};
use geo::{Area, Centroid};
use geo_types::Geometry;
use polars::prelude::*;
use serde::Deserialize;
use std::io::Write;
use wkt::{ToWkt, TryFromWkt};

pub const GEOMETRY_COLUMN: &str = "geometry";
const ACCEPTED_PREFIXES: [&str; 3] = ["POINT", "POLYGON", "MULTIPOLYGON"];

// what to do with text that passes the prefix check but is not valid WKT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidWktPolicy {
    #[default]
    Fail,
    Drop,
}

/// Building rows with their parsed footprints.
///
/// `frame` keeps every input column verbatim (including the original geometry text);
/// `geometries[i]` is the footprint of row `i`.
#[derive(Debug, Clone)]
pub struct BuildingTable {
    frame: DataFrame,
    geometries: Vec<Geometry>,
    crs: Crs,
}

impl BuildingTable {
    pub fn new(frame: DataFrame, geometries: Vec<Geometry>, crs: Crs) -> Result<Self, PolarsError> {
        if frame.height() != geometries.len() {
            polars_bail!(ShapeMismatch: "{} rows but {} geometries", frame.height(), geometries.len());
        }
        Ok(Self { frame, geometries, crs })
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    pub fn attributes(&self) -> &DataFrame {
        &self.frame
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    // rows in the given order, duplicates allowed
    pub fn take(&self, indices: &[usize]) -> Result<Self, PolarsError> {
        let idx = IdxCa::from_vec("idx".into(), indices.iter().map(|&i| i as IdxSize).collect());
        let frame = self.frame.take(&idx)?;
        let geometries = indices.iter().map(|&i| self.geometries[i].clone()).collect();
        Ok(Self {
            frame,
            geometries,
            crs: self.crs.clone(),
        })
    }

    pub fn reproject(&self, to: &Crs) -> Result<Self, CrsError> {
        if *to == self.crs {
            return Ok(self.clone());
        }
        let transformer = Transformer::new(&self.crs, to)?;
        let geometries = self
            .geometries
            .iter()
            .map(|geom| transformer.geometry(geom))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            frame: self.frame.clone(),
            geometries,
            crs: to.clone(),
        })
    }

    // each footprint replaced by its centroid, empty geometries are kept as they are
    pub fn to_centroids(&self) -> Self {
        let geometries = self
            .geometries
            .iter()
            .map(|geom| geom.centroid().map(Geometry::Point).unwrap_or_else(|| geom.clone()))
            .collect();
        Self {
            frame: self.frame.clone(),
            geometries,
            crs: self.crs.clone(),
        }
    }

    // in squared CRS units, None for an empty table
    pub fn mean_footprint_area(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let total: f64 = self.geometries.iter().map(|geom| geom.unsigned_area()).sum();
        Some(total / self.len() as f64)
    }

    // attributes with the geometry column rewritten as WKT of the current footprints
    pub fn to_frame(&self) -> Result<DataFrame, PolarsError> {
        let wkts: Vec<String> = self.geometries.iter().map(|geom| geom.wkt_string()).collect();
        let mut frame = self.frame.clone();
        frame.with_column(Column::new(GEOMETRY_COLUMN.into(), wkts))?;
        Ok(frame)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), PolarsError> {
        let mut frame = self.to_frame()?;
        write_csv(&mut frame, writer)
    }
}

fn clean_wkt(text: &str) -> String {
    // quotes go after trimming, so a space left behind them fails the prefix check
    text.trim().replace('"', "")
}

fn has_accepted_prefix(text: &str) -> bool {
    ACCEPTED_PREFIXES.iter().any(|prefix| text.starts_with(prefix))
}

pub fn parse_buildings(frame: DataFrame, policy: InvalidWktPolicy) -> Result<BuildingTable, LoadError> {
    let column = frame
        .column(GEOMETRY_COLUMN)
        .map_err(|_| LoadError::MissingGeometryColumn)?
        .cast(&DataType::String)?;
    let texts = column.as_materialized_series().str()?;

    let mut keep: Vec<bool> = Vec::with_capacity(frame.height());
    let mut geometries: Vec<Geometry> = Vec::with_capacity(frame.height());
    let (mut rejected, mut unparsable) = (0usize, 0usize);

    for (row, text) in texts.into_iter().enumerate() {
        let Some(cleaned) = text.map(clean_wkt).filter(|t| has_accepted_prefix(t)) else {
            rejected += 1;
            keep.push(false);
            continue;
        };

        match Geometry::<f64>::try_from_wkt_str(&cleaned) {
            Ok(geometry) => {
                geometries.push(geometry);
                keep.push(true);
            }
            Err(err) => match policy {
                InvalidWktPolicy::Fail => {
                    return Err(LoadError::InvalidWkt {
                        row,
                        text: cleaned,
                        reason: err.to_string(),
                    });
                }
                InvalidWktPolicy::Drop => {
                    log::warn!("Dropping row {}: cannot parse geometry {:?}: {}", row, cleaned, err);
                    unparsable += 1;
                    keep.push(false);
                }
            },
        }
    }

    let frame = if rejected + unparsable == 0 {
        frame
    } else {
        let mask = BooleanChunked::from_iter_values("keep".into(), keep.into_iter());
        frame.filter(&mask)?
    };

    log::info!(
        "Parsed {} building geometries ({} rows without a supported geometry, {} unparsable)",
        geometries.len(),
        rejected,
        unparsable
    );
    Ok(BuildingTable::new(frame, geometries, Crs::WGS84)?)
}
