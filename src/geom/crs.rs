/*
Coordinate reference systems and reprojection between them through PROJ.
A CRS is kept as an EPSG code or as a definition PROJ can read (WKT, PROJJSON, "AUTH:CODE").
 */

use crate::error::CrsError;
use geo::MapCoords;
use geo_types::{Coord, Geometry};
use proj::Proj;
use std::{borrow::Cow, fmt, sync::Arc};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    Epsg(u32),
    Definition(Arc<str>),
}

impl Default for Crs {
    fn default() -> Self {
        Crs::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Definition(definition) => {
                let short: String = definition.chars().take(60).collect();
                if short.len() < definition.len() {
                    write!(f, "{short}...")
                } else {
                    write!(f, "{short}")
                }
            }
        }
    }
}

impl Crs {
    pub const WGS84: Crs = Crs::Epsg(4326);

    // checked against the PROJ database
    pub fn from_epsg(code: u32) -> Result<Self, CrsError> {
        let code = match code {
            // legacy Web Mercator identifiers
            900913 | 102100 | 102113 => 3857,
            code => code,
        };
        let crs = Crs::Epsg(code);
        crs.check()?;
        Ok(crs)
    }

    pub fn from_definition(definition: &str) -> Result<Self, CrsError> {
        let definition = definition.trim();
        if definition.is_empty() {
            return Err(CrsError::Unsupported("empty CRS definition".to_string()));
        }
        let crs = Crs::Definition(Arc::from(definition));
        crs.check()?;
        Ok(crs)
    }

    /// Parses the identifiers found in GeoJSON `crs` members:
    /// `EPSG:3857`, `urn:ogc:def:crs:EPSG::3857`, `urn:ogc:def:crs:OGC:1.3:CRS84`.
    /// Anything else is handed to PROJ as is.
    pub fn from_name(name: &str) -> Result<Self, CrsError> {
        let trimmed = name.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Ok(Crs::WGS84);
        }

        let code = upper
            .rsplit(':')
            .next()
            .and_then(|tail| tail.parse::<u32>().ok())
            .filter(|_| upper.contains("EPSG"));

        match code {
            Some(code) => Crs::from_epsg(code),
            None => Crs::from_definition(trimmed),
        }
    }

    // ESRI or OGC WKT from a shapefile `.prj` sidecar
    pub fn from_prj(wkt: &str) -> Result<Self, CrsError> {
        Crs::from_definition(wkt)
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Definition(_) => None,
        }
    }

    fn definition(&self) -> Cow<'_, str> {
        match self {
            Crs::Epsg(code) => Cow::Owned(format!("EPSG:{code}")),
            Crs::Definition(definition) => Cow::Borrowed(definition),
        }
    }

    fn check(&self) -> Result<(), CrsError> {
        if *self != Crs::WGS84 {
            Transformer::new(self, &Crs::WGS84)?;
        }
        Ok(())
    }
}

/// Coordinate transformation between two CRSs, lon/lat axis order for geographic ones.
///
/// Holds a PROJ context, so it is `Send` but not `Sync`: build one per thread.
pub struct Transformer {
    proj: Option<Proj>,
    to: Crs,
}

impl Transformer {
    pub fn new(from: &Crs, to: &Crs) -> Result<Self, CrsError> {
        if from == to {
            return Ok(Self {
                proj: None,
                to: to.clone(),
            });
        }

        let proj = Proj::new_known_crs(&from.definition(), &to.definition(), None)
            .map_err(|err| CrsError::Unsupported(format!("{from} -> {to}: {err}")))?;
        Ok(Self {
            proj: Some(proj),
            to: to.clone(),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.proj.is_none()
    }

    pub fn coord(&self, c: Coord<f64>) -> Result<Coord<f64>, CrsError> {
        let Some(proj) = &self.proj else {
            return Ok(c);
        };

        match proj.convert((c.x, c.y)) {
            Ok((x, y)) if x.is_finite() && y.is_finite() => Ok(Coord { x, y }),
            _ => Err(CrsError::OutOfDomain {
                crs: self.to.to_string(),
                x: c.x,
                y: c.y,
            }),
        }
    }

    pub fn geometry(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>, CrsError> {
        if self.is_identity() {
            return Ok(geometry.clone());
        }
        geometry.try_map_coords(|c| self.coord(c))
    }
}

pub fn reproject(geometry: &Geometry<f64>, from: &Crs, to: &Crs) -> Result<Geometry<f64>, CrsError> {
    Transformer::new(from, to)?.geometry(geometry)
}
