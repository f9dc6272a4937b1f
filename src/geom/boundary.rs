/*
Region boundary polygons, reprojected to EPSG:4326 and indexed in an R-tree.
Loaded from GeoJSON or ESRI Shapefile.
*/

use crate::{
    error::LoadError,
    geom::crs::{Crs, Transformer},
};
use geo::{BoundingRect, Intersects, MapCoords};
use geo_types::{Geometry, MultiPolygon, Rect};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use std::{
    fs,
    path::{Path, PathBuf},
};

struct BoundaryEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

pub struct RegionBoundary {
    tree: RTree<BoundaryEntry>,
    bounds: Option<Rect<f64>>,
}

impl RegionBoundary {
    /// Builds the index from polygons already expressed in EPSG:4326.
    /// Polygon `i` keeps index `i` in match results.
    pub fn from_polygons(polygons: Vec<MultiPolygon<f64>>) -> Self {
        let bounds = polygons
            .iter()
            .filter_map(|polygon| polygon.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                    (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
                )
            });

        let entries = polygons
            .into_iter()
            .enumerate()
            .filter_map(|(index, polygon)| {
                let rect = polygon.bounding_rect()?;
                Some(BoundaryEntry {
                    index,
                    envelope: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                    polygon,
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
            bounds,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let (polygons, crs) = match extension.as_str() {
            "geojson" | "json" => {
                let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                read_geojson(&text, path)?
            }
            "shp" => read_shapefile(path)?,
            other => return Err(LoadError::UnsupportedFormat(format!("{other:?} ({path:?})"))),
        };

        Self::from_source_polygons(polygons, crs, path)
    }

    pub fn from_geojson_str(text: &str) -> Result<Self, LoadError> {
        let source = PathBuf::from("<geojson>");
        let (polygons, crs) = read_geojson(text, &source)?;
        Self::from_source_polygons(polygons, crs, &source)
    }

    fn from_source_polygons(polygons: Vec<MultiPolygon<f64>>, crs: Crs, source: &Path) -> Result<Self, LoadError> {
        if polygons.is_empty() {
            return Err(LoadError::EmptyBoundary(source.to_path_buf()));
        }

        let to_wgs84 = Transformer::new(&crs, &Crs::WGS84)?;
        let polygons = polygons
            .iter()
            .map(|polygon| polygon.try_map_coords(|c| to_wgs84.coord(c)))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!("Loaded {} boundary polygons from {:?} ({})", polygons.len(), source, crs);
        Ok(Self::from_polygons(polygons))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }

    /// Indices of the boundary polygons a building touches, ascending.
    pub fn matches(&self, geometry: &Geometry<f64>) -> Vec<usize> {
        let Some(rect) = geometry.bounding_rect() else {
            return Vec::new();
        };
        let query = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

        let mut found: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .filter(|entry| intersects(geometry, &entry.polygon))
            .map(|entry| entry.index)
            .collect();
        found.sort_unstable();
        found
    }
}

// closed-set intersection, touching the boundary counts
fn intersects(geometry: &Geometry<f64>, region: &MultiPolygon<f64>) -> bool {
    match geometry {
        Geometry::Point(geom) => geom.intersects(region),
        Geometry::MultiPoint(geom) => geom.intersects(region),
        Geometry::Polygon(geom) => geom.intersects(region),
        Geometry::MultiPolygon(geom) => geom.intersects(region),
        Geometry::LineString(geom) => geom.intersects(region),
        Geometry::MultiLineString(geom) => geom.intersects(region),
        Geometry::GeometryCollection(geom) => geom.iter().any(|part| intersects(part, region)),
        _ => false, // not produced by the building parser
    }
}

fn as_multipolygon(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(polygon) => Some(MultiPolygon(vec![polygon])),
        Geometry::MultiPolygon(polygon) => Some(polygon),
        _ => None,
    }
}

fn convert_geojson_geometry(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geometry: Geometry<f64> = geometry.try_into().ok()?;
    as_multipolygon(geometry)
}

// legacy `crs` member: {"type": "name", "properties": {"name": "EPSG:32636"}}
fn geojson_crs(foreign_members: Option<&geojson::JsonObject>) -> Result<Crs, LoadError> {
    let name = foreign_members
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|properties| properties.get("name"))
        .and_then(|name| name.as_str());

    match name {
        Some(name) => Ok(Crs::from_name(name)?),
        None => Ok(Crs::WGS84),
    }
}

fn read_geojson(text: &str, path: &Path) -> Result<(Vec<MultiPolygon<f64>>, Crs), LoadError> {
    let geojson: GeoJson = text.parse().map_err(|err: geojson::Error| LoadError::Boundary {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let mut skipped = 0usize;
    let (polygons, crs) = match geojson {
        GeoJson::FeatureCollection(collection) => {
            let crs = geojson_crs(collection.foreign_members.as_ref())?;
            let polygons = collection
                .features
                .into_iter()
                .filter_map(|feature| {
                    let polygon = feature.geometry.and_then(convert_geojson_geometry);
                    if polygon.is_none() {
                        skipped += 1;
                    }
                    polygon
                })
                .collect();
            (polygons, crs)
        }
        GeoJson::Feature(feature) => {
            let crs = geojson_crs(feature.foreign_members.as_ref())?;
            (feature.geometry.and_then(convert_geojson_geometry).into_iter().collect(), crs)
        }
        GeoJson::Geometry(geometry) => {
            let crs = geojson_crs(geometry.foreign_members.as_ref())?;
            (convert_geojson_geometry(geometry).into_iter().collect(), crs)
        }
    };

    if skipped > 0 {
        log::warn!("Skipped {} boundary features without polygon geometry in {:?}", skipped, path);
    }
    Ok((polygons, crs))
}

fn read_shapefile(path: &Path) -> Result<(Vec<MultiPolygon<f64>>, Crs), LoadError> {
    let boundary_error = |reason: String| LoadError::Boundary {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = shapefile::ShapeReader::from_path(path).map_err(|err| boundary_error(err.to_string()))?;

    let mut polygons = Vec::new();
    for shape in reader.iter_shapes() {
        let shape = shape.map_err(|err| boundary_error(err.to_string()))?;
        let polygon: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|err| boundary_error(format!("failed to convert polygon: {err:?}")))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|err| boundary_error(format!("failed to convert polygonM: {err:?}")))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|err| boundary_error(format!("failed to convert polygonZ: {err:?}")))?,
            _ => continue, // only polygons delimit a region
        };
        polygons.push(polygon);
    }

    let prj = path.with_extension("prj");
    let crs = match fs::read_to_string(&prj) {
        Ok(wkt) => Crs::from_prj(&wkt)?,
        Err(_) => {
            log::warn!("No readable {:?}, assuming EPSG:4326", prj);
            Crs::WGS84
        }
    };

    Ok((polygons, crs))
}
