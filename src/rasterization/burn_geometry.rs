/* Visit the pixels under a single building footprint */

use crate::{
    geom::{
        edges::{extract_line, extract_point, extract_ring},
        raster::RasterInfo,
    },
    rasterization::{
        burners::{FootprintStrategy, burn_point, burn_polygon},
        visitors::PixelVisitor,
    },
};
use geo_types::{Geometry, GeometryCollection, MultiPolygon, Polygon};

pub trait Burn {
    fn burn<S: FootprintStrategy, V: PixelVisitor>(&self, raster_info: &RasterInfo, visitor: &mut V);
}

impl Burn for Geometry {
    fn burn<S: FootprintStrategy, V: PixelVisitor>(&self, raster_info: &RasterInfo, visitor: &mut V) {
        match self {
            Geometry::Point(geom) => {
                let mut pixels = Vec::new();
                extract_point(&mut pixels, geom, raster_info);
                burn_point(pixels, visitor);
            }
            Geometry::MultiPoint(geom) => {
                let mut pixels = Vec::new();
                for point in geom {
                    extract_point(&mut pixels, point, raster_info);
                }
                burn_point(pixels, visitor);
            }
            Geometry::Polygon(geom) => geom.burn::<S, V>(raster_info, visitor),
            Geometry::MultiPolygon(geom) => geom.burn::<S, V>(raster_info, visitor),
            Geometry::GeometryCollection(geom) => geom.burn::<S, V>(raster_info, visitor),
            _ => (), // not a building footprint
        }
    }
}

impl Burn for GeometryCollection {
    fn burn<S: FootprintStrategy, V: PixelVisitor>(&self, raster_info: &RasterInfo, visitor: &mut V) {
        for geom in self {
            geom.burn::<S, V>(raster_info, visitor)
        }
    }
}

impl Burn for Polygon {
    fn burn<S: FootprintStrategy, V: PixelVisitor>(&self, raster_info: &RasterInfo, visitor: &mut V) {
        burn_polygons::<S, V>(std::slice::from_ref(self), raster_info, visitor)
    }
}

impl Burn for MultiPolygon {
    fn burn<S: FootprintStrategy, V: PixelVisitor>(&self, raster_info: &RasterInfo, visitor: &mut V) {
        burn_polygons::<S, V>(&self.0, raster_info, visitor)
    }
}

fn burn_polygons<S: FootprintStrategy, V: PixelVisitor>(polygons: &[Polygon], raster_info: &RasterInfo, visitor: &mut V) {
    // edges of all parts are filled together so holes and parts follow even-odd
    let mut polyedges = Vec::new();
    for polygon in polygons {
        extract_ring(&mut polyedges, polygon.exterior(), raster_info);
        for hole in polygon.interiors() {
            extract_ring(&mut polyedges, hole, raster_info);
        }
    }

    if S::IS_ALL_TOUCHED {
        let mut linedges = Vec::new();
        for polygon in polygons {
            extract_line(&mut linedges, polygon.exterior(), raster_info);
            for hole in polygon.interiors() {
                extract_line(&mut linedges, hole, raster_info);
            }
        }
        S::burn_boundary(linedges, raster_info, visitor);
    }

    burn_polygon(polyedges, raster_info, visitor);
}
