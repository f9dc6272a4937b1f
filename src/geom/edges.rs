/* Footprint edges in pixel space, extracted from building geometries */

use crate::geom::raster::RasterInfo;
use geo::CoordsIter;
use geo_types::{LineString, Point};
use ndarray::Array2;

pub struct PixelEdge {
    pub x: usize,
    pub y: usize,
}

pub struct PolyEdge {
    pub ystart: usize,
    pub yend: usize,
    x0: f64,
    y0: f64,
    dxdy: f64,           // slope
    pub x_at_yline: f64, // x intersection with y line
}

impl PolyEdge {
    fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        // make sure we go from top to bottom
        let (x_top, y_top, x_bot, y_bot) = if y0 < y1 { (x0, y0, x1, y1) } else { (x1, y1, x0, y0) };

        // first and last pixel rows whose centre the edge crosses
        let ystart = (y_top - 0.5).ceil().max(0.0) as usize;
        let yend = (y_bot - 0.5).ceil().max(0.0) as usize;

        Self {
            ystart,
            yend,
            x0: x_top,
            y0: y_top,
            dxdy: (x_bot - x_top) / (y_bot - y_top),
            x_at_yline: f64::NAN,
        }
    }

    #[inline]
    pub fn intersect_at(&self, yline: usize) -> f64 {
        let center_y = yline as f64 + 0.5;
        self.x0 + (center_y - self.y0) * self.dxdy
    }
}

// boundary segment in continuous pixel coordinates
pub struct LineEdge {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

fn build_node_array(line: &LineString) -> Array2<f64> {
    // Nx2 array of nodes (x, y)
    let mut node_array = Array2::<f64>::zeros((line.coords_count(), 2));
    line.coords_iter().enumerate().for_each(|(i, coord)| {
        node_array[[i, 0]] = coord.x;
        node_array[[i, 1]] = coord.y;
    });
    node_array
}

pub fn extract_point(edges: &mut Vec<PixelEdge>, point: &Point<f64>, raster_info: &RasterInfo) {
    let (x, y) = raster_info.world_to_pixel(point.x(), point.y());

    // only keep if inside raster
    if x >= 0.0 && x < raster_info.ncols as f64 && y >= 0.0 && y < raster_info.nrows as f64 {
        edges.push(PixelEdge {
            x: x as usize,
            y: y as usize,
        });
    }
}

pub fn extract_ring(edges: &mut Vec<PolyEdge>, ring: &LineString<f64>, raster_info: &RasterInfo) {
    let node_array = build_node_array(ring);
    if node_array.nrows() < 2 {
        return;
    }

    let rows = raster_info.nrows as f64;
    for i in 0..node_array.nrows() - 1 {
        let (x0, y0) = raster_info.world_to_pixel(node_array[[i, 0]], node_array[[i, 1]]);
        let (x1, y1) = raster_info.world_to_pixel(node_array[[i + 1, 0]], node_array[[i + 1, 1]]);

        // skip horizontal
        if (y0 - y1).abs() >= f64::EPSILON {
            // only keep if inside the raster rows
            if y0.min(y1) < rows && y0.max(y1) >= 0.0 {
                edges.push(PolyEdge::new(x0, y0, x1, y1));
            }
        }
    }
}

pub fn extract_line(edges: &mut Vec<LineEdge>, ring: &LineString<f64>, raster_info: &RasterInfo) {
    let node_array = build_node_array(ring);
    if node_array.nrows() < 2 {
        return;
    }

    let rows = raster_info.nrows as f64;
    let cols = raster_info.ncols as f64;
    for i in 0..node_array.nrows() - 1 {
        let (x0, y0) = raster_info.world_to_pixel(node_array[[i, 0]], node_array[[i, 1]]);
        let (x1, y1) = raster_info.world_to_pixel(node_array[[i + 1, 0]], node_array[[i + 1, 1]]);

        // only keep if inside the raster
        if x0.min(x1) < cols && x0.max(x1) >= 0.0 && y0.min(y1) < rows && y0.max(y1) >= 0.0 {
            edges.push(LineEdge { x0, y0, x1, y1 });
        }
    }
}
