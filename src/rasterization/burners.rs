/*
Pixel selection for building footprints.
The AllTouched strategy has been adapted from GDAL: https://github.com/OSGeo/gdal/blob/63396dbf42999441478e036ebb145725de09f7ce/alg/llrasterize.cpp#L407
Primarily for output consistency with rasterio/rasterstats.
*/

use crate::{
    geom::{
        edges::{LineEdge, PixelEdge, PolyEdge},
        raster::RasterInfo,
    },
    rasterization::visitors::PixelVisitor,
};

pub struct CenterOnly;
pub struct AllTouched;

const EPSILON_INTERSECT: f64 = 1e-4;
const TOLERANCE: f64 = 1e-9;

pub trait FootprintStrategy {
    const IS_ALL_TOUCHED: bool;

    fn burn_boundary<V: PixelVisitor>(linedges: Vec<LineEdge>, raster_info: &RasterInfo, visitor: &mut V);
}

// only pixels whose centre falls inside the polygon, boundary is not burned
impl FootprintStrategy for CenterOnly {
    const IS_ALL_TOUCHED: bool = false;

    fn burn_boundary<V: PixelVisitor>(_linedges: Vec<LineEdge>, _raster_info: &RasterInfo, _visitor: &mut V) {}
}

impl FootprintStrategy for AllTouched {
    const IS_ALL_TOUCHED: bool = true;

    fn burn_boundary<V: PixelVisitor>(linedges: Vec<LineEdge>, raster_info: &RasterInfo, visitor: &mut V) {
        let nrows = raster_info.nrows as isize;
        let ncols = raster_info.ncols as isize;
        let nrows_f64 = raster_info.nrows as f64;
        let ncols_f64 = raster_info.ncols as f64;

        for edge in linedges.iter() {
            let mut df_x = edge.x0;
            let mut df_y = edge.y0;
            let mut df_x_end = edge.x1;
            let mut df_y_end = edge.y1;

            // proceed left-to-right
            if df_x > df_x_end {
                std::mem::swap(&mut df_x, &mut df_x_end);
                std::mem::swap(&mut df_y, &mut df_y_end);
            }

            // vertical lines
            if (df_x - df_x_end).abs() < 0.01 {
                if df_y_end < df_y {
                    std::mem::swap(&mut df_y, &mut df_y_end);
                }

                let ix = df_x_end.floor() as isize;
                let iy = (df_y.floor() as isize).max(0);
                let iy_end = ((df_y_end - EPSILON_INTERSECT).floor() as isize).min(nrows - 1);

                if ix < 0 || ix >= ncols {
                    continue;
                }

                for y in iy..=iy_end {
                    visitor.visit(y as usize, ix as usize);
                }
                continue;
            }

            // horizontal lines
            if (df_y - df_y_end).abs() < 0.01 {
                let ix = (df_x.floor() as isize).max(0);
                let iy = df_y.floor() as isize;
                let ix_end = ((df_x_end - EPSILON_INTERSECT).floor() as isize).min(ncols - 1);

                if iy < 0 || iy >= nrows {
                    continue;
                }

                for x in ix..=ix_end {
                    visitor.visit(iy as usize, x as usize);
                }
                continue;
            }

            // sloped line
            let slope = (df_y_end - df_y) / (df_x_end - df_x);
            let inv_slope = 1.0 / slope;

            // clip along x axis
            if df_x < 0.0 {
                df_y += (0.0 - df_x) * slope;
                df_x = 0.0;
            }
            if df_x_end > ncols_f64 {
                df_y_end += (ncols_f64 - df_x_end) * slope;
                df_x_end = ncols_f64;
            }

            // clip along y axis
            if df_y < 0.0 {
                df_x += (0.0 - df_y) * inv_slope;
                df_y = 0.0;
            } else if df_y > nrows_f64 {
                df_x += (nrows_f64 - df_y) * inv_slope;
                df_y = nrows_f64;
            }

            if df_y_end < 0.0 {
                df_x_end += (0.0 - df_y_end) * inv_slope;
            } else if df_y_end > nrows_f64 {
                df_x_end += (nrows_f64 - df_y_end) * inv_slope;
            }

            df_x = df_x.clamp(0.0, ncols_f64);
            df_x_end = df_x_end.clamp(0.0, ncols_f64);

            while df_x >= 0.0 && df_x < df_x_end {
                let ix = df_x.floor() as isize;
                let iy = df_y.floor() as isize;

                if ix >= 0 && ix < ncols && iy >= 0 && iy < nrows {
                    visitor.visit(iy as usize, ix as usize);
                }

                let mut sx = (df_x + 1.0).floor() - df_x;
                let mut sy = sx * slope;

                if (df_y + sy).floor() as isize == iy {
                    df_x += sx;
                    df_y += sy;
                } else if slope < 0.0 {
                    sy = iy as f64 - df_y;
                    if sy > -TOLERANCE {
                        sy = -TOLERANCE;
                    }
                    sx = sy / slope;
                    df_x += sx;
                    df_y += sy;
                } else {
                    sy = (iy + 1) as f64 - df_y;
                    if sy < TOLERANCE {
                        sy = TOLERANCE;
                    }
                    sx = sy / slope;
                    df_x += sx;
                    df_y += sy;
                }
            }
        }
    }
}

pub fn burn_point<V: PixelVisitor>(pixels: Vec<PixelEdge>, visitor: &mut V) {
    for pixel in pixels {
        visitor.visit(pixel.y, pixel.x);
    }
}

// even-odd scanline fill over pixel centres
pub fn burn_polygon<V: PixelVisitor>(mut polyedges: Vec<PolyEdge>, raster_info: &RasterInfo, visitor: &mut V) {
    if polyedges.is_empty() {
        return;
    }

    polyedges.sort_unstable_by_key(|edge| edge.ystart);

    let mut yline = polyedges[0].ystart;
    let mut active_edges: Vec<PolyEdge> = Vec::new();

    let ncols = raster_info.ncols as f64;
    while yline < raster_info.nrows && (!active_edges.is_empty() || !polyedges.is_empty()) {
        // transfer current edges to active edges
        let split_idx = polyedges.partition_point(|edge| edge.ystart <= yline);
        active_edges.extend(polyedges.drain(..split_idx));

        // remove finished edges
        active_edges.retain(|edge| edge.yend > yline);
        if active_edges.is_empty() {
            yline += 1;
            continue;
        }

        for edge in active_edges.iter_mut() {
            edge.x_at_yline = edge.intersect_at(yline);
        }
        active_edges.sort_unstable_by(|a, b| a.x_at_yline.total_cmp(&b.x_at_yline));

        for pair in active_edges.chunks_exact(2) {
            // round down like GDAL
            let xstart = (pair[0].x_at_yline + 0.5).floor().clamp(0.0, ncols) as usize;
            let xend = (pair[1].x_at_yline + 0.5).floor().clamp(0.0, ncols) as usize;

            for xpix in xstart..xend {
                visitor.visit(yline, xpix);
            }
        }

        yline += 1;
    }
}
