/* Structure to contain information on raster grids and pixel windows */

use crate::{error::RasterError, geom::crs::Crs};
use geo_types::{Rect, coord};
use ndarray::{Array2, s};

#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub ncols: usize,
    pub nrows: usize,
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub xres: f64,
    pub yres: f64,
    pub crs: Crs,
}

// half-open pixel range [row_start, row_end) x [col_start, col_end)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl PixelWindow {
    pub fn nrows(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn ncols(&self) -> usize {
        self.col_end - self.col_start
    }

    pub fn is_empty(&self) -> bool {
        self.nrows() == 0 || self.ncols() == 0
    }
}

impl RasterInfo {
    // north-up grid anchored at its upper-left corner
    pub fn from_origin(xmin: f64, ymax: f64, xres: f64, yres: f64, ncols: usize, nrows: usize, crs: Crs) -> Self {
        Self {
            ncols,
            nrows,
            xmin,
            xmax: xmin + ncols as f64 * xres,
            ymin: ymax - nrows as f64 * yres,
            ymax,
            xres,
            yres,
            crs,
        }
    }

    pub fn bounds(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.xmin, y: self.ymin },
            coord! { x: self.xmax, y: self.ymax },
        )
    }

    #[inline]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.xmin) / self.xres, (self.ymax - y) / self.yres)
    }

    // pixels possibly touched by a world-space rectangle, clipped to the grid
    pub fn window_for(&self, rect: &Rect<f64>) -> Option<PixelWindow> {
        let (c0, r0) = self.world_to_pixel(rect.min().x, rect.max().y);
        let (c1, r1) = self.world_to_pixel(rect.max().x, rect.min().y);
        if !(c0.is_finite() && r0.is_finite() && c1.is_finite() && r1.is_finite()) {
            return None;
        }

        let ncols = self.ncols as f64;
        let nrows = self.nrows as f64;
        if c1 < 0.0 || r1 < 0.0 || c0 >= ncols || r0 >= nrows {
            return None;
        }

        let window = PixelWindow {
            row_start: r0.floor().clamp(0.0, nrows) as usize,
            row_end: (r1.floor() + 1.0).clamp(0.0, nrows) as usize,
            col_start: c0.floor().clamp(0.0, ncols) as usize,
            col_end: (c1.floor() + 1.0).clamp(0.0, ncols) as usize,
        };

        if window.is_empty() { None } else { Some(window) }
    }

    // grid description of a window, sharing pixel alignment with the parent
    pub fn subset(&self, window: &PixelWindow) -> RasterInfo {
        RasterInfo::from_origin(
            self.xmin + window.col_start as f64 * self.xres,
            self.ymax - window.row_start as f64 * self.yres,
            self.xres,
            self.yres,
            window.ncols(),
            window.nrows(),
            self.crs.clone(),
        )
    }

    pub fn contains_window(&self, window: &PixelWindow) -> bool {
        window.row_start <= window.row_end
            && window.col_start <= window.col_end
            && window.row_end <= self.nrows
            && window.col_end <= self.ncols
    }

    // grid of the same extent with fewer pixels, used for overviews
    pub fn scaled(&self, scale: f64) -> RasterInfo {
        let ncols = ((self.ncols as f64 * scale) as usize).max(1);
        let nrows = ((self.nrows as f64 * scale) as usize).max(1);
        RasterInfo {
            ncols,
            nrows,
            xres: (self.xmax - self.xmin) / ncols as f64,
            yres: (self.ymax - self.ymin) / nrows as f64,
            ..self.clone()
        }
    }
}

// anything the classifier can sample windows from
pub trait RasterSource: Sync {
    fn info(&self) -> &RasterInfo;

    fn read_window(&self, window: &PixelWindow) -> Result<Array2<f64>, RasterError>;
}

// single-band flood mask held in memory (0 = dry/nodata, 1 = flooded)
#[derive(Debug, Clone)]
pub struct FloodRaster {
    info: RasterInfo,
    band: Array2<f64>,
}

impl FloodRaster {
    pub fn new(info: RasterInfo, band: Array2<f64>) -> Result<Self, RasterError> {
        if band.dim() != (info.nrows, info.ncols) {
            return Err(RasterError::SampleCount {
                expected: info.nrows * info.ncols,
                actual: band.len(),
            });
        }
        Ok(Self { info, band })
    }

    pub fn band(&self) -> &Array2<f64> {
        &self.band
    }

    // nearest-neighbour downsample for previews, returns the coarser grid alongside
    pub fn overview(&self, scale: f64) -> (RasterInfo, Array2<f64>) {
        if self.band.is_empty() {
            return (self.info.clone(), self.band.clone());
        }
        let scale = if scale.is_finite() && scale > 0.0 { scale.min(1.0) } else { 1.0 };
        let info = self.info.scaled(scale);

        let row_step = self.info.nrows as f64 / info.nrows as f64;
        let col_step = self.info.ncols as f64 / info.ncols as f64;
        let band = Array2::from_shape_fn((info.nrows, info.ncols), |(y, x)| {
            let sy = (((y as f64 + 0.5) * row_step) as usize).min(self.info.nrows - 1);
            let sx = (((x as f64 + 0.5) * col_step) as usize).min(self.info.ncols - 1);
            self.band[[sy, sx]]
        });

        (info, band)
    }
}

impl RasterSource for FloodRaster {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn read_window(&self, window: &PixelWindow) -> Result<Array2<f64>, RasterError> {
        if !self.info.contains_window(window) {
            return Err(RasterError::WindowOutOfBounds {
                row_start: window.row_start,
                row_end: window.row_end,
                col_start: window.col_start,
                col_end: window.col_end,
            });
        }

        Ok(self
            .band
            .slice(s![window.row_start..window.row_end, window.col_start..window.col_end])
            .to_owned())
    }
}
