/* Handle what happens to each pixel a footprint covers */

use crate::geom::raster::PixelWindow;
use fixedbitset::FixedBitSet;
use ndarray::ArrayView2;

pub trait PixelVisitor {
    fn visit(&mut self, y: usize, x: usize);
}

// remembers visited pixels inside a footprint's window so overlapping
// boundary and fill passes (or overlapping polygon parts) count once
pub struct PixelCache {
    bits: FixedBitSet,
    window: PixelWindow,
}

impl PixelCache {
    pub fn new(window: PixelWindow) -> Self {
        Self {
            bits: FixedBitSet::with_capacity(window.nrows() * window.ncols()),
            window,
        }
    }

    #[inline]
    fn unravel_index(&self, x: usize, y: usize) -> Option<usize> {
        let w = &self.window;
        if y < w.row_start || y >= w.row_end || x < w.col_start || x >= w.col_end {
            return None;
        }
        Some((y - w.row_start) * w.ncols() + (x - w.col_start))
    }

    // true when the pixel had not been seen before
    pub fn insert(&mut self, x: usize, y: usize) -> bool {
        match self.unravel_index(x, y) {
            Some(idx) => !self.bits.put(idx),
            None => false,
        }
    }
}

pub struct DedupVisitor<'a, V> {
    inner: &'a mut V,
    cache: &'a mut PixelCache,
}

impl<'a, V> DedupVisitor<'a, V> {
    pub fn new(inner: &'a mut V, cache: &'a mut PixelCache) -> Self {
        Self { inner, cache }
    }
}

impl<V: PixelVisitor> PixelVisitor for DedupVisitor<'_, V> {
    fn visit(&mut self, y: usize, x: usize) {
        if self.cache.insert(x, y) {
            self.inner.visit(y, x);
        }
    }
}

// running maximum and count of valid pixels under a footprint
pub struct ZonalAccumulator<'a> {
    band: ArrayView2<'a, f64>,
    nodata: Option<f64>,
    max: Option<f64>,
    count: usize,
}

impl<'a> ZonalAccumulator<'a> {
    pub fn new(band: ArrayView2<'a, f64>, nodata: Option<f64>) -> Self {
        Self {
            band,
            nodata,
            max: None,
            count: 0,
        }
    }

    pub fn finish(self) -> (Option<f64>, usize) {
        (self.max, self.count)
    }
}

impl PixelVisitor for ZonalAccumulator<'_> {
    fn visit(&mut self, y: usize, x: usize) {
        let Some(&value) = self.band.get((y, x)) else {
            return;
        };
        if value.is_nan() || self.nodata == Some(value) {
            return;
        }

        self.count += 1;
        self.max = Some(match self.max {
            Some(current) if current >= value => current,
            _ => value,
        });
    }
}
