/* Zonal statistics of a raster band under one building footprint */

use crate::{
    geom::raster::RasterInfo,
    rasterization::{
        burn_geometry::Burn,
        burners::{AllTouched, CenterOnly},
        visitors::{DedupVisitor, PixelCache, ZonalAccumulator},
    },
};
use geo::BoundingRect;
use geo_types::Geometry;
use ndarray::ArrayView2;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZonalStats {
    /// Largest valid pixel value under the footprint, `None` when nothing valid was covered.
    pub max: Option<f64>,
    /// Number of distinct valid pixels under the footprint.
    pub count: usize,
}

impl ZonalStats {
    // strictly binary masks: only an exact 1 counts as flooded
    pub fn is_flooded(&self) -> bool {
        self.max == Some(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonalOptions {
    pub nodata: Option<f64>,
    pub all_touched: bool,
}

impl Default for ZonalOptions {
    fn default() -> Self {
        Self {
            nodata: Some(0.0),
            all_touched: false,
        }
    }
}

// `band` must hold exactly the pixels described by `raster_info`
pub fn zonal_stats(geometry: &Geometry, raster_info: &RasterInfo, band: ArrayView2<f64>, options: &ZonalOptions) -> ZonalStats {
    let Some(window) = geometry.bounding_rect().and_then(|rect| raster_info.window_for(&rect)) else {
        return ZonalStats::default();
    };

    let mut accumulator = ZonalAccumulator::new(band, options.nodata);
    let mut cache = PixelCache::new(window);
    {
        let mut visitor = DedupVisitor::new(&mut accumulator, &mut cache);
        if options.all_touched {
            geometry.burn::<AllTouched, _>(raster_info, &mut visitor);
        } else {
            geometry.burn::<CenterOnly, _>(raster_info, &mut visitor);
        }
    }

    let (max, count) = accumulator.finish();
    ZonalStats { max, count }
}
