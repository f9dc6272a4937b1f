/*
Classify buildings as flooded from a binary flood mask.
Buildings are processed in chunks of `chunk_size`; a failing chunk is reported and skipped.
*/

use crate::{
    error::ClassifyError,
    geom::{
        crs::{Crs, Transformer},
        parse_geometry::BuildingTable,
        raster::RasterSource,
    },
    rasterization::zonal::{ZonalOptions, zonal_stats},
};
use geo::{BoundingRect, CoordsIter};
use geo_types::{Geometry, Rect, coord};
use rayon::{
    ThreadPool, ThreadPoolBuilder,
    iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator},
};
use serde::Deserialize;
use std::{fmt, ops::Range};

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierOptions {
    pub chunk_size: usize,
    /// Mask value treated as missing; the masks encode "not flooded" as 0 as well.
    pub nodata: f64,
    pub all_touched: bool,
    /// Worker threads, 0 uses every CPU and 1 runs sequentially.
    pub workers: usize,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            nodata: 0.0,
            all_touched: false,
            workers: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub rows: Range<usize>,
    pub reason: String,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "zonal statistics failed for chunk {} (rows {}..{}): {}",
            self.chunk, self.rows.start, self.rows.end, self.reason
        )
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub flooded: BuildingTable,
    pub failures: Vec<ChunkFailure>,
}

pub struct FloodClassifier {
    options: ClassifierOptions,
    pool: Option<ThreadPool>,
}

impl FloodClassifier {
    pub fn new(options: ClassifierOptions) -> Result<Self, ClassifyError> {
        let threads = match options.workers {
            0 => num_cpus::get(),
            n => n,
        };
        let pool = if threads > 1 {
            Some(ThreadPoolBuilder::new().num_threads(threads).build()?)
        } else {
            None
        };
        Ok(Self { options, pool })
    }

    pub fn options(&self) -> &ClassifierOptions {
        &self.options
    }

    fn zonal_options(&self) -> ZonalOptions {
        ZonalOptions {
            nodata: Some(self.options.nodata),
            all_touched: self.options.all_touched,
        }
    }

    /// Flooded subset of `buildings`, in input order.
    ///
    /// Chunk failures never abort the call: they are returned in `failures` and the
    /// chunk contributes no buildings.
    pub fn classify<R: RasterSource + ?Sized>(
        &self,
        raster: &R,
        buildings: &BuildingTable,
    ) -> Result<Classification, ClassifyError> {
        let chunk_size = self.options.chunk_size.max(1);
        let total = buildings.len();
        let ranges: Vec<Range<usize>> = (0..total)
            .step_by(chunk_size)
            .map(|start| start..(start + chunk_size).min(total))
            .collect();

        let geometries = buildings.geometries();
        let from = buildings.crs();
        let run = |range: &Range<usize>| self.classify_chunk(raster, &geometries[range.clone()], range.start, from);

        let mut results: Vec<Result<Vec<usize>, ClassifyError>> = Vec::with_capacity(ranges.len());
        match &self.pool {
            Some(pool) => pool.install(|| ranges.par_iter().map(run).collect_into_vec(&mut results)),
            None => results.extend(ranges.iter().map(run)),
        }

        let mut flooded_rows = Vec::new();
        let mut failures = Vec::new();
        for (chunk, (range, result)) in ranges.into_iter().zip(results).enumerate() {
            match result {
                Ok(rows) => {
                    log::debug!("Chunk {} (rows {}..{}): {} flooded", chunk, range.start, range.end, rows.len());
                    flooded_rows.extend(rows);
                }
                Err(err) => {
                    let failure = ChunkFailure {
                        chunk,
                        rows: range,
                        reason: err.to_string(),
                    };
                    log::warn!("{}", failure);
                    failures.push(failure);
                }
            }
        }

        Ok(Classification {
            flooded: buildings.take(&flooded_rows)?,
            failures,
        })
    }

    // absolute row numbers of the flooded buildings in one chunk
    fn classify_chunk<R: RasterSource + ?Sized>(
        &self,
        raster: &R,
        geometries: &[Geometry],
        offset: usize,
        from: &Crs,
    ) -> Result<Vec<usize>, ClassifyError> {
        let info = raster.info();
        let to_raster = Transformer::new(from, &info.crs)?;
        let footprints = geometries
            .iter()
            .enumerate()
            .map(|(i, geometry)| {
                let footprint = to_raster.geometry(geometry)?;
                if !footprint.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
                    return Err(ClassifyError::NonFiniteCoordinates { index: offset + i });
                }
                Ok(footprint)
            })
            .collect::<Result<Vec<_>, ClassifyError>>()?;

        // read only the part of the mask the chunk can touch
        let Some(window) = bounding_rect(&footprints).and_then(|rect| info.window_for(&rect)) else {
            return Ok(Vec::new());
        };
        let band = raster.read_window(&window)?;
        let window_info = info.subset(&window);

        let options = self.zonal_options();
        Ok(footprints
            .iter()
            .enumerate()
            .filter(|(_, footprint)| zonal_stats(footprint, &window_info, band.view(), &options).is_flooded())
            .map(|(i, _)| offset + i)
            .collect())
    }
}

// https://github.com/georust/geo/blob/main/geo/src/algorithm/bounding_rect.rs#L186
fn bounding_rect(geometry: &[Geometry]) -> Option<Rect> {
    geometry.iter().fold(None, |acc, next| {
        let next_bounding_rect = next.bounding_rect();

        // enlarge bounding rectangle if necessary
        match (acc, next_bounding_rect) {
            (None, None) => None,
            (Some(r), None) | (None, Some(r)) => Some(r),
            (Some(r1), Some(r2)) => Some(bounding_rect_merge(r1, r2)),
        }
    })
}

// https://github.com/georust/geo/blob/main/geo/src/algorithm/bounding_rect.rs#L200
fn bounding_rect_merge(a: Rect, b: Rect) -> Rect {
    Rect::new(
        coord! {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        coord! {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::RasterError,
        geom::{
            parse_geometry::{InvalidWktPolicy, parse_buildings},
            raster::{FloodRaster, PixelWindow, RasterInfo},
        },
    };
    use ndarray::Array2;
    use polars::df;

    // one row of ten 1-degree pixels over [0, 10] x [0, 1]; odd columns flooded
    fn striped() -> FloodRaster {
        let info = RasterInfo::from_origin(0.0, 1.0, 1.0, 1.0, 10, 1, Crs::WGS84);
        let band = Array2::from_shape_fn((1, 10), |(_, x)| (x % 2) as f64);
        FloodRaster::new(info, band).unwrap()
    }

    // one point per column centre
    fn buildings(n: usize) -> BuildingTable {
        let ids: Vec<String> = (0..n).map(|i| format!("b{i}")).collect();
        let wkts: Vec<String> = (0..n).map(|i| format!("POINT ({}.5 0.5)", i)).collect();
        let frame = df!("id" => ids, "geometry" => wkts).unwrap();
        parse_buildings(frame, InvalidWktPolicy::Fail).unwrap()
    }

    fn ids(table: &BuildingTable) -> Vec<String> {
        table
            .attributes()
            .column("id")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect()
    }

    fn classifier(chunk_size: usize, workers: usize) -> FloodClassifier {
        FloodClassifier::new(ClassifierOptions {
            chunk_size,
            workers,
            ..ClassifierOptions::default()
        })
        .unwrap()
    }

    struct FailingColumns {
        inner: FloodRaster,
        fail_from: usize,
    }

    impl RasterSource for FailingColumns {
        fn info(&self) -> &RasterInfo {
            self.inner.info()
        }

        fn read_window(&self, window: &PixelWindow) -> Result<Array2<f64>, RasterError> {
            if window.col_end > self.fail_from {
                return Err(RasterError::UnsupportedLayout("simulated read failure".to_string()));
            }
            self.inner.read_window(window)
        }
    }

    #[test]
    fn flooded_subset_keeps_order_and_columns() {
        let result = classifier(50_000, 1).classify(&striped(), &buildings(5)).unwrap();
        assert_eq!(ids(&result.flooded), ["b1", "b3"]);
        assert_eq!(result.flooded.attributes().width(), 2);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn chunking_and_workers_do_not_change_the_result() {
        let raster = striped();
        let table = buildings(10);
        let expected = ids(&classifier(50_000, 1).classify(&raster, &table).unwrap().flooded);
        assert_eq!(expected, ["b1", "b3", "b5", "b7", "b9"]);

        for chunk_size in [1, 2, 3, 7] {
            for workers in [1, 4] {
                let result = classifier(chunk_size, workers).classify(&raster, &table).unwrap();
                assert_eq!(ids(&result.flooded), expected, "chunk_size={chunk_size} workers={workers}");
            }
        }
    }

    #[test]
    fn failing_chunk_is_isolated() {
        let raster = FailingColumns {
            inner: striped(),
            fail_from: 4,
        };
        // chunks of two: rows 0..2 and 2..4 read fine, 4..6 fails
        let result = classifier(2, 2).classify(&raster, &buildings(6)).unwrap();
        assert_eq!(ids(&result.flooded), ["b1", "b3"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].chunk, 2);
        assert_eq!(result.failures[0].rows, 4..6);
    }

    #[test]
    fn single_failing_chunk_yields_empty_result() {
        let raster = FailingColumns {
            inner: striped(),
            fail_from: 0,
        };
        let result = classifier(50_000, 1).classify(&raster, &buildings(3)).unwrap();
        assert!(result.flooded.is_empty());
        assert_eq!(result.failures.len(), 1);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let raster = striped();
        let table = buildings(8);
        let c = classifier(3, 0);
        let first = ids(&c.classify(&raster, &table).unwrap().flooded);
        let second = ids(&c.classify(&raster, &table).unwrap().flooded);
        assert_eq!(first, second);
    }

    #[test]
    fn buildings_outside_the_raster_are_dry() {
        let frame = df!("id" => ["far"], "geometry" => ["POINT (50 50)"]).unwrap();
        let table = parse_buildings(frame, InvalidWktPolicy::Fail).unwrap();
        let result = classifier(10, 1).classify(&striped(), &table).unwrap();
        assert!(result.flooded.is_empty());
        assert!(result.failures.is_empty());
    }

    #[test]
    fn empty_input_has_no_chunks() {
        let result = classifier(10, 1).classify(&striped(), &buildings(0)).unwrap();
        assert!(result.flooded.is_empty());
        assert!(result.failures.is_empty());
    }

    #[test]
    fn reprojects_into_the_raster_crs() {
        // same striped mask expressed in Web Mercator
        let info = RasterInfo::from_origin(0.0, 111_325.142_866_384_9, 111_319.490_793_273_6, 111_325.142_866_384_9, 10, 1, Crs::Epsg(3857));
        let band = Array2::from_shape_fn((1, 10), |(_, x)| (x % 2) as f64);
        let raster = FloodRaster::new(info, band).unwrap();
        let result = classifier(10, 1).classify(&raster, &buildings(4)).unwrap();
        assert_eq!(ids(&result.flooded), ["b1", "b3"]);
    }
}
