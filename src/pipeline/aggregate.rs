/* Run the classifier once per flood date and derive the trend and summary values */

use crate::{
    encoding::geotiff::GeoTiffRaster,
    error::RasterError,
    geom::{parse_geometry::BuildingTable, raster::RasterSource},
    pipeline::classify::{ChunkFailure, FloodClassifier},
};
use serde::Deserialize;
use std::{
    fmt,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloodMask {
    pub date: String,
    pub path: PathBuf,
}

// recoverable problems, each one excluded a chunk or a date from the results
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    Chunk { date: String, failure: ChunkFailure },
    MissingRaster { date: String, path: PathBuf },
    DateFailed { date: String, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Chunk { date, failure } => write!(f, "{date}: {failure}"),
            Warning::MissingRaster { date, path } => write!(f, "{date}: flood mask {path:?} not found, date skipped"),
            Warning::DateFailed { date, reason } => write!(f, "{date}: classification failed, date skipped: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
struct DateResult {
    date: String,
    flooded: BuildingTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub date: String,
    pub flooded: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub date: String,
    pub total_buildings: usize,
    pub flooded: usize,
    pub percent_affected: f64,
    /// Mean footprint area of all buildings in the region, in squared degrees.
    pub mean_footprint_area: Option<f64>,
}

// percentage rounded to 2 decimals, 0 when there is nothing to count
pub fn percent_affected(flooded: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let percent = flooded as f64 / total as f64 * 100.0;
    (percent * 100.0).round() / 100.0
}

/// Flooded buildings for every date that produced a result.
#[derive(Debug, Clone)]
pub struct FloodAssessment {
    buildings: BuildingTable,
    results: Vec<DateResult>,
    warnings: Vec<Warning>,
}

impl FloodAssessment {
    pub fn buildings(&self) -> &BuildingTable {
        &self.buildings
    }

    // in the order the masks were supplied
    pub fn dates(&self) -> Vec<&str> {
        self.results.iter().map(|result| result.date.as_str()).collect()
    }

    pub fn sorted_dates(&self) -> Vec<&str> {
        let mut dates = self.dates();
        dates.sort_unstable();
        dates
    }

    pub fn flooded(&self, date: &str) -> Option<&BuildingTable> {
        self.results
            .iter()
            .find(|result| result.date == date)
            .map(|result| &result.flooded)
    }

    pub fn trend(&self) -> Vec<TrendPoint> {
        self.results
            .iter()
            .map(|result| TrendPoint {
                date: result.date.clone(),
                flooded: result.flooded.len(),
            })
            .collect()
    }

    pub fn summary(&self, date: &str) -> Option<Summary> {
        let flooded = self.flooded(date)?.len();
        let total_buildings = self.buildings.len();
        Some(Summary {
            date: date.to_string(),
            total_buildings,
            flooded,
            percent_affected: percent_affected(flooded, total_buildings),
            mean_footprint_area: self.buildings.mean_footprint_area(),
        })
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

#[derive(Debug, Clone)]
pub enum AssessmentOutcome {
    Available(FloodAssessment),
    /// No date produced a result, per-date views are unavailable.
    NoData { warnings: Vec<Warning> },
}

impl AssessmentOutcome {
    pub fn warnings(&self) -> &[Warning] {
        match self {
            AssessmentOutcome::Available(assessment) => assessment.warnings(),
            AssessmentOutcome::NoData { warnings } => warnings,
        }
    }

    pub fn available(&self) -> Option<&FloodAssessment> {
        match self {
            AssessmentOutcome::Available(assessment) => Some(assessment),
            AssessmentOutcome::NoData { .. } => None,
        }
    }
}

pub fn assess_dates(classifier: &FloodClassifier, buildings: BuildingTable, masks: &[FloodMask]) -> AssessmentOutcome {
    assess_dates_with(classifier, buildings, masks, |path: &Path| GeoTiffRaster::open(path))
}

/// Same as [`assess_dates`] with a custom way of opening the mask of each date.
pub fn assess_dates_with<R, F>(
    classifier: &FloodClassifier,
    buildings: BuildingTable,
    masks: &[FloodMask],
    open: F,
) -> AssessmentOutcome
where
    R: RasterSource,
    F: Fn(&Path) -> Result<R, RasterError>,
{
    let mut results = Vec::with_capacity(masks.len());
    let mut warnings = Vec::new();

    for mask in masks {
        if !mask.path.is_file() {
            let warning = Warning::MissingRaster {
                date: mask.date.clone(),
                path: mask.path.clone(),
            };
            log::warn!("{}", warning);
            warnings.push(warning);
            continue;
        }

        let classification = open(&mask.path)
            .map_err(|err| err.to_string())
            .and_then(|raster| classifier.classify(&raster, &buildings).map_err(|err| err.to_string()));

        match classification {
            Ok(classification) => {
                log::info!(
                    "{}: {} of {} buildings flooded",
                    mask.date,
                    classification.flooded.len(),
                    buildings.len()
                );
                warnings.extend(classification.failures.into_iter().map(|failure| Warning::Chunk {
                    date: mask.date.clone(),
                    failure,
                }));
                results.push(DateResult {
                    date: mask.date.clone(),
                    flooded: classification.flooded,
                });
            }
            Err(reason) => {
                let warning = Warning::DateFailed {
                    date: mask.date.clone(),
                    reason,
                };
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }

    if results.is_empty() {
        log::warn!("No flood data available for any of the {} dates", masks.len());
        return AssessmentOutcome::NoData { warnings };
    }

    AssessmentOutcome::Available(FloodAssessment {
        buildings,
        results,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geom::{
            crs::Crs,
            parse_geometry::{InvalidWktPolicy, parse_buildings},
            raster::{FloodRaster, PixelWindow, RasterInfo},
        },
        pipeline::classify::ClassifierOptions,
    };
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use polars::df;
    use std::fs;

    fn buildings() -> BuildingTable {
        let frame = df!(
            "id" => ["a", "b", "c", "d"],
            "geometry" => ["POINT (0.5 0.5)", "POINT (1.5 0.5)", "POINT (2.5 0.5)", "POINT (3.5 0.5)"]
        )
        .unwrap();
        parse_buildings(frame, InvalidWktPolicy::Fail).unwrap()
    }

    // opens fine but every pixel read fails when not `readable`
    struct FakeMask {
        raster: FloodRaster,
        readable: bool,
    }

    impl RasterSource for FakeMask {
        fn info(&self) -> &RasterInfo {
            self.raster.info()
        }

        fn read_window(&self, window: &PixelWindow) -> Result<Array2<f64>, RasterError> {
            if !self.readable {
                return Err(RasterError::UnsupportedLayout("truncated strip".to_string()));
            }
            self.raster.read_window(window)
        }
    }

    // mask flooding the first `wet` columns, chosen from the file name
    fn open_fake(path: &Path) -> Result<FakeMask, RasterError> {
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if name == "corrupt" {
            return Err(RasterError::UnsupportedLayout("corrupt mask".to_string()));
        }
        let wet: usize = name.parse().unwrap_or(0);
        let info = RasterInfo::from_origin(0.0, 1.0, 1.0, 1.0, 4, 1, Crs::WGS84);
        let band = Array2::from_shape_fn((1, 4), |(_, x)| if x < wet { 1.0 } else { 0.0 });
        Ok(FakeMask {
            raster: FloodRaster::new(info, band)?,
            readable: name != "unreadable",
        })
    }

    fn mask_file(dir: &Path, date: &str, stem: &str) -> FloodMask {
        let path = dir.join(format!("{stem}.tif"));
        fs::write(&path, b"placeholder").unwrap();
        FloodMask {
            date: date.to_string(),
            path,
        }
    }

    fn workdir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("floodmap_aggregate_{name}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn classifier() -> FloodClassifier {
        FloodClassifier::new(ClassifierOptions {
            workers: 1,
            ..ClassifierOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn rounds_percentages() {
        assert_abs_diff_eq!(percent_affected(1, 3), 33.33);
        assert_abs_diff_eq!(percent_affected(2, 3), 66.67);
        assert_abs_diff_eq!(percent_affected(0, 0), 0.0);
        assert_abs_diff_eq!(percent_affected(5, 5), 100.0);
    }

    #[test]
    fn trend_follows_supplied_order_and_skips_missing_dates() {
        let dir = workdir("trend");
        let masks = vec![
            mask_file(&dir, "2020-09-05", "3"),
            FloodMask {
                date: "2020-08-25".to_string(),
                path: dir.join("missing.tif"),
            },
            mask_file(&dir, "2020-08-30", "1"),
        ];

        let outcome = assess_dates_with(&classifier(), buildings(), &masks, open_fake);
        let assessment = outcome.available().unwrap();

        assert_eq!(assessment.dates(), ["2020-09-05", "2020-08-30"]);
        assert_eq!(assessment.sorted_dates(), ["2020-08-30", "2020-09-05"]);
        assert_eq!(
            assessment.trend(),
            vec![
                TrendPoint {
                    date: "2020-09-05".to_string(),
                    flooded: 3
                },
                TrendPoint {
                    date: "2020-08-30".to_string(),
                    flooded: 1
                },
            ]
        );
        assert!(assessment.flooded("2020-08-25").is_none());
        assert!(matches!(
            assessment.warnings(),
            [Warning::MissingRaster { date, .. }] if date == "2020-08-25"
        ));

        let summary = assessment.summary("2020-09-05").unwrap();
        assert_eq!((summary.total_buildings, summary.flooded), (4, 3));
        assert_abs_diff_eq!(summary.percent_affected, 75.0);
        assert_eq!(summary.mean_footprint_area, Some(0.0));
    }

    #[test]
    fn failing_date_is_skipped() {
        let dir = workdir("failing");
        let masks = vec![mask_file(&dir, "2020-08-30", "corrupt"), mask_file(&dir, "2020-09-05", "0")];

        let outcome = assess_dates_with(&classifier(), buildings(), &masks, open_fake);
        let assessment = outcome.available().unwrap();
        assert_eq!(assessment.dates(), ["2020-09-05"]);
        // a dry date is still a result
        assert!(assessment.flooded("2020-09-05").unwrap().is_empty());
        assert!(matches!(assessment.warnings(), [Warning::DateFailed { .. }]));
    }

    #[test]
    fn failing_chunk_keeps_the_date_with_no_buildings() {
        let dir = workdir("chunk_failure");
        let masks = vec![mask_file(&dir, "2020-08-30", "unreadable"), mask_file(&dir, "2020-09-05", "2")];

        let outcome = assess_dates_with(&classifier(), buildings(), &masks, open_fake);
        let assessment = outcome.available().unwrap();

        assert_eq!(assessment.dates(), ["2020-08-30", "2020-09-05"]);
        assert!(assessment.flooded("2020-08-30").unwrap().is_empty());
        assert_eq!(assessment.flooded("2020-09-05").unwrap().len(), 2);
        assert_eq!(assessment.summary("2020-08-30").unwrap().percent_affected, 0.0);

        match assessment.warnings() {
            [Warning::Chunk { date, failure }] => {
                assert_eq!(date, "2020-08-30");
                assert_eq!((failure.chunk, failure.rows.clone()), (0, 0..4));
                assert!(failure.reason.contains("truncated strip"));
            }
            other => panic!("expected one chunk warning, got {other:?}"),
        }
    }

    #[test]
    fn no_usable_date_is_no_data() {
        let dir = workdir("nodata");
        let masks = vec![
            FloodMask {
                date: "2020-08-25".to_string(),
                path: dir.join("missing.tif"),
            },
            mask_file(&dir, "2020-08-30", "corrupt"),
        ];

        let outcome = assess_dates_with(&classifier(), buildings(), &masks, open_fake);
        assert!(outcome.available().is_none());
        assert_eq!(outcome.warnings().len(), 2);

        let empty = assess_dates_with(&classifier(), buildings(), &[], open_fake);
        assert!(matches!(empty, AssessmentOutcome::NoData { ref warnings } if warnings.is_empty()));
    }

    #[test]
    fn warning_messages_name_the_date() {
        let warning = Warning::MissingRaster {
            date: "2020-08-25".to_string(),
            path: PathBuf::from("mask.tif"),
        };
        assert!(warning.to_string().starts_with("2020-08-25: flood mask"));
    }
}
