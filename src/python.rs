/* Python bindings, built with the `python` feature */

use crate::{
    config::PipelineConfig,
    error::{LoadError, PipelineError},
    geom::parse_geometry::BuildingTable,
    pipeline::{
        self,
        aggregate::{AssessmentOutcome, FloodAssessment},
    },
};
use pyo3::{
    exceptions::{PyIOError, PyKeyError, PyLookupError, PyValueError},
    prelude::*,
};
use pyo3_polars::PyDataFrame;
use std::path::PathBuf;

impl From<PipelineError> for PyErr {
    fn from(err: PipelineError) -> PyErr {
        match &err {
            PipelineError::Load(LoadError::Io { .. }) => PyIOError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

fn frame(table: &BuildingTable) -> PyResult<PyDataFrame> {
    let df = table.to_frame().map_err(|err| PyValueError::new_err(err.to_string()))?;
    Ok(PyDataFrame(df))
}

fn available(outcome: AssessmentOutcome) -> PyResult<Assessment> {
    match outcome {
        AssessmentOutcome::Available(inner) => Ok(Assessment { inner }),
        AssessmentOutcome::NoData { warnings } => {
            let details: Vec<String> = warnings.iter().map(ToString::to_string).collect();
            Err(PyLookupError::new_err(format!(
                "no flood data available: {}",
                details.join("; ")
            )))
        }
    }
}

#[pyclass(name = "Summary", get_all)]
#[derive(Clone)]
pub struct PySummary {
    date: String,
    total_buildings: usize,
    flooded: usize,
    percent_affected: f64,
    mean_footprint_area: Option<f64>,
}

#[pyclass]
pub struct Assessment {
    inner: FloodAssessment,
}

#[pymethods]
impl Assessment {
    fn dates(&self) -> Vec<String> {
        self.inner.dates().into_iter().map(String::from).collect()
    }

    fn sorted_dates(&self) -> Vec<String> {
        self.inner.sorted_dates().into_iter().map(String::from).collect()
    }

    #[pyo3(signature = (centroids=false))]
    fn buildings(&self, centroids: bool) -> PyResult<PyDataFrame> {
        let table = self.inner.buildings();
        if centroids { frame(&table.to_centroids()) } else { frame(table) }
    }

    #[pyo3(signature = (date, centroids=false))]
    fn flooded(&self, date: &str, centroids: bool) -> PyResult<PyDataFrame> {
        let table = self
            .inner
            .flooded(date)
            .ok_or_else(|| PyKeyError::new_err(date.to_string()))?;
        if centroids { frame(&table.to_centroids()) } else { frame(table) }
    }

    fn summary(&self, date: &str) -> PyResult<PySummary> {
        let summary = self
            .inner
            .summary(date)
            .ok_or_else(|| PyKeyError::new_err(date.to_string()))?;
        Ok(PySummary {
            date: summary.date,
            total_buildings: summary.total_buildings,
            flooded: summary.flooded,
            percent_affected: summary.percent_affected,
            mean_footprint_area: summary.mean_footprint_area,
        })
    }

    fn trend(&self) -> Vec<(String, usize)> {
        self.inner
            .trend()
            .into_iter()
            .map(|point| (point.date, point.flooded))
            .collect()
    }

    fn warnings(&self) -> Vec<String> {
        self.inner.warnings().iter().map(ToString::to_string).collect()
    }
}

#[pyfunction]
#[pyo3(name = "assess")]
fn assess_py(py: Python<'_>, config_path: PathBuf) -> PyResult<Assessment> {
    let outcome = py.allow_threads(|| {
        let config = PipelineConfig::load_from_file(&config_path).map_err(PipelineError::from)?;
        pipeline::assess(&config)
    })?;
    available(outcome)
}

// building table uploaded from Python instead of read from the configured CSV
#[pyfunction]
#[pyo3(name = "assess_frame")]
fn assess_frame_py(py: Python<'_>, pydf: PyDataFrame, config_path: PathBuf) -> PyResult<Assessment> {
    let df = pydf.0;
    let outcome = py.allow_threads(|| {
        let config = PipelineConfig::load_from_file(&config_path).map_err(PipelineError::from)?;
        pipeline::assess_frame(df, &config)
    })?;
    available(outcome)
}

#[pymodule]
fn _floodmap(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(assess_py, m)?)?;
    m.add_function(wrap_pyfunction!(assess_frame_py, m)?)?;
    m.add_class::<Assessment>()?;
    m.add_class::<PySummary>()?;
    Ok(())
}
