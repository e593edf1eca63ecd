//! Python bindings for the thermopt heat conduction core.
//!
//! This crate provides PyO3 bindings exposing thermopt-core to a Python
//! optimizer. The bindings follow a minimal wrapper pattern - most logic
//! stays in Rust.

use numpy::{PyArray1, PyArray2, PyReadonlyArray1};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;

use thermopt_core::assembly::{ClampPatch, LoadCase, DEFAULT_LOAD_INTENSITY};
use thermopt_core::element::{create_element, Element};
use thermopt_core::error::Error;
use thermopt_core::material::Simp;
use thermopt_core::mesh::{box_element, StructuredGrid, StructuredMesh};
use thermopt_core::passive::PassiveMasks;
use thermopt_core::problem::{HeatConduction, ProblemConfig};
use thermopt_core::solver::{CoarseSolver, ConvergenceReason, SolveReport, SolverConfig};
use thermopt_core::types::{Dimension, Integration, Point3};

/// Map core errors to Python exceptions.
///
/// Bad input becomes `ValueError`; numerical failures become `RuntimeError`.
fn to_py_err(e: Error) -> PyErr {
    match e {
        Error::Solver(_) | Error::SingularMatrix(_) | Error::Io(_) => {
            PyRuntimeError::new_err(e.to_string())
        }
        _ => PyValueError::new_err(e.to_string()),
    }
}

fn parse_dimension(dim: usize) -> PyResult<Dimension> {
    match dim {
        2 => Ok(Dimension::Two),
        3 => Ok(Dimension::Three),
        _ => Err(PyValueError::new_err(format!(
            "dimension must be 2 or 3, got {}",
            dim
        ))),
    }
}

fn integration(reduced: bool) -> Integration {
    if reduced {
        Integration::Reduced
    } else {
        Integration::Full
    }
}

/// Solver configuration.
#[pyclass(name = "SolverConfig")]
#[derive(Clone)]
pub struct PySolverConfig {
    inner: SolverConfig,
}

#[pymethods]
impl PySolverConfig {
    #[new]
    #[pyo3(signature = (levels=4, rtol=1e-5, max_iterations=200, restart=100, smoothing_sweeps=4, coarse_solver="gmres"))]
    fn new(
        levels: usize,
        rtol: f64,
        max_iterations: usize,
        restart: usize,
        smoothing_sweeps: usize,
        coarse_solver: &str,
    ) -> PyResult<Self> {
        let mut inner = SolverConfig {
            levels,
            rtol,
            max_iterations,
            restart,
            smoothing_sweeps,
            ..SolverConfig::default()
        };
        inner.coarse.solver = match coarse_solver {
            "gmres" => CoarseSolver::Gmres,
            "cholesky" => CoarseSolver::Cholesky,
            _ => {
                return Err(PyValueError::new_err(
                    "coarse_solver must be 'gmres' or 'cholesky'",
                ))
            }
        };
        inner.validate().map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[getter]
    fn levels(&self) -> usize {
        self.inner.levels
    }

    #[getter]
    fn rtol(&self) -> f64 {
        self.inner.rtol
    }

    #[getter]
    fn max_iterations(&self) -> usize {
        self.inner.max_iterations
    }

    #[getter]
    fn restart(&self) -> usize {
        self.inner.restart
    }

    #[getter]
    fn smoothing_sweeps(&self) -> usize {
        self.inner.smoothing_sweeps
    }

    #[getter]
    fn coarse_solver(&self) -> &str {
        match self.inner.coarse.solver {
            CoarseSolver::Gmres => "gmres",
            CoarseSolver::Cholesky => "cholesky",
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SolverConfig(levels={}, rtol={:.0e}, max_iterations={}, restart={}, smoothing_sweeps={}, coarse_solver='{}')",
            self.inner.levels,
            self.inner.rtol,
            self.inner.max_iterations,
            self.inner.restart,
            self.inner.smoothing_sweeps,
            self.coarse_solver()
        )
    }
}

/// Statistics of one state solve.
#[pyclass(name = "SolveReport")]
#[derive(Clone)]
pub struct PySolveReport {
    inner: SolveReport,
}

#[pymethods]
impl PySolveReport {
    #[getter]
    fn iterations(&self) -> usize {
        self.inner.iterations
    }

    /// Final residual norm relative to the right-hand side.
    #[getter]
    fn relative_residual(&self) -> f64 {
        self.inner.relative_residual
    }

    #[getter]
    fn converged(&self) -> bool {
        self.inner.converged()
    }

    /// "converged", "max_iterations" or "diverged".
    #[getter]
    fn reason(&self) -> &str {
        match self.inner.reason {
            ConvergenceReason::Converged => "converged",
            ConvergenceReason::MaxIterations => "max_iterations",
            ConvergenceReason::Diverged => "diverged",
        }
    }

    #[getter]
    fn time_seconds(&self) -> f64 {
        self.inner.time_seconds
    }

    fn __repr__(&self) -> String {
        format!(
            "SolveReport(iterations={}, relative_residual={:.3e}, reason='{}', time={:.4}s)",
            self.inner.iterations,
            self.inner.relative_residual,
            self.reason(),
            self.inner.time_seconds
        )
    }

    fn to_dict(&self, py: Python<'_>) -> PyResult<HashMap<String, PyObject>> {
        let mut dict = HashMap::new();
        dict.insert(
            "iterations".to_string(),
            self.inner.iterations.into_pyobject(py)?.into_any().unbind(),
        );
        dict.insert(
            "relative_residual".to_string(),
            self.inner.relative_residual.into_pyobject(py)?.into_any().unbind(),
        );
        dict.insert(
            "reason".to_string(),
            self.reason().into_pyobject(py)?.into_any().unbind(),
        );
        dict.insert(
            "time_seconds".to_string(),
            self.inner.time_seconds.into_pyobject(py)?.into_any().unbind(),
        );
        Ok(dict)
    }
}

impl From<SolveReport> for PySolveReport {
    fn from(inner: SolveReport) -> Self {
        Self { inner }
    }
}

fn passive_flags(flags: Option<&PyReadonlyArray1<'_, f64>>, n: usize) -> PyResult<Vec<f64>> {
    match flags {
        Some(array) => Ok(array
            .as_slice()
            .map_err(|e| PyValueError::new_err(format!("passive mask: {}", e)))?
            .to_vec()),
        None => Ok(vec![0.0; n]),
    }
}

fn densities<'a>(x: &'a PyReadonlyArray1<'_, f64>) -> PyResult<&'a [f64]> {
    x.as_slice()
        .map_err(|e| PyValueError::new_err(format!("density array: {}", e)))
}

/// Heat conduction problem on a uniform structured grid.
#[pyclass(name = "HeatConduction")]
pub struct PyHeatConduction {
    inner: HeatConduction<StructuredGrid>,
    masks: PassiveMasks,
}

#[pymethods]
impl PyHeatConduction {
    /// Create a problem.
    ///
    /// Args:
    ///     nodes: node counts per axis, (nx, ny) or (nx, ny, nz)
    ///     extent: domain size per axis, same length as nodes
    ///     load_case: "default" (clamped bottom patch) or "imported" (masks drive loads)
    ///     load_intensity: heat load per element
    ///     void, solid, loaded: optional 0/1 passive masks, one entry per element
    ///     config: SolverConfig
    ///     reduced: use 1-point integration for the element matrix
    #[new]
    #[pyo3(signature = (nodes, extent, load_case="default", load_intensity=DEFAULT_LOAD_INTENSITY, void=None, solid=None, loaded=None, config=None, reduced=false))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        nodes: Vec<usize>,
        extent: Vec<f64>,
        load_case: &str,
        load_intensity: f64,
        void: Option<PyReadonlyArray1<'_, f64>>,
        solid: Option<PyReadonlyArray1<'_, f64>>,
        loaded: Option<PyReadonlyArray1<'_, f64>>,
        config: Option<&PySolverConfig>,
        reduced: bool,
    ) -> PyResult<Self> {
        if nodes.len() != extent.len() {
            return Err(PyValueError::new_err(
                "nodes and extent must have the same length",
            ));
        }
        let grid = match (nodes.as_slice(), extent.as_slice()) {
            (&[nx, ny], &[xmax, ymax]) => StructuredGrid::new_2d(nx, ny, xmax, ymax),
            (&[nx, ny, nz], &[xmax, ymax, zmax]) => {
                StructuredGrid::new_3d(nx, ny, nz, xmax, ymax, zmax)
            }
            _ => {
                return Err(PyValueError::new_err(
                    "nodes must have 2 or 3 entries",
                ))
            }
        }
        .map_err(to_py_err)?;

        let n = grid.n_elements();
        let masks = PassiveMasks::from_flags(
            &passive_flags(void.as_ref(), n)?,
            &passive_flags(solid.as_ref(), n)?,
            &passive_flags(loaded.as_ref(), n)?,
        )
        .map_err(to_py_err)?;

        let load_case = match load_case {
            "default" => LoadCase::Default {
                load_intensity,
                clamp: ClampPatch::default(),
            },
            "imported" => LoadCase::Imported { load_intensity },
            _ => {
                return Err(PyValueError::new_err(
                    "load_case must be 'default' or 'imported'",
                ))
            }
        };

        let config = ProblemConfig {
            solver: config.map(|c| c.inner).unwrap_or_default(),
            integration: integration(reduced),
        };

        let inner =
            HeatConduction::new(grid, load_case, masks.clone(), config).map_err(to_py_err)?;
        Ok(Self { inner, masks })
    }

    #[getter]
    fn n_nodes(&self) -> usize {
        self.inner.mesh().n_nodes()
    }

    #[getter]
    fn n_elements(&self) -> usize {
        self.inner.mesh().n_elements()
    }

    /// Number of elements free of passive flags.
    #[getter]
    fn n_designable(&self) -> usize {
        self.masks.n_designable()
    }

    /// Assemble and solve for the temperature field.
    #[pyo3(signature = (x, emin=1e-9, emax=1.0, penal=3.0))]
    fn solve_state(
        &mut self,
        x: PyReadonlyArray1<'_, f64>,
        emin: f64,
        emax: f64,
        penal: f64,
    ) -> PyResult<PySolveReport> {
        let simp = Simp::new(emin, emax, penal).map_err(to_py_err)?;
        let report = self
            .inner
            .solve_state(densities(&x)?, &simp)
            .map_err(to_py_err)?;
        Ok(report.into())
    }

    /// Solve, then return (f, dfdx, g, dgdx).
    #[pyo3(signature = (x, volfrac, emin=1e-9, emax=1.0, penal=3.0))]
    fn evaluate<'py>(
        &mut self,
        py: Python<'py>,
        x: PyReadonlyArray1<'_, f64>,
        volfrac: f64,
        emin: f64,
        emax: f64,
        penal: f64,
    ) -> PyResult<(
        f64,
        Bound<'py, PyArray1<f64>>,
        f64,
        Bound<'py, PyArray1<f64>>,
    )> {
        let simp = Simp::new(emin, emax, penal).map_err(to_py_err)?;
        let eval = self
            .inner
            .evaluate(densities(&x)?, &simp, volfrac, &self.masks)
            .map_err(to_py_err)?;
        Ok((
            eval.objective,
            PyArray1::from_vec(py, eval.objective_gradient),
            eval.constraint,
            PyArray1::from_vec(py, eval.constraint_gradient),
        ))
    }

    /// Latest temperature field (empty before the first solve).
    #[getter]
    fn temperature<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        PyArray1::from_slice(py, self.inner.temperature())
    }

    /// Dirichlet mask: 1 on free nodes, 0 on clamped nodes.
    #[getter]
    fn dirichlet_mask<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        PyArray1::from_slice(py, self.inner.assembler().dirichlet_mask())
    }

    fn __repr__(&self) -> String {
        format!(
            "HeatConduction(nodes={:?}, elements={}, designable={})",
            self.inner.mesh().node_counts(),
            self.inner.mesh().n_elements(),
            self.masks.n_designable()
        )
    }
}

/// Compute the conductivity matrix of an axis-aligned element.
///
/// Args:
///     dim: 2 (quad) or 3 (hex)
///     spacing: element edge lengths, (dx, dy) or (dx, dy, dz)
///     reduced: use 1-point integration
///
/// Returns:
///     2D numpy array of shape (4, 4) or (8, 8)
#[pyfunction]
#[pyo3(signature = (dim, spacing, reduced=false))]
fn element_matrix<'py>(
    py: Python<'py>,
    dim: usize,
    spacing: Vec<f64>,
    reduced: bool,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let dimension = parse_dimension(dim)?;
    if spacing.len() != dim {
        return Err(PyValueError::new_err(format!(
            "spacing must have {} entries",
            dim
        )));
    }
    let mut h = Point3::zeros();
    for (a, &s) in spacing.iter().enumerate() {
        h[a] = s;
    }

    let coords = box_element(dimension, &h);
    let ke = create_element(dimension)
        .conductivity(&coords, integration(reduced))
        .map_err(to_py_err)?;

    let n = ke.nrows();
    let data: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| ke[(i, j)]).collect())
        .collect();

    PyArray2::from_vec2(py, &data)
        .map_err(|e| PyRuntimeError::new_err(format!("Failed to create array: {}", e)))
}

/// Get library version.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Python module definition.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySolverConfig>()?;
    m.add_class::<PySolveReport>()?;
    m.add_class::<PyHeatConduction>()?;
    m.add_function(wrap_pyfunction!(element_matrix, m)?)?;
    m.add_function(wrap_pyfunction!(version, m)?)?;
    Ok(())
}
