//! Solver session: hierarchy lifetime and warm starts.
//!
//! A session starts `Uninitialized`. The first [`SolverSession::solve`]
//! builds the multigrid hierarchy for the mesh and moves to `Ready`; every
//! later solve only rebinds the new matrix values and starts from the
//! previous temperature field.

use crate::error::{Error, Result};
use crate::mesh::StructuredMesh;
use crate::solver::multigrid::Multigrid;
use crate::solver::{check_len, fgmres, ConvergenceReason, SolveReport, SolverConfig};
use crate::sparse::CsrMatrix;
use log::{debug, warn};
use std::time::Instant;

#[derive(Debug)]
enum SessionState {
    Uninitialized,
    Ready(Box<Multigrid>),
}

/// Stateful linear solver for a sequence of systems on one mesh.
#[derive(Debug)]
pub struct SolverSession {
    config: SolverConfig,
    state: SessionState,
    solution: Vec<f64>,
}

impl SolverSession {
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: SessionState::Uninitialized,
            solution: Vec::new(),
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// True once the hierarchy has been built.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready(_))
    }

    /// Latest solution (empty before the first solve).
    pub fn solution(&self) -> &[f64] {
        &self.solution
    }

    /// Drop the hierarchy and the warm start.
    pub fn reset(&mut self) {
        self.state = SessionState::Uninitialized;
        self.solution.clear();
    }

    /// Solve `k · u = rhs` on `mesh`, warm-starting from the previous solution.
    ///
    /// # Errors
    ///
    /// [`crate::error::Error::DimensionMismatch`] if `k` or `rhs` do not match
    /// the mesh, hierarchy construction errors on the first call, and
    /// coarse solver failures. Non-convergence is reported, not raised.
    pub fn solve<M: StructuredMesh>(
        &mut self,
        mesh: &M,
        k: &CsrMatrix,
        rhs: &[f64],
    ) -> Result<SolveReport> {
        let start = Instant::now();
        let n = mesh.n_nodes();
        check_len("right-hand side", rhs.len(), n)?;
        check_len("matrix rows", k.nrows(), n)?;

        if matches!(self.state, SessionState::Uninitialized) {
            let mg = Multigrid::new(mesh, &self.config)?;
            debug!("solver session ready: {} levels", mg.n_levels());
            self.state = SessionState::Ready(Box::new(mg));
        }
        let SessionState::Ready(multigrid) = &mut self.state else {
            return Err(Error::Solver("multigrid hierarchy was not built".into()));
        };
        check_len("matrix rows", k.nrows(), multigrid.level_sizes()[0])?;
        multigrid.rebind(k)?;

        if self.solution.len() != n {
            self.solution = vec![0.0; n];
        }

        let outcome = fgmres(
            k,
            rhs,
            &mut self.solution,
            &**multigrid,
            &self.config.krylov(),
        )?;

        let rhs_norm = crate::sparse::norm2(rhs);
        let relative_residual = if rhs_norm > 0.0 {
            outcome.residual_norm / rhs_norm
        } else {
            0.0
        };

        let report = SolveReport {
            iterations: outcome.iterations,
            relative_residual,
            reason: outcome.reason,
            time_seconds: start.elapsed().as_secs_f64(),
        };

        if report.reason != ConvergenceReason::Converged {
            warn!(
                "state solver stopped without converging ({:?}): iter {}, rerr {:e}",
                report.reason, report.iterations, report.relative_residual
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Assembler, LoadCase};
    use crate::material::Simp;
    use crate::mesh::StructuredGrid;
    use crate::passive::PassiveMasks;
    use crate::sparse::spmv;
    use crate::types::Integration;
    use approx::assert_relative_eq;

    fn setup() -> (StructuredGrid, Assembler) {
        let grid = StructuredGrid::new_2d(17, 17, 1.0, 1.0).unwrap();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();
        (grid, assembler)
    }

    #[test]
    fn test_first_solve_builds_hierarchy() {
        let (grid, assembler) = setup();
        let system = assembler
            .assemble(&vec![1.0; grid.n_elements()], &Simp::default())
            .unwrap();

        let mut session = SolverSession::new(SolverConfig::default()).unwrap();
        assert!(!session.is_ready());
        let report = session
            .solve(&grid, &system.conductivity, &system.rhs)
            .unwrap();
        assert!(session.is_ready());
        assert!(report.converged());
        assert!(report.relative_residual <= 1e-5);

        // K u = f to the requested tolerance
        let mut ku = vec![0.0; grid.n_nodes()];
        spmv(&system.conductivity, session.solution(), &mut ku);
        let err: f64 = ku
            .iter()
            .zip(&system.rhs)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        assert!(err <= 1e-5 * crate::sparse::norm2(&system.rhs));
    }

    #[test]
    fn test_warm_start_takes_no_iterations() {
        let (grid, assembler) = setup();
        let system = assembler
            .assemble(&vec![0.8; grid.n_elements()], &Simp::default())
            .unwrap();

        let mut session = SolverSession::new(SolverConfig::default()).unwrap();
        let first = session
            .solve(&grid, &system.conductivity, &system.rhs)
            .unwrap();
        assert!(first.iterations > 0);

        let u = session.solution().to_vec();
        let second = session
            .solve(&grid, &system.conductivity, &system.rhs)
            .unwrap();
        assert_eq!(second.iterations, 0);
        assert!(second.converged());
        assert_eq!(session.solution(), u.as_slice());
    }

    #[test]
    fn test_zero_rhs_gives_zero_solution() {
        let (grid, assembler) = setup();
        let system = assembler
            .assemble(&vec![0.5; grid.n_elements()], &Simp::default())
            .unwrap();

        let mut session = SolverSession::new(SolverConfig::default()).unwrap();
        session
            .solve(&grid, &system.conductivity, &system.rhs)
            .unwrap();

        let zeros = vec![0.0; grid.n_nodes()];
        let report = session
            .solve(&grid, &system.conductivity, &zeros)
            .unwrap();
        assert_eq!(report.iterations, 0);
        assert_relative_eq!(report.relative_residual, 0.0);
        assert!(session.solution().iter().all(|&u| u == 0.0));
    }

    #[test]
    fn test_size_mismatch() {
        let (grid, assembler) = setup();
        let system = assembler
            .assemble(&vec![0.5; grid.n_elements()], &Simp::default())
            .unwrap();

        let mut session = SolverSession::new(SolverConfig::default()).unwrap();
        let result = session.solve(&grid, &system.conductivity, &system.rhs[..10]);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
        assert!(!session.is_ready());
    }

    #[test]
    fn test_reset() {
        let (grid, assembler) = setup();
        let system = assembler
            .assemble(&vec![0.5; grid.n_elements()], &Simp::default())
            .unwrap();

        let mut session = SolverSession::new(SolverConfig::default()).unwrap();
        session
            .solve(&grid, &system.conductivity, &system.rhs)
            .unwrap();
        session.reset();
        assert!(!session.is_ready());
        assert!(session.solution().is_empty());
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let (grid, assembler) = setup();
        let system = assembler
            .assemble(&vec![0.5; grid.n_elements()], &Simp::default())
            .unwrap();

        let config = SolverConfig {
            max_iterations: 1,
            rtol: 1e-14,
            ..SolverConfig::default()
        };
        let mut session = SolverSession::new(config).unwrap();
        let report = session
            .solve(&grid, &system.conductivity, &system.rhs)
            .unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.reason, ConvergenceReason::MaxIterations);
    }
}
