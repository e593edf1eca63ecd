//! Heat conduction problem driver.
//!
//! [`HeatConduction`] ties the pieces together for an outer optimizer:
//! it owns the mesh, the [`Assembler`] and the [`SolverSession`], and exposes
//! the two calls made once per design iteration.
//!
//! # Example
//!
//! ```
//! use thermopt_core::assembly::LoadCase;
//! use thermopt_core::material::Simp;
//! use thermopt_core::mesh::{StructuredGrid, StructuredMesh};
//! use thermopt_core::passive::PassiveMasks;
//! use thermopt_core::problem::{HeatConduction, ProblemConfig};
//! use thermopt_core::solver::SolverConfig;
//!
//! let grid = StructuredGrid::new_2d(9, 9, 1.0, 1.0).unwrap();
//! let n = grid.n_elements();
//! let masks = PassiveMasks::none(n);
//! let config = ProblemConfig {
//!     solver: SolverConfig { levels: 3, ..SolverConfig::default() },
//!     ..ProblemConfig::default()
//! };
//! let mut problem = HeatConduction::new(grid, LoadCase::default(), masks.clone(), config).unwrap();
//!
//! let x = vec![0.4; n];
//! let eval = problem.evaluate(&x, &Simp::default(), 0.4, &masks).unwrap();
//! assert!(eval.objective > 0.0);
//! assert!(eval.constraint.abs() < 1e-12);
//! ```

use crate::assembly::{Assembler, LoadCase};
use crate::error::Result;
use crate::material::Simp;
use crate::mesh::StructuredMesh;
use crate::passive::PassiveMasks;
use crate::sensitivity::{self, Evaluation};
use crate::solver::{SolveReport, SolverConfig, SolverSession};
use crate::types::Integration;
use log::info;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Problem configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProblemConfig {
    pub solver: SolverConfig,
    /// Gauss rule for the element matrix.
    pub integration: Integration,
}

/// Steady-state heat conduction on a structured grid.
#[derive(Debug)]
pub struct HeatConduction<M: StructuredMesh> {
    mesh: M,
    assembler: Assembler,
    session: SolverSession,
}

impl<M: StructuredMesh> HeatConduction<M> {
    /// Set up element matrix, sparsity pattern, loads and constraints.
    ///
    /// `masks` select the loads and clamps of [`LoadCase::Imported`]; they
    /// are not used by [`LoadCase::Default`] assembly.
    pub fn new(
        mesh: M,
        load_case: LoadCase,
        masks: PassiveMasks,
        config: ProblemConfig,
    ) -> Result<Self> {
        let assembler = Assembler::new(&mesh, &load_case, &masks, config.integration)?;
        let session = SolverSession::new(config.solver)?;
        Ok(Self {
            mesh,
            assembler,
            session,
        })
    }

    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    /// Latest temperature field (empty before the first solve).
    pub fn temperature(&self) -> &[f64] {
        self.session.solution()
    }

    /// Assemble `K(x)` and solve for the temperature, warm-starting from the
    /// previous solve.
    pub fn solve_state(&mut self, x_phys: &[f64], simp: &Simp) -> Result<SolveReport> {
        let system = self.assembler.assemble(x_phys, simp)?;
        let report = self
            .session
            .solve(&self.mesh, &system.conductivity, &system.rhs)?;
        info!(
            "State solver:  iter: {}, rerr.: {:e}, time: {:.4} s",
            report.iterations, report.relative_residual, report.time_seconds
        );
        Ok(report)
    }

    /// Solve the state for `x_phys`, then evaluate objective, constraint and
    /// gradients.
    pub fn evaluate(
        &mut self,
        x_phys: &[f64],
        simp: &Simp,
        volfrac: f64,
        masks: &PassiveMasks,
    ) -> Result<Evaluation> {
        self.solve_state(x_phys, simp)?;
        sensitivity::evaluate(
            self.assembler.element_matrix(),
            self.mesh.connectivity(),
            self.session.solution(),
            x_phys,
            simp,
            volfrac,
            masks,
        )
    }
}
