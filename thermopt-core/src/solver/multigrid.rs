//! Geometric multigrid preconditioner.
//!
//! The grid hierarchy is built once by halving the mesh `levels − 1` times.
//! Each level above the coarsest keeps the bilinear/trilinear prolongation
//! `P` from the next coarser grid and the restriction `R = Pᵀ`. On every
//! [`Multigrid::rebind`] the coarse operators are recomputed from the new
//! fine matrix by the Galerkin product `A_c = Pᵀ A P`.
//!
//! One application is a multiplicative V-cycle: symmetric SOR pre-smoothing,
//! restricted residual, recursive coarse correction, prolongation, symmetric
//! SOR post-smoothing. The coarsest level is handed to [`CoarseSolve`].

use crate::error::{Error, Result};
use crate::mesh::StructuredMesh;
use crate::solver::coarse::CoarseSolve;
use crate::solver::{check_len, Preconditioner, SolverConfig};
use crate::sparse::{axpy, diagonal, residual, spmv, CsrMatrix};
use log::{debug, warn};

/// One symmetric SOR sweep (forward then backward Gauss-Seidel) on `A x = b`.
pub fn ssor_sweep(a: &CsrMatrix, diag: &[f64], b: &[f64], x: &mut [f64], omega: f64) {
    let n = b.len();
    let relax = |i: usize, x: &mut [f64]| {
        let row = a.row(i);
        let mut sigma = 0.0;
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            if j != i {
                sigma += v * x[j];
            }
        }
        x[i] = (1.0 - omega) * x[i] + omega * (b[i] - sigma) / diag[i];
    };
    for i in 0..n {
        relax(i, x);
    }
    for i in (0..n).rev() {
        relax(i, x);
    }
}

/// One SSOR sweep from a zero initial guess.
pub struct SsorPreconditioner<'a> {
    a: &'a CsrMatrix,
    diag: &'a [f64],
    omega: f64,
}

impl<'a> SsorPreconditioner<'a> {
    pub fn new(a: &'a CsrMatrix, diag: &'a [f64], omega: f64) -> Self {
        Self { a, diag, omega }
    }
}

impl Preconditioner for SsorPreconditioner<'_> {
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<()> {
        z.fill(0.0);
        ssor_sweep(self.a, self.diag, r, z, self.omega);
        Ok(())
    }
}

/// Operator of one level, with its diagonal for SOR.
#[derive(Debug, Clone)]
struct Level {
    operator: CsrMatrix,
    diagonal: Vec<f64>,
}

impl Level {
    fn new(operator: CsrMatrix, level: usize) -> Result<Self> {
        let diagonal = diagonal(&operator);
        if let Some(row) = diagonal.iter().position(|&d| !(d > 0.0)) {
            return Err(Error::SingularMatrix(format!(
                "level {} operator has non-positive diagonal {} at row {}",
                level, diagonal[row], row
            )));
        }
        Ok(Self { operator, diagonal })
    }
}

/// Multigrid V-cycle over a structured grid hierarchy.
#[derive(Debug)]
pub struct Multigrid {
    /// `prolongations[l]` maps level `l + 1` to level `l`.
    prolongations: Vec<CsrMatrix>,
    restrictions: Vec<CsrMatrix>,
    sizes: Vec<usize>,
    levels: Vec<Level>,
    coarse: CoarseSolve,
    sweeps: usize,
    omega: f64,
}

impl Multigrid {
    /// Build the grid hierarchy for `mesh` (finest first).
    ///
    /// # Errors
    ///
    /// [`Error::Coarsening`] if the mesh cannot be halved `levels − 1` times.
    pub fn new<M: StructuredMesh>(mesh: &M, config: &SolverConfig) -> Result<Self> {
        config.validate()?;

        let mut prolongations = Vec::with_capacity(config.levels - 1);
        let mut sizes = vec![mesh.n_nodes()];
        let mut coarser: Option<M> = None;

        for level in 1..config.levels {
            let fine = coarser.as_ref().unwrap_or(mesh);
            let next = fine.coarsen().inspect_err(|e| {
                warn!("cannot build multigrid level {}: {}", level, e);
            })?;
            prolongations.push(fine.interpolation(&next)?);
            sizes.push(next.n_nodes());
            coarser = Some(next);
        }

        let restrictions = prolongations.iter().map(|p| p.transpose()).collect();

        debug!(
            "multigrid: {} levels, nodes per level {:?}, {} SOR sweeps (omega = {}), coarse solver {:?}",
            config.levels, sizes, config.smoothing_sweeps, config.omega, config.coarse.solver
        );

        Ok(Self {
            prolongations,
            restrictions,
            sizes,
            levels: Vec::new(),
            coarse: CoarseSolve::new(&config.coarse, config.omega),
            sweeps: config.smoothing_sweeps,
            omega: config.omega,
        })
    }

    pub fn n_levels(&self) -> usize {
        self.sizes.len()
    }

    /// Unknowns per level, finest first.
    pub fn level_sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// True once an operator has been bound.
    pub fn is_bound(&self) -> bool {
        !self.levels.is_empty()
    }

    /// Operator of a level, once bound.
    pub fn operator(&self, level: usize) -> Option<&CsrMatrix> {
        self.levels.get(level).map(|l| &l.operator)
    }

    /// Bind a new fine-grid matrix and recompute the Galerkin operators.
    ///
    /// On error the previously bound operators stay in place.
    pub fn rebind(&mut self, a: &CsrMatrix) -> Result<()> {
        check_len("matrix rows", a.nrows(), self.sizes[0])?;
        check_len("matrix columns", a.ncols(), self.sizes[0])?;

        let mut levels = Vec::with_capacity(self.sizes.len());
        let mut current = a.clone();
        for (l, (p, r)) in self.prolongations.iter().zip(&self.restrictions).enumerate() {
            let coarse = r * &(&current * p);
            levels.push(Level::new(current, l)?);
            current = coarse;
        }
        let coarsest = Level::new(current, self.sizes.len() - 1)?;
        self.coarse.rebind(&coarsest.operator)?;
        levels.push(coarsest);

        self.levels = levels;
        Ok(())
    }

    fn vcycle(&self, l: usize, b: &[f64], x: &mut [f64]) -> Result<()> {
        let level = &self.levels[l];
        if l + 1 == self.levels.len() {
            return self.coarse.solve(&level.operator, &level.diagonal, b, x);
        }

        for _ in 0..self.sweeps {
            ssor_sweep(&level.operator, &level.diagonal, b, x, self.omega);
        }

        let mut r = vec![0.0; b.len()];
        residual(&level.operator, x, b, &mut r);
        let mut rc = vec![0.0; self.sizes[l + 1]];
        spmv(&self.restrictions[l], &r, &mut rc);

        let mut xc = vec![0.0; self.sizes[l + 1]];
        self.vcycle(l + 1, &rc, &mut xc)?;
        spmv(&self.prolongations[l], &xc, &mut r);
        axpy(1.0, &r, x);

        for _ in 0..self.sweeps {
            ssor_sweep(&level.operator, &level.diagonal, b, x, self.omega);
        }
        Ok(())
    }
}

impl Preconditioner for Multigrid {
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<()> {
        if !self.is_bound() {
            return Err(Error::Solver("multigrid has no operator bound".into()));
        }
        z.fill(0.0);
        self.vcycle(0, r, z)
    }
}
