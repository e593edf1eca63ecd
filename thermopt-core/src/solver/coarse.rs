//! Coarse-level solvers for the multigrid hierarchy.
//!
//! - GMRES (restart 30, at most 30 iterations, relative tolerance 1e-8)
//!   preconditioned by one symmetric SOR sweep. This is the default.
//! - Sparse Cholesky (LLᵀ) from faer. The symbolic analysis is done once,
//!   the numeric factorization on every rebind. Galerkin coarse operators
//!   of the masked conductivity matrix are symmetric positive definite.

use crate::error::{Error, Result};
use crate::solver::multigrid::SsorPreconditioner;
use crate::solver::{check_len, fgmres, CoarseConfig, CoarseSolver, KrylovSettings};
use crate::sparse::CsrMatrix;
use faer::linalg::cholesky::llt::factor::LltError;
use faer::prelude::*;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::linalg::LltError as SparseLltError;
use faer::sparse::{SparseColMat, SymbolicSparseColMat};

/// Lower triangle of a symmetric CSR operator, in faer's CSC layout.
///
/// For a symmetric matrix, the entries right of the diagonal in row `i`
/// are the entries below the diagonal in column `i`. CSR column indices are
/// sorted, so each column comes out sorted as well. Only the triangle read
/// by the `Side::Lower` factorization is kept.
fn lower_triangle(matrix: &CsrMatrix) -> SparseColMat<usize, f64> {
    let n = matrix.nrows();
    let mut col_ptr = Vec::with_capacity(n + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();

    col_ptr.push(0);
    for (i, row) in matrix.row_iter().enumerate() {
        let first = row.col_indices().partition_point(|&c| c < i);
        row_idx.extend_from_slice(&row.col_indices()[first..]);
        values.extend_from_slice(&row.values()[first..]);
        col_ptr.push(row_idx.len());
    }

    SparseColMat::new(
        SymbolicSparseColMat::new_checked(n, n, col_ptr, None, row_idx),
        values,
    )
}

fn map_llt_error(e: SparseLltError) -> Error {
    match e {
        SparseLltError::Generic(err) => Error::Solver(format!("Sparse Cholesky error: {:?}", err)),
        SparseLltError::Numeric(LltError::NonPositivePivot { index }) => Error::SingularMatrix(
            format!("Matrix is not positive definite at pivot {}", index),
        ),
    }
}

/// One-shot sparse Cholesky solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaerCholeskySolver;

impl FaerCholeskySolver {
    pub fn new() -> Self {
        Self
    }

    /// Factor `matrix` and solve `matrix · x = rhs`.
    pub fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>> {
        let mut solver = CachedCholeskySolver::new();
        solver.factor(matrix)?;
        solver.solve(rhs)
    }
}

/// Sparse Cholesky solver with cached symbolic analysis and factorization.
///
/// [`factor`](Self::factor) reuses the symbolic analysis as long as the
/// matrix dimension does not change.
#[derive(Default)]
pub struct CachedCholeskySolver {
    symbolic: Option<SymbolicLlt<usize>>,
    factor: Option<Llt<usize, f64>>,
    n: usize,
}

impl std::fmt::Debug for CachedCholeskySolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCholeskySolver")
            .field("n", &self.n)
            .field("factored", &self.factor.is_some())
            .finish()
    }
}

impl CachedCholeskySolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perform the symbolic analysis of the sparsity pattern.
    pub fn analyze(&mut self, matrix: &CsrMatrix) -> Result<()> {
        if matrix.nrows() != matrix.ncols() {
            return Err(Error::Solver("Matrix must be square".into()));
        }
        let csc = lower_triangle(matrix);
        let symbolic = SymbolicLlt::try_new(csc.as_ref().symbolic(), faer::Side::Lower)
            .map_err(|_| Error::Solver("Symbolic Cholesky analysis failed".into()))?;
        self.symbolic = Some(symbolic);
        self.n = matrix.nrows();
        Ok(())
    }

    /// Numerically factor `matrix`, analyzing it first if needed.
    pub fn factor(&mut self, matrix: &CsrMatrix) -> Result<()> {
        if self.symbolic.is_none() || self.n != matrix.nrows() {
            self.analyze(matrix)?;
        }
        let symbolic = self
            .symbolic
            .as_ref()
            .ok_or_else(|| Error::Solver("No cached symbolic factorization".into()))?;

        let csc = lower_triangle(matrix);
        let llt = Llt::try_new_with_symbolic(symbolic.clone(), csc.as_ref(), faer::Side::Lower)
            .map_err(map_llt_error)?;
        self.factor = Some(llt);
        Ok(())
    }

    /// Solve with the current factorization.
    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        let llt = self
            .factor
            .as_ref()
            .ok_or_else(|| Error::Solver("matrix has not been factored".into()))?;
        check_len("right-hand side", rhs.len(), self.n)?;
        if self.n == 0 {
            return Ok(vec![]);
        }

        let mut x = faer::Mat::from_fn(self.n, 1, |i, _| rhs[i]);
        llt.solve_in_place(x.as_mut());
        Ok((0..self.n).map(|i| x[(i, 0)]).collect())
    }
}

/// Solver for the coarsest multigrid level.
#[derive(Debug)]
pub enum CoarseSolve {
    Gmres {
        settings: KrylovSettings,
        omega: f64,
    },
    Cholesky(CachedCholeskySolver),
}

impl CoarseSolve {
    pub fn new(config: &CoarseConfig, omega: f64) -> Self {
        match config.solver {
            CoarseSolver::Gmres => CoarseSolve::Gmres {
                settings: config.krylov(),
                omega,
            },
            CoarseSolver::Cholesky => CoarseSolve::Cholesky(CachedCholeskySolver::new()),
        }
    }

    /// Prepare for a new coarse operator.
    pub fn rebind(&mut self, operator: &CsrMatrix) -> Result<()> {
        match self {
            CoarseSolve::Gmres { .. } => Ok(()),
            CoarseSolve::Cholesky(solver) => solver.factor(operator),
        }
    }

    /// Approximately solve `operator · x = b`, starting from zero.
    pub fn solve(
        &self,
        operator: &CsrMatrix,
        diagonal: &[f64],
        b: &[f64],
        x: &mut [f64],
    ) -> Result<()> {
        match self {
            CoarseSolve::Gmres { settings, omega } => {
                x.fill(0.0);
                let ssor = SsorPreconditioner::new(operator, diagonal, *omega);
                fgmres(operator, b, x, &ssor, settings)?;
                Ok(())
            }
            CoarseSolve::Cholesky(solver) => {
                x.copy_from_slice(&solver.solve(b)?);
                Ok(())
            }
        }
    }
}
