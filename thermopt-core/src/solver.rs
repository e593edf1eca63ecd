//! Linear system solvers.
//!
//! The masked conductivity system `K u = f` is solved with restarted flexible
//! GMRES, right-preconditioned by a geometric multigrid V-cycle.
//!
//! # Components
//!
//! - [`fgmres`]: restarted flexible GMRES with Givens rotations
//! - [`multigrid`]: grid hierarchy, Galerkin coarse operators, SOR smoothing
//! - [`coarse`]: coarse-level solvers (GMRES + SSOR, or faer sparse Cholesky)
//! - [`session`]: [`SolverSession`], which builds the hierarchy on first use
//!   and warm-starts later solves
//!
//! Slow convergence is not an error: every solve returns a [`SolveReport`]
//! whose [`ConvergenceReason`] tells the caller how the iteration stopped.

use crate::error::{Error, Result};
use crate::sparse::{axpy, norm2, residual, spmv, CsrMatrix};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod coarse;
pub mod multigrid;
pub mod session;

pub use coarse::{CachedCholeskySolver, FaerCholeskySolver};
pub use multigrid::Multigrid;
pub use session::SolverSession;

/// Coarse-level solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CoarseSolver {
    /// A few GMRES iterations preconditioned by one SSOR sweep.
    #[default]
    Gmres,
    /// Sparse Cholesky factorization, refactored on every rebind.
    Cholesky,
}

/// Coarse-level solver configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoarseConfig {
    pub solver: CoarseSolver,
    /// Relative tolerance of the coarse GMRES.
    pub rtol: f64,
    /// Iteration cap of the coarse GMRES.
    pub max_iterations: usize,
    /// Restart length of the coarse GMRES.
    pub restart: usize,
}

impl Default for CoarseConfig {
    fn default() -> Self {
        Self {
            solver: CoarseSolver::Gmres,
            rtol: 1e-8,
            max_iterations: 30,
            restart: 30,
        }
    }
}

impl CoarseConfig {
    /// Krylov settings for the coarse GMRES.
    pub fn krylov(&self) -> KrylovSettings {
        KrylovSettings {
            rtol: self.rtol,
            atol: 1e-50,
            dtol: 1e5,
            max_iterations: self.max_iterations,
            restart: self.restart,
        }
    }
}

/// State solver configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Number of multigrid levels, finest included.
    pub levels: usize,
    /// Relative residual tolerance, measured against `‖RHS‖₂`.
    pub rtol: f64,
    /// Absolute residual tolerance.
    pub atol: f64,
    /// Stop as diverged when the residual grows by this factor.
    pub dtol: f64,
    pub max_iterations: usize,
    /// Krylov restart length.
    pub restart: usize,
    /// Symmetric SOR sweeps before and after each coarse correction.
    pub smoothing_sweeps: usize,
    /// SOR relaxation factor.
    pub omega: f64,
    pub coarse: CoarseConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            levels: 4,
            rtol: 1e-5,
            atol: 1e-50,
            dtol: 1e5,
            max_iterations: 200,
            restart: 100,
            smoothing_sweeps: 4,
            omega: 1.0,
            coarse: CoarseConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.levels == 0 {
            return Err(Error::Solver("multigrid needs at least one level".into()));
        }
        if self.restart == 0 || self.coarse.restart == 0 {
            return Err(Error::Solver("GMRES restart length must be positive".into()));
        }
        if !(self.omega > 0.0 && self.omega < 2.0) {
            return Err(Error::Solver(format!(
                "SOR relaxation factor must lie in (0, 2), got {}",
                self.omega
            )));
        }
        if !(self.rtol >= 0.0 && self.atol >= 0.0 && self.dtol > 1.0) {
            return Err(Error::Solver(
                "tolerances must be non-negative and dtol greater than 1".into(),
            ));
        }
        Ok(())
    }

    /// Krylov settings for the outer FGMRES.
    pub fn krylov(&self) -> KrylovSettings {
        KrylovSettings {
            rtol: self.rtol,
            atol: self.atol,
            dtol: self.dtol,
            max_iterations: self.max_iterations,
            restart: self.restart,
        }
    }
}

/// Stopping parameters of one Krylov solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KrylovSettings {
    pub rtol: f64,
    pub atol: f64,
    pub dtol: f64,
    pub max_iterations: usize,
    pub restart: usize,
}

/// Why an iterative solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConvergenceReason {
    Converged,
    MaxIterations,
    Diverged,
}

/// Raw outcome of a Krylov solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KrylovOutcome {
    pub iterations: usize,
    /// True residual norm `‖b − A x‖₂` at exit.
    pub residual_norm: f64,
    pub reason: ConvergenceReason,
}

/// Solution statistics of a state solve.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveReport {
    pub iterations: usize,
    /// `‖RHS − K U‖₂ / ‖RHS‖₂` (0 for a zero right-hand side).
    pub relative_residual: f64,
    pub reason: ConvergenceReason,
    /// Wall-clock time in seconds.
    pub time_seconds: f64,
}

impl SolveReport {
    pub fn converged(&self) -> bool {
        self.reason == ConvergenceReason::Converged
    }
}

/// Preconditioner interface: `z ≈ A⁻¹ r`.
///
/// Implementations may be non-linear (an inner Krylov solve, for example);
/// [`fgmres`] does not assume the operator is fixed between iterations.
pub trait Preconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<()>;
}

/// `z = r`
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<()> {
        z.copy_from_slice(r);
        Ok(())
    }
}

/// Restarted flexible GMRES with right preconditioning.
///
/// `x` holds the initial guess on entry and the iterate on exit. Convergence
/// is declared when `‖r‖ <= max(rtol·‖b‖, atol)`, divergence when
/// `‖r‖ > dtol·‖r₀‖`. A zero `b` gives `x = 0` without iterating; a
/// non-finite `b` or initial residual is reported as diverged.
///
/// # Errors
///
/// [`Error::DimensionMismatch`] if the sizes of `a`, `b` and `x` disagree,
/// and any error raised by the preconditioner.
pub fn fgmres(
    a: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
    precond: &dyn Preconditioner,
    settings: &KrylovSettings,
) -> Result<KrylovOutcome> {
    let n = b.len();
    check_len("matrix rows", a.nrows(), n)?;
    check_len("matrix columns", a.ncols(), n)?;
    check_len("initial guess", x.len(), n)?;

    let b_norm = norm2(b);
    if !b_norm.is_finite() {
        return Ok(outcome(0, b_norm, ConvergenceReason::Diverged));
    }
    if b_norm == 0.0 {
        x.fill(0.0);
        return Ok(KrylovOutcome {
            iterations: 0,
            residual_norm: 0.0,
            reason: ConvergenceReason::Converged,
        });
    }

    let tol = (settings.rtol * b_norm).max(settings.atol);
    let m = settings.restart.max(1);

    let mut r = vec![0.0; n];
    residual(a, x, b, &mut r);
    let mut beta = norm2(&r);
    if !beta.is_finite() {
        return Ok(outcome(0, beta, ConvergenceReason::Diverged));
    }
    let r0_norm = beta;
    let mut iterations = 0;

    let mut w = vec![0.0; n];
    while beta > tol {
        if iterations >= settings.max_iterations {
            return Ok(outcome(iterations, beta, ConvergenceReason::MaxIterations));
        }

        let mut v: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
        let mut z: Vec<Vec<f64>> = Vec::with_capacity(m);
        let mut h = vec![vec![0.0; m]; m + 1];
        let mut cs = vec![0.0; m];
        let mut sn = vec![0.0; m];
        let mut g = vec![0.0; m + 1];
        g[0] = beta;
        v.push(r.iter().map(|ri| ri / beta).collect());

        let mut k = 0;
        let mut diverged = false;
        while k < m && iterations < settings.max_iterations {
            let mut zk = vec![0.0; n];
            precond.apply(&v[k], &mut zk)?;
            spmv(a, &zk, &mut w);
            z.push(zk);

            // Modified Gram-Schmidt
            for (i, vi) in v.iter().enumerate() {
                let hik = crate::sparse::dot(&w, vi);
                h[i][k] = hik;
                axpy(-hik, vi, &mut w);
            }
            let h_next = norm2(&w);
            h[k + 1][k] = h_next;

            for i in 0..k {
                let (hi, hi1) = (h[i][k], h[i + 1][k]);
                h[i][k] = cs[i] * hi + sn[i] * hi1;
                h[i + 1][k] = -sn[i] * hi + cs[i] * hi1;
            }
            let (c, s) = givens(h[k][k], h[k + 1][k]);
            cs[k] = c;
            sn[k] = s;
            h[k][k] = c * h[k][k] + s * h[k + 1][k];
            h[k + 1][k] = 0.0;
            g[k + 1] = -s * g[k];
            g[k] *= c;

            iterations += 1;
            k += 1;

            let estimate = g[k].abs();
            if estimate > settings.dtol * r0_norm {
                diverged = true;
                break;
            }
            if estimate <= tol || h_next <= f64::EPSILON * beta {
                break;
            }
            v.push(w.iter().map(|wi| wi / h_next).collect());
        }

        // Back-substitution for the least-squares coefficients
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let mut sum = g[i];
            for j in i + 1..k {
                sum -= h[i][j] * y[j];
            }
            y[i] = if h[i][i] != 0.0 { sum / h[i][i] } else { 0.0 };
        }
        for (yi, zi) in y.iter().zip(&z) {
            axpy(*yi, zi, x);
        }

        residual(a, x, b, &mut r);
        beta = norm2(&r);
        if diverged || !beta.is_finite() {
            return Ok(outcome(iterations, beta, ConvergenceReason::Diverged));
        }
    }

    Ok(outcome(iterations, beta, ConvergenceReason::Converged))
}

fn outcome(iterations: usize, residual_norm: f64, reason: ConvergenceReason) -> KrylovOutcome {
    KrylovOutcome {
        iterations,
        residual_norm,
        reason,
    }
}

/// Rotation `(c, s)` that zeroes `b` in `[a, b]`.
fn givens(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        (1.0, 0.0)
    } else {
        let r = a.hypot(b);
        (a / r, b / r)
    }
}

pub(crate) fn check_len(what: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
