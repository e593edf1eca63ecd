//! Element trait and the isoparametric conductivity kernel.
//!
//! The conductivity integral is written once, generic over [`Element`]:
//!
//! ```text
//! KE = Σ_gp  w · det(J) · Bᵀ κ B,    B = J⁻¹ · dN/dξ,    κ = I
//! ```
//!
//! Element types only provide their reference shape-function derivatives;
//! the Jacobian dimension follows from [`Element::dimension`]. The conductivity
//! tensor is the identity: physical contrast comes from the SIMP scaling
//! applied during assembly.
//!
//! # Submodules
//!
//! - [`gauss`] - Gauss quadrature rules for numerical integration
//! - [`quad4`] - 4-node bilinear quadrilateral
//! - [`hex8`] - 8-node trilinear hexahedron

use crate::error::{Error, Result};
use crate::types::{Dimension, Integration, Point3};
use nalgebra::DMatrix;

pub mod gauss;
pub mod hex8;
pub mod quad4;

pub use gauss::{gauss_1d, gauss_hex, gauss_quad, gauss_rule, GaussPoint};
pub use hex8::Hex8;
pub use quad4::Quad4;

/// Finite element interface for scalar (one DOF per node) conduction.
///
/// Elements must be thread-safe (Send + Sync) so they can be shared with
/// parallel assembly.
pub trait Element: Send + Sync {
    /// Spatial dimension of the element.
    fn dimension(&self) -> Dimension;

    /// Number of nodes in this element.
    fn n_nodes(&self) -> usize {
        self.dimension().nodes_per_element()
    }

    /// Shape functions evaluated at a reference point.
    fn shape_functions(&self, point: &GaussPoint) -> Vec<f64>;

    /// Shape-function derivatives with respect to the reference coordinates.
    ///
    /// Returns a `dim × n_nodes` matrix whose row `a` holds `dN_i/dξ_a`.
    fn shape_derivatives(&self, point: &GaussPoint) -> DMatrix<f64>;

    /// Compute the element conductivity matrix for unit isotropic conductivity.
    ///
    /// # Arguments
    ///
    /// * `coords` - Nodal coordinates in corner order
    /// * `integration` - Full (2 points per axis) or reduced (1 point)
    ///
    /// # Errors
    ///
    /// [`Error::DegenerateElement`] if the Jacobian determinant is not
    /// positive at some integration point.
    fn conductivity(&self, coords: &[Point3], integration: Integration) -> Result<DMatrix<f64>> {
        isoparametric_conductivity(self, coords, integration)
    }

    /// Element area (2D) or volume (3D).
    fn volume(&self, coords: &[Point3]) -> Result<f64> {
        check_coords(self, coords)?;
        let mut volume = 0.0;
        for gp in gauss_rule(self.dimension(), Integration::Full) {
            let dn = self.shape_derivatives(&gp);
            let j = jacobian(&dn, coords, self.dimension().axes());
            volume += determinant(&j) * gp.weight;
        }
        Ok(volume)
    }
}

/// Create the Q1 element for a grid dimension.
pub fn create_element(dimension: Dimension) -> Box<dyn Element> {
    match dimension {
        Dimension::Two => Box::new(Quad4::new()),
        Dimension::Three => Box::new(Hex8::new()),
    }
}

fn check_coords<E: Element + ?Sized>(element: &E, coords: &[Point3]) -> Result<()> {
    if coords.len() != element.n_nodes() {
        return Err(Error::Element(format!(
            "{}D element requires {} nodal coordinates, got {}",
            element.dimension().axes(),
            element.n_nodes(),
            coords.len()
        )));
    }
    Ok(())
}

/// Gauss-point accumulation of `w · det(J) · Bᵀ B`.
fn isoparametric_conductivity<E: Element + ?Sized>(
    element: &E,
    coords: &[Point3],
    integration: Integration,
) -> Result<DMatrix<f64>> {
    check_coords(element, coords)?;

    let dim = element.dimension().axes();
    let n = element.n_nodes();
    let mut ke = DMatrix::zeros(n, n);

    for gp in gauss_rule(element.dimension(), integration) {
        let dn = element.shape_derivatives(&gp);
        let j = jacobian(&dn, coords, dim);
        let (inv_j, det_j) = invert_jacobian(&j)?;

        // Gradient operator: rows are ∂N/∂x, ∂N/∂y[, ∂N/∂z]
        let b = &inv_j * &dn;

        ke += b.transpose() * &b * (gp.weight * det_j);
    }

    Ok(ke)
}

/// J[a][b] = Σ_i dN_i/dξ_a · x_i[b]
fn jacobian(dn: &DMatrix<f64>, coords: &[Point3], dim: usize) -> DMatrix<f64> {
    let x = DMatrix::from_fn(coords.len(), dim, |i, b| coords[i][b]);
    dn * x
}

fn determinant(j: &DMatrix<f64>) -> f64 {
    match j.nrows() {
        2 => j[(0, 0)] * j[(1, 1)] - j[(0, 1)] * j[(1, 0)],
        _ => {
            j[(0, 0)] * (j[(1, 1)] * j[(2, 2)] - j[(1, 2)] * j[(2, 1)])
                - j[(0, 1)] * (j[(1, 0)] * j[(2, 2)] - j[(1, 2)] * j[(2, 0)])
                + j[(0, 2)] * (j[(1, 0)] * j[(2, 1)] - j[(1, 1)] * j[(2, 0)])
        }
    }
}

/// Closed-form cofactor inverse of a 2×2 or 3×3 Jacobian.
///
/// Returns (J⁻¹, det J).
fn invert_jacobian(j: &DMatrix<f64>) -> Result<(DMatrix<f64>, f64)> {
    let det_j = determinant(j);
    if !(det_j.is_finite() && det_j > 0.0) {
        return Err(Error::DegenerateElement { det_j });
    }

    let inv = match j.nrows() {
        2 => DMatrix::from_row_slice(
            2,
            2,
            &[
                j[(1, 1)] / det_j,
                -j[(0, 1)] / det_j,
                -j[(1, 0)] / det_j,
                j[(0, 0)] / det_j,
            ],
        ),
        _ => {
            let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
                j[(r0, c0)] * j[(r1, c1)] - j[(r0, c1)] * j[(r1, c0)]
            };
            // Transposed cofactor matrix (adjugate)
            DMatrix::from_row_slice(
                3,
                3,
                &[
                    cof(1, 2, 1, 2) / det_j,
                    -cof(0, 2, 1, 2) / det_j,
                    cof(0, 1, 1, 2) / det_j,
                    -cof(1, 2, 0, 2) / det_j,
                    cof(0, 2, 0, 2) / det_j,
                    -cof(0, 1, 0, 2) / det_j,
                    cof(1, 2, 0, 1) / det_j,
                    -cof(0, 2, 0, 1) / det_j,
                    cof(0, 1, 0, 1) / det_j,
                ],
            )
        }
    };

    Ok((inv, det_j))
}
