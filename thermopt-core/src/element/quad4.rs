//! 4-node quadrilateral (Quad4) conduction element.
//!
//! - 4 nodes at the corners
//! - 1 DOF per node (temperature)
//! - Bilinear shape functions
//! - 2×2 Gauss integration (or 1 point, reduced)
//!
//! # Shape Functions
//!
//! In natural coordinates (ξ, η) ∈ [-1, 1]²:
//! ```text
//! N_i = (1 + ξ_i*ξ)(1 + η_i*η) / 4
//! ```
//!
//! # Node Numbering
//!
//! Counterclockwise starting from the lower-left corner:
//! ```text
//! 3 --- 2
//! |     |
//! 0 --- 1
//! ```

use crate::element::gauss::GaussPoint;
use crate::element::Element;
use crate::types::Dimension;
use nalgebra::DMatrix;

/// Natural coordinates (ξ_i, η_i) of each node.
const NODE_COORDS: [(f64, f64); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

/// 4-node bilinear quadrilateral.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quad4;

impl Quad4 {
    /// Create a new Quad4 element.
    pub fn new() -> Self {
        Self
    }
}

impl Element for Quad4 {
    fn dimension(&self) -> Dimension {
        Dimension::Two
    }

    fn shape_functions(&self, point: &GaussPoint) -> Vec<f64> {
        let (xi, eta) = (point.xi(), point.eta());
        NODE_COORDS
            .iter()
            .map(|&(xi_i, eta_i)| 0.25 * (1.0 + xi_i * xi) * (1.0 + eta_i * eta))
            .collect()
    }

    fn shape_derivatives(&self, point: &GaussPoint) -> DMatrix<f64> {
        let (xi, eta) = (point.xi(), point.eta());
        let mut dn = DMatrix::zeros(2, 4);
        for (i, &(xi_i, eta_i)) in NODE_COORDS.iter().enumerate() {
            // dN_i/dξ = ξ_i (1 + η_i η) / 4
            dn[(0, i)] = 0.25 * xi_i * (1.0 + eta_i * eta);
            // dN_i/dη = η_i (1 + ξ_i ξ) / 4
            dn[(1, i)] = 0.25 * eta_i * (1.0 + xi_i * xi);
        }
        dn
    }
}
