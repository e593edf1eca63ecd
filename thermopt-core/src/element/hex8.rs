//! 8-node hexahedron (Hex8) conduction element.
//!
//! The Hex8 is the 3D Q1 element with:
//! - 8 nodes at vertices of a hexahedron
//! - 1 DOF per node (temperature)
//! - Trilinear shape functions
//! - 2×2×2 Gauss integration (8 points), or 1 point when reduced
//!
//! # Shape Functions
//!
//! Trilinear shape functions in natural coordinates (ξ, η, ζ) ∈ [-1, 1]³:
//! ```text
//! N_i = (1 + ξ_i*ξ)(1 + η_i*η)(1 + ζ_i*ζ) / 8
//! ```
//! where (ξ_i, η_i, ζ_i) are ±1 for node i.
//!
//! # Node Numbering
//!
//! Counterclockwise in the bottom layer, then the same in the top layer:
//! ```text
//!        7-------6
//!       /|      /|
//!      / |     / |
//!     4-------5  |
//!     |  3----|--2
//!     | /     | /
//!     |/      |/
//!     0-------1
//! ```

use crate::element::gauss::GaussPoint;
use crate::element::Element;
use crate::types::Dimension;
use nalgebra::DMatrix;

/// Natural coordinates for each of the 8 nodes.
/// Node i has natural coordinates (XI[i], ETA[i], ZETA[i]).
const XI: [f64; 8] = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
const ETA: [f64; 8] = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
const ZETA: [f64; 8] = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];

/// 8-node hexahedral element (trilinear brick).
#[derive(Debug, Clone, Copy, Default)]
pub struct Hex8;

impl Hex8 {
    /// Create a new Hex8 element.
    pub fn new() -> Self {
        Self
    }
}

impl Element for Hex8 {
    fn dimension(&self) -> Dimension {
        Dimension::Three
    }

    fn shape_functions(&self, point: &GaussPoint) -> Vec<f64> {
        let (xi, eta, zeta) = (point.xi(), point.eta(), point.zeta());
        (0..8)
            .map(|i| 0.125 * (1.0 + XI[i] * xi) * (1.0 + ETA[i] * eta) * (1.0 + ZETA[i] * zeta))
            .collect()
    }

    fn shape_derivatives(&self, point: &GaussPoint) -> DMatrix<f64> {
        let (xi, eta, zeta) = (point.xi(), point.eta(), point.zeta());
        let mut dn = DMatrix::zeros(3, 8);

        for i in 0..8 {
            let xi_i = XI[i];
            let eta_i = ETA[i];
            let zeta_i = ZETA[i];

            // dN_i/dξ = (1/8) * ξ_i * (1 + η_i*η) * (1 + ζ_i*ζ)
            dn[(0, i)] = 0.125 * xi_i * (1.0 + eta_i * eta) * (1.0 + zeta_i * zeta);

            // dN_i/dη = (1/8) * (1 + ξ_i*ξ) * η_i * (1 + ζ_i*ζ)
            dn[(1, i)] = 0.125 * (1.0 + xi_i * xi) * eta_i * (1.0 + zeta_i * zeta);

            // dN_i/dζ = (1/8) * (1 + ξ_i*ξ) * (1 + η_i*η) * ζ_i
            dn[(2, i)] = 0.125 * (1.0 + xi_i * xi) * (1.0 + eta_i * eta) * zeta_i;
        }

        dn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{Integration, Point3};
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn brick(dx: f64, dy: f64, dz: f64) -> Vec<Point3> {
        vec![
            Point3::new(0.0, 0.0, 0.0), // 0
            Point3::new(dx, 0.0, 0.0),  // 1
            Point3::new(dx, dy, 0.0),   // 2
            Point3::new(0.0, dy, 0.0),  // 3
            Point3::new(0.0, 0.0, dz),  // 4
            Point3::new(dx, 0.0, dz),   // 5
            Point3::new(dx, dy, dz),    // 6
            Point3::new(0.0, dy, dz),   // 7
        ]
    }

    #[test]
    fn test_hex8_shape_functions_at_nodes() {
        // N_i = 1 at node i, 0 at other nodes
        let hex = Hex8::new();
        for i in 0..8 {
            let n = hex.shape_functions(&GaussPoint::new([XI[i], ETA[i], ZETA[i]], 1.0));
            for (j, &value) in n.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(value, expected, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_hex8_derivatives_sum_to_zero() {
        let hex = Hex8::new();
        let dn = hex.shape_derivatives(&GaussPoint::new([0.3, -0.2, 0.8], 1.0));
        for a in 0..3 {
            assert_relative_eq!(dn.row(a).sum(), 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_hex8_unit_cube_closed_form() {
        let ke = Hex8::new()
            .conductivity(&brick(1.0, 1.0, 1.0), Integration::Full)
            .unwrap();

        // Node 0 couples to: 1, 3, 4 along edges; 2, 5, 7 across faces; 6 through the body
        assert_relative_eq!(ke[(0, 0)], 1.0 / 3.0, epsilon = 1e-12);
        for j in [1, 3, 4] {
            assert_relative_eq!(ke[(0, j)], 0.0, epsilon = 1e-12);
        }
        for j in [2, 5, 7, 6] {
            assert_relative_eq!(ke[(0, j)], -1.0 / 12.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_hex8_scales_with_edge_length() {
        let unit = Hex8::new()
            .conductivity(&brick(1.0, 1.0, 1.0), Integration::Full)
            .unwrap();
        let double = Hex8::new()
            .conductivity(&brick(2.0, 2.0, 2.0), Integration::Full)
            .unwrap();
        assert_relative_eq!(double, unit * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_hex8_symmetric() {
        let ke = Hex8::new()
            .conductivity(&brick(0.5, 1.5, 0.25), Integration::Full)
            .unwrap();
        for i in 0..8 {
            for j in 0..8 {
                assert_relative_eq!(ke[(i, j)], ke[(j, i)], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_hex8_constant_temperature_null_space() {
        for integration in [Integration::Full, Integration::Reduced] {
            let ke = Hex8::new()
                .conductivity(&brick(1.0, 2.0, 0.5), integration)
                .unwrap();
            let flux = &ke * DVector::from_element(8, -2.5);
            assert_relative_eq!(flux.norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_hex8_positive_diagonal() {
        let ke = Hex8::new()
            .conductivity(&brick(1.0, 1.0, 1.0), Integration::Full)
            .unwrap();
        for i in 0..8 {
            assert!(ke[(i, i)] > 0.0, "KE[{},{}] = {} should be positive", i, i, ke[(i, i)]);
        }
    }

    #[test]
    fn test_hex8_volume_stretched() {
        let vol = Hex8::new().volume(&brick(2.0, 1.0, 1.0)).unwrap();
        assert_relative_eq!(vol, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_hex8_flat_element_rejected() {
        let coords = brick(1.0, 1.0, 0.0);
        let result = Hex8::new().conductivity(&coords, Integration::Full);
        assert!(matches!(result, Err(Error::DegenerateElement { .. })));
    }
}
