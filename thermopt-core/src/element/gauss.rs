//! Gauss quadrature rules for numerical integration.
//!
//! Tensor-product Gauss-Legendre rules on the reference square [-1, 1]² and
//! cube [-1, 1]³, as used by the Q1 conduction elements.
//!
//! # Usage
//!
//! ```
//! use thermopt_core::element::gauss::{gauss_1d, gauss_rule};
//! use thermopt_core::types::{Dimension, Integration};
//!
//! // 2-point 1D rule
//! for (xi, w) in gauss_1d(Integration::Full) {
//!     // integrate at point xi with weight w
//! }
//!
//! // 2×2×2 rule on the reference cube
//! let rule = gauss_rule(Dimension::Three, Integration::Full);
//! assert_eq!(rule.len(), 8);
//! ```

use crate::types::{Dimension, Integration};

/// A Gauss quadrature point with natural coordinates and weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPoint {
    /// Natural coordinates [ξ, η, ζ]. Unused axes are zero.
    pub coords: [f64; 3],
    /// Integration weight (product of the 1D weights).
    pub weight: f64,
}

impl GaussPoint {
    /// Create a new Gauss point.
    pub fn new(coords: [f64; 3], weight: f64) -> Self {
        Self { coords, weight }
    }

    /// Get ξ (first natural coordinate).
    #[inline]
    pub fn xi(&self) -> f64 {
        self.coords[0]
    }

    /// Get η (second natural coordinate).
    #[inline]
    pub fn eta(&self) -> f64 {
        self.coords[1]
    }

    /// Get ζ (third natural coordinate).
    #[inline]
    pub fn zeta(&self) -> f64 {
        self.coords[2]
    }
}

/// 1D Gauss-Legendre quadrature points and weights.
///
/// Returns (point, weight) pairs for integration on [-1, 1]: the 2-point
/// rule for full integration, the midpoint rule for reduced.
pub fn gauss_1d(integration: Integration) -> Vec<(f64, f64)> {
    match integration {
        Integration::Reduced => vec![(0.0, 2.0)],
        Integration::Full => {
            let p = 1.0 / 3.0_f64.sqrt();
            vec![(-p, 1.0), (p, 1.0)]
        }
    }
}

/// Quadrilateral Gauss points on [-1, 1]², n² in total.
pub fn gauss_quad(integration: Integration) -> Vec<GaussPoint> {
    let rule_1d = gauss_1d(integration);
    let n = rule_1d.len();
    let mut points = Vec::with_capacity(n * n);

    for &(xi, w_xi) in &rule_1d {
        for &(eta, w_eta) in &rule_1d {
            points.push(GaussPoint::new([xi, eta, 0.0], w_xi * w_eta));
        }
    }

    points
}

/// Hexahedral Gauss points on [-1, 1]³, n³ in total.
pub fn gauss_hex(integration: Integration) -> Vec<GaussPoint> {
    let rule_1d = gauss_1d(integration);
    let n = rule_1d.len();
    let mut points = Vec::with_capacity(n * n * n);

    for &(xi, w_xi) in &rule_1d {
        for &(eta, w_eta) in &rule_1d {
            for &(zeta, w_zeta) in &rule_1d {
                points.push(GaussPoint::new([xi, eta, zeta], w_xi * w_eta * w_zeta));
            }
        }
    }

    points
}

/// Integration rule for a Q1 element of the given dimension.
pub fn gauss_rule(dimension: Dimension, integration: Integration) -> Vec<GaussPoint> {
    match dimension {
        Dimension::Two => gauss_quad(integration),
        Dimension::Three => gauss_hex(integration),
    }
}
