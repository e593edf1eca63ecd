//! Objective, volume constraint and their sensitivities.
//!
//! Thermal compliance over the designable elements:
//!
//! ```text
//! f      = Σ_e E(x_e) · uₑᵀ KE uₑ
//! df/dxₑ = −E'(x_e) · uₑᵀ KE uₑ
//! ```
//!
//! Passive elements are excluded from `f` and get a saturated gradient that
//! pins them at their bound: `+1e9` for void elements, `−1e9` for solid and
//! loaded elements.
//!
//! Volume constraint:
//!
//! ```text
//! g      = Σ_designable x_e / n_designable − volfrac
//! dg/dxₑ = 1 / n_designable   (0 on passive elements)
//! ```

use crate::error::{Error, Result};
use crate::material::Simp;
use crate::mesh::ConnectivityView;
use crate::passive::PassiveMasks;
use log::debug;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Gradient magnitude assigned to passive elements.
pub const PASSIVE_SENSITIVITY: f64 = 1.0e9;

/// Objective, constraint and gradients for one design.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub objective: f64,
    pub objective_gradient: Vec<f64>,
    pub constraint: f64,
    pub constraint_gradient: Vec<f64>,
}

/// Evaluate compliance and the volume constraint for temperature `u`.
///
/// # Errors
///
/// [`Error::DimensionMismatch`] if `x_phys`, `masks` or `u` do not match the
/// connectivity, [`Error::NoDesignableElements`] if every element is passive.
pub fn evaluate(
    ke: &DMatrix<f64>,
    connectivity: ConnectivityView<'_>,
    u: &[f64],
    x_phys: &[f64],
    simp: &Simp,
    volfrac: f64,
    masks: &PassiveMasks,
) -> Result<Evaluation> {
    let n_elements = connectivity.len();
    if x_phys.len() != n_elements {
        return Err(Error::DimensionMismatch {
            what: "density field",
            expected: n_elements,
            actual: x_phys.len(),
        });
    }
    masks.check_len(n_elements)?;
    if let Some(&node) = connectivity.as_flat().iter().max() {
        if node >= u.len() {
            return Err(Error::DimensionMismatch {
                what: "temperature field",
                expected: node + 1,
                actual: u.len(),
            });
        }
    }

    let n_designable = masks.n_designable();
    if n_designable == 0 {
        return Err(Error::NoDesignableElements);
    }

    let (contributions, objective_gradient): (Vec<f64>, Vec<f64>) = (0..n_elements)
        .into_par_iter()
        .map(|e| {
            if masks.is_void(e) {
                return (0.0, PASSIVE_SENSITIVITY);
            }
            if masks.is_solid(e) || masks.is_loaded(e) {
                return (0.0, -PASSIVE_SENSITIVITY);
            }
            let energy = element_energy(ke, connectivity.element(e).unwrap_or(&[]), u);
            let x = x_phys[e];
            (simp.interpolate(x) * energy, -simp.derivative(x) * energy)
        })
        .unzip();
    let objective = contributions.par_iter().sum();

    let weight = 1.0 / n_designable as f64;
    let volume: f64 = (0..n_elements)
        .filter(|&e| masks.is_designable(e))
        .map(|e| x_phys[e])
        .sum();
    let passive_volume: f64 = (0..n_elements)
        .filter(|&e| !masks.is_designable(e))
        .map(|e| x_phys[e])
        .sum();
    debug!(
        "volume: designable {:.6} ({} elements), passive {:.6} ({} elements)",
        volume * weight,
        n_designable,
        passive_volume,
        n_elements - n_designable
    );
    let constraint = volume * weight - volfrac;
    let constraint_gradient = (0..n_elements)
        .map(|e| if masks.is_designable(e) { weight } else { 0.0 })
        .collect();

    Ok(Evaluation {
        objective,
        objective_gradient,
        constraint,
        constraint_gradient,
    })
}

/// `uₑᵀ KE uₑ`
fn element_energy(ke: &DMatrix<f64>, nodes: &[usize], u: &[f64]) -> f64 {
    let ue = DVector::from_iterator(nodes.len(), nodes.iter().map(|&n| u[n]));
    ue.dot(&(ke * &ue))
}
