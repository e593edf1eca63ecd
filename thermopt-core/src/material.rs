//! SIMP material interpolation.
//!
//! Solid Isotropic Material with Penalization maps an element density
//! `x ∈ [0, 1]` to a conductivity scale:
//!
//! ```text
//! E(x) = Emin + x^p · (Emax − Emin)
//! ```
//!
//! `Emin > 0` keeps void elements from making the global matrix singular;
//! `p > 1` penalizes intermediate densities.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// SIMP interpolation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Simp {
    /// Conductivity of void material.
    pub e_min: f64,
    /// Conductivity of solid material.
    pub e_max: f64,
    /// Penalization exponent.
    pub penal: f64,
}

impl Simp {
    /// Create SIMP parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMaterial`] unless `0 < e_min < e_max` and
    /// `penal >= 1`, all finite.
    pub fn new(e_min: f64, e_max: f64, penal: f64) -> Result<Self> {
        if !(e_min.is_finite() && e_max.is_finite() && penal.is_finite()) {
            return Err(Error::InvalidMaterial(
                "SIMP parameters must be finite".into(),
            ));
        }
        if e_min <= 0.0 {
            return Err(Error::InvalidMaterial(format!(
                "Emin must be positive, got {}",
                e_min
            )));
        }
        if e_max <= e_min {
            return Err(Error::InvalidMaterial(format!(
                "Emax ({}) must exceed Emin ({})",
                e_max, e_min
            )));
        }
        if penal < 1.0 {
            return Err(Error::InvalidMaterial(format!(
                "penalization must be at least 1, got {}",
                penal
            )));
        }
        Ok(Self { e_min, e_max, penal })
    }

    /// Conductivity scale for density `x`.
    #[inline]
    pub fn interpolate(&self, x: f64) -> f64 {
        self.e_min + x.powf(self.penal) * (self.e_max - self.e_min)
    }

    /// dE/dx at density `x`.
    #[inline]
    pub fn derivative(&self, x: f64) -> f64 {
        self.penal * x.powf(self.penal - 1.0) * (self.e_max - self.e_min)
    }
}

impl Default for Simp {
    /// `Emin = 1e-9`, `Emax = 1`, `p = 3`.
    fn default() -> Self {
        Self {
            e_min: 1.0e-9,
            e_max: 1.0,
            penal: 3.0,
        }
    }
}
