//! Core data types shared across the crate.
//!
//! - Geometric primitives (points)
//! - Spatial dimension of the structured grid
//! - Integration rule selection for element matrices

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point in 3D space. 2D grids store nodes with z = 0.
pub type Point3 = Vector3<f64>;

/// Spatial dimension of a structured grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dimension {
    /// Bilinear quadrilaterals.
    Two,
    /// Trilinear hexahedra.
    Three,
}

impl Dimension {
    /// Number of spatial axes.
    pub fn axes(self) -> usize {
        match self {
            Dimension::Two => 2,
            Dimension::Three => 3,
        }
    }

    /// Nodes per Q1 element (4 for quads, 8 for hexes).
    pub fn nodes_per_element(self) -> usize {
        1 << self.axes()
    }
}

/// Gauss rule used for element matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Integration {
    /// 2 points per axis.
    #[default]
    Full,
    /// 1 point at the element centre.
    Reduced,
}

impl Integration {
    /// Gauss points per axis.
    pub fn points_per_axis(self) -> usize {
        match self {
            Integration::Full => 2,
            Integration::Reduced => 1,
        }
    }
}
