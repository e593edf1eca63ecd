//! Error types for thermopt operations.

use thiserror::Error;

/// Result type alias using thermopt Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during thermopt operations.
///
/// Every variant is a configuration or setup defect. Slow Krylov convergence
/// is not an error; it is reported through [`crate::solver::SolveReport`].
#[derive(Error, Debug)]
pub enum Error {
    /// Element-related errors.
    #[error("element error: {0}")]
    Element(String),

    /// Zero-area/volume or inverted element.
    #[error("degenerate element: Jacobian determinant is {det_j:e}")]
    DegenerateElement { det_j: f64 },

    /// Mesh-related errors.
    #[error("mesh error: {0}")]
    Mesh(String),

    /// The grid cannot be coarsened by a factor of two.
    #[error("cannot coarsen grid: axis {axis} has {elements} elements, expected an even count >= 2")]
    Coarsening { axis: usize, elements: usize },

    /// Assembly errors.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Vector or matrix sizes do not agree.
    #[error("{what}: expected length {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Invalid SIMP interpolation parameters.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    /// A passive flag that is neither 0 nor 1.
    #[error("passive mask `{mask}` has value {value} at element {element}; expected 0 or 1")]
    InvalidMask {
        mask: &'static str,
        element: usize,
        value: f64,
    },

    /// An element flagged in more than one passive mask.
    #[error("element {element} is flagged in more than one passive mask")]
    OverlappingMasks { element: usize },

    /// Every element is passive, so the volume constraint is undefined.
    #[error("no designable elements: every element is flagged passive")]
    NoDesignableElements,

    /// Solver errors.
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or conditioning issues.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
