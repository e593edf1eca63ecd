//! thermopt core - heat conduction physics for SIMP topology optimization
//!
//! Steady-state conduction on structured grids of Q1 elements with:
//! - Isoparametric conductivity matrices for 4-node quads and 8-node hexes
//! - Fixed-pattern sparse assembly with SIMP density scaling
//! - Dirichlet elimination by masking
//! - FGMRES with a geometric multigrid preconditioner
//! - Compliance and volume sensitivities with passive regions
//!
//! # Architecture
//!
//! - [`Element`] trait: shape functions and the generic conductivity kernel
//! - [`StructuredMesh`] trait: grid counts, connectivity, coarsening
//! - [`Assembler`]: per-iteration assembly of the masked system
//! - [`SolverSession`]: multigrid hierarchy and warm-started solves
//! - [`HeatConduction`]: the driver used by an outer optimizer

pub mod assembly;
pub mod element;
pub mod error;
pub mod material;
pub mod mesh;
pub mod passive;
pub mod problem;
pub mod sensitivity;
pub mod solver;
pub mod sparse;
pub mod types;

pub use assembly::{Assembler, ClampPatch, LoadCase};
pub use element::{create_element, Element};
pub use error::{Error, Result};
pub use material::Simp;
pub use mesh::{StructuredGrid, StructuredMesh};
pub use passive::PassiveMasks;
pub use problem::{HeatConduction, ProblemConfig};
pub use sensitivity::Evaluation;
pub use solver::{SolveReport, SolverConfig, SolverSession};
pub use sparse::CsrMatrix;
pub use types::{Dimension, Integration, Point3};
