//! Global conductivity assembly with SIMP scaling and Dirichlet masking.
//!
//! Setup happens once in [`Assembler::new`]: the element matrix KE (every
//! element of a uniform grid shares it), the fixed CSR pattern with its
//! scatter map, the Dirichlet mask `N` and the unmasked heat load.
//! Each design iteration then calls [`Assembler::assemble`]:
//!
//! ```text
//! K   = Σ_e (Emin + x_e^p (Emax − Emin)) · KE      (scatter into fixed pattern)
//! K  ← diag(N) · K · diag(N) + diag(1 − N)
//! RHS ← RHS ⊙ N
//! ```
//!
//! Clamped rows and columns end up as isolated unit diagonals with zero load,
//! so the solved temperature is exactly zero there.

use crate::element::create_element;
use crate::error::{Error, Result};
use crate::material::Simp;
use crate::mesh::{GridGeometry, StructuredMesh};
use crate::passive::PassiveMasks;
use crate::sparse::{add_diagonal, scale_symmetric, AssemblyPattern, CsrMatrix};
use crate::types::Integration;
use log::{debug, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Heat load used when none is given.
pub const DEFAULT_LOAD_INTENSITY: f64 = 0.001;

/// Portion of the `y = ymin` face that is held at zero temperature.
///
/// A node is clamped when it lies on the bottom face and each of its x (and,
/// in 3D, z) coordinates falls within `[lower, upper]` of the domain width.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClampPatch {
    pub lower: f64,
    pub upper: f64,
}

impl Default for ClampPatch {
    fn default() -> Self {
        Self {
            lower: 3.0 / 8.0,
            upper: 5.0 / 8.0,
        }
    }
}

impl ClampPatch {
    fn contains(&self, value: f64, min: f64, max: f64, eps: f64) -> bool {
        let width = max - min;
        value >= min + self.lower * width - eps && value <= min + self.upper * width + eps
    }
}

/// How loads and temperature constraints are set up.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LoadCase {
    /// Uniform volumetric heating, clamped patch on the bottom face.
    ///
    /// Every element spreads `load_intensity` evenly over its nodes.
    Default {
        load_intensity: f64,
        clamp: ClampPatch,
    },
    /// Loads and constraints follow the passive masks of an imported
    /// geometry: every non-void element adds `load_intensity` to each of its
    /// nodes, and all nodes of solid elements are clamped.
    Imported { load_intensity: f64 },
}

impl LoadCase {
    /// Heat load per element.
    pub fn load_intensity(&self) -> f64 {
        match *self {
            LoadCase::Default { load_intensity, .. } | LoadCase::Imported { load_intensity } => {
                load_intensity
            }
        }
    }
}

impl Default for LoadCase {
    fn default() -> Self {
        LoadCase::Default {
            load_intensity: DEFAULT_LOAD_INTENSITY,
            clamp: ClampPatch::default(),
        }
    }
}

/// Output of one assembly pass.
#[derive(Debug, Clone)]
pub struct AssembledSystem<'a> {
    /// Masked global conductivity matrix.
    pub conductivity: CsrMatrix,
    /// Masked heat load.
    pub rhs: Vec<f64>,
    /// Dirichlet mask: 1 on free nodes, 0 on clamped nodes.
    pub mask: &'a [f64],
}

/// Reusable assembler for one mesh and load case.
#[derive(Debug, Clone)]
pub struct Assembler {
    ke: DMatrix<f64>,
    pattern: AssemblyPattern,
    mask: Vec<f64>,
    load: Vec<f64>,
    geometry: GridGeometry,
    n_elements: usize,
}

impl Assembler {
    /// Set up the element matrix, sparsity pattern, Dirichlet mask and load.
    ///
    /// # Errors
    ///
    /// Mesh and element errors from the first element,
    /// [`Error::DimensionMismatch`] if `masks` does not cover every element,
    /// and [`Error::Assembly`] for a non-finite load intensity.
    pub fn new<M: StructuredMesh>(
        mesh: &M,
        load_case: &LoadCase,
        masks: &PassiveMasks,
        integration: Integration,
    ) -> Result<Self> {
        let n_elements = mesh.n_elements();
        masks.check_len(n_elements)?;
        let intensity = load_case.load_intensity();
        if !intensity.is_finite() {
            return Err(Error::Assembly(format!(
                "load intensity must be finite, got {}",
                intensity
            )));
        }

        let geometry = mesh.geometry()?;
        let coords = mesh
            .element_coords(0)
            .ok_or_else(|| Error::Mesh("mesh has no elements".into()))?;
        let ke = create_element(mesh.dimension()).conductivity(&coords, integration)?;

        let pattern = AssemblyPattern::new(mesh.n_nodes(), mesh.connectivity())?;
        let (load, mask) = boundary_conditions(mesh, &geometry, load_case, masks);

        let clamped = mask.iter().filter(|&&n| n == 0.0).count();
        if clamped == 0 {
            warn!("no nodes are clamped; the conductivity matrix is singular");
        }
        debug!(
            "assembler: {} elements, {} nodes, {} non-zeros, {} clamped nodes",
            n_elements,
            mesh.n_nodes(),
            pattern.nnz(),
            clamped
        );

        Ok(Self {
            ke,
            pattern,
            mask,
            load,
            geometry,
            n_elements,
        })
    }

    /// Shared element conductivity matrix.
    pub fn element_matrix(&self) -> &DMatrix<f64> {
        &self.ke
    }

    /// Dirichlet mask: 1 on free nodes, 0 on clamped nodes.
    pub fn dirichlet_mask(&self) -> &[f64] {
        &self.mask
    }

    /// Heat load before masking.
    pub fn load(&self) -> &[f64] {
        &self.load
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn n_nodes(&self) -> usize {
        self.mask.len()
    }

    pub fn n_elements(&self) -> usize {
        self.n_elements
    }

    /// Assemble `Σ_e E(x_e) KE` without boundary conditions.
    pub fn assemble_conductivity(&self, x_phys: &[f64], simp: &Simp) -> Result<CsrMatrix> {
        check_densities(x_phys, self.n_elements)?;

        let scales: Vec<f64> = x_phys.par_iter().map(|&x| simp.interpolate(x)).collect();

        let mut k = self.pattern.zeroed();
        let values = k.values_mut();
        for (element, &scale) in scales.iter().enumerate() {
            self.pattern.scatter(values, element, &self.ke, scale);
        }
        Ok(k)
    }

    /// Assemble the masked system for a density field.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if `x_phys` does not have one entry per
    /// element, [`Error::Assembly`] for densities outside `[0, 1]`.
    pub fn assemble(&self, x_phys: &[f64], simp: &Simp) -> Result<AssembledSystem<'_>> {
        let mut conductivity = self.assemble_conductivity(x_phys, simp)?;

        scale_symmetric(&mut conductivity, &self.mask);
        let complement: Vec<f64> = self.mask.iter().map(|n| 1.0 - n).collect();
        add_diagonal(&mut conductivity, &complement)?;

        let rhs = self
            .load
            .iter()
            .zip(&self.mask)
            .map(|(f, n)| f * n)
            .collect();

        Ok(AssembledSystem {
            conductivity,
            rhs,
            mask: &self.mask,
        })
    }
}

fn check_densities(x_phys: &[f64], n_elements: usize) -> Result<()> {
    if x_phys.len() != n_elements {
        return Err(Error::DimensionMismatch {
            what: "density field",
            expected: n_elements,
            actual: x_phys.len(),
        });
    }
    if let Some((element, x)) = x_phys
        .iter()
        .enumerate()
        .find(|(_, x)| !(0.0..=1.0).contains(*x))
    {
        return Err(Error::Assembly(format!(
            "density {} at element {} is outside [0, 1]",
            x, element
        )));
    }
    Ok(())
}

/// Heat load and Dirichlet mask for a load case.
fn boundary_conditions<M: StructuredMesh>(
    mesh: &M,
    geometry: &GridGeometry,
    load_case: &LoadCase,
    masks: &PassiveMasks,
) -> (Vec<f64>, Vec<f64>) {
    let n_nodes = mesh.n_nodes();
    let mut load = vec![0.0; n_nodes];
    let mut mask = vec![1.0; n_nodes];
    let connectivity = mesh.connectivity();

    match *load_case {
        LoadCase::Default {
            load_intensity,
            clamp,
        } => {
            let share = load_intensity / mesh.nodes_per_element() as f64;
            for nodes in connectivity.iter() {
                for &node in nodes {
                    load[node] += share;
                }
            }

            let eps = geometry.tolerance();
            let (min, max) = (geometry.min, geometry.max);
            for (node, n) in mask.iter_mut().enumerate() {
                let p = mesh.node_coords(node);
                let on_face = (p.y - min.y).abs() < eps;
                let mut in_patch = clamp.contains(p.x, min.x, max.x, eps);
                if geometry.dimension.axes() == 3 {
                    in_patch &= clamp.contains(p.z, min.z, max.z, eps);
                }
                if on_face && in_patch {
                    *n = 0.0;
                }
            }
        }
        LoadCase::Imported { load_intensity } => {
            for (element, nodes) in connectivity.iter().enumerate() {
                if !masks.is_void(element) {
                    for &node in nodes {
                        load[node] += load_intensity;
                    }
                }
                if masks.is_solid(element) {
                    for &node in nodes {
                        mask[node] = 0.0;
                    }
                }
            }
        }
    }

    (load, mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::StructuredGrid;
    use approx::assert_relative_eq;

    fn grid_2d() -> StructuredGrid {
        StructuredGrid::new_2d(9, 5, 8.0, 4.0).unwrap()
    }

    fn clamped(assembler: &Assembler) -> Vec<usize> {
        assembler
            .dirichlet_mask()
            .iter()
            .enumerate()
            .filter(|(_, &n)| n == 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_default_clamp_patch_2d() {
        let grid = grid_2d();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();
        // Bottom row, x ∈ [3, 5]
        assert_eq!(clamped(&assembler), vec![3, 4, 5]);
    }

    #[test]
    fn test_default_clamp_patch_3d() {
        let grid = StructuredGrid::new_3d(9, 3, 9, 8.0, 2.0, 8.0).unwrap();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();

        let nodes = clamped(&assembler);
        assert_eq!(nodes.len(), 9);
        for node in nodes {
            let [i, j, k] = grid.node_index(node);
            assert_eq!(j, 0);
            assert!((3..=5).contains(&i) && (3..=5).contains(&k));
        }
    }

    #[test]
    fn test_default_load_distribution() {
        let grid = grid_2d();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();
        let load = assembler.load();

        // Corner nodes touch one element, interior nodes four
        assert_relative_eq!(load[0], DEFAULT_LOAD_INTENSITY / 4.0, epsilon = 1e-15);
        assert_relative_eq!(load[10], DEFAULT_LOAD_INTENSITY, epsilon = 1e-15);
        assert_relative_eq!(
            load.iter().sum::<f64>(),
            DEFAULT_LOAD_INTENSITY * grid.n_elements() as f64,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_imported_load_case() {
        // 2×1 elements: element 0 void, element 1 solid
        let grid = StructuredGrid::new_2d(3, 2, 2.0, 1.0).unwrap();
        let masks = PassiveMasks::new(vec![true, false], vec![false, true], vec![false, false])
            .unwrap();
        let load_case = LoadCase::Imported { load_intensity: 2.0 };
        let assembler = Assembler::new(&grid, &load_case, &masks, Integration::Full).unwrap();

        // Element 1 has nodes 1, 2, 5, 4
        assert_eq!(clamped(&assembler), vec![1, 2, 4, 5]);
        assert_eq!(assembler.load(), &[0.0, 2.0, 2.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn test_dirichlet_rows_isolated_for_any_density() {
        let grid = grid_2d();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();
        let x: Vec<f64> = (0..grid.n_elements())
            .map(|e| (e % 7) as f64 / 6.0)
            .collect();

        let system = assembler.assemble(&x, &Simp::default()).unwrap();
        let k = DMatrix::from(&system.conductivity);

        for node in clamped(&assembler) {
            assert_eq!(system.rhs[node], 0.0);
            for other in 0..grid.n_nodes() {
                let expected = if other == node { 1.0 } else { 0.0 };
                assert_eq!(k[(node, other)], expected);
                assert_eq!(k[(other, node)], expected);
            }
        }
    }

    #[test]
    fn test_assembled_matrix_symmetric() {
        let grid = StructuredGrid::new_3d(3, 3, 3, 1.0, 1.0, 1.0).unwrap();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();
        let x: Vec<f64> = (0..grid.n_elements()).map(|e| 0.2 + 0.1 * e as f64).collect();

        let k = DMatrix::from(&assembler.assemble(&x, &Simp::default()).unwrap().conductivity);
        assert_relative_eq!(k.clone(), k.transpose(), epsilon = 1e-15);
    }

    #[test]
    fn test_conductivity_linear_in_uniform_density() {
        let grid = grid_2d();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();
        // Linear law, so K(x) − K(0) scales with a uniform x
        let simp = Simp::new(1e-9, 1.0, 1.0).unwrap();
        let n = grid.n_elements();
        let k = |x: f64| DMatrix::from(&assembler.assemble_conductivity(&vec![x; n], &simp).unwrap());

        let void = k(0.0);
        let full = k(1.0) - &void;
        let half = k(0.5) - &void;
        assert_relative_eq!(half, full * 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_rows_of_unmasked_matrix_sum_to_zero() {
        let grid = grid_2d();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();
        let k = assembler
            .assemble_conductivity(&vec![0.7; grid.n_elements()], &Simp::default())
            .unwrap();
        for row in k.row_iter() {
            assert_relative_eq!(row.values().iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_density_length_mismatch() {
        let grid = grid_2d();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();
        assert!(matches!(
            assembler.assemble(&[0.5; 3], &Simp::default()),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_density_out_of_range() {
        let grid = grid_2d();
        let masks = PassiveMasks::none(grid.n_elements());
        let assembler =
            Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).unwrap();
        let mut x = vec![0.5; grid.n_elements()];
        x[4] = 1.5;
        assert!(matches!(
            assembler.assemble(&x, &Simp::default()),
            Err(Error::Assembly(_))
        ));
    }

    #[test]
    fn test_mask_length_checked() {
        let grid = grid_2d();
        let masks = PassiveMasks::none(3);
        assert!(Assembler::new(&grid, &LoadCase::default(), &masks, Integration::Full).is_err());
    }

    #[test]
    fn test_non_finite_load_intensity_rejected() {
        let grid = grid_2d();
        let masks = PassiveMasks::none(grid.n_elements());
        for intensity in [f64::NAN, f64::INFINITY] {
            let default = LoadCase::Default {
                load_intensity: intensity,
                clamp: ClampPatch::default(),
            };
            let imported = LoadCase::Imported {
                load_intensity: intensity,
            };
            for case in [default, imported] {
                assert!(matches!(
                    Assembler::new(&grid, &case, &masks, Integration::Full),
                    Err(Error::Assembly(_))
                ));
            }
        }
    }
}
