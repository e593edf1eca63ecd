//! Structured grid meshes.
//!
//! The physics only sees a mesh through [`StructuredMesh`]: node and element
//! counts, a borrowed connectivity view, node coordinates, and the two
//! operations the multigrid hierarchy needs (coarsening by a factor of two
//! and the prolongation matrix between neighbouring levels).
//!
//! # Numbering
//!
//! Node `(i, j, k)` has index `i + j*nx + k*nx*ny` (x fastest). Elements are
//! enumerated the same way. Element corners run counter-clockwise in the
//! plane, then the same four corners on layer `k + 1`:
//!
//! ```text
//! (i,j) (i+1,j) (i+1,j+1) (i,j+1) | (i,j,k+1) (i+1,j,k+1) ...
//! ```

use crate::error::{Error, Result};
use crate::sparse::{CsrMatrix, TripletMatrix};
use crate::types::{Dimension, Point3};
use std::slice::ChunksExact;

/// Read-only element-to-node table borrowed from a mesh.
#[derive(Debug, Clone, Copy)]
pub struct ConnectivityView<'a> {
    nodes: &'a [usize],
    nodes_per_element: usize,
}

impl<'a> ConnectivityView<'a> {
    /// Wrap a flat table of `nodes_per_element` indices per element.
    pub fn new(nodes: &'a [usize], nodes_per_element: usize) -> Self {
        debug_assert!(nodes_per_element > 0);
        debug_assert_eq!(nodes.len() % nodes_per_element, 0);
        Self {
            nodes,
            nodes_per_element,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.nodes.len() / self.nodes_per_element
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes_per_element(&self) -> usize {
        self.nodes_per_element
    }

    /// Node indices of one element, in corner order.
    pub fn element(&self, idx: usize) -> Option<&'a [usize]> {
        let start = idx.checked_mul(self.nodes_per_element)?;
        self.nodes.get(start..start + self.nodes_per_element)
    }

    /// Iterate over elements in enumeration order.
    pub fn iter(&self) -> ChunksExact<'a, usize> {
        self.nodes.chunks_exact(self.nodes_per_element)
    }

    /// The underlying flat table.
    pub fn as_flat(&self) -> &'a [usize] {
        self.nodes
    }
}

/// Uniform grid geometry derived from a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub dimension: Dimension,
    /// Nodes per axis (1 on the unused z axis of a 2D grid).
    pub node_counts: [usize; 3],
    /// Elements per axis (1 on the unused z axis of a 2D grid).
    pub element_counts: [usize; 3],
    /// Lower corner of the bounding box.
    pub min: Point3,
    /// Upper corner of the bounding box.
    pub max: Point3,
    /// Element edge lengths `(dx, dy, dz)`; `dz = 0` in 2D.
    pub spacing: Point3,
}

impl GridGeometry {
    /// Coordinate tolerance used to pick boundary nodes: 5% of the smallest
    /// element edge.
    pub fn tolerance(&self) -> f64 {
        let axes = self.dimension.axes();
        0.05 * (0..axes)
            .map(|a| self.spacing[a])
            .fold(f64::INFINITY, f64::min)
    }

    /// Corner coordinates of an element with this spacing, anchored at
    /// the lower corner of the grid.
    pub fn reference_element(&self) -> Vec<Point3> {
        box_element(self.dimension, &self.spacing)
            .into_iter()
            .map(|p| p + self.min)
            .collect()
    }
}

/// Corner coordinates of an axis-aligned element with edge lengths `spacing`
/// anchored at the origin.
pub fn box_element(dimension: Dimension, spacing: &Point3) -> Vec<Point3> {
    let (dx, dy, dz) = (spacing.x, spacing.y, spacing.z);
    let plane = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(dx, 0.0, 0.0),
        Point3::new(dx, dy, 0.0),
        Point3::new(0.0, dy, 0.0),
    ];
    match dimension {
        Dimension::Two => plane.to_vec(),
        Dimension::Three => plane
            .iter()
            .copied()
            .chain(plane.iter().map(|p| p + Point3::new(0.0, 0.0, dz)))
            .collect(),
    }
}

/// Structured, axis-aligned mesh of Q1 elements.
pub trait StructuredMesh: Send + Sync {
    fn dimension(&self) -> Dimension;

    /// Nodes per axis; the unused z axis of a 2D grid reports 1.
    fn node_counts(&self) -> [usize; 3];

    /// Element-to-node table.
    fn connectivity(&self) -> ConnectivityView<'_>;

    /// Coordinates of a node. Panics if `node` is out of range.
    fn node_coords(&self, node: usize) -> Point3;

    /// Halve the element count along every axis.
    ///
    /// # Errors
    ///
    /// [`Error::Coarsening`] if some axis has an odd element count or fewer
    /// than two elements.
    fn coarsen(&self) -> Result<Self>
    where
        Self: Sized;

    /// Bilinear/trilinear prolongation from `coarse` to this mesh,
    /// `n_nodes × coarse.n_nodes`.
    fn interpolation(&self, coarse: &Self) -> Result<CsrMatrix>
    where
        Self: Sized;

    /// Elements per axis; the unused z axis of a 2D grid reports 1.
    fn element_counts(&self) -> [usize; 3] {
        let nodes = self.node_counts();
        let axes = self.dimension().axes();
        let mut counts = [1; 3];
        for a in 0..axes {
            counts[a] = nodes[a].saturating_sub(1);
        }
        counts
    }

    fn n_nodes(&self) -> usize {
        self.node_counts().iter().product()
    }

    fn n_elements(&self) -> usize {
        self.element_counts().iter().product()
    }

    fn nodes_per_element(&self) -> usize {
        self.dimension().nodes_per_element()
    }

    /// Coordinates of an element's nodes in corner order.
    fn element_coords(&self, element: usize) -> Option<Vec<Point3>> {
        let nodes = self.connectivity().element(element)?;
        Some(nodes.iter().map(|&n| self.node_coords(n)).collect())
    }

    /// Grid geometry. Spacing is measured on the first element and assumed
    /// uniform.
    fn geometry(&self) -> Result<GridGeometry> {
        let dimension = self.dimension();
        let first = self
            .element_coords(0)
            .ok_or_else(|| Error::Mesh("mesh has no elements".into()))?;

        let mut spacing = Point3::zeros();
        spacing.x = first[1].x - first[0].x;
        spacing.y = first[2].y - first[1].y;
        if dimension == Dimension::Three {
            spacing.z = first[4].z - first[0].z;
        }
        for a in 0..dimension.axes() {
            if !(spacing[a].is_finite() && spacing[a] > 0.0) {
                return Err(Error::Mesh(format!(
                    "element spacing along axis {} is {}, expected a positive value",
                    a, spacing[a]
                )));
            }
        }

        let mut min = self.node_coords(0);
        let mut max = min;
        for node in 1..self.n_nodes() {
            let p = self.node_coords(node);
            for a in 0..3 {
                min[a] = min[a].min(p[a]);
                max[a] = max[a].max(p[a]);
            }
        }

        Ok(GridGeometry {
            dimension,
            node_counts: self.node_counts(),
            element_counts: self.element_counts(),
            min,
            max,
            spacing,
        })
    }
}

/// Uniform structured grid on a single partition, lower corner at the origin.
#[derive(Debug, Clone)]
pub struct StructuredGrid {
    dimension: Dimension,
    node_counts: [usize; 3],
    /// Upper corner of the domain.
    extent: Point3,
    connectivity: Vec<usize>,
}

impl StructuredGrid {
    /// Create an `nx × ny` node grid covering `[0, xmax] × [0, ymax]`.
    pub fn new_2d(nx: usize, ny: usize, xmax: f64, ymax: f64) -> Result<Self> {
        Self::build(Dimension::Two, [nx, ny, 1], Point3::new(xmax, ymax, 0.0))
    }

    /// Create an `nx × ny × nz` node grid covering `[0, xmax] × [0, ymax] × [0, zmax]`.
    pub fn new_3d(
        nx: usize,
        ny: usize,
        nz: usize,
        xmax: f64,
        ymax: f64,
        zmax: f64,
    ) -> Result<Self> {
        Self::build(Dimension::Three, [nx, ny, nz], Point3::new(xmax, ymax, zmax))
    }

    fn build(dimension: Dimension, node_counts: [usize; 3], extent: Point3) -> Result<Self> {
        for a in 0..dimension.axes() {
            if node_counts[a] < 2 {
                return Err(Error::Mesh(format!(
                    "axis {} needs at least 2 nodes, got {}",
                    a, node_counts[a]
                )));
            }
            if !(extent[a].is_finite() && extent[a] > 0.0) {
                return Err(Error::Mesh(format!(
                    "axis {} extent must be positive, got {}",
                    a, extent[a]
                )));
            }
        }

        let mut grid = Self {
            dimension,
            node_counts,
            extent,
            connectivity: Vec::new(),
        };
        grid.connectivity = grid.build_connectivity();
        Ok(grid)
    }

    fn build_connectivity(&self) -> Vec<usize> {
        let [nx, ny, _] = self.node_counts;
        let [ex, ey, ez] = self.element_counts();
        let nen = self.nodes_per_element();
        let node = |i: usize, j: usize, k: usize| i + j * nx + k * nx * ny;

        let mut table = Vec::with_capacity(ex * ey * ez * nen);
        for k in 0..ez {
            for j in 0..ey {
                for i in 0..ex {
                    let plane = [
                        node(i, j, k),
                        node(i + 1, j, k),
                        node(i + 1, j + 1, k),
                        node(i, j + 1, k),
                    ];
                    table.extend_from_slice(&plane);
                    if self.dimension == Dimension::Three {
                        table.extend(plane.iter().map(|n| n + nx * ny));
                    }
                }
            }
        }
        table
    }

    /// Upper corner of the domain.
    pub fn extent(&self) -> Point3 {
        self.extent
    }

    /// Grid index `(i, j, k)` of a node.
    pub fn node_index(&self, node: usize) -> [usize; 3] {
        let [nx, ny, _] = self.node_counts;
        [node % nx, (node / nx) % ny, node / (nx * ny)]
    }

    fn spacing(&self, axis: usize) -> f64 {
        self.extent[axis] / (self.node_counts[axis] - 1) as f64
    }
}

impl StructuredMesh for StructuredGrid {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    fn node_counts(&self) -> [usize; 3] {
        self.node_counts
    }

    fn connectivity(&self) -> ConnectivityView<'_> {
        ConnectivityView::new(&self.connectivity, self.nodes_per_element())
    }

    fn node_coords(&self, node: usize) -> Point3 {
        assert!(node < self.n_nodes(), "node index {} out of range", node);
        let idx = self.node_index(node);
        let mut p = Point3::zeros();
        for a in 0..self.dimension.axes() {
            p[a] = idx[a] as f64 * self.spacing(a);
        }
        p
    }

    fn coarsen(&self) -> Result<Self> {
        let elements = self.element_counts();
        let mut coarse = self.node_counts;
        for axis in 0..self.dimension.axes() {
            if elements[axis] < 2 || elements[axis] % 2 != 0 {
                return Err(Error::Coarsening {
                    axis,
                    elements: elements[axis],
                });
            }
            coarse[axis] = elements[axis] / 2 + 1;
        }
        Self::build(self.dimension, coarse, self.extent)
    }

    fn interpolation(&self, coarse: &Self) -> Result<CsrMatrix> {
        let axes = self.dimension.axes();
        if coarse.dimension != self.dimension {
            return Err(Error::Mesh("cannot interpolate between 2D and 3D grids".into()));
        }
        for a in 0..axes {
            if (self.node_counts[a] - 1) != 2 * (coarse.node_counts[a] - 1) {
                return Err(Error::Mesh(format!(
                    "axis {}: {} fine nodes do not refine {} coarse nodes",
                    a, self.node_counts[a], coarse.node_counts[a]
                )));
            }
        }

        let [cx, cy, _] = coarse.node_counts;
        let n_fine = self.n_nodes();
        let mut triplets = TripletMatrix::with_capacity(n_fine, coarse.n_nodes(), n_fine * (1 << axes));

        for node in 0..n_fine {
            let idx = self.node_index(node);

            // Per-axis (coarse index, weight) pairs; odd fine indices sit
            // halfway between two coarse nodes.
            let mut stencils: [Vec<(usize, f64)>; 3] = Default::default();
            for a in 0..3 {
                stencils[a] = if a >= axes || idx[a] % 2 == 0 {
                    vec![(idx[a] / 2, 1.0)]
                } else {
                    vec![(idx[a] / 2, 0.5), (idx[a] / 2 + 1, 0.5)]
                };
            }

            for &(ci, wi) in &stencils[0] {
                for &(cj, wj) in &stencils[1] {
                    for &(ck, wk) in &stencils[2] {
                        triplets.add(node, ci + cj * cx + ck * cx * cy, wi * wj * wk);
                    }
                }
            }
        }

        triplets.to_csr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::spmv;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_counts_2d() {
        let grid = StructuredGrid::new_2d(5, 3, 4.0, 2.0).unwrap();
        assert_eq!(grid.node_counts(), [5, 3, 1]);
        assert_eq!(grid.element_counts(), [4, 2, 1]);
        assert_eq!(grid.n_nodes(), 15);
        assert_eq!(grid.n_elements(), 8);
        assert_eq!(grid.connectivity().len(), 8);
    }

    #[test]
    fn test_connectivity_corner_order_2d() {
        let grid = StructuredGrid::new_2d(3, 3, 2.0, 2.0).unwrap();
        let conn = grid.connectivity();
        assert_eq!(conn.element(0).unwrap(), &[0, 1, 4, 3]);
        // Second row, second column
        assert_eq!(conn.element(3).unwrap(), &[4, 5, 8, 7]);
        assert!(conn.element(4).is_none());
    }

    #[test]
    fn test_connectivity_corner_order_3d() {
        let grid = StructuredGrid::new_3d(3, 2, 2, 2.0, 1.0, 1.0).unwrap();
        assert_eq!(grid.n_elements(), 2);
        let conn = grid.connectivity();
        assert_eq!(conn.element(0).unwrap(), &[0, 1, 4, 3, 6, 7, 10, 9]);
        assert_eq!(conn.element(1).unwrap(), &[1, 2, 5, 4, 7, 8, 11, 10]);
    }

    #[test]
    fn test_node_coords() {
        let grid = StructuredGrid::new_3d(3, 3, 5, 1.0, 2.0, 4.0).unwrap();
        let p = grid.node_coords(1 + 2 * 3 + 4 * 9);
        assert_relative_eq!(p, Point3::new(0.5, 2.0, 4.0), epsilon = 1e-14);
    }

    #[test]
    fn test_geometry() {
        let grid = StructuredGrid::new_2d(5, 3, 2.0, 0.5).unwrap();
        let geo = grid.geometry().unwrap();
        assert_relative_eq!(geo.spacing, Point3::new(0.5, 0.25, 0.0), epsilon = 1e-14);
        assert_relative_eq!(geo.max, Point3::new(2.0, 0.5, 0.0), epsilon = 1e-14);
        assert_relative_eq!(geo.min, Point3::zeros(), epsilon = 1e-14);
        assert_relative_eq!(geo.tolerance(), 0.0125, epsilon = 1e-14);
        assert_eq!(geo.reference_element(), grid.element_coords(0).unwrap());
    }

    #[test]
    fn test_reference_element_3d() {
        let grid = StructuredGrid::new_3d(3, 3, 3, 1.0, 1.0, 2.0).unwrap();
        let geo = grid.geometry().unwrap();
        assert_eq!(geo.reference_element(), grid.element_coords(0).unwrap());
    }

    #[test]
    fn test_too_few_nodes() {
        assert!(StructuredGrid::new_2d(1, 4, 1.0, 1.0).is_err());
        assert!(StructuredGrid::new_2d(4, 4, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_coarsen() {
        let grid = StructuredGrid::new_2d(9, 5, 4.0, 2.0).unwrap();
        let coarse = grid.coarsen().unwrap();
        assert_eq!(coarse.node_counts(), [5, 3, 1]);
        assert_relative_eq!(coarse.extent(), grid.extent(), epsilon = 1e-14);

        let coarser = coarse.coarsen().unwrap();
        assert_eq!(coarser.node_counts(), [3, 2, 1]);
    }

    #[test]
    fn test_coarsen_odd_elements_fails() {
        let grid = StructuredGrid::new_2d(5, 4, 1.0, 1.0).unwrap();
        assert!(matches!(
            grid.coarsen(),
            Err(Error::Coarsening { axis: 1, elements: 3 })
        ));

        // A single element cannot be halved
        let grid = StructuredGrid::new_2d(3, 2, 1.0, 1.0).unwrap();
        assert!(matches!(
            grid.coarsen(),
            Err(Error::Coarsening { axis: 1, elements: 1 })
        ));
    }

    #[test]
    fn test_prolongation_rows_sum_to_one() {
        let fine = StructuredGrid::new_3d(5, 3, 3, 1.0, 1.0, 1.0).unwrap();
        let coarse = fine.coarsen().unwrap();
        let p = fine.interpolation(&coarse).unwrap();
        assert_eq!(p.nrows(), fine.n_nodes());
        assert_eq!(p.ncols(), coarse.n_nodes());

        let mut sums = vec![0.0; fine.n_nodes()];
        spmv(&p, &vec![1.0; coarse.n_nodes()], &mut sums);
        for s in sums {
            assert_relative_eq!(s, 1.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_prolongation_reproduces_linear_field() {
        let f = |p: Point3| 1.0 + 2.0 * p.x - 0.5 * p.y + 3.0 * p.z;
        for fine in [
            StructuredGrid::new_2d(9, 5, 2.0, 1.0).unwrap(),
            StructuredGrid::new_3d(5, 5, 3, 1.0, 2.0, 0.5).unwrap(),
        ] {
            let coarse = fine.coarsen().unwrap();
            let p = fine.interpolation(&coarse).unwrap();

            let uc: Vec<f64> = (0..coarse.n_nodes()).map(|n| f(coarse.node_coords(n))).collect();
            let mut uf = vec![0.0; fine.n_nodes()];
            spmv(&p, &uc, &mut uf);

            for (n, &value) in uf.iter().enumerate() {
                assert_relative_eq!(value, f(fine.node_coords(n)), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_interpolation_rejects_unrelated_grids() {
        let fine = StructuredGrid::new_2d(9, 5, 1.0, 1.0).unwrap();
        let other = StructuredGrid::new_2d(4, 3, 1.0, 1.0).unwrap();
        assert!(fine.interpolation(&other).is_err());
    }
}
