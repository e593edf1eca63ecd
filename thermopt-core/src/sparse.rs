//! Sparse matrix operations.
//!
//! Uses CSR (Compressed Sparse Row) format. The conductivity matrix keeps one
//! sparsity pattern for the whole optimization run: [`AssemblyPattern`] is
//! built once from the element connectivity and every later assembly only
//! rewrites the stored values. The multigrid hierarchy relies on this.

use crate::error::{Error, Result};
use crate::mesh::ConnectivityView;
use nalgebra::DMatrix;
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;
use rayon::prelude::*;

/// Compressed Sparse Row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Builder for assembling a sparse matrix from triplets (COO format).
///
/// Accumulates (row, col, value) triplets and converts to CSR when complete.
pub struct TripletMatrix {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    /// Create a new triplet matrix builder.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self::with_capacity(n_rows, n_cols, 0)
    }

    /// Create with estimated capacity.
    pub fn with_capacity(n_rows: usize, n_cols: usize, nnz_estimate: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::with_capacity(nnz_estimate),
            cols: Vec::with_capacity(nnz_estimate),
            values: Vec::with_capacity(nnz_estimate),
        }
    }

    /// Add a value at (row, col). Duplicates are summed during conversion.
    ///
    /// Explicit zeros are stored too, so the pattern does not depend on values.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows, "Row index out of bounds");
        debug_assert!(col < self.n_cols, "Column index out of bounds");

        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
    }

    /// Add a dense submatrix at the specified node indices.
    pub fn add_submatrix(&mut self, indices: &[usize], submatrix: &DMatrix<f64>) {
        let n = indices.len();
        debug_assert_eq!(submatrix.nrows(), n);
        debug_assert_eq!(submatrix.ncols(), n);

        for i in 0..n {
            for j in 0..n {
                self.add(indices[i], indices[j], submatrix[(i, j)]);
            }
        }
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Convert to CSR format, summing duplicate entries.
    pub fn to_csr(self) -> Result<CsrMatrix> {
        let coo = CooMatrix::try_from_triplets(
            self.n_rows,
            self.n_cols,
            self.rows,
            self.cols,
            self.values,
        )
        .map_err(|e| Error::Assembly(format!("invalid triplet data: {}", e)))?;

        Ok(CsrMatrix::from(&coo))
    }
}

/// Fixed sparsity pattern plus the scatter map from element matrices into it.
///
/// `positions[e * nen² + a * nen + b]` is the index into the CSR value array
/// of entry (node_a, node_b) of element `e`.
#[derive(Debug, Clone)]
pub struct AssemblyPattern {
    template: CsrMatrix,
    positions: Vec<usize>,
    nodes_per_element: usize,
}

impl AssemblyPattern {
    /// Build the node-to-node pattern of a mesh.
    pub fn new(n_nodes: usize, connectivity: ConnectivityView<'_>) -> Result<Self> {
        let nen = connectivity.nodes_per_element();
        let mut triplets =
            TripletMatrix::with_capacity(n_nodes, n_nodes, connectivity.len() * nen * nen);
        for nodes in connectivity.iter() {
            for &row in nodes {
                for &col in nodes {
                    triplets.add(row, col, 0.0);
                }
            }
        }
        let template = triplets.to_csr()?;

        let mut positions = Vec::with_capacity(connectivity.len() * nen * nen);
        for nodes in connectivity.iter() {
            for &row in nodes {
                for &col in nodes {
                    positions.push(entry_position(&template, row, col)?);
                }
            }
        }

        Ok(Self {
            template,
            positions,
            nodes_per_element: nen,
        })
    }

    /// A zero-valued matrix with the fixed pattern.
    pub fn zeroed(&self) -> CsrMatrix {
        self.template.clone()
    }

    /// Number of structural non-zeros.
    pub fn nnz(&self) -> usize {
        self.template.nnz()
    }

    /// Scatter-add `scale * ke` for element `element` into `values`.
    pub fn scatter(&self, values: &mut [f64], element: usize, ke: &DMatrix<f64>, scale: f64) {
        let nen = self.nodes_per_element;
        let start = element * nen * nen;
        let positions = &self.positions[start..start + nen * nen];
        for a in 0..nen {
            for b in 0..nen {
                values[positions[a * nen + b]] += scale * ke[(a, b)];
            }
        }
    }
}

/// Index into the value array of entry (row, col).
fn entry_position(matrix: &CsrMatrix, row: usize, col: usize) -> Result<usize> {
    let offsets = matrix.row_offsets();
    let start = offsets[row];
    let end = offsets[row + 1];
    matrix.col_indices()[start..end]
        .binary_search(&col)
        .map(|k| start + k)
        .map_err(|_| Error::Assembly(format!("entry ({}, {}) is not in the pattern", row, col)))
}

/// y = A x, parallel over rows.
pub fn spmv(matrix: &CsrMatrix, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(matrix.ncols(), x.len());
    debug_assert_eq!(matrix.nrows(), y.len());

    let offsets = matrix.row_offsets();
    let cols = matrix.col_indices();
    let vals = matrix.values();

    y.par_iter_mut().enumerate().for_each(|(row, yi)| {
        let mut sum = 0.0;
        for idx in offsets[row]..offsets[row + 1] {
            sum += vals[idx] * x[cols[idx]];
        }
        *yi = sum;
    });
}

/// r = b - A x
pub fn residual(matrix: &CsrMatrix, x: &[f64], b: &[f64], r: &mut [f64]) {
    spmv(matrix, x, r);
    r.par_iter_mut().zip(b.par_iter()).for_each(|(ri, &bi)| {
        *ri = bi - *ri;
    });
}

/// Diagonal entries; missing entries are zero.
pub fn diagonal(matrix: &CsrMatrix) -> Vec<f64> {
    (0..matrix.nrows())
        .map(|row| {
            let r = matrix.row(row);
            r.col_indices()
                .binary_search(&row)
                .map(|k| r.values()[k])
                .unwrap_or(0.0)
        })
        .collect()
}

/// A ← diag(d) · A · diag(d)
pub fn scale_symmetric(matrix: &mut CsrMatrix, d: &[f64]) {
    let (offsets, cols, vals) = matrix.csr_data_mut();
    for row in 0..d.len() {
        for idx in offsets[row]..offsets[row + 1] {
            vals[idx] *= d[row] * d[cols[idx]];
        }
    }
}

/// A ← A + diag(v). Every diagonal entry must be in the pattern.
pub fn add_diagonal(matrix: &mut CsrMatrix, v: &[f64]) -> Result<()> {
    let mut positions = Vec::with_capacity(v.len());
    for row in 0..v.len() {
        positions.push(entry_position(matrix, row, row)?);
    }
    let values = matrix.values_mut();
    for (row, pos) in positions.into_iter().enumerate() {
        values[pos] += v[row];
    }
    Ok(())
}

/// Euclidean norm, parallel reduction.
pub fn norm2(x: &[f64]) -> f64 {
    x.par_iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Dot product, parallel reduction.
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.par_iter().zip(y.par_iter()).map(|(a, b)| a * b).sum()
}

/// y ← y + alpha x
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    y.par_iter_mut()
        .zip(x.par_iter())
        .for_each(|(yi, &xi)| *yi += alpha * xi);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{StructuredGrid, StructuredMesh};
    use approx::assert_relative_eq;

    #[test]
    fn test_triplet_to_csr() {
        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 1.0);
        triplet.add(1, 1, 2.0);
        triplet.add(2, 2, 3.0);
        triplet.add(0, 1, 0.5);
        triplet.add(1, 0, 0.5);

        let csr = triplet.to_csr().unwrap();
        assert_eq!(csr.nrows(), 3);
        assert_eq!(csr.ncols(), 3);
        assert_eq!(csr.nnz(), 5);
    }

    #[test]
    fn test_duplicate_summation() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 0, 2.0);
        triplet.add(0, 0, 3.0);

        let dense = DMatrix::from(&triplet.to_csr().unwrap());
        assert_relative_eq!(dense[(0, 0)], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_explicit_zeros_kept_in_pattern() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 1, 0.0);
        triplet.add(1, 1, 1.0);
        assert_eq!(triplet.to_csr().unwrap().nnz(), 2);
    }

    #[test]
    fn test_submatrix_assembly() {
        let mut triplet = TripletMatrix::new(6, 6);
        let nodes = vec![0, 1, 3, 4];
        let ke = DMatrix::from_row_slice(4, 4, &[
            1.0, 0.5, 0.1, 0.0,
            0.5, 2.0, 0.0, 0.2,
            0.1, 0.0, 1.5, 0.3,
            0.0, 0.2, 0.3, 2.5,
        ]);

        triplet.add_submatrix(&nodes, &ke);

        let dense = DMatrix::from(&triplet.to_csr().unwrap());
        assert_relative_eq!(dense[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(dense[(0, 3)], 0.1, epsilon = 1e-12);
        assert_relative_eq!(dense[(3, 4)], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_pattern_is_nine_point_stencil() {
        // 3×3 nodes: corner rows have 4 entries, edge rows 6, the centre 9
        let grid = StructuredGrid::new_2d(3, 3, 2.0, 2.0).unwrap();
        let pattern = AssemblyPattern::new(grid.n_nodes(), grid.connectivity()).unwrap();
        assert_eq!(pattern.nnz(), 4 * 4 + 4 * 6 + 9);
    }

    #[test]
    fn test_pattern_scatter_matches_triplets() {
        let grid = StructuredGrid::new_2d(4, 3, 3.0, 2.0).unwrap();
        let ke = DMatrix::from_fn(4, 4, |i, j| (i * 4 + j) as f64 + 1.0);

        let pattern = AssemblyPattern::new(grid.n_nodes(), grid.connectivity()).unwrap();
        let mut k = pattern.zeroed();
        let mut triplets = TripletMatrix::new(grid.n_nodes(), grid.n_nodes());
        for (e, nodes) in grid.connectivity().iter().enumerate() {
            pattern.scatter(k.values_mut(), e, &ke, 0.5);
            triplets.add_submatrix(nodes, &(&ke * 0.5));
        }

        let expected = DMatrix::from(&triplets.to_csr().unwrap());
        assert_relative_eq!(DMatrix::from(&k), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_spmv_and_residual() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 2.0);
        triplet.add(0, 1, 1.0);
        triplet.add(1, 0, 1.0);
        triplet.add(1, 1, 3.0);
        let a = triplet.to_csr().unwrap();

        let mut y = vec![0.0; 2];
        spmv(&a, &[1.0, 2.0], &mut y);
        assert_eq!(y, vec![4.0, 7.0]);

        let mut r = vec![0.0; 2];
        residual(&a, &[1.0, 2.0], &[5.0, 5.0], &mut r);
        assert_eq!(r, vec![1.0, -2.0]);
    }

    #[test]
    fn test_symmetric_scaling_and_diagonal() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 2.0);
        triplet.add(0, 1, -1.0);
        triplet.add(1, 0, -1.0);
        triplet.add(1, 1, 2.0);
        let mut a = triplet.to_csr().unwrap();

        scale_symmetric(&mut a, &[0.0, 1.0]);
        add_diagonal(&mut a, &[1.0, 0.0]).unwrap();

        let dense = DMatrix::from(&a);
        assert_eq!(dense, DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 2.0]));
        assert_eq!(diagonal(&a), vec![1.0, 2.0]);
    }

    #[test]
    fn test_add_diagonal_requires_pattern_entry() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 1, 1.0);
        triplet.add(1, 1, 1.0);
        let mut a = triplet.to_csr().unwrap();
        assert!(add_diagonal(&mut a, &[1.0, 1.0]).is_err());
    }

    #[test]
    fn test_vector_kernels() {
        let x = vec![3.0, 4.0];
        let mut y = vec![1.0, 1.0];
        assert_relative_eq!(norm2(&x), 5.0, epsilon = 1e-14);
        assert_relative_eq!(dot(&x, &y), 7.0, epsilon = 1e-14);
        axpy(2.0, &x, &mut y);
        assert_eq!(y, vec![7.0, 9.0]);
    }
}
