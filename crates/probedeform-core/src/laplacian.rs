use std::collections::BTreeMap;

use faer::sparse::SparseColMat;

use crate::{error::DeformError, mesh::GridMesh};

/// A square sparse matrix over the mesh vertices stored row by row.
///
/// Used for the graph Laplacian of the grid and its square. Both are symmetric, so
/// rows and columns are interchangeable.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseOperator {
    // (column, value) pairs of each row, sorted by column
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseOperator {
    /// Graph Laplacian of the grid: degree on the diagonal, -1 for each 4-neighbor.
    pub fn grid_laplacian(mesh: &GridMesh) -> Self {
        let rows = (0..mesh.num_vertices())
            .map(|index| {
                let mut row = mesh
                    .neighbors(index)
                    .map(|neighbor| (neighbor, -1.0))
                    .collect::<Vec<_>>();
                let degree = row.len() as f64;
                row.push((index, degree));
                row.sort_by_key(|(col, _)| *col);
                row
            })
            .collect();
        Self { rows }
    }

    /// Number of rows (and columns).
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Number of stored entries.
    pub fn num_entries(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// The `(column, value)` entries of a row.
    pub fn row(&self, index: usize) -> &[(usize, f64)] {
        &self.rows[index]
    }

    /// The product of the operator with itself.
    pub fn squared(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut acc = BTreeMap::new();
                for &(k, a_ik) in row {
                    for &(j, a_kj) in &self.rows[k] {
                        *acc.entry(j).or_insert(0.0) += a_ik * a_kj;
                    }
                }
                acc.into_iter().filter(|(_, v)| *v != 0.0).collect()
            })
            .collect();
        Self { rows }
    }

    /// Matrix-vector product.
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|&(col, value)| value * x[col]).sum())
            .collect()
    }

    /// Assemble the sub-matrix selected by `reindex` as a faer sparse matrix.
    ///
    /// `reindex[i]` is the row/column of vertex `i` in the sub-matrix, `None` drops the
    /// vertex. `diagonal` is added to the diagonal of the kept vertices.
    pub(crate) fn to_faer(
        &self,
        reindex: &[Option<usize>],
        size: usize,
        diagonal: Option<&[f64]>,
    ) -> Result<SparseColMat<usize, f64>, DeformError> {
        let mut triplets = Vec::with_capacity(self.num_entries());
        for (i, row) in self.rows.iter().enumerate() {
            let Some(ri) = reindex[i] else {
                continue;
            };
            for &(j, value) in row {
                if let Some(rj) = reindex[j] {
                    triplets.push((ri, rj, value));
                }
            }
            if let Some(diagonal) = diagonal {
                triplets.push((ri, ri, diagonal[i]));
            }
        }

        SparseColMat::<usize, f64>::try_new_from_triplets(size, size, &triplets)
            .map_err(|e| DeformError::Solver(format!("{e:?}")))
    }
}
