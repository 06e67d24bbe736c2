//! Sparse matrix kernel for circuit assembly.
//!
//! All whole-circuit matrices are built the same way: accumulate triplets
//! into a [`CooMatrix`] (duplicates sum), then finalize into a [`CscMatrix`].
//! This module collects the structural operations the rest of the crate
//! needs: zero synthesis, dense conversion for small per-element inputs,
//! block-diagonal assembly, vertical concatenation, and the canonicalization
//! pass that removes entries which summed to zero.

use nalgebra::DMatrix;
use nalgebra_sparse::{coo::CooMatrix, CscMatrix};

use crate::math::Scalar;

/// Converts a dense matrix into CSC form, skipping exact zeros.
#[must_use]
pub fn csc_from_dense(dense: &DMatrix<Scalar>) -> CscMatrix<Scalar> {
    let mut coo = CooMatrix::new(dense.nrows(), dense.ncols());
    for row in 0..dense.nrows() {
        for col in 0..dense.ncols() {
            let value = dense[(row, col)];
            if value != 0.0 {
                coo.push(row, col, value);
            }
        }
    }
    CscMatrix::from(&coo)
}

/// Converts a real CSC matrix back to dense form.
#[must_use]
pub fn csc_to_dense(csc: &CscMatrix<Scalar>) -> DMatrix<Scalar> {
    let mut dense = DMatrix::zeros(csc.nrows(), csc.ncols());
    for (row, col, &value) in csc.triplet_iter() {
        dense[(row, col)] = value;
    }
    dense
}

/// Converts an integer CSC matrix to dense form.
#[must_use]
pub fn int_to_dense(csc: &CscMatrix<i32>) -> DMatrix<i32> {
    let mut dense = DMatrix::zeros(csc.nrows(), csc.ncols());
    for (row, col, &value) in csc.triplet_iter() {
        dense[(row, col)] = value;
    }
    dense
}

/// Converts a dense integer matrix into CSC form, skipping zeros.
#[must_use]
pub fn int_from_dense(dense: &DMatrix<i32>) -> CscMatrix<i32> {
    let mut coo = CooMatrix::new(dense.nrows(), dense.ncols());
    for row in 0..dense.nrows() {
        for col in 0..dense.ncols() {
            let value = dense[(row, col)];
            if value != 0 {
                coo.push(row, col, value);
            }
        }
    }
    CscMatrix::from(&coo)
}

/// Block-diagonal assembly of CSC blocks in iteration order.
///
/// The result has `sum(rows)` rows and `sum(cols)` columns; block `k`
/// occupies the row and column ranges after all earlier blocks.
#[must_use]
pub fn block_diag<'a, I>(blocks: I) -> CscMatrix<Scalar>
where
    I: IntoIterator<Item = &'a CscMatrix<Scalar>>,
{
    let blocks: Vec<&CscMatrix<Scalar>> = blocks.into_iter().collect();
    let nrows = blocks.iter().map(|block| block.nrows()).sum();
    let ncols = blocks.iter().map(|block| block.ncols()).sum();

    let mut coo = CooMatrix::new(nrows, ncols);
    let mut row_offset = 0;
    let mut col_offset = 0;
    for block in blocks {
        for (row, col, &value) in block.triplet_iter() {
            coo.push(row_offset + row, col_offset + col, value);
        }
        row_offset += block.nrows();
        col_offset += block.ncols();
    }
    CscMatrix::from(&coo)
}

/// Vertical concatenation of CSC blocks in iteration order.
///
/// All blocks must share a column count; the column count of the result is
/// taken from the first block (zero when the iterator is empty).
#[must_use]
pub fn vstack<'a, I>(blocks: I) -> CscMatrix<Scalar>
where
    I: IntoIterator<Item = &'a CscMatrix<Scalar>>,
{
    let blocks: Vec<&CscMatrix<Scalar>> = blocks.into_iter().collect();
    let nrows = blocks.iter().map(|block| block.nrows()).sum();
    let ncols = blocks.first().map_or(0, |block| block.ncols());

    let mut coo = CooMatrix::new(nrows, ncols);
    let mut row_offset = 0;
    for block in blocks {
        for (row, col, &value) in block.triplet_iter() {
            coo.push(row_offset + row, col, value);
        }
        row_offset += block.nrows();
    }
    CscMatrix::from(&coo)
}

/// Rebuilds an integer CSC matrix keeping only nonzero entries.
///
/// COO finalization sums duplicate triplets but keeps entries whose sum is
/// zero as stored zeros. Entries that cancelled (e.g. both ends of a branch
/// merged into one net) must become structural zeros before the matrix is
/// handed to the topology reduction.
#[must_use]
pub fn prune_zeros(csc: &CscMatrix<i32>) -> CscMatrix<i32> {
    let mut coo = CooMatrix::new(csc.nrows(), csc.ncols());
    for (row, col, &value) in csc.triplet_iter() {
        if value != 0 {
            coo.push(row, col, value);
        }
    }
    CscMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::dmatrix;

    use super::*;

    #[test]
    fn block_diag_places_blocks_on_the_diagonal() {
        let a = csc_from_dense(&dmatrix![1.0, 2.0; 3.0, 4.0]);
        let b = csc_from_dense(&dmatrix![5.0]);
        let combined = block_diag([&a, &b]);

        assert_eq!(combined.nrows(), 3);
        assert_eq!(combined.ncols(), 3);
        let dense = csc_to_dense(&combined);
        assert_relative_eq!(
            dense,
            dmatrix![
                1.0, 2.0, 0.0;
                3.0, 4.0, 0.0;
                0.0, 0.0, 5.0
            ]
        );
    }

    #[test]
    fn block_diag_of_nothing_is_empty() {
        let combined = block_diag([]);
        assert_eq!(combined.nrows(), 0);
        assert_eq!(combined.ncols(), 0);
    }

    #[test]
    fn vstack_stacks_rows_in_order() {
        let a = csc_from_dense(&dmatrix![1.0; 2.0]);
        let b = csc_from_dense(&dmatrix![3.0]);
        let stacked = vstack([&a, &b]);

        assert_eq!(stacked.nrows(), 3);
        assert_eq!(stacked.ncols(), 1);
        assert_relative_eq!(csc_to_dense(&stacked), dmatrix![1.0; 2.0; 3.0]);
    }

    #[test]
    fn prune_zeros_drops_cancelled_entries() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 1);
        coo.push(0, 0, -1);
        coo.push(1, 1, 2);
        let pruned = prune_zeros(&CscMatrix::from(&coo));

        assert_eq!(pruned.nnz(), 1);
        assert_eq!(int_to_dense(&pruned)[(1, 1)], 2);
    }

    #[test]
    fn dense_round_trip_preserves_values() {
        let dense = dmatrix![0.0, -1.5; 2.5, 0.0];
        assert_relative_eq!(csc_to_dense(&csc_from_dense(&dense)), dense);
    }
}
