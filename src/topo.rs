//! Kirchhoff topology reduction: tie and cutset matrices from incidence.
//!
//! Given the signed net/branch incidence matrix of a circuit, [`topomat`]
//! derives a row-echelon basis `ti` of the cutset space (Kirchhoff current
//! law) and a complementary basis `tv` of the tie/mesh space (Kirchhoff
//! voltage law) with `tv · tiᵀ = 0` by construction. Branches that receive a
//! pivot during elimination form the spanning tree; the remaining link
//! branches each close exactly one mesh.
//!
//! The elimination works over GF(±1): the contract requires every incidence
//! entry to be `-1`, `0`, or `+1` and every column to contain one `+1` and
//! one `-1` (each branch joins exactly two nets). Violations indicate a
//! malformed circuit and are reported as errors.
//!
//! # References
//!
//! - Seshu & Reed (1961). "Linear Graphs and Electrical Networks".
//!   Addison-Wesley. (Tree/link decomposition, cut-set and tie-set matrices.)
//! - Yeh, Abel & Smith (2010). "Automated Physical Modeling of Nonlinear
//!   Audio Circuits for Real-Time Audio Effects". IEEE TASLP 18(4), 728-737.
//! - Holters & Zölzer (2015). "A Generalized Method for the Derivation of
//!   Non-Linear State-Space Models from Circuit Schematics". EUSIPCO 2015.

use nalgebra::DMatrix;
use nalgebra_sparse::CscMatrix;

use crate::errors::{DkCircuitError, Result};
use crate::sparse;

/// Derives the tie matrix `tv` and cutset matrix `ti` from a signed
/// incidence matrix (rows = nets, columns = branches).
///
/// `ti` has one row per tree branch and full row rank; `tv` has one row per
/// link branch; `rows(tv) + rows(ti) = ncols(incidence)`.
///
/// # Errors
///
/// - [`DkCircuitError::IncidenceEntry`] for an entry outside {-1, 0, +1};
/// - [`DkCircuitError::BranchFanout`] when a branch column touches more than
///   two uneliminated nets;
/// - [`DkCircuitError::BranchPolarity`] when the two entries of a branch do
///   not cancel.
pub fn topomat(incidence: &CscMatrix<i32>) -> Result<(CscMatrix<i32>, CscMatrix<i32>)> {
    for (net, branch, &value) in incidence.triplet_iter() {
        if value != 0 && value.abs() != 1 {
            return Err(DkCircuitError::IncidenceEntry { net, branch, value });
        }
    }

    let mut a = sparse::int_to_dense(incidence);
    let nrows = a.nrows();
    let ncols = a.ncols();
    let mut tree = vec![false; ncols];
    let mut row = 0;

    for col in 0..ncols {
        let candidates: Vec<usize> = (row..nrows).filter(|&r| a[(r, col)] != 0).collect();
        if candidates.is_empty() {
            continue;
        }
        if candidates.len() > 2 {
            return Err(DkCircuitError::BranchFanout {
                branch: col,
                nets: candidates.len(),
            });
        }
        tree[col] = true;

        if candidates[0] != row {
            a.swap_rows(candidates[0], row);
        }
        // Eliminate the branch's other end, which must cancel the pivot.
        if let Some(&other) = candidates.get(1) {
            if a[(row, col)] + a[(other, col)] != 0 {
                return Err(DkCircuitError::BranchPolarity { branch: col });
            }
            add_scaled_row(&mut a, row, other, 1);
        }
        if a[(row, col)] < 0 {
            negate_row(&mut a, row);
        }
        // Clear the pivot column in the already-reduced rows above.
        for reduced in 0..row {
            let factor = a[(reduced, col)];
            if factor != 0 {
                add_scaled_row(&mut a, row, reduced, -factor);
            }
        }
        row += 1;
    }

    let rank = row;
    let ti = a.rows(0, rank).into_owned();
    let tree_cols: Vec<usize> = (0..ncols).filter(|&col| tree[col]).collect();
    let link_cols: Vec<usize> = (0..ncols).filter(|&col| !tree[col]).collect();
    debug_assert_eq!(tree_cols.len(), rank);

    // tv carries the identity on link columns and -dlᵀ on tree columns,
    // where dl is the link-column block of ti.
    let mut tv = DMatrix::zeros(link_cols.len(), ncols);
    for (link, &link_col) in link_cols.iter().enumerate() {
        tv[(link, link_col)] = 1;
        for (pivot, &tree_col) in tree_cols.iter().enumerate() {
            tv[(link, tree_col)] = -ti[(pivot, link_col)];
        }
    }

    Ok((sparse::int_from_dense(&tv), sparse::int_from_dense(&ti)))
}

fn add_scaled_row(a: &mut DMatrix<i32>, src: usize, dst: usize, factor: i32) {
    for col in 0..a.ncols() {
        a[(dst, col)] += factor * a[(src, col)];
    }
}

fn negate_row(a: &mut DMatrix<i32>, row: usize) {
    for col in 0..a.ncols() {
        a[(row, col)] = -a[(row, col)];
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::dmatrix;

    use super::*;
    use crate::sparse::{int_from_dense, int_to_dense};

    fn reduce(incidence: DMatrix<i32>) -> (DMatrix<i32>, DMatrix<i32>) {
        let (tv, ti) = topomat(&int_from_dense(&incidence)).unwrap();
        (int_to_dense(&tv), int_to_dense(&ti))
    }

    #[test]
    fn parallel_branches_yield_one_cutset_row() {
        let (tv, ti) = reduce(dmatrix![1, 1; -1, -1]);
        assert_eq!(ti, dmatrix![1, 1]);
        assert_eq!(tv, dmatrix![-1, 1]);
    }

    #[test]
    fn tv_rows_annihilate_ti_rows() {
        // Bridge-like net: 5 branches over 4 nets.
        let incidence = dmatrix![
             1,  0,  1,  0,  0;
            -1,  1,  0,  1,  0;
             0, -1,  0,  0,  1;
             0,  0, -1, -1, -1
        ];
        let (tv, ti) = reduce(incidence);

        assert_eq!(tv.nrows() + ti.nrows(), 5);
        let product = &tv * ti.transpose();
        assert!(product.iter().all(|&entry| entry == 0));
    }

    #[test]
    fn ti_is_in_reduced_echelon_form() {
        let incidence = dmatrix![
             1,  0,  1,  0,  0;
            -1,  1,  0,  1,  0;
             0, -1,  0,  0,  1;
             0,  0, -1, -1, -1
        ];
        let (_, ti) = reduce(incidence);

        // Each pivot column holds a single +1.
        let mut pivot_col = 0;
        for pivot in 0..ti.nrows() {
            while ti[(pivot, pivot_col)] == 0 {
                pivot_col += 1;
            }
            assert_eq!(ti[(pivot, pivot_col)], 1);
            for other in 0..ti.nrows() {
                if other != pivot {
                    assert_eq!(ti[(other, pivot_col)], 0);
                }
            }
        }
    }

    #[test]
    fn zero_rows_from_empty_nets_are_dropped() {
        let (tv, ti) = reduce(dmatrix![1, 1; -1, -1; 0, 0]);
        assert_eq!(ti.nrows(), 1);
        assert_eq!(tv.nrows(), 1);
    }

    #[test]
    fn three_entry_column_is_rejected() {
        let incidence = int_from_dense(&dmatrix![1; 1; -1]);
        assert!(matches!(
            topomat(&incidence),
            Err(DkCircuitError::BranchFanout { branch: 0, nets: 3 })
        ));
    }

    #[test]
    fn non_cancelling_column_is_rejected() {
        let incidence = int_from_dense(&dmatrix![1, 1; 1, -1]);
        assert!(matches!(
            topomat(&incidence),
            Err(DkCircuitError::BranchPolarity { branch: 0 })
        ));
    }

    #[test]
    fn out_of_range_entry_is_rejected() {
        let incidence = int_from_dense(&dmatrix![2, 0; -2, 0]);
        assert!(matches!(
            topomat(&incidence),
            Err(DkCircuitError::IncidenceEntry { value: 2, .. } | DkCircuitError::IncidenceEntry { value: -2, .. })
        ));
    }

    #[test]
    fn empty_incidence_produces_empty_bases() {
        let (tv, ti) = topomat(&int_from_dense(&DMatrix::zeros(0, 0))).unwrap();
        assert_eq!(tv.nrows(), 0);
        assert_eq!(ti.nrows(), 0);
    }
}
