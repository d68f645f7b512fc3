//! Minimal sparse linear algebra for the relaxation solver.
//!
//! Matrices are row-major with each row kept sorted by column. Everything here
//! is sized for the constraint systems of one placement run: tens of
//! thousands of rows with a handful of non-zeros each.

use std::collections::BTreeMap;
use thiserror::Error;

/// Factorization failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SparseError {
    /// No usable pivot in some elimination column.
    #[error("matrix is singular at elimination step {step}")]
    Singular {
        /// Elimination step at which no pivot was found.
        step: usize,
    },
}

/// A sparse matrix in row-major form.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    num_rows: usize,
    num_cols: usize,
    // Per row: (column, value), sorted by column, no duplicates.
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseMatrix {
    /// Creates an all-zero matrix.
    pub fn zeros(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            rows: vec![Vec::new(); num_rows],
        }
    }

    /// Creates the identity of order `n`.
    pub fn identity(n: usize) -> Self {
        Self {
            num_rows: n,
            num_cols: n,
            rows: (0..n).map(|i| vec![(i, 1.0)]).collect(),
        }
    }

    /// Builds a matrix from `(row, col, value)` triplets, summing duplicates
    /// and dropping exact zeros.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        triplets: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Self {
        let mut maps: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); num_rows];

        for (row, col, value) in triplets {
            debug_assert!(row < num_rows && col < num_cols);
            *maps[row].entry(col).or_insert(0.0) += value;
        }

        Self {
            num_rows,
            num_cols,
            rows: maps
                .into_iter()
                .map(|map| map.into_iter().filter(|&(_, v)| v != 0.0).collect())
                .collect(),
        }
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns.
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// The non-zero entries of row `i`, sorted by column.
    pub fn row(&self, i: usize) -> &[(usize, f64)] {
        &self.rows[i]
    }

    /// Total number of stored non-zeros.
    pub fn num_non_zeros(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// The transposed matrix.
    pub fn transpose(&self) -> Self {
        let mut maps: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); self.num_cols];

        for (i, row) in self.rows.iter().enumerate() {
            for &(j, v) in row {
                maps[j].insert(i, v);
            }
        }

        Self {
            num_rows: self.num_cols,
            num_cols: self.num_rows,
            rows: maps
                .into_iter()
                .map(|map| map.into_iter().collect())
                .collect(),
        }
    }

    /// The matrix scaled by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(|&(j, v)| (j, factor * v)).collect())
                .collect(),
        }
    }

    /// Element-wise sum. Panics on shape mismatch.
    pub fn add(&self, other: &Self) -> Self {
        assert_eq!(self.num_rows, other.num_rows);
        assert_eq!(self.num_cols, other.num_cols);

        let rows = self
            .rows
            .iter()
            .zip(&other.rows)
            .map(|(a, b)| {
                let mut map: BTreeMap<usize, f64> = a.iter().copied().collect();
                for &(j, v) in b {
                    *map.entry(j).or_insert(0.0) += v;
                }
                map.into_iter().filter(|&(_, v)| v != 0.0).collect()
            })
            .collect();

        Self {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            rows,
        }
    }

    /// Element-wise difference. Panics on shape mismatch.
    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.scale(-1.0))
    }

    /// Matrix product `self * other`. Panics on shape mismatch.
    pub fn matmul(&self, other: &Self) -> Self {
        assert_eq!(self.num_cols, other.num_rows);

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut acc: BTreeMap<usize, f64> = BTreeMap::new();
                for &(k, v) in row {
                    for &(j, w) in &other.rows[k] {
                        *acc.entry(j).or_insert(0.0) += v * w;
                    }
                }
                acc.into_iter().filter(|&(_, v)| v != 0.0).collect()
            })
            .collect();

        Self {
            num_rows: self.num_rows,
            num_cols: other.num_cols,
            rows,
        }
    }

    /// Matrix-vector product. Panics on length mismatch.
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.num_cols, v.len());

        self.rows
            .iter()
            .map(|row| row.iter().map(|&(j, a)| a * v[j]).sum())
            .collect()
    }

    /// Stacks `upper` above `lower`. Panics unless column counts match.
    pub fn vstack(upper: &Self, lower: &Self) -> Self {
        assert_eq!(upper.num_cols, lower.num_cols);

        let mut rows = upper.rows.clone();
        rows.extend(lower.rows.iter().cloned());

        Self {
            num_rows: upper.num_rows + lower.num_rows,
            num_cols: upper.num_cols,
            rows,
        }
    }

    /// Places `right` next to `left`. Panics unless row counts match.
    pub fn hstack(left: &Self, right: &Self) -> Self {
        assert_eq!(left.num_rows, right.num_rows);

        let offset = left.num_cols;
        let rows = left
            .rows
            .iter()
            .zip(&right.rows)
            .map(|(a, b)| {
                let mut row = a.clone();
                row.extend(b.iter().map(|&(j, v)| (j + offset, v)));
                row
            })
            .collect();

        Self {
            num_rows: left.num_rows,
            num_cols: left.num_cols + right.num_cols,
            rows,
        }
    }

    /// Keeps only the tridiagonal band (|row − col| ≤ 1).
    pub fn tridiagonal(&self) -> Self {
        Self {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            rows: self
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    row.iter()
                        .copied()
                        .filter(|&(j, _)| i.abs_diff(j) <= 1)
                        .collect()
                })
                .collect(),
        }
    }

    /// Inverts a diagonal matrix entry-wise, skipping zero entries.
    pub fn inverse_diagonal(&self) -> Self {
        assert_eq!(self.num_rows, self.num_cols);

        Self {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            rows: self
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .copied()
                        .filter(|&(_, v)| v != 0.0)
                        .map(|(j, v)| (j, 1.0 / v))
                        .collect()
                })
                .collect(),
        }
    }
}

/// Sparse LU factorization with partial pivoting.
///
/// Factor once, then solve against many right-hand sides; the relaxation loop
/// reuses one factorization across all its iterations.
#[derive(Clone, Debug)]
pub struct SparseLu {
    n: usize,
    // perm[k] = original row moved to elimination position k.
    perm: Vec<usize>,
    // Unit-lower-triangular multipliers per elimination position, sorted by
    // pivot column.
    lower: Vec<Vec<(usize, f64)>>,
    // Upper-triangular rows, sorted by column; entry 0 is the pivot.
    upper: Vec<Vec<(usize, f64)>>,
}

impl SparseLu {
    /// Factors a square matrix. Fails when no non-zero pivot remains in some
    /// column.
    pub fn factor(matrix: &SparseMatrix) -> Result<Self, SparseError> {
        assert_eq!(matrix.num_rows(), matrix.num_cols());
        let n = matrix.num_rows();

        let mut work: Vec<BTreeMap<usize, f64>> = (0..n)
            .map(|i| matrix.row(i).iter().copied().collect())
            .collect();
        let mut perm: Vec<usize> = (0..n).collect();
        let mut lower: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];

        for k in 0..n {
            // Partial pivoting over the remaining rows.
            let mut pivot_row = k;
            let mut pivot_abs = work[k].get(&k).map_or(0.0, |v| v.abs());
            for i in (k + 1)..n {
                let a = work[i].get(&k).map_or(0.0, |v| v.abs());
                if a > pivot_abs {
                    pivot_abs = a;
                    pivot_row = i;
                }
            }

            if pivot_abs == 0.0 {
                return Err(SparseError::Singular { step: k });
            }

            if pivot_row != k {
                work.swap(k, pivot_row);
                perm.swap(k, pivot_row);
                lower.swap(k, pivot_row);
            }

            let pivot = work[k][&k];
            let pivot_entries: Vec<(usize, f64)> =
                work[k].range(k..).map(|(&j, &v)| (j, v)).collect();

            for i in (k + 1)..n {
                let Some(&a_ik) = work[i].get(&k) else {
                    continue;
                };
                if a_ik == 0.0 {
                    work[i].remove(&k);
                    continue;
                }

                let factor = a_ik / pivot;
                lower[i].push((k, factor));
                work[i].remove(&k);
                for &(j, v) in pivot_entries.iter().skip(1) {
                    let entry = work[i].entry(j).or_insert(0.0);
                    *entry -= factor * v;
                    if *entry == 0.0 {
                        work[i].remove(&j);
                    }
                }
            }
        }

        let upper = work
            .into_iter()
            .map(|row| row.into_iter().collect())
            .collect();

        Ok(Self {
            n,
            perm,
            lower,
            upper,
        })
    }

    /// Solves `A x = b` for the factored `A`. Panics on length mismatch.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        assert_eq!(b.len(), self.n);

        // Forward substitution on the permuted right-hand side.
        let mut y: Vec<f64> = (0..self.n).map(|k| b[self.perm[k]]).collect();
        for k in 0..self.n {
            let mut value = y[k];
            for &(j, factor) in &self.lower[k] {
                value -= factor * y[j];
            }
            y[k] = value;
        }

        // Back substitution.
        let mut x = vec![0.0; self.n];
        for k in (0..self.n).rev() {
            let mut value = y[k];
            let mut pivot = 1.0;
            for &(j, v) in &self.upper[k] {
                if j == k {
                    pivot = v;
                } else {
                    value -= v * x[j];
                }
            }
            x[k] = value / pivot;
        }

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-9, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn triplets_sum_duplicates() {
        let m = SparseMatrix::from_triplets(2, 2, [(0, 0, 1.0), (0, 0, 2.0), (1, 1, -1.0)]);
        assert_eq!(m.row(0), &[(0, 3.0)]);
        assert_eq!(m.row(1), &[(1, -1.0)]);
        assert_eq!(m.num_non_zeros(), 2);
    }

    #[test]
    fn transpose_roundtrip() {
        let m = SparseMatrix::from_triplets(2, 3, [(0, 1, 2.0), (1, 0, -3.0), (1, 2, 4.0)]);
        let t = m.transpose();
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.num_cols(), 2);
        assert_eq!(t.transpose(), m);
    }

    #[test]
    fn matmul_against_dense() {
        // [[1, 2], [0, 3]] * [[4, 0], [1, 5]] = [[6, 10], [3, 15]]
        let a = SparseMatrix::from_triplets(2, 2, [(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0)]);
        let b = SparseMatrix::from_triplets(2, 2, [(0, 0, 4.0), (1, 0, 1.0), (1, 1, 5.0)]);
        let c = a.matmul(&b);
        assert_eq!(c.row(0), &[(0, 6.0), (1, 10.0)]);
        assert_eq!(c.row(1), &[(0, 3.0), (1, 15.0)]);
    }

    #[test]
    fn mul_vec_matches_matmul() {
        let a = SparseMatrix::from_triplets(2, 3, [(0, 0, 1.0), (0, 2, 2.0), (1, 1, -1.0)]);
        assert_vec_close(&a.mul_vec(&[1.0, 2.0, 3.0]), &[7.0, -2.0]);
    }

    #[test]
    fn stacking_shapes_and_offsets() {
        let a = SparseMatrix::identity(2);
        let b = SparseMatrix::zeros(2, 2);
        let h = SparseMatrix::hstack(&a, &b);
        assert_eq!(h.num_rows(), 2);
        assert_eq!(h.num_cols(), 4);
        assert_eq!(h.row(1), &[(1, 1.0)]);

        let v = SparseMatrix::vstack(&a, &a);
        assert_eq!(v.num_rows(), 4);
        assert_eq!(v.row(3), &[(1, 1.0)]);
    }

    #[test]
    fn tridiagonal_band() {
        let m = SparseMatrix::from_triplets(
            3,
            3,
            [(0, 0, 1.0), (0, 2, 9.0), (1, 0, 2.0), (2, 1, 3.0), (2, 2, 4.0)],
        );
        let t = m.tridiagonal();
        assert_eq!(t.row(0), &[(0, 1.0)]);
        assert_eq!(t.row(1), &[(0, 2.0)]);
        assert_eq!(t.row(2), &[(1, 3.0), (2, 4.0)]);
    }

    #[test]
    fn inverse_diagonal_skips_zeros() {
        let d = SparseMatrix::from_triplets(3, 3, [(0, 0, 2.0), (2, 2, 4.0)]);
        let inv = d.inverse_diagonal();
        assert_eq!(inv.row(0), &[(0, 0.5)]);
        assert_eq!(inv.row(1), &[] as &[(usize, f64)]);
        assert_eq!(inv.row(2), &[(2, 0.25)]);
    }

    #[test]
    fn lu_solves_dense_system() {
        // [[2, 1], [1, 3]] x = [3, 5] -> x = [0.8, 1.4]
        let a = SparseMatrix::from_triplets(2, 2, [(0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)]);
        let lu = SparseLu::factor(&a).unwrap();
        assert_vec_close(&lu.solve(&[3.0, 5.0]), &[0.8, 1.4]);
    }

    #[test]
    fn lu_pivots_around_zero_diagonal() {
        // Leading zero forces a row swap.
        let a = SparseMatrix::from_triplets(2, 2, [(0, 1, 1.0), (1, 0, 2.0), (1, 1, 1.0)]);
        let lu = SparseLu::factor(&a).unwrap();
        // A x = [1, 4] -> x = [1.5, 1.0]
        assert_vec_close(&lu.solve(&[1.0, 4.0]), &[1.5, 1.0]);
    }

    #[test]
    fn lu_reports_singularity() {
        let a = SparseMatrix::from_triplets(2, 2, [(0, 0, 1.0), (1, 0, 2.0)]);
        let err = SparseLu::factor(&a).unwrap_err();
        assert_eq!(err, SparseError::Singular { step: 1 });
    }

    #[test]
    fn lu_solves_larger_sparse_system() {
        // Tridiagonal 5x5 with known solution: A = tridiag(-1, 4, -1).
        let n = 5;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 4.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
                triplets.push((i - 1, i, -1.0));
            }
        }
        let a = SparseMatrix::from_triplets(n, n, triplets);
        let lu = SparseLu::factor(&a).unwrap();
        let x_expected = vec![1.0, -2.0, 0.5, 3.0, -1.0];
        let b = a.mul_vec(&x_expected);
        assert_vec_close(&lu.solve(&b), &x_expected);
    }
}
