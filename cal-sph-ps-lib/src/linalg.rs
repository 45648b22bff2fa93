// SPDX-License-Identifier: MPL-2.0

//! Linear algebra shared by the reconstruction:
//! rank check of the light matrix and its least squares inverse.

use nalgebra::{DMatrix, DVector, Matrix3xX, Vector3};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix has {0} columns instead of 3")]
    NotThreeColumns(usize),
    #[error("Matrix has rank < 3 (singular values: {0:?})")]
    RankDeficient(Vec<f64>),
    #[error("SVD failed: {0}")]
    Svd(&'static str),
}

/// Singular values of `mat`, sorted in decreasing order.
pub fn sorted_singular_values(mat: &DMatrix<f64>) -> DVector<f64> {
    let mut values: Vec<f64> = mat.singular_values().iter().cloned().collect();
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    DVector::from_vec(values)
}

/// Whether the columns of an N x 3 matrix span R³,
/// i.e. its smallest singular value is not negligible
/// relative to the largest one.
pub fn has_full_column_rank(singular_values: &DVector<f64>, rel_epsilon: f64) -> bool {
    if singular_values.len() < 3 {
        return false;
    }
    let largest = singular_values[0];
    let smallest = singular_values[2];
    largest > 0.0 && smallest.is_finite() && smallest > rel_epsilon * largest
}

/// Least squares solver for the over-determined system `L g = i`,
/// with `L` a fixed N x 3 matrix of full column rank.
///
/// The SVD pseudo-inverse is computed once, then each solve is a 3 x N
/// matrix-vector product. For N = 3 this is exactly the inverse of `L`.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    pinv: Matrix3xX<f64>,
    singular_values: DVector<f64>,
}

impl LeastSquares {
    pub fn new(mat: &DMatrix<f64>, rel_epsilon: f64) -> Result<Self, LinalgError> {
        if mat.ncols() != 3 {
            return Err(LinalgError::NotThreeColumns(mat.ncols()));
        }
        let singular_values = sorted_singular_values(mat);
        if !has_full_column_rank(&singular_values, rel_epsilon) {
            return Err(LinalgError::RankDeficient(
                singular_values.iter().cloned().collect(),
            ));
        }
        let cutoff = rel_epsilon * singular_values[0];
        let pinv = mat
            .clone()
            .svd(true, true)
            .pseudo_inverse(cutoff)
            .map_err(LinalgError::Svd)?;
        Ok(LeastSquares {
            pinv: pinv.fixed_rows::<3>(0).into_owned(),
            singular_values,
        })
    }

    /// Number of equations (rows of `L`) expected by [`solve`](Self::solve).
    pub fn nb_equations(&self) -> usize {
        self.pinv.ncols()
    }

    pub fn singular_values(&self) -> &DVector<f64> {
        &self.singular_values
    }

    /// Ratio of the extreme singular values of `L`.
    pub fn condition_number(&self) -> f64 {
        self.singular_values[0] / self.singular_values[2]
    }

    /// Minimizer of `‖L g - i‖²`.
    ///
    /// `rhs` must have `nb_equations()` elements.
    /// Summation always follows the order of the equations.
    pub fn solve(&self, rhs: &[f64]) -> Vector3<f64> {
        debug_assert_eq!(rhs.len(), self.nb_equations());
        self.pinv
            .column_iter()
            .zip(rhs)
            .fold(Vector3::zeros(), |g, (col, &i)| g + col * i)
    }
}
