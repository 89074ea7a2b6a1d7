use crate::errors::FitError;
use crate::matrixkit::matrix_adapter::Matrix;
use nalgebra::DVector;

/// Inverts a square matrix, for the covariance step of the LM fitter.
///
/// A non-square input is a `DimensionMismatch`; a numerically singular one
/// is reported as `SingularMatrix` and left to the caller to degrade
/// gracefully.
pub fn invert_square(m: &Matrix) -> Result<Matrix, FitError> {
    if m.rows() != m.cols() {
        return Err(FitError::dimension_mismatch(format!(
            "cannot invert a {}x{} matrix",
            m.rows(),
            m.cols()
        )));
    }
    let inverse = m
        .to_dmatrix()
        .try_inverse()
        .ok_or_else(|| FitError::singular_matrix(format!("{}x{} matrix", m.rows(), m.cols())))?;
    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(FitError::singular_matrix(format!(
            "{0}x{0} matrix inverted to non-finite entries",
            m.rows()
        )));
    }
    Matrix::from_dmatrix(&inverse)
}

/// Solves the square linear system `a * x = b` by LU decomposition.
///
/// Used every LM iteration for the damped normal equations.
pub fn solve_square(a: &Matrix, b: &DVector<f64>) -> Result<DVector<f64>, FitError> {
    if a.rows() != a.cols() {
        return Err(FitError::dimension_mismatch(format!(
            "cannot solve a {}x{} system",
            a.rows(),
            a.cols()
        )));
    }
    if b.len() != a.rows() {
        return Err(FitError::dimension_mismatch(format!(
            "right-hand side of length {} does not match a {}x{} system",
            b.len(),
            a.rows(),
            a.cols()
        )));
    }
    let solution = a
        .to_dmatrix()
        .lu()
        .solve(b)
        .ok_or_else(|| FitError::singular_matrix(format!("{0}x{0} system", a.rows())))?;
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(FitError::singular_matrix(format!(
            "{0}x{0} system solved to non-finite entries",
            a.rows()
        )));
    }
    Ok(solution)
}
