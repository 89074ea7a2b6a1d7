use crate::errors::FitError;
use crate::matrixkit::matrix_adapter::MatrixAdapter;
use crate::matrixkit::storage::SequenceStorage;

/// A short-lived mutable write handle over matrix contents.
///
/// Obtained from `MatrixAdapter::writer`. The handle captures the matrix
/// dimensions when it is created and holds the exclusive borrow until it is
/// dropped, so the matrix cannot be resized or destroyed while any write
/// handle is alive; release happens on every exit path, early returns
/// included.
pub struct MatrixWriter<'m, S: SequenceStorage> {
    n_rows: usize,
    n_cols: usize,
    target: &'m mut MatrixAdapter<S>,
}

impl<'m, S: SequenceStorage> MatrixWriter<'m, S> {
    pub(crate) fn new(target: &'m mut MatrixAdapter<S>) -> Self {
        Self {
            n_rows: target.rows(),
            n_cols: target.cols(),
            target,
        }
    }

    pub fn rows(&self) -> usize {
        self.n_rows
    }

    pub fn cols(&self) -> usize {
        self.n_cols
    }

    pub fn set(&mut self, row: usize, col: usize, value: S::Elem) -> Result<(), FitError> {
        if row >= self.n_rows || col >= self.n_cols {
            return Err(FitError::index_error(format!(
                "write to ({}, {}) outside a {}x{} matrix",
                row, col, self.n_rows, self.n_cols
            )));
        }
        self.target.set_flat(row * self.n_cols + col, value);
        Ok(())
    }

    /// Overwrites a whole row from a slice of exactly `cols()` values.
    pub fn fill_row(&mut self, row: usize, values: &[S::Elem]) -> Result<(), FitError> {
        if row >= self.n_rows {
            return Err(FitError::index_error(format!(
                "row {} outside a {}x{} matrix",
                row, self.n_rows, self.n_cols
            )));
        }
        if values.len() != self.n_cols {
            return Err(FitError::dimension_mismatch(format!(
                "{} values cannot fill a row of width {}",
                values.len(),
                self.n_cols
            )));
        }
        for (col, v) in values.iter().enumerate() {
            self.target.set_flat(row * self.n_cols + col, *v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::matrixkit::matrix_adapter::Matrix;

    #[test]
    fn writer_sets_elements_and_releases_on_scope_exit() {
        let mut m = Matrix::zeros(2, 3).unwrap();
        {
            let mut w = m.writer();
            w.set(0, 0, 1.0).unwrap();
            w.fill_row(1, &[4.0, 5.0, 6.0]).unwrap();
        }
        assert_eq!(m.at(0, 0).unwrap(), 1.0);
        assert_eq!(m.at(1, 2).unwrap(), 6.0);
    }

    #[test]
    fn writer_rejects_out_of_range_writes() {
        let mut m = Matrix::zeros(2, 2).unwrap();
        let mut w = m.writer();
        assert_eq!(w.set(2, 0, 1.0).unwrap_err().kind(), ErrorKind::IndexError);
        assert_eq!(
            w.fill_row(0, &[1.0, 2.0, 3.0]).unwrap_err().kind(),
            ErrorKind::DimensionMismatch
        );
        // the handle stays usable after a failed write
        w.set(1, 1, 2.0).unwrap();
        drop(w);
        assert_eq!(m.at(1, 1).unwrap(), 2.0);
    }
}
