use crate::errors::FitError;
use crate::matrixkit::storage::{OwnedSeq, SequenceStorage, ViewSeq};
use crate::matrixkit::writer::MatrixWriter;
use nalgebra::DMatrix;
use num_traits::{Num, Zero};

/// A dense 2-D container over a flat storage policy.
///
/// Indexing is 0-based and row-major: element (i, j) lives at
/// `i * cols + j` of the underlying sequence. The storage policy is fixed
/// for the lifetime of the adapter; moving data between policies means
/// constructing a new adapter.
///
/// All element accesses are checked against the current dimensions and all
/// algebraic operations are checked for shape compatibility.
#[derive(Debug, Clone)]
pub struct MatrixAdapter<S: SequenceStorage> {
    n_rows: usize,
    n_cols: usize,
    data: S,
}

/// The owning f64 concretization used throughout the fitting code.
pub type Matrix = MatrixAdapter<OwnedSeq<f64>>;

/// A non-owning adapter over externally owned f64 memory.
pub type MatrixView<'a> = MatrixAdapter<ViewSeq<'a, f64>>;

impl<S: SequenceStorage> MatrixAdapter<S> {
    pub fn rows(&self) -> usize {
        self.n_rows
    }

    pub fn cols(&self) -> usize {
        self.n_cols
    }

    pub fn size(&self) -> usize {
        self.n_rows * self.n_cols
    }

    #[inline]
    fn flat(&self, row: usize, col: usize) -> usize {
        row * self.n_cols + col
    }

    fn check_index(&self, row: usize, col: usize) -> Result<(), FitError> {
        if row >= self.n_rows || col >= self.n_cols {
            return Err(FitError::index_error(format!(
                "element ({}, {}) requested from a {}x{} matrix",
                row, col, self.n_rows, self.n_cols
            )));
        }
        Ok(())
    }

    pub fn at(&self, row: usize, col: usize) -> Result<S::Elem, FitError> {
        self.check_index(row, col)?;
        Ok(self.data.get(self.flat(row, col)))
    }

    pub fn set(&mut self, row: usize, col: usize, value: S::Elem) -> Result<(), FitError> {
        self.check_index(row, col)?;
        let idx = self.flat(row, col);
        self.data.set(idx, value);
        Ok(())
    }

    /// Begin a scoped mutable access over the matrix contents.
    ///
    /// The handle holds the exclusive borrow for its whole scope, so the
    /// dimensions it validated at creation stay valid until it is released.
    pub fn writer(&mut self) -> MatrixWriter<'_, S> {
        MatrixWriter::new(self)
    }

    /// The underlying flat sequence, row-major.
    pub fn as_slice(&self) -> &[S::Elem] {
        self.data.as_slice()
    }

    #[inline]
    pub(crate) fn set_flat(&mut self, idx: usize, value: S::Elem) {
        self.data.set(idx, value);
    }
}

impl<S: SequenceStorage> MatrixAdapter<S>
where
    S::Elem: Num + Copy,
{
    /// Element-wise sum. Returns an owning matrix.
    pub fn add<S2>(
        &self,
        other: &MatrixAdapter<S2>,
    ) -> Result<MatrixAdapter<OwnedSeq<S::Elem>>, FitError>
    where
        S2: SequenceStorage<Elem = S::Elem>,
    {
        if self.n_rows != other.n_rows || self.n_cols != other.n_cols {
            return Err(FitError::dimension_mismatch(format!(
                "cannot add a {}x{} matrix and a {}x{} matrix",
                self.n_rows, self.n_cols, other.n_rows, other.n_cols
            )));
        }
        let data: Vec<S::Elem> = self
            .as_slice()
            .iter()
            .zip(other.as_slice().iter())
            .map(|(a, b)| *a + *b)
            .collect();
        Ok(MatrixAdapter {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            data: OwnedSeq::from_vec(data),
        })
    }

    /// Multiplication of every element by a scalar. Returns an owning matrix.
    pub fn scale(&self, factor: S::Elem) -> MatrixAdapter<OwnedSeq<S::Elem>> {
        let data: Vec<S::Elem> = self.as_slice().iter().map(|a| *a * factor).collect();
        MatrixAdapter {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            data: OwnedSeq::from_vec(data),
        }
    }

    /// Matrix product. Requires `self.cols() == other.rows()`.
    pub fn multiply<S2>(
        &self,
        other: &MatrixAdapter<S2>,
    ) -> Result<MatrixAdapter<OwnedSeq<S::Elem>>, FitError>
    where
        S2: SequenceStorage<Elem = S::Elem>,
    {
        if self.n_cols != other.n_rows {
            return Err(FitError::dimension_mismatch(format!(
                "cannot multiply a {}x{} matrix by a {}x{} matrix",
                self.n_rows, self.n_cols, other.n_rows, other.n_cols
            )));
        }
        let mut data = vec![S::Elem::zero(); self.n_rows * other.n_cols];
        for i in 0..self.n_rows {
            for k in 0..self.n_cols {
                let a_ik = self.data.get(self.flat(i, k));
                for j in 0..other.n_cols {
                    let idx = i * other.n_cols + j;
                    data[idx] = data[idx] + a_ik * other.data.get(other.flat(k, j));
                }
            }
        }
        Ok(MatrixAdapter {
            n_rows: self.n_rows,
            n_cols: other.n_cols,
            data: OwnedSeq::from_vec(data),
        })
    }

    /// Transposed copy. Returns an owning matrix.
    pub fn transpose(&self) -> MatrixAdapter<OwnedSeq<S::Elem>> {
        let mut data = vec![S::Elem::zero(); self.size()];
        for i in 0..self.n_rows {
            for j in 0..self.n_cols {
                data[j * self.n_rows + i] = self.data.get(self.flat(i, j));
            }
        }
        MatrixAdapter {
            n_rows: self.n_cols,
            n_cols: self.n_rows,
            data: OwnedSeq::from_vec(data),
        }
    }
}

impl<T: Copy> MatrixAdapter<OwnedSeq<T>> {
    /// Creates a matrix of the given dimensions with every element set to
    /// `fill`. Zero dimensions are rejected.
    pub fn filled(n_rows: usize, n_cols: usize, fill: T) -> Result<Self, FitError> {
        if n_rows == 0 || n_cols == 0 {
            return Err(FitError::invalid_argument(format!(
                "matrix dimensions must be nonzero, got {}x{}",
                n_rows, n_cols
            )));
        }
        Ok(Self {
            n_rows,
            n_cols,
            data: OwnedSeq::filled(n_rows * n_cols, fill),
        })
    }

    /// Reshapes a flat row-major sequence into a matrix of the given
    /// dimensions.
    pub fn from_vec(n_rows: usize, n_cols: usize, data: Vec<T>) -> Result<Self, FitError> {
        if n_rows == 0 || n_cols == 0 {
            return Err(FitError::invalid_argument(format!(
                "matrix dimensions must be nonzero, got {}x{}",
                n_rows, n_cols
            )));
        }
        if data.len() != n_rows * n_cols {
            return Err(FitError::dimension_mismatch(format!(
                "{} elements cannot fill a {}x{} matrix",
                data.len(),
                n_rows,
                n_cols
            )));
        }
        Ok(Self {
            n_rows,
            n_cols,
            data: OwnedSeq::from_vec(data),
        })
    }
}

impl Matrix {
    pub fn zeros(n_rows: usize, n_cols: usize) -> Result<Self, FitError> {
        Self::filled(n_rows, n_cols, 0.0)
    }

    /// Copy into the nalgebra type the numeric kernels speak.
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.n_rows, self.n_cols, self.as_slice())
    }

    /// Copy back from a nalgebra matrix. Empty input is rejected.
    pub fn from_dmatrix(m: &DMatrix<f64>) -> Result<Self, FitError> {
        let mut data = Vec::with_capacity(m.nrows() * m.ncols());
        for i in 0..m.nrows() {
            for j in 0..m.ncols() {
                data.push(m[(i, j)]);
            }
        }
        Self::from_vec(m.nrows(), m.ncols(), data)
    }
}

impl<'a> MatrixView<'a> {
    /// Adapts externally owned memory as an `n_rows` x `n_cols` matrix.
    pub fn over(data: &'a mut [f64], n_rows: usize, n_cols: usize) -> Result<Self, FitError> {
        if n_rows == 0 || n_cols == 0 {
            return Err(FitError::invalid_argument(format!(
                "matrix dimensions must be nonzero, got {}x{}",
                n_rows, n_cols
            )));
        }
        if data.len() != n_rows * n_cols {
            return Err(FitError::dimension_mismatch(format!(
                "a slice of {} elements cannot back a {}x{} matrix",
                data.len(),
                n_rows,
                n_cols
            )));
        }
        Ok(Self {
            n_rows,
            n_cols,
            data: ViewSeq::over(data),
        })
    }
}
