use crate::errors::FitError;
use nalgebra::DVector;

/// An ordered mapping from time lag to measured persistence.
///
/// Keys are unique and kept in ascending order, so iteration is
/// deterministic and residual i always refers to the same lag across runs.
/// The map is mutated only by insertion and is read-only during fitting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistenceMap {
    entries: Vec<(f64, f64)>,
}

impl PersistenceMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Inserts a (lag, persistence) pair, keeping the map sorted by lag.
    ///
    /// A lag already present is rejected with `DuplicateKey`; there is no
    /// silent overwrite. Non-finite lags or values are rejected with
    /// `InvalidArgument` since they would break the ordering invariant.
    pub fn insert(&mut self, lag: f64, value: f64) -> Result<(), FitError> {
        if !lag.is_finite() || !value.is_finite() {
            return Err(FitError::invalid_argument(format!(
                "persistence entries must be finite, got ({}, {})",
                lag, value
            )));
        }
        match self
            .entries
            .binary_search_by(|(k, _)| k.partial_cmp(&lag).expect("keys are finite"))
        {
            Ok(_) => Err(FitError::duplicate_key(format!(
                "lag {} already present",
                lag
            ))),
            Err(pos) => {
                self.entries.insert(pos, (lag, value));
                Ok(())
            }
        }
    }

    /// Returns the persistence stored for `lag`, or `NotFound`.
    pub fn lookup(&self, lag: f64) -> Result<f64, FitError> {
        self.entries
            .binary_search_by(|(k, _)| {
                k.partial_cmp(&lag)
                    .unwrap_or(std::cmp::Ordering::Greater)
            })
            .map(|pos| self.entries[pos].1)
            .map_err(|_| FitError::not_found(format!("no persistence stored for lag {}", lag)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates (lag, value) pairs in ascending lag order. The iterator is
    /// lazy and can be restarted by calling `iter` again.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// The i-th (lag, value) pair in ascending lag order.
    pub fn point(&self, idx: usize) -> (f64, f64) {
        self.entries[idx]
    }

    /// All lags, ascending.
    pub fn lags(&self) -> DVector<f64> {
        DVector::from_iterator(self.entries.len(), self.entries.iter().map(|(k, _)| *k))
    }

    /// All persistence values, ordered by their lag.
    pub fn values(&self) -> DVector<f64> {
        DVector::from_iterator(self.entries.len(), self.entries.iter().map(|(_, v)| *v))
    }
}
