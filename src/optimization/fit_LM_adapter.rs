use crate::errors::FitError;
use crate::matrixkit::matrix_adapter::Matrix;
use crate::optimization::fit_problem::LeastSquaresProblem;
use nalgebra::DVector;

/// What a forward model must provide to be fit through the LM bridge.
///
/// `evaluate` and `jacobian_row` must be pure in the parameters and the
/// key; validation of parameter count and domain belongs to the model and
/// is expected to surface as `InvalidArgument`.
pub trait FitModel {
    fn parameter_count(&self) -> usize;

    /// Predicted value at the given key (e.g. time lag).
    fn evaluate(&self, params: &DVector<f64>, key: f64) -> Result<f64, FitError>;

    /// Partial derivatives of the prediction with respect to each
    /// parameter, at the given key.
    fn jacobian_row(&self, params: &DVector<f64>, key: f64) -> Result<DVector<f64>, FitError>;
}

/// What a dataset must provide: indexed access to (key, observed) pairs in
/// a stable order.
pub trait FitDataSet {
    fn len(&self) -> usize;

    fn point(&self, idx: usize) -> (f64, f64);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct EvalCache {
    params: DVector<f64>,
    residuals: DVector<f64>,
    jacobian: Matrix,
}

/// Bridges a forward model and a dataset into the residual/Jacobian
/// interface the LM engine consumes.
///
/// Residual i is `observed[i] - model(params, key[i])`, and the Jacobian
/// entry (i, j) is the negated model derivative, so minimizing the sum of
/// squared residuals minimizes the model-data discrepancy.
///
/// The last-evaluated parameter point is cached together with its residual
/// and Jacobian: the solver asks for both at the same point within one
/// iteration and the model is evaluated once. The cache is invisible from
/// the outside.
#[derive(Debug)]
pub struct FitLM_Adapter<'d, M: FitModel, D: FitDataSet> {
    model: M,
    data: &'d D,
    cache: Option<EvalCache>,
    evaluations: usize,
}

impl<'d, M: FitModel, D: FitDataSet> FitLM_Adapter<'d, M, D> {
    /// Builds the bridge. An empty dataset is a precondition violation.
    pub fn new(model: M, data: &'d D) -> Result<Self, FitError> {
        if data.is_empty() {
            return Err(FitError::invalid_argument(
                "cannot fit against an empty dataset",
            ));
        }
        Ok(Self {
            model,
            data,
            cache: None,
            evaluations: 0,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn data(&self) -> &D {
        self.data
    }

    /// How many times the model was swept over the full dataset.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Sum of squared residuals at `params`.
    pub fn chi_squared(&mut self, params: &DVector<f64>) -> Result<f64, FitError> {
        let r = self.residuals_at(params)?;
        Ok(crate::Utils::math_utils::chi_squared(&r))
    }

    pub fn residuals_at(&mut self, params: &DVector<f64>) -> Result<DVector<f64>, FitError> {
        self.ensure_evaluated(params)?;
        Ok(self
            .cache
            .as_ref()
            .expect("cache was just filled")
            .residuals
            .clone())
    }

    pub fn jacobian_at(&mut self, params: &DVector<f64>) -> Result<Matrix, FitError> {
        self.ensure_evaluated(params)?;
        Ok(self
            .cache
            .as_ref()
            .expect("cache was just filled")
            .jacobian
            .clone())
    }

    fn ensure_evaluated(&mut self, params: &DVector<f64>) -> Result<(), FitError> {
        if let Some(cache) = &self.cache {
            if cache.params == *params {
                return Ok(());
            }
        }
        let n_params = self.model.parameter_count();
        if params.len() != n_params {
            return Err(FitError::size_mismatch(format!(
                "model declares {} parameters, solver supplied {}",
                n_params,
                params.len()
            )));
        }
        let n_data = self.data.len();
        let mut residuals = DVector::zeros(n_data);
        let mut jacobian = Matrix::zeros(n_data, n_params)?;
        let mut writer = jacobian.writer();
        let mut negated_row = vec![0.0; n_params];
        for i in 0..n_data {
            let (key, observed) = self.data.point(i);
            residuals[i] = observed - self.model.evaluate(params, key)?;
            let row = self.model.jacobian_row(params, key)?;
            if row.len() != n_params {
                return Err(FitError::size_mismatch(format!(
                    "jacobian row of length {} for a {}-parameter model",
                    row.len(),
                    n_params
                )));
            }
            for (dst, src) in negated_row.iter_mut().zip(row.iter()) {
                *dst = -*src;
            }
            writer.fill_row(i, &negated_row)?;
        }
        drop(writer);
        self.evaluations += 1;
        self.cache = Some(EvalCache {
            params: params.clone_owned(),
            residuals,
            jacobian,
        });
        Ok(())
    }
}

impl<'d, M: FitModel, D: FitDataSet> LeastSquaresProblem for FitLM_Adapter<'d, M, D> {
    fn parameter_count(&self) -> usize {
        self.model.parameter_count()
    }

    fn residual_count(&self) -> usize {
        self.data.len()
    }

    fn residuals(&mut self, params: &DVector<f64>) -> Result<DVector<f64>, FitError> {
        self.residuals_at(params)
    }

    fn jacobian(&mut self, params: &DVector<f64>) -> Result<Matrix, FitError> {
        self.jacobian_at(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use approx::assert_relative_eq;

    /// y = a + b * x
    #[derive(Debug)]
    struct LineModel;

    impl FitModel for LineModel {
        fn parameter_count(&self) -> usize {
            2
        }

        fn evaluate(&self, params: &DVector<f64>, key: f64) -> Result<f64, FitError> {
            Ok(params[0] + params[1] * key)
        }

        fn jacobian_row(&self, _params: &DVector<f64>, key: f64) -> Result<DVector<f64>, FitError> {
            Ok(DVector::from_vec(vec![1.0, key]))
        }
    }

    #[derive(Debug)]
    struct PairData {
        points: Vec<(f64, f64)>,
    }

    impl FitDataSet for PairData {
        fn len(&self) -> usize {
            self.points.len()
        }

        fn point(&self, idx: usize) -> (f64, f64) {
            self.points[idx]
        }
    }

    fn line_data() -> PairData {
        // y = 1 + 2x, with the middle point pulled off the line
        PairData {
            points: vec![(0.0, 1.0), (1.0, 3.5), (2.0, 5.0)],
        }
    }

    #[test]
    fn residual_length_equals_dataset_size() {
        let data = line_data();
        let mut adapter = FitLM_Adapter::new(LineModel, &data).unwrap();
        let params = DVector::from_vec(vec![0.0, 0.0]);
        let r = adapter.residuals_at(&params).unwrap();
        assert_eq!(r.len(), data.len());
    }

    #[test]
    fn residual_is_observed_minus_predicted_and_jacobian_is_negated() {
        let data = line_data();
        let mut adapter = FitLM_Adapter::new(LineModel, &data).unwrap();
        let params = DVector::from_vec(vec![1.0, 2.0]);
        let r = adapter.residuals_at(&params).unwrap();
        assert_relative_eq!(r[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(r[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(r[2], 0.0, epsilon = 1e-12);
        let j = adapter.jacobian_at(&params).unwrap();
        assert_eq!(j.rows(), 3);
        assert_eq!(j.cols(), 2);
        assert_relative_eq!(j.at(1, 0).unwrap(), -1.0, epsilon = 1e-12);
        assert_relative_eq!(j.at(2, 1).unwrap(), -2.0, epsilon = 1e-12);
    }

    #[test]
    fn same_parameter_point_is_evaluated_once() {
        let data = line_data();
        let mut adapter = FitLM_Adapter::new(LineModel, &data).unwrap();
        let params = DVector::from_vec(vec![0.5, 1.5]);
        adapter.residuals_at(&params).unwrap();
        adapter.jacobian_at(&params).unwrap();
        adapter.chi_squared(&params).unwrap();
        assert_eq!(adapter.evaluations(), 1);
        // a new point forces a fresh sweep
        let moved = DVector::from_vec(vec![0.5, 1.6]);
        adapter.residuals_at(&moved).unwrap();
        assert_eq!(adapter.evaluations(), 2);
    }

    #[test]
    fn wrong_parameter_length_is_a_size_mismatch() {
        let data = line_data();
        let mut adapter = FitLM_Adapter::new(LineModel, &data).unwrap();
        let params = DVector::from_vec(vec![1.0]);
        let err = adapter.residuals_at(&params).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
    }

    #[test]
    fn empty_dataset_is_rejected_up_front() {
        let data = PairData { points: vec![] };
        let err = FitLM_Adapter::new(LineModel, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
