use crate::errors::FitError;
use crate::matrixkit::matrix_adapter::Matrix;
use nalgebra::DVector;

/// A least-squares minimization problem.
///
/// This is what the Levenberg-Marquardt engine needs: a residual vector and
/// the Jacobian of that residual vector with respect to the parameters.
/// Implementations may cache between the two calls; the engine always asks
/// for both at the same parameter point within one iteration.
pub trait LeastSquaresProblem {
    /// Number of tunable parameters.
    fn parameter_count(&self) -> usize;

    /// Number of residual entries, fixed for the lifetime of the problem.
    fn residual_count(&self) -> usize;

    /// The residual vector at `params`.
    fn residuals(&mut self, params: &DVector<f64>) -> Result<DVector<f64>, FitError>;

    /// The Jacobian `d residual[i] / d params[j]` at `params`.
    fn jacobian(&mut self, params: &DVector<f64>) -> Result<Matrix, FitError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::fit_LM::{FitLM, FitLmConfig};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    /// Simple overdetermined problem: minimize ||Ax - b||^2
    /// where A = [[1, 2], [3, 4], [5, 6]] and b = [1, 2, 3]
    struct QuadraticProblem {
        a: DMatrix<f64>,
        b: DVector<f64>,
    }

    impl QuadraticProblem {
        fn new() -> Self {
            Self {
                a: DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
                b: DVector::from_vec(vec![1.0, 2.0, 3.0]),
            }
        }
    }

    impl LeastSquaresProblem for QuadraticProblem {
        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            3
        }

        fn residuals(&mut self, params: &DVector<f64>) -> Result<DVector<f64>, FitError> {
            Ok(&self.a * params - &self.b)
        }

        fn jacobian(&mut self, _params: &DVector<f64>) -> Result<Matrix, FitError> {
            Matrix::from_dmatrix(&self.a)
        }
    }

    /// Exponential fitting problem: fit y = a * exp(b * x) to data points
    struct ExponentialFitProblem {
        x_data: DVector<f64>,
        y_data: DVector<f64>,
    }

    impl ExponentialFitProblem {
        fn new() -> Self {
            // synthetic data near y = 2 * exp(0.5 * x)
            Self {
                x_data: DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0]),
                y_data: DVector::from_vec(vec![2.1, 3.2, 5.8, 9.1, 14.8]),
            }
        }
    }

    impl LeastSquaresProblem for ExponentialFitProblem {
        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x_data.len()
        }

        fn residuals(&mut self, params: &DVector<f64>) -> Result<DVector<f64>, FitError> {
            let a = params[0];
            let b = params[1];
            let mut residuals = DVector::zeros(self.x_data.len());
            for i in 0..self.x_data.len() {
                let x = self.x_data[i];
                residuals[i] = a * (b * x).exp() - self.y_data[i];
            }
            Ok(residuals)
        }

        fn jacobian(&mut self, params: &DVector<f64>) -> Result<Matrix, FitError> {
            let a = params[0];
            let b = params[1];
            let mut jacobian = Matrix::zeros(self.x_data.len(), 2)?;
            let mut w = jacobian.writer();
            for i in 0..self.x_data.len() {
                let x = self.x_data[i];
                let exp_bx = (b * x).exp();
                w.set(i, 0, exp_bx)?; // d/da
                w.set(i, 1, a * x * exp_bx)?; // d/db
            }
            drop(w);
            Ok(jacobian)
        }
    }

    #[test]
    fn test_quadratic_problem() {
        let mut problem = QuadraticProblem::new();
        let initial = DVector::from_vec(vec![0.0, 0.0]);
        let result = FitLM::new().minimize(&mut problem, &initial).unwrap();

        println!("Quadratic Problem:");
        println!("Status: {:?}", result.status);
        println!("Iterations: {}", result.iterations);
        println!("Final chi2: {}", result.chi_squared);
        println!("Final params: {:?}", result.parameters);

        assert!(result.status.was_successful());
        // the normal equations give exactly [0, 0.5]
        assert_relative_eq!(result.parameters[0], 0.0, epsilon = 1e-8);
        assert_relative_eq!(result.parameters[1], 0.5, epsilon = 1e-8);
    }

    #[test]
    fn test_exponential_fit_problem() {
        let mut problem = ExponentialFitProblem::new();
        let initial = DVector::from_vec(vec![1.0, 1.0]);
        let config = FitLmConfig::default().with_max_iterations(200);
        let result = FitLM::with_config(config)
            .minimize(&mut problem, &initial)
            .unwrap();

        println!("Exponential Fit Problem:");
        println!("Status: {:?}", result.status);
        println!("Final params: {:?}", result.parameters);

        assert!(result.status.was_successful());
        // should recover approximately a=2, b=0.5
        assert!((result.parameters[0] - 2.0).abs() < 0.5);
        assert!((result.parameters[1] - 0.5).abs() < 0.5);
    }
}
