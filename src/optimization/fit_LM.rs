use crate::Utils::math_utils::chi_squared;
use crate::errors::{ErrorKind, FitError};
use crate::kernels::inverters::{invert_square, solve_square};
use crate::matrixkit::matrix_adapter::Matrix;
use crate::optimization::fit_problem::LeastSquaresProblem;
use log::{debug, info, warn};
use nalgebra::DVector;

// The damping factor is never shrunk below this.
const LAMBDA_MIN: f64 = 1.0e-12;

/// Configuration of the Levenberg-Marquardt engine.
///
/// The defaults for the damping schedule follow H.P. Gavin's recipe:
/// start at lambda = 1e-2, grow by 11 on a rejected step, shrink by 9 on an
/// accepted one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitLmConfig {
    /// Convergence tolerance: relative decrease in chi^2 between accepted
    /// steps below which the fit is declared converged.
    pub chi2_tolerance: f64,
    /// Supplementary convergence criterion on the infinity norm of the
    /// chi^2 gradient, so that a fit sitting exactly on the optimum
    /// terminates instead of rejecting steps forever.
    pub grad_tolerance: f64,
    /// Initial damping factor.
    pub lambda0: f64,
    /// Growth factor applied to lambda on a rejected step.
    pub lambda_up: f64,
    /// Shrink factor applied to lambda on an accepted step.
    pub lambda_down: f64,
    /// Ceiling for lambda; exceeding it without an accepted step means the
    /// fit diverged.
    pub lambda_max: f64,
    /// Maximum number of accepted-step iterations.
    pub max_iterations: usize,
}

impl Default for FitLmConfig {
    fn default() -> Self {
        Self {
            chi2_tolerance: 1.0e-8,
            grad_tolerance: 1.0e-10,
            lambda0: 1.0e-2,
            lambda_up: 11.0,
            lambda_down: 9.0,
            lambda_max: 1.0e7,
            max_iterations: 100,
        }
    }
}

impl FitLmConfig {
    #[must_use]
    pub fn with_chi2_tolerance(self, chi2_tolerance: f64) -> Self {
        Self {
            chi2_tolerance,
            ..self
        }
    }

    #[must_use]
    pub fn with_grad_tolerance(self, grad_tolerance: f64) -> Self {
        Self {
            grad_tolerance,
            ..self
        }
    }

    #[must_use]
    pub fn with_lambda0(self, lambda0: f64) -> Self {
        Self { lambda0, ..self }
    }

    #[must_use]
    pub fn with_lambda_factors(self, lambda_up: f64, lambda_down: f64) -> Self {
        Self {
            lambda_up,
            lambda_down,
            ..self
        }
    }

    #[must_use]
    pub fn with_lambda_max(self, lambda_max: f64) -> Self {
        Self { lambda_max, ..self }
    }

    #[must_use]
    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if !(self.chi2_tolerance > 0.0) || !self.chi2_tolerance.is_finite() {
            return Err(FitError::invalid_argument(format!(
                "chi2_tolerance must be positive, got {}",
                self.chi2_tolerance
            )));
        }
        if self.grad_tolerance < 0.0 || !self.grad_tolerance.is_finite() {
            return Err(FitError::invalid_argument(format!(
                "grad_tolerance must be non-negative, got {}",
                self.grad_tolerance
            )));
        }
        if !(self.lambda0 > 0.0) || !self.lambda0.is_finite() {
            return Err(FitError::invalid_argument(format!(
                "lambda0 must be positive, got {}",
                self.lambda0
            )));
        }
        if !(self.lambda_up > 1.0) || !(self.lambda_down > 1.0) {
            return Err(FitError::invalid_argument(format!(
                "lambda factors must exceed 1, got up {} / down {}",
                self.lambda_up, self.lambda_down
            )));
        }
        if !(self.lambda_max > self.lambda0) {
            return Err(FitError::invalid_argument(format!(
                "lambda_max {} must exceed lambda0 {}",
                self.lambda_max, self.lambda0
            )));
        }
        if self.max_iterations == 0 {
            return Err(FitError::invalid_argument("max_iterations must be positive"));
        }
        Ok(())
    }
}

/// Terminal state of a fit.
///
/// Non-convergence is an expected, recoverable outcome: the caller still
/// receives the best parameters found, with the status as the failure flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// The relative decrease in chi^2 between accepted steps fell below the
    /// configured tolerance (or the gradient vanished).
    Converged,
    /// The damping factor exceeded its ceiling without an accepted step.
    Diverged,
    /// The iteration budget ran out before convergence.
    MaxIterationsReached,
}

impl FitStatus {
    pub fn was_successful(&self) -> bool {
        matches!(self, FitStatus::Converged)
    }
}

/// Outcome of a Levenberg-Marquardt run. Immutable after creation.
#[derive(Debug)]
pub struct FitResult {
    /// Best parameters found.
    pub parameters: DVector<f64>,
    /// Parameter covariance estimate (chi^2/dof) * (J^T J)^-1, or `None`
    /// when the curvature matrix was singular.
    pub covariance: Option<Matrix>,
    /// Sum of squared residuals at the returned parameters.
    pub chi_squared: f64,
    /// Accepted-step iterations performed.
    pub iterations: usize,
    pub status: FitStatus,
}

/// The Levenberg-Marquardt engine.
///
/// A fit in progress owns cached state, so the engine is a unique resource:
/// it is deliberately not `Clone`. Run independent fits from independently
/// constructed instances.
#[derive(Debug)]
pub struct FitLM {
    config: FitLmConfig,
}

impl Default for FitLM {
    fn default() -> Self {
        Self::new()
    }
}

impl FitLM {
    pub fn new() -> Self {
        Self {
            config: FitLmConfig::default(),
        }
    }

    pub fn with_config(config: FitLmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitLmConfig {
        &self.config
    }

    /// Runs the fit from the given initial parameters.
    ///
    /// Structural problems (bad configuration, too little data, shape
    /// conflicts) surface as errors before or during iteration; failure to
    /// converge does not, it is reported through `FitResult::status`.
    pub fn minimize<P: LeastSquaresProblem>(
        &self,
        problem: &mut P,
        initial: &DVector<f64>,
    ) -> Result<FitResult, FitError> {
        self.config.validate()?;
        let n_params = problem.parameter_count();
        let n_data = problem.residual_count();
        if initial.len() != n_params {
            return Err(FitError::size_mismatch(format!(
                "problem declares {} parameters, initial guess has {}",
                n_params,
                initial.len()
            )));
        }
        if n_data < n_params + 1 {
            return Err(FitError::invalid_argument(format!(
                "{} data points leave no degrees of freedom for {} parameters",
                n_data, n_params
            )));
        }
        let dof = (n_data - n_params) as f64;

        let mut params = initial.clone_owned();
        let mut residuals = problem.residuals(&params)?;
        if residuals.len() != n_data {
            return Err(FitError::size_mismatch(format!(
                "problem declared {} residuals but produced {}",
                n_data,
                residuals.len()
            )));
        }
        let mut jacobian = problem.jacobian(&params)?;
        let mut chi2 = chi_squared(&residuals);
        let mut lambda = self.config.lambda0;
        let mut iterations = 0usize;

        let status = 'fit: loop {
            // gradient and curvature at the current point
            let jt = jacobian.transpose();
            let r_mat = Matrix::from_vec(n_data, 1, residuals.iter().copied().collect())?;
            let jtr = jt.multiply(&r_mat)?;
            let jtr_vec = DVector::from_column_slice(jtr.as_slice());
            if jtr_vec.amax() <= self.config.grad_tolerance {
                break 'fit FitStatus::Converged;
            }
            let jtj = jt.multiply(&jacobian)?;

            if iterations >= self.config.max_iterations {
                break 'fit FitStatus::MaxIterationsReached;
            }
            iterations += 1;

            // propose steps at growing damping until one is accepted
            loop {
                let mut damped = jtj.clone();
                {
                    let mut writer = damped.writer();
                    for i in 0..n_params {
                        let d = jtj.at(i, i)?;
                        writer.set(i, i, d + lambda * d)?;
                    }
                }
                // a singular damped system is treated like a rejected step
                let step = match solve_square(&damped, &jtr_vec) {
                    Ok(step) => Some(step),
                    Err(e) if e.kind() == ErrorKind::SingularMatrix => None,
                    Err(e) => return Err(e),
                };

                let accepted = match step {
                    Some(step) => {
                        let trial = &params - &step;
                        // a trial outside the model's domain is a rejected
                        // step, not a failed fit
                        match problem.residuals(&trial) {
                            Ok(trial_residuals) => {
                                let trial_chi2 = chi_squared(&trial_residuals);
                                if trial_chi2.is_finite() && trial_chi2 < chi2 {
                                    Some((trial, trial_residuals, trial_chi2))
                                } else {
                                    None
                                }
                            }
                            Err(e) if e.kind() == ErrorKind::InvalidArgument => None,
                            Err(e) => return Err(e),
                        }
                    }
                    None => None,
                };

                match accepted {
                    Some((trial, trial_residuals, trial_chi2)) => {
                        let relative_decrease = (chi2 - trial_chi2) / chi2.max(f64::MIN_POSITIVE);
                        params = trial;
                        residuals = trial_residuals;
                        chi2 = trial_chi2;
                        jacobian = problem.jacobian(&params)?;
                        lambda = (lambda / self.config.lambda_down).max(LAMBDA_MIN);
                        debug!(
                            "iter {:3}: chi2 = {:10.3e}, lambda = {:8.1e}",
                            iterations, chi2, lambda
                        );
                        if relative_decrease < self.config.chi2_tolerance {
                            break 'fit FitStatus::Converged;
                        }
                        break;
                    }
                    None => {
                        lambda *= self.config.lambda_up;
                        if lambda > self.config.lambda_max {
                            break 'fit FitStatus::Diverged;
                        }
                    }
                }
            }
        };

        info!(
            "LM fit finished: {:?}, chi2 = {:.3e}, {} iterations",
            status, chi2, iterations
        );

        // covariance estimate at the returned parameters; a singular
        // curvature matrix degrades the result instead of discarding it
        let jt = jacobian.transpose();
        let jtj = jt.multiply(&jacobian)?;
        let covariance = match invert_square(&jtj) {
            Ok(inverse) => Some(inverse.scale(chi2 / dof)),
            Err(e) if e.kind() == ErrorKind::SingularMatrix => {
                warn!("covariance unavailable: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(FitResult {
            parameters: params,
            covariance,
            chi_squared: chi2,
            iterations,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::barrier_models::{BarrierModel, ModelVariant};
    use crate::optimization::fit_LM_adapter::FitLM_Adapter;
    use crate::persistence::persistence_map::PersistenceMap;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn synthetic_map(rate: f64, barrier: f64, noise: Option<(f64, u64)>) -> PersistenceMap {
        let model = BarrierModel::new(ModelVariant::Full, &[rate, barrier]).unwrap();
        let truth = model.params().clone();
        let mut map = PersistenceMap::new();
        let mut noise_src = noise.map(|(sigma, seed)| {
            (
                Normal::new(0.0, sigma).unwrap(),
                StdRng::seed_from_u64(seed),
            )
        });
        for lag in 1..=20 {
            let lag = lag as f64;
            let mut value = model.evaluate(&truth, lag).unwrap();
            if let Some((normal, rng)) = noise_src.as_mut() {
                value += normal.sample(rng);
            }
            map.insert(lag, value).unwrap();
        }
        map
    }

    #[test]
    fn recovers_exact_parameters_from_noiseless_data() {
        let map = synthetic_map(1.0, 0.5, None);
        let model = BarrierModel::new(ModelVariant::Full, &[0.8, 0.6]).unwrap();
        let mut adapter = FitLM_Adapter::new(model, &map).unwrap();
        let initial = DVector::from_vec(vec![0.8, 0.6]);
        let result = FitLM::new().minimize(&mut adapter, &initial).unwrap();

        println!(
            "noiseless fit: {:?} after {} iterations, chi2 {:.3e}",
            result.parameters, result.iterations, result.chi_squared
        );
        assert!(result.status.was_successful());
        assert!(result.iterations < 50);
        assert!((result.parameters[0] - 1.0).abs() < 1e-3);
        assert!((result.parameters[1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn noisy_fits_stay_within_three_sigma_in_most_trials() {
        let trials = 20;
        let mut hits = 0;
        for seed in 0..trials {
            let map = synthetic_map(1.0, 0.5, Some((0.01, seed)));
            let model = BarrierModel::new(ModelVariant::Full, &[0.8, 0.6]).unwrap();
            let mut adapter = FitLM_Adapter::new(model, &map).unwrap();
            let initial = DVector::from_vec(vec![0.8, 0.6]);
            let result = FitLM::new().minimize(&mut adapter, &initial).unwrap();
            let cov = result.covariance.as_ref().expect("covariance available");
            let sigma0 = cov.at(0, 0).unwrap().sqrt();
            let sigma1 = cov.at(1, 1).unwrap().sqrt();
            let ok0 = (result.parameters[0] - 1.0).abs() <= 3.0 * sigma0;
            let ok1 = (result.parameters[1] - 0.5).abs() <= 3.0 * sigma1;
            if result.status.was_successful() && ok0 && ok1 {
                hits += 1;
            }
        }
        println!("{} of {} noisy trials within 3 sigma", hits, trials);
        assert!(hits * 100 >= trials * 95);
    }

    #[test]
    fn too_small_dataset_fails_before_iterating() {
        let mut map = PersistenceMap::new();
        map.insert(1.0, 0.9).unwrap();
        map.insert(2.0, 0.8).unwrap();
        let model = BarrierModel::new(ModelVariant::Full, &[1.0, 0.5]).unwrap();
        let mut adapter = FitLM_Adapter::new(model, &map).unwrap();
        let initial = DVector::from_vec(vec![1.0, 0.5]);
        let err = FitLM::new().minimize(&mut adapter, &initial).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn bad_configuration_is_rejected() {
        let map = synthetic_map(1.0, 0.5, None);
        let model = BarrierModel::new(ModelVariant::Full, &[1.0, 0.5]).unwrap();
        let mut adapter = FitLM_Adapter::new(model, &map).unwrap();
        let initial = DVector::from_vec(vec![1.0, 0.5]);
        let config = FitLmConfig::default().with_lambda_factors(0.5, 9.0);
        let err = FitLM::with_config(config)
            .minimize(&mut adapter, &initial)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    /// A problem whose residuals can only be computed at the initial point;
    /// every proposed step lands outside the domain, so nothing is ever
    /// accepted.
    struct WalledProblem {
        home: DVector<f64>,
    }

    impl LeastSquaresProblem for WalledProblem {
        fn parameter_count(&self) -> usize {
            1
        }

        fn residual_count(&self) -> usize {
            3
        }

        fn residuals(&mut self, params: &DVector<f64>) -> Result<DVector<f64>, FitError> {
            if (params[0] - self.home[0]).abs() > 1e-15 {
                return Err(FitError::invalid_argument("outside the domain"));
            }
            Ok(DVector::from_vec(vec![1.0, -1.0, 0.5]))
        }

        fn jacobian(&mut self, _params: &DVector<f64>) -> Result<Matrix, FitError> {
            Matrix::from_vec(3, 1, vec![1.0, 1.0, 1.0])
        }
    }

    #[test]
    fn rejection_without_end_reports_divergence_with_best_parameters() {
        let mut problem = WalledProblem {
            home: DVector::from_vec(vec![2.0]),
        };
        let initial = DVector::from_vec(vec![2.0]);
        let result = FitLM::new().minimize(&mut problem, &initial).unwrap();
        assert_eq!(result.status, FitStatus::Diverged);
        assert!(!result.status.was_successful());
        // the caller still gets the best point seen
        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-12);
    }

    /// A two-parameter problem blind to its second parameter: the curvature
    /// matrix is singular, so the covariance cannot be computed.
    struct HalfBlindProblem {
        xs: Vec<f64>,
        ys: Vec<f64>,
    }

    impl LeastSquaresProblem for HalfBlindProblem {
        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.xs.len()
        }

        fn residuals(&mut self, params: &DVector<f64>) -> Result<DVector<f64>, FitError> {
            Ok(DVector::from_iterator(
                self.xs.len(),
                self.xs
                    .iter()
                    .zip(self.ys.iter())
                    .map(|(x, y)| params[0] * x - y),
            ))
        }

        fn jacobian(&mut self, _params: &DVector<f64>) -> Result<Matrix, FitError> {
            let mut j = Matrix::zeros(self.xs.len(), 2)?;
            let mut w = j.writer();
            for (i, x) in self.xs.iter().enumerate() {
                w.set(i, 0, *x)?;
            }
            drop(w);
            Ok(j)
        }
    }

    #[test]
    fn singular_curvature_degrades_covariance_but_keeps_parameters() {
        let mut problem = HalfBlindProblem {
            xs: vec![1.0, 2.0, 3.0],
            ys: vec![2.0, 4.0, 6.0],
        };
        // start on the optimum: the gradient criterion terminates the fit,
        // then the covariance inversion hits the singular curvature matrix
        let initial = DVector::from_vec(vec![2.0, 0.0]);
        let result = FitLM::new().minimize(&mut problem, &initial).unwrap();
        assert!(result.status.was_successful());
        assert!(result.covariance.is_none());
        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-12);
    }
}
