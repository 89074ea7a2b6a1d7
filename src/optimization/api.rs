use crate::errors::FitError;
use crate::measure::barrier_adapter::FitLM_BarrierAdapter;
use crate::measure::barrier_models::BarrierModel;
use crate::optimization::fit_GA::{FitGA, GaConfig};
use crate::optimization::fit_LM::{FitLM, FitLmConfig, FitResult};
use crate::persistence::persistence_map::PersistenceMap;
use nalgebra::DVector;

/// Fits a barrier model to a persistence map with the Levenberg-Marquardt
/// engine.
///
/// An empty map is a precondition violation. Non-convergence is reported
/// through `FitResult::status`, not as an error.
pub fn run_lm(
    model: BarrierModel,
    data: &PersistenceMap,
    initial: &[f64],
    config: FitLmConfig,
) -> Result<FitResult, FitError> {
    if data.is_empty() {
        return Err(FitError::invalid_argument(
            "persistence map holds no data points",
        ));
    }
    let mut adapter = FitLM_BarrierAdapter::new(model, data)?;
    let initial = DVector::from_column_slice(initial);
    FitLM::with_config(config).minimize(&mut adapter, &initial)
}

/// Searches the box given by `parameter_bounds` for the parameters
/// maximizing `fitness`, with the genetic optimizer.
///
/// To fit a model, pass a negated chi-square as the fitness.
pub fn run_ga<F>(
    fitness: F,
    parameter_bounds: &[(f64, f64)],
    config: GaConfig,
) -> Result<Vec<f64>, FitError>
where
    F: Fn(&[f64]) -> f64,
{
    let ga = FitGA::new(config)?;
    Ok(ga.run(fitness, parameter_bounds)?.best_parameters)
}
