use crate::Utils::math_utils::chi_squared;
use crate::errors::FitError;
use crate::persistence::persistence_map::PersistenceMap;
use nalgebra::DVector;
use rand::Rng;
use strum_macros::{Display, EnumString};

/// Natural upper range of the Markov transition rate.
pub const RATE_CEILING: f64 = 20.0;
/// Natural upper range of the barrier height. tanh saturates well before
/// this, so larger heights are indistinguishable from a total barrier.
pub const BARRIER_CEILING: f64 = 4.0;

/// Which terms of the barrier model are active.
///
/// The variant fixes both the functional form and the parameter count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ModelVariant {
    /// Pure Markov decay, parameters `[rate]`.
    MarkovOnly,
    /// Barrier term with the Markov decay frozen at unit rate,
    /// parameters `[barrier]`.
    BarrierOnly,
    /// Markov decay toward a barrier-controlled plateau,
    /// parameters `[rate, barrier]`.
    Full,
}

impl ModelVariant {
    pub fn parameter_count(&self) -> usize {
        match self {
            ModelVariant::MarkovOnly => 1,
            ModelVariant::BarrierOnly => 1,
            ModelVariant::Full => 2,
        }
    }

    /// Sensible sampling ranges for each parameter of the variant, used by
    /// the genetic optimizer to seed and limit candidates.
    pub fn natural_bounds(&self) -> Vec<(f64, f64)> {
        match self {
            ModelVariant::MarkovOnly => vec![(0.0, RATE_CEILING)],
            ModelVariant::BarrierOnly => vec![(0.0, BARRIER_CEILING)],
            ModelVariant::Full => vec![(0.0, RATE_CEILING), (0.0, BARRIER_CEILING)],
        }
    }
}

/// A parametric forward model for barrier-crossing persistence.
///
/// Persistence is the probability that the system has not crossed the
/// barrier after a given lag. The Markov term decays memorylessly at the
/// transition rate; the barrier term traps a `tanh(barrier)` fraction of
/// trajectories permanently, so persistence relaxes toward that plateau
/// instead of zero:
///
/// `p(t) = h(b) + (1 - h(b)) * exp(-k t)`,  `h(x) = tanh(x)`
///
/// `MarkovOnly` drops the barrier term, `BarrierOnly` freezes the decay at
/// unit rate, `Full` keeps both parameters free.
///
/// Evaluation is pure: the stored parameter vector is mutated only by the
/// calling optimizer through `set_params`. The model is a unique resource
/// and deliberately not `Clone`; start an independent fit from a fresh
/// instance.
#[derive(Debug)]
pub struct BarrierModel {
    variant: ModelVariant,
    params: DVector<f64>,
}

impl BarrierModel {
    /// Constructs the model with an initial parameter guess.
    ///
    /// The guess must match the variant's parameter count and lie in the
    /// physical domain (all parameters non-negative); violations are
    /// reported, never clamped.
    pub fn new(variant: ModelVariant, initial: &[f64]) -> Result<Self, FitError> {
        let params = DVector::from_column_slice(initial);
        let model = Self { variant, params };
        model.check_params(&model.params)?;
        Ok(model)
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn parameter_count(&self) -> usize {
        self.variant.parameter_count()
    }

    pub fn params(&self) -> &DVector<f64> {
        &self.params
    }

    pub fn set_params(&mut self, params: &DVector<f64>) -> Result<(), FitError> {
        self.check_params(params)?;
        self.params.copy_from(params);
        Ok(())
    }

    /// The saturation shape.
    pub fn shape_h(x: f64) -> f64 {
        x.tanh()
    }

    /// The first derivative of `shape_h`.
    pub fn deriv_h(x: f64) -> f64 {
        let sech_x = 1.0 / x.cosh();
        sech_x * sech_x
    }

    pub fn check_params(&self, params: &DVector<f64>) -> Result<(), FitError> {
        let expected = self.variant.parameter_count();
        if params.len() != expected {
            return Err(FitError::invalid_argument(format!(
                "variant {} expects {} parameters, got {}",
                self.variant,
                expected,
                params.len()
            )));
        }
        for (i, p) in params.iter().enumerate() {
            if !p.is_finite() || *p < 0.0 {
                return Err(FitError::invalid_argument(format!(
                    "parameter {} = {} outside the physical domain of variant {}",
                    i, p, self.variant
                )));
            }
        }
        Ok(())
    }

    /// Predicted persistence at the given lag.
    pub fn evaluate(&self, params: &DVector<f64>, lag: f64) -> Result<f64, FitError> {
        self.check_params(params)?;
        let value = match self.variant {
            ModelVariant::MarkovOnly => (-params[0] * lag).exp(),
            ModelVariant::BarrierOnly => {
                let h = Self::shape_h(params[0]);
                h + (1.0 - h) * (-lag).exp()
            }
            ModelVariant::Full => {
                let h = Self::shape_h(params[1]);
                h + (1.0 - h) * (-params[0] * lag).exp()
            }
        };
        Ok(value)
    }

    /// Analytic partial derivatives of the prediction with respect to every
    /// active parameter, at the given lag.
    pub fn jacobian_row(&self, params: &DVector<f64>, lag: f64) -> Result<DVector<f64>, FitError> {
        self.check_params(params)?;
        let row = match self.variant {
            ModelVariant::MarkovOnly => {
                let k = params[0];
                DVector::from_vec(vec![-lag * (-k * lag).exp()])
            }
            ModelVariant::BarrierOnly => {
                let b = params[0];
                DVector::from_vec(vec![Self::deriv_h(b) * (1.0 - (-lag).exp())])
            }
            ModelVariant::Full => {
                let k = params[0];
                let b = params[1];
                let decay = (-k * lag).exp();
                DVector::from_vec(vec![
                    -lag * (1.0 - Self::shape_h(b)) * decay,
                    Self::deriv_h(b) * (1.0 - decay),
                ])
            }
        };
        Ok(row)
    }

    /// Sum of squared deviations between the map and the model evaluated at
    /// `params`.
    pub fn chi_squared(&self, map: &PersistenceMap, params: &DVector<f64>) -> Result<f64, FitError> {
        let mut residuals = DVector::zeros(map.len());
        for (i, (lag, observed)) in map.iter().enumerate() {
            residuals[i] = observed - self.evaluate(params, lag)?;
        }
        Ok(chi_squared(&residuals))
    }

    /// Fills a parameter vector with uniform random values over the
    /// variant's natural ranges.
    pub fn random_params<R: Rng>(variant: ModelVariant, rng: &mut R) -> Vec<f64> {
        variant
            .natural_bounds()
            .iter()
            .map(|(lo, hi)| rng.random_range(*lo..*hi))
            .collect()
    }

    /// Clamps out-of-range parameters back into their bounds. Used by the
    /// genetic optimizer after crossover and mutation; never applied inside
    /// `evaluate`.
    pub fn limit_params(params: &mut [f64], bounds: &[(f64, f64)]) {
        for (p, (lo, hi)) in params.iter_mut().zip(bounds.iter()) {
            *p = p.clamp(*lo, *hi);
        }
    }
}
