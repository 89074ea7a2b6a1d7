use crate::measure::barrier_models::BarrierModel;
use crate::optimization::fit_LM_adapter::{FitDataSet, FitLM_Adapter, FitModel};
use crate::persistence::persistence_map::PersistenceMap;
use nalgebra::DVector;

impl FitModel for BarrierModel {
    fn parameter_count(&self) -> usize {
        self.variant().parameter_count()
    }

    fn evaluate(
        &self,
        params: &DVector<f64>,
        key: f64,
    ) -> Result<f64, crate::errors::FitError> {
        BarrierModel::evaluate(self, params, key)
    }

    fn jacobian_row(
        &self,
        params: &DVector<f64>,
        key: f64,
    ) -> Result<DVector<f64>, crate::errors::FitError> {
        BarrierModel::jacobian_row(self, params, key)
    }
}

impl FitDataSet for PersistenceMap {
    fn len(&self) -> usize {
        PersistenceMap::len(self)
    }

    fn point(&self, idx: usize) -> (f64, f64) {
        PersistenceMap::point(self, idx)
    }
}

/// The LM bridge fixed to a barrier model over a persistence map.
///
/// Pure wiring: the variant-specific parameter-count and domain checks all
/// live in `BarrierModel` and surface through the bridge unchanged.
pub type FitLM_BarrierAdapter<'d> = FitLM_Adapter<'d, BarrierModel, PersistenceMap>;
