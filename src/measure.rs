/// barrier-crossing persistence models and their analytic derivatives
pub mod barrier_models;
/// wiring of the barrier models and persistence maps into the LM bridge
pub mod barrier_adapter;
