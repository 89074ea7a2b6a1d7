/// capability trait consumed by the Levenberg-Marquardt engine
pub mod fit_problem;
#[allow(non_snake_case)]
/// generic bridge turning a forward model plus a dataset into a least-squares problem
pub mod fit_LM_adapter;
#[allow(non_snake_case)]
/// here is the main loop for fitting data with the damped Levenberg-Marquardt algorithm
pub mod fit_LM;
#[allow(non_snake_case)]
/// genetic-algorithm optimizer, gradient-free alternative to the LM path
pub mod fit_GA;
/// programmatic entry points for both optimizers
pub mod api;
