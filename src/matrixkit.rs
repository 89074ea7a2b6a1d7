/// storage policy trait and its owning/view implementations
pub mod storage;
/// generic dense 2-D container over a storage policy, with checked algebra
pub mod matrix_adapter;
/// scoped mutable write handle over matrix contents
pub mod writer;
