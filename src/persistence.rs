/// ordered lag -> persistence container consumed by the fitting code
pub mod persistence_map;
/// loading of persistence data from CSV files
pub mod map_loader;
