/// square-matrix inversion and linear-system solution for the fitters
pub mod inverters;
/// index-sorting kernel used by the genetic optimizer's selection stage
pub mod sorters;
