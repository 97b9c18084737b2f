pub mod optimizer;

pub use optimizer::calculate_webster;
