pub mod communication;
pub mod config;
pub mod control;
pub mod engine;
pub mod flow;
pub mod global_variables;
pub mod shared_data;
pub mod simulation;
pub mod webster;
