pub mod service;

pub use service::SimulationService;
