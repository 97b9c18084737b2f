// engine/mod.rs
pub mod adapter;
pub mod service;
pub mod simulated;

pub use adapter::{EngineError, ProgramLogic, SignalPhase, TrafficLightApi};
pub use service::EngineService;
pub use simulated::SimulatedEngine;
