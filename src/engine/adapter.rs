// engine/adapter.rs

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Indication symbols used in forced modes, one character per lamp.
pub const RED_SYMBOL: char = 'r';
pub const YELLOW_SYMBOL: char = 'y';
pub const OFF_SYMBOL: char = 'O';

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine connection is not open")]
    NotConnected,
    #[error("unknown traffic light: {0}")]
    UnknownTrafficLight(String),
    #[error("unknown lane: {0}")]
    UnknownLane(String),
    #[error("phase index {index} out of range for traffic light {tl_id}")]
    PhaseOutOfRange { tl_id: String, index: usize },
    #[error("engine step failed: {0}")]
    StepFailed(String),
}

/// One phase of a signal program: how long it runs and what every lamp
/// shows while it does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPhase {
    pub duration: f64,
    pub state: String,
}

/// A complete signal program as stored by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramLogic {
    pub program_id: String,
    pub current_phase_index: usize,
    pub phases: Vec<SignalPhase>,
}

/// The only boundary to the external microscopic simulator. Everything the
/// retiming subsystem reads or writes goes through this trait; the real
/// engine binding and the in-memory test engine both implement it.
pub trait TrafficLightApi: Send + Sync {
    /// Opens the engine connection and starts the simulation.
    fn start(&self) -> Result<(), EngineError>;

    /// Closes the engine connection. Further calls fail with `NotConnected`.
    fn close(&self) -> Result<(), EngineError>;

    /// Advances the simulation by one step.
    fn step(&self) -> Result<(), EngineError>;

    /// Current simulation time in seconds.
    fn time(&self) -> Result<f64, EngineError>;

    /// All signal-controlled intersection identifiers.
    fn traffic_light_ids(&self) -> Result<Vec<String>, EngineError>;

    /// The live indication string, one character per lamp.
    fn red_yellow_green_state(&self, tl_id: &str) -> Result<String, EngineError>;

    /// Overwrites the live indication string without touching the stored
    /// program.
    fn set_red_yellow_green_state(&self, tl_id: &str, state: &str) -> Result<(), EngineError>;

    /// The currently stored signal program.
    fn program_logic(&self, tl_id: &str) -> Result<ProgramLogic, EngineError>;

    /// Replaces the signal program in one atomic write.
    fn set_program_logic(&self, tl_id: &str, logic: ProgramLogic) -> Result<(), EngineError>;

    /// Index of the phase currently being served.
    fn phase(&self, tl_id: &str) -> Result<usize, EngineError>;

    /// Jumps to the given phase of the stored program.
    fn set_phase(&self, tl_id: &str, phase_index: usize) -> Result<(), EngineError>;

    /// Overrides the remaining duration of the current phase. A negative
    /// value resets it to the phase's own configured duration.
    fn set_phase_duration(&self, tl_id: &str, duration: f64) -> Result<(), EngineError>;

    /// Incoming lanes controlled by the given traffic light.
    fn incoming_lanes(&self, tl_id: &str) -> Result<Vec<String>, EngineError>;

    /// Number of vehicles observed on the lane during the last step.
    fn last_step_vehicle_count(&self, lane_id: &str) -> Result<f64, EngineError>;
}
