// control/service.rs

use crate::control::TrafficControlMode;
use crate::engine::adapter::{EngineError, OFF_SYMBOL, RED_SYMBOL, YELLOW_SYMBOL};
use crate::engine::EngineService;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("simulation must be running to change control mode")]
    SimulationNotRunning,
    #[error("engine call failed: {0}")]
    Engine(#[from] EngineError),
}

/// Owns the per-intersection control mode and performs the mode-entry
/// actions against the engine. The stored mode is only ever mutated through
/// `set_mode`, and only after the entry action succeeded, so a failed engine
/// call never leaves a phantom mode behind.
pub struct TrafficControlService {
    engine_service: Arc<EngineService>,
    modes: Mutex<HashMap<String, TrafficControlMode>>,
}

impl TrafficControlService {
    pub fn new(engine_service: Arc<EngineService>) -> Self {
        Self {
            engine_service,
            modes: Mutex::new(HashMap::new()),
        }
    }

    /// The steady-state mode of one intersection. Never `NextPhase`.
    pub fn mode(&self, tl_id: &str) -> TrafficControlMode {
        self.modes
            .lock()
            .unwrap()
            .get(tl_id)
            .copied()
            .unwrap_or(TrafficControlMode::Normal)
    }

    /// Switches one intersection to a new control mode and applies the
    /// mode-entry action. Re-entering the current mode re-applies it.
    pub fn set_mode(
        &self,
        tl_id: &str,
        mode: TrafficControlMode,
    ) -> Result<TrafficControlMode, ControlError> {
        if !self.engine_service.is_running() {
            return Err(ControlError::SimulationNotRunning);
        }

        log::info!("Switching {} from {:?} to {:?}", tl_id, self.mode(tl_id), mode);

        match mode {
            TrafficControlMode::Red => self.force_uniform_state(tl_id, RED_SYMBOL)?,
            TrafficControlMode::Yellow => self.force_uniform_state(tl_id, YELLOW_SYMBOL)?,
            TrafficControlMode::LightsOff => self.force_uniform_state(tl_id, OFF_SYMBOL)?,
            TrafficControlMode::Normal => self.reset_to_normal_operation(tl_id)?,
            TrafficControlMode::NextPhase => self.advance_to_next_phase(tl_id)?,
            TrafficControlMode::Adaptive => {
                // No immediate signal change; the next retiming pass picks
                // this intersection up.
                log::info!("Adaptive control enabled for {} - using Webster algorithm", tl_id);
            }
        }

        // NextPhase is transient and resolves to normal operation.
        let steady = match mode {
            TrafficControlMode::NextPhase => TrafficControlMode::Normal,
            other => other,
        };
        self.modes
            .lock()
            .unwrap()
            .insert(tl_id.to_string(), steady);
        Ok(steady)
    }

    /// Applies one mode to every signal-controlled intersection, the way a
    /// network-wide operator command does. Per-intersection engine failures
    /// are logged and skipped so the rest of the network still switches.
    pub fn set_mode_all(&self, mode: TrafficControlMode) -> Result<TrafficControlMode, ControlError> {
        if !self.engine_service.is_running() {
            return Err(ControlError::SimulationNotRunning);
        }
        let engine = self.engine_service.engine();
        for tl_id in engine.traffic_light_ids()? {
            if let Err(e) = self.set_mode(&tl_id, mode) {
                log::error!("Failed to switch {} to {:?}: {}", tl_id, mode, e);
            }
        }
        Ok(match mode {
            TrafficControlMode::NextPhase => TrafficControlMode::Normal,
            other => other,
        })
    }

    /// Intersections currently eligible for adaptive retiming.
    pub fn adaptive_intersections(&self) -> Vec<String> {
        self.modes
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, &mode)| mode == TrafficControlMode::Adaptive)
            .map(|(tl_id, _)| tl_id.clone())
            .collect()
    }

    /// Overwrites every lamp with one uniform symbol for the full length of
    /// the indication string. The stored program is left untouched.
    fn force_uniform_state(&self, tl_id: &str, symbol: char) -> Result<(), EngineError> {
        let engine = self.engine_service.engine();
        let current = engine.red_yellow_green_state(tl_id)?;
        let uniform = symbol.to_string().repeat(current.len());
        engine.set_red_yellow_green_state(tl_id, &uniform)?;
        log::debug!("Set traffic light {} to uniform '{}'", tl_id, symbol);
        Ok(())
    }

    /// Restores the stored signal program in full and resets the phase
    /// pointer and timer to the program's own defaults.
    fn reset_to_normal_operation(&self, tl_id: &str) -> Result<(), EngineError> {
        let engine = self.engine_service.engine();
        let logic = engine.program_logic(tl_id)?;
        engine.set_program_logic(tl_id, logic)?;
        engine.set_phase(tl_id, 0)?;
        // Negative duration means "use the phase's configured duration".
        engine.set_phase_duration(tl_id, -1.0)?;
        log::debug!("Reset traffic light {} to normal operation", tl_id);
        Ok(())
    }

    /// Jumps to the next stage block. Phases come in blocks of three
    /// (green, yellow, red-clear), so the current phase is quantized down
    /// to its block before advancing, with wraparound over the program.
    fn advance_to_next_phase(&self, tl_id: &str) -> Result<(), EngineError> {
        let engine = self.engine_service.engine();
        let logic = engine.program_logic(tl_id)?;
        let number_of_phases = logic.phases.len();

        if number_of_phases <= 1 {
            log::info!(
                "Traffic light {} has only {} phase(s), cannot advance",
                tl_id,
                number_of_phases
            );
            return Ok(());
        }

        let current_phase = engine.phase(tl_id)?;
        let current_major_phase = current_phase - (current_phase % 3);
        let next_major_phase = (current_major_phase + 3) % number_of_phases;

        engine.set_phase(tl_id, next_major_phase)?;
        log::debug!(
            "Advanced traffic light {} from phase {} to major phase {}",
            tl_id,
            current_phase,
            next_major_phase
        );
        Ok(())
    }
}
