// simulation/service.rs

use crate::config::{SimulatorSettings, WebsterSettings};
use crate::control::{TrafficControlMode, TrafficControlService};
use crate::engine::adapter::EngineError;
use crate::engine::EngineService;
use crate::shared_data::{current_timestamp, RetimingUpdate};
use crate::webster::calculate_webster;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// The periodic driver: steps the engine once per tick and, on the
/// optimization cadence, retimes every intersection in adaptive mode.
pub struct SimulationService {
    engine_service: Arc<EngineService>,
    control: Arc<TrafficControlService>,
    webster_settings: WebsterSettings,
    optimization_interval: u64,
    step_length: f64,
}

impl SimulationService {
    pub fn new(
        engine_service: Arc<EngineService>,
        control: Arc<TrafficControlService>,
        simulator_settings: &SimulatorSettings,
        webster_settings: WebsterSettings,
    ) -> Self {
        Self {
            engine_service,
            control,
            webster_settings,
            optimization_interval: simulator_settings.optimization_interval_or_default(),
            step_length: simulator_settings.step_length,
        }
    }

    pub fn start_simulation(&self) -> Result<(), EngineError> {
        self.engine_service.start_simulation()
    }

    pub fn stop_simulation(&self) {
        self.engine_service.stop_simulation();
    }

    pub fn is_running(&self) -> bool {
        self.engine_service.is_running()
    }

    /// One driver tick: a single engine step, plus a retiming pass when the
    /// simulation time lands on the optimization cadence. Returns the plans
    /// applied this tick so the messaging layer can publish them.
    pub fn step_once(&self) -> Vec<RetimingUpdate> {
        if !self.is_running() {
            return Vec::new();
        }

        self.engine_service.step_simulation();

        let sim_time = self.engine_service.simulation_time();
        if sim_time > 0.0 && sim_time.round() as u64 % self.optimization_interval == 0 {
            self.optimize_traffic_signals()
        } else {
            Vec::new()
        }
    }

    /// Steps the simulation `steps` times, starting it first if necessary.
    pub fn run_for(&self, steps: u64) -> Result<Vec<RetimingUpdate>, EngineError> {
        if !self.is_running() {
            self.start_simulation()?;
        }
        let mut updates = Vec::new();
        for _ in 0..steps {
            updates.extend(self.step_once());
        }
        Ok(updates)
    }

    /// Continuous driver loop. Ticks never overlap: the next sleep only
    /// starts once the current tick has finished.
    pub async fn run_loop(self: Arc<Self>) {
        loop {
            for update in self.step_once() {
                log::info!(
                    "Applied retiming plan for {}: cycle {} seconds",
                    update.intersection_id,
                    update.cycle_length
                );
            }
            sleep(Duration::from_secs_f64(self.step_length)).await;
        }
    }

    /// One retiming pass over every intersection currently in adaptive
    /// mode. An intersection without configuration or demand data is
    /// skipped with a warning; an engine failure on one intersection never
    /// aborts the rest of the pass.
    pub fn optimize_traffic_signals(&self) -> Vec<RetimingUpdate> {
        log::info!(
            "Optimizing traffic signals at simulation time: {}",
            self.engine_service.simulation_time()
        );

        let mut adaptive = self.control.adaptive_intersections();
        adaptive.sort();

        let mut updates = Vec::new();
        for tl_id in adaptive {
            let input = match self.engine_service.prepare_webster_input(&tl_id) {
                Some(input) => input,
                None => continue,
            };

            let output = calculate_webster(&input, &self.webster_settings);

            match self.engine_service.apply_webster_output(&tl_id, &output) {
                Ok(()) => updates.push(RetimingUpdate {
                    timestamp: current_timestamp(),
                    intersection_id: tl_id,
                    cycle_length: output.cycle_length,
                    stages: output.effective_green_times,
                }),
                Err(e) => {
                    log::error!("Error applying Webster output to traffic light {}: {}", tl_id, e);
                }
            }
        }
        updates
    }

    pub fn control(&self) -> Arc<TrafficControlService> {
        Arc::clone(&self.control)
    }

    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    pub fn set_mode(
        &self,
        tl_id: &str,
        mode: TrafficControlMode,
    ) -> Result<TrafficControlMode, crate::control::ControlError> {
        self.control.set_mode(tl_id, mode)
    }
}
