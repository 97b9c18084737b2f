// engine/service.rs

use crate::config::{IntersectionConfig, SimulatorSettings};
use crate::engine::adapter::{EngineError, ProgramLogic, TrafficLightApi};
use crate::flow::FlowAggregator;
use crate::shared_data::{FlowData, Road, Stage, WebsterInput, WebsterOutput};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Seconds per hour; mean per-step counts are extrapolated to an hourly
/// rate before entering the optimizer (one sample per simulated second).
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Owns the engine connection, the loaded intersection configurations and
/// the flow windows. Everything the retiming loop and the control service
/// do to the engine goes through here.
pub struct EngineService {
    engine: Arc<dyn TrafficLightApi>,
    configs: HashMap<String, IntersectionConfig>,
    aggregator: FlowAggregator,
    running: AtomicBool,
}

impl EngineService {
    pub fn new(
        engine: Arc<dyn TrafficLightApi>,
        configs: Vec<IntersectionConfig>,
        settings: &SimulatorSettings,
    ) -> Self {
        let configs = configs
            .into_iter()
            .map(|c| (c.engine_id.clone(), c))
            .collect();
        Self {
            engine,
            configs,
            aggregator: FlowAggregator::new(settings.optimization_interval_or_default() as usize),
            running: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> Arc<dyn TrafficLightApi> {
        Arc::clone(&self.engine)
    }

    pub fn aggregator(&self) -> &FlowAggregator {
        &self.aggregator
    }

    pub fn config(&self, tl_id: &str) -> Option<&IntersectionConfig> {
        self.configs.get(tl_id)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start_simulation(&self) -> Result<(), EngineError> {
        if self.is_running() {
            log::warn!("Simulation is already running");
            return Ok(());
        }
        self.engine.start()?;
        // Stale pre-restart samples must never leak into this run.
        self.aggregator.reset_all();
        self.running.store(true, Ordering::SeqCst);
        log::info!("Simulation started");
        Ok(())
    }

    /// Stops the simulation. Idempotent: the engine connection is closed
    /// exactly once even if this is invoked twice.
    pub fn stop_simulation(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            log::warn!("No simulation is running");
            return;
        }
        self.aggregator.reset_all();
        if let Err(e) = self.engine.close() {
            log::error!("Failed to close engine connection: {}", e);
        }
        log::info!("Simulation stopped");
    }

    /// Samples lane occupancy into the flow windows, then advances the
    /// engine one step. A step failure stops the simulation outright:
    /// better to halt than to keep stepping an engine in an unknown state.
    pub fn step_simulation(&self) {
        if !self.is_running() {
            log::warn!("Cannot step simulation: not running");
            return;
        }

        let result = self.collect_flow_data().and_then(|()| self.engine.step());
        match result {
            Ok(()) => {
                let sim_time = self.simulation_time();
                if sim_time.round() as i64 % 60 == 0 {
                    log::info!("Simulation time: {} seconds", sim_time);
                }
            }
            Err(e) => {
                log::error!("Error during simulation step: {}", e);
                self.stop_simulation();
            }
        }
    }

    pub fn simulation_time(&self) -> f64 {
        self.engine.time().unwrap_or(0.0)
    }

    /// One occupancy sample per configured intersection and incoming lane.
    /// A failure on one intersection is logged and skipped; only a failed
    /// enumeration aborts the whole sweep.
    fn collect_flow_data(&self) -> Result<(), EngineError> {
        for tl_id in self.engine.traffic_light_ids()? {
            if !self.configs.contains_key(&tl_id) {
                continue;
            }
            let lanes = match self.engine.incoming_lanes(&tl_id) {
                Ok(lanes) => lanes,
                Err(e) => {
                    log::warn!("Skipping flow collection for {}: {}", tl_id, e);
                    continue;
                }
            };
            for lane in lanes {
                match self.engine.last_step_vehicle_count(&lane) {
                    Ok(count) => self.aggregator.record_sample(&tl_id, &lane, count),
                    Err(e) => log::warn!("No vehicle count for lane {}: {}", lane, e),
                }
            }
        }
        Ok(())
    }

    /// Builds the optimizer input for one intersection from its static
    /// configuration and the current flow windows. `None` when there is no
    /// configuration or no demand data yet.
    pub fn prepare_webster_input(&self, tl_id: &str) -> Option<WebsterInput> {
        let config = match self.config(tl_id) {
            Some(config) => config,
            None => {
                log::warn!("No configuration found for traffic light: {}", tl_id);
                return None;
            }
        };
        if !self.aggregator.has_samples(tl_id) {
            log::warn!("No flow history available for traffic light: {}", tl_id);
            return None;
        }

        let stages = config
            .stages
            .iter()
            .map(|stage| Stage {
                id: stage.id,
                old_id: stage.old_id.clone(),
                weight: stage.weight,
                min_green_time: stage.min_green_time,
                max_green_time: stage.max_green_time,
                yellow: stage.yellow,
                red_clear: stage.red_clear,
                lamps: stage.lamps.clone(),
            })
            .collect();

        let roads = config
            .roads
            .iter()
            .map(|road| Road {
                direction: road.direction.clone(),
                number_of_lanes: road.number_of_lanes,
                flows: road
                    .flows
                    .iter()
                    .map(|flow| FlowData {
                        direction: flow.direction.clone(),
                        route: flow.route.clone(),
                        flow_data: self.aggregator.average_flow(tl_id, &flow.lane)
                            * SECONDS_PER_HOUR,
                        lane: flow.lane.clone(),
                    })
                    .collect(),
            })
            .collect();

        Some(WebsterInput {
            saturation_volume: config.saturation_volume,
            stages,
            roads,
        })
    }

    /// Rewrites the green-slot durations of the intersection's current
    /// program from a Webster plan and pushes the whole program back in one
    /// write. Yellow and red-clear phases keep their configured durations.
    pub fn apply_webster_output(
        &self,
        tl_id: &str,
        output: &WebsterOutput,
    ) -> Result<(), EngineError> {
        let config = match self.config(tl_id) {
            Some(config) => config,
            None => {
                log::warn!("No configuration found for traffic light: {}", tl_id);
                return Ok(());
            }
        };

        let stage_to_phase: HashMap<u64, usize> = config
            .stages
            .iter()
            .map(|stage| (stage.id, stage.phase_index))
            .collect();

        let current = self.engine.program_logic(tl_id)?;
        let mut phases = current.phases.clone();

        for stage_output in &output.effective_green_times {
            let phase_index = match stage_to_phase.get(&stage_output.stage_id) {
                Some(&index) => index,
                None => {
                    log::warn!("No phase index found for stage ID: {}", stage_output.stage_id);
                    continue;
                }
            };

            // Each stage occupies a green/yellow/red-clear block of three
            // consecutive phase slots; only the green slot is rewritten.
            let green_phase_index = phase_index * 3;
            if green_phase_index < phases.len() {
                phases[green_phase_index].duration = stage_output.green_time as f64;
                log::info!(
                    "Updated phase {} for stage {} with green time: {} seconds",
                    green_phase_index,
                    stage_output.stage_id,
                    stage_output.green_time
                );
            } else {
                log::warn!(
                    "Phase index {} out of bounds for traffic light: {}",
                    green_phase_index,
                    tl_id
                );
            }
        }

        self.engine.set_program_logic(
            tl_id,
            ProgramLogic {
                program_id: current.program_id,
                current_phase_index: current.current_phase_index,
                phases,
            },
        )?;

        log::info!("Successfully applied Webster output to traffic light: {}", tl_id);
        Ok(())
    }
}
