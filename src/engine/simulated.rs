// engine/simulated.rs

use crate::config::{FlowConfig, IntersectionConfig, RoadConfig, StageConfig};
use crate::engine::adapter::{EngineError, ProgramLogic, SignalPhase, TrafficLightApi};
use crate::shared_data::Lamp;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

struct SimulatedLight {
    program: ProgramLogic,
    /// Live indication string. Diverges from the program while a forced
    /// mode (all-red, all-yellow, lights-off) is active.
    display: String,
    remaining: f64,
    forced: bool,
    incoming: Vec<String>,
}

struct EngineState {
    connected: bool,
    time: f64,
    lights: HashMap<String, SimulatedLight>,
    /// Mean vehicles per step used to synthesize arrivals.
    arrival_rates: HashMap<String, f64>,
    lane_counts: HashMap<String, f64>,
    rng: SmallRng,
}

/// In-memory stand-in for the external microscopic simulator. Phase timers
/// advance on `step()` and per-lane vehicle counts are drawn from seeded
/// random arrivals, which is enough to exercise the whole retiming path
/// without a real engine attached.
pub struct SimulatedEngine {
    state: Mutex<EngineState>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState {
                connected: false,
                time: 0.0,
                lights: HashMap::new(),
                arrival_rates: HashMap::new(),
                lane_counts: HashMap::new(),
                rng: SmallRng::seed_from_u64(1),
            }),
        }
    }

    /// Registers a traffic light with its program and incoming lanes.
    /// `arrival_rates` pairs each lane with its mean vehicles per step.
    pub fn add_traffic_light(
        &self,
        tl_id: &str,
        program: ProgramLogic,
        arrival_rates: Vec<(String, f64)>,
    ) {
        let mut state = self.state.lock().unwrap();
        let display = program
            .phases
            .get(program.current_phase_index)
            .map(|p| p.state.clone())
            .unwrap_or_default();
        let remaining = program
            .phases
            .get(program.current_phase_index)
            .map(|p| p.duration)
            .unwrap_or(0.0);
        let incoming: Vec<String> = arrival_rates.iter().map(|(lane, _)| lane.clone()).collect();
        for (lane, rate) in arrival_rates {
            state.arrival_rates.insert(lane.clone(), rate);
            state.lane_counts.insert(lane, 0.0);
        }
        state.lights.insert(
            tl_id.to_string(),
            SimulatedLight {
                program,
                display,
                remaining,
                forced: false,
                incoming,
            },
        );
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn light<'a>(state: &'a EngineState, tl_id: &str) -> Result<&'a SimulatedLight, EngineError> {
    state
        .lights
        .get(tl_id)
        .ok_or_else(|| EngineError::UnknownTrafficLight(tl_id.to_string()))
}

fn light_mut<'a>(
    state: &'a mut EngineState,
    tl_id: &str,
) -> Result<&'a mut SimulatedLight, EngineError> {
    state
        .lights
        .get_mut(tl_id)
        .ok_or_else(|| EngineError::UnknownTrafficLight(tl_id.to_string()))
}

fn check_connected(state: &EngineState) -> Result<(), EngineError> {
    if state.connected {
        Ok(())
    } else {
        Err(EngineError::NotConnected)
    }
}

impl TrafficLightApi for SimulatedEngine {
    fn start(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.connected = true;
        state.time = 0.0;
        for count in state.lane_counts.values_mut() {
            *count = 0.0;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        check_connected(&state)?;
        state.connected = false;
        Ok(())
    }

    fn step(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        check_connected(&state)?;
        state.time += 1.0;

        // Draw this step's arrivals per lane.
        let lanes: Vec<(String, f64)> = state
            .arrival_rates
            .iter()
            .map(|(lane, &rate)| (lane.clone(), rate))
            .collect();
        for (lane, rate) in lanes {
            let count = if rate > 0.0 {
                state.rng.random_range(0.0..rate * 2.0).round()
            } else {
                0.0
            };
            state.lane_counts.insert(lane, count);
        }

        // Advance phase timers. A forced indication masks the program
        // until a phase or program write clears it.
        for tl in state.lights.values_mut() {
            if tl.forced || tl.program.phases.is_empty() {
                continue;
            }
            tl.remaining -= 1.0;
            if tl.remaining <= 0.0 {
                tl.program.current_phase_index =
                    (tl.program.current_phase_index + 1) % tl.program.phases.len();
                let phase = &tl.program.phases[tl.program.current_phase_index];
                tl.remaining = phase.duration;
                tl.display = phase.state.clone();
            }
        }
        Ok(())
    }

    fn time(&self) -> Result<f64, EngineError> {
        let state = self.state.lock().unwrap();
        check_connected(&state)?;
        Ok(state.time)
    }

    fn traffic_light_ids(&self) -> Result<Vec<String>, EngineError> {
        let state = self.state.lock().unwrap();
        check_connected(&state)?;
        let mut ids: Vec<String> = state.lights.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn red_yellow_green_state(&self, tl_id: &str) -> Result<String, EngineError> {
        let state = self.state.lock().unwrap();
        check_connected(&state)?;
        Ok(light(&state, tl_id)?.display.clone())
    }

    fn set_red_yellow_green_state(&self, tl_id: &str, new_state: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        check_connected(&state)?;
        let tl = light_mut(&mut state, tl_id)?;
        tl.display = new_state.to_string();
        tl.forced = true;
        Ok(())
    }

    fn program_logic(&self, tl_id: &str) -> Result<ProgramLogic, EngineError> {
        let state = self.state.lock().unwrap();
        check_connected(&state)?;
        Ok(light(&state, tl_id)?.program.clone())
    }

    fn set_program_logic(&self, tl_id: &str, logic: ProgramLogic) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        check_connected(&state)?;
        let tl = light_mut(&mut state, tl_id)?;
        tl.program = logic;
        if tl.program.current_phase_index >= tl.program.phases.len() {
            tl.program.current_phase_index = 0;
        }
        if let Some(phase) = tl.program.phases.get(tl.program.current_phase_index) {
            tl.display = phase.state.clone();
            if tl.remaining <= 0.0 || tl.remaining > phase.duration {
                tl.remaining = phase.duration;
            }
        }
        tl.forced = false;
        Ok(())
    }

    fn phase(&self, tl_id: &str) -> Result<usize, EngineError> {
        let state = self.state.lock().unwrap();
        check_connected(&state)?;
        Ok(light(&state, tl_id)?.program.current_phase_index)
    }

    fn set_phase(&self, tl_id: &str, phase_index: usize) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        check_connected(&state)?;
        let tl = light_mut(&mut state, tl_id)?;
        if phase_index >= tl.program.phases.len() {
            return Err(EngineError::PhaseOutOfRange {
                tl_id: tl_id.to_string(),
                index: phase_index,
            });
        }
        tl.program.current_phase_index = phase_index;
        let phase = &tl.program.phases[phase_index];
        tl.remaining = phase.duration;
        tl.display = phase.state.clone();
        tl.forced = false;
        Ok(())
    }

    fn set_phase_duration(&self, tl_id: &str, duration: f64) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        check_connected(&state)?;
        let tl = light_mut(&mut state, tl_id)?;
        if duration < 0.0 {
            // Negative means "use the phase's own configured duration".
            tl.remaining = tl
                .program
                .phases
                .get(tl.program.current_phase_index)
                .map(|p| p.duration)
                .unwrap_or(0.0);
        } else {
            tl.remaining = duration;
        }
        Ok(())
    }

    fn incoming_lanes(&self, tl_id: &str) -> Result<Vec<String>, EngineError> {
        let state = self.state.lock().unwrap();
        check_connected(&state)?;
        Ok(light(&state, tl_id)?.incoming.clone())
    }

    fn last_step_vehicle_count(&self, lane_id: &str) -> Result<f64, EngineError> {
        let state = self.state.lock().unwrap();
        check_connected(&state)?;
        state
            .lane_counts
            .get(lane_id)
            .copied()
            .ok_or_else(|| EngineError::UnknownLane(lane_id.to_string()))
    }
}

/// Builds a standard two-stage program: for every stage a green, yellow
/// and red-clear phase, so stage `i` occupies the phase block starting at
/// `i * 3`.
pub fn two_stage_program(green: f64, yellow: f64, red_clear: f64) -> ProgramLogic {
    ProgramLogic {
        program_id: "0".to_string(),
        current_phase_index: 0,
        phases: vec![
            SignalPhase { duration: green, state: "GGrr".to_string() },
            SignalPhase { duration: yellow, state: "yyrr".to_string() },
            SignalPhase { duration: red_clear, state: "rrrr".to_string() },
            SignalPhase { duration: green, state: "rrGG".to_string() },
            SignalPhase { duration: yellow, state: "rryy".to_string() },
            SignalPhase { duration: red_clear, state: "rrrr".to_string() },
        ],
    }
}

/// Builds a program with a green, yellow and red-clear phase per stage,
/// laid out in phase-index order so stage `i` occupies the phase block
/// starting at `i * 3`. Each green starts at its stage's minimum.
pub fn program_from_stages(stages: &[StageConfig]) -> ProgramLogic {
    let mut ordered: Vec<&StageConfig> = stages.iter().collect();
    ordered.sort_by_key(|stage| stage.phase_index);

    // Two signal heads per stage, active one at a time.
    let heads = ordered.len();
    let indication = |active: usize, symbol: char| -> String {
        let mut s = String::with_capacity(heads * 2);
        for j in 0..heads {
            let c = if j == active { symbol } else { 'r' };
            s.push(c);
            s.push(c);
        }
        s
    };

    let mut phases = Vec::with_capacity(heads * 3);
    for (i, stage) in ordered.iter().enumerate() {
        phases.push(SignalPhase {
            duration: stage.min_green_time as f64,
            state: indication(i, 'G'),
        });
        phases.push(SignalPhase {
            duration: stage.yellow as f64,
            state: indication(i, 'y'),
        });
        phases.push(SignalPhase {
            duration: stage.red_clear as f64,
            state: indication(i, 'r'),
        });
    }

    ProgramLogic {
        program_id: "0".to_string(),
        current_phase_index: 0,
        phases,
    }
}

/// Mean vehicles per step assigned to every lane of a file-loaded network.
const DEFAULT_ARRIVAL_RATE: f64 = 0.2;

/// Builds an engine hosting one light per loaded configuration, each with a
/// per-stage program and synthetic arrivals on every declared lane.
pub fn engine_from_configs(configs: &[IntersectionConfig]) -> SimulatedEngine {
    let engine = SimulatedEngine::new();
    for config in configs {
        let arrival_rates = config
            .roads
            .iter()
            .flat_map(|road| road.flows.iter())
            .map(|flow| (flow.lane.clone(), DEFAULT_ARRIVAL_RATE))
            .collect();
        engine.add_traffic_light(
            &config.engine_id,
            program_from_stages(&config.stages),
            arrival_rates,
        );
    }
    engine
}

fn demo_intersection_config(tl_id: &str) -> IntersectionConfig {
    let lamp = |direction: &str| Lamp {
        direction: direction.to_string(),
        route: "straight".to_string(),
    };
    IntersectionConfig {
        engine_id: tl_id.to_string(),
        intersection_id: format!("legacy_{}", tl_id),
        saturation_volume: 1900.0,
        stages: vec![
            StageConfig {
                id: 1,
                old_id: "A".to_string(),
                phase_index: 0,
                min_green_time: 10,
                max_green_time: 40,
                yellow: 3,
                red_clear: 2,
                weight: 0.5,
                lamps: vec![lamp("north")],
            },
            StageConfig {
                id: 2,
                old_id: "B".to_string(),
                phase_index: 1,
                min_green_time: 10,
                max_green_time: 40,
                yellow: 3,
                red_clear: 2,
                weight: 0.5,
                lamps: vec![lamp("east")],
            },
        ],
        roads: vec![
            RoadConfig {
                direction: "north".to_string(),
                number_of_lanes: 1,
                flows: vec![FlowConfig {
                    direction: "north".to_string(),
                    route: "straight".to_string(),
                    lane: format!("{}_n_0", tl_id),
                }],
            },
            RoadConfig {
                direction: "east".to_string(),
                number_of_lanes: 1,
                flows: vec![FlowConfig {
                    direction: "east".to_string(),
                    route: "straight".to_string(),
                    lane: format!("{}_e_0", tl_id),
                }],
            },
        ],
    }
}

/// A small two-intersection network with matching configurations, used by
/// the demo binary and the integration-style tests.
pub fn create_demo_network() -> (SimulatedEngine, Vec<IntersectionConfig>) {
    let engine = SimulatedEngine::new();
    let mut configs = Vec::new();

    for (tl_id, north_rate, east_rate) in [("tl_1", 0.35, 0.10), ("tl_2", 0.15, 0.25)] {
        engine.add_traffic_light(
            tl_id,
            two_stage_program(20.0, 3.0, 2.0),
            vec![
                (format!("{}_n_0", tl_id), north_rate),
                (format!("{}_e_0", tl_id), east_rate),
            ],
        );
        configs.push(demo_intersection_config(tl_id));
    }

    (engine, configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_advances_phase_when_duration_elapses() {
        let engine = SimulatedEngine::new();
        engine.add_traffic_light("tl_1", two_stage_program(2.0, 1.0, 1.0), vec![]);
        engine.start().unwrap();

        assert_eq!(engine.phase("tl_1").unwrap(), 0);
        engine.step().unwrap();
        engine.step().unwrap();
        assert_eq!(engine.phase("tl_1").unwrap(), 1);
        assert_eq!(engine.red_yellow_green_state("tl_1").unwrap(), "yyrr");
    }

    #[test]
    fn forced_state_masks_program_until_phase_write() {
        let engine = SimulatedEngine::new();
        engine.add_traffic_light("tl_1", two_stage_program(1.0, 1.0, 1.0), vec![]);
        engine.start().unwrap();

        engine.set_red_yellow_green_state("tl_1", "rrrr").unwrap();
        for _ in 0..5 {
            engine.step().unwrap();
        }
        assert_eq!(engine.red_yellow_green_state("tl_1").unwrap(), "rrrr");
        // The stored program is untouched by the forced write.
        assert_eq!(engine.program_logic("tl_1").unwrap().phases.len(), 6);

        engine.set_phase("tl_1", 0).unwrap();
        assert_eq!(engine.red_yellow_green_state("tl_1").unwrap(), "GGrr");
    }

    #[test]
    fn calls_fail_after_close() {
        let engine = SimulatedEngine::new();
        engine.add_traffic_light("tl_1", two_stage_program(1.0, 1.0, 1.0), vec![]);
        engine.start().unwrap();
        engine.close().unwrap();
        assert!(matches!(engine.step(), Err(EngineError::NotConnected)));
        assert!(matches!(engine.close(), Err(EngineError::NotConnected)));
    }

    #[test]
    fn engine_built_from_configs_hosts_each_light() {
        let configs = create_demo_network().1;
        let engine = engine_from_configs(&configs);
        engine.start().unwrap();

        assert_eq!(engine.traffic_light_ids().unwrap(), vec!["tl_1", "tl_2"]);

        let program = engine.program_logic("tl_1").unwrap();
        assert_eq!(program.phases.len(), 6);
        assert_eq!(program.phases[0].state, "GGrr");
        assert_eq!(program.phases[0].duration, 10.0);
        assert_eq!(program.phases[4].state, "rryy");

        assert_eq!(
            engine.incoming_lanes("tl_1").unwrap(),
            vec!["tl_1_n_0", "tl_1_e_0"]
        );
        // Lanes carry synthetic arrivals once stepped.
        engine.step().unwrap();
        assert!(engine.last_step_vehicle_count("tl_1_n_0").unwrap() >= 0.0);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let engine = SimulatedEngine::new();
        engine.start().unwrap();
        assert!(matches!(
            engine.phase("nope"),
            Err(EngineError::UnknownTrafficLight(_))
        ));
        assert!(matches!(
            engine.last_step_vehicle_count("nope"),
            Err(EngineError::UnknownLane(_))
        ));
    }
}
