// src/shared_data.rs

use crate::control::TrafficControlMode;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A traffic movement served during a stage: one direction + route pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lamp {
    pub direction: String,
    pub route: String,
}

/// One signal stage: a group of movements that share green time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: u64,
    #[serde(default)]
    pub old_id: String,
    pub weight: f64,
    pub min_green_time: i32,
    pub max_green_time: i32,
    pub yellow: i32,
    pub red_clear: i32,
    #[serde(default)]
    pub lamps: Vec<Lamp>,
}

/// A measured flow for one movement, keyed by the lane it was sampled from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowData {
    pub direction: String,
    pub route: String,
    /// Flow rate in vehicles per hour.
    pub flow_data: f64,
    pub lane: String,
}

/// An approach road with its declared movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Road {
    pub direction: String,
    pub number_of_lanes: i32,
    pub flows: Vec<FlowData>,
}

/// Everything the Webster optimizer needs for one intersection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsterInput {
    pub saturation_volume: f64,
    pub stages: Vec<Stage>,
    pub roads: Vec<Road>,
}

/// Per-stage result of a Webster run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutput {
    pub stage_id: u64,
    #[serde(default)]
    pub old_id: String,
    pub green_time: i32,
    pub red_clear_time: i32,
    pub yellow_time: i32,
}

/// Final Webster plan: cycle length plus the green time for every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsterOutput {
    pub cycle_length: f64,
    pub effective_green_times: Vec<StageOutput>,
}

/// Published after a retiming pass has rewritten an intersection's program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetimingUpdate {
    pub timestamp: u64,
    pub intersection_id: String,
    pub cycle_length: f64,
    pub stages: Vec<StageOutput>,
}

/// Operator command consumed from the control queue. A missing
/// intersection id means "apply to every intersection".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlCommand {
    #[serde(default)]
    pub intersection_id: Option<String>,
    pub mode: TrafficControlMode,
}

/// Outcome of a control command, published back to the response queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub current_mode: Option<TrafficControlMode>,
    pub timestamp: u64,
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
