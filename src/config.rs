// src/config.rs

use crate::shared_data::Lamp;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Driver-level settings for the external engine and the retiming cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulatorSettings {
    /// Simulated seconds advanced per engine step.
    pub step_length: f64,
    /// Seconds between retiming passes. Also the flow window capacity,
    /// counted in samples (one sample per step), not wall-clock seconds.
    pub optimization_interval: u64,
    pub intersection_config_path: String,
}

impl SimulatorSettings {
    /// Retiming cadence, with a zero value from a bad settings file replaced
    /// by the default so the driver keeps running instead of dividing by zero.
    pub fn optimization_interval_or_default(&self) -> u64 {
        if self.optimization_interval == 0 {
            let fallback = Self::default().optimization_interval;
            log::warn!(
                "optimizationInterval must be at least 1, using {} seconds",
                fallback
            );
            fallback
        } else {
            self.optimization_interval
        }
    }
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            step_length: 1.0,
            optimization_interval: 300,
            intersection_config_path: "config/intersections.json".to_string(),
        }
    }
}

/// Calibration constants for the Webster computation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebsterSettings {
    pub default_saturation_volume: f64,
    pub base_lost_time: i32,
    pub min_green_time_per_stage: i32,
}

impl Default for WebsterSettings {
    fn default() -> Self {
        Self {
            default_saturation_volume: 1900.0,
            base_lost_time: 15,
            min_green_time_per_stage: 15,
        }
    }
}

/// Static per-intersection configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionConfig {
    /// Identifier of the traffic light in the engine.
    pub engine_id: String,
    /// Legacy display identifier.
    #[serde(default)]
    pub intersection_id: String,
    pub saturation_volume: f64,
    pub stages: Vec<StageConfig>,
    pub roads: Vec<RoadConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub id: u64,
    #[serde(default)]
    pub old_id: String,
    /// Which phase block of the engine program this stage occupies.
    pub phase_index: usize,
    pub min_green_time: i32,
    pub max_green_time: i32,
    pub yellow: i32,
    pub red_clear: i32,
    pub weight: f64,
    pub lamps: Vec<Lamp>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadConfig {
    pub direction: String,
    pub number_of_lanes: i32,
    pub flows: Vec<FlowConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowConfig {
    pub direction: String,
    pub route: String,
    /// Lane the live occupancy samples for this movement are keyed by.
    pub lane: String,
}

impl IntersectionConfig {
    /// Checks the structural invariants the optimizer and the retiming
    /// loop rely on. Returns the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.saturation_volume <= 0.0 {
            return Err(format!(
                "saturation volume must be positive, got {}",
                self.saturation_volume
            ));
        }
        if self.stages.is_empty() {
            return Err("intersection has no stages".to_string());
        }
        for stage in &self.stages {
            if stage.min_green_time > stage.max_green_time {
                return Err(format!(
                    "stage {}: min green time {} exceeds max green time {}",
                    stage.id, stage.min_green_time, stage.max_green_time
                ));
            }
            if stage.lamps.is_empty() {
                return Err(format!("stage {}: no movements declared", stage.id));
            }
        }
        Ok(())
    }
}

/// Loads the intersection configuration array. Malformed or invalid entries
/// are logged and skipped so one bad intersection does not take down the rest.
pub fn load_intersection_configs(path: &Path) -> Result<Vec<IntersectionConfig>, ConfigError> {
    let raw = fs::read_to_string(path)?;
    parse_intersection_configs(&raw)
}

pub fn parse_intersection_configs(raw: &str) -> Result<Vec<IntersectionConfig>, ConfigError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut configs = Vec::new();

    for entry in entries {
        match serde_json::from_value::<IntersectionConfig>(entry) {
            Ok(config) => match config.validate() {
                Ok(()) => {
                    log::info!("Loaded intersection configuration: {}", config.engine_id);
                    configs.push(config);
                }
                Err(reason) => {
                    log::warn!(
                        "Skipping intersection configuration {}: {}",
                        config.engine_id,
                        reason
                    );
                }
            },
            Err(e) => {
                log::warn!("Skipping malformed intersection configuration: {}", e);
            }
        }
    }

    log::info!("Loaded {} intersection configurations", configs.len());
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "engineId": "tl_1",
            "intersectionId": "legacy_1",
            "saturationVolume": 1900,
            "stages": [
                {
                    "id": 1,
                    "oldId": "A",
                    "phaseIndex": 0,
                    "minGreenTime": 15,
                    "maxGreenTime": 40,
                    "yellow": 3,
                    "redClear": 2,
                    "weight": 1.0,
                    "lamps": [{"direction": "north", "route": "straight"}]
                }
            ],
            "roads": [
                {
                    "direction": "north",
                    "numberOfLanes": 2,
                    "flows": [
                        {"direction": "north", "route": "straight", "lane": "n_0"}
                    ]
                }
            ]
        },
        {"engineId": "broken"}
    ]"#;

    #[test]
    fn parses_valid_entries_and_skips_malformed_ones() {
        let configs = parse_intersection_configs(SAMPLE).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].engine_id, "tl_1");
        assert_eq!(configs[0].stages[0].lamps[0].route, "straight");
    }

    #[test]
    fn rejects_inverted_green_bounds() {
        let mut config = parse_intersection_configs(SAMPLE).unwrap().remove(0);
        config.stages[0].min_green_time = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_settings_match_field_calibration() {
        let webster = WebsterSettings::default();
        assert_eq!(webster.base_lost_time, 15);
        assert_eq!(webster.min_green_time_per_stage, 15);
        assert_eq!(webster.default_saturation_volume, 1900.0);

        let sim = SimulatorSettings::default();
        assert_eq!(sim.optimization_interval, 300);
        assert_eq!(sim.step_length, 1.0);
    }

    #[test]
    fn zero_optimization_interval_is_replaced_by_the_default() {
        let settings = SimulatorSettings {
            optimization_interval: 0,
            ..SimulatorSettings::default()
        };
        assert_eq!(settings.optimization_interval_or_default(), 300);

        let settings = SimulatorSettings {
            optimization_interval: 60,
            ..SimulatorSettings::default()
        };
        assert_eq!(settings.optimization_interval_or_default(), 60);
    }
}
