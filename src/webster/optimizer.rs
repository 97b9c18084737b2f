// webster/optimizer.rs

use crate::config::WebsterSettings;
use crate::shared_data::{Road, Stage, StageOutput, WebsterInput, WebsterOutput};
use std::collections::HashMap;

/// Computes a new cycle length and per-stage green split from aggregated
/// demand using Webster's minimum-delay formula. Pure function: no engine
/// access, usable standalone.
pub fn calculate_webster(input: &WebsterInput, settings: &WebsterSettings) -> WebsterOutput {
    log::info!(
        "Starting Webster calculation for intersection with {} stages",
        input.stages.len()
    );

    let number_of_stages = input.stages.len();
    let saturation_volume = if input.saturation_volume > 0.0 {
        input.saturation_volume
    } else {
        log::warn!(
            "Non-positive saturation volume ({}), using default {}",
            input.saturation_volume,
            settings.default_saturation_volume
        );
        settings.default_saturation_volume
    };
    log::debug!("Saturation volume: {}", saturation_volume);

    let total_yellow_and_red_clear: i32 = input
        .stages
        .iter()
        .map(|stage| stage.yellow + stage.red_clear)
        .sum();
    log::debug!(
        "Total yellow and all red-clear time: {}",
        total_yellow_and_red_clear
    );

    let stage_volumes = calculate_stage_volumes(&input.stages, &input.roads);
    let total_volume_of_all_stages: f64 = stage_volumes.values().sum();
    log::info!(
        "Total critical volume across all stages: {}",
        total_volume_of_all_stages
    );

    let cycle = calculate_cycle_time(
        number_of_stages,
        total_volume_of_all_stages,
        saturation_volume,
        settings,
    );
    log::info!("Initial calculated cycle time: {} seconds", cycle);

    // An oversaturated intersection yields a non-positive or non-finite
    // optimum; fall back to every stage's configured maximum so a bounded
    // plan always reaches the engine.
    if cycle <= 0.0 || !cycle.is_finite() {
        log::warn!(
            "Calculated cycle time is invalid ({}). Using fallback values.",
            cycle
        );
        let mut fallback_cycle = 0.0;
        let mut effective_green_times = Vec::with_capacity(number_of_stages);

        for stage in &input.stages {
            effective_green_times.push(StageOutput {
                stage_id: stage.id,
                old_id: stage.old_id.clone(),
                green_time: stage.max_green_time,
                red_clear_time: stage.red_clear,
                yellow_time: stage.yellow,
            });
            fallback_cycle += (stage.max_green_time + stage.red_clear + stage.yellow) as f64;
            log::debug!(
                "Stage {}: using max green time of {} seconds",
                stage.id,
                stage.max_green_time
            );
        }

        log::info!("Fallback cycle time: {} seconds", fallback_cycle);
        return WebsterOutput {
            cycle_length: fallback_cycle,
            effective_green_times,
        };
    }

    let total_min_green_time = number_of_stages as f64 * settings.min_green_time_per_stage as f64;
    let available_green_time =
        cycle - total_yellow_and_red_clear as f64 - total_min_green_time;
    log::debug!(
        "Available green time for distribution: {} seconds",
        available_green_time
    );

    let mut final_cycle = total_yellow_and_red_clear as f64;
    let mut effective_green_times = Vec::with_capacity(number_of_stages);

    for stage in &input.stages {
        let min_green_time = total_min_green_time * stage.weight;
        let current_stage_volume = stage_volumes.get(&stage.id).copied().unwrap_or(0.0);

        let mut green_time = if total_volume_of_all_stages > 0.0 {
            available_green_time * current_stage_volume / total_volume_of_all_stages
                + min_green_time
        } else {
            log::warn!(
                "Total volume is zero, using minimum green time for stage {}",
                stage.id
            );
            min_green_time
        };

        if !green_time.is_finite() {
            green_time = (stage.min_green_time + stage.max_green_time) as f64 / 2.0;
            log::warn!(
                "Invalid green time calculation for stage {}. Using average of min/max: {}",
                stage.id,
                green_time
            );
        }

        let final_green_time = green_time
            .max(stage.min_green_time as f64)
            .min(stage.max_green_time as f64)
            .round() as i32;

        effective_green_times.push(StageOutput {
            stage_id: stage.id,
            old_id: stage.old_id.clone(),
            green_time: final_green_time,
            red_clear_time: stage.red_clear,
            yellow_time: stage.yellow,
        });
        final_cycle += final_green_time as f64;
    }

    log::info!("Final calculated cycle time: {} seconds", final_cycle);
    WebsterOutput {
        cycle_length: final_cycle,
        effective_green_times,
    }
}

/// Per-stage critical volume: the maximum declared flow among the flow
/// declarations whose direction+route key matches one of the stage's
/// movements. Zero when no demand data matches.
fn calculate_stage_volumes(stages: &[Stage], roads: &[Road]) -> HashMap<u64, f64> {
    let mut direction_to_flows: HashMap<String, Vec<f64>> = HashMap::new();
    for road in roads {
        for flow in &road.flows {
            let key = format!("{} {}", flow.direction, flow.route);
            direction_to_flows.entry(key).or_default().push(flow.flow_data);
        }
    }

    let mut result = HashMap::new();
    for stage in stages {
        let mut critical_flow: f64 = 0.0;
        for lamp in &stage.lamps {
            let key = format!("{} {}", lamp.direction, lamp.route);
            if let Some(flows) = direction_to_flows.get(&key) {
                for &flow in flows {
                    if flow > critical_flow {
                        critical_flow = flow;
                    }
                }
            }
        }
        log::debug!("Stage ID: {}, Critical volume: {}", stage.id, critical_flow);
        result.insert(stage.id, critical_flow);
    }
    result
}

fn calculate_lost_time(number_of_stages: usize, settings: &WebsterSettings) -> f64 {
    // Each stage transition costs a fixed start-up loss on top of the
    // configured intersection-wide base loss.
    let lost_time = 2.0 * number_of_stages as f64 + settings.base_lost_time as f64;
    log::debug!(
        "Lost time calculated as {} seconds for {} stages",
        lost_time,
        number_of_stages
    );
    lost_time
}

fn calculate_cycle_time(
    number_of_stages: usize,
    total_volume_of_all_stages: f64,
    saturation_volume: f64,
    settings: &WebsterSettings,
) -> f64 {
    let lost_time = calculate_lost_time(number_of_stages, settings);
    let y_critical = total_volume_of_all_stages / saturation_volume;
    log::debug!("Critical flow ratio (Y): {}", y_critical);

    if y_critical >= 1.0 {
        log::warn!(
            "Critical flow ratio exceeds 1.0 ({}), indicating oversaturation",
            y_critical
        );
    }

    (1.5 * lost_time + 5.0) / (1.0 - y_critical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_data::{FlowData, Lamp};

    fn settings() -> WebsterSettings {
        WebsterSettings {
            default_saturation_volume: 1900.0,
            base_lost_time: 15,
            min_green_time_per_stage: 15,
        }
    }

    fn stage(id: u64, weight: f64, direction: &str) -> Stage {
        Stage {
            id,
            old_id: format!("old_{}", id),
            weight,
            min_green_time: 15,
            max_green_time: 40,
            yellow: 3,
            red_clear: 2,
            lamps: vec![Lamp {
                direction: direction.to_string(),
                route: "straight".to_string(),
            }],
        }
    }

    fn road(direction: &str, flow: f64, lane: &str) -> Road {
        Road {
            direction: direction.to_string(),
            number_of_lanes: 1,
            flows: vec![FlowData {
                direction: direction.to_string(),
                route: "straight".to_string(),
                flow_data: flow,
                lane: lane.to_string(),
            }],
        }
    }

    fn two_stage_input(volume_a: f64, volume_b: f64) -> WebsterInput {
        WebsterInput {
            saturation_volume: 1900.0,
            stages: vec![stage(1, 0.5, "north"), stage(2, 0.5, "east")],
            roads: vec![road("north", volume_a, "n_0"), road("east", volume_b, "e_0")],
        }
    }

    #[test]
    fn worked_example_matches_hand_calculation() {
        // L = 19, Y = 400/1900, C ~= 42.4, available green ~= 2.4.
        let output = calculate_webster(&two_stage_input(300.0, 100.0), &settings());

        assert_eq!(output.effective_green_times.len(), 2);
        assert_eq!(output.effective_green_times[0].green_time, 17);
        assert_eq!(output.effective_green_times[1].green_time, 16);
        assert_eq!(output.cycle_length, 43.0);
        assert_eq!(output.effective_green_times[0].stage_id, 1);
        assert_eq!(output.effective_green_times[0].old_id, "old_1");
        assert_eq!(output.effective_green_times[0].yellow_time, 3);
        assert_eq!(output.effective_green_times[0].red_clear_time, 2);
    }

    #[test]
    fn zero_volumes_fall_back_to_weighted_minimum_green() {
        let output = calculate_webster(&two_stage_input(0.0, 0.0), &settings());

        // totalMinGreen = 30, weight 0.5 each: 15 seconds per stage.
        for stage in &output.effective_green_times {
            assert_eq!(stage.green_time, 15);
        }
        assert_eq!(output.cycle_length, 40.0);
    }

    #[test]
    fn oversaturation_uses_max_green_fallback() {
        // Y = 4000/1900 > 1 gives a negative optimum cycle.
        let output = calculate_webster(&two_stage_input(3000.0, 1000.0), &settings());

        for stage in &output.effective_green_times {
            assert_eq!(stage.green_time, 40);
        }
        // Sum of (max green + yellow + red-clear) over both stages.
        assert_eq!(output.cycle_length, 2.0 * (40.0 + 3.0 + 2.0));
    }

    #[test]
    fn saturated_exactly_at_capacity_uses_max_green_fallback() {
        // Y = 1 makes the optimum cycle non-finite.
        let output = calculate_webster(&two_stage_input(1000.0, 900.0), &settings());
        for stage in &output.effective_green_times {
            assert_eq!(stage.green_time, 40);
        }
    }

    #[test]
    fn green_times_are_always_clamped_into_stage_bounds() {
        for (a, b) in [(0.0, 0.0), (100.0, 50.0), (900.0, 800.0), (1500.0, 200.0)] {
            let input = two_stage_input(a, b);
            let output = calculate_webster(&input, &settings());
            let mut expected_cycle = 0.0;
            for (stage, out) in input.stages.iter().zip(&output.effective_green_times) {
                assert!(out.green_time >= stage.min_green_time);
                assert!(out.green_time <= stage.max_green_time);
                expected_cycle += (out.green_time + stage.yellow + stage.red_clear) as f64;
            }
            assert_eq!(output.cycle_length, expected_cycle);
        }
    }

    #[test]
    fn critical_volume_is_max_over_matching_declarations() {
        // Two lanes serve the same movement; the busier one sets the demand.
        let mut input = two_stage_input(300.0, 100.0);
        input.roads[0].flows.push(FlowData {
            direction: "north".to_string(),
            route: "straight".to_string(),
            flow_data: 500.0,
            lane: "n_1".to_string(),
        });
        let volumes = calculate_stage_volumes(&input.stages, &input.roads);
        assert_eq!(volumes[&1], 500.0);
        assert_eq!(volumes[&2], 100.0);
    }

    #[test]
    fn unmatched_movements_contribute_zero_volume() {
        let mut input = two_stage_input(300.0, 100.0);
        input.stages[1].lamps[0].direction = "south".to_string();
        let volumes = calculate_stage_volumes(&input.stages, &input.roads);
        assert_eq!(volumes[&2], 0.0);
    }

    #[test]
    fn non_positive_saturation_volume_falls_back_to_default() {
        let mut input = two_stage_input(300.0, 100.0);
        input.saturation_volume = 0.0;
        let output = calculate_webster(&input, &settings());
        // Identical to the worked example once the default kicks in.
        assert_eq!(output.cycle_length, 43.0);
    }

    #[test]
    fn empty_stage_list_yields_empty_plan() {
        let input = WebsterInput {
            saturation_volume: 1900.0,
            stages: vec![],
            roads: vec![],
        };
        let output = calculate_webster(&input, &settings());
        assert!(output.effective_green_times.is_empty());
        assert_eq!(output.cycle_length, 0.0);
    }
}
