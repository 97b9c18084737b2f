// simulation_main.rs
use adaptive_signal_control::communication::messaging::{
    run_simulation_with_messaging, start_control_listener,
};
use adaptive_signal_control::config::{
    load_intersection_configs, IntersectionConfig, SimulatorSettings, WebsterSettings,
};
use adaptive_signal_control::control::{TrafficControlMode, TrafficControlService};
use adaptive_signal_control::engine::simulated::{create_demo_network, engine_from_configs};
use adaptive_signal_control::engine::{EngineService, SimulatedEngine};
use adaptive_signal_control::simulation::SimulationService;
use std::path::Path;
use std::sync::Arc;
use tokio::join;

/// Loads the configured intersection file when it yields usable entries,
/// and falls back to the built-in demo network otherwise.
fn build_network(settings: &SimulatorSettings) -> (SimulatedEngine, Vec<IntersectionConfig>) {
    let path = Path::new(&settings.intersection_config_path);
    match load_intersection_configs(path) {
        Ok(configs) if !configs.is_empty() => {
            log::info!(
                "Loaded {} intersections from {}",
                configs.len(),
                path.display()
            );
            (engine_from_configs(&configs), configs)
        }
        Ok(_) => {
            log::warn!(
                "No usable intersections in {}, using the built-in demo network",
                path.display()
            );
            create_demo_network()
        }
        Err(e) => {
            log::warn!(
                "Could not load {}: {}; using the built-in demo network",
                path.display(),
                e
            );
            create_demo_network()
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    // Short cadence so the demo produces retiming updates quickly.
    let settings = SimulatorSettings {
        optimization_interval: 60,
        ..SimulatorSettings::default()
    };

    let (engine, configs) = build_network(&settings);
    let intersection_ids: Vec<String> = configs.iter().map(|c| c.engine_id.clone()).collect();

    let engine_service = Arc::new(EngineService::new(Arc::new(engine), configs, &settings));
    let control = Arc::new(TrafficControlService::new(Arc::clone(&engine_service)));
    let service = Arc::new(SimulationService::new(
        Arc::clone(&engine_service),
        Arc::clone(&control),
        &settings,
        WebsterSettings::default(),
    ));

    service.start_simulation().expect("start simulation");
    for tl_id in &intersection_ids {
        service
            .set_mode(tl_id, TrafficControlMode::Adaptive)
            .expect("enable adaptive mode");
    }

    let control_listener = tokio::spawn(async move {
        if let Err(e) = start_control_listener(control).await {
            eprintln!("Error in control command listener: {}", e);
        }
    });
    let simulation_loop = tokio::spawn(async move {
        if let Err(e) = run_simulation_with_messaging(service).await {
            eprintln!("Error in simulation loop: {}", e);
        }
    });

    let _ = join!(control_listener, simulation_loop);
}
