// communication/messaging.rs

use crate::control::TrafficControlService;
use crate::global_variables::{
    AMQP_URL, QUEUE_CONTROL_COMMANDS, QUEUE_CONTROL_RESPONSES, QUEUE_RETIMING_UPDATES,
};
use crate::shared_data::{current_timestamp, ControlCommand, ControlResponse};
use crate::simulation::SimulationService;
use amiquip::{
    Connection, ConsumerMessage, ConsumerOptions, Exchange, Publish, QueueDeclareOptions,
    Result as AmiquipResult,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::task;

/// Runs the driver loop and publishes every applied retiming plan as JSON
/// to the `retiming_updates` queue. The AMQP channel is not `Sync`, so the
/// whole tick-and-publish loop runs on a blocking thread and must never be
/// held across an await point.
pub async fn run_simulation_with_messaging(
    service: Arc<SimulationService>,
) -> AmiquipResult<()> {
    task::spawn_blocking(move || -> AmiquipResult<()> {
        let mut connection = Connection::insecure_open(AMQP_URL)?;
        let channel = connection.open_channel(None)?;
        let exchange = Exchange::direct(&channel);
        channel.queue_declare(QUEUE_RETIMING_UPDATES, QueueDeclareOptions::default())?;

        loop {
            for update in service.step_once() {
                match serde_json::to_vec(&update) {
                    Ok(payload) => {
                        exchange.publish(Publish::new(&payload, QUEUE_RETIMING_UPDATES))?;
                        log::info!(
                            "Published retiming update for {} (cycle {} seconds)",
                            update.intersection_id,
                            update.cycle_length
                        );
                    }
                    Err(e) => log::error!("Failed to serialize retiming update: {}", e),
                }
            }
            thread::sleep(Duration::from_secs_f64(service.step_length()));
        }
    })
    .await
    .unwrap()
}

/// Consumes operator commands from the `control_commands` queue and applies
/// them through the control service, publishing the outcome of each command
/// to the `control_responses` queue.
pub async fn start_control_listener(control: Arc<TrafficControlService>) -> AmiquipResult<()> {
    task::spawn_blocking(move || -> AmiquipResult<()> {
        let mut connection = Connection::insecure_open(AMQP_URL)?;
        let channel = connection.open_channel(None)?;
        let exchange = Exchange::direct(&channel);
        let queue = channel.queue_declare(QUEUE_CONTROL_COMMANDS, QueueDeclareOptions::default())?;
        let consumer = queue.consume(ConsumerOptions::default())?;
        log::info!(
            "[Control] Waiting for commands on '{}'...",
            QUEUE_CONTROL_COMMANDS
        );

        channel.queue_declare(QUEUE_CONTROL_RESPONSES, QueueDeclareOptions::default())?;

        for message in consumer.receiver() {
            match message {
                ConsumerMessage::Delivery(delivery) => {
                    if let Ok(json_str) = std::str::from_utf8(&delivery.body) {
                        match serde_json::from_str::<ControlCommand>(json_str) {
                            Ok(command) => {
                                log::info!("[Control] Got command: {:?}", command);
                                let result = match &command.intersection_id {
                                    Some(tl_id) => control.set_mode(tl_id, command.mode),
                                    None => control.set_mode_all(command.mode),
                                };
                                let response = match result {
                                    Ok(mode) => ControlResponse {
                                        success: true,
                                        message: format!("Control mode set to {:?}", mode),
                                        current_mode: Some(mode),
                                        timestamp: current_timestamp(),
                                    },
                                    Err(e) => ControlResponse {
                                        success: false,
                                        message: e.to_string(),
                                        current_mode: None,
                                        timestamp: current_timestamp(),
                                    },
                                };
                                if let Ok(json) = serde_json::to_string(&response) {
                                    exchange.publish(Publish::new(
                                        json.as_bytes(),
                                        QUEUE_CONTROL_RESPONSES,
                                    ))?;
                                }
                            }
                            Err(e) => {
                                log::warn!("[Control] Ignoring malformed command: {}", e);
                            }
                        }
                    }
                    consumer.ack(delivery)?;
                }
                other => {
                    log::info!("[Control] Consumer ended: {:?}", other);
                    break;
                }
            }
        }
        connection.close()
    })
    .await
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimulatorSettings, WebsterSettings};
    use crate::engine::simulated::create_demo_network;
    use crate::engine::EngineService;

    // The demo binary hands both entry points to tokio::spawn, so their
    // futures must be Send. Building a future does not poll it, so no
    // broker connection is attempted here.
    #[test]
    fn messaging_futures_can_be_spawned() {
        fn require_send<F: std::future::Future + Send>(_: &F) {}

        let settings = SimulatorSettings::default();
        let (engine, configs) = create_demo_network();
        let engine_service = Arc::new(EngineService::new(Arc::new(engine), configs, &settings));
        let control = Arc::new(TrafficControlService::new(Arc::clone(&engine_service)));
        let service = Arc::new(SimulationService::new(
            engine_service,
            Arc::clone(&control),
            &settings,
            WebsterSettings::default(),
        ));

        require_send(&run_simulation_with_messaging(service));
        require_send(&start_control_listener(control));
    }
}
