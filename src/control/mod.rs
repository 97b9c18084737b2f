// control/mod.rs
pub mod service;

pub use service::{ControlError, TrafficControlService};

use serde::{Deserialize, Serialize};

/// Operational modes for traffic light control. `NextPhase` is transient:
/// it performs a one-shot phase advance and always resolves to `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficControlMode {
    /// All lamps red: an immediate stop for all traffic.
    Red,
    /// All lamps yellow: caution at the intersection.
    Yellow,
    /// The stored signal program runs with its own timings.
    Normal,
    /// Advance one stage block, then return to normal operation.
    NextPhase,
    /// All lamps dark, for maintenance or special events.
    LightsOff,
    /// Webster-driven retiming applied on the optimization cadence.
    Adaptive,
}
