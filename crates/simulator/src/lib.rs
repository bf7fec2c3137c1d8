//! # Simulator
//!
//! Drives simulated vehicle movement for shipments: straight-line route
//! interpolation, a registry enforcing one live simulation per shipment, and
//! an engine that emits location samples on a schedule until the destination
//! is reached.

pub mod engine;
pub mod registry;
pub mod route;
pub mod scheduler;

pub use crate::engine::{
    SimulationEngine, SimulationOptions, SimulationSettings, SimulationStarted, SimulationState,
};
pub use crate::registry::{RestartPolicy, SimulationRegistry, SimulationStatus};
pub use crate::route::{Route, interpolate};
pub use crate::scheduler::{ManualScheduler, Scheduler, Task, TokioScheduler};
