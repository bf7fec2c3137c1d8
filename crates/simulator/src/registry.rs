//! # Simulation registry
//!
//! The registry is the sole owner of simulation handles and enforces at most
//! one live simulation per shipment. Every mutation goes through one async
//! mutex, so two concurrent starts for a shipment can never both install a
//! live timer.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracking_core::{Error, Result};
use uuid::Uuid;

/// What to do when a simulation is started for a shipment that already has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Cancel the running simulation and start over from step 0.
    #[default]
    Replace,
    /// Refuse with a `Conflict` error and leave the running simulation alone.
    Reject,
}

impl FromStr for RestartPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" | "restart" => Ok(Self::Replace),
            "reject" | "conflict" => Ok(Self::Reject),
            other => Err(Error::Configuration(format!("unknown restart policy `{other}`"))),
        }
    }
}

impl Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace => f.write_str("replace"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

/// Registry-side record of a running simulation.
#[derive(Debug)]
pub struct SimulationHandle {
    pub run_id: Uuid,
    pub vehicle_id: String,
    pub total_steps: usize,
    pub tick_interval: Duration,
    pub average_speed_kmh: f64,
    pub started_at: DateTime<Utc>,
    pub current_step: Arc<AtomicUsize>,
    pub cancel: CancellationToken,
}

impl SimulationHandle {
    fn status(&self, shipment_id: &str) -> SimulationStatus {
        SimulationStatus {
            shipment_id: shipment_id.to_string(),
            vehicle_id: self.vehicle_id.clone(),
            run_id: self.run_id,
            current_step: self.current_step.load(Ordering::Acquire),
            total_steps: self.total_steps,
            tick_interval_ms: u64::try_from(self.tick_interval.as_millis()).unwrap_or(u64::MAX),
            average_speed_kmh: self.average_speed_kmh,
            started_at: self.started_at,
        }
    }
}

/// Point-in-time view of a running simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatus {
    pub shipment_id: String,
    pub vehicle_id: String,
    pub run_id: Uuid,
    pub current_step: usize,
    pub total_steps: usize,
    pub tick_interval_ms: u64,
    pub average_speed_kmh: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SimulationRegistry {
    policy: RestartPolicy,
    active: Mutex<HashMap<String, SimulationHandle>>,
}

impl SimulationRegistry {
    #[must_use]
    pub fn new(policy: RestartPolicy) -> Self {
        Self { policy, active: Mutex::new(HashMap::new()) }
    }

    #[must_use]
    pub const fn policy(&self) -> RestartPolicy {
        self.policy
    }

    /// Installs `handle` for `shipment_id`, returning the run id it replaced.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when a simulation is already running and the policy
    /// is [`RestartPolicy::Reject`].
    pub async fn start(&self, shipment_id: &str, handle: SimulationHandle) -> Result<Option<Uuid>> {
        let mut active = self.active.lock().await;

        if let Some(existing) = active.get(shipment_id) {
            if self.policy == RestartPolicy::Reject {
                return Err(Error::Conflict(format!(
                    "simulation {} already running for shipment {shipment_id}",
                    existing.run_id
                )));
            }
            existing.cancel.cancel();
        }

        let run_id = handle.run_id;
        let replaced = active.insert(shipment_id.to_string(), handle).map(|prev| prev.run_id);
        if let Some(prev) = replaced {
            info!(shipment_id, %prev, %run_id, "simulation restarted");
        }
        Ok(replaced)
    }

    /// Cancels and removes the simulation for `shipment_id`.
    /// Returns `false` when there was nothing to stop.
    pub async fn stop(&self, shipment_id: &str) -> bool {
        let removed = self.active.lock().await.remove(shipment_id);
        removed.is_some_and(|handle| {
            handle.cancel.cancel();
            true
        })
    }

    /// Ids of shipments with a running simulation, sorted.
    pub async fn list_active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether `run_id` is still the registered simulation for `shipment_id`.
    pub async fn is_current(&self, shipment_id: &str, run_id: Uuid) -> bool {
        self.active
            .lock()
            .await
            .get(shipment_id)
            .is_some_and(|handle| handle.run_id == run_id && !handle.cancel.is_cancelled())
    }

    /// Deregisters a finished run. A run that has since been replaced or
    /// stopped leaves the registry untouched and returns `false`.
    pub async fn complete(&self, shipment_id: &str, run_id: Uuid) -> bool {
        let mut active = self.active.lock().await;
        if active.get(shipment_id).is_none_or(|handle| handle.run_id != run_id) {
            return false;
        }
        active.remove(shipment_id).is_some()
    }

    pub async fn status(&self, shipment_id: &str) -> Option<SimulationStatus> {
        self.active.lock().await.get(shipment_id).map(|handle| handle.status(shipment_id))
    }

    /// Cancels every simulation. Returns how many were running.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<_> = self.active.lock().await.drain().collect();
        for (_, handle) in &drained {
            handle.cancel.cancel();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "simulations cancelled on shutdown");
        }
        drained.len()
    }
}
