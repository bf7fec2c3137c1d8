//! # Shipment Tracker
//!
//! The GPS tracking and simulation engine of a logistics booking platform.
//!
//! [`TrackingService`] is the surface adapters call: it starts and stops
//! per-shipment route simulations, records device-reported positions and
//! answers "where is this shipment now" with progress and ETA. Persistence is
//! delegated to the [`Provider`] collaborator traits.

mod access;
mod config;
pub mod provider;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
pub use simulator::{
    ManualScheduler, RestartPolicy, Scheduler, SimulationOptions, SimulationStarted,
    SimulationStatus, TokioScheduler,
};
use simulator::{SimulationEngine, SimulationRegistry};
use tracing::info;
pub use tracking::{FleetEntry, ProgressSnapshot, ShipmentLocation};
use tracking::{IngestionEndpoint, ProgressEstimator, TrackingQueryService};
pub use tracking_core::{
    Booking, BookingStatus, Clock, Coordinate, Driver, Error, HistoryFilter, LocationSample,
    Provider, Result, SystemClock, Telemetry, Vehicle, VehicleStatus,
};
use tracking_core::ShipmentLocks;

pub use crate::access::{Requester, Role};
pub use crate::config::Config;
pub use crate::provider::InMemoryProvider;

/// History request as received from an adapter. A missing limit falls back
/// to the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    const fn filter(&self, default_limit: usize) -> HistoryFilter {
        HistoryFilter {
            limit: match self.limit {
                Some(limit) => limit,
                None => default_limit,
            },
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

pub struct TrackingService<P> {
    config: Config,
    engine: SimulationEngine<P>,
    query: TrackingQueryService<P>,
    ingest: IngestionEndpoint<P>,
}

impl<P: Provider + 'static> TrackingService<P> {
    /// Creates a service driven by the tokio runtime and the system clock.
    #[must_use]
    pub fn new(provider: Arc<P>, config: Config) -> Self {
        Self::with_runtime(provider, config, Arc::new(TokioScheduler), Arc::new(SystemClock))
    }

    /// Creates a service with an explicit scheduler and clock.
    #[must_use]
    pub fn with_runtime(
        provider: Arc<P>, config: Config, scheduler: Arc<dyn Scheduler>, clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = ShipmentLocks::new();
        let registry = Arc::new(SimulationRegistry::new(config.restart_policy));

        let engine = SimulationEngine::new(
            Arc::clone(&provider),
            registry,
            scheduler,
            Arc::clone(&clock),
            locks.clone(),
            config.simulation_settings(),
        );
        let query = TrackingQueryService::new(Arc::clone(&provider), Arc::clone(&clock))
            .with_estimator(ProgressEstimator::new(config.eta_fallback_speed_kmh));
        let ingest = IngestionEndpoint::new(provider, clock, locks);

        Self { config, engine, query, ingest }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Starts (or restarts) the route simulation for a shipment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown shipment or vehicle, `Validation`
    /// for missing coordinates, a missing vehicle or bad options, `Conflict`
    /// when the restart policy rejects a duplicate start, and `Persistence`
    /// when the initial writes fail.
    pub async fn start_simulation(
        &self, shipment_id: &str, options: &SimulationOptions,
    ) -> Result<SimulationStarted> {
        self.engine.start(shipment_id, options).await
    }

    /// Returns `false` when no simulation was running.
    pub async fn stop_simulation(&self, shipment_id: &str) -> bool {
        self.engine.stop(shipment_id).await
    }

    pub async fn list_active_simulations(&self) -> Vec<String> {
        self.engine.list_active().await
    }

    pub async fn simulation_status(&self, shipment_id: &str) -> Option<SimulationStatus> {
        self.engine.status(shipment_id).await
    }

    /// Latest position merged with booking details and progress.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown shipment or one without samples and
    /// `Forbidden` when the requester may not see the shipment.
    pub async fn current_location(
        &self, requester: &Requester, shipment_id: &str,
    ) -> Result<ShipmentLocation> {
        let booking = self.query.booking(shipment_id).await?;
        requester.authorize_shipment(&booking)?;
        self.query.shipment_location(shipment_id).await
    }

    /// Shipment history, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a bad window or limit, `NotFound` for an
    /// unknown shipment and `Forbidden` when the requester may not see it.
    pub async fn history(
        &self, requester: &Requester, shipment_id: &str, query: &HistoryQuery,
    ) -> Result<Vec<LocationSample>> {
        let booking = self.query.booking(shipment_id).await?;
        requester.authorize_shipment(&booking)?;
        self.query.history(shipment_id, &query.filter(self.config.history_default_limit)).await
    }

    /// Vehicle history across shipments. Admin only.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admins, `Validation` for a bad window or
    /// limit and `NotFound` for an unknown vehicle.
    pub async fn vehicle_history(
        &self, requester: &Requester, vehicle_id: &str, query: &HistoryQuery,
    ) -> Result<Vec<LocationSample>> {
        requester.require_admin("read vehicle history")?;
        let filter = query.filter(self.config.history_default_limit);
        self.query.vehicle_history(vehicle_id, &filter).await
    }

    /// Every in-transit shipment with a known position. Admin only.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admins and `Persistence` when a store fails.
    pub async fn active_fleet(&self, requester: &Requester) -> Result<Vec<FleetEntry>> {
        requester.require_admin("view the active fleet")?;
        self.query.active_fleet().await
    }

    /// Records a device-reported position.
    ///
    /// When `device_overrides_simulation` is configured, a successful report
    /// also stops the shipment's running simulation.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for bad coordinates or telemetry, `NotFound` for
    /// an unknown shipment or vehicle and `Persistence` when a write fails.
    pub async fn record_device_location(
        &self, shipment_id: &str, vehicle_id: &str, coordinates: Coordinate,
        telemetry: &Telemetry,
    ) -> Result<LocationSample> {
        let sample = self.ingest.record(shipment_id, vehicle_id, coordinates, telemetry).await?;

        if self.config.device_overrides_simulation && self.engine.stop(shipment_id).await {
            info!(shipment_id, vehicle_id, "device report superseded running simulation");
        }
        Ok(sample)
    }

    /// Cancels every running simulation. Returns how many were running.
    pub async fn shutdown(&self) -> usize {
        self.engine.shutdown().await
    }
}
