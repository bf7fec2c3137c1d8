//! # Simulation engine
//!
//! Fabricates vehicle movement along a straight route. Each simulation is a
//! small state machine (`Initializing -> Running -> Completed | Stopped`)
//! owned by its own chain of scheduled ticks. A tick schedules its successor
//! only after its writes have settled, so ticks for one shipment never
//! overlap and samples are produced in route order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracking_core::geo::bearing_degrees;
use tracking_core::{
    BookingStatus, BookingStore, Clock, Coordinate, LocationSample, LocationStore, Provider,
    Result, ShipmentLocks, VehicleDirectory, VehicleStatus, bad_request, not_found,
};
use uuid::Uuid;

use crate::registry::{SimulationHandle, SimulationRegistry, SimulationStatus};
use crate::route;
use crate::scheduler::Scheduler;

/// Maximum simulated speed.
pub const MAX_SPEED_KMH: f64 = 120.0;
/// Half-width of the uniform speed jitter applied each tick.
pub const SPEED_JITTER_KMH: f64 = 10.0;
/// Accuracy reported for the stationary step-0 sample.
pub const INITIAL_ACCURACY_METERS: f64 = 5.0;

/// Resolved parameters for a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub tick_interval: Duration,
    pub average_speed_kmh: f64,
    pub steps: usize,
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(5_000),
            average_speed_kmh: 60.0,
            steps: 50,
            seed: None,
        }
    }
}

impl SimulationSettings {
    /// Overlays per-request options on these defaults.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a non-positive interval or step count,
    /// or a negative or non-finite average speed.
    pub fn apply(&self, options: &SimulationOptions) -> Result<Self> {
        let tick_interval =
            options.tick_interval_ms.map_or(self.tick_interval, Duration::from_millis);
        let average_speed_kmh = options.average_speed_kmh.unwrap_or(self.average_speed_kmh);
        let steps = options.steps.unwrap_or(self.steps);

        if tick_interval.is_zero() {
            return Err(bad_request!("tick interval must be positive"));
        }
        if steps == 0 {
            return Err(bad_request!("steps must be positive"));
        }
        if !average_speed_kmh.is_finite() || average_speed_kmh < 0.0 {
            return Err(bad_request!("average speed {average_speed_kmh} must be non-negative"));
        }

        Ok(Self { tick_interval, average_speed_kmh, steps, seed: options.seed.or(self.seed) })
    }
}

/// Optional per-request overrides for a simulation start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationOptions {
    pub tick_interval_ms: Option<u64>,
    pub average_speed_kmh: Option<f64>,
    pub steps: Option<usize>,
    pub seed: Option<u64>,
}

/// Returned to the caller of a successful start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStarted {
    pub run_id: Uuid,
    pub total_steps: usize,
    pub estimated_duration_minutes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationState {
    Initializing,
    Running,
    Completed,
    Stopped,
}

struct Shared<P> {
    provider: Arc<P>,
    registry: Arc<SimulationRegistry>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    locks: ShipmentLocks,
    defaults: SimulationSettings,
}

/// Starts, stops and drives shipment simulations.
pub struct SimulationEngine<P> {
    shared: Arc<Shared<P>>,
}

impl<P> Clone for SimulationEngine<P> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<P: Provider + 'static> SimulationEngine<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>, registry: Arc<SimulationRegistry>, scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>, locks: ShipmentLocks, defaults: SimulationSettings,
    ) -> Self {
        let shared = Shared { provider, registry, scheduler, clock, locks, defaults };
        Self { shared: Arc::new(shared) }
    }

    #[must_use]
    pub fn registry(&self) -> &SimulationRegistry {
        &self.shared.registry
    }

    /// Starts (or restarts) the simulation for `shipment_id`.
    ///
    /// Writes the step-0 sample, marks the shipment `in_transit` and schedules
    /// the first tick.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown shipment or vehicle, `Validation` for
    /// a shipment without coordinates or assigned vehicle or for bad options,
    /// `Conflict` under the reject restart policy, and `Persistence` when the
    /// initial writes fail.
    pub async fn start(
        &self, shipment_id: &str, options: &SimulationOptions,
    ) -> Result<SimulationStarted> {
        let shared = &self.shared;
        let settings = shared.defaults.apply(options)?;

        let booking = BookingStore::get_by_id(&*shared.provider, shipment_id)
            .await
            .context("loading booking")?
            .ok_or_else(|| not_found!("shipment {shipment_id} not found"))?;

        let Some((origin, destination)) = booking.endpoints() else {
            return Err(bad_request!("shipment {shipment_id} is missing origin or destination"));
        };
        let Some(vehicle_id) = booking.vehicle_id.filter(|id| !id.trim().is_empty()) else {
            return Err(bad_request!("shipment {shipment_id} has no assigned vehicle"));
        };
        if !VehicleDirectory::exists(&*shared.provider, &vehicle_id)
            .await
            .context("checking vehicle")?
        {
            return Err(not_found!("vehicle {vehicle_id} not found"));
        }

        let route = route::interpolate(origin, destination, settings.steps)?;
        let total_steps = route.len();
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let progress = Arc::new(AtomicUsize::new(0));

        let handle = SimulationHandle {
            run_id,
            vehicle_id: vehicle_id.clone(),
            total_steps,
            tick_interval: settings.tick_interval,
            average_speed_kmh: settings.average_speed_kmh,
            started_at: shared.clock.now(),
            current_step: Arc::clone(&progress),
            cancel: cancel.clone(),
        };
        shared.registry.start(shipment_id, handle).await?;

        let mut simulation = Simulation {
            shipment_id: shipment_id.to_string(),
            vehicle_id,
            run_id,
            route,
            step: 0,
            rng: settings.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
            settings,
            state: SimulationState::Initializing,
            progress,
            cancel,
        };

        if let Err(err) = simulation.begin(shared).await {
            shared.registry.complete(shipment_id, run_id).await;
            return Err(err.into());
        }
        simulation.state = SimulationState::Running;

        #[allow(clippy::cast_precision_loss)]
        let estimated_duration_minutes =
            total_steps as f64 * simulation.settings.tick_interval.as_secs_f64() / 60.0;

        info!(
            shipment_id,
            vehicle_id = %simulation.vehicle_id,
            %run_id,
            total_steps,
            tick_interval = ?simulation.settings.tick_interval,
            "simulation started"
        );

        schedule_tick(Arc::clone(&self.shared), simulation);
        Ok(SimulationStarted { run_id, total_steps, estimated_duration_minutes })
    }

    /// Cancels the pending tick and forgets the simulation. The shipment's
    /// status is left as is.
    pub async fn stop(&self, shipment_id: &str) -> bool {
        let stopped = self.shared.registry.stop(shipment_id).await;
        if stopped {
            info!(shipment_id, "simulation stopped");
        } else {
            debug!(shipment_id, "no simulation to stop");
        }
        stopped
    }

    pub async fn list_active(&self) -> Vec<String> {
        self.shared.registry.list_active().await
    }

    pub async fn status(&self, shipment_id: &str) -> Option<SimulationStatus> {
        self.shared.registry.status(shipment_id).await
    }

    /// Cancels every running simulation.
    pub async fn shutdown(&self) -> usize {
        self.shared.registry.shutdown().await
    }
}

enum Tick {
    Continue,
    Finished,
}

// Per-run state, moved from tick to tick and never shared.
struct Simulation {
    shipment_id: String,
    vehicle_id: String,
    run_id: Uuid,
    route: Vec<Coordinate>,
    step: usize,
    settings: SimulationSettings,
    rng: StdRng,
    state: SimulationState,
    progress: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl Simulation {
    async fn begin<P: Provider>(&self, shared: &Shared<P>) -> anyhow::Result<()> {
        let _guard = shared.locks.lock(&self.shipment_id).await;
        let sample = self.initial_sample(shared.clock.now());
        let origin = sample.coordinates;

        let provider = &*shared.provider;
        LocationStore::append(provider, sample).await.context("writing initial sample")?;
        BookingStore::update_current_location(provider, &self.shipment_id, origin)
            .await
            .context("caching initial location")?;
        BookingStore::update_status(provider, &self.shipment_id, BookingStatus::InTransit)
            .await
            .context("marking shipment in transit")?;
        Ok(())
    }

    async fn tick<P: Provider>(&mut self, shared: &Shared<P>) -> Tick {
        let current = shared.registry.is_current(&self.shipment_id, self.run_id).await;
        if self.cancel.is_cancelled() || !current {
            self.state = SimulationState::Stopped;
            return Tick::Finished;
        }

        self.step += 1;
        self.progress.store(self.step, Ordering::Release);

        if self.step >= self.route.len() {
            self.complete(shared).await;
            return Tick::Finished;
        }

        let _guard = shared.locks.lock(&self.shipment_id).await;
        let sample = self.next_sample(shared.clock.now());
        debug!(
            shipment_id = %self.shipment_id,
            step = self.step,
            speed_kmh = sample.speed_kmh,
            status = ?sample.status,
            "simulation tick"
        );

        if let Err(err) = self.persist(shared, sample).await {
            // a failed tick is skipped, the next one still runs
            error!(
                monotonic_counter.simulation_tick_failures = 1,
                shipment_id = %self.shipment_id,
                step = self.step,
                error = %tracking_core::Error::from(err),
                "simulation tick failed"
            );
        }
        Tick::Continue
    }

    async fn persist<P: Provider>(
        &self, shared: &Shared<P>, sample: LocationSample,
    ) -> anyhow::Result<()> {
        let position = sample.coordinates;
        LocationStore::append(&*shared.provider, sample)
            .await
            .context("writing simulated sample")?;
        BookingStore::update_current_location(&*shared.provider, &self.shipment_id, position)
            .await
            .context("caching current location")?;
        Ok(())
    }

    async fn complete<P: Provider>(&mut self, shared: &Shared<P>) {
        // deregister under the shipment lock so a restart's writes always follow delivery
        let _guard = shared.locks.lock(&self.shipment_id).await;
        if !shared.registry.complete(&self.shipment_id, self.run_id).await {
            // replaced or stopped while the final tick was pending
            self.state = SimulationState::Stopped;
            return;
        }
        self.state = SimulationState::Completed;

        let delivered_at = shared.clock.now();
        let result = async {
            BookingStore::update_status(
                &*shared.provider,
                &self.shipment_id,
                BookingStatus::Delivered,
            )
            .await
            .context("marking shipment delivered")?;
            BookingStore::set_actual_delivery_time(
                &*shared.provider,
                &self.shipment_id,
                delivered_at,
            )
            .await
            .context("recording delivery time")
        }
        .await;

        match result {
            Ok(()) => {
                info!(
                    shipment_id = %self.shipment_id,
                    run_id = %self.run_id,
                    "simulation completed"
                );
            }
            Err(err) => error!(
                monotonic_counter.simulation_completion_failures = 1,
                shipment_id = %self.shipment_id,
                error = %tracking_core::Error::from(err),
                "simulation completed but delivery could not be recorded"
            ),
        }
    }

    fn initial_sample(&self, timestamp: DateTime<Utc>) -> LocationSample {
        let origin = self.route[0];
        let heading = self.route.get(1).map_or(0.0, |next| bearing_degrees(origin, *next));
        self.sample(
            origin,
            0.0,
            heading,
            0.0,
            INITIAL_ACCURACY_METERS,
            VehicleStatus::Stopped,
            timestamp,
        )
    }

    fn next_sample(&mut self, timestamp: DateTime<Utc>) -> LocationSample {
        let current = self.route[self.step];
        let next = self.route.get(self.step + 1).copied().unwrap_or(current);

        let jitter = self.rng.gen_range(-SPEED_JITTER_KMH..=SPEED_JITTER_KMH);
        let speed_kmh = (self.settings.average_speed_kmh + jitter).clamp(0.0, MAX_SPEED_KMH);
        let accuracy_meters = self.rng.gen_range(5.0..=20.0);
        let altitude = self.rng.gen_range(0.0..=100.0);

        self.sample(
            current,
            speed_kmh,
            bearing_degrees(current, next),
            altitude,
            accuracy_meters,
            VehicleStatus::from_speed(speed_kmh),
            timestamp,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn sample(
        &self, coordinates: Coordinate, speed_kmh: f64, heading_degrees: f64, altitude: f64,
        accuracy_meters: f64, status: VehicleStatus, timestamp: DateTime<Utc>,
    ) -> LocationSample {
        LocationSample {
            id: Uuid::new_v4(),
            shipment_id: self.shipment_id.clone(),
            vehicle_id: self.vehicle_id.clone(),
            coordinates,
            speed_kmh,
            heading_degrees,
            altitude,
            accuracy_meters,
            status,
            timestamp,
            source_simulated: true,
        }
    }
}

// Hands the simulation to the scheduler for its next tick. The simulation
// value moves into the task, so only the tick itself ever mutates it.
fn schedule_tick<P: Provider + 'static>(shared: Arc<Shared<P>>, mut simulation: Simulation) {
    if simulation.cancel.is_cancelled() {
        simulation.state = SimulationState::Stopped;
        debug!(shipment_id = %simulation.shipment_id, "simulation cancelled before next tick");
        return;
    }

    let delay = simulation.settings.tick_interval;
    let cancel = simulation.cancel.clone();
    let scheduler = Arc::clone(&shared.scheduler);

    scheduler.schedule(
        delay,
        cancel,
        Box::pin(async move {
            match simulation.tick(&shared).await {
                Tick::Continue => schedule_tick(shared, simulation),
                Tick::Finished => {
                    debug!(
                        shipment_id = %simulation.shipment_id,
                        state = ?simulation.state,
                        "simulation finished"
                    );
                }
            }
        }),
    );
}
