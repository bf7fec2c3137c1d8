//! # Tracking queries
//!
//! Current position, bounded history and the active fleet view. Every read
//! goes straight to the collaborator stores; nothing is cached here.

use std::sync::Arc;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tracking_core::{
    Booking, BookingStatus, BookingStore, Clock, Driver, HistoryFilter, LocationSample,
    LocationStore, Provider, Result, ShipmentSummary, Vehicle, VehicleDirectory, not_found,
};

use crate::progress::{ProgressEstimator, ProgressSnapshot};

/// One row of the active fleet view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetEntry {
    pub shipment: ShipmentSummary,
    /// `None` when the assigned vehicle is missing from the directory.
    pub vehicle: Option<Vehicle>,
    pub driver: Option<Driver>,
    pub latest: LocationSample,
}

/// Booking details merged with the latest sample and derived progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentLocation {
    pub shipment: ShipmentSummary,
    pub vehicle_id: Option<String>,
    pub driver: Option<Driver>,
    pub current: LocationSample,
    /// `None` when the booking has no origin or destination.
    pub progress: Option<ProgressSnapshot>,
}

pub struct TrackingQueryService<P> {
    provider: Arc<P>,
    clock: Arc<dyn Clock>,
    estimator: ProgressEstimator,
}

impl<P> Clone for TrackingQueryService<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            clock: Arc::clone(&self.clock),
            estimator: self.estimator,
        }
    }
}

impl<P: Provider> TrackingQueryService<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        Self { provider, clock, estimator: ProgressEstimator::default() }
    }

    #[must_use]
    pub fn with_estimator(mut self, estimator: ProgressEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Loads a booking.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown shipment and `Persistence` when the
    /// store fails.
    pub async fn booking(&self, shipment_id: &str) -> Result<Booking> {
        BookingStore::get_by_id(&*self.provider, shipment_id)
            .await
            .context("loading booking")?
            .ok_or_else(|| not_found!("shipment {shipment_id} not found"))
    }

    /// Latest sample for a shipment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the shipment is unknown or has no samples yet.
    pub async fn current_location(&self, shipment_id: &str) -> Result<LocationSample> {
        self.booking(shipment_id).await?;
        self.latest(shipment_id).await
    }

    /// Latest sample merged with booking details and progress.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the shipment is unknown or has no samples yet.
    pub async fn shipment_location(&self, shipment_id: &str) -> Result<ShipmentLocation> {
        let booking = self.booking(shipment_id).await?;
        let current = self.latest(shipment_id).await?;

        let progress = if booking.endpoints().is_some() {
            Some(self.estimator.compute(&booking, &current, self.clock.now())?)
        } else {
            None
        };

        Ok(ShipmentLocation {
            shipment: ShipmentSummary::from(&booking),
            vehicle_id: booking.vehicle_id,
            driver: booking.driver,
            current,
            progress,
        })
    }

    /// Shipment history, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a bad filter and `NotFound` for an unknown
    /// shipment.
    pub async fn history(
        &self, shipment_id: &str, filter: &HistoryFilter,
    ) -> Result<Vec<LocationSample>> {
        filter.validate()?;
        self.booking(shipment_id).await?;

        let samples = LocationStore::query(&*self.provider, shipment_id, filter)
            .await
            .context("querying shipment history")?;
        Ok(newest_first(samples, filter.limit))
    }

    /// Vehicle history across shipments, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a bad filter and `NotFound` for an unknown
    /// vehicle.
    pub async fn vehicle_history(
        &self, vehicle_id: &str, filter: &HistoryFilter,
    ) -> Result<Vec<LocationSample>> {
        filter.validate()?;
        if !VehicleDirectory::exists(&*self.provider, vehicle_id)
            .await
            .context("checking vehicle")?
        {
            return Err(not_found!("vehicle {vehicle_id} not found"));
        }

        let samples = LocationStore::query_vehicle(&*self.provider, vehicle_id, filter)
            .await
            .context("querying vehicle history")?;
        Ok(newest_first(samples, filter.limit))
    }

    /// Every in-transit shipment that has reported at least one position,
    /// ordered by shipment id.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` when a store fails.
    pub async fn active_fleet(&self) -> Result<Vec<FleetEntry>> {
        let bookings = BookingStore::list_by_status(&*self.provider, BookingStatus::InTransit)
            .await
            .context("listing in-transit shipments")?;

        let mut fleet = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let Some(latest) = LocationStore::latest(&*self.provider, &booking.id)
                .await
                .context("loading latest sample")?
            else {
                debug!(shipment_id = %booking.id, "in transit without samples, skipping");
                continue;
            };

            let vehicle = match booking.vehicle_id.as_deref() {
                Some(id) => {
                    VehicleDirectory::get(&*self.provider, id).await.context("loading vehicle")?
                }
                None => None,
            };

            fleet.push(FleetEntry {
                shipment: ShipmentSummary::from(&booking),
                vehicle,
                driver: booking.driver,
                latest,
            });
        }

        fleet.sort_by(|a, b| a.shipment.id.cmp(&b.shipment.id));
        Ok(fleet)
    }

    async fn latest(&self, shipment_id: &str) -> Result<LocationSample> {
        LocationStore::latest(&*self.provider, shipment_id)
            .await
            .context("loading latest sample")?
            .ok_or_else(|| not_found!("no location recorded for shipment {shipment_id}"))
    }
}

// stable sort: samples sharing a timestamp keep store order
fn newest_first(mut samples: Vec<LocationSample>, limit: usize) -> Vec<LocationSample> {
    samples.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    samples.truncate(limit);
    samples
}
