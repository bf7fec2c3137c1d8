//! # Ingestion
//!
//! Entry point for positions reported by real GPS devices. Input is fully
//! validated before any store is touched.

use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tracking_core::geo::normalize_degrees;
use tracking_core::{
    BookingStore, Clock, Coordinate, LocationSample, LocationStore, Provider, Result,
    ShipmentLocks, Telemetry, VehicleDirectory, VehicleStatus, bad_request, not_found,
};
use uuid::Uuid;

/// Accuracy assumed when a device does not report one.
pub const DEFAULT_ACCURACY_METERS: f64 = 10.0;

pub struct IngestionEndpoint<P> {
    provider: Arc<P>,
    clock: Arc<dyn Clock>,
    locks: ShipmentLocks,
}

impl<P> Clone for IngestionEndpoint<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            clock: Arc::clone(&self.clock),
            locks: self.locks.clone(),
        }
    }
}

impl<P: Provider> IngestionEndpoint<P> {
    /// `locks` must be shared with the simulation engine so device reports
    /// and simulated ticks for one shipment never interleave their writes.
    #[must_use]
    pub fn new(provider: Arc<P>, clock: Arc<dyn Clock>, locks: ShipmentLocks) -> Self {
        Self { provider, clock, locks }
    }

    /// Records a device-reported position and caches it on the booking.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for out-of-range coordinates, malformed telemetry
    /// or a blank vehicle id, `NotFound` for an unknown shipment or vehicle,
    /// and `Persistence` when a store write fails.
    pub async fn record(
        &self, shipment_id: &str, vehicle_id: &str, coordinates: Coordinate,
        telemetry: &Telemetry,
    ) -> Result<LocationSample> {
        coordinates.validate()?;
        if vehicle_id.trim().is_empty() {
            return Err(bad_request!("vehicle id is required"));
        }
        let reading = Reading::from_telemetry(telemetry)?;

        let booking = BookingStore::get_by_id(&*self.provider, shipment_id)
            .await
            .context("loading booking")?
            .ok_or_else(|| not_found!("shipment {shipment_id} not found"))?;
        if !VehicleDirectory::exists(&*self.provider, vehicle_id)
            .await
            .context("checking vehicle")?
        {
            return Err(not_found!("vehicle {vehicle_id} not found"));
        }
        if booking.vehicle_id.as_deref().is_some_and(|assigned| assigned != vehicle_id) {
            warn!(shipment_id, vehicle_id, "device vehicle differs from assigned vehicle");
        }

        let sample = LocationSample {
            id: Uuid::new_v4(),
            shipment_id: shipment_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            coordinates,
            speed_kmh: reading.speed_kmh,
            heading_degrees: reading.heading_degrees,
            altitude: reading.altitude,
            accuracy_meters: reading.accuracy_meters,
            status: reading.status,
            timestamp: reading.timestamp.unwrap_or_else(|| self.clock.now()),
            source_simulated: false,
        };

        let _guard = self.locks.lock(shipment_id).await;
        let stored = LocationStore::append(&*self.provider, sample)
            .await
            .context("writing device sample")?;
        BookingStore::update_current_location(&*self.provider, shipment_id, coordinates)
            .await
            .context("caching current location")?;

        info!(
            monotonic_counter.device_samples_recorded = 1,
            shipment_id,
            vehicle_id,
            position = %coordinates,
            "device location recorded"
        );
        Ok(stored)
    }
}

// Telemetry with defaults applied and ranges checked.
#[derive(Debug)]
struct Reading {
    speed_kmh: f64,
    heading_degrees: f64,
    altitude: f64,
    accuracy_meters: f64,
    status: VehicleStatus,
    timestamp: Option<DateTime<Utc>>,
}

impl Reading {
    fn from_telemetry(telemetry: &Telemetry) -> Result<Self> {
        let speed_kmh = telemetry.speed_kmh.unwrap_or(0.0);
        if !speed_kmh.is_finite() || speed_kmh < 0.0 {
            return Err(bad_request!("speed {speed_kmh} must be a non-negative number"));
        }

        let heading = telemetry.heading_degrees.unwrap_or(0.0);
        if !heading.is_finite() {
            return Err(bad_request!("heading {heading} must be finite"));
        }

        let altitude = telemetry.altitude.unwrap_or(0.0);
        if !altitude.is_finite() {
            return Err(bad_request!("altitude {altitude} must be finite"));
        }

        let accuracy_meters = telemetry.accuracy_meters.unwrap_or(DEFAULT_ACCURACY_METERS);
        if !accuracy_meters.is_finite() || accuracy_meters < 0.0 {
            return Err(bad_request!("accuracy {accuracy_meters} must be a non-negative number"));
        }

        Ok(Self {
            speed_kmh,
            heading_degrees: normalize_degrees(heading),
            altitude,
            accuracy_meters,
            status: telemetry.status.unwrap_or_else(|| VehicleStatus::from_speed(speed_kmh)),
            timestamp: telemetry.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_applied() {
        let reading = Reading::from_telemetry(&Telemetry::default()).unwrap();

        assert!(reading.speed_kmh.abs() < f64::EPSILON);
        assert!(reading.heading_degrees.abs() < f64::EPSILON);
        assert!((reading.accuracy_meters - DEFAULT_ACCURACY_METERS).abs() < f64::EPSILON);
        assert_eq!(reading.status, VehicleStatus::Stopped);
        assert_eq!(reading.timestamp, None);
    }

    #[test]
    fn heading_normalized() {
        let telemetry = Telemetry { heading_degrees: Some(-90.0), ..Telemetry::default() };
        let reading = Reading::from_telemetry(&telemetry).unwrap();
        assert!((reading.heading_degrees - 270.0).abs() < 1e-9);

        let telemetry = Telemetry { heading_degrees: Some(360.0), ..Telemetry::default() };
        assert!(Reading::from_telemetry(&telemetry).unwrap().heading_degrees.abs() < 1e-9);
    }

    #[test]
    fn status_follows_speed_unless_reported() {
        let moving = Telemetry { speed_kmh: Some(42.0), ..Telemetry::default() };
        assert_eq!(Reading::from_telemetry(&moving).unwrap().status, VehicleStatus::Moving);

        let offline = Telemetry {
            speed_kmh: Some(42.0),
            status: Some(VehicleStatus::Offline),
            ..Telemetry::default()
        };
        assert_eq!(Reading::from_telemetry(&offline).unwrap().status, VehicleStatus::Offline);
    }

    #[test]
    fn malformed_rejected() {
        let cases = [
            Telemetry { speed_kmh: Some(-1.0), ..Telemetry::default() },
            Telemetry { speed_kmh: Some(f64::INFINITY), ..Telemetry::default() },
            Telemetry { heading_degrees: Some(f64::NAN), ..Telemetry::default() },
            Telemetry { altitude: Some(f64::NEG_INFINITY), ..Telemetry::default() },
            Telemetry { accuracy_meters: Some(-0.5), ..Telemetry::default() },
        ];
        for telemetry in cases {
            let err = Reading::from_telemetry(&telemetry).unwrap_err();
            assert_eq!(err.kind(), "validation_error", "{telemetry:?}");
        }
    }
}
