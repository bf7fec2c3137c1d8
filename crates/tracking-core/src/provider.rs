//! # Provider
//!
//! Provider defines the external collaborators the tracking engine consumes.
//! Implementations own persistence; the engine never caches their data.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    Booking, BookingStatus, Coordinate, HistoryFilter, LocationSample, Vehicle,
};

/// The `BookingStore` trait reads bookings and writes the fields owned by
/// tracking: status, cached current location and delivery time.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Booking>>;

    async fn update_status(&self, id: &str, status: BookingStatus) -> Result<()>;

    async fn update_current_location(&self, id: &str, location: Coordinate) -> Result<()>;

    async fn set_actual_delivery_time(&self, id: &str, time: DateTime<Utc>) -> Result<()>;

    /// All bookings currently in `status`.
    async fn list_by_status(&self, status: BookingStatus) -> Result<Vec<Booking>>;
}

/// The `LocationStore` trait persists the append-only sample stream.
///
/// Query results are most-recent-first and bounded by `filter.limit`.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn append(&self, sample: LocationSample) -> Result<LocationSample>;

    async fn query(&self, shipment_id: &str, filter: &HistoryFilter)
    -> Result<Vec<LocationSample>>;

    async fn query_vehicle(
        &self, vehicle_id: &str, filter: &HistoryFilter,
    ) -> Result<Vec<LocationSample>>;

    async fn latest(&self, shipment_id: &str) -> Result<Option<LocationSample>>;
}

/// The `VehicleDirectory` trait resolves fleet vehicles.
#[async_trait]
pub trait VehicleDirectory: Send + Sync {
    async fn exists(&self, vehicle_id: &str) -> Result<bool>;

    async fn get(&self, vehicle_id: &str) -> Result<Option<Vehicle>>;
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Provider entry point implemented by the host.
pub trait Provider: BookingStore + LocationStore + VehicleDirectory {}
