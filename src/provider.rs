//! In-memory collaborator stores for local runs, demos and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracking_core::{
    Booking, BookingStatus, BookingStore, Coordinate, HistoryFilter, LocationSample,
    LocationStore, Provider, Vehicle, VehicleDirectory,
};

/// Bookings, vehicles and samples held in process memory.
///
/// `fail_next_appends` makes the next `n` sample writes fail, which is how
/// tests exercise persistence failures inside simulation ticks.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    bookings: RwLock<HashMap<String, Booking>>,
    vehicles: RwLock<HashMap<String, Vehicle>>,
    // insertion order
    samples: RwLock<Vec<LocationSample>>,
    failing_appends: AtomicUsize,
}

impl InMemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_booking(&self, booking: Booking) {
        self.bookings.write().await.insert(booking.id.clone(), booking);
    }

    pub async fn insert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.write().await.insert(vehicle.id.clone(), vehicle);
    }

    pub async fn remove_vehicle(&self, vehicle_id: &str) -> Option<Vehicle> {
        self.vehicles.write().await.remove(vehicle_id)
    }

    pub async fn booking(&self, id: &str) -> Option<Booking> {
        self.bookings.read().await.get(id).cloned()
    }

    /// Every sample for a shipment, most recent first.
    pub async fn samples(&self, shipment_id: &str) -> Vec<LocationSample> {
        let filter = HistoryFilter { limit: usize::MAX, ..HistoryFilter::default() };
        self.select(&filter, |s| s.shipment_id == shipment_id).await
    }

    pub async fn sample_count(&self) -> usize {
        self.samples.read().await.len()
    }

    pub fn fail_next_appends(&self, n: usize) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    async fn select(
        &self, filter: &HistoryFilter, matches: impl Fn(&LocationSample) -> bool,
    ) -> Vec<LocationSample> {
        let mut selected: Vec<LocationSample> = self
            .samples
            .read()
            .await
            .iter()
            .rev()
            .filter(|s| matches(*s) && filter.contains(s.timestamp))
            .cloned()
            .collect();
        // stable, so equal timestamps stay newest-inserted first
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        selected.truncate(filter.limit);
        selected
    }

    async fn modify(&self, id: &str, f: impl FnOnce(&mut Booking)) -> Result<()> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings.get_mut(id).ok_or_else(|| anyhow!("booking {id} does not exist"))?;
        f(booking);
        Ok(())
    }
}

impl Provider for InMemoryProvider {}

#[async_trait]
impl BookingStore for InMemoryProvider {
    async fn get_by_id(&self, id: &str) -> Result<Option<Booking>> {
        Ok(self.booking(id).await)
    }

    async fn update_status(&self, id: &str, status: BookingStatus) -> Result<()> {
        self.modify(id, |booking| booking.status = status).await
    }

    async fn update_current_location(&self, id: &str, location: Coordinate) -> Result<()> {
        self.modify(id, |booking| booking.current_location = Some(location)).await
    }

    async fn set_actual_delivery_time(&self, id: &str, time: DateTime<Utc>) -> Result<()> {
        self.modify(id, |booking| booking.actual_delivery_at = Some(time)).await
    }

    async fn list_by_status(&self, status: BookingStatus) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.values().filter(|b| b.status == status).cloned().collect())
    }
}

#[async_trait]
impl LocationStore for InMemoryProvider {
    async fn append(&self, sample: LocationSample) -> Result<LocationSample> {
        let failing = self
            .failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("location store unavailable"));
        }

        self.samples.write().await.push(sample.clone());
        Ok(sample)
    }

    async fn query(
        &self, shipment_id: &str, filter: &HistoryFilter,
    ) -> Result<Vec<LocationSample>> {
        Ok(self.select(filter, |s| s.shipment_id == shipment_id).await)
    }

    async fn query_vehicle(
        &self, vehicle_id: &str, filter: &HistoryFilter,
    ) -> Result<Vec<LocationSample>> {
        Ok(self.select(filter, |s| s.vehicle_id == vehicle_id).await)
    }

    async fn latest(&self, shipment_id: &str) -> Result<Option<LocationSample>> {
        let samples = self.samples.read().await;
        // max_by_key keeps the last of equal keys, the newest insert
        Ok(samples
            .iter()
            .filter(|s| s.shipment_id == shipment_id)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }
}

#[async_trait]
impl VehicleDirectory for InMemoryProvider {
    async fn exists(&self, vehicle_id: &str) -> Result<bool> {
        Ok(self.vehicles.read().await.contains_key(vehicle_id))
    }

    async fn get(&self, vehicle_id: &str) -> Result<Option<Vehicle>> {
        Ok(self.vehicles.read().await.get(vehicle_id).cloned())
    }
}
