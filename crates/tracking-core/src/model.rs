//! # Model
//!
//! Shipment, vehicle and telemetry types shared by the simulator and the
//! read-side tracking services.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, bad_request};

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns a validation error when latitude is outside `[-90, 90]` or
    /// longitude is outside `[-180, 180]`.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coord = Self { latitude, longitude };
        coord.validate()?;
        Ok(coord)
    }

    /// Checks the coordinate is finite and inside the valid ranges.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(bad_request!("latitude {} outside [-90, 90]", self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(bad_request!("longitude {} outside [-180, 180]", self.longitude));
        }
        Ok(())
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.latitude, self.longitude)
    }
}

/// Movement classification attached to every location sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Moving,
    Stopped,
    Idle,
    Offline,
}

impl VehicleStatus {
    /// Speeds below this are reported as `Stopped`.
    pub const STOPPED_BELOW_KMH: f64 = 5.0;
    /// Speeds below this (and not stopped) are reported as `Idle`.
    pub const IDLE_BELOW_KMH: f64 = 20.0;

    /// Classifies a speed reading.
    #[must_use]
    pub fn from_speed(speed_kmh: f64) -> Self {
        if speed_kmh < Self::STOPPED_BELOW_KMH {
            Self::Stopped
        } else if speed_kmh < Self::IDLE_BELOW_KMH {
            Self::Idle
        } else {
            Self::Moving
        }
    }
}

/// An immutable, timestamped position observation, simulated or device-reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub id: Uuid,
    pub shipment_id: String,
    pub vehicle_id: String,
    pub coordinates: Coordinate,
    pub speed_kmh: f64,
    pub heading_degrees: f64,
    pub altitude: f64,
    pub accuracy_meters: f64,
    pub status: VehicleStatus,
    pub timestamp: DateTime<Utc>,
    pub source_simulated: bool,
}

/// Optional device telemetry accompanying a reported position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Telemetry {
    pub speed_kmh: Option<f64>,
    pub heading_degrees: Option<f64>,
    pub altitude: Option<f64>,
    pub accuracy_meters: Option<f64>,
    pub status: Option<VehicleStatus>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Lifecycle status of a booking as held by the booking store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InTransit,
    Delivered,
    Cancelled,
}

impl BookingStatus {
    #[must_use]
    pub const fn is_active_transit(self) -> bool {
        matches!(self, Self::InTransit)
    }
}

impl Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub name: String,
    pub phone: Option<String>,
}

/// A transport order as seen by the tracking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub reference: String,
    pub customer_id: String,
    pub origin: Option<Coordinate>,
    pub destination: Option<Coordinate>,
    pub vehicle_id: Option<String>,
    pub driver: Option<Driver>,
    pub status: BookingStatus,
    pub current_location: Option<Coordinate>,
    pub actual_delivery_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Returns origin and destination when both are present.
    #[must_use]
    pub fn endpoints(&self) -> Option<(Coordinate, Coordinate)> {
        match (self.origin, self.destination) {
            (Some(origin), Some(destination)) => Some((origin, destination)),
            _ => None,
        }
    }
}

/// Compact view of a booking returned alongside telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentSummary {
    pub id: String,
    pub reference: String,
    pub status: BookingStatus,
    pub origin: Option<Coordinate>,
    pub destination: Option<Coordinate>,
}

impl From<&Booking> for ShipmentSummary {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id.clone(),
            reference: booking.reference.clone(),
            status: booking.status,
            origin: booking.origin,
            destination: booking.destination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub registration: String,
    pub kind: String,
    pub capacity_kg: Option<f64>,
}

/// Bounds for history queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    pub limit: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    /// Checks the filter is usable.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero limit or an inverted time window.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(bad_request!("history limit must be positive"));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time)
            && start > end
        {
            return Err(bad_request!("history start {start} is after end {end}"));
        }
        Ok(())
    }

    /// Whether a sample timestamp falls inside the window (inclusive).
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start_time.is_none_or(|start| timestamp >= start)
            && self.end_time.is_none_or(|end| timestamp <= end)
    }
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self { limit: Self::DEFAULT_LIMIT, start_time: None, end_time: None }
    }
}
