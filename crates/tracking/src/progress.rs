//! # Progress
//!
//! Straight-line progress and ETA for a shipment, derived from its route
//! endpoints and the latest location sample.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracking_core::geo::distance_km;
use tracking_core::{Booking, LocationSample, Result, bad_request};

/// Speed assumed for the ETA when the latest sample reports none.
pub const FALLBACK_SPEED_KMH: f64 = 50.0;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Whole-number percentage in `[0, 100]`.
    pub percentage: f64,
    pub total_distance_km: f64,
    pub covered_distance_km: f64,
    pub remaining_distance_km: f64,
    pub estimated_arrival: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimator {
    fallback_speed_kmh: f64,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self { fallback_speed_kmh: FALLBACK_SPEED_KMH }
    }
}

impl ProgressEstimator {
    /// Creates an estimator using `fallback_speed_kmh` for stationary samples.
    /// Non-positive or non-finite values fall back to [`FALLBACK_SPEED_KMH`].
    #[must_use]
    pub fn new(fallback_speed_kmh: f64) -> Self {
        if fallback_speed_kmh.is_finite() && fallback_speed_kmh > 0.0 {
            Self { fallback_speed_kmh }
        } else {
            Self::default()
        }
    }

    #[must_use]
    pub const fn fallback_speed_kmh(&self) -> f64 {
        self.fallback_speed_kmh
    }

    /// Computes progress of `booking` given its latest `sample`.
    ///
    /// Progress is measured as straight-line distance from the origin, so a
    /// vehicle that overshoots or detours is capped at 100%.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the booking lacks an origin or
    /// destination.
    pub fn compute(
        &self, booking: &Booking, sample: &LocationSample, now: DateTime<Utc>,
    ) -> Result<ProgressSnapshot> {
        let Some((origin, destination)) = booking.endpoints() else {
            return Err(bad_request!("shipment {} is missing origin or destination", booking.id));
        };

        let total = distance_km(origin, destination);
        let covered = distance_km(origin, sample.coordinates);
        let remaining = (total - covered).max(0.0);

        let percentage =
            if total > 0.0 { (covered / total * 100.0).round().min(100.0) } else { 100.0 };

        let speed = if sample.speed_kmh > 0.0 { sample.speed_kmh } else { self.fallback_speed_kmh };
        // saturates, so a crawling vehicle pins the ETA to the latest representable time
        #[allow(clippy::cast_possible_truncation)]
        let eta_ms = (remaining / speed * MILLIS_PER_HOUR).round() as i64;
        let estimated_arrival = TimeDelta::try_milliseconds(eta_ms)
            .and_then(|eta| now.checked_add_signed(eta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(ProgressSnapshot {
            percentage,
            total_distance_km: total,
            covered_distance_km: covered,
            remaining_distance_km: remaining,
            estimated_arrival,
        })
    }
}

/// Computes progress with the default fallback speed.
///
/// # Errors
///
/// Returns a validation error when the booking lacks an origin or destination.
pub fn compute_progress(
    booking: &Booking, sample: &LocationSample, now: DateTime<Utc>,
) -> Result<ProgressSnapshot> {
    ProgressEstimator::default().compute(booking, sample, now)
}
