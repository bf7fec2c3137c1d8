//! # Tracking
//!
//! Read paths over the location and booking stores: current position,
//! bounded history, fleet overview and progress/ETA estimation, plus the
//! single entry point for device-reported positions.

pub mod ingest;
pub mod progress;
pub mod query;

pub use crate::ingest::IngestionEndpoint;
pub use crate::progress::{ProgressEstimator, ProgressSnapshot, compute_progress};
pub use crate::query::{FleetEntry, ShipmentLocation, TrackingQueryService};
