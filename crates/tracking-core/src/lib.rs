//! # Tracking Core
//!
//! Core types, collaborator interfaces and geospatial math shared by the
//! shipment tracking crates.

mod error;
pub mod geo;
mod locks;
mod model;
mod provider;

pub use crate::error::*;
pub use crate::locks::*;
pub use crate::model::*;
pub use crate::provider::*;
