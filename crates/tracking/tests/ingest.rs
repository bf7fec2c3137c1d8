#![allow(missing_docs)]


use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tracking::IngestionEndpoint;
use tracking_core::{
    Booking, BookingStatus, Coordinate, ShipmentLocks, Telemetry, Vehicle, VehicleStatus,
};

use self::provider::{FixedClock, MockProvider};

fn provider() -> MockProvider {
    let booking = Booking {
        id: "s-1".to_string(),
        reference: "BK-1".to_string(),
        customer_id: "c-1".to_string(),
        origin: Some(Coordinate { latitude: 45.4642, longitude: 9.1900 }),
        destination: Some(Coordinate { latitude: 41.9028, longitude: 12.4964 }),
        vehicle_id: Some("v-1".to_string()),
        driver: None,
        status: BookingStatus::Confirmed,
        current_location: None,
        actual_delivery_at: None,
    };
    let vehicle = Vehicle {
        id: "v-1".to_string(),
        registration: "AB-123".to_string(),
        kind: "truck".to_string(),
        capacity_kg: None,
    };
    MockProvider::new(vec![booking], vec![vehicle])
}

fn endpoint(provider: &MockProvider) -> IngestionEndpoint<MockProvider> {
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()));
    IngestionEndpoint::new(Arc::new(provider.clone()), clock, ShipmentLocks::new())
}

#[tokio::test]
async fn records_device_sample() {
    let provider = provider();
    let position = Coordinate { latitude: 44.4949, longitude: 11.3426 };
    let telemetry = Telemetry { speed_kmh: Some(72.0), ..Telemetry::default() };

    let sample = endpoint(&provider).record("s-1", "v-1", position, &telemetry).await.unwrap();

    assert!(!sample.source_simulated);
    assert_eq!(sample.status, VehicleStatus::Moving);
    assert_eq!(sample.timestamp, Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap());
    assert_eq!(provider.sample_count(), 1);
    assert_eq!(provider.booking("s-1").unwrap().current_location, Some(position));
    // recording never changes the booking's status
    assert_eq!(provider.booking("s-1").unwrap().status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn out_of_range_latitude_writes_nothing() {
    let provider = provider();
    let position = Coordinate { latitude: 91.0, longitude: 0.0 };

    let err = endpoint(&provider)
        .record("s-1", "v-1", position, &Telemetry::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "validation_error");
    assert_eq!(provider.sample_count(), 0);
    assert_eq!(provider.booking("s-1").unwrap().current_location, None);
}

#[tokio::test]
async fn unknown_shipment_or_vehicle() {
    let provider = provider();
    let endpoint = endpoint(&provider);
    let position = Coordinate { latitude: 44.0, longitude: 11.0 };

    let err = endpoint.record("s-9", "v-1", position, &Telemetry::default()).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let err = endpoint.record("s-1", "v-9", position, &Telemetry::default()).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let err = endpoint.record("s-1", "  ", position, &Telemetry::default()).await.unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert_eq!(provider.sample_count(), 0);
}

#[tokio::test]
async fn store_failure_is_persistence_error() {
    let provider = MockProvider { fail_writes: true, ..provider() };
    let position = Coordinate { latitude: 44.0, longitude: 11.0 };

    let err = endpoint(&provider)
        .record("s-1", "v-1", position, &Telemetry::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "persistence_error");
    assert!(err.to_string().contains("location store offline"), "{err}");
}
