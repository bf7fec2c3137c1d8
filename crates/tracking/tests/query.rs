#![allow(missing_docs)]


use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tracking::{IngestionEndpoint, TrackingQueryService};
use tracking_core::{
    Booking, BookingStatus, Coordinate, Driver, HistoryFilter, ShipmentLocks, Telemetry, Vehicle,
};

use self::provider::{FixedClock, MockProvider};

const MILAN: Coordinate = Coordinate { latitude: 45.4642, longitude: 9.1900 };
const ROME: Coordinate = Coordinate { latitude: 41.9028, longitude: 12.4964 };

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
}

fn booking(id: &str, status: BookingStatus, vehicle_id: &str) -> Booking {
    Booking {
        id: id.to_string(),
        reference: format!("BK-{id}"),
        customer_id: "c-1".to_string(),
        origin: Some(MILAN),
        destination: Some(ROME),
        vehicle_id: Some(vehicle_id.to_string()),
        driver: Some(Driver { name: "Giulia".to_string(), phone: None }),
        status,
        current_location: None,
        actual_delivery_at: None,
    }
}

fn vehicle(id: &str) -> Vehicle {
    Vehicle {
        id: id.to_string(),
        registration: format!("REG-{id}"),
        kind: "van".to_string(),
        capacity_kg: Some(1_200.0),
    }
}

type Services = (TrackingQueryService<MockProvider>, IngestionEndpoint<MockProvider>);

fn setup(provider: &MockProvider) -> Services {
    let provider = Arc::new(provider.clone());
    let clock = Arc::new(FixedClock(now()));
    let query = TrackingQueryService::new(Arc::clone(&provider), clock.clone());
    let ingest = IngestionEndpoint::new(provider, clock, ShipmentLocks::new());
    (query, ingest)
}

fn at(minutes: i64) -> Telemetry {
    Telemetry {
        speed_kmh: Some(55.0),
        timestamp: Some(now() + TimeDelta::minutes(minutes)),
        ..Telemetry::default()
    }
}

#[tokio::test]
async fn history_is_newest_first_and_bounded() {
    let provider = MockProvider::new(
        vec![booking("s-1", BookingStatus::InTransit, "v-1")],
        vec![vehicle("v-1")],
    );
    let (query, ingest) = setup(&provider);

    for minute in 0..5 {
        ingest.record("s-1", "v-1", MILAN, &at(minute)).await.unwrap();
    }

    let filter = HistoryFilter { limit: 3, ..HistoryFilter::default() };
    let history = query.history("s-1", &filter).await.unwrap();
    let stamps: Vec<_> = history.iter().map(|s| s.timestamp).collect();
    assert_eq!(
        stamps,
        vec![
            now() + TimeDelta::minutes(4),
            now() + TimeDelta::minutes(3),
            now() + TimeDelta::minutes(2),
        ]
    );

    let window = HistoryFilter {
        limit: 100,
        start_time: Some(now() + TimeDelta::minutes(1)),
        end_time: Some(now() + TimeDelta::minutes(2)),
    };
    assert_eq!(query.history("s-1", &window).await.unwrap().len(), 2);
}

#[tokio::test]
async fn history_rejects_bad_filter() {
    let provider =
        MockProvider::new(vec![booking("s-1", BookingStatus::InTransit, "v-1")], vec![]);
    let (query, _) = setup(&provider);

    let zero = HistoryFilter { limit: 0, ..HistoryFilter::default() };
    assert_eq!(query.history("s-1", &zero).await.unwrap_err().kind(), "validation_error");

    let missing = query.history("nope", &HistoryFilter::default()).await.unwrap_err();
    assert_eq!(missing.kind(), "not_found");
}

#[tokio::test]
async fn current_location_requires_a_sample() {
    let provider = MockProvider::new(
        vec![booking("s-1", BookingStatus::InTransit, "v-1")],
        vec![vehicle("v-1")],
    );
    let (query, ingest) = setup(&provider);

    assert_eq!(query.current_location("s-1").await.unwrap_err().kind(), "not_found");
    assert_eq!(query.current_location("nope").await.unwrap_err().kind(), "not_found");

    let recorded = ingest.record("s-1", "v-1", ROME, &at(0)).await.unwrap();
    assert_eq!(query.current_location("s-1").await.unwrap(), recorded);
}

#[tokio::test]
async fn merged_view_carries_progress() {
    let provider = MockProvider::new(
        vec![booking("s-1", BookingStatus::InTransit, "v-1")],
        vec![vehicle("v-1")],
    );
    let (query, ingest) = setup(&provider);
    ingest.record("s-1", "v-1", ROME, &at(0)).await.unwrap();

    let view = query.shipment_location("s-1").await.unwrap();
    assert_eq!(view.shipment.reference, "BK-s-1");
    assert_eq!(view.vehicle_id.as_deref(), Some("v-1"));
    let progress = view.progress.unwrap();
    assert!((progress.percentage - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn fleet_skips_shipments_without_samples() {
    let provider = MockProvider::new(
        vec![
            booking("s-3", BookingStatus::InTransit, "v-ghost"),
            booking("s-1", BookingStatus::InTransit, "v-1"),
            booking("s-2", BookingStatus::InTransit, "v-1"),
            booking("s-4", BookingStatus::Delivered, "v-1"),
        ],
        vec![vehicle("v-1"), vehicle("v-ghost")],
    );
    let (query, ingest) = setup(&provider);

    ingest.record("s-3", "v-ghost", MILAN, &at(0)).await.unwrap();
    ingest.record("s-1", "v-1", MILAN, &at(1)).await.unwrap();
    ingest.record("s-4", "v-1", ROME, &at(2)).await.unwrap();
    // the vehicle leaves the directory after reporting
    provider.vehicles.lock().unwrap().retain(|v| v.id != "v-ghost");

    let fleet = query.active_fleet().await.unwrap();
    let ids: Vec<_> = fleet.iter().map(|e| e.shipment.id.as_str()).collect();
    assert_eq!(ids, vec!["s-1", "s-3"]);

    assert_eq!(fleet[0].vehicle.as_ref().map(|v| v.registration.as_str()), Some("REG-v-1"));
    assert_eq!(fleet[0].driver.as_ref().map(|d| d.name.as_str()), Some("Giulia"));
    assert_eq!(fleet[1].vehicle, None);
}

#[tokio::test]
async fn vehicle_history_spans_shipments() {
    let provider = MockProvider::new(
        vec![
            booking("s-1", BookingStatus::InTransit, "v-1"),
            booking("s-2", BookingStatus::InTransit, "v-1"),
        ],
        vec![vehicle("v-1")],
    );
    let (query, ingest) = setup(&provider);
    ingest.record("s-1", "v-1", MILAN, &at(0)).await.unwrap();
    ingest.record("s-2", "v-1", ROME, &at(1)).await.unwrap();

    let history = query.vehicle_history("v-1", &HistoryFilter::default()).await.unwrap();
    let ids: Vec<_> = history.iter().map(|s| s.shipment_id.as_str()).collect();
    assert_eq!(ids, vec!["s-2", "s-1"]);

    let err = query.vehicle_history("v-9", &HistoryFilter::default()).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
