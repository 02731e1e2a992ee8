//! Applies consumed events through the trip engine.
//!
//! Malformed payloads and business rejections are logged and acknowledged;
//! only infrastructure failures are returned to the consumer loop. Replays
//! are idempotent by trip id.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::Topics;
use crate::error::{ErrorKind, ServiceError};
use crate::models::event::{LocationUpdatedData, TripEndedData, TripStartedData};
use crate::models::{EventEnvelope, EventType};
use crate::trips::{LocationSample, StartTrip, TripEngine};

pub async fn process_event(
    engine: &TripEngine,
    topics: &Topics,
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    let Some(event_type) = topics.event_for(topic) else {
        warn!(topic, "Received message on unknown topic, skipping");
        return Ok(());
    };

    match event_type {
        EventType::TripStarted => match decode::<TripStartedData>(topic, payload) {
            Some(data) => apply_trip_started(engine, data).await,
            None => Ok(()),
        },
        EventType::TripEnded => match decode::<TripEndedData>(topic, payload) {
            Some(data) => apply_trip_ended(engine, data).await,
            None => Ok(()),
        },
        EventType::LocationUpdated => match decode::<LocationUpdatedData>(topic, payload) {
            Some(data) => apply_location_updated(engine, data).await,
            None => Ok(()),
        },
    }
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Option<T> {
    match serde_json::from_slice::<EventEnvelope<T>>(payload) {
        Ok(envelope) => {
            debug!(topic, event_id = %envelope.event_id, "Decoded event");
            Some(envelope.data)
        }
        Err(e) => {
            warn!(topic, error = %e, "Failed to parse event");
            None
        }
    }
}

/// Business rejections are acknowledged; infrastructure errors bubble up.
fn settle(action: &str, result: Result<(), ServiceError>) -> anyhow::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::Internal => Err(e.into()),
        Err(e) => {
            warn!(action, error = %e, "Event rejected by trip engine");
            Ok(())
        }
    }
}

async fn apply_trip_started(engine: &TripEngine, data: TripStartedData) -> anyhow::Result<()> {
    match engine.get_trip_by_id(data.trip_id).await {
        Ok(_) => {
            info!(trip_id = %data.trip_id, "Trip already recorded, skipping");
            return Ok(());
        }
        Err(ServiceError::TripNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let result = engine
        .start_trip(StartTrip {
            scooter_id: data.scooter_id,
            user_id: data.user_id,
            lat: data.start_latitude,
            lng: data.start_longitude,
            trip_id: Some(data.trip_id),
            started_at: Some(data.start_time),
        })
        .await
        .map(|trip| info!(trip_id = %trip.id, scooter_id = %trip.scooter_id, "Applied trip.started"));
    settle("trip.started", result)
}

async fn apply_trip_ended(engine: &TripEngine, data: TripEndedData) -> anyhow::Result<()> {
    let active = engine.get_active_trip_by_scooter(data.scooter_id).await?;
    if active.map(|trip| trip.id) != Some(data.trip_id) {
        info!(
            trip_id = %data.trip_id,
            scooter_id = %data.scooter_id,
            "Trip is not active on this scooter, skipping"
        );
        return Ok(());
    }

    let result = engine
        .end_trip(data.scooter_id, data.end_latitude, data.end_longitude)
        .await
        .map(|trip| info!(trip_id = %trip.id, "Applied trip.ended"));
    settle("trip.ended", result)
}

async fn apply_location_updated(
    engine: &TripEngine,
    data: LocationUpdatedData,
) -> anyhow::Result<()> {
    let result = engine
        .update_location(LocationSample {
            scooter_id: data.scooter_id,
            lat: data.latitude,
            lng: data.longitude,
            heading: data.heading,
            speed: data.speed,
            update_id: data.update_id,
            recorded_at: data.recorded_at,
        })
        .await
        .map(|_| debug!(scooter_id = %data.scooter_id, "Applied location.updated"));
    settle("location.updated", result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::RecordingPublisher;
    use crate::models::{DomainEvent, ScooterStatus, TripStatus};
    use crate::store::memory::{Fault, MemoryStore};
    use std::sync::Arc;
    use uuid::Uuid;

    const SCOOTER: Uuid = Uuid::from_u128(0x6666_6666_6666_6666_6666_0000_0000_0001);
    const USER: Uuid = Uuid::from_u128(0x5555_5555_5555_5555_5555_0000_0000_0001);

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed_scooter(SCOOTER, 45.4215, -75.6972).await.unwrap();
        store.seed_user(USER).await.unwrap();
        store
    }

    fn replay_engine(store: &MemoryStore) -> TripEngine {
        TripEngine::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_started_event_reproduces_committed_trip() {
        // Producer side: a live start publishes the envelope.
        let origin = seeded_store().await;
        let publisher = RecordingPublisher::new();
        let live = TripEngine::new(Arc::new(origin.clone())).with_publisher(Arc::new(publisher.clone()));
        let trip = live
            .start_trip(StartTrip {
                scooter_id: SCOOTER,
                user_id: USER,
                lat: 45.4215,
                lng: -75.6972,
                trip_id: None,
                started_at: None,
            })
            .await
            .unwrap();

        let envelope = publisher.published().remove(0);
        match &envelope.data {
            DomainEvent::TripStarted(data) => {
                assert_eq!(data.trip_id, trip.id);
                assert_eq!(data.scooter_id, SCOOTER);
                assert_eq!(data.start_latitude, 45.4215);
            }
            other => panic!("unexpected event {other:?}"),
        }
        let payload = serde_json::to_vec(&envelope).unwrap();

        // Consumer side: a store that has the same scooter and user.
        let replica = seeded_store().await;
        let engine = replay_engine(&replica);
        let topics = Topics::default();
        process_event(&engine, &topics, "trip-started", &payload).await.unwrap();
        // A redelivery is a no-op.
        process_event(&engine, &topics, "trip-started", &payload).await.unwrap();

        let snapshot = replica.snapshot().await;
        assert_eq!(snapshot.trips.len(), 1);
        let replayed = &snapshot.trips[0];
        assert_eq!(replayed.id, trip.id);
        assert_eq!(replayed.user_id, trip.user_id);
        assert_eq!(replayed.start_time, trip.start_time);
        assert_eq!(replayed.start_lat, trip.start_lat);
        assert_eq!(replayed.status, TripStatus::Active);
        assert_eq!(snapshot.scooters[0].status, ScooterStatus::Occupied);
    }

    #[tokio::test]
    async fn test_ended_event_only_closes_matching_trip() {
        let store = seeded_store().await;
        let engine = replay_engine(&store);
        let topics = Topics::default();
        let trip_id = Uuid::new_v4();

        let started = serde_json::json!({
            "eventType": "trip.started",
            "eventId": Uuid::new_v4(),
            "timestamp": "2024-01-01T12:00:00Z",
            "version": "1.0",
            "data": {
                "tripId": trip_id,
                "scooterId": SCOOTER,
                "userId": USER,
                "startLatitude": 45.4215,
                "startLongitude": -75.6972,
                "startTime": "2024-01-01T12:00:00Z"
            }
        });
        process_event(&engine, &topics, "trip-started", started.to_string().as_bytes())
            .await
            .unwrap();

        let ended = |id: Uuid| {
            serde_json::json!({
                "eventType": "trip.ended",
                "eventId": Uuid::new_v4(),
                "timestamp": "2024-01-01T12:10:00Z",
                "version": "1.0",
                "data": {
                    "tripId": id,
                    "scooterId": SCOOTER,
                    "userId": USER,
                    "endLatitude": 45.4225,
                    "endLongitude": -75.6982,
                    "endTime": "2024-01-01T12:10:00Z",
                    "durationSeconds": 600
                }
            })
            .to_string()
        };

        process_event(&engine, &topics, "trip-ended", ended(Uuid::new_v4()).as_bytes())
            .await
            .unwrap();
        assert!(engine.get_trip_by_id(trip_id).await.unwrap().is_active());

        process_event(&engine, &topics, "trip-ended", ended(trip_id).as_bytes())
            .await
            .unwrap();
        let trip = engine.get_trip_by_id(trip_id).await.unwrap();
        assert_eq!(trip.status, TripStatus::Completed);
        assert_eq!(trip.end_lat, Some(45.4225));

        // Redelivery of the same end is skipped.
        process_event(&engine, &topics, "trip-ended", ended(trip_id).as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_messages_are_acknowledged() {
        let store = seeded_store().await;
        let engine = replay_engine(&store);
        let topics = Topics::default();

        process_event(&engine, &topics, "trip-started", b"{not json").await.unwrap();
        process_event(&engine, &topics, "somewhere-else", b"{}").await.unwrap();
        let bad_uuid = br#"{"eventType":"location.updated","eventId":"x","timestamp":"2024-01-01T12:00:00Z","version":"1.0","data":{"scooterId":"nope","latitude":1,"longitude":2}}"#;
        process_event(&engine, &topics, "location-updated", bad_uuid).await.unwrap();

        assert!(store.snapshot().await.locations.is_empty());
    }

    #[tokio::test]
    async fn test_location_event_applies_and_rejections_are_swallowed() {
        let store = seeded_store().await;
        let engine = replay_engine(&store);
        let topics = Topics::default();
        let location = |scooter: Uuid, lat: f64| {
            serde_json::json!({
                "eventType": "location.updated",
                "eventId": Uuid::new_v4(),
                "timestamp": "2024-01-01T12:00:03Z",
                "version": "1.0",
                "data": {
                    "scooterId": scooter,
                    "tripId": null,
                    "latitude": lat,
                    "longitude": -75.6982,
                    "heading": 180.0,
                    "speed": 14.0
                }
            })
            .to_string()
        };

        process_event(&engine, &topics, "location-updated", location(SCOOTER, 45.4225).as_bytes())
            .await
            .unwrap();
        // Unknown scooter and out-of-range latitude are business rejections.
        process_event(&engine, &topics, "location-updated", location(Uuid::new_v4(), 45.0).as_bytes())
            .await
            .unwrap();
        process_event(&engine, &topics, "location-updated", location(SCOOTER, 95.0).as_bytes())
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.locations.len(), 1);
        assert_eq!(snapshot.scooters[0].current_lat, 45.4225);
    }

    #[tokio::test]
    async fn test_own_location_event_is_not_stored_twice() {
        let store = seeded_store().await;
        let publisher = RecordingPublisher::new();
        let live = TripEngine::new(Arc::new(store.clone())).with_publisher(Arc::new(publisher.clone()));
        let update = live
            .update_location(LocationSample {
                scooter_id: SCOOTER,
                lat: 45.4225,
                lng: -75.6982,
                heading: 90.0,
                speed: 12.0,
                update_id: None,
                recorded_at: None,
            })
            .await
            .unwrap();

        let payload = serde_json::to_vec(&publisher.published().remove(0)).unwrap();
        let engine = replay_engine(&store);
        let topics = Topics::default();
        process_event(&engine, &topics, "location-updated", &payload).await.unwrap();
        process_event(&engine, &topics, "location-updated", &payload).await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.locations.len(), 1);
        assert_eq!(snapshot.locations[0].id, update.id);
    }

    #[tokio::test]
    async fn test_location_replay_keeps_id_and_timestamp() {
        let store = seeded_store().await;
        let engine = replay_engine(&store);
        let topics = Topics::default();
        let update_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "eventType": "location.updated",
            "eventId": Uuid::new_v4(),
            "timestamp": "2024-01-01T12:00:03Z",
            "version": "1.0",
            "data": {
                "updateId": update_id,
                "scooterId": SCOOTER,
                "tripId": null,
                "latitude": 45.4225,
                "longitude": -75.6982,
                "recordedAt": "2024-01-01T12:00:02Z"
            }
        })
        .to_string();

        process_event(&engine, &topics, "location-updated", payload.as_bytes())
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.locations.len(), 1);
        assert_eq!(snapshot.locations[0].id, update_id);
        assert_eq!(snapshot.locations[0].timestamp.to_rfc3339(), "2024-01-01T12:00:02+00:00");
    }

    #[tokio::test]
    async fn test_infrastructure_failure_is_returned() {
        let store = seeded_store().await;
        let engine = replay_engine(&store);
        store.inject_fault(Fault::Begin);

        let payload = serde_json::json!({
            "eventType": "location.updated",
            "eventId": Uuid::new_v4(),
            "timestamp": "2024-01-01T12:00:03Z",
            "version": "1.0",
            "data": {"scooterId": SCOOTER, "tripId": null, "latitude": 45.0, "longitude": -75.0}
        })
        .to_string();

        let result =
            process_event(&engine, &Topics::default(), "location-updated", payload.as_bytes()).await;
        assert!(result.is_err());
    }
}
