use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::{LocationUpdate, Trip};

pub const EVENT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "trip.started")]
    TripStarted,
    #[serde(rename = "trip.ended")]
    TripEnded,
    #[serde(rename = "location.updated")]
    LocationUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TripStarted => "trip.started",
            EventType::TripEnded => "trip.ended",
            EventType::LocationUpdated => "location.updated",
        }
    }
}

/// Wire shape of every message on the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<T> {
    pub event_type: EventType,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStartedData {
    pub trip_id: Uuid,
    pub scooter_id: Uuid,
    pub user_id: Uuid,
    #[serde(deserialize_with = "parse_f64")]
    pub start_latitude: f64,
    #[serde(deserialize_with = "parse_f64")]
    pub start_longitude: f64,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripEndedData {
    pub trip_id: Uuid,
    pub scooter_id: Uuid,
    pub user_id: Uuid,
    #[serde(deserialize_with = "parse_f64")]
    pub end_latitude: f64,
    #[serde(deserialize_with = "parse_f64")]
    pub end_longitude: f64,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdatedData {
    /// Id of the stored sample; absent on messages from older producers.
    #[serde(default)]
    pub update_id: Option<Uuid>,
    pub scooter_id: Uuid,
    pub trip_id: Option<Uuid>,
    #[serde(deserialize_with = "parse_f64")]
    pub latitude: f64,
    #[serde(deserialize_with = "parse_f64")]
    pub longitude: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// A domain event ready to be wrapped in an envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    TripStarted(TripStartedData),
    TripEnded(TripEndedData),
    LocationUpdated(LocationUpdatedData),
}

impl DomainEvent {
    pub fn trip_started(trip: &Trip) -> Self {
        DomainEvent::TripStarted(TripStartedData {
            trip_id: trip.id,
            scooter_id: trip.scooter_id,
            user_id: trip.user_id,
            start_latitude: trip.start_lat,
            start_longitude: trip.start_lng,
            start_time: trip.start_time,
        })
    }

    /// Built from a completed trip; end fields fall back to the start values
    /// only if the row is missing them.
    pub fn trip_ended(trip: &Trip) -> Self {
        DomainEvent::TripEnded(TripEndedData {
            trip_id: trip.id,
            scooter_id: trip.scooter_id,
            user_id: trip.user_id,
            end_latitude: trip.end_lat.unwrap_or(trip.start_lat),
            end_longitude: trip.end_lng.unwrap_or(trip.start_lng),
            end_time: trip.end_time.unwrap_or(trip.start_time),
            duration_seconds: trip.duration_seconds().unwrap_or(0),
        })
    }

    pub fn location_updated(
        update: &LocationUpdate,
        trip_id: Option<Uuid>,
        heading: f64,
        speed: f64,
    ) -> Self {
        DomainEvent::LocationUpdated(LocationUpdatedData {
            update_id: Some(update.id),
            scooter_id: update.scooter_id,
            trip_id,
            latitude: update.lat,
            longitude: update.lng,
            heading,
            speed,
            recorded_at: Some(update.timestamp),
        })
    }

    pub fn event_type(&self) -> EventType {
        match self {
            DomainEvent::TripStarted(_) => EventType::TripStarted,
            DomainEvent::TripEnded(_) => EventType::TripEnded,
            DomainEvent::LocationUpdated(_) => EventType::LocationUpdated,
        }
    }

    /// Wraps the event with a fresh id and emission time.
    pub fn into_envelope(self) -> EventEnvelope<DomainEvent> {
        EventEnvelope {
            event_type: self.event_type(),
            event_id: Uuid::new_v4(),
            timestamp: super::now_millis(),
            version: EVENT_VERSION.to_string(),
            data: self,
        }
    }
}

/// Accepts coordinates as JSON numbers or numeric strings.
fn parse_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        String(String),
        Float(f64),
    }

    match StringOrFloat::deserialize(deserializer)? {
        StringOrFloat::Float(f) => Ok(f),
        StringOrFloat::String(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}
