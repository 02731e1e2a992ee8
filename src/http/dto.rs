//! Request and response bodies for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fleet::{ClosestScooters, NearbyScooter, ScooterDetails, ScooterPage};
use crate::models::{LocationUpdate, Scooter, ScooterStatus, Trip, TripStatus};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const DEFAULT_CLOSEST_LIMIT: i64 = 10;
pub const DEFAULT_RADIUS_METERS: f64 = 1000.0;

#[derive(Debug, Deserialize)]
pub struct StartTripRequest {
    pub user_id: Uuid,
    pub start_latitude: f64,
    pub start_longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct EndTripRequest {
    pub end_latitude: f64,
    pub end_longitude: f64,
}

/// `timestamp` is required for binding; the stored sample is stamped with
/// the server clock.
#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListScootersParams {
    pub status: Option<String>,
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lng: Option<f64>,
    pub max_lng: Option<f64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ClosestParams {
    pub lat: f64,
    pub lng: f64,
    pub radius: Option<f64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub service: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TripResponse {
    pub trip_id: Uuid,
    pub scooter_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub start_latitude: f64,
    pub start_longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub status: TripStatus,
}

impl From<Trip> for TripResponse {
    fn from(trip: Trip) -> Self {
        Self {
            duration_seconds: trip.duration_seconds(),
            trip_id: trip.id,
            scooter_id: trip.scooter_id,
            user_id: trip.user_id,
            start_time: trip.start_time,
            start_latitude: trip.start_lat,
            start_longitude: trip.start_lng,
            end_time: trip.end_time,
            end_latitude: trip.end_lat,
            end_longitude: trip.end_lng,
            status: trip.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScooterResponse {
    pub id: Uuid,
    pub status: ScooterStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Scooter> for ScooterResponse {
    fn from(scooter: Scooter) -> Self {
        Self {
            id: scooter.id,
            status: scooter.status,
            latitude: scooter.current_lat,
            longitude: scooter.current_lng,
            last_seen: scooter.last_seen,
            created_at: scooter.created_at,
            updated_at: scooter.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScooterDetailResponse {
    #[serde(flatten)]
    pub scooter: ScooterResponse,
    pub active_trip: Option<TripResponse>,
}

impl From<ScooterDetails> for ScooterDetailResponse {
    fn from(details: ScooterDetails) -> Self {
        Self {
            scooter: details.scooter.into(),
            active_trip: details.active_trip.map(TripResponse::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScooterListResponse {
    pub scooters: Vec<ScooterResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl From<ScooterPage> for ScooterListResponse {
    fn from(page: ScooterPage) -> Self {
        Self {
            scooters: page.scooters.into_iter().map(ScooterResponse::from).collect(),
            total: page.total,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NearbyScooterResponse {
    #[serde(flatten)]
    pub scooter: ScooterResponse,
    pub distance_meters: f64,
}

impl From<NearbyScooter> for NearbyScooterResponse {
    fn from(nearby: NearbyScooter) -> Self {
        Self {
            scooter: nearby.scooter.into(),
            distance_meters: nearby.distance_meters,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CenterResponse {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct ClosestResponse {
    pub scooters: Vec<NearbyScooterResponse>,
    pub center: CenterResponse,
    pub radius_meters: f64,
}

impl From<ClosestScooters> for ClosestResponse {
    fn from(closest: ClosestScooters) -> Self {
        Self {
            scooters: closest
                .scooters
                .into_iter()
                .map(NearbyScooterResponse::from)
                .collect(),
            center: CenterResponse {
                latitude: closest.center.lat,
                longitude: closest.center.lng,
            },
            radius_meters: closest.radius_meters,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LocationUpdateResponse {
    pub update_id: Uuid,
    pub scooter_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<LocationUpdate> for LocationUpdateResponse {
    fn from(update: LocationUpdate) -> Self {
        Self {
            update_id: update.id,
            scooter_id: update.scooter_id,
            latitude: update.lat,
            longitude: update.lng,
            timestamp: update.timestamp,
        }
    }
}
