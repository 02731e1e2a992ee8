use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseStatusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Active,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Active => "active",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled trips never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TripStatus::Active)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TripStatus::Active),
            "completed" => Ok(TripStatus::Completed),
            "cancelled" => Ok(TripStatus::Cancelled),
            other => Err(ParseStatusError {
                kind: "trip",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trip {
    pub id: Uuid,
    pub scooter_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_lat: f64,
    pub start_lng: f64,
    pub end_lat: Option<f64>,
    pub end_lng: Option<f64>,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Trip {
    pub fn is_active(&self) -> bool {
        self.status == TripStatus::Active
    }

    /// Whole seconds between start and end, `None` while the trip is active.
    pub fn duration_seconds(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds().max(0))
    }

    /// Applies a terminal transition. The end time never precedes the start.
    pub fn finish(&mut self, status: TripStatus, at: DateTime<Utc>, end: Option<(f64, f64)>) {
        self.status = status;
        self.end_time = Some(at.max(self.start_time));
        self.end_lat = end.map(|(lat, _)| lat);
        self.end_lng = end.map(|(_, lng)| lng);
    }
}

/// Values for a fresh active trip; timestamps other than `start_time` are
/// assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub id: Uuid,
    pub scooter_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub start_lat: f64,
    pub start_lng: f64,
}
