use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseStatusError;
use crate::geo::{Coordinate, LocationProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScooterStatus {
    Available,
    Occupied,
}

impl ScooterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScooterStatus::Available => "available",
            ScooterStatus::Occupied => "occupied",
        }
    }
}

impl fmt::Display for ScooterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScooterStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ScooterStatus::Available),
            "occupied" => Ok(ScooterStatus::Occupied),
            other => Err(ParseStatusError {
                kind: "scooter",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scooter {
    pub id: Uuid,
    pub status: ScooterStatus,
    pub current_lat: f64,
    pub current_lng: f64,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LocationProvider for Scooter {
    fn location(&self) -> Coordinate {
        Coordinate::new(self.current_lat, self.current_lng)
    }
}

/// Values for a scooter row; timestamps are assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewScooter {
    pub id: Uuid,
    pub status: ScooterStatus,
    pub lat: f64,
    pub lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [ScooterStatus::Available, ScooterStatus::Occupied] {
            assert_eq!(status.as_str().parse::<ScooterStatus>(), Ok(status));
        }
        assert!("broken".parse::<ScooterStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ScooterStatus::Occupied).unwrap(),
            "\"occupied\""
        );
    }
}
