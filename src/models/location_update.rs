use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One position sample. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationUpdate {
    pub id: Uuid,
    pub scooter_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewLocationUpdate {
    pub id: Uuid,
    pub scooter_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}
