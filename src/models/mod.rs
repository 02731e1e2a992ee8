pub mod event;
pub mod location_update;
pub mod scooter;
pub mod trip;
pub mod user;

pub use event::{DomainEvent, EventEnvelope, EventType};
pub use location_update::{LocationUpdate, NewLocationUpdate};
pub use scooter::{NewScooter, Scooter, ScooterStatus};
pub use trip::{NewTrip, Trip, TripStatus};
pub use user::{NewUser, User};

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;

/// Current UTC time truncated to millisecond resolution.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown {kind} status: {value}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}
