//! Error types shared by the persistence layer, the trip engine and the
//! fleet query service.

use thiserror::Error;
use uuid::Uuid;

pub use crate::geo::CoordinateError;

/// Failure reported by a repository or a unit of work.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No row matched (missing id, soft-deleted row, or a conditional
    /// update whose precondition no longer holds).
    #[error("record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflicting record: {0}")]
    Conflict(String),

    /// Error reported by PostgreSQL or the connection pool.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The backing store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Type alias for repository results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure while encoding or publishing a domain event.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

/// Coarse error classes exposed to callers of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCoordinate,
    InvalidRequest,
    Unauthorized,
    NotFound,
    Conflict,
    Internal,
}

/// Errors surfaced by the trip engine and the fleet query service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidCoordinate(#[from] CoordinateError),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("user {0} not found")]
    UserNotFound(Uuid),

    #[error("user {0} already has an active trip")]
    UserBusy(Uuid),

    #[error("scooter {0} not found")]
    ScooterNotFound(Uuid),

    #[error("scooter {0} is not available")]
    ScooterUnavailable(Uuid),

    #[error("scooter {0} already has an active trip")]
    ScooterBusy(Uuid),

    #[error("no active trip for scooter {0}")]
    NoActiveTrip(Uuid),

    #[error("trip {0} not found")]
    TripNotFound(Uuid),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("event publish failure: {0}")]
    Event(#[from] EventError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidCoordinate(_) => ErrorKind::InvalidCoordinate,
            ServiceError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ServiceError::UserNotFound(_)
            | ServiceError::ScooterNotFound(_)
            | ServiceError::NoActiveTrip(_)
            | ServiceError::TripNotFound(_) => ErrorKind::NotFound,
            ServiceError::UserBusy(_)
            | ServiceError::ScooterUnavailable(_)
            | ServiceError::ScooterBusy(_) => ErrorKind::Conflict,
            ServiceError::Store(_) | ServiceError::Event(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_errors_map_to_kinds() {
        let id = Uuid::new_v4();
        assert_eq!(ServiceError::UserBusy(id).kind(), ErrorKind::Conflict);
        assert_eq!(ServiceError::ScooterBusy(id).kind(), ErrorKind::Conflict);
        assert_eq!(ServiceError::ScooterUnavailable(id).kind(), ErrorKind::Conflict);
        assert_eq!(ServiceError::NoActiveTrip(id).kind(), ErrorKind::NotFound);
        assert_eq!(ServiceError::TripNotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            ServiceError::Store(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            ServiceError::from(CoordinateError::InvalidLatitude(91.0)).kind(),
            ErrorKind::InvalidCoordinate
        );
    }
}
