//! Repository capabilities and the unit of work that binds them to one
//! transaction.
//!
//! Every read filters out soft-deleted rows. Lists and finders return rows
//! ordered by `created_at` descending, ties broken by id. Single-row
//! lookups return `Ok(None)` for a missing row so that "absent" never looks
//! like a query failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::geo::{filter_sort_limit, BoundingBox, Coordinate};
use crate::models::{
    LocationUpdate, NewLocationUpdate, NewScooter, NewTrip, NewUser, Scooter, ScooterStatus, Trip,
    User,
};

pub mod memory;

pub use memory::MemoryStore;

/// Offset pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }
}

#[async_trait]
pub trait ScooterRepository: Send {
    async fn create(&mut self, scooter: NewScooter) -> StoreResult<Scooter>;

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Scooter>>;

    /// Like [`get_by_id`](Self::get_by_id) but holds a row lock until the
    /// transaction ends, blocking other lockers of the same id.
    async fn get_by_id_for_update(&mut self, id: Uuid) -> StoreResult<Option<Scooter>>;

    /// Writes status and position; `last_seen` never moves backwards.
    async fn update(&mut self, scooter: &Scooter) -> StoreResult<Scooter>;

    async fn soft_delete(&mut self, id: Uuid) -> StoreResult<()>;

    /// One page plus the total number of live rows.
    async fn list(&mut self, page: Page) -> StoreResult<(Vec<Scooter>, i64)>;

    /// Sets `status = new_status` only if the row still has `expected`.
    /// Returns `StoreError::NotFound` when no row changed.
    async fn update_status_with_check(
        &mut self,
        id: Uuid,
        new_status: ScooterStatus,
        expected: ScooterStatus,
    ) -> StoreResult<()>;

    /// Moves the materialized position; `last_seen` never moves backwards.
    async fn update_location(
        &mut self,
        id: Uuid,
        lat: f64,
        lng: f64,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn get_in_bounds(&mut self, bbox: &BoundingBox) -> StoreResult<Vec<Scooter>>;

    async fn get_by_status(&mut self, status: ScooterStatus) -> StoreResult<Vec<Scooter>>;

    async fn get_by_status_in_bounds(
        &mut self,
        status: ScooterStatus,
        bbox: &BoundingBox,
    ) -> StoreResult<Vec<Scooter>>;

    /// Narrows the scan with a bounding box, then keeps scooters within
    /// `radius_km` ordered by distance. A non-positive radius scans
    /// everything; a non-positive limit returns every match.
    async fn get_closest_with_radius(
        &mut self,
        center: Coordinate,
        radius_km: f64,
        status: Option<ScooterStatus>,
        limit: i64,
    ) -> StoreResult<Vec<Scooter>> {
        let bbox = if radius_km > 0.0 {
            BoundingBox::around(center, radius_km)
        } else {
            BoundingBox::WORLD
        };

        let candidates = match status {
            Some(status) => self.get_by_status_in_bounds(status, &bbox).await?,
            None => self.get_in_bounds(&bbox).await?,
        };

        Ok(filter_sort_limit(candidates, center, radius_km, limit)
            .into_iter()
            .map(|ranked| ranked.item)
            .collect())
    }
}

#[async_trait]
pub trait UserRepository: Send {
    async fn create(&mut self, user: NewUser) -> StoreResult<User>;

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<User>>;

    /// Row-locking variant used to serialize trip starts for one user.
    async fn get_by_id_for_update(&mut self, id: Uuid) -> StoreResult<Option<User>>;

    /// Refreshes `updated_at`.
    async fn update(&mut self, user: &User) -> StoreResult<User>;

    async fn soft_delete(&mut self, id: Uuid) -> StoreResult<()>;

    async fn list(&mut self, page: Page) -> StoreResult<(Vec<User>, i64)>;
}

#[async_trait]
pub trait TripRepository: Send {
    /// Inserts an active trip. A second active trip for the same scooter or
    /// user is rejected with `StoreError::Conflict`.
    async fn create(&mut self, trip: NewTrip) -> StoreResult<Trip>;

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Trip>>;

    /// Persists end time, end coordinates and status. Only an active row is
    /// written; a terminal or missing trip yields `StoreError::NotFound`.
    async fn update(&mut self, trip: &Trip) -> StoreResult<Trip>;

    async fn soft_delete(&mut self, id: Uuid) -> StoreResult<()>;

    async fn list(&mut self, page: Page) -> StoreResult<(Vec<Trip>, i64)>;

    async fn get_active_by_scooter(&mut self, scooter_id: Uuid) -> StoreResult<Option<Trip>>;

    async fn get_active_by_user(&mut self, user_id: Uuid) -> StoreResult<Option<Trip>>;

    async fn list_by_scooter(&mut self, scooter_id: Uuid, page: Page) -> StoreResult<Vec<Trip>>;

    async fn list_by_user(&mut self, user_id: Uuid, page: Page) -> StoreResult<Vec<Trip>>;
}

/// Append-only: location samples have no update or delete path.
#[async_trait]
pub trait LocationUpdateRepository: Send {
    async fn create(&mut self, update: NewLocationUpdate) -> StoreResult<LocationUpdate>;

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<LocationUpdate>>;

    async fn list_by_scooter(
        &mut self,
        scooter_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<LocationUpdate>>;
}

/// An open transaction handing out repositories bound to itself.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait Transaction: Send {
    fn scooters(&mut self) -> &mut dyn ScooterRepository;

    fn users(&mut self) -> &mut dyn UserRepository;

    fn trips(&mut self) -> &mut dyn TripRepository;

    fn locations(&mut self) -> &mut dyn LocationUpdateRepository;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;
}

/// Ends a read-only transaction; a failed rollback is only logged.
pub async fn release(tx: Box<dyn Transaction>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Failed to release read transaction");
    }
}
