//! In-process implementation of the repository capabilities.
//!
//! A transaction takes the whole store for its lifetime and works on a
//! private copy that replaces the shared tables on commit, so isolation is
//! serializable. Faults can be injected to exercise the failure paths of
//! the trip engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    LocationUpdateRepository, Page, ScooterRepository, Transaction, TripRepository, UnitOfWork,
    UserRepository,
};
use crate::error::{StoreError, StoreResult};
use crate::geo::BoundingBox;
use crate::models::{
    now_millis, LocationUpdate, NewLocationUpdate, NewScooter, NewTrip, NewUser, Scooter,
    ScooterStatus, Trip, TripStatus, User,
};

/// Full copy of every table.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub scooters: Vec<Scooter>,
    pub users: Vec<User>,
    pub trips: Vec<Trip>,
    pub locations: Vec<LocationUpdate>,
}

/// One-shot failure points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Begin,
    Commit,
    ScooterLocation,
    /// `update_status_with_check` finds the row already moved.
    StatusCheck,
    /// Trip insert hits the one-active-trip constraint.
    TripInsert,
    /// Active-trip lookup by scooter fails.
    TripRead,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Snapshot>>,
    faults: Arc<StdMutex<HashSet<Fault>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `fault`; the next operation that reaches it fails once.
    pub fn inject_fault(&self, fault: Fault) {
        lock_faults(&self.faults).insert(fault);
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.tables.lock().await.clone()
    }

    pub async fn seed_scooter(&self, id: Uuid, lat: f64, lng: f64) -> StoreResult<Scooter> {
        let mut tx = self.begin().await?;
        let scooter = tx
            .scooters()
            .create(NewScooter {
                id,
                status: ScooterStatus::Available,
                lat,
                lng,
            })
            .await?;
        tx.commit().await?;
        Ok(scooter)
    }

    pub async fn seed_user(&self, id: Uuid) -> StoreResult<User> {
        let mut tx = self.begin().await?;
        let user = tx.users().create(NewUser { id }).await?;
        tx.commit().await?;
        Ok(user)
    }
}

fn lock_faults(faults: &StdMutex<HashSet<Fault>>) -> std::sync::MutexGuard<'_, HashSet<Fault>> {
    faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_fault(faults: &StdMutex<HashSet<Fault>>, fault: Fault) -> bool {
    lock_faults(faults).remove(&fault)
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        if take_fault(&self.faults, Fault::Begin) {
            return Err(StoreError::Unavailable("injected begin failure".to_string()));
        }
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            work,
            faults: self.faults.clone(),
        }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Snapshot>,
    work: Snapshot,
    faults: Arc<StdMutex<HashSet<Fault>>>,
}

trait Row: Clone {
    fn created_at(&self) -> DateTime<Utc>;
    fn deleted(&self) -> bool;
}

macro_rules! impl_row {
    ($($ty:ty),*) => {
        $(impl Row for $ty {
            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }
            fn deleted(&self) -> bool {
                self.deleted_at.is_some()
            }
        })*
    };
}

impl_row!(Scooter, User, Trip, LocationUpdate);

/// Live rows matching `keep`, newest first; equal timestamps put the later
/// insert first.
fn newest_first<T: Row>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    let mut out: Vec<T> = rows
        .iter()
        .rev()
        .filter(|r| !r.deleted() && keep(r))
        .cloned()
        .collect();
    out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    out
}

fn paginate<T>(rows: Vec<T>, page: Page) -> Vec<T> {
    let offset = usize::try_from(page.offset.max(0)).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit.max(0)).unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

impl MemoryTransaction {
    fn live_scooter_mut(&mut self, id: Uuid) -> Option<&mut Scooter> {
        self.work
            .scooters
            .iter_mut()
            .find(|s| s.id == id && s.deleted_at.is_none())
    }
}

#[async_trait]
impl ScooterRepository for MemoryTransaction {
    async fn create(&mut self, scooter: NewScooter) -> StoreResult<Scooter> {
        if self.work.scooters.iter().any(|s| s.id == scooter.id) {
            return Err(StoreError::Conflict(format!("scooter {} exists", scooter.id)));
        }
        let now = now_millis();
        let row = Scooter {
            id: scooter.id,
            status: scooter.status,
            current_lat: scooter.lat,
            current_lng: scooter.lng,
            last_seen: now,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.work.scooters.push(row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Scooter>> {
        Ok(self
            .work
            .scooters
            .iter()
            .find(|s| s.id == id && s.deleted_at.is_none())
            .cloned())
    }

    async fn get_by_id_for_update(&mut self, id: Uuid) -> StoreResult<Option<Scooter>> {
        // The transaction already holds the whole store.
        ScooterRepository::get_by_id(self, id).await
    }

    async fn update(&mut self, scooter: &Scooter) -> StoreResult<Scooter> {
        let now = now_millis();
        let row = self.live_scooter_mut(scooter.id).ok_or(StoreError::NotFound)?;
        row.status = scooter.status;
        row.current_lat = scooter.current_lat;
        row.current_lng = scooter.current_lng;
        row.last_seen = row.last_seen.max(scooter.last_seen);
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn soft_delete(&mut self, id: Uuid) -> StoreResult<()> {
        let now = now_millis();
        let row = self.live_scooter_mut(id).ok_or(StoreError::NotFound)?;
        row.deleted_at = Some(now);
        row.updated_at = now;
        Ok(())
    }

    async fn list(&mut self, page: Page) -> StoreResult<(Vec<Scooter>, i64)> {
        let all = newest_first(&self.work.scooters, |_| true);
        let total = all.len() as i64;
        Ok((paginate(all, page), total))
    }

    async fn update_status_with_check(
        &mut self,
        id: Uuid,
        new_status: ScooterStatus,
        expected: ScooterStatus,
    ) -> StoreResult<()> {
        if take_fault(&self.faults, Fault::StatusCheck) {
            return Err(StoreError::NotFound);
        }
        let now = now_millis();
        match self.live_scooter_mut(id) {
            Some(row) if row.status == expected => {
                row.status = new_status;
                row.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn update_location(
        &mut self,
        id: Uuid,
        lat: f64,
        lng: f64,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if take_fault(&self.faults, Fault::ScooterLocation) {
            return Err(StoreError::Unavailable(
                "injected scooter location failure".to_string(),
            ));
        }
        let now = now_millis();
        let row = self.live_scooter_mut(id).ok_or(StoreError::NotFound)?;
        row.current_lat = lat;
        row.current_lng = lng;
        row.last_seen = row.last_seen.max(seen_at);
        row.updated_at = now;
        Ok(())
    }

    async fn get_in_bounds(&mut self, bbox: &BoundingBox) -> StoreResult<Vec<Scooter>> {
        Ok(newest_first(&self.work.scooters, |s| {
            bbox.contains(s.current_lat, s.current_lng)
        }))
    }

    async fn get_by_status(&mut self, status: ScooterStatus) -> StoreResult<Vec<Scooter>> {
        Ok(newest_first(&self.work.scooters, |s| s.status == status))
    }

    async fn get_by_status_in_bounds(
        &mut self,
        status: ScooterStatus,
        bbox: &BoundingBox,
    ) -> StoreResult<Vec<Scooter>> {
        Ok(newest_first(&self.work.scooters, |s| {
            s.status == status && bbox.contains(s.current_lat, s.current_lng)
        }))
    }
}

#[async_trait]
impl UserRepository for MemoryTransaction {
    async fn create(&mut self, user: NewUser) -> StoreResult<User> {
        if self.work.users.iter().any(|u| u.id == user.id) {
            return Err(StoreError::Conflict(format!("user {} exists", user.id)));
        }
        let now = now_millis();
        let row = User {
            id: user.id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.work.users.push(row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self
            .work
            .users
            .iter()
            .find(|u| u.id == id && u.deleted_at.is_none())
            .cloned())
    }

    async fn get_by_id_for_update(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        UserRepository::get_by_id(self, id).await
    }

    async fn update(&mut self, user: &User) -> StoreResult<User> {
        let now = now_millis();
        let row = self
            .work
            .users
            .iter_mut()
            .find(|u| u.id == user.id && u.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn soft_delete(&mut self, id: Uuid) -> StoreResult<()> {
        let now = now_millis();
        let row = self
            .work
            .users
            .iter_mut()
            .find(|u| u.id == id && u.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;
        row.deleted_at = Some(now);
        row.updated_at = now;
        Ok(())
    }

    async fn list(&mut self, page: Page) -> StoreResult<(Vec<User>, i64)> {
        let all = newest_first(&self.work.users, |_| true);
        let total = all.len() as i64;
        Ok((paginate(all, page), total))
    }
}

#[async_trait]
impl TripRepository for MemoryTransaction {
    async fn create(&mut self, trip: NewTrip) -> StoreResult<Trip> {
        if take_fault(&self.faults, Fault::TripInsert) {
            return Err(StoreError::Conflict("injected active trip conflict".to_string()));
        }
        let clash = self.work.trips.iter().any(|t| {
            t.deleted_at.is_none()
                && t.status == TripStatus::Active
                && (t.scooter_id == trip.scooter_id || t.user_id == trip.user_id)
        });
        if clash || self.work.trips.iter().any(|t| t.id == trip.id) {
            return Err(StoreError::Conflict(format!(
                "active trip exists for scooter {} or user {}",
                trip.scooter_id, trip.user_id
            )));
        }
        let now = now_millis();
        let row = Trip {
            id: trip.id,
            scooter_id: trip.scooter_id,
            user_id: trip.user_id,
            start_time: trip.start_time,
            end_time: None,
            start_lat: trip.start_lat,
            start_lng: trip.start_lng,
            end_lat: None,
            end_lng: None,
            status: TripStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.work.trips.push(row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Trip>> {
        Ok(self
            .work
            .trips
            .iter()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .cloned())
    }

    async fn update(&mut self, trip: &Trip) -> StoreResult<Trip> {
        let now = now_millis();
        let row = self
            .work
            .trips
            .iter_mut()
            .find(|t| t.id == trip.id && t.is_active() && t.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;
        row.end_time = trip.end_time;
        row.end_lat = trip.end_lat;
        row.end_lng = trip.end_lng;
        row.status = trip.status;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn soft_delete(&mut self, id: Uuid) -> StoreResult<()> {
        let now = now_millis();
        let row = self
            .work
            .trips
            .iter_mut()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;
        row.deleted_at = Some(now);
        row.updated_at = now;
        Ok(())
    }

    async fn list(&mut self, page: Page) -> StoreResult<(Vec<Trip>, i64)> {
        let all = newest_first(&self.work.trips, |_| true);
        let total = all.len() as i64;
        Ok((paginate(all, page), total))
    }

    async fn get_active_by_scooter(&mut self, scooter_id: Uuid) -> StoreResult<Option<Trip>> {
        if take_fault(&self.faults, Fault::TripRead) {
            return Err(StoreError::Unavailable("injected trip read failure".to_string()));
        }
        Ok(newest_first(&self.work.trips, |t| {
            t.scooter_id == scooter_id && t.is_active()
        })
        .into_iter()
        .next())
    }

    async fn get_active_by_user(&mut self, user_id: Uuid) -> StoreResult<Option<Trip>> {
        Ok(newest_first(&self.work.trips, |t| t.user_id == user_id && t.is_active())
            .into_iter()
            .next())
    }

    async fn list_by_scooter(&mut self, scooter_id: Uuid, page: Page) -> StoreResult<Vec<Trip>> {
        Ok(paginate(
            newest_first(&self.work.trips, |t| t.scooter_id == scooter_id),
            page,
        ))
    }

    async fn list_by_user(&mut self, user_id: Uuid, page: Page) -> StoreResult<Vec<Trip>> {
        Ok(paginate(
            newest_first(&self.work.trips, |t| t.user_id == user_id),
            page,
        ))
    }
}

#[async_trait]
impl LocationUpdateRepository for MemoryTransaction {
    async fn create(&mut self, update: NewLocationUpdate) -> StoreResult<LocationUpdate> {
        if self.work.locations.iter().any(|l| l.id == update.id) {
            return Err(StoreError::Conflict(format!(
                "location update {} already exists",
                update.id
            )));
        }
        let row = LocationUpdate {
            id: update.id,
            scooter_id: update.scooter_id,
            lat: update.lat,
            lng: update.lng,
            timestamp: update.timestamp,
            created_at: now_millis(),
            deleted_at: None,
        };
        self.work.locations.push(row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<LocationUpdate>> {
        Ok(self
            .work
            .locations
            .iter()
            .find(|l| l.id == id && l.deleted_at.is_none())
            .cloned())
    }

    async fn list_by_scooter(
        &mut self,
        scooter_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<LocationUpdate>> {
        Ok(paginate(
            newest_first(&self.work.locations, |l| l.scooter_id == scooter_id),
            page,
        ))
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn scooters(&mut self) -> &mut dyn ScooterRepository {
        self
    }

    fn users(&mut self) -> &mut dyn UserRepository {
        self
    }

    fn trips(&mut self) -> &mut dyn TripRepository {
        self
    }

    fn locations(&mut self) -> &mut dyn LocationUpdateRepository {
        self
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if take_fault(&self.faults, Fault::Commit) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        let MemoryTransaction {
            mut guard, work, ..
        } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.users().create(NewUser { id: id(1) }).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.snapshot().await.users.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.users().create(NewUser { id: id(1) }).await.unwrap();
        }
        assert!(store.snapshot().await.users.is_empty());
    }

    #[tokio::test]
    async fn test_commit_fault_leaves_store_untouched() {
        let store = MemoryStore::new();
        store.inject_fault(Fault::Commit);
        let mut tx = store.begin().await.unwrap();
        tx.users().create(NewUser { id: id(1) }).await.unwrap();

        assert!(tx.commit().await.is_err());
        assert!(store.snapshot().await.users.is_empty());
    }

    #[tokio::test]
    async fn test_soft_deleted_rows_are_hidden() {
        let store = MemoryStore::new();
        store.seed_scooter(id(1), 45.0, -75.0).await.unwrap();
        store.seed_scooter(id(2), 45.0, -75.0).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.scooters().soft_delete(id(1)).await.unwrap();
        assert!(tx.scooters().get_by_id(id(1)).await.unwrap().is_none());
        let (rows, total) = tx.scooters().list(Page::new(10, 0)).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, id(2));
        assert!(matches!(
            tx.scooters().soft_delete(id(1)).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paginated() {
        let store = MemoryStore::new();
        for n in 1..=5 {
            store.seed_user(id(n)).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        let (rows, total) = tx.users().list(Page::new(2, 1)).await.unwrap();
        assert_eq!(total, 5);
        let ids: Vec<_> = rows.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![id(4), id(3)]);
    }

    #[tokio::test]
    async fn test_update_status_with_check() {
        let store = MemoryStore::new();
        store.seed_scooter(id(1), 45.0, -75.0).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let repo = tx.scooters();
        repo.update_status_with_check(id(1), ScooterStatus::Occupied, ScooterStatus::Available)
            .await
            .unwrap();
        assert!(matches!(
            repo.update_status_with_check(id(1), ScooterStatus::Occupied, ScooterStatus::Available)
                .await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            repo.update_status_with_check(id(9), ScooterStatus::Occupied, ScooterStatus::Available)
                .await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_last_seen_never_moves_backwards() {
        let store = MemoryStore::new();
        let seeded = store.seed_scooter(id(1), 45.0, -75.0).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let earlier = seeded.last_seen - chrono::Duration::seconds(30);
        tx.scooters()
            .update_location(id(1), 45.1, -75.1, earlier)
            .await
            .unwrap();
        let row = tx.scooters().get_by_id(id(1)).await.unwrap().unwrap();
        assert_eq!(row.current_lat, 45.1);
        assert_eq!(row.last_seen, seeded.last_seen);
    }

    #[tokio::test]
    async fn test_second_active_trip_conflicts() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let new_trip = |trip: u128, scooter: u128, user: u128| NewTrip {
            id: id(trip),
            scooter_id: id(scooter),
            user_id: id(user),
            start_time: now_millis(),
            start_lat: 0.0,
            start_lng: 0.0,
        };
        tx.trips().create(new_trip(1, 10, 20)).await.unwrap();
        assert!(matches!(
            tx.trips().create(new_trip(2, 10, 21)).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            tx.trips().create(new_trip(3, 11, 20)).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_terminal_trip_is_not_rewritten() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut trip = tx
            .trips()
            .create(NewTrip {
                id: id(1),
                scooter_id: id(10),
                user_id: id(20),
                start_time: now_millis(),
                start_lat: 0.0,
                start_lng: 0.0,
            })
            .await
            .unwrap();

        trip.finish(TripStatus::Completed, now_millis(), Some((1.0, 1.0)));
        tx.trips().update(&trip).await.unwrap();

        let mut stale = trip.clone();
        stale.finish(TripStatus::Cancelled, now_millis(), None);
        assert!(matches!(
            tx.trips().update(&stale).await,
            Err(StoreError::NotFound)
        ));
        let row = tx.trips().get_by_id(id(1)).await.unwrap().unwrap();
        assert_eq!(row.status, TripStatus::Completed);
        assert_eq!(row.end_lat, Some(1.0));
    }

    #[tokio::test]
    async fn test_duplicate_location_id_conflicts() {
        let store = MemoryStore::new();
        store.seed_scooter(id(1), 45.0, -75.0).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let sample = || NewLocationUpdate {
            id: id(7),
            scooter_id: id(1),
            lat: 45.0,
            lng: -75.0,
            timestamp: now_millis(),
        };
        tx.locations().create(sample()).await.unwrap();
        assert!(matches!(
            tx.locations().create(sample()).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_closest_with_radius_filters_and_orders() {
        let store = MemoryStore::new();
        store.seed_scooter(id(1), 45.4300, -75.6972).await.unwrap();
        store.seed_scooter(id(2), 45.4216, -75.6973).await.unwrap();
        store.seed_scooter(id(3), 45.5017, -73.5673).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let center = Coordinate::new(45.4215, -75.6972);
        let rows = tx
            .scooters()
            .get_closest_with_radius(center, 2.0, Some(ScooterStatus::Available), 10)
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![id(2), id(1)]);

        let everything = tx
            .scooters()
            .get_closest_with_radius(center, 0.0, None, 0)
            .await
            .unwrap();
        assert_eq!(everything.len(), 3);
        assert_eq!(everything[2].id, id(3));
    }

    #[tokio::test]
    async fn test_closest_finds_scooter_across_antimeridian() {
        let store = MemoryStore::new();
        store.seed_scooter(id(1), 0.0, -179.999).await.unwrap();
        store.seed_scooter(id(2), 0.0, 170.0).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let rows = tx
            .scooters()
            .get_closest_with_radius(Coordinate::new(0.0, 179.999), 1.0, None, 10)
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![id(1)]);
    }
}
