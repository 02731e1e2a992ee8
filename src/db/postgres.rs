//! Repositories bound to one PostgreSQL transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Connection, Postgres, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::queries;
use crate::error::{StoreError, StoreResult};
use crate::geo::BoundingBox;
use crate::models::{
    now_millis, LocationUpdate, NewLocationUpdate, NewScooter, NewTrip, NewUser,
    ParseStatusError, Scooter, ScooterStatus, Trip, User,
};
use crate::store::{
    LocationUpdateRepository, Page, ScooterRepository, Transaction, TripRepository,
    UserRepository,
};

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTransaction {
    pub fn new(tx: sqlx::Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

fn decode_status<T>(raw: String) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = ParseStatusError>,
{
    raw.parse::<T>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn scooter_from_row(row: &PgRow) -> Result<Scooter, sqlx::Error> {
    Ok(Scooter {
        id: row.try_get("id")?,
        status: decode_status(row.try_get("status")?)?,
        current_lat: row.try_get("current_lat")?,
        current_lng: row.try_get("current_lng")?,
        last_seen: row.try_get("last_seen")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn trip_from_row(row: &PgRow) -> Result<Trip, sqlx::Error> {
    Ok(Trip {
        id: row.try_get("id")?,
        scooter_id: row.try_get("scooter_id")?,
        user_id: row.try_get("user_id")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        start_lat: row.try_get("start_lat")?,
        start_lng: row.try_get("start_lng")?,
        end_lat: row.try_get("end_lat")?,
        end_lng: row.try_get("end_lng")?,
        status: decode_status(row.try_get("status")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn location_from_row(row: &PgRow) -> Result<LocationUpdate, sqlx::Error> {
    Ok(LocationUpdate {
        id: row.try_get("id")?,
        scooter_id: row.try_get("scooter_id")?,
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
        timestamp: row.try_get("timestamp")?,
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn collect<T>(
    rows: Vec<PgRow>,
    map: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> StoreResult<Vec<T>> {
    rows.iter().map(|r| map(r).map_err(StoreError::from)).collect()
}

/// Unique-index violations become conflicts; everything else stays a
/// database error.
fn write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn require_row(rows_affected: u64) -> StoreResult<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl ScooterRepository for PgTransaction {
    async fn create(&mut self, scooter: NewScooter) -> StoreResult<Scooter> {
        let row = sqlx::query(queries::INSERT_SCOOTER)
            .bind(scooter.id)
            .bind(scooter.status.as_str())
            .bind(scooter.lat)
            .bind(scooter.lng)
            .bind(now_millis())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(write_error)?;
        Ok(scooter_from_row(&row)?)
    }

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Scooter>> {
        let row = sqlx::query(queries::SELECT_SCOOTER_BY_ID)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(scooter_from_row).transpose()?)
    }

    async fn get_by_id_for_update(&mut self, id: Uuid) -> StoreResult<Option<Scooter>> {
        let row = sqlx::query(queries::SELECT_SCOOTER_BY_ID_FOR_UPDATE)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(scooter_from_row).transpose()?)
    }

    async fn update(&mut self, scooter: &Scooter) -> StoreResult<Scooter> {
        let row = sqlx::query(queries::UPDATE_SCOOTER)
            .bind(scooter.id)
            .bind(scooter.status.as_str())
            .bind(scooter.current_lat)
            .bind(scooter.current_lng)
            .bind(scooter.last_seen)
            .bind(now_millis())
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(scooter_from_row(&row)?)
    }

    async fn soft_delete(&mut self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(queries::SOFT_DELETE_SCOOTER)
            .bind(id)
            .bind(now_millis())
            .execute(&mut *self.tx)
            .await?;
        require_row(result.rows_affected())
    }

    async fn list(&mut self, page: Page) -> StoreResult<(Vec<Scooter>, i64)> {
        let rows = sqlx::query(queries::LIST_SCOOTERS)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&mut *self.tx)
            .await?;
        let total: i64 = sqlx::query_scalar(queries::COUNT_SCOOTERS)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok((collect(rows, scooter_from_row)?, total))
    }

    async fn update_status_with_check(
        &mut self,
        id: Uuid,
        new_status: ScooterStatus,
        expected: ScooterStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query(queries::UPDATE_SCOOTER_STATUS_CHECKED)
            .bind(id)
            .bind(new_status.as_str())
            .bind(expected.as_str())
            .bind(now_millis())
            .execute(&mut *self.tx)
            .await?;
        require_row(result.rows_affected())
    }

    async fn update_location(
        &mut self,
        id: Uuid,
        lat: f64,
        lng: f64,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        // Savepoint: a failure here must leave the enclosing transaction usable.
        let mut savepoint = Connection::begin(&mut *self.tx).await?;
        let result = sqlx::query(queries::UPDATE_SCOOTER_LOCATION)
            .bind(id)
            .bind(lat)
            .bind(lng)
            .bind(seen_at)
            .bind(now_millis())
            .execute(&mut *savepoint)
            .await?;
        savepoint.commit().await?;
        require_row(result.rows_affected())
    }

    async fn get_in_bounds(&mut self, bbox: &BoundingBox) -> StoreResult<Vec<Scooter>> {
        let rows = sqlx::query(queries::SELECT_SCOOTERS_IN_BOUNDS)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lng)
            .bind(bbox.max_lng)
            .fetch_all(&mut *self.tx)
            .await?;
        collect(rows, scooter_from_row)
    }

    async fn get_by_status(&mut self, status: ScooterStatus) -> StoreResult<Vec<Scooter>> {
        let rows = sqlx::query(queries::SELECT_SCOOTERS_BY_STATUS)
            .bind(status.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        collect(rows, scooter_from_row)
    }

    async fn get_by_status_in_bounds(
        &mut self,
        status: ScooterStatus,
        bbox: &BoundingBox,
    ) -> StoreResult<Vec<Scooter>> {
        let rows = sqlx::query(queries::SELECT_SCOOTERS_BY_STATUS_IN_BOUNDS)
            .bind(status.as_str())
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lng)
            .bind(bbox.max_lng)
            .fetch_all(&mut *self.tx)
            .await?;
        collect(rows, scooter_from_row)
    }
}

#[async_trait]
impl UserRepository for PgTransaction {
    async fn create(&mut self, user: NewUser) -> StoreResult<User> {
        let row = sqlx::query(queries::INSERT_USER)
            .bind(user.id)
            .bind(now_millis())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(write_error)?;
        Ok(user_from_row(&row)?)
    }

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query(queries::SELECT_USER_BY_ID)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn get_by_id_for_update(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query(queries::SELECT_USER_BY_ID_FOR_UPDATE)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn update(&mut self, user: &User) -> StoreResult<User> {
        let row = sqlx::query(queries::TOUCH_USER)
            .bind(user.id)
            .bind(now_millis())
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(user_from_row(&row)?)
    }

    async fn soft_delete(&mut self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(queries::SOFT_DELETE_USER)
            .bind(id)
            .bind(now_millis())
            .execute(&mut *self.tx)
            .await?;
        require_row(result.rows_affected())
    }

    async fn list(&mut self, page: Page) -> StoreResult<(Vec<User>, i64)> {
        let rows = sqlx::query(queries::LIST_USERS)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&mut *self.tx)
            .await?;
        let total: i64 = sqlx::query_scalar(queries::COUNT_USERS)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok((collect(rows, user_from_row)?, total))
    }
}

#[async_trait]
impl TripRepository for PgTransaction {
    async fn create(&mut self, trip: NewTrip) -> StoreResult<Trip> {
        let row = sqlx::query(queries::INSERT_TRIP)
            .bind(trip.id)
            .bind(trip.scooter_id)
            .bind(trip.user_id)
            .bind(trip.start_time)
            .bind(trip.start_lat)
            .bind(trip.start_lng)
            .bind(now_millis())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(write_error)?;
        Ok(trip_from_row(&row)?)
    }

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Trip>> {
        let row = sqlx::query(queries::SELECT_TRIP_BY_ID)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(trip_from_row).transpose()?)
    }

    async fn update(&mut self, trip: &Trip) -> StoreResult<Trip> {
        let row = sqlx::query(queries::UPDATE_TRIP_END)
            .bind(trip.id)
            .bind(trip.end_time)
            .bind(trip.end_lat)
            .bind(trip.end_lng)
            .bind(trip.status.as_str())
            .bind(now_millis())
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(trip_from_row(&row)?)
    }

    async fn soft_delete(&mut self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(queries::SOFT_DELETE_TRIP)
            .bind(id)
            .bind(now_millis())
            .execute(&mut *self.tx)
            .await?;
        require_row(result.rows_affected())
    }

    async fn list(&mut self, page: Page) -> StoreResult<(Vec<Trip>, i64)> {
        let rows = sqlx::query(queries::LIST_TRIPS)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&mut *self.tx)
            .await?;
        let total: i64 = sqlx::query_scalar(queries::COUNT_TRIPS)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok((collect(rows, trip_from_row)?, total))
    }

    async fn get_active_by_scooter(&mut self, scooter_id: Uuid) -> StoreResult<Option<Trip>> {
        let row = sqlx::query(queries::SELECT_ACTIVE_TRIP_BY_SCOOTER)
            .bind(scooter_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(trip_from_row).transpose()?)
    }

    async fn get_active_by_user(&mut self, user_id: Uuid) -> StoreResult<Option<Trip>> {
        let row = sqlx::query(queries::SELECT_ACTIVE_TRIP_BY_USER)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(trip_from_row).transpose()?)
    }

    async fn list_by_scooter(&mut self, scooter_id: Uuid, page: Page) -> StoreResult<Vec<Trip>> {
        let rows = sqlx::query(queries::LIST_TRIPS_BY_SCOOTER)
            .bind(scooter_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&mut *self.tx)
            .await?;
        collect(rows, trip_from_row)
    }

    async fn list_by_user(&mut self, user_id: Uuid, page: Page) -> StoreResult<Vec<Trip>> {
        let rows = sqlx::query(queries::LIST_TRIPS_BY_USER)
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&mut *self.tx)
            .await?;
        collect(rows, trip_from_row)
    }
}

#[async_trait]
impl LocationUpdateRepository for PgTransaction {
    async fn create(&mut self, update: NewLocationUpdate) -> StoreResult<LocationUpdate> {
        let row = sqlx::query(queries::INSERT_LOCATION_UPDATE)
            .bind(update.id)
            .bind(update.scooter_id)
            .bind(update.lat)
            .bind(update.lng)
            .bind(update.timestamp)
            .bind(now_millis())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(write_error)?;
        Ok(location_from_row(&row)?)
    }

    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<LocationUpdate>> {
        let row = sqlx::query(queries::SELECT_LOCATION_UPDATE_BY_ID)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(location_from_row).transpose()?)
    }

    async fn list_by_scooter(
        &mut self,
        scooter_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<LocationUpdate>> {
        let rows = sqlx::query(queries::LIST_LOCATION_UPDATES_BY_SCOOTER)
            .bind(scooter_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&mut *self.tx)
            .await?;
        collect(rows, location_from_row)
    }
}

#[async_trait]
impl Transaction for PgTransaction {
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
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
