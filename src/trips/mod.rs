//! Trip lifecycle: start, end, cancel and location ingestion.
//!
//! Every mutation runs inside one unit of work. The scooter's status and the
//! trip row move together or not at all; events go out only after the
//! transaction has committed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, StoreError};
use crate::geo;
use crate::kafka::EventPublisher;
use crate::models::{
    now_millis, DomainEvent, LocationUpdate, NewLocationUpdate, NewTrip, ScooterStatus, Trip,
    TripStatus,
};
use crate::store::{self, Transaction, UnitOfWork};


/// Request to begin a trip. `trip_id` and `started_at` are only set when
/// replaying an event that already carries them.
#[derive(Debug, Clone)]
pub struct StartTrip {
    pub scooter_id: Uuid,
    pub user_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub trip_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
}

/// A position report. `update_id` and `recorded_at` are only set when
/// replaying an event; a replayed id that is already stored is a no-op.
#[derive(Debug, Clone)]
pub struct LocationSample {
    pub scooter_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub speed: f64,
    pub update_id: Option<Uuid>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TripEngine {
    store: Arc<dyn UnitOfWork>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl TripEngine {
    /// An engine that emits no events.
    pub fn new(store: Arc<dyn UnitOfWork>) -> Self {
        Self {
            store,
            events: None,
        }
    }

    pub fn with_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn start_trip(&self, cmd: StartTrip) -> Result<Trip, ServiceError> {
        geo::validate(cmd.lat, cmd.lng)?;

        let mut tx = self.store.begin().await?;
        let outcome = start_in(tx.as_mut(), &cmd).await;
        let trip = finish(tx, outcome).await?;

        info!(
            trip_id = %trip.id,
            scooter_id = %trip.scooter_id,
            user_id = %trip.user_id,
            "Trip started"
        );
        self.publish(DomainEvent::trip_started(&trip)).await?;
        Ok(trip)
    }

    pub async fn end_trip(&self, scooter_id: Uuid, lat: f64, lng: f64) -> Result<Trip, ServiceError> {
        geo::validate(lat, lng)?;

        let mut tx = self.store.begin().await?;
        let outcome = close_in(tx.as_mut(), scooter_id, TripStatus::Completed, Some((lat, lng))).await;
        let trip = finish(tx, outcome).await?;

        info!(
            trip_id = %trip.id,
            scooter_id = %scooter_id,
            duration_seconds = trip.duration_seconds().unwrap_or(0),
            "Trip completed"
        );
        self.publish(DomainEvent::trip_ended(&trip)).await?;
        Ok(trip)
    }

    /// Ends the active trip without end coordinates. No event is emitted.
    pub async fn cancel_trip(&self, scooter_id: Uuid) -> Result<Trip, ServiceError> {
        let mut tx = self.store.begin().await?;
        let outcome = close_in(tx.as_mut(), scooter_id, TripStatus::Cancelled, None).await;
        let trip = finish(tx, outcome).await?;

        info!(trip_id = %trip.id, scooter_id = %scooter_id, "Trip cancelled");
        Ok(trip)
    }

    pub async fn update_location(&self, sample: LocationSample) -> Result<LocationUpdate, ServiceError> {
        geo::validate(sample.lat, sample.lng)?;

        let mut tx = self.store.begin().await?;
        let outcome = record_in(tx.as_mut(), &sample, self.events.is_some()).await;
        let (update, trip_id) = finish(tx, outcome).await?;

        debug!(scooter_id = %sample.scooter_id, lat = sample.lat, lng = sample.lng, "Location recorded");
        self.publish(DomainEvent::location_updated(
            &update,
            trip_id,
            sample.heading,
            sample.speed,
        ))
        .await?;
        Ok(update)
    }

    pub async fn get_active_trip_by_scooter(&self, scooter_id: Uuid) -> Result<Option<Trip>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let found = tx.trips().get_active_by_scooter(scooter_id).await;
        store::release(tx).await;
        Ok(found?)
    }

    pub async fn get_active_trip_by_user(&self, user_id: Uuid) -> Result<Option<Trip>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let found = tx.trips().get_active_by_user(user_id).await;
        store::release(tx).await;
        Ok(found?)
    }

    pub async fn get_trip_by_id(&self, trip_id: Uuid) -> Result<Trip, ServiceError> {
        let mut tx = self.store.begin().await?;
        let found = tx.trips().get_by_id(trip_id).await;
        store::release(tx).await;
        found?.ok_or(ServiceError::TripNotFound(trip_id))
    }

    async fn publish(&self, event: DomainEvent) -> Result<(), ServiceError> {
        if let Some(events) = &self.events {
            events.publish(event).await?;
        }
        Ok(())
    }
}

/// Commits on success, rolls back on failure. A commit failure surfaces as
/// a storage error.
async fn finish<T>(tx: Box<dyn Transaction>, outcome: Result<T, ServiceError>) -> Result<T, ServiceError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// `NotFound` from a status-checked update means the scooter left the
/// expected state under us.
fn status_moved(scooter_id: Uuid, err: StoreError) -> ServiceError {
    match err {
        StoreError::NotFound => ServiceError::ScooterUnavailable(scooter_id),
        other => ServiceError::Store(other),
    }
}

async fn start_in(tx: &mut dyn Transaction, cmd: &StartTrip) -> Result<Trip, ServiceError> {
    // User first: its row lock serializes concurrent starts by the same user.
    tx.users()
        .get_by_id_for_update(cmd.user_id)
        .await?
        .ok_or(ServiceError::UserNotFound(cmd.user_id))?;

    if tx.trips().get_active_by_user(cmd.user_id).await?.is_some() {
        return Err(ServiceError::UserBusy(cmd.user_id));
    }

    let scooter = tx
        .scooters()
        .get_by_id_for_update(cmd.scooter_id)
        .await?
        .ok_or(ServiceError::ScooterNotFound(cmd.scooter_id))?;

    if scooter.status != ScooterStatus::Available {
        return Err(ServiceError::ScooterUnavailable(cmd.scooter_id));
    }

    if tx.trips().get_active_by_scooter(cmd.scooter_id).await?.is_some() {
        return Err(ServiceError::ScooterBusy(cmd.scooter_id));
    }

    let started_at = cmd.started_at.unwrap_or_else(now_millis);
    let trip = tx
        .trips()
        .create(NewTrip {
            id: cmd.trip_id.unwrap_or_else(Uuid::new_v4),
            scooter_id: cmd.scooter_id,
            user_id: cmd.user_id,
            start_time: started_at,
            start_lat: cmd.lat,
            start_lng: cmd.lng,
        })
        .await
        .map_err(|err| match err {
            StoreError::Conflict(_) => ServiceError::ScooterBusy(cmd.scooter_id),
            other => ServiceError::Store(other),
        })?;

    tx.scooters()
        .update_status_with_check(cmd.scooter_id, ScooterStatus::Occupied, ScooterStatus::Available)
        .await
        .map_err(|err| status_moved(cmd.scooter_id, err))?;

    if let Err(err) = tx
        .scooters()
        .update_location(cmd.scooter_id, cmd.lat, cmd.lng, started_at)
        .await
    {
        warn!(scooter_id = %cmd.scooter_id, error = %err, "Failed to move scooter to trip start");
    }

    Ok(trip)
}

async fn close_in(
    tx: &mut dyn Transaction,
    scooter_id: Uuid,
    status: TripStatus,
    end: Option<(f64, f64)>,
) -> Result<Trip, ServiceError> {
    // The scooter lock orders this close against starts and other closes.
    tx.scooters()
        .get_by_id_for_update(scooter_id)
        .await?
        .ok_or(ServiceError::NoActiveTrip(scooter_id))?;

    let mut trip = tx
        .trips()
        .get_active_by_scooter(scooter_id)
        .await?
        .ok_or(ServiceError::NoActiveTrip(scooter_id))?;

    let ended_at = now_millis();
    trip.finish(status, ended_at, end);
    let trip = tx.trips().update(&trip).await.map_err(|err| match err {
        StoreError::NotFound => ServiceError::NoActiveTrip(scooter_id),
        other => ServiceError::Store(other),
    })?;

    tx.scooters()
        .update_status_with_check(scooter_id, ScooterStatus::Available, ScooterStatus::Occupied)
        .await
        .map_err(|err| status_moved(scooter_id, err))?;

    if let Some((lat, lng)) = end {
        if let Err(err) = tx.scooters().update_location(scooter_id, lat, lng, ended_at).await {
            warn!(scooter_id = %scooter_id, error = %err, "Failed to move scooter to trip end");
        }
    }

    Ok(trip)
}

async fn record_in(
    tx: &mut dyn Transaction,
    sample: &LocationSample,
    want_trip: bool,
) -> Result<(LocationUpdate, Option<Uuid>), ServiceError> {
    tx.scooters()
        .get_by_id(sample.scooter_id)
        .await?
        .ok_or(ServiceError::ScooterNotFound(sample.scooter_id))?;

    if let Some(id) = sample.update_id {
        if let Some(existing) = tx.locations().get_by_id(id).await? {
            debug!(update_id = %id, "Location sample already recorded, skipping");
            return Ok((existing, None));
        }
    }

    let seen_at = sample.recorded_at.unwrap_or_else(now_millis);
    let update = tx
        .locations()
        .create(NewLocationUpdate {
            id: sample.update_id.unwrap_or_else(Uuid::new_v4),
            scooter_id: sample.scooter_id,
            lat: sample.lat,
            lng: sample.lng,
            timestamp: seen_at,
        })
        .await?;

    tx.scooters()
        .update_location(sample.scooter_id, sample.lat, sample.lng, seen_at)
        .await?;

    let trip_id = if want_trip {
        tx.trips()
            .get_active_by_scooter(sample.scooter_id)
            .await?
            .map(|trip| trip.id)
    } else {
        None
    };

    Ok((update, trip_id))
}
