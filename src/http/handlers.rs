use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{debug, info};
use uuid::Uuid;

use super::dto::*;
use super::error::ApiError;
use super::AppState;
use crate::fleet::{self, ClosestQuery, ScooterFilter};
use crate::geo::{BoundingBox, Coordinate};
use crate::trips::{LocationSample, StartTrip};

type PathId = Result<Path<String>, PathRejection>;

fn parse_id(path: PathId, what: &str) -> Result<Uuid, ApiError> {
    let Path(raw) = path?;
    Uuid::parse_str(&raw).map_err(|_| ApiError::bad_request(format!("invalid {what} id: {raw}")))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "scooter-trips",
        status: "healthy",
    })
}

pub async fn list_scooters(
    State(state): State<AppState>,
    params: Result<Query<ListScootersParams>, QueryRejection>,
) -> Result<Json<ScooterListResponse>, ApiError> {
    let Query(params) = params?;
    let bbox = fleet::bounding_box(BoundingBox {
        min_lat: params.min_lat.unwrap_or_default(),
        max_lat: params.max_lat.unwrap_or_default(),
        min_lng: params.min_lng.unwrap_or_default(),
        max_lng: params.max_lng.unwrap_or_default(),
    })?;
    let filter = ScooterFilter {
        status: fleet::parse_status(params.status.as_deref())?,
        bbox,
        limit: params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        offset: params.offset.unwrap_or(0),
    };

    let page = state.fleet.list_scooters(filter).await?;
    Ok(Json(page.into()))
}

pub async fn closest_scooters(
    State(state): State<AppState>,
    params: Result<Query<ClosestParams>, QueryRejection>,
) -> Result<Json<ClosestResponse>, ApiError> {
    let Query(params) = params?;
    let query = ClosestQuery {
        center: Coordinate::new(params.lat, params.lng),
        radius_meters: params.radius.unwrap_or(DEFAULT_RADIUS_METERS),
        status: fleet::parse_status(params.status.as_deref())?,
        limit: params.limit.unwrap_or(DEFAULT_CLOSEST_LIMIT),
    };

    let closest = state.fleet.closest_scooters(query).await?;
    debug!(found = closest.scooters.len(), "Closest scooters query");
    Ok(Json(closest.into()))
}

pub async fn get_scooter(
    State(state): State<AppState>,
    path: PathId,
) -> Result<Json<ScooterDetailResponse>, ApiError> {
    let id = parse_id(path, "scooter")?;
    let details = state.fleet.get_scooter(id).await?;
    Ok(Json(details.into()))
}

pub async fn start_trip(
    State(state): State<AppState>,
    path: PathId,
    body: Result<Json<StartTripRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TripResponse>), ApiError> {
    let scooter_id = parse_id(path, "scooter")?;
    let Json(body) = body?;

    info!(scooter_id = %scooter_id, user_id = %body.user_id, "Start trip requested");
    let trip = state
        .trips
        .start_trip(StartTrip {
            scooter_id,
            user_id: body.user_id,
            lat: body.start_latitude,
            lng: body.start_longitude,
            trip_id: None,
            started_at: None,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(trip.into())))
}

pub async fn end_trip(
    State(state): State<AppState>,
    path: PathId,
    body: Result<Json<EndTripRequest>, JsonRejection>,
) -> Result<Json<TripResponse>, ApiError> {
    let scooter_id = parse_id(path, "scooter")?;
    let Json(body) = body?;

    info!(scooter_id = %scooter_id, "End trip requested");
    let trip = state
        .trips
        .end_trip(scooter_id, body.end_latitude, body.end_longitude)
        .await?;
    Ok(Json(trip.into()))
}

pub async fn cancel_trip(
    State(state): State<AppState>,
    path: PathId,
) -> Result<Json<TripResponse>, ApiError> {
    let scooter_id = parse_id(path, "scooter")?;

    info!(scooter_id = %scooter_id, "Cancel trip requested");
    let trip = state.trips.cancel_trip(scooter_id).await?;
    Ok(Json(trip.into()))
}

pub async fn update_location(
    State(state): State<AppState>,
    path: PathId,
    body: Result<Json<LocationRequest>, JsonRejection>,
) -> Result<Json<LocationUpdateResponse>, ApiError> {
    let scooter_id = parse_id(path, "scooter")?;
    let Json(body) = body?;

    debug!(scooter_id = %scooter_id, reported_at = %body.timestamp, "Location reported");
    let update = state
        .trips
        .update_location(LocationSample {
            scooter_id,
            lat: body.latitude,
            lng: body.longitude,
            heading: body.heading.unwrap_or_default(),
            speed: body.speed.unwrap_or_default(),
            update_id: None,
            recorded_at: None,
        })
        .await?;
    Ok(Json(update.into()))
}

pub async fn get_trip(
    State(state): State<AppState>,
    path: PathId,
) -> Result<Json<TripResponse>, ApiError> {
    let trip_id = parse_id(path, "trip")?;
    let trip = state.trips.get_trip_by_id(trip_id).await?;
    Ok(Json(trip.into()))
}

pub async fn get_user_active_trip(
    State(state): State<AppState>,
    path: PathId,
) -> Result<Json<TripResponse>, ApiError> {
    let user_id = parse_id(path, "user")?;
    match state.trips.get_active_trip_by_user(user_id).await? {
        Some(trip) => Ok(Json(trip.into())),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no active trip for user {user_id}"),
        )),
    }
}
