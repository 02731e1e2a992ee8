//! JSON API under `/api/v1`. Everything except `/health` requires the API key.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::fleet::FleetService;
use crate::trips::TripEngine;

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;


pub use auth::ApiKey;
pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub trips: TripEngine,
    pub fleet: FleetService,
    pub api_key: ApiKey,
}

pub fn router(state: AppState) -> Router {
    let public = Router::new().route("/health", get(handlers::health));

    let protected = Router::new()
        .route("/scooters", get(handlers::list_scooters))
        .route("/scooters/closest", get(handlers::closest_scooters))
        .route("/scooters/:id", get(handlers::get_scooter))
        .route("/scooters/:id/trip/start", post(handlers::start_trip))
        .route("/scooters/:id/trip/end", post(handlers::end_trip))
        .route("/scooters/:id/trip/cancel", post(handlers::cancel_trip))
        .route("/scooters/:id/location", post(handlers::update_location))
        .route("/trips/:id", get(handlers::get_trip))
        .route("/users/:id/active-trip", get(handlers::get_user_active_trip))
        .route_layer(middleware::from_fn_with_state(
            state.api_key.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .nest("/api/v1", public.merge(protected))
        .with_state(state)
}
