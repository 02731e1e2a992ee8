//! Load generator: simulated riders that find a nearby scooter, ride it
//! while reporting positions, park it and rest.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SimulatorConfig;
use crate::geo::{Coordinate, KM_PER_DEGREE};

pub mod client;
pub mod state;

pub use client::{ApiClient, RemoteScooter, StartOutcome};
pub use state::{SimulatorState, Stats};

const TICK: Duration = Duration::from_secs(1);
const SEARCH_RADIUS_METERS: f64 = 2_000.0;
const SEARCH_LIMIT: i64 = 5;
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Deterministic ids so seeded users line up across runs.
pub fn user_id(n: usize) -> Uuid {
    Uuid::from_u128(0x5555_5555_5555_5555_5555_0000_0000_0000 + n as u128)
}

/// Moves `from` by `distance_km` along `heading_deg` (0 = north, 90 = east),
/// staying inside valid coordinates.
pub fn advance(from: Coordinate, heading_deg: f64, distance_km: f64) -> Coordinate {
    let heading = heading_deg.to_radians();
    let lat = (from.lat + distance_km * heading.cos() / KM_PER_DEGREE).clamp(-89.9, 89.9);
    let cos_lat = lat.to_radians().cos().max(1e-6);
    let lng = (from.lng + distance_km * heading.sin() / (KM_PER_DEGREE * cos_lat)).clamp(-180.0, 180.0);
    Coordinate::new(lat, lng)
}

async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

struct Rider {
    user: Uuid,
    position: Coordinate,
    rng: StdRng,
    client: ApiClient,
    state: Arc<SimulatorState>,
    config: Arc<SimulatorConfig>,
}

impl Rider {
    async fn run(mut self, cancel: CancellationToken) {
        debug!(user_id = %self.user, "Rider started");
        loop {
            let rest = self.rng.gen_range(self.config.rest_min..=self.config.rest_max);
            if !pause(&cancel, Duration::from_secs(rest)).await {
                break;
            }
            if let Err(e) = self.ride_once(&cancel).await {
                warn!(user_id = %self.user, error = %e, "Ride failed");
                self.state.record(|s| s.errors += 1).await;
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        debug!(user_id = %self.user, "Rider stopped");
    }

    async fn ride_once(&mut self, cancel: &CancellationToken) -> Result<()> {
        let candidates = self
            .client
            .closest_available(self.position, SEARCH_RADIUS_METERS, SEARCH_LIMIT)
            .await?;
        let Some(scooter) = candidates.first() else {
            debug!(user_id = %self.user, "No scooter nearby");
            return Ok(());
        };

        self.position = scooter.position();
        let trip = match self.client.start_trip(scooter.id, self.user, self.position).await? {
            StartOutcome::Started(trip) => trip,
            StartOutcome::Taken => {
                self.state.record(|s| s.start_conflicts += 1).await;
                return Ok(());
            }
        };
        self.state.begin_ride(self.user).await;
        self.state.record(|s| s.trips_started += 1).await;
        info!(user_id = %self.user, scooter_id = %scooter.id, trip_id = %trip.trip_id, "Ride started");

        let result = self.ride(scooter.id, cancel).await;

        // Always try to park, even when the ride was interrupted.
        let parked = self.client.end_trip(scooter.id, self.position).await;
        self.state.end_ride(self.user).await;
        let ended = parked?;
        self.state.record(|s| s.trips_completed += 1).await;
        info!(
            user_id = %self.user,
            trip_id = %ended.trip_id,
            duration_seconds = ended.duration_seconds.unwrap_or_default(),
            "Ride completed"
        );
        result
    }

    async fn ride(&mut self, scooter: Uuid, cancel: &CancellationToken) -> Result<()> {
        let config = self.config.clone();
        let duration = self
            .rng
            .gen_range(config.trip_duration_min..=config.trip_duration_max);
        let mut heading: f64 = self.rng.gen_range(0.0..360.0);
        let step_km = config.speed_kmh * TICK.as_secs_f64() / 3600.0;

        for _ in 0..duration {
            if !pause(cancel, TICK).await {
                break;
            }
            heading = (heading + self.rng.gen_range(-20.0..20.0)).rem_euclid(360.0);
            self.position = advance(self.position, heading, step_km);
            self.client
                .send_location(scooter, self.position, heading, config.speed_kmh)
                .await?;
            self.state.record(|s| s.location_updates += 1).await;
        }
        Ok(())
    }
}

async fn report(state: Arc<SimulatorState>, cancel: CancellationToken) {
    while pause(&cancel, STATS_INTERVAL).await {
        let stats = state.stats().await;
        let riding = state.active_riders().await;
        info!(
            riding,
            started = stats.trips_started,
            completed = stats.trips_completed,
            conflicts = stats.start_conflicts,
            locations = stats.location_updates,
            errors = stats.errors,
            "Simulator stats"
        );
    }
}

/// Runs until `cancel` fires; every rider parks its scooter before exiting.
pub async fn run(config: SimulatorConfig, cancel: CancellationToken) -> Result<Stats> {
    let client = ApiClient::new(&config.server_url, &config.api_key)?;
    let scooters = client.list_scooters(config.scooters).await?;
    if scooters.is_empty() {
        bail!("server at {} has no scooters to simulate", config.server_url);
    }
    info!(
        scooters = scooters.len(),
        users = config.users,
        server = %config.server_url,
        "Simulator starting"
    );

    let config = Arc::new(config);
    let state = Arc::new(SimulatorState::new());
    let tracker = TaskTracker::new();

    tracker.spawn(report(state.clone(), cancel.clone()));
    for n in 1..=config.users {
        let mut rng = StdRng::from_entropy();
        let home = scooters[rng.gen_range(0..scooters.len())].position();
        let rider = Rider {
            user: user_id(n),
            position: home,
            rng,
            client: client.clone(),
            state: state.clone(),
            config: config.clone(),
        };
        tracker.spawn(rider.run(cancel.clone()));
    }
    tracker.close();
    tracker.wait().await;

    let stats = state.stats().await;
    info!(?stats, "Simulator stopped");
    Ok(stats)
}
