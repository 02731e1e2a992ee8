use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::geo::Coordinate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteScooter {
    pub id: Uuid,
    pub status: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl RemoteScooter {
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTrip {
    pub trip_id: Uuid,
    pub status: String,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ScooterList {
    scooters: Vec<RemoteScooter>,
}

/// Outcome of a start attempt that reached the server.
#[derive(Debug)]
pub enum StartOutcome {
    Started(RemoteTrip),
    /// Someone else got there first (409).
    Taken,
}

/// Thin client for the server's JSON API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(server_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base: format!("{}/api/v1", server_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base))
            .header("X-API-Key", &self.api_key)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base))
            .header("X-API-Key", &self.api_key)
    }

    pub async fn list_scooters(&self, limit: usize) -> Result<Vec<RemoteScooter>> {
        let list: ScooterList = self
            .get("/scooters")
            .query(&[("limit", limit.to_string()), ("offset", "0".to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.scooters)
    }

    pub async fn closest_available(
        &self,
        at: Coordinate,
        radius_meters: f64,
        limit: i64,
    ) -> Result<Vec<RemoteScooter>> {
        let list: ScooterList = self
            .get("/scooters/closest")
            .query(&[
                ("lat", at.lat.to_string()),
                ("lng", at.lng.to_string()),
                ("radius", radius_meters.to_string()),
                ("limit", limit.to_string()),
                ("status", "available".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.scooters)
    }

    pub async fn start_trip(&self, scooter: Uuid, user: Uuid, at: Coordinate) -> Result<StartOutcome> {
        let response = self
            .post(&format!("/scooters/{scooter}/trip/start"))
            .json(&json!({
                "user_id": user,
                "start_latitude": at.lat,
                "start_longitude": at.lng,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(StartOutcome::Taken);
        }
        let trip = response.error_for_status()?.json().await?;
        Ok(StartOutcome::Started(trip))
    }

    pub async fn send_location(
        &self,
        scooter: Uuid,
        at: Coordinate,
        heading: f64,
        speed_kmh: f64,
    ) -> Result<()> {
        self.post(&format!("/scooters/{scooter}/location"))
            .json(&json!({
                "latitude": at.lat,
                "longitude": at.lng,
                "timestamp": Utc::now(),
                "heading": heading,
                "speed": speed_kmh,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn end_trip(&self, scooter: Uuid, at: Coordinate) -> Result<RemoteTrip> {
        let trip = self
            .post(&format!("/scooters/{scooter}/trip/end"))
            .json(&json!({
                "end_latitude": at.lat,
                "end_longitude": at.lng,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(trip)
    }
}
