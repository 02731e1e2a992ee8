//! Read-side queries over the fleet: filtered listings, per-scooter
//! details and proximity search.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::geo::{BoundingBox, Coordinate};
use crate::models::{Scooter, ScooterStatus, Trip};
use crate::store::{self, Page, UnitOfWork};

pub const MAX_LIST_LIMIT: i64 = 100;
pub const MAX_CLOSEST_LIMIT: i64 = 50;
pub const MAX_RADIUS_METERS: f64 = 50_000.0;

#[derive(Debug, Clone, Default)]
pub struct ScooterFilter {
    pub status: Option<ScooterStatus>,
    pub bbox: Option<BoundingBox>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct ScooterPage {
    pub scooters: Vec<Scooter>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct ScooterDetails {
    pub scooter: Scooter,
    pub active_trip: Option<Trip>,
}

#[derive(Debug, Clone)]
pub struct ClosestQuery {
    pub center: Coordinate,
    pub radius_meters: f64,
    pub status: Option<ScooterStatus>,
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct NearbyScooter {
    pub scooter: Scooter,
    pub distance_meters: f64,
}

#[derive(Debug, Clone)]
pub struct ClosestScooters {
    pub scooters: Vec<NearbyScooter>,
    pub center: Coordinate,
    pub radius_meters: f64,
}

/// Empty or missing means "any status".
pub fn parse_status(raw: Option<&str>) -> Result<Option<ScooterStatus>, ServiceError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            ServiceError::InvalidRequest(format!(
                "invalid status {value:?}: expected available or occupied"
            ))
        }),
    }
}

/// An all-zero box is treated as absent; anything else must be sane.
pub fn bounding_box(bbox: BoundingBox) -> Result<Option<BoundingBox>, ServiceError> {
    if bbox.is_zero() {
        return Ok(None);
    }
    bbox.validate().map_err(ServiceError::InvalidRequest)?;
    Ok(Some(bbox))
}

fn slice_page(rows: Vec<Scooter>, limit: i64, offset: i64) -> Vec<Scooter> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.into_iter().skip(offset).take(limit).collect()
}

#[derive(Clone)]
pub struct FleetService {
    store: Arc<dyn UnitOfWork>,
}

impl FleetService {
    pub fn new(store: Arc<dyn UnitOfWork>) -> Self {
        Self { store }
    }

    pub async fn list_scooters(&self, filter: ScooterFilter) -> Result<ScooterPage, ServiceError> {
        if !(0..=MAX_LIST_LIMIT).contains(&filter.limit) {
            return Err(ServiceError::InvalidRequest(format!(
                "limit must be between 0 and {MAX_LIST_LIMIT}"
            )));
        }
        if filter.offset < 0 {
            return Err(ServiceError::InvalidRequest(
                "offset must not be negative".to_string(),
            ));
        }
        if let Some(bbox) = &filter.bbox {
            bbox.validate().map_err(ServiceError::InvalidRequest)?;
        }

        let mut tx = self.store.begin().await?;
        let repo = tx.scooters();
        let fetched = match (filter.status, filter.bbox.as_ref()) {
            (None, None) => repo.list(Page::new(filter.limit, filter.offset)).await,
            (Some(status), None) => repo.get_by_status(status).await.map(with_total),
            (None, Some(bbox)) => repo.get_in_bounds(bbox).await.map(with_total),
            (Some(status), Some(bbox)) => repo
                .get_by_status_in_bounds(status, bbox)
                .await
                .map(with_total),
        };
        store::release(tx).await;
        let (rows, total) = fetched?;

        let scooters = if filter.status.is_none() && filter.bbox.is_none() {
            rows
        } else {
            slice_page(rows, filter.limit, filter.offset)
        };

        debug!(
            total,
            returned = scooters.len(),
            status = ?filter.status,
            "Listed scooters"
        );
        Ok(ScooterPage {
            scooters,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    /// The active trip is best effort: a failed lookup still returns the
    /// scooter.
    pub async fn get_scooter(&self, id: Uuid) -> Result<ScooterDetails, ServiceError> {
        let mut tx = self.store.begin().await?;
        let scooter = match tx.scooters().get_by_id(id).await {
            Ok(Some(scooter)) => scooter,
            Ok(None) => {
                store::release(tx).await;
                return Err(ServiceError::ScooterNotFound(id));
            }
            Err(err) => {
                store::release(tx).await;
                return Err(err.into());
            }
        };

        let active_trip = if scooter.status == ScooterStatus::Occupied {
            match tx.trips().get_active_by_scooter(id).await {
                Ok(trip) => trip,
                Err(err) => {
                    warn!(scooter_id = %id, error = %err, "Failed to load active trip");
                    None
                }
            }
        } else {
            None
        };
        store::release(tx).await;

        Ok(ScooterDetails {
            scooter,
            active_trip,
        })
    }

    pub async fn closest_scooters(&self, query: ClosestQuery) -> Result<ClosestScooters, ServiceError> {
        query.center.validate()?;
        if !(0.0..=MAX_RADIUS_METERS).contains(&query.radius_meters) {
            return Err(ServiceError::InvalidRequest(format!(
                "radius must be between 0 and {MAX_RADIUS_METERS} meters"
            )));
        }
        if !(0..=MAX_CLOSEST_LIMIT).contains(&query.limit) {
            return Err(ServiceError::InvalidRequest(format!(
                "limit must be between 0 and {MAX_CLOSEST_LIMIT}"
            )));
        }

        let mut tx = self.store.begin().await?;
        let found = tx
            .scooters()
            .get_closest_with_radius(
                query.center,
                query.radius_meters / 1000.0,
                query.status,
                query.limit,
            )
            .await;
        store::release(tx).await;

        let mut scooters: Vec<NearbyScooter> = found?
            .into_iter()
            .map(|scooter| {
                let position = Coordinate::new(scooter.current_lat, scooter.current_lng);
                NearbyScooter {
                    distance_meters: query.center.distance_km(&position) * 1000.0,
                    scooter,
                }
            })
            .collect();
        scooters.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));

        Ok(ClosestScooters {
            scooters,
            center: query.center,
            radius_meters: query.radius_meters,
        })
    }
}

fn with_total(rows: Vec<Scooter>) -> (Vec<Scooter>, i64) {
    let total = rows.len() as i64;
    (rows, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{Fault, MemoryStore};
    use crate::trips::{StartTrip, TripEngine};

    const A: Uuid = Uuid::from_u128(0xa);
    const B: Uuid = Uuid::from_u128(0xb);
    const C: Uuid = Uuid::from_u128(0xc);

    async fn fleet() -> (MemoryStore, FleetService) {
        let store = MemoryStore::new();
        store.seed_scooter(A, 45.4215, -75.6972).await.unwrap();
        store.seed_scooter(B, 45.5017, -73.5673).await.unwrap();
        store.seed_scooter(C, 45.4216, -75.6973).await.unwrap();
        let service = FleetService::new(Arc::new(store.clone()));
        (store, service)
    }

    fn ottawa_box() -> BoundingBox {
        BoundingBox {
            min_lat: 45.40,
            max_lat: 45.45,
            min_lng: -75.70,
            max_lng: -75.68,
        }
    }

    #[tokio::test]
    async fn test_list_without_filters_uses_repository_page() {
        let (_, service) = fleet().await;
        let page = service
            .list_scooters(ScooterFilter {
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.scooters.len(), 2);
        assert_eq!(page.scooters[0].id, C);
    }

    #[tokio::test]
    async fn test_list_in_bounds() {
        let (_, service) = fleet().await;
        let page = service
            .list_scooters(ScooterFilter {
                bbox: Some(ottawa_box()),
                limit: 50,
                ..Default::default()
            })
            .await
            .unwrap();

        let ids: Vec<_> = page.scooters.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![C, A]);
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_filtered_list_slices_in_memory() {
        let (store, service) = fleet().await;
        let user = Uuid::new_v4();
        store.seed_user(user).await.unwrap();
        TripEngine::new(Arc::new(store.clone()))
            .start_trip(StartTrip {
                scooter_id: A,
                user_id: user,
                lat: 45.4215,
                lng: -75.6972,
                trip_id: None,
                started_at: None,
            })
            .await
            .unwrap();

        let page = service
            .list_scooters(ScooterFilter {
                status: Some(ScooterStatus::Available),
                limit: 1,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.scooters.len(), 1);
        assert_eq!(page.scooters[0].id, B);

        let occupied_here = service
            .list_scooters(ScooterFilter {
                status: Some(ScooterStatus::Occupied),
                bbox: Some(ottawa_box()),
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(occupied_here.total, 1);
        assert_eq!(occupied_here.scooters[0].id, A);
    }

    #[tokio::test]
    async fn test_list_validation() {
        let (_, service) = fleet().await;
        for filter in [
            ScooterFilter {
                limit: 101,
                ..Default::default()
            },
            ScooterFilter {
                limit: 10,
                offset: -1,
                ..Default::default()
            },
            ScooterFilter {
                limit: 10,
                bbox: Some(BoundingBox {
                    min_lat: 50.0,
                    max_lat: 40.0,
                    min_lng: 0.0,
                    max_lng: 1.0,
                }),
                ..Default::default()
            },
        ] {
            let err = service.list_scooters(filter).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidRequest(_)));
        }
    }

    #[test]
    fn test_parse_status_and_zero_box() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some("")).unwrap(), None);
        assert_eq!(
            parse_status(Some("occupied")).unwrap(),
            Some(ScooterStatus::Occupied)
        );
        assert!(parse_status(Some("broken")).is_err());

        assert_eq!(bounding_box(BoundingBox::default()).unwrap(), None);
        assert_eq!(bounding_box(ottawa_box()).unwrap(), Some(ottawa_box()));
    }

    #[tokio::test]
    async fn test_get_scooter_with_active_trip() {
        let (store, service) = fleet().await;
        let details = service.get_scooter(A).await.unwrap();
        assert!(details.active_trip.is_none());

        let user = Uuid::new_v4();
        store.seed_user(user).await.unwrap();
        let trip = TripEngine::new(Arc::new(store.clone()))
            .start_trip(StartTrip {
                scooter_id: A,
                user_id: user,
                lat: 45.4215,
                lng: -75.6972,
                trip_id: None,
                started_at: None,
            })
            .await
            .unwrap();

        let details = service.get_scooter(A).await.unwrap();
        assert_eq!(details.scooter.status, ScooterStatus::Occupied);
        assert_eq!(details.active_trip.unwrap().id, trip.id);

        let err = service.get_scooter(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ScooterNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_scooter_survives_trip_read_failure() {
        let (store, service) = fleet().await;
        let user = Uuid::new_v4();
        store.seed_user(user).await.unwrap();
        TripEngine::new(Arc::new(store.clone()))
            .start_trip(StartTrip {
                scooter_id: A,
                user_id: user,
                lat: 45.4215,
                lng: -75.6972,
                trip_id: None,
                started_at: None,
            })
            .await
            .unwrap();

        store.inject_fault(Fault::TripRead);
        let details = service.get_scooter(A).await.unwrap();
        assert_eq!(details.scooter.id, A);
        assert_eq!(details.scooter.status, ScooterStatus::Occupied);
        assert!(details.active_trip.is_none());

        // The fault is one-shot.
        assert!(service.get_scooter(A).await.unwrap().active_trip.is_some());
    }

    #[tokio::test]
    async fn test_closest_reports_meters() {
        let (_, service) = fleet().await;
        let result = service
            .closest_scooters(ClosestQuery {
                center: Coordinate::new(45.4215, -75.6972),
                radius_meters: 1000.0,
                status: None,
                limit: 10,
            })
            .await
            .unwrap();

        let ids: Vec<_> = result.scooters.iter().map(|s| s.scooter.id).collect();
        assert_eq!(ids, vec![A, C]);
        assert_eq!(result.scooters[0].distance_meters, 0.0);
        let near = result.scooters[1].distance_meters;
        assert!((8.0..=18.0).contains(&near), "distance was {near}");
        assert_eq!(result.radius_meters, 1000.0);
    }

    #[tokio::test]
    async fn test_closest_validation() {
        let (_, service) = fleet().await;
        let query = |lat: f64, radius_meters: f64, limit: i64| ClosestQuery {
            center: Coordinate::new(lat, 0.0),
            radius_meters,
            status: None,
            limit,
        };

        let err = service.closest_scooters(query(95.0, 10.0, 1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCoordinate(_)));
        for bad in [query(0.0, 50_001.0, 1), query(0.0, -1.0, 1), query(0.0, 10.0, 51)] {
            let err = service.closest_scooters(bad).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidRequest(_)));
        }
    }
}
