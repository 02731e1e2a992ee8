//! Coordinate validation and the small amount of spherical geometry the
//! fleet queries need: great-circle distance, a bounding box around a
//! center, and radius filtering with distance ordering.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used by [`haversine_km`].
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate length of one degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.0;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum CoordinateError {
    #[error("invalid latitude: {0} (must be between -90 and 90)")]
    InvalidLatitude(f64),

    #[error("invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),
}

impl CoordinateError {
    /// Name of the offending request field.
    pub fn field(&self) -> &'static str {
        match self {
            CoordinateError::InvalidLatitude(_) => "latitude",
            CoordinateError::InvalidLongitude(_) => "longitude",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            CoordinateError::InvalidLatitude(v) | CoordinateError::InvalidLongitude(v) => *v,
        }
    }
}

/// Checks that `lat` is within [-90, 90] and `lng` within [-180, 180].
///
/// Latitude is checked first. NaN fails both ranges.
pub fn validate(lat: f64, lng: f64) -> Result<(), CoordinateError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoordinateError::InvalidLatitude(lat));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(CoordinateError::InvalidLongitude(lng));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), CoordinateError> {
        validate(self.lat, self.lng)
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Great-circle distance in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    if lat1 == lat2 && lng1 == lng2 {
        return 0.0;
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lng2 - lng1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Axis-aligned latitude/longitude rectangle, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub const WORLD: BoundingBox = BoundingBox {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lng: -180.0,
        max_lng: 180.0,
    };

    /// Box of half-size `radius_km` around `center`, clamped to valid
    /// latitudes. When the span would cross the antimeridian, or near the
    /// poles, the longitude range covers the whole globe and the radius
    /// check downstream does the narrowing.
    pub fn around(center: Coordinate, radius_km: f64) -> Self {
        let radius_km = radius_km.max(0.0);
        let lat_delta = radius_km / KM_PER_DEGREE;
        let cos_lat = center.lat.to_radians().cos();

        let lng_delta = if cos_lat.abs() < 1e-9 {
            f64::INFINITY
        } else {
            (radius_km / (KM_PER_DEGREE * cos_lat)).abs()
        };
        let (min_lng, max_lng) =
            if center.lng - lng_delta < -180.0 || center.lng + lng_delta > 180.0 {
                (-180.0, 180.0)
            } else {
                (center.lng - lng_delta, center.lng + lng_delta)
            };

        Self {
            min_lat: (center.lat - lat_delta).max(-90.0),
            max_lat: (center.lat + lat_delta).min(90.0),
            min_lng,
            max_lng,
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }

    /// A box with every bound at zero stands for "no box supplied".
    pub fn is_zero(&self) -> bool {
        self.min_lat == 0.0 && self.max_lat == 0.0 && self.min_lng == 0.0 && self.max_lng == 0.0
    }

    pub fn validate(&self) -> Result<(), String> {
        validate(self.min_lat, self.min_lng).map_err(|e| e.to_string())?;
        validate(self.max_lat, self.max_lng).map_err(|e| e.to_string())?;
        if self.min_lat > self.max_lat {
            return Err("min_lat must not exceed max_lat".to_string());
        }
        if self.min_lng > self.max_lng {
            return Err("min_lng must not exceed max_lng".to_string());
        }
        Ok(())
    }
}

/// Anything with a position that can be ranked by distance.
pub trait LocationProvider {
    fn location(&self) -> Coordinate;
}

/// An item paired with its distance to a query center.
#[derive(Debug, Clone)]
pub struct Ranked<T> {
    pub item: T,
    pub distance_km: f64,
}

/// Keeps the items within `radius_km` of `center` (all of them when the
/// radius is not positive), orders them by ascending distance and truncates
/// to `limit` (no truncation when `limit` is not positive).
///
/// Each item's location is read exactly once. Ties keep input order.
pub fn filter_sort_limit<T: LocationProvider>(
    items: Vec<T>,
    center: Coordinate,
    radius_km: f64,
    limit: i64,
) -> Vec<Ranked<T>> {
    let mut ranked: Vec<Ranked<T>> = items
        .into_iter()
        .map(|item| {
            let distance_km = center.distance_km(&item.location());
            Ranked { item, distance_km }
        })
        .filter(|r| radius_km <= 0.0 || r.distance_km <= radius_km)
        .collect();

    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

    if limit > 0 {
        ranked.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counted<'a> {
        name: &'static str,
        at: Coordinate,
        reads: &'a Cell<usize>,
    }

    impl LocationProvider for Counted<'_> {
        fn location(&self) -> Coordinate {
            self.reads.set(self.reads.get() + 1);
            self.at
        }
    }

    #[test]
    fn test_validate_accepts_boundaries() {
        for (lat, lng) in [(90.0, 180.0), (-90.0, -180.0), (0.0, 0.0), (45.4215, -75.6972)] {
            assert_eq!(validate(lat, lng), Ok(()));
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert_eq!(validate(90.0001, 0.0), Err(CoordinateError::InvalidLatitude(90.0001)));
        assert_eq!(validate(-91.0, 0.0), Err(CoordinateError::InvalidLatitude(-91.0)));
        assert_eq!(validate(0.0, 180.5), Err(CoordinateError::InvalidLongitude(180.5)));
        assert_eq!(validate(0.0, -181.0), Err(CoordinateError::InvalidLongitude(-181.0)));
        assert!(validate(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_validate_checks_latitude_first() {
        assert_eq!(validate(100.0, 200.0), Err(CoordinateError::InvalidLatitude(100.0)));
    }

    #[test]
    fn test_validate_grid() {
        let mut lat = -120.0;
        while lat <= 120.0 {
            let mut lng = -240.0;
            while lng <= 240.0 {
                let result = validate(lat, lng);
                if lat.abs() > 90.0 {
                    assert!(matches!(result, Err(CoordinateError::InvalidLatitude(_))));
                } else if lng.abs() > 180.0 {
                    assert!(matches!(result, Err(CoordinateError::InvalidLongitude(_))));
                } else {
                    assert!(result.is_ok(), "({lat}, {lng}) should be valid");
                }
                lng += 7.5;
            }
            lat += 7.5;
        }
    }

    #[test]
    fn test_coordinate_error_message() {
        let err = validate(91.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("invalid latitude"));
        assert_eq!(err.field(), "latitude");
        assert_eq!(err.value(), 91.0);
    }

    #[test]
    fn test_haversine_zero_and_symmetric() {
        assert_eq!(haversine_km(45.4215, -75.6972, 45.4215, -75.6972), 0.0);
        let ab = haversine_km(45.4215, -75.6972, 45.5017, -73.5673);
        let ba = haversine_km(45.5017, -73.5673, 45.4215, -75.6972);
        assert!((ab - ba).abs() < 1e-9);
        // Ottawa to Montreal is roughly 166 km.
        assert!((ab - 166.0).abs() < 5.0, "got {ab}");
    }

    #[test]
    fn test_haversine_matches_flat_approximation_for_short_hops() {
        let samples = [
            (45.4215, -75.6972, 45.4216, -75.6973),
            (0.0, 0.0, 0.01, 0.01),
            (60.0, 10.0, 60.02, 10.05),
            (-33.86, 151.2, -33.85, 151.21),
        ];
        for (lat1, lng1, lat2, lng2) in samples {
            let exact = haversine_km(lat1, lng1, lat2, lng2);
            let phi = ((lat1 + lat2) / 2.0_f64).to_radians();
            let d_lat = lat2 - lat1;
            let d_lng = (lng2 - lng1) * phi.cos();
            let flat = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0
                * (d_lat * d_lat + d_lng * d_lng).sqrt();
            assert!(((exact - flat) / flat).abs() < 0.01, "{exact} vs {flat}");
        }
    }

    #[test]
    fn test_bounding_box_contains_center() {
        for (lat, lng, r) in [(45.4215, -75.6972, 1.0), (0.0, 0.0, 0.0), (89.99, 10.0, 5.0), (-90.0, 0.0, 2.0)] {
            let center = Coordinate::new(lat, lng);
            let bbox = BoundingBox::around(center, r);
            assert!(bbox.contains(lat, lng), "{bbox:?} misses ({lat}, {lng})");
        }
    }

    #[test]
    fn test_bounding_box_deltas() {
        let bbox = BoundingBox::around(Coordinate::new(0.0, 0.0), 111.0);
        assert!((bbox.max_lat - 1.0).abs() < 1e-9);
        assert!((bbox.min_lng + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_box_across_antimeridian_spans_all_longitudes() {
        let bbox = BoundingBox::around(Coordinate::new(0.0, 179.999), 1.0);
        assert_eq!((bbox.min_lng, bbox.max_lng), (-180.0, 180.0));
        assert!(bbox.contains(0.0, -179.999));
        assert!(bbox.max_lat < 1.0);

        let inland = BoundingBox::around(Coordinate::new(0.0, 170.0), 1.0);
        assert!(inland.min_lng > 169.0 && inland.max_lng < 171.0);
    }

    #[test]
    fn test_bounding_box_zero_and_validation() {
        assert!(BoundingBox::default().is_zero());
        assert!(BoundingBox::WORLD.validate().is_ok());
        let inverted = BoundingBox { min_lat: 10.0, max_lat: 5.0, min_lng: 0.0, max_lng: 1.0 };
        assert!(inverted.validate().is_err());
        let out_of_range = BoundingBox { min_lat: -95.0, max_lat: 5.0, min_lng: 0.0, max_lng: 1.0 };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_filter_sort_limit_orders_and_reads_once() {
        let reads = Cell::new(0);
        let center = Coordinate::new(45.0, -75.0);
        let items = vec![
            Counted { name: "far", at: Coordinate::new(45.05, -75.0), reads: &reads },
            Counted { name: "near", at: Coordinate::new(45.001, -75.0), reads: &reads },
            Counted { name: "outside", at: Coordinate::new(46.0, -75.0), reads: &reads },
            Counted { name: "mid", at: Coordinate::new(45.01, -75.0), reads: &reads },
        ];

        let ranked = filter_sort_limit(items, center, 10.0, 0);

        assert_eq!(reads.get(), 4);
        let names: Vec<_> = ranked.iter().map(|r| r.item.name).collect();
        assert_eq!(names, vec!["near", "mid", "far"]);
        assert!(ranked.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[test]
    fn test_filter_sort_limit_truncates_and_keeps_ties_stable() {
        let reads = Cell::new(0);
        let center = Coordinate::new(0.0, 0.0);
        let same = Coordinate::new(0.001, 0.0);
        let items = vec![
            Counted { name: "a", at: same, reads: &reads },
            Counted { name: "b", at: same, reads: &reads },
            Counted { name: "c", at: same, reads: &reads },
        ];

        let ranked = filter_sort_limit(items, center, 0.0, 2);

        assert_eq!(reads.get(), 3);
        let names: Vec<_> = ranked.iter().map(|r| r.item.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
