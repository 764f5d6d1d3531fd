//! Geospatial primitives and the nearby query engine.
//!
//! Stores answer "what lies within R meters of P" in two steps: they fetch the
//! candidates inside [`NearbyQuery::bounding_box`] from an indexed
//! latitude/longitude column pair, then hand them to [`NearbyQuery::rank`],
//! which computes exact great-circle distances, drops everything outside the
//! radius, orders nearest-first (newest first on ties) and truncates to the
//! limit. Alerts and community reports share this path; only the entity type
//! differs.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::constants::{
    DEFAULT_NEARBY_LIMIT, DEFAULT_NEARBY_RADIUS_M, EARTH_RADIUS_M, MAX_NEARBY_LIMIT,
};
use crate::validation::{ValidationErrors, Validator};

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting out-of-range or non-finite coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationErrors> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        self.check(&mut v);
        v.finish()
    }

    pub(crate) fn check(&self, v: &mut Validator) {
        v.latitude("latitude", self.latitude)
            .longitude("longitude", self.longitude);
    }

    /// Haversine distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = (other.latitude - self.latitude).to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }
}

/// Axis-aligned latitude/longitude box used to pre-filter candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, p: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.latitude)
            && (self.min_lng..=self.max_lng).contains(&p.longitude)
    }
}

/// Anything with a stored position that nearby queries can rank.
pub trait Geolocated {
    fn position(&self) -> GeoPoint;
    fn created_at(&self) -> DateTime<Utc>;
}

/// A ranked result: the entity plus its distance from the query point.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Nearby<T> {
    #[serde(flatten)]
    pub item: T,
    #[serde(serialize_with = "whole_meters")]
    pub distance_meters: f64,
}

fn whole_meters<S: Serializer>(d: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.round())
}

/// A validated radius query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub center: GeoPoint,
    pub radius_m: f64,
    pub limit: usize,
}

impl NearbyQuery {
    /// Validate the query; radius and limit fall back to the defaults and the
    /// limit is clamped to `1..=MAX_NEARBY_LIMIT`.
    pub fn new(
        center: GeoPoint,
        radius_m: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Self, ValidationErrors> {
        let radius_m = radius_m.unwrap_or(DEFAULT_NEARBY_RADIUS_M);

        let mut v = Validator::new();
        center.check(&mut v);
        v.check(
            radius_m.is_finite() && radius_m > 0.0,
            "radius",
            "must be a positive number of meters",
        );
        v.finish()?;

        Ok(Self {
            center,
            radius_m,
            limit: limit
                .unwrap_or(DEFAULT_NEARBY_LIMIT)
                .clamp(1, MAX_NEARBY_LIMIT),
        })
    }

    /// Smallest box guaranteed to contain the query circle.
    ///
    /// Near the poles, or when the circle crosses the antimeridian, the box
    /// widens to the full longitude range.
    pub fn bounding_box(&self) -> BoundingBox {
        let angular = self.radius_m / EARTH_RADIUS_M;
        let lat = self.center.latitude.to_radians();
        let min_lat = lat - angular;
        let max_lat = lat + angular;

        let full = |min_lat: f64, max_lat: f64| BoundingBox {
            min_lat: min_lat.to_degrees().max(-90.0),
            max_lat: max_lat.to_degrees().min(90.0),
            min_lng: -180.0,
            max_lng: 180.0,
        };

        if min_lat <= -std::f64::consts::FRAC_PI_2 || max_lat >= std::f64::consts::FRAC_PI_2 {
            return full(min_lat, max_lat);
        }

        let ratio = angular.sin() / lat.cos();
        if ratio >= 1.0 {
            return full(min_lat, max_lat);
        }

        let d_lng = ratio.asin().to_degrees();
        let min_lng = self.center.longitude - d_lng;
        let max_lng = self.center.longitude + d_lng;
        if min_lng < -180.0 || max_lng > 180.0 {
            return full(min_lat, max_lat);
        }

        BoundingBox {
            min_lat: min_lat.to_degrees(),
            max_lat: max_lat.to_degrees(),
            min_lng,
            max_lng,
        }
    }

    /// Rank candidates by distance, newest first on ties, within radius and limit.
    pub fn rank<T, I>(&self, candidates: I) -> Vec<Nearby<T>>
    where
        T: Geolocated,
        I: IntoIterator<Item = T>,
    {
        let mut hits: Vec<Nearby<T>> = candidates
            .into_iter()
            .filter_map(|item| {
                let distance_meters = self.center.distance_m(&item.position());
                (distance_meters <= self.radius_m).then_some(Nearby {
                    item,
                    distance_meters,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance_meters
                .partial_cmp(&b.distance_meters)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.item.created_at().cmp(&a.item.created_at()))
        });
        hits.truncate(self.limit);
        hits
    }
}
