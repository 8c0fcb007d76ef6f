//! Spherical-earth geodesy helpers
//!
//! Distances use the haversine formula on a 6371 km sphere. Bearings are forward
//! azimuths measured clockwise from geographic North and are always normalized
//! into `[0, 360)`.

pub mod sector;

use serde::{Deserialize, Serialize};

pub use sector::{PhraseToken, SectorPolicy, phrase_text, sector_phrase};

/// Mean earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A geographic point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to another point in kilometers
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        distance_km(*self, *other)
    }

    /// Initial bearing from this point toward another, in degrees
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        initial_bearing_deg(*self, *other)
    }

    /// Returns the point reached by travelling `distance_km` along `bearing_deg`
    pub fn destination(&self, bearing_deg: f64, distance_km: f64) -> GeoPoint {
        let angular = distance_km / EARTH_RADIUS_KM;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

        // Wrap longitude back into [-180, 180)
        let lon2 = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;

        GeoPoint::new(lat2.to_degrees(), lon2)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.latitude, self.longitude)
    }
}

/// Calculate the distance between two points using the Haversine formula
/// Returns distance in kilometers
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Calculate the initial bearing from `from` toward `to` in degrees `[0, 360)`
///
/// Coincident points have no defined bearing; the result is then whatever atan2(0, 0)
/// yields (0°). Callers that narrate a bearing must check the distance first.
pub fn initial_bearing_deg(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1_rad = from.latitude.to_radians();
    let lat2_rad = to.latitude.to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let y = delta_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lon.cos();

    normalize_bearing(y.atan2(x).to_degrees())
}

/// Wrap any angle into `[0, 360)`. Non-finite input maps to 0.
pub fn normalize_bearing(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Calculate the angular difference between two headings in degrees
/// Returns the smallest angle between the two headings (0-180 degrees)
pub fn angular_difference(angle1: f64, angle2: f64) -> f64 {
    let diff = (angle1 - angle2).abs() % 360.0;
    if diff > 180.0 { 360.0 - diff } else { diff }
}
