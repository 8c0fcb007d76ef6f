//! Live sightings from an OpenSky-style `states/all` REST endpoint
//!
//! The endpoint is queried with a bounding box around the user and answers with
//! positional state vectors encoded as JSON arrays:
//!
//! ```text
//! {"time": 1718000000, "states": [["800c1a", "AIC512  ", "India", 1718000000, 1718000001,
//!   76.01, 10.05, 4572.0, false, 230.5, 12.0, 0.0, null, 4600.0, "1200", false, 0], ...]}
//! ```
//!
//! Only the fields the tracker needs are decoded. Altitudes arrive in meters and are
//! converted to feet here.

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

use super::SightingSource;
use crate::errors::SourceError;
use crate::geometry::GeoPoint;
use crate::sightings::{AircraftSighting, METERS_TO_FEET};

/// Default OpenSky state vector endpoint
pub const DEFAULT_OPENSKY_URL: &str = "https://opensky-network.org/api/states/all";

// State vector column indices
const IDX_ICAO24: usize = 0;
const IDX_CALLSIGN: usize = 1;
const IDX_TIME_POSITION: usize = 3;
const IDX_LONGITUDE: usize = 5;
const IDX_LATITUDE: usize = 6;
const IDX_BARO_ALTITUDE: usize = 7;
const IDX_ON_GROUND: usize = 8;
const IDX_VELOCITY: usize = 9;
const IDX_GEO_ALTITUDE: usize = 13;

#[derive(Debug, Clone)]
pub struct OpenSkyConfig {
    pub api_url: String,
    /// Half-size of the query box in degrees of latitude/longitude
    pub search_radius_deg: f64,
    pub request_timeout: Duration,
}

impl Default for OpenSkyConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_OPENSKY_URL.to_string(),
            search_radius_deg: 0.5,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
    /// `null` when nothing is inside the box
    states: Option<Vec<Vec<Value>>>,
}

pub struct OpenSkySource {
    client: reqwest::Client,
    config: OpenSkyConfig,
}

impl OpenSkySource {
    pub fn new(config: OpenSkyConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("planewatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Bounding box query parameters around a point
    fn bounding_box(&self, around: GeoPoint) -> [(&'static str, String); 4] {
        let r = self.config.search_radius_deg;
        [
            ("lamin", format!("{:.4}", (around.latitude - r).max(-90.0))),
            ("lomin", format!("{:.4}", (around.longitude - r).max(-180.0))),
            ("lamax", format!("{:.4}", (around.latitude + r).min(90.0))),
            ("lomax", format!("{:.4}", (around.longitude + r).min(180.0))),
        ]
    }
}

#[async_trait]
impl SightingSource for OpenSkySource {
    async fn fetch(&self, around: GeoPoint) -> Result<Vec<AircraftSighting>, SourceError> {
        let params = self.bounding_box(around);
        debug!(url = %self.config.api_url, %around, "Fetching live sightings");

        let response = self
            .client
            .get(&self.config.api_url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let sightings = parse_states(&body)?;
        trace!(count = sightings.len(), "Decoded live sightings");
        Ok(sightings)
    }

    fn name(&self) -> &str {
        "opensky"
    }
}

/// Decode a `states/all` response body into sightings
///
/// Rows without an ICAO address or a position are skipped. Blank callsigns become
/// `None`. Aircraft on the ground report an altitude of 0 ft.
pub fn parse_states(body: &str) -> Result<Vec<AircraftSighting>, SourceError> {
    let response: StatesResponse = serde_json::from_str(body)?;
    let rows = response.states.unwrap_or_default();

    let sightings = rows
        .iter()
        .filter_map(|row| {
            let sighting = parse_row(row);
            if sighting.is_none() {
                trace!(row = ?row.first(), "Skipping incomplete state vector");
            }
            sighting
        })
        .collect();

    Ok(sightings)
}

fn parse_row(row: &[Value]) -> Option<AircraftSighting> {
    let identity = row.get(IDX_ICAO24)?.as_str()?.trim().to_ascii_lowercase();
    if identity.is_empty() {
        return None;
    }

    let latitude = row.get(IDX_LATITUDE)?.as_f64()?;
    let longitude = row.get(IDX_LONGITUDE)?.as_f64()?;

    let callsign = row
        .get(IDX_CALLSIGN)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let on_ground = row
        .get(IDX_ON_GROUND)
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let altitude_m = row
        .get(IDX_BARO_ALTITUDE)
        .and_then(Value::as_f64)
        .or_else(|| row.get(IDX_GEO_ALTITUDE).and_then(Value::as_f64));
    let altitude_ft = match (on_ground, altitude_m) {
        (true, _) | (false, None) => 0.0,
        (false, Some(meters)) => meters * METERS_TO_FEET,
    };

    let ground_speed_mps = row
        .get(IDX_VELOCITY)
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    let observed_at = row
        .get(IDX_TIME_POSITION)
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Some(AircraftSighting {
        identity,
        callsign,
        position: GeoPoint::new(latitude, longitude),
        altitude_ft,
        ground_speed_mps,
        observed_at,
    })
}
