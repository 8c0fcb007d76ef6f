use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::GeoPoint;

/// Meters to feet conversion factor
pub const METERS_TO_FEET: f64 = 3.28084;

/// Knots per meter/second
pub const MPS_TO_KNOTS: f64 = 1.94384;

/// One aircraft position report from a single poll cycle
///
/// Altitude is always stored in feet; sources convert at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftSighting {
    /// Stable identity (ICAO hex address or registration)
    pub identity: String,
    /// Display callsign, if the source reported one
    pub callsign: Option<String>,
    pub position: GeoPoint,
    pub altitude_ft: f64,
    pub ground_speed_mps: f64,
    /// When the source says the position was observed
    pub observed_at: Option<DateTime<Utc>>,
}

impl AircraftSighting {
    pub fn new(identity: impl Into<String>, position: GeoPoint, altitude_ft: f64) -> Self {
        Self {
            identity: identity.into(),
            callsign: None,
            position,
            altitude_ft,
            ground_speed_mps: 0.0,
            observed_at: None,
        }
    }

    pub fn with_callsign(mut self, callsign: impl Into<String>) -> Self {
        self.callsign = Some(callsign.into());
        self
    }

    pub fn with_ground_speed(mut self, ground_speed_mps: f64) -> Self {
        self.ground_speed_mps = ground_speed_mps;
        self
    }

    /// Callsign when present, otherwise the identity
    pub fn display_name(&self) -> &str {
        self.callsign.as_deref().unwrap_or(&self.identity)
    }

    pub fn ground_speed_knots(&self) -> f64 {
        self.ground_speed_mps * MPS_TO_KNOTS
    }
}

/// The aircraft currently under notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifiedAircraft {
    pub sighting: AircraftSighting,
    /// True when the sighting came from the synthetic generator
    pub is_synthetic: bool,
    pub notified_at: DateTime<Utc>,
}

impl NotifiedAircraft {
    pub fn identity(&self) -> &str {
        &self.sighting.identity
    }

    pub fn position(&self) -> GeoPoint {
        self.sighting.position
    }
}
