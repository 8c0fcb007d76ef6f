//! Detection engine
//!
//! Picks the compass target (nearest aircraft of any kind) and the notification
//! candidate (nearest aircraft inside the admission thresholds) from one batch of
//! sightings, and debounces notifications so each identity is announced once per
//! stretch of time it stays qualified.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

use crate::geometry::{GeoPoint, distance_km, initial_bearing_deg};
use crate::sightings::{AircraftSighting, NotifiedAircraft};

/// Distance and altitude an aircraft must satisfy to be notified
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdmissionThresholds {
    /// Sightings must be strictly closer than this
    pub radius_km: f64,
    /// Sightings must be strictly higher than this
    pub min_altitude_ft: f64,
}

impl Default for AdmissionThresholds {
    fn default() -> Self {
        Self {
            radius_km: 30.0,
            min_altitude_ft: 10_000.0,
        }
    }
}

impl AdmissionThresholds {
    pub fn admits(&self, distance_km: f64, altitude_ft: f64) -> bool {
        distance_km < self.radius_km && altitude_ft > self.min_altitude_ft
    }
}

/// The aircraft the compass needle should point at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompassTarget {
    pub identity: String,
    pub distance_km: f64,
    pub bearing_deg: f64,
}

/// What happened to the notified aircraft during one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationChange {
    /// A new identity was promoted; the notification sound should play
    NewDetection(NotifiedAircraft),
    /// The already-notified identity is still the candidate
    Unchanged,
    /// Nothing qualifies any more; carries the aircraft that was dropped
    Cleared(NotifiedAircraft),
    /// Nothing qualified before and nothing qualifies now
    Quiet,
}

impl NotificationChange {
    pub fn is_new_detection(&self) -> bool {
        matches!(self, NotificationChange::NewDetection(_))
    }
}

/// Result of evaluating one batch of sightings
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub compass_target: Option<CompassTarget>,
    pub change: NotificationChange,
    /// Distinct identities that took part in selection
    pub considered: usize,
    /// How many of those met the admission thresholds
    pub qualifying: usize,
}

/// A sighting with its distance and bearing from the user
struct Ranged<'a> {
    sighting: &'a AircraftSighting,
    distance_km: f64,
    bearing_deg: f64,
}

/// Owns the currently notified aircraft and applies the debounce rule
#[derive(Debug, Clone)]
pub struct DetectionEngine {
    thresholds: AdmissionThresholds,
    notified: Option<NotifiedAircraft>,
}

impl DetectionEngine {
    pub fn new(thresholds: AdmissionThresholds) -> Self {
        Self {
            thresholds,
            notified: None,
        }
    }

    pub fn thresholds(&self) -> AdmissionThresholds {
        self.thresholds
    }

    pub fn notified(&self) -> Option<&NotifiedAircraft> {
        self.notified.as_ref()
    }

    /// Drop the notified aircraft without evaluating anything (used on stop / mode switch)
    pub fn clear(&mut self) -> Option<NotifiedAircraft> {
        self.notified.take()
    }

    /// Evaluate one poll cycle worth of sightings around `user`
    pub fn evaluate(
        &mut self,
        user: GeoPoint,
        sightings: &[AircraftSighting],
        is_synthetic: bool,
    ) -> Evaluation {
        let ranged = rank_sightings(user, sightings);

        // Strict `<` keeps the earliest entry on equal distance
        let mut nearest: Option<&Ranged> = None;
        let mut candidate: Option<&Ranged> = None;
        let mut qualifying = 0;

        for entry in &ranged {
            if nearest.is_none_or(|n| entry.distance_km < n.distance_km) {
                nearest = Some(entry);
            }

            if self
                .thresholds
                .admits(entry.distance_km, entry.sighting.altitude_ft)
            {
                qualifying += 1;
                if candidate.is_none_or(|c| entry.distance_km < c.distance_km) {
                    candidate = Some(entry);
                }
            }
        }

        let compass_target = nearest.map(|n| CompassTarget {
            identity: n.sighting.identity.clone(),
            distance_km: n.distance_km,
            bearing_deg: n.bearing_deg,
        });

        let change = self.apply_candidate(candidate, is_synthetic);

        trace!(
            considered = ranged.len(),
            qualifying,
            compass_target = ?compass_target.as_ref().map(|t| &t.identity),
            "Evaluated sightings"
        );

        Evaluation {
            compass_target,
            change,
            considered: ranged.len(),
            qualifying,
        }
    }

    fn apply_candidate(&mut self, candidate: Option<&Ranged>, is_synthetic: bool) -> NotificationChange {
        let Some(candidate) = candidate else {
            return match self.notified.take() {
                Some(previous) => {
                    info!(identity = %previous.identity(), "Notified aircraft left the qualifying set");
                    NotificationChange::Cleared(previous)
                }
                None => NotificationChange::Quiet,
            };
        };

        if let Some(current) = self.notified.as_mut()
            && current.sighting.identity == candidate.sighting.identity
        {
            // Same identity: refresh the snapshot but do not signal again
            current.sighting = candidate.sighting.clone();
            current.is_synthetic = is_synthetic;
            return NotificationChange::Unchanged;
        }

        let promoted = NotifiedAircraft {
            sighting: candidate.sighting.clone(),
            is_synthetic,
            notified_at: Utc::now(),
        };

        info!(
            identity = %promoted.identity(),
            callsign = ?promoted.sighting.callsign,
            distance_km = %format!("{:.2}", candidate.distance_km),
            bearing_deg = %format!("{:.1}", candidate.bearing_deg),
            altitude_ft = promoted.sighting.altitude_ft,
            synthetic = is_synthetic,
            "New aircraft detected"
        );
        metrics::counter!("detection.new_detection_total").increment(1);

        self.notified = Some(promoted.clone());
        NotificationChange::NewDetection(promoted)
    }
}

/// Compute distance/bearing for every sighting, collapsing duplicate identities
///
/// When an identity appears more than once the closer report wins; on equal distance
/// the first one encountered is kept. Survivors keep the slot of the first occurrence.
fn rank_sightings(user: GeoPoint, sightings: &[AircraftSighting]) -> Vec<Ranged<'_>> {
    let mut ranged: Vec<Ranged> = Vec::with_capacity(sightings.len());
    let mut slots: HashMap<&str, usize> = HashMap::with_capacity(sightings.len());

    for sighting in sightings {
        let distance = distance_km(user, sighting.position);
        if !distance.is_finite() {
            warn!(identity = %sighting.identity, "Skipping sighting with invalid position");
            continue;
        }

        let entry = Ranged {
            sighting,
            distance_km: distance,
            bearing_deg: initial_bearing_deg(user, sighting.position),
        };

        match slots.get(sighting.identity.as_str()) {
            Some(&slot) => {
                if entry.distance_km < ranged[slot].distance_km {
                    debug!(identity = %sighting.identity, "Duplicate identity in batch, keeping closer report");
                    ranged[slot] = entry;
                }
            }
            None => {
                slots.insert(sighting.identity.as_str(), ranged.len());
                ranged.push(entry);
            }
        }
    }

    ranged
}
