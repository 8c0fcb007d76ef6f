//! Planewatch - overhead aircraft spotting
//!
//! Polls a live or synthetic feed of aircraft near the user, notifies once per
//! aircraft that comes within range, points a compass needle at the nearest one and
//! speaks its direction as a short sequence of audio clips.

pub mod config;
pub mod detection;
pub mod errors;
pub mod geometry;
pub mod location;
pub mod narration;
pub mod sightings;
pub mod sources;
pub mod tracking;

pub use detection::{AdmissionThresholds, CompassTarget, DetectionEngine};
pub use errors::{LocationError, PlaybackError, SourceError};
pub use geometry::{GeoPoint, PhraseToken, SectorPolicy, sector_phrase};
pub use sightings::{AircraftSighting, NotifiedAircraft};
pub use tracking::{Tracker, TrackingHandle, TrackingMode, TrackingService, TrackingState};
