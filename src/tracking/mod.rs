//! Tracking state machine
//!
//! [`Tracker`] is the synchronous core of a tracking session: it owns the state
//! machine, the detection engine and the compass, and turns every input (start/stop
//! requests, location results, poll results, animation frames) into state changes plus
//! a list of [`TrackerEffect`]s for the driver to carry out. The async driver lives in
//! [`service`].

pub mod compass;
pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::detection::{AdmissionThresholds, CompassTarget, DetectionEngine, NotificationChange};
use crate::errors::{LocationError, SourceError};
use crate::geometry::{GeoPoint, angular_difference};
use crate::location::DEFAULT_POSITION;
use crate::sightings::{AircraftSighting, NotifiedAircraft};

pub use compass::{BearingWrite, BearingWriter, Compass};
pub use service::{
    Collaborators, ServiceSettings, TrackerCommand, TrackerEvent, TrackingHandle,
    TrackingService,
};

/// Which kind of data feeds an active session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    Live,
    Synthetic,
}

impl TrackingMode {
    fn active_state(self) -> TrackingState {
        match self {
            TrackingMode::Live => TrackingState::LiveTracking,
            TrackingMode::Synthetic => TrackingState::SyntheticTracking,
        }
    }
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingMode::Live => write!(f, "live"),
            TrackingMode::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl std::str::FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(TrackingMode::Live),
            "synthetic" | "mock" => Ok(TrackingMode::Synthetic),
            other => Err(format!("unknown tracking mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Idle,
    AcquiringLocation,
    LiveTracking,
    SyntheticTracking,
}

impl TrackingState {
    pub fn is_tracking(&self) -> bool {
        matches!(
            self,
            TrackingState::LiveTracking | TrackingState::SyntheticTracking
        )
    }

    pub fn mode(&self) -> Option<TrackingMode> {
        match self {
            TrackingState::LiveTracking => Some(TrackingMode::Live),
            TrackingState::SyntheticTracking => Some(TrackingMode::Synthetic),
            _ => None,
        }
    }
}

/// Work the driver has to do after a state change
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEffect {
    /// Ask the location collaborator for a fix
    RequestLocation,
    /// Start the poll schedule for a session: poll now, then on the mode's interval
    BeginPolling { session: u64, mode: TrackingMode },
    /// Cancel the poll schedule and any in-flight fetch
    StopPolling,
    /// Halt narration (`stop_all`)
    CancelNarration,
    /// Play the notification sound for a newly detected aircraft
    NewDetection(NotifiedAircraft),
    /// The notified aircraft no longer qualifies
    Cleared(NotifiedAircraft),
    /// User-visible status line
    Status(String),
    StateChanged(TrackingState),
}

/// Static settings for a tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    pub thresholds: AdmissionThresholds,
    /// Used whenever the location collaborator cannot deliver a fix
    pub default_position: GeoPoint,
    /// Take the default-position path when location permission is denied
    pub fallback_on_permission_denied: bool,
    pub idle_rotation_deg_per_sec: f64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            thresholds: AdmissionThresholds::default(),
            default_position: DEFAULT_POSITION,
            fallback_on_permission_denied: false,
            idle_rotation_deg_per_sec: 30.0,
        }
    }
}

/// Read-only view handed to UI readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub state: TrackingState,
    pub bearing_deg: f64,
    /// Activity that last moved the needle
    pub bearing_writer: Option<BearingWriter>,
    pub idle_rotation: bool,
    pub user_position: Option<GeoPoint>,
    pub notified: Option<NotifiedAircraft>,
    pub compass_target: Option<CompassTarget>,
    pub status: Option<String>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub narrating: bool,
}

/// One tracking session's state machine and shared state
#[derive(Debug, Clone)]
pub struct Tracker {
    settings: TrackerSettings,
    state: TrackingState,
    /// Mode requested while the location is still being resolved
    pending_mode: Option<TrackingMode>,
    user_position: Option<GeoPoint>,
    engine: DetectionEngine,
    compass: Compass,
    compass_target: Option<CompassTarget>,
    /// Bumped on every activation and stop so late poll results can be recognized
    session: u64,
    status: Option<String>,
    last_poll_at: Option<DateTime<Utc>>,
}

impl Tracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            state: TrackingState::Idle,
            pending_mode: None,
            user_position: None,
            engine: DetectionEngine::new(settings.thresholds),
            compass: Compass::default(),
            compass_target: None,
            session: 0,
            status: None,
            last_poll_at: None,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn bearing_deg(&self) -> f64 {
        self.compass.bearing_deg()
    }

    pub fn compass(&self) -> &Compass {
        &self.compass
    }

    pub fn idle_rotation_active(&self) -> bool {
        self.compass.idle_rotation_active()
    }

    pub fn notified(&self) -> Option<&NotifiedAircraft> {
        self.engine.notified()
    }

    pub fn compass_target(&self) -> Option<&CompassTarget> {
        self.compass_target.as_ref()
    }

    pub fn user_position(&self) -> Option<GeoPoint> {
        self.user_position
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn snapshot(&self, narrating: bool) -> TrackerSnapshot {
        TrackerSnapshot {
            state: self.state,
            bearing_deg: self.compass.bearing_deg(),
            bearing_writer: self.compass.last_writer(),
            idle_rotation: self.compass.idle_rotation_active(),
            user_position: self.user_position,
            notified: self.engine.notified().cloned(),
            compass_target: self.compass_target.clone(),
            status: self.status.clone(),
            last_poll_at: self.last_poll_at,
            narrating,
        }
    }

    /// Request tracking in `mode`. Switching modes stops the other one first.
    pub fn start(&mut self, mode: TrackingMode) -> Vec<TrackerEffect> {
        let mut effects = Vec::new();

        match self.state {
            state if state.mode() == Some(mode) => {
                debug!(%mode, "Tracking already active in requested mode");
                return effects;
            }
            TrackingState::LiveTracking | TrackingState::SyntheticTracking => {
                info!(from = ?self.state, to = %mode, "Switching tracking mode");
                self.deactivate(&mut effects);
            }
            TrackingState::AcquiringLocation => {
                // One location request is already outstanding; just retarget it
                self.pending_mode = Some(mode);
                return effects;
            }
            TrackingState::Idle => {}
        }

        match self.user_position {
            Some(_) => self.activate(mode, &mut effects),
            None => {
                self.pending_mode = Some(mode);
                self.transition(TrackingState::AcquiringLocation, &mut effects);
                self.set_status("Acquiring location...", &mut effects);
                effects.push(TrackerEffect::RequestLocation);
            }
        }

        effects
    }

    /// Feed the location collaborator's answer
    pub fn location_resolved(
        &mut self,
        result: Result<GeoPoint, LocationError>,
    ) -> Vec<TrackerEffect> {
        let mut effects = Vec::new();

        if self.state != TrackingState::AcquiringLocation {
            trace!("Ignoring location result outside of acquisition");
            if let Ok(position) = result {
                self.user_position = Some(position);
            }
            return effects;
        }

        let Some(mode) = self.pending_mode.take() else {
            warn!("Location resolved without a pending mode");
            self.transition(TrackingState::Idle, &mut effects);
            return effects;
        };

        let position = match result {
            Ok(position) => {
                info!(%position, "Location acquired");
                position
            }
            Err(LocationError::PermissionDenied) if !self.settings.fallback_on_permission_denied => {
                warn!("Location permission denied, tracking not started");
                self.transition(TrackingState::Idle, &mut effects);
                self.set_status(
                    "Location permission denied. Grant access to start tracking.",
                    &mut effects,
                );
                return effects;
            }
            Err(e) => {
                warn!(error = %e, fallback = %self.settings.default_position, "Using default position");
                self.set_status(
                    &format!("{}. Using default position.", e),
                    &mut effects,
                );
                self.settings.default_position
            }
        };

        self.user_position = Some(position);
        self.activate(mode, &mut effects);
        effects
    }

    /// Replace the cached user position (e.g. the device moved)
    pub fn update_position(&mut self, position: GeoPoint) {
        self.user_position = Some(position);
    }

    /// Stop tracking from any state
    pub fn stop(&mut self) -> Vec<TrackerEffect> {
        let mut effects = Vec::new();
        if self.state == TrackingState::Idle {
            // Still safe to cancel narration
            effects.push(TrackerEffect::CancelNarration);
            return effects;
        }

        info!(state = ?self.state, "Stopping tracking");
        self.pending_mode = None;
        self.deactivate(&mut effects);
        self.transition(TrackingState::Idle, &mut effects);
        self.set_status("Tracking stopped", &mut effects);
        effects
    }

    /// Apply the outcome of a poll for `session`. Results from other sessions are dropped.
    pub fn apply_poll(
        &mut self,
        session: u64,
        result: Result<Vec<AircraftSighting>, SourceError>,
    ) -> Vec<TrackerEffect> {
        let mut effects = Vec::new();

        let (Some(mode), Some(user)) = (self.state.mode(), self.user_position) else {
            trace!(session, "Dropping poll result, tracking inactive");
            return effects;
        };
        if session != self.session {
            trace!(session, current = self.session, "Dropping stale poll result");
            return effects;
        }

        let sightings = match result {
            Ok(sightings) => sightings,
            Err(e) => {
                // Keep the previous bearing and notified aircraft, retry on schedule
                warn!(error = %e, %mode, "Poll failed");
                metrics::counter!("tracking.poll.failed_total").increment(1);
                self.set_status(&format!("Data source error: {}", e), &mut effects);
                return effects;
            }
        };

        metrics::counter!("tracking.poll.success_total").increment(1);
        self.last_poll_at = Some(Utc::now());

        let evaluation = self
            .engine
            .evaluate(user, &sightings, mode == TrackingMode::Synthetic);
        self.compass_target = evaluation.compass_target;

        match evaluation.change {
            NotificationChange::NewDetection(aircraft) => {
                self.set_status(
                    &format!("Aircraft detected: {}", aircraft.sighting.display_name()),
                    &mut effects,
                );
                effects.push(TrackerEffect::NewDetection(aircraft));
            }
            NotificationChange::Cleared(aircraft) => {
                self.set_status("Scanning for aircraft...", &mut effects);
                effects.push(TrackerEffect::Cleared(aircraft));
            }
            NotificationChange::Unchanged | NotificationChange::Quiet => {}
        }

        // Suspend or resume idle rotation before touching the bearing
        self.sync_idle_rotation();
        if let Some(target) = &self.compass_target
            && !self.compass.idle_rotation_active()
        {
            let previous = self.compass.bearing_deg();
            self.compass.commit(BearingWrite::Target(target.bearing_deg));
            trace!(
                identity = %target.identity,
                swing_deg = angular_difference(previous, self.compass.bearing_deg()),
                "Needle pinned to target"
            );
        }

        debug!(
            %mode,
            sightings = sightings.len(),
            qualifying = evaluation.qualifying,
            bearing_deg = self.compass.bearing_deg(),
            idle_rotation = self.compass.idle_rotation_active(),
            "Poll applied"
        );

        effects
    }

    /// Advance the idle scan by one animation frame. Returns whether the needle moved.
    pub fn advance_idle(&mut self, elapsed: Duration) -> bool {
        self.compass.commit(BearingWrite::IdleStep {
            elapsed,
            deg_per_sec: self.settings.idle_rotation_deg_per_sec,
        })
    }

    fn activate(&mut self, mode: TrackingMode, effects: &mut Vec<TrackerEffect>) {
        self.session += 1;
        self.compass_target = None;
        self.transition(mode.active_state(), effects);
        self.sync_idle_rotation();
        self.set_status(&format!("Tracking ({})", mode), effects);
        effects.push(TrackerEffect::BeginPolling {
            session: self.session,
            mode,
        });
        info!(%mode, session = self.session, "Tracking started");
    }

    /// Tear down an active session: polling, narration, notified aircraft, idle rotation
    fn deactivate(&mut self, effects: &mut Vec<TrackerEffect>) {
        self.session += 1;
        effects.push(TrackerEffect::StopPolling);
        effects.push(TrackerEffect::CancelNarration);
        if let Some(previous) = self.engine.clear() {
            effects.push(TrackerEffect::Cleared(previous));
        }
        self.compass_target = None;
        self.compass.set_idle_rotation(false);
    }

    fn transition(&mut self, next: TrackingState, effects: &mut Vec<TrackerEffect>) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Tracking state change");
            self.state = next;
            effects.push(TrackerEffect::StateChanged(next));
        }
        self.sync_idle_rotation();
    }

    /// Idle rotation runs exactly when tracking is active and nothing is notified
    fn sync_idle_rotation(&mut self) {
        let should_run = self.state.is_tracking() && self.engine.notified().is_none();
        self.compass.set_idle_rotation(should_run);
        debug_assert!(!(self.compass.idle_rotation_active() && self.engine.notified().is_some()));
    }

    fn set_status(&mut self, status: &str, effects: &mut Vec<TrackerEffect>) {
        self.status = Some(status.to_string());
        effects.push(TrackerEffect::Status(status.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: GeoPoint = GeoPoint::new(10.0, 76.0);

    fn tracker() -> Tracker {
        Tracker::new(TrackerSettings::default())
    }

    fn tracking(mode: TrackingMode) -> Tracker {
        let mut tracker = tracker();
        tracker.update_position(USER);
        tracker.start(mode);
        tracker
    }

    fn qualifying(identity: &str) -> AircraftSighting {
        AircraftSighting::new(identity, GeoPoint::new(10.05, 76.0), 15_000.0)
    }

    fn low(identity: &str) -> AircraftSighting {
        AircraftSighting::new(identity, GeoPoint::new(10.0, 76.05), 5_000.0)
    }

    fn count_new(effects: &[TrackerEffect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, TrackerEffect::NewDetection(_)))
            .count()
    }

    #[test]
    fn test_start_without_position_acquires_location() {
        let mut tracker = tracker();
        let effects = tracker.start(TrackingMode::Live);
        assert_eq!(tracker.state(), TrackingState::AcquiringLocation);
        assert!(effects.contains(&TrackerEffect::RequestLocation));
        assert!(!tracker.idle_rotation_active());

        let effects = tracker.location_resolved(Ok(USER));
        assert_eq!(tracker.state(), TrackingState::LiveTracking);
        assert_eq!(tracker.user_position(), Some(USER));
        assert!(effects.iter().any(|e| matches!(
            e,
            TrackerEffect::BeginPolling {
                mode: TrackingMode::Live,
                ..
            }
        )));
        assert!(tracker.idle_rotation_active());
    }

    #[test]
    fn test_location_unavailable_falls_back_to_default() {
        let mut tracker = tracker();
        tracker.start(TrackingMode::Synthetic);
        let effects =
            tracker.location_resolved(Err(LocationError::Unavailable("timeout".to_string())));
        assert_eq!(tracker.state(), TrackingState::SyntheticTracking);
        assert_eq!(tracker.user_position(), Some(DEFAULT_POSITION));
        assert!(effects.iter().any(|e| matches!(e, TrackerEffect::Status(s) if s.contains("default position"))));
    }

    #[test]
    fn test_permission_denied_blocks_start() {
        let mut tracker = tracker();
        tracker.start(TrackingMode::Live);
        let effects = tracker.location_resolved(Err(LocationError::PermissionDenied));
        assert_eq!(tracker.state(), TrackingState::Idle);
        assert!(tracker.user_position().is_none());
        assert!(!effects.iter().any(|e| matches!(e, TrackerEffect::BeginPolling { .. })));
        assert!(tracker.status().is_some_and(|s| s.contains("permission denied")));
    }

    #[test]
    fn test_permission_denied_with_fallback() {
        let mut tracker = Tracker::new(TrackerSettings {
            fallback_on_permission_denied: true,
            ..TrackerSettings::default()
        });
        tracker.start(TrackingMode::Live);
        tracker.location_resolved(Err(LocationError::PermissionDenied));
        assert_eq!(tracker.state(), TrackingState::LiveTracking);
        assert_eq!(tracker.user_position(), Some(DEFAULT_POSITION));
    }

    #[test]
    fn test_mode_request_during_acquisition_is_retargeted() {
        let mut tracker = tracker();
        tracker.start(TrackingMode::Live);
        let effects = tracker.start(TrackingMode::Synthetic);
        assert!(effects.is_empty());
        tracker.location_resolved(Ok(USER));
        assert_eq!(tracker.state(), TrackingState::SyntheticTracking);
    }

    #[test]
    fn test_cached_position_skips_acquisition() {
        let tracker = tracking(TrackingMode::Live);
        assert_eq!(tracker.state(), TrackingState::LiveTracking);
        assert_eq!(tracker.session(), 1);
    }

    #[test]
    fn test_debounce_scenario_through_tracker() {
        let mut tracker = tracking(TrackingMode::Live);
        let session = tracker.session();

        let first = tracker.apply_poll(session, Ok(vec![qualifying("X")]));
        let second = tracker.apply_poll(session, Ok(vec![qualifying("X")]));
        assert_eq!(count_new(&first) + count_new(&second), 1);
        assert!(!tracker.idle_rotation_active());

        let mut below = qualifying("X");
        below.altitude_ft = 8_000.0;
        let third = tracker.apply_poll(session, Ok(vec![below]));
        assert!(third.iter().any(|e| matches!(e, TrackerEffect::Cleared(_))));
        assert!(tracker.notified().is_none());
        assert!(tracker.idle_rotation_active());

        let fourth = tracker.apply_poll(session, Ok(vec![qualifying("X")]));
        assert_eq!(count_new(&fourth), 1);
    }

    #[test]
    fn test_detection_pins_bearing_and_suspends_idle() {
        let mut tracker = tracking(TrackingMode::Live);
        assert!(tracker.advance_idle(Duration::from_secs(3)));
        assert!((tracker.bearing_deg() - 90.0).abs() < 1e-9);

        let session = tracker.session();
        tracker.apply_poll(session, Ok(vec![qualifying("X")]));
        assert!(!tracker.idle_rotation_active());
        assert!(tracker.bearing_deg() < 0.01 || tracker.bearing_deg() > 359.99);
        assert_eq!(tracker.compass().last_writer(), Some(BearingWriter::Poll));
        assert_eq!(tracker.snapshot(false).bearing_writer, Some(BearingWriter::Poll));

        // Animation frames can no longer move the needle
        let pinned = tracker.bearing_deg();
        assert!(!tracker.advance_idle(Duration::from_secs(1)));
        assert_eq!(tracker.bearing_deg(), pinned);
    }

    #[test]
    fn test_non_qualifying_target_does_not_stop_idle_rotation() {
        let mut tracker = tracking(TrackingMode::Live);
        tracker.advance_idle(Duration::from_secs(1));
        let before = tracker.bearing_deg();

        let session = tracker.session();
        tracker.apply_poll(session, Ok(vec![low("LOW")]));
        assert_eq!(tracker.compass_target().map(|t| t.identity.as_str()), Some("LOW"));
        assert!(tracker.idle_rotation_active());
        assert_eq!(tracker.bearing_deg(), before);
    }

    #[test]
    fn test_poll_failure_keeps_state() {
        let mut tracker = tracking(TrackingMode::Live);
        let session = tracker.session();
        tracker.apply_poll(session, Ok(vec![qualifying("X")]));
        let bearing = tracker.bearing_deg();

        let effects = tracker.apply_poll(session, Err(SourceError::Status(503)));
        assert_eq!(tracker.notified().map(|n| n.identity()), Some("X"));
        assert_eq!(tracker.bearing_deg(), bearing);
        assert_eq!(tracker.state(), TrackingState::LiveTracking);
        assert!(effects.iter().any(|e| matches!(e, TrackerEffect::Status(s) if s.contains("503"))));
    }

    #[test]
    fn test_stale_session_results_are_dropped() {
        let mut tracker = tracking(TrackingMode::Live);
        let old_session = tracker.session();
        tracker.start(TrackingMode::Synthetic);
        assert_ne!(tracker.session(), old_session);

        let effects = tracker.apply_poll(old_session, Ok(vec![qualifying("X")]));
        assert!(effects.is_empty());
        assert!(tracker.notified().is_none());
    }

    #[test]
    fn test_switching_modes_clears_and_cancels() {
        let mut tracker = tracking(TrackingMode::Live);
        tracker.apply_poll(tracker.session(), Ok(vec![qualifying("X")]));

        let effects = tracker.start(TrackingMode::Synthetic);
        assert_eq!(tracker.state(), TrackingState::SyntheticTracking);
        assert!(tracker.notified().is_none());
        assert!(effects.contains(&TrackerEffect::StopPolling));
        assert!(effects.contains(&TrackerEffect::CancelNarration));
        assert!(effects.iter().any(|e| matches!(e, TrackerEffect::Cleared(_))));
        assert!(tracker.idle_rotation_active());

        // Synthetic sightings are flagged as such
        tracker.apply_poll(tracker.session(), Ok(vec![qualifying("Y")]));
        assert!(tracker.notified().is_some_and(|n| n.is_synthetic));
    }

    #[test]
    fn test_stop_cancels_everything() {
        let mut tracker = tracking(TrackingMode::Synthetic);
        tracker.apply_poll(tracker.session(), Ok(vec![qualifying("X")]));

        let effects = tracker.stop();
        assert_eq!(tracker.state(), TrackingState::Idle);
        assert!(effects.contains(&TrackerEffect::StopPolling));
        assert!(effects.contains(&TrackerEffect::CancelNarration));
        assert!(tracker.notified().is_none());
        assert!(!tracker.idle_rotation_active());
        assert!(!tracker.advance_idle(Duration::from_secs(1)));

        // Late results after stop change nothing
        let session = tracker.session();
        assert!(tracker.apply_poll(session, Ok(vec![qualifying("Z")])).is_empty());
    }

    #[test]
    fn test_restarting_same_mode_is_noop() {
        let mut tracker = tracking(TrackingMode::Live);
        let session = tracker.session();
        assert!(tracker.start(TrackingMode::Live).is_empty());
        assert_eq!(tracker.session(), session);
    }

    #[test]
    fn test_empty_batch_falls_back_to_idle_rotation() {
        let mut tracker = tracking(TrackingMode::Live);
        let session = tracker.session();
        tracker.apply_poll(session, Ok(vec![qualifying("X")]));
        assert!(!tracker.idle_rotation_active());

        tracker.apply_poll(session, Ok(vec![]));
        assert!(tracker.compass_target().is_none());
        assert!(tracker.idle_rotation_active());
    }

    #[test]
    fn test_idle_and_notified_never_coexist() {
        let mut tracker = tracking(TrackingMode::Live);
        let session = tracker.session();
        let batches = vec![
            vec![],
            vec![low("L")],
            vec![qualifying("A")],
            vec![qualifying("A"), low("L")],
            vec![low("L")],
            vec![qualifying("B")],
            vec![],
        ];
        for batch in batches {
            tracker.apply_poll(session, Ok(batch));
            tracker.advance_idle(Duration::from_millis(33));
            assert!(!(tracker.idle_rotation_active() && tracker.notified().is_some()));
        }
    }
}
