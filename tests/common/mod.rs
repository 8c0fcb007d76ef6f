//! Shared helpers for service-level integration tests
//!
//! [`ScriptedSource`] replays a fixed list of poll results, and [`RecordingPlayer`]
//! records every clip it is asked to play and completes it immediately.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use planewatch::errors::{PlaybackError, SourceError};
use planewatch::geometry::{GeoPoint, SectorPolicy};
use planewatch::location::{FixedLocation, LocationProvider};
use planewatch::narration::{
    Clip, ClipCatalog, ClipPlayer, NarrationQueue, PlaybackFinished, PlaybackTicket,
};
use planewatch::sightings::AircraftSighting;
use planewatch::sources::SightingSource;
use planewatch::tracking::{
    Collaborators, ServiceSettings, Tracker, TrackerEvent, TrackerSettings, TrackingHandle,
    TrackingService,
};

pub const USER: GeoPoint = GeoPoint::new(10.0, 76.0);

/// ~5.56 km due north of [`USER`]
pub fn qualifying(identity: &str) -> AircraftSighting {
    AircraftSighting::new(identity, GeoPoint::new(10.05, 76.0), 15_000.0)
}

/// In range but below the altitude floor
pub fn too_low(identity: &str) -> AircraftSighting {
    AircraftSighting::new(identity, GeoPoint::new(10.05, 76.0), 5_000.0)
}

/// Source that answers each poll with the next scripted result
///
/// Once the script runs out every poll returns an empty batch. An optional delay
/// simulates a slow backend.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<AircraftSighting>, SourceError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<AircraftSighting>, SourceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SightingSource for ScriptedSource {
    async fn fetch(&self, _around: GeoPoint) -> Result<Vec<AircraftSighting>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Player that records clip keys and reports each clip finished right away
pub struct RecordingPlayer {
    played: Arc<Mutex<Vec<String>>>,
    completions: flume::Sender<PlaybackFinished>,
}

impl RecordingPlayer {
    pub fn new(completions: flume::Sender<PlaybackFinished>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let played = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                played: played.clone(),
                completions,
            },
            played,
        )
    }
}

impl ClipPlayer for RecordingPlayer {
    fn play(&mut self, ticket: PlaybackTicket, clip: &Clip) -> Result<(), PlaybackError> {
        self.played.lock().unwrap().push(clip.key.clone());
        self.completions
            .send(PlaybackFinished {
                ticket,
                result: Ok(()),
            })
            .map_err(|_| PlaybackError::PlayerClosed)
    }

    fn stop_all(&mut self) {}
}

pub fn fast_settings() -> ServiceSettings {
    ServiceSettings {
        live_poll: Duration::from_secs(5),
        synthetic_poll: Duration::from_secs(1),
        frame: Duration::from_millis(50),
        auto_narrate: false,
    }
}

pub struct TestService {
    pub handle: TrackingHandle,
    pub played: Arc<Mutex<Vec<String>>>,
}

/// Spawn a service whose live and synthetic feeds are both `source`
pub fn spawn_service(
    source: Arc<dyn SightingSource>,
    location: Arc<dyn LocationProvider>,
    tracker_settings: TrackerSettings,
    settings: ServiceSettings,
) -> TestService {
    let (tx, rx) = flume::unbounded();
    let (player, played) = RecordingPlayer::new(tx);
    let narration = NarrationQueue::new(
        player,
        ClipCatalog::conventional(std::path::Path::new("/clips"), "mp3"),
        SectorPolicy::Compound,
    );
    let service = TrackingService::new(
        Tracker::new(tracker_settings),
        narration,
        rx,
        Collaborators {
            location,
            live: source.clone(),
            synthetic: source,
        },
        settings,
    );
    TestService {
        handle: service.spawn(),
        played,
    }
}

pub fn fixed_user() -> Arc<dyn LocationProvider> {
    Arc::new(FixedLocation::new(USER))
}

/// Wait up to `within` for an event matching `pred`, discarding others
pub async fn next_matching(
    events: &flume::Receiver<TrackerEvent>,
    within: Duration,
    pred: impl Fn(&TrackerEvent) -> bool,
) -> Option<TrackerEvent> {
    tokio::time::timeout(within, async {
        loop {
            match events.recv_async().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
