//! Async driver for a [`Tracker`]
//!
//! A single task owns the tracker and the narration queue. Every writer (commands,
//! poll results, animation frames, clip completions) is a branch of one `select!`
//! loop, so bearing and notified-aircraft updates are serialized without locks.
//! Fetches and location requests run on their own tasks and report back through an
//! internal channel tagged with the session they belong to.

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{Tracker, TrackerEffect, TrackerSnapshot, TrackingMode, TrackingState};
use crate::errors::{LocationError, SourceError};
use crate::geometry::GeoPoint;
use crate::location::LocationProvider;
use crate::narration::{ClipPlayer, NarrateOutcome, NarrationQueue, PlaybackFinished};
use crate::sightings::{AircraftSighting, NotifiedAircraft};
use crate::sources::SightingSource;

/// Requests accepted by a running service
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCommand {
    Start(TrackingMode),
    Stop,
    /// Speak the direction of the notified aircraft
    Narrate,
    UpdatePosition(GeoPoint),
    /// Stop tracking and end the service task
    Shutdown,
}

/// Notifications for the UI and the notification-sound collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    NewDetection(NotifiedAircraft),
    Cleared(NotifiedAircraft),
    Status(String),
    StateChanged(TrackingState),
    Narration(NarrateOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceSettings {
    pub live_poll: Duration,
    pub synthetic_poll: Duration,
    /// Idle rotation frame period
    pub frame: Duration,
    /// Narrate automatically whenever a new aircraft is detected
    pub auto_narrate: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            live_poll: Duration::from_secs(15),
            synthetic_poll: Duration::from_secs(3),
            frame: Duration::from_millis(33),
            auto_narrate: false,
        }
    }
}

impl ServiceSettings {
    pub fn poll_period(&self, mode: TrackingMode) -> Duration {
        match mode {
            TrackingMode::Live => self.live_poll,
            TrackingMode::Synthetic => self.synthetic_poll,
        }
    }
}

/// External collaborators the service talks to
#[derive(Clone)]
pub struct Collaborators {
    pub location: Arc<dyn LocationProvider>,
    pub live: Arc<dyn SightingSource>,
    pub synthetic: Arc<dyn SightingSource>,
}

impl Collaborators {
    fn source(&self, mode: TrackingMode) -> Arc<dyn SightingSource> {
        match mode {
            TrackingMode::Live => self.live.clone(),
            TrackingMode::Synthetic => self.synthetic.clone(),
        }
    }
}

/// Longest single idle step, in frame periods
const MAX_FRAME_STEP: u32 = 4;

/// Results coming back from spawned work
enum Internal {
    Location(Result<GeoPoint, LocationError>),
    Poll {
        session: u64,
        result: Result<Vec<AircraftSighting>, SourceError>,
    },
}

struct PollSchedule {
    interval: Interval,
    session: u64,
    mode: TrackingMode,
}

/// Per-run loop state that effects act on
struct Driver {
    poll: Option<PollSchedule>,
    in_flight: Option<JoinHandle<()>>,
    location_task: Option<JoinHandle<()>>,
    last_frame: Option<Instant>,
    internal: flume::Sender<Internal>,
    events: flume::Sender<TrackerEvent>,
}

impl Driver {
    fn emit(&self, event: TrackerEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn cancel_fetch(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

pub struct TrackingService<P: ClipPlayer> {
    tracker: Tracker,
    narration: NarrationQueue<P>,
    playback: flume::Receiver<PlaybackFinished>,
    collaborators: Collaborators,
    settings: ServiceSettings,
}

impl<P: ClipPlayer + 'static> TrackingService<P> {
    /// `playback` receives the completions produced by the narration queue's player
    pub fn new(
        tracker: Tracker,
        narration: NarrationQueue<P>,
        playback: flume::Receiver<PlaybackFinished>,
        collaborators: Collaborators,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            tracker,
            narration,
            playback,
            collaborators,
            settings,
        }
    }

    /// Run the service on its own task
    pub fn spawn(self) -> TrackingHandle {
        let (command_tx, command_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();
        let (snapshot_tx, snapshot_rx) = watch::channel(self.tracker.snapshot(false));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(self.run(command_rx, event_tx, snapshot_tx, cancel.clone()));

        TrackingHandle {
            commands: command_tx,
            events: event_rx,
            snapshot: snapshot_rx,
            cancel,
            task,
        }
    }

    async fn run(
        mut self,
        commands: flume::Receiver<TrackerCommand>,
        events: flume::Sender<TrackerEvent>,
        snapshots: watch::Sender<TrackerSnapshot>,
        cancel: CancellationToken,
    ) {
        let (internal_tx, internal_rx) = flume::unbounded();
        let playback = self.playback.clone();

        let mut frame = tokio::time::interval(self.settings.frame);
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut driver = Driver {
            poll: None,
            in_flight: None,
            location_task: None,
            last_frame: None,
            internal: internal_tx,
            events,
        };

        info!("Tracking service started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Tracking service cancelled");
                    self.shutdown(&mut driver);
                    break;
                }
                command = commands.recv_async() => {
                    match command {
                        Ok(TrackerCommand::Shutdown) | Err(_) => {
                            info!("Tracking service shutting down");
                            self.shutdown(&mut driver);
                            break;
                        }
                        Ok(command) => self.handle_command(command, &mut driver),
                    }
                }
                Ok(message) = internal_rx.recv_async() => {
                    self.handle_internal(message, &mut driver);
                }
                Ok(finished) = playback.recv_async() => {
                    self.narration.on_playback_finished(finished.ticket, finished.result);
                }
                (session, mode) = next_poll(&mut driver.poll) => {
                    self.spawn_fetch(session, mode, &mut driver);
                }
                _ = frame.tick(), if self.tracker.idle_rotation_active() => {
                    // Measure from the wall clock; a resumed interval yields stale deadlines
                    let now = Instant::now();
                    match driver.last_frame {
                        Some(last) => {
                            let elapsed = now
                                .saturating_duration_since(last)
                                .min(self.settings.frame * MAX_FRAME_STEP);
                            self.tracker.advance_idle(elapsed);
                        }
                        None => {
                            trace!("Idle rotation resumed");
                            frame.reset();
                        }
                    }
                    driver.last_frame = Some(now);
                }
            }

            if !self.tracker.idle_rotation_active() {
                driver.last_frame = None;
            }
            snapshots.send_replace(self.tracker.snapshot(self.narration.is_playing()));
        }

        snapshots.send_replace(self.tracker.snapshot(self.narration.is_playing()));
        info!("Tracking service stopped");
    }

    fn handle_command(&mut self, command: TrackerCommand, driver: &mut Driver) {
        debug!(?command, "Tracker command");
        match command {
            TrackerCommand::Start(mode) => {
                let effects = self.tracker.start(mode);
                self.apply(effects, driver);
            }
            TrackerCommand::Stop => {
                let effects = self.tracker.stop();
                self.apply(effects, driver);
            }
            TrackerCommand::Narrate => self.narrate(driver),
            TrackerCommand::UpdatePosition(position) => self.tracker.update_position(position),
            TrackerCommand::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, message: Internal, driver: &mut Driver) {
        let effects = match message {
            Internal::Location(result) => {
                driver.location_task = None;
                self.tracker.location_resolved(result)
            }
            Internal::Poll { session, result } => {
                if driver.poll.as_ref().map(|p| p.session) == Some(session) {
                    driver.in_flight = None;
                }
                self.tracker.apply_poll(session, result)
            }
        };
        self.apply(effects, driver);
    }

    fn narrate(&mut self, driver: &mut Driver) {
        let outcome = match self.tracker.user_position() {
            Some(user) => self.narration.narrate(user, self.tracker.notified()),
            None => NarrateOutcome::NoTarget,
        };
        driver.emit(TrackerEvent::Narration(outcome));
    }

    fn shutdown(&mut self, driver: &mut Driver) {
        let effects = self.tracker.stop();
        self.apply(effects, driver);
        if let Some(handle) = driver.location_task.take() {
            handle.abort();
        }
    }

    /// Carry out tracker effects in order
    fn apply(&mut self, effects: Vec<TrackerEffect>, driver: &mut Driver) {
        for effect in effects {
            match effect {
                TrackerEffect::RequestLocation => self.request_location(driver),
                TrackerEffect::BeginPolling { session, mode } => {
                    driver.cancel_fetch();
                    let period = self.settings.poll_period(mode);
                    let mut interval = tokio::time::interval(period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    debug!(session, %mode, period_ms = period.as_millis() as u64, "Poll schedule started");
                    driver.poll = Some(PollSchedule {
                        interval,
                        session,
                        mode,
                    });
                }
                TrackerEffect::StopPolling => {
                    if driver.poll.take().is_some() {
                        debug!("Poll schedule stopped");
                    }
                    driver.cancel_fetch();
                }
                TrackerEffect::CancelNarration => self.narration.stop_all(),
                TrackerEffect::NewDetection(aircraft) => {
                    driver.emit(TrackerEvent::NewDetection(aircraft));
                    if self.settings.auto_narrate {
                        self.narrate(driver);
                    }
                }
                TrackerEffect::Cleared(aircraft) => driver.emit(TrackerEvent::Cleared(aircraft)),
                TrackerEffect::Status(status) => driver.emit(TrackerEvent::Status(status)),
                TrackerEffect::StateChanged(state) => driver.emit(TrackerEvent::StateChanged(state)),
            }
        }
    }

    fn request_location(&mut self, driver: &mut Driver) {
        if let Some(previous) = driver.location_task.take() {
            previous.abort();
        }
        let provider = self.collaborators.location.clone();
        let internal = driver.internal.clone();
        driver.location_task = Some(tokio::spawn(async move {
            let result = provider.current_position().await;
            let _ = internal.send(Internal::Location(result));
        }));
    }

    fn spawn_fetch(&mut self, session: u64, mode: TrackingMode, driver: &mut Driver) {
        if let Some(handle) = &driver.in_flight
            && !handle.is_finished()
        {
            debug!(session, %mode, "Previous fetch still running, skipping poll");
            return;
        }

        let Some(user) = self.tracker.user_position() else {
            warn!(session, "No user position, skipping poll");
            return;
        };

        let source = self.collaborators.source(mode);
        let internal = driver.internal.clone();
        trace!(session, source = source.name(), "Polling");
        driver.in_flight = Some(tokio::spawn(async move {
            let result = source.fetch(user).await;
            let _ = internal.send(Internal::Poll { session, result });
        }));
    }
}

async fn next_poll(schedule: &mut Option<PollSchedule>) -> (u64, TrackingMode) {
    match schedule {
        Some(schedule) => {
            schedule.interval.tick().await;
            (schedule.session, schedule.mode)
        }
        None => std::future::pending().await,
    }
}

/// Client side of a running [`TrackingService`]
pub struct TrackingHandle {
    commands: flume::Sender<TrackerCommand>,
    events: flume::Receiver<TrackerEvent>,
    snapshot: watch::Receiver<TrackerSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TrackingHandle {
    pub fn send(&self, command: TrackerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("tracking service is not running"))
    }

    pub fn start(&self, mode: TrackingMode) -> Result<()> {
        self.send(TrackerCommand::Start(mode))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(TrackerCommand::Stop)
    }

    pub fn narrate(&self) -> Result<()> {
        self.send(TrackerCommand::Narrate)
    }

    pub fn update_position(&self, position: GeoPoint) -> Result<()> {
        self.send(TrackerCommand::UpdatePosition(position))
    }

    /// Latest published state
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.snapshot.clone()
    }

    pub fn events(&self) -> flume::Receiver<TrackerEvent> {
        self.events.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop tracking and wait for the service task to finish
    pub async fn shutdown(self) -> Result<()> {
        if self.commands.send(TrackerCommand::Shutdown).is_err() {
            self.cancel.cancel();
        }
        self.task.await.context("tracking service task failed")
    }
}
