use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use planewatch::config::PlanewatchConfig;
use planewatch::geometry::{GeoPoint, phrase_text};
use planewatch::location::{FixedLocation, LocationProvider, NoLocation, TimeoutLocation};
use planewatch::narration::{NarrateOutcome, NarrationQueue, TimedClipPlayer};
use planewatch::sources::{OpenSkySource, SyntheticSource};
use planewatch::tracking::{Collaborators, Tracker, TrackerEvent, TrackingMode, TrackingService};

pub struct TrackOptions {
    pub mode: TrackingMode,
    /// Fixed user position; without it the configured default is used
    pub position: Option<GeoPoint>,
    /// Stop after this long instead of waiting for Ctrl-C
    pub duration: Option<Duration>,
    pub seed: Option<u64>,
}

pub async fn handle_track(options: TrackOptions, mut config: PlanewatchConfig) -> Result<()> {
    if options.seed.is_some() {
        config.synthetic.seed = options.seed;
    }

    let live = OpenSkySource::new(config.opensky_config()).context("Failed to build HTTP client")?;
    let synthetic = SyntheticSource::new(config.synthetic_config());
    let location: Arc<dyn LocationProvider> = match options.position {
        Some(position) => Arc::new(TimeoutLocation::new(
            FixedLocation::new(position),
            config.location_timeout(),
        )),
        None => Arc::new(NoLocation),
    };

    let (playback_tx, playback_rx) = flume::unbounded();
    let player = TimedClipPlayer::new(config.clip_duration(), playback_tx)
        .require_files(config.narration.clip_dir.is_some());
    let catalog = config.clip_catalog()?;
    let narration = NarrationQueue::new(player, catalog, config.narration.policy);

    let service = TrackingService::new(
        Tracker::new(config.tracker_settings()),
        narration,
        playback_rx,
        Collaborators {
            location,
            live: Arc::new(live),
            synthetic: Arc::new(synthetic),
        },
        config.service_settings(),
    );
    let handle = service.spawn();
    let events = handle.events();

    info!(
        mode = %options.mode,
        radius_km = config.thresholds.radius_km,
        min_altitude_ft = config.thresholds.min_altitude_ft,
        "Starting tracker"
    );
    handle.start(options.mode)?;

    let deadline = async {
        match options.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping");
                break;
            }
            _ = &mut deadline => {
                info!("Run duration elapsed, stopping");
                break;
            }
            event = events.recv_async() => {
                let Ok(event) = event else {
                    warn!("Tracking service event stream closed");
                    break;
                };
                log_event(event);
            }
        }
    }

    let snapshot = handle.snapshot();
    handle.shutdown().await?;
    info!(
        bearing_deg = %format!("{:.1}", snapshot.bearing_deg),
        notified = ?snapshot.notified.as_ref().map(|n| n.identity()),
        "Tracker stopped"
    );
    Ok(())
}

fn log_event(event: TrackerEvent) {
    match event {
        TrackerEvent::NewDetection(aircraft) => info!(
            identity = %aircraft.identity(),
            name = aircraft.sighting.display_name(),
            altitude_ft = %format!("{:.0}", aircraft.sighting.altitude_ft),
            ground_speed_kt = %format!("{:.0}", aircraft.sighting.ground_speed_knots()),
            synthetic = aircraft.is_synthetic,
            "New aircraft overhead"
        ),
        TrackerEvent::Cleared(aircraft) => {
            info!(identity = %aircraft.identity(), "Aircraft out of range")
        }
        TrackerEvent::Status(status) => info!(%status, "Status"),
        TrackerEvent::StateChanged(state) => info!(?state, "Tracking state"),
        TrackerEvent::Narration(NarrateOutcome::Started { bearing_deg, phrase }) => info!(
            bearing_deg = %format!("{:.1}", bearing_deg),
            phrase = %phrase_text(&phrase),
            "Narrating"
        ),
        TrackerEvent::Narration(outcome) => info!(?outcome, "Narration request"),
    }
}
