//! Clip playback collaborator
//!
//! The narration queue only decides which clip plays when. Actual audio output sits
//! behind [`ClipPlayer`]: `play` starts a clip and returns immediately, and the player
//! later reports completion as a [`PlaybackFinished`] message carrying the ticket it
//! was given.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::clips::Clip;
use crate::errors::PlaybackError;

/// Identifies one `play` call so late completions can be matched or discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackTicket(pub u64);

/// Completion signal for a clip
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackFinished {
    pub ticket: PlaybackTicket,
    pub result: Result<(), PlaybackError>,
}

pub trait ClipPlayer: Send {
    /// Begin playing `clip`. Completion is reported asynchronously with `ticket`.
    /// An immediate error means the clip never started.
    fn play(&mut self, ticket: PlaybackTicket, clip: &Clip) -> Result<(), PlaybackError>;

    /// Halt whatever is playing. No completion is reported for a halted clip.
    fn stop_all(&mut self);
}

/// Player that "plays" each clip for a fixed duration and then reports completion
///
/// Used by the CLI, where audio output is out of scope: the clip is logged and the
/// completion arrives after `clip_duration` on the tokio timer.
pub struct TimedClipPlayer {
    clip_duration: Duration,
    require_files: bool,
    completions: flume::Sender<PlaybackFinished>,
    in_flight: Option<JoinHandle<()>>,
}

impl TimedClipPlayer {
    pub fn new(clip_duration: Duration, completions: flume::Sender<PlaybackFinished>) -> Self {
        Self {
            clip_duration,
            require_files: false,
            completions,
            in_flight: None,
        }
    }

    /// Fail clips whose file does not exist instead of pretending to play them
    pub fn require_files(mut self, require: bool) -> Self {
        self.require_files = require;
        self
    }
}

impl ClipPlayer for TimedClipPlayer {
    fn play(&mut self, ticket: PlaybackTicket, clip: &Clip) -> Result<(), PlaybackError> {
        if self.require_files && !clip.path.is_file() {
            return Err(PlaybackError::ClipFailed {
                clip: clip.key.clone(),
                reason: format!("{} not found", clip.path.display()),
            });
        }
        if self.completions.is_disconnected() {
            return Err(PlaybackError::PlayerClosed);
        }

        info!(clip = %clip.key, path = %clip.path.display(), "Playing clip");

        if let Some(previous) = self.in_flight.take() {
            previous.abort();
        }

        let completions = self.completions.clone();
        let duration = self.clip_duration;
        self.in_flight = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = completions
                .send_async(PlaybackFinished {
                    ticket,
                    result: Ok(()),
                })
                .await;
        }));

        Ok(())
    }

    fn stop_all(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            debug!("Halting clip playback");
            handle.abort();
        }
    }
}
