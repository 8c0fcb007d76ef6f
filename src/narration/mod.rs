//! Sequential spoken direction of the notified aircraft
//!
//! A narration turns the bearing from the user to the aircraft into a phrase and plays
//! its clips one after another. Only one clip is ever in flight: the next token is
//! dequeued when the player reports the current ticket finished (or failed).

pub mod clips;
pub mod player;

use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::errors::PlaybackError;
use crate::geometry::{GeoPoint, PhraseToken, SectorPolicy, phrase_text, sector_phrase};
use crate::sightings::NotifiedAircraft;

pub use clips::{Clip, ClipCatalog};
pub use player::{ClipPlayer, PlaybackFinished, PlaybackTicket, TimedClipPlayer};

/// Horizontal distance under which a direction is meaningless
pub const OVERHEAD_DISTANCE_KM: f64 = 0.01;

/// Result of a narrate request
#[derive(Debug, Clone, PartialEq)]
pub enum NarrateOutcome {
    /// Playback began for this phrase
    Started {
        bearing_deg: f64,
        phrase: Vec<PhraseToken>,
    },
    /// A narration is already in progress; the request was ignored
    AlreadyPlaying,
    /// Nothing is notified
    NoTarget,
    /// The aircraft is directly above the user
    Overhead,
}

pub struct NarrationQueue<P: ClipPlayer> {
    player: P,
    catalog: ClipCatalog,
    policy: SectorPolicy,
    queue: VecDeque<PhraseToken>,
    playing: bool,
    current: Option<(PlaybackTicket, PhraseToken)>,
    next_ticket: u64,
}

impl<P: ClipPlayer> NarrationQueue<P> {
    pub fn new(player: P, catalog: ClipCatalog, policy: SectorPolicy) -> Self {
        Self {
            player,
            catalog,
            policy,
            queue: VecDeque::new(),
            playing: false,
            current: None,
            next_ticket: 1,
        }
    }

    pub fn policy(&self) -> SectorPolicy {
        self.policy
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Tokens still waiting behind the current clip
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn current_token(&self) -> Option<PhraseToken> {
        self.current.map(|(_, token)| token)
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    /// Speak the direction from `user` to `target`
    ///
    /// The bearing is recomputed from the latest positions rather than taken from the
    /// compass, which may be showing a different aircraft or an idle sweep.
    pub fn narrate(&mut self, user: GeoPoint, target: Option<&NotifiedAircraft>) -> NarrateOutcome {
        if self.playing {
            debug!("Narration already in progress");
            return NarrateOutcome::AlreadyPlaying;
        }

        let Some(target) = target else {
            return NarrateOutcome::NoTarget;
        };

        if user.distance_km(&target.position()) < OVERHEAD_DISTANCE_KM {
            info!(identity = %target.identity(), "Aircraft overhead, nothing to narrate");
            return NarrateOutcome::Overhead;
        }

        let bearing_deg = user.bearing_to(&target.position());
        info!(
            identity = %target.identity(),
            bearing_deg = %format!("{:.1}", bearing_deg),
            "Narrating aircraft direction"
        );
        self.narrate_bearing(bearing_deg)
    }

    /// Speak the phrase for a raw bearing
    pub fn narrate_bearing(&mut self, bearing_deg: f64) -> NarrateOutcome {
        if self.playing {
            return NarrateOutcome::AlreadyPlaying;
        }

        let phrase = sector_phrase(bearing_deg, self.policy);
        debug!(phrase = %phrase_text(&phrase), policy = %self.policy, "Queueing phrase");

        self.queue = phrase.iter().copied().collect();
        self.playing = true;
        self.advance();

        NarrateOutcome::Started { bearing_deg, phrase }
    }

    /// Completion signal from the player
    ///
    /// Signals for any ticket other than the one in flight are stale (the clip was
    /// halted by `stop_all`) and are ignored.
    pub fn on_playback_finished(&mut self, ticket: PlaybackTicket, result: Result<(), PlaybackError>) {
        match self.current {
            Some((current, token)) if current == ticket => {
                if let Err(e) = result {
                    warn!(token = %token, error = %e, "Clip failed, continuing");
                }
                self.current = None;
                self.advance();
            }
            _ => debug!(ticket = ticket.0, "Ignoring stale playback completion"),
        }
    }

    /// Halt the current clip and drop everything queued
    pub fn stop_all(&mut self) {
        if self.playing {
            debug!(remaining = self.queue.len(), "Stopping narration");
        }
        self.player.stop_all();
        self.queue.clear();
        self.current = None;
        self.playing = false;
    }

    /// Start the next playable token, or finish when the queue is drained
    fn advance(&mut self) {
        while let Some(token) = self.queue.pop_front() {
            let Some(clip) = self.catalog.get(token) else {
                warn!(token = %token, "No clip mapped for token, skipping");
                metrics::counter!("narration.clips_skipped_total").increment(1);
                continue;
            };

            let ticket = PlaybackTicket(self.next_ticket);
            self.next_ticket += 1;

            match self.player.play(ticket, clip) {
                Ok(()) => {
                    metrics::counter!("narration.clips_played_total").increment(1);
                    self.current = Some((ticket, token));
                    return;
                }
                Err(e) => {
                    warn!(token = %token, error = %e, "Clip failed to start, continuing");
                }
            }
        }

        if self.playing {
            debug!("Narration finished");
        }
        self.current = None;
        self.playing = false;
    }
}
