use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

use crate::geometry::normalize_bearing;

/// Which activity produced the current needle bearing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BearingWriter {
    Poll,
    IdleRotation,
}

/// A request to move the needle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BearingWrite {
    /// Pin the needle to the detection engine's compass target
    Target(f64),
    /// Advance the idle scan by `elapsed * deg_per_sec`
    IdleStep { elapsed: Duration, deg_per_sec: f64 },
}

/// The compass needle and the gate that decides who may move it
///
/// Idle rotation and poll results both write the bearing, but never at the same time:
/// while idle rotation is running only idle steps are accepted, and while it is
/// suspended only poll targets are accepted. Every write goes through [`Compass::commit`].
#[derive(Debug, Clone, Default)]
pub struct Compass {
    bearing_deg: f64,
    idle_running: bool,
    last_writer: Option<BearingWriter>,
}

impl Compass {
    pub fn bearing_deg(&self) -> f64 {
        self.bearing_deg
    }

    pub fn idle_rotation_active(&self) -> bool {
        self.idle_running
    }

    pub fn last_writer(&self) -> Option<BearingWriter> {
        self.last_writer
    }

    pub(crate) fn set_idle_rotation(&mut self, running: bool) {
        if self.idle_running != running {
            trace!(running, bearing_deg = self.bearing_deg, "Idle rotation toggled");
        }
        self.idle_running = running;
    }

    /// Apply a write if the current mode allows it. Returns whether it was applied.
    pub fn commit(&mut self, write: BearingWrite) -> bool {
        match write {
            BearingWrite::Target(bearing) => {
                if self.idle_running {
                    trace!(bearing, "Rejected poll bearing while idle rotation is running");
                    return false;
                }
                self.bearing_deg = normalize_bearing(bearing);
                self.last_writer = Some(BearingWriter::Poll);
                true
            }
            BearingWrite::IdleStep {
                elapsed,
                deg_per_sec,
            } => {
                if !self.idle_running {
                    return false;
                }
                let delta = elapsed.as_secs_f64() * deg_per_sec;
                self.bearing_deg = normalize_bearing(self.bearing_deg + delta);
                self.last_writer = Some(BearingWriter::IdleRotation);
                true
            }
        }
    }
}
