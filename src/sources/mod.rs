//! Aircraft sighting sources
//!
//! A [`SightingSource`] answers "which aircraft are around this point right now?".
//! The live implementation queries a REST feed; the synthetic one invents a plane per
//! cycle so the rest of the pipeline can be exercised without network access.

pub mod opensky;
pub mod synthetic;

use async_trait::async_trait;

use crate::errors::SourceError;
use crate::geometry::GeoPoint;
use crate::sightings::AircraftSighting;

pub use opensky::{OpenSkyConfig, OpenSkySource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Trait for sources of aircraft sightings
///
/// Implementors return every aircraft they know of near `around`. Filtering by the
/// admission thresholds is left to the detection engine.
#[async_trait]
pub trait SightingSource: Send + Sync {
    /// Fetch the current batch of sightings
    ///
    /// Returns:
    /// - `Ok(sightings)` - possibly empty batch
    /// - `Err(e)` - transient failure; the caller retries on its next poll
    async fn fetch(&self, around: GeoPoint) -> Result<Vec<AircraftSighting>, SourceError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}
