use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use std::sync::Mutex;

use super::SightingSource;
use crate::errors::SourceError;
use crate::geometry::GeoPoint;
use crate::sightings::AircraftSighting;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Fixed seed for reproducible runs; `None` seeds from the OS
    pub seed: Option<u64>,
    /// Maximum distance from the user in kilometers
    pub spread_km: f64,
    /// Number of distinct identities the generator cycles through
    pub fleet_size: usize,
    pub min_altitude_ft: f64,
    pub max_altitude_ft: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: None,
            spread_km: 40.0,
            fleet_size: 3,
            min_altitude_ft: 2_000.0,
            max_altitude_ft: 38_000.0,
        }
    }
}

/// Generates one made-up sighting per poll somewhere near the user
pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Produce the next sighting around `around`
    pub fn generate(&self, around: GeoPoint) -> AircraftSighting {
        // A poisoned lock still holds a usable RNG
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let fleet = self.config.fleet_size.max(1);
        let index = rng.random_range(0..fleet);
        let bearing = rng.random_range(0.0..360.0);
        let distance = rng.random_range(0.0..self.config.spread_km.max(0.1));
        let altitude_ft = if self.config.max_altitude_ft > self.config.min_altitude_ft {
            rng.random_range(self.config.min_altitude_ft..self.config.max_altitude_ft)
        } else {
            self.config.min_altitude_ft
        };
        let ground_speed_mps = rng.random_range(60.0..260.0);

        let mut sighting = AircraftSighting::new(
            format!("syn{:03}", index + 1),
            around.destination(bearing, distance),
            altitude_ft.round(),
        )
        .with_callsign(format!("SYN{}", index + 1))
        .with_ground_speed(ground_speed_mps);
        sighting.observed_at = Some(Utc::now());
        sighting
    }
}

#[async_trait]
impl SightingSource for SyntheticSource {
    async fn fetch(&self, around: GeoPoint) -> Result<Vec<AircraftSighting>, SourceError> {
        Ok(vec![self.generate(around)])
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
