//! Location collaborator abstraction
//!
//! The tracker never talks to a GPS or OS location service directly. It asks a
//! [`LocationProvider`] for a fix and falls back to [`DEFAULT_POSITION`] when the
//! provider cannot deliver one.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::errors::LocationError;
use crate::geometry::GeoPoint;

/// Position used when no fix is available (Kochi, India)
pub const DEFAULT_POSITION: GeoPoint = GeoPoint::new(10.0, 76.0);

/// Source of the user's current position
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<GeoPoint, LocationError>;
}

/// Provider that always answers with one configured point (CLI `--lat/--lon`, tests)
#[derive(Debug, Clone)]
pub struct FixedLocation {
    position: GeoPoint,
}

impl FixedLocation {
    pub fn new(position: GeoPoint) -> Self {
        Self { position }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<GeoPoint, LocationError> {
        Ok(self.position)
    }
}

/// Provider with no position source at all; every request reports unavailable
#[derive(Debug, Clone, Default)]
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current_position(&self) -> Result<GeoPoint, LocationError> {
        Err(LocationError::Unavailable(
            "no location provider configured".to_string(),
        ))
    }
}

/// Wraps another provider and gives up after `timeout`
pub struct TimeoutLocation<P> {
    inner: P,
    timeout: Duration,
}

impl<P: LocationProvider> TimeoutLocation<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<P: LocationProvider> LocationProvider for TimeoutLocation<P> {
    async fn current_position(&self) -> Result<GeoPoint, LocationError> {
        match tokio::time::timeout(self.timeout, self.inner.current_position()).await {
            Ok(result) => result,
            Err(_) => {
                debug!(timeout_secs = self.timeout.as_secs_f64(), "Location request timed out");
                Err(LocationError::Unavailable(format!(
                    "no fix within {:.1}s",
                    self.timeout.as_secs_f64()
                )))
            }
        }
    }
}
