use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::detection::AdmissionThresholds;
use crate::geometry::{GeoPoint, PhraseToken, SectorPolicy};
use crate::location::DEFAULT_POSITION;
use crate::narration::ClipCatalog;
use crate::sources::{OpenSkyConfig, SyntheticConfig};
use crate::sources::opensky::DEFAULT_OPENSKY_URL;
use crate::tracking::{ServiceSettings, TrackerSettings};

/// Top-level `planewatch.toml` structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanewatchConfig {
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub narration: NarrationConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub synthetic: SyntheticSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    #[serde(default = "default_min_altitude_ft")]
    pub min_altitude_ft: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            radius_km: default_radius_km(),
            min_altitude_ft: default_min_altitude_ft(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_live_poll_secs")]
    pub live_poll_secs: u64,
    #[serde(default = "default_synthetic_poll_secs")]
    pub synthetic_poll_secs: u64,
    #[serde(default = "default_idle_rotation_deg_per_sec")]
    pub idle_rotation_deg_per_sec: f64,
    #[serde(default = "default_frame_millis")]
    pub frame_millis: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            live_poll_secs: default_live_poll_secs(),
            synthetic_poll_secs: default_synthetic_poll_secs(),
            idle_rotation_deg_per_sec: default_idle_rotation_deg_per_sec(),
            frame_millis: default_frame_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationConfig {
    #[serde(default)]
    pub policy: SectorPolicy,
    /// Directory holding `<token>.<extension>` clips
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_dir: Option<PathBuf>,
    #[serde(default = "default_clip_extension")]
    pub clip_extension: String,
    /// Per-token clip paths keyed by clip key (`north`, `north_east`, `between`, ...)
    #[serde(default)]
    pub overrides: BTreeMap<String, PathBuf>,
    #[serde(default = "default_clip_duration_millis")]
    pub clip_duration_millis: u64,
    #[serde(default = "default_true")]
    pub auto_narrate: bool,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            policy: SectorPolicy::default(),
            clip_dir: None,
            clip_extension: default_clip_extension(),
            overrides: BTreeMap::new(),
            clip_duration_millis: default_clip_duration_millis(),
            auto_narrate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default)]
    pub fallback_on_permission_denied: bool,
    #[serde(default = "default_location_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            fallback_on_permission_denied: false,
            timeout_secs: default_location_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_search_radius_deg")]
    pub search_radius_deg: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            search_radius_deg: default_search_radius_deg(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default = "default_spread_km")]
    pub spread_km: f64,
    #[serde(default = "default_fleet_size")]
    pub fleet_size: usize,
}

impl Default for SyntheticSection {
    fn default() -> Self {
        Self {
            seed: None,
            spread_km: default_spread_km(),
            fleet_size: default_fleet_size(),
        }
    }
}

fn default_radius_km() -> f64 {
    30.0
}

fn default_min_altitude_ft() -> f64 {
    10_000.0
}

fn default_live_poll_secs() -> u64 {
    15
}

fn default_synthetic_poll_secs() -> u64 {
    3
}

fn default_idle_rotation_deg_per_sec() -> f64 {
    30.0
}

fn default_frame_millis() -> u64 {
    33
}

fn default_clip_extension() -> String {
    "mp3".to_string()
}

fn default_clip_duration_millis() -> u64 {
    700
}

fn default_true() -> bool {
    true
}

fn default_latitude() -> f64 {
    DEFAULT_POSITION.latitude
}

fn default_longitude() -> f64 {
    DEFAULT_POSITION.longitude
}

fn default_location_timeout_secs() -> u64 {
    10
}

fn default_api_url() -> String {
    DEFAULT_OPENSKY_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_search_radius_deg() -> f64 {
    0.5
}

fn default_spread_km() -> f64 {
    40.0
}

fn default_fleet_size() -> usize {
    3
}

impl PlanewatchConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: PlanewatchConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults. Environment overrides
    /// are applied either way.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        Self::load_or_default_with(path, |key| std::env::var(key).ok())
    }

    /// [`Self::load_or_default`] with overrides looked up through `lookup`
    pub fn load_or_default_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = if path.exists() {
            info!(path = %path.display(), "Loading config");
            Self::load(path)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PLANEWATCH_*` overrides looked up through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("PLANEWATCH_RADIUS_KM") {
            self.thresholds.radius_km = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid PLANEWATCH_RADIUS_KM: {:?}", value))?;
        }
        if let Some(value) = lookup("PLANEWATCH_MIN_ALTITUDE_FT") {
            self.thresholds.min_altitude_ft = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid PLANEWATCH_MIN_ALTITUDE_FT: {:?}", value))?;
        }
        if let Some(value) = lookup("PLANEWATCH_OPENSKY_URL") {
            self.live.api_url = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.thresholds.radius_km.is_finite() && self.thresholds.radius_km > 0.0) {
            bail!("thresholds.radius_km must be positive, got {}", self.thresholds.radius_km);
        }
        if !self.thresholds.min_altitude_ft.is_finite() {
            bail!("thresholds.min_altitude_ft must be finite");
        }
        let rate = self.schedule.idle_rotation_deg_per_sec;
        if !(rate.is_finite() && rate >= 0.0) {
            bail!("schedule.idle_rotation_deg_per_sec must be non-negative, got {}", rate);
        }
        if self.schedule.live_poll_secs == 0 || self.schedule.synthetic_poll_secs == 0 {
            bail!("poll intervals must be at least one second");
        }
        if self.schedule.frame_millis == 0 {
            bail!("schedule.frame_millis must be positive");
        }
        let position = self.default_position();
        if !(-90.0..=90.0).contains(&position.latitude)
            || !(-180.0..=180.0).contains(&position.longitude)
        {
            bail!("location default {} is out of range", position);
        }
        for key in self.narration.overrides.keys() {
            if PhraseToken::from_clip_key(key).is_none() {
                bail!("narration.overrides: unknown clip key '{}'", key);
            }
        }
        Ok(())
    }

    pub fn default_position(&self) -> GeoPoint {
        GeoPoint::new(self.location.latitude, self.location.longitude)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            thresholds: AdmissionThresholds {
                radius_km: self.thresholds.radius_km,
                min_altitude_ft: self.thresholds.min_altitude_ft,
            },
            default_position: self.default_position(),
            fallback_on_permission_denied: self.location.fallback_on_permission_denied,
            idle_rotation_deg_per_sec: self.schedule.idle_rotation_deg_per_sec,
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            live_poll: Duration::from_secs(self.schedule.live_poll_secs),
            synthetic_poll: Duration::from_secs(self.schedule.synthetic_poll_secs),
            frame: Duration::from_millis(self.schedule.frame_millis),
            auto_narrate: self.narration.auto_narrate,
        }
    }

    pub fn opensky_config(&self) -> OpenSkyConfig {
        OpenSkyConfig {
            api_url: self.live.api_url.clone(),
            search_radius_deg: self.live.search_radius_deg,
            request_timeout: Duration::from_secs(self.live.request_timeout_secs),
        }
    }

    pub fn synthetic_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            seed: self.synthetic.seed,
            spread_km: self.synthetic.spread_km,
            fleet_size: self.synthetic.fleet_size,
            ..SyntheticConfig::default()
        }
    }

    pub fn clip_duration(&self) -> Duration {
        Duration::from_millis(self.narration.clip_duration_millis)
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_secs(self.location.timeout_secs)
    }

    /// Build the clip catalog: scanned from `clip_dir` when set, then per-token overrides
    pub fn clip_catalog(&self) -> Result<ClipCatalog> {
        let extension = &self.narration.clip_extension;
        let mut catalog = match &self.narration.clip_dir {
            Some(dir) => ClipCatalog::scan_dir(dir, extension),
            None => ClipCatalog::conventional(Path::new("clips"), extension),
        };
        for (key, path) in &self.narration.overrides {
            let Some(token) = PhraseToken::from_clip_key(key) else {
                bail!("narration.overrides: unknown clip key '{}'", key);
            };
            catalog.insert(token, path.clone());
        }
        Ok(catalog)
    }
}

/// Resolve the config file path: `PLANEWATCH_CONFIG` or `./planewatch.toml`
pub fn config_path() -> PathBuf {
    match std::env::var("PLANEWATCH_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => PathBuf::from("./planewatch.toml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: PlanewatchConfig = toml::from_str("").unwrap();
        assert_eq!(config, PlanewatchConfig::default());
        assert_eq!(config.thresholds.radius_km, 30.0);
        assert_eq!(config.thresholds.min_altitude_ft, 10_000.0);
        assert_eq!(config.schedule.live_poll_secs, 15);
        assert_eq!(config.schedule.synthetic_poll_secs, 3);
        assert_eq!(config.narration.policy, SectorPolicy::Compound);
        assert_eq!(config.default_position(), DEFAULT_POSITION);
    }

    #[test]
    fn test_partial_sections() {
        let config: PlanewatchConfig = toml::from_str(
            r#"
            [thresholds]
            radius_km = 12.5

            [narration]
            policy = "named"

            [narration.overrides]
            north = "/opt/clips/n.wav"
            "#,
        )
        .unwrap();

        assert_eq!(config.thresholds.radius_km, 12.5);
        assert_eq!(config.thresholds.min_altitude_ft, 10_000.0);
        assert_eq!(config.narration.policy, SectorPolicy::Named);
        assert!(config.narration.auto_narrate);
        config.validate().unwrap();

        let catalog = config.clip_catalog().unwrap();
        assert_eq!(
            catalog.get(PhraseToken::North).map(|c| c.path.clone()),
            Some(PathBuf::from("/opt/clips/n.wav"))
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planewatch.toml");
        std::fs::write(
            &path,
            "[schedule]\nlive_poll_secs = 30\n\n[synthetic]\nseed = 99\n",
        )
        .unwrap();

        let config = PlanewatchConfig::load(&path).unwrap();
        assert_eq!(config.service_settings().live_poll, Duration::from_secs(30));
        assert_eq!(config.synthetic_config().seed, Some(99));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[thresholds\nradius_km = ").unwrap();

        let err = PlanewatchConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            PlanewatchConfig::load_or_default_with(&dir.path().join("absent.toml"), |_| None)
                .unwrap();
        assert_eq!(config, PlanewatchConfig::default());
    }

    #[test]
    fn test_missing_file_still_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlanewatchConfig::load_or_default_with(&dir.path().join("absent.toml"), |key| {
            (key == "PLANEWATCH_MIN_ALTITUDE_FT").then(|| "8000".to_string())
        })
        .unwrap();
        assert_eq!(config.thresholds.min_altitude_ft, 8_000.0);
        assert_eq!(config.thresholds.radius_km, 30.0);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("PLANEWATCH_RADIUS_KM", "5"),
            ("PLANEWATCH_MIN_ALTITUDE_FT", " 2500 "),
            ("PLANEWATCH_OPENSKY_URL", "http://localhost:9000/states"),
        ]
        .into_iter()
        .collect();

        let mut config = PlanewatchConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        let settings = config.tracker_settings();
        assert_eq!(settings.thresholds.radius_km, 5.0);
        assert_eq!(settings.thresholds.min_altitude_ft, 2_500.0);
        assert_eq!(config.opensky_config().api_url, "http://localhost:9000/states");
    }

    #[test]
    fn test_invalid_override_is_an_error() {
        let mut config = PlanewatchConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "PLANEWATCH_RADIUS_KM").then(|| "far".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_clip_key() {
        let mut config = PlanewatchConfig::default();
        config
            .narration
            .overrides
            .insert("upward".to_string(), PathBuf::from("/x.mp3"));
        assert!(config.validate().is_err());
        assert!(config.clip_catalog().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_rotation_rate() {
        for rate in [-5.0, f64::NAN, f64::INFINITY] {
            let mut config = PlanewatchConfig::default();
            config.schedule.idle_rotation_deg_per_sec = rate;
            assert!(config.validate().is_err(), "accepted {}", rate);
        }
        let mut config = PlanewatchConfig::default();
        config.schedule.idle_rotation_deg_per_sec = 0.0;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_radius() {
        let mut config = PlanewatchConfig::default();
        config.thresholds.radius_km = 0.0;
        assert!(config.validate().is_err());
    }
}
