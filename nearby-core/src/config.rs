use std::env;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::geo::Coordinate;
use crate::hex_to_bytes;

const MIN_SECRET_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PositionSourceConfig {
    /// One JSON fix per line; `-` reads stdin.
    #[serde(rename_all = "camelCase")]
    Jsonl { path: String },
    #[serde(rename_all = "camelCase")]
    Simulate {
        start: Coordinate,
        #[serde(default = "default_step_miles")]
        step_miles: f64,
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
        #[serde(default)]
        steps: Option<usize>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub feed_path: String,
    #[serde(default)]
    pub secret_hex: Option<String>,
    pub preferences_path: String,
    pub output_path: String,
    #[serde(default = "default_refresh_interval_seconds")]
    pub refresh_interval_seconds: u64,
    #[serde(default)]
    pub link_base_url: Option<String>,
    pub position_source: PositionSourceConfig,
    #[serde(default)]
    pub max_runtime_seconds: Option<u64>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = fs::read(path)?;
        let cfg = serde_json::from_slice(&data)?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = try_load("NEARBY_FEED_PATH") {
            self.feed_path = v;
        }
        if let Some(v) = try_load("NEARBY_OUTPUT_PATH") {
            self.output_path = v;
        }
        if let Some(v) = try_load("NEARBY_REFRESH_SECONDS") {
            self.refresh_interval_seconds = v;
        }
        if let Some(v) = try_load::<String>("NEARBY_SECRET_HEX") {
            self.secret_hex = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_path.trim().is_empty() {
            return Err(ConfigError::Invalid("feedPath must not be empty".into()));
        }
        if self.refresh_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "refreshIntervalSeconds must be > 0".into(),
            ));
        }
        if let PositionSourceConfig::Simulate {
            start,
            step_miles,
            interval_ms,
            ..
        } = &self.position_source
        {
            if !start.is_valid() {
                return Err(ConfigError::Invalid(
                    "positionSource.start is not a valid coordinate".into(),
                ));
            }
            if !step_miles.is_finite() || *step_miles < 0.0 || *interval_ms == 0 {
                return Err(ConfigError::Invalid(
                    "positionSource stepMiles must be >= 0 and intervalMs > 0".into(),
                ));
            }
        }
        self.secret()?;
        Ok(())
    }

    pub fn secret(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let Some(hex) = &self.secret_hex else {
            return Ok(None);
        };
        let secret = hex_to_bytes(hex).map_err(ConfigError::Invalid)?;
        if secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Invalid(
                "secretHex must be at least 16 bytes".into(),
            ));
        }
        Ok(Some(secret))
    }
}

fn try_load<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: Display,
{
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => {
            info!("{key} set, overriding config");
            Some(v)
        }
        Err(e) => {
            warn!("Invalid {key} value, ignoring: {e}");
            None
        }
    }
}

fn default_refresh_interval_seconds() -> u64 {
    30
}

fn default_step_miles() -> f64 {
    0.02
}

fn default_interval_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"{
        "feedPath": "feed.json",
        "preferencesPath": "prefs.json",
        "outputPath": "~/nearby/alerts.jsonl",
        "positionSource": {"kind": "jsonl", "path": "-"}
    }"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, MINIMAL).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.refresh_interval_seconds, 30);
        assert_eq!(
            cfg.position_source,
            PositionSourceConfig::Jsonl {
                path: "-".to_string()
            }
        );
        assert!(cfg.validate().is_ok());
        assert!(cfg.secret().unwrap().is_none());
    }

    #[test]
    fn simulate_source_parses_with_defaults() {
        let src: PositionSourceConfig = serde_json::from_str(
            r#"{"kind": "simulate", "start": {"latitude": 26.64, "longitude": -81.87}}"#,
        )
        .unwrap();
        match src {
            PositionSourceConfig::Simulate {
                step_miles,
                interval_ms,
                steps,
                ..
            } => {
                assert_eq!(step_miles, 0.02);
                assert_eq!(interval_ms, 1000);
                assert!(steps.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut cfg: Config = serde_json::from_str(MINIMAL).unwrap();
        cfg.secret_hex = Some("abcd".to_string());
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        cfg.secret_hex = Some("00112233445566778899aabbccddeeff".to_string());
        assert_eq!(cfg.secret().unwrap().unwrap().len(), 16);
    }

    #[test]
    fn zero_refresh_interval_is_rejected() {
        let mut cfg: Config = serde_json::from_str(MINIMAL).unwrap();
        cfg.refresh_interval_seconds = 0;
        assert!(cfg.validate().is_err());
    }
}
