use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("feed read failed: {0}")]
    Io(#[from] io::Error),

    #[error("feed is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("feed signature missing or invalid")]
    Signature,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location request timed out")]
    Timeout,

    #[error("position source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreferenceError {
    #[error("Proximity alerts are disabled")]
    Disabled,

    #[error("Please select at least one resource type first")]
    NoCategories,

    #[error("Alert radius must be a positive distance")]
    InvalidRadius,
}

#[derive(Error, Debug)]
pub enum PreferenceStoreError {
    #[error("preferences read failed: {0}")]
    Io(#[from] io::Error),

    #[error("preferences are malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("{0}")]
    InvalidPreferences(#[from] PreferenceError),

    #[error("Could not track your location. Please check permissions. ({0})")]
    LocationUnavailable(#[from] LocationError),

    #[error("already watching")]
    AlreadyWatching,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config read failed: {0}")]
    Io(#[from] io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

impl From<ConfigError> for io::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}
