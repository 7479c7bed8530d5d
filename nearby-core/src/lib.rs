use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub mod config;
pub mod entity;
pub mod error;
pub mod feed;
pub mod geo;
pub mod ledger;
pub mod matcher;
pub mod monitor;
pub mod notify;
pub mod prefs;
pub mod store;

pub use config::{Config, PositionSourceConfig};
pub use entity::{EntityKind, ProfileEntity, ResourceCategory, ResourceEntity, TrackedEntity};
pub use geo::{distance_miles, format_distance, Coordinate};
pub use ledger::{DedupLedger, NotificationKey};
pub use matcher::{match_candidates, ProximityResult};
pub use monitor::{FiredAlert, Monitor, PositionEvent, PositionFix, PositionSource, Subscription};
pub use prefs::AlertPreferences;

/// One fired alert, as appended to the alert log (one JSON object per line).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub ts_unix_ms: i64,
    pub key: String,
    pub entity_id: String,
    pub kind: EntityKind,
    pub category: String,
    pub name: String,
    pub distance_miles: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub os_delivered: bool,
    #[serde(default)]
    pub link: String,
}

impl AlertRecord {
    pub fn from_fired(fired: &FiredAlert, fix: &PositionFix) -> Self {
        let result = &fired.result;
        Self {
            ts_unix_ms: now_unix_ms(),
            key: result.key().to_string(),
            entity_id: result.entity.id().to_string(),
            kind: result.entity.kind(),
            category: result.category.clone(),
            name: result.entity.display_name().to_string(),
            distance_miles: result.distance_miles,
            latitude: fix.coordinate.latitude,
            longitude: fix.coordinate.longitude,
            accuracy_m: fix.accuracy_m,
            urgent: result.is_urgent(),
            os_delivered: fired.delivery.os_delivered,
            link: fired.delivery.alert.link.clone(),
        }
    }
}

pub fn now_unix_ms() -> i64 {
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (dur.as_secs() as i64) * 1000 + (dur.subsec_millis() as i64)
}

pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err("hex string must be even-length".into());
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let mut i = 0;
    while i < s.len() {
        let byte = s
            .get(i..i + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .ok_or_else(|| "hex string contains invalid characters".to_string())?;
        out.push(byte);
        i += 2;
    }
    Ok(out)
}
