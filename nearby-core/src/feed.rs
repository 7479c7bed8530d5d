//! Candidate feed as exported by the profile/resource listing platform.
//!
//! The feed is a JSON document with two collections. Visibility filtering the
//! platform would apply server-side (`isActive`, `status`, ...) happens here
//! while records are converted into [`TrackedEntity`] values.
//!
//! When a secret is configured the feed must come with a sidecar `<feed>.sig`
//! file holding the hex HMAC-SHA256 of the raw feed bytes.
use std::fs;
use std::path::{Path, PathBuf};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::entity::{ProfileEntity, ResourceCategory, ResourceEntity, TrackedEntity};
use crate::error::FetchError;
use crate::geo::Coordinate;
use crate::hex_to_bytes;
use crate::store::{CandidateFilter, CandidateSource};

pub const SIGNATURE_SUFFIX: &str = "sig";
const ACTIVE_STATUS: &str = "active";
const COMMUNITY_VISIBILITY: &str = "community";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDocument {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub profiles: Vec<ProfileRecord>,
    #[serde(default)]
    pub resources: Vec<ResourceRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub id: String,
    pub public_name: String,
    #[serde(default)]
    pub public_profile_url: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub enable_proximity_alerts: bool,
    #[serde(default)]
    pub has_urgent_need: bool,
    #[serde(default)]
    pub urgent_need_title: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceCategory>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

fn coordinate_of(lat: Option<f64>, lon: Option<f64>) -> Option<Coordinate> {
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return None;
    };
    let coord = Coordinate::new(lat, lon);
    coord.is_valid().then_some(coord)
}

impl ProfileRecord {
    pub fn is_listed(&self) -> bool {
        self.is_active && !self.is_draft && self.enable_proximity_alerts
    }

    pub fn to_entity(&self) -> Option<TrackedEntity> {
        if !self.is_listed() {
            return None;
        }
        let coordinate = coordinate_of(self.latitude, self.longitude)?;
        Some(TrackedEntity::Profile(ProfileEntity {
            id: self.id.clone(),
            display_name: self.public_name.clone(),
            coordinate,
            is_urgent: self.has_urgent_need,
            urgent_title: self.urgent_need_title.clone(),
            verified: self.is_verified,
            slug: self.public_profile_url.clone(),
        }))
    }
}

impl ResourceRecord {
    pub fn is_listed(&self) -> bool {
        self.status.as_deref() == Some(ACTIVE_STATUS)
            && self.visibility.as_deref() == Some(COMMUNITY_VISIBILITY)
    }

    pub fn to_entity(&self) -> Option<TrackedEntity> {
        if !self.is_listed() {
            return None;
        }
        let coordinate = coordinate_of(self.latitude, self.longitude)?;
        Some(TrackedEntity::Resource(ResourceEntity {
            id: self.id.clone(),
            name: self.name.clone(),
            coordinate,
            category: self.resource_type.unwrap_or(ResourceCategory::Other),
            city: self.city.clone(),
        }))
    }
}

impl FeedDocument {
    pub fn parse(data: &[u8]) -> Result<Self, FetchError> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn entities(&self, filter: &CandidateFilter) -> Vec<TrackedEntity> {
        let mut out = Vec::new();
        if filter.profiles {
            out.extend(self.profiles.iter().filter_map(ProfileRecord::to_entity));
        }
        if filter.resources {
            out.extend(self.resources.iter().filter_map(ResourceRecord::to_entity));
        }
        out
    }
}

pub fn sign_feed(data: &[u8], secret: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn verify_feed(data: &[u8], signature_hex: &str, secret: &[u8]) -> bool {
    let Ok(tag) = hex_to_bytes(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(&tag).is_ok()
}

pub fn signature_path(feed_path: &Path) -> PathBuf {
    let mut name = feed_path.as_os_str().to_owned();
    name.push(".");
    name.push(SIGNATURE_SUFFIX);
    PathBuf::from(name)
}

/// Reads the feed file on every fetch; "last successful fetch wins" is left to
/// the candidate store.
pub struct FileFeed {
    path: PathBuf,
    secret: Option<Vec<u8>>,
}

impl FileFeed {
    pub fn new<P: Into<PathBuf>>(path: P, secret: Option<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            secret,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_verified(&self) -> Result<Vec<u8>, FetchError> {
        let data = fs::read(&self.path)?;
        if let Some(secret) = &self.secret {
            let sig = fs::read_to_string(signature_path(&self.path)).map_err(|_| FetchError::Signature)?;
            if !verify_feed(&data, sig.trim(), secret) {
                return Err(FetchError::Signature);
            }
        }
        Ok(data)
    }
}

impl CandidateSource for FileFeed {
    fn fetch(&self, filter: &CandidateFilter) -> Result<Vec<TrackedEntity>, FetchError> {
        let data = self.read_verified()?;
        let doc = FeedDocument::parse(&data)?;
        let entities = doc.entities(filter);
        debug!(
            path = %self.path.display(),
            profiles = doc.profiles.len(),
            resources = doc.resources.len(),
            kept = entities.len(),
            "feed read"
        );
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SECRET: &[u8] = b"0123456789abcdef";
    const FEED: &str = r#"{
        "profiles": [
            {"id": "p1", "publicName": "Dana", "publicProfileUrl": "dana",
             "latitude": 26.645, "longitude": -81.87,
             "isActive": true, "isDraft": false, "enableProximityAlerts": true,
             "hasUrgentNeed": true, "urgentNeedTitle": "Insulin refill"},
            {"id": "p2", "publicName": "Draft", "latitude": 26.6, "longitude": -81.8,
             "isActive": true, "isDraft": true, "enableProximityAlerts": true},
            {"id": "p3", "publicName": "No coords",
             "isActive": true, "enableProximityAlerts": true}
        ],
        "resources": [
            {"id": "r1", "name": "Park spigot", "type": "water_spigot",
             "latitude": 26.641, "longitude": -81.871, "status": "active", "visibility": "community"},
            {"id": "r2", "name": "Pending", "type": "food",
             "latitude": 26.641, "longitude": -81.871, "status": "pending", "visibility": "community"},
            {"id": "r3", "name": "Bad coords", "type": "food",
             "latitude": 126.0, "longitude": -81.871, "status": "active", "visibility": "community"}
        ]
    }"#;

    fn both() -> CandidateFilter {
        CandidateFilter {
            profiles: true,
            resources: true,
        }
    }

    #[test]
    fn only_listed_records_with_coordinates_survive() {
        let doc = FeedDocument::parse(FEED.as_bytes()).unwrap();
        let ids: Vec<String> = doc.entities(&both()).iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["p1", "r1"]);
    }

    #[test]
    fn filter_skips_unrequested_collections() {
        let doc = FeedDocument::parse(FEED.as_bytes()).unwrap();
        let only_resources = CandidateFilter {
            profiles: false,
            resources: true,
        };
        let ids: Vec<String> = doc
            .entities(&only_resources)
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["r1"]);
    }

    #[test]
    fn signature_verifies_only_matching_bytes() {
        let sig = sign_feed(FEED.as_bytes(), SECRET);
        assert!(verify_feed(FEED.as_bytes(), &sig, SECRET));
        assert!(!verify_feed(b"{}", &sig, SECRET));
        assert!(!verify_feed(FEED.as_bytes(), "zz", SECRET));
    }

    #[test]
    fn signed_file_feed_rejects_missing_sidecar() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.json");
        fs::write(&path, FEED).unwrap();

        let feed = FileFeed::new(&path, Some(SECRET.to_vec()));
        assert!(matches!(feed.fetch(&both()), Err(FetchError::Signature)));

        fs::write(signature_path(&path), sign_feed(FEED.as_bytes(), SECRET)).unwrap();
        assert_eq!(feed.fetch(&both()).unwrap().len(), 2);
    }

    #[test]
    fn unsigned_file_feed_reads_directly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.json");
        fs::write(&path, FEED).unwrap();
        let feed = FileFeed::new(&path, None);
        assert_eq!(feed.fetch(&both()).unwrap().len(), 2);
        assert_eq!(signature_path(&path), dir.path().join("feed.json.sig"));
    }
}
