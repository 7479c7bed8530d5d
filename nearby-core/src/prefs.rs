use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entity::{ResourceCategory, PROFILE_CATEGORY, URGENT_CATEGORY};
use crate::error::{PreferenceError, PreferenceStoreError};
use crate::store::CandidateFilter;

pub const DEFAULT_RADIUS_MILES: f64 = 0.5;
pub const MIN_RADIUS_MILES: f64 = 0.1;
pub const RADIUS_PRESETS_MILES: [f64; 4] = [0.095, 0.25, 0.5, 1.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPreferences {
    #[serde(default)]
    pub enabled_categories: BTreeSet<String>,
    #[serde(default = "default_radius_miles")]
    pub radius_miles: f64,
    #[serde(default)]
    pub enabled: bool,
    /// Empty category set means "everything in range" instead of "nothing".
    #[serde(default)]
    pub radius_only: bool,
}

impl Default for AlertPreferences {
    fn default() -> Self {
        Self {
            enabled_categories: [PROFILE_CATEGORY, URGENT_CATEGORY]
                .into_iter()
                .map(String::from)
                .collect(),
            radius_miles: DEFAULT_RADIUS_MILES,
            enabled: false,
            radius_only: false,
        }
    }
}

impl AlertPreferences {
    pub fn validate(&self) -> Result<(), PreferenceError> {
        if !self.enabled {
            return Err(PreferenceError::Disabled);
        }
        if !self.radius_miles.is_finite() || self.radius_miles <= 0.0 {
            return Err(PreferenceError::InvalidRadius);
        }
        if self.enabled_categories.is_empty() && !self.radius_only {
            return Err(PreferenceError::NoCategories);
        }
        Ok(())
    }

    pub fn allows(&self, category: &str) -> bool {
        self.enabled_categories.is_empty() || self.enabled_categories.contains(category)
    }

    pub fn candidate_filter(&self) -> CandidateFilter {
        let everything = self.enabled_categories.is_empty() && self.radius_only;
        let profiles = self
            .enabled_categories
            .iter()
            .any(|c| c == PROFILE_CATEGORY || c == URGENT_CATEGORY);
        let resources = self
            .enabled_categories
            .iter()
            .any(|c| ResourceCategory::is_resource_category(c));
        CandidateFilter {
            profiles: everything || profiles,
            resources: everything || resources,
        }
    }

    pub fn toggle_category(&mut self, category: &str) -> bool {
        if self.enabled_categories.remove(category) {
            false
        } else {
            self.enabled_categories.insert(category.to_string());
            true
        }
    }

    /// Presets may sit below the settings floor; free-form values may not.
    pub fn with_radius(mut self, miles: f64) -> Self {
        self.radius_miles = if RADIUS_PRESETS_MILES.contains(&miles) {
            miles
        } else {
            miles.max(MIN_RADIUS_MILES)
        };
        self
    }
}

fn default_radius_miles() -> f64 {
    DEFAULT_RADIUS_MILES
}

pub trait PreferenceStore {
    fn load(&self) -> Result<AlertPreferences, PreferenceStoreError>;
    fn save(&self, prefs: &AlertPreferences) -> Result<(), PreferenceStoreError>;
}

pub struct JsonPreferenceStore {
    path: PathBuf,
}

impl JsonPreferenceStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn load(&self) -> Result<AlertPreferences, PreferenceStoreError> {
        match fs::read(&self.path) {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved preferences, using defaults");
                Ok(AlertPreferences::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, prefs: &AlertPreferences) -> Result<(), PreferenceStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_vec_pretty(prefs)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn enabled_with(categories: &[&str]) -> AlertPreferences {
        AlertPreferences {
            enabled_categories: categories.iter().map(|c| c.to_string()).collect(),
            radius_miles: 0.25,
            enabled: true,
            radius_only: false,
        }
    }

    #[test]
    fn validation_reports_user_facing_reasons() {
        assert_eq!(
            AlertPreferences::default().validate(),
            Err(PreferenceError::Disabled)
        );
        assert_eq!(
            enabled_with(&[]).validate(),
            Err(PreferenceError::NoCategories)
        );
        assert_eq!(
            PreferenceError::NoCategories.to_string(),
            "Please select at least one resource type first"
        );

        let mut radius_only = enabled_with(&[]);
        radius_only.radius_only = true;
        assert!(radius_only.validate().is_ok());

        let mut zero = enabled_with(&["food"]);
        zero.radius_miles = 0.0;
        assert_eq!(zero.validate(), Err(PreferenceError::InvalidRadius));
    }

    #[test]
    fn filter_follows_selected_categories() {
        let f = enabled_with(&["urgent"]).candidate_filter();
        assert!(f.profiles && !f.resources);

        let f = enabled_with(&["shower", "food"]).candidate_filter();
        assert!(!f.profiles && f.resources);

        let mut all = enabled_with(&[]);
        all.radius_only = true;
        assert_eq!(all.candidate_filter(), CandidateFilter::everything());
    }

    #[test]
    fn toggle_adds_then_removes() {
        let mut prefs = enabled_with(&[]);
        assert!(prefs.toggle_category("food"));
        assert!(prefs.allows("food"));
        assert!(!prefs.allows("shower"));
        assert!(!prefs.toggle_category("food"));
        assert!(prefs.enabled_categories.is_empty());
    }

    #[test]
    fn radius_floor_spares_presets() {
        let prefs = AlertPreferences::default();
        assert_eq!(prefs.clone().with_radius(0.095).radius_miles, 0.095);
        assert_eq!(prefs.clone().with_radius(0.01).radius_miles, MIN_RADIUS_MILES);
        assert_eq!(prefs.with_radius(2.0).radius_miles, 2.0);
    }

    #[test]
    fn json_store_round_trips_and_defaults_when_missing() {
        let dir = tempdir().unwrap();
        let store = JsonPreferenceStore::new(dir.path().join("nested").join("prefs.json"));
        assert_eq!(store.load().unwrap(), AlertPreferences::default());

        let prefs = enabled_with(&["water_spigot"]);
        store.save(&prefs).unwrap();
        assert_eq!(store.load().unwrap(), prefs);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let prefs: AlertPreferences = serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert_eq!(prefs.radius_miles, DEFAULT_RADIUS_MILES);
        assert!(prefs.enabled_categories.is_empty());
    }
}
