use std::cmp::Ordering;

use serde::Serialize;

use crate::entity::TrackedEntity;
use crate::geo::{distance_miles, Coordinate};
use crate::ledger::NotificationKey;
use crate::prefs::AlertPreferences;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityResult {
    pub entity: TrackedEntity,
    pub category: String,
    pub distance_miles: f64,
}

impl ProximityResult {
    pub fn key(&self) -> NotificationKey {
        NotificationKey::new(&self.category, self.entity.id())
    }

    pub fn is_urgent(&self) -> bool {
        self.category == crate::entity::URGENT_CATEGORY
    }
}

fn selected_category(entity: &TrackedEntity, prefs: &AlertPreferences) -> Option<&'static str> {
    entity
        .alert_categories()
        .into_iter()
        .find(|c| prefs.allows(c))
}

/// Candidates within the radius, nearest first.
pub fn match_candidates(
    user: Coordinate,
    candidates: &[TrackedEntity],
    prefs: &AlertPreferences,
) -> Vec<ProximityResult> {
    if !prefs.enabled || !prefs.radius_miles.is_finite() || prefs.radius_miles <= 0.0 {
        return Vec::new();
    }

    let mut out: Vec<ProximityResult> = candidates
        .iter()
        .filter_map(|entity| {
            let category = selected_category(entity, prefs)?;
            let distance = distance_miles(user, entity.coordinate());
            (distance <= prefs.radius_miles).then(|| ProximityResult {
                entity: entity.clone(),
                category: category.to_string(),
                distance_miles: distance,
            })
        })
        .collect();

    out.sort_by(|a, b| {
        a.distance_miles
            .partial_cmp(&b.distance_miles)
            .unwrap_or(Ordering::Equal)
    });
    out
}
