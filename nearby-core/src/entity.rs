use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

pub const PROFILE_CATEGORY: &str = "profile";
pub const URGENT_CATEGORY: &str = "urgent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Profile,
    Resource,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::Resource => "resource",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    WaterSpigot,
    WifiHotspot,
    ElectricalOutlet,
    TentSpot,
    Shower,
    Restroom,
    Food,
    ChargingStation,
    Laundry,
    Storage,
    Medical,
    Library,
    Shelter,
    #[serde(other)]
    Other,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 14] = [
        ResourceCategory::WaterSpigot,
        ResourceCategory::WifiHotspot,
        ResourceCategory::ElectricalOutlet,
        ResourceCategory::TentSpot,
        ResourceCategory::Shower,
        ResourceCategory::Restroom,
        ResourceCategory::Food,
        ResourceCategory::ChargingStation,
        ResourceCategory::Laundry,
        ResourceCategory::Storage,
        ResourceCategory::Medical,
        ResourceCategory::Library,
        ResourceCategory::Shelter,
        ResourceCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::WaterSpigot => "water_spigot",
            ResourceCategory::WifiHotspot => "wifi_hotspot",
            ResourceCategory::ElectricalOutlet => "electrical_outlet",
            ResourceCategory::TentSpot => "tent_spot",
            ResourceCategory::Shower => "shower",
            ResourceCategory::Restroom => "restroom",
            ResourceCategory::Food => "food",
            ResourceCategory::ChargingStation => "charging_station",
            ResourceCategory::Laundry => "laundry",
            ResourceCategory::Storage => "storage",
            ResourceCategory::Medical => "medical",
            ResourceCategory::Library => "library",
            ResourceCategory::Shelter => "shelter",
            ResourceCategory::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceCategory::WaterSpigot => "Water",
            ResourceCategory::WifiHotspot => "WiFi",
            ResourceCategory::ElectricalOutlet => "Power",
            ResourceCategory::TentSpot => "Tent Spot",
            ResourceCategory::Shower => "Shower",
            ResourceCategory::Restroom => "Restroom",
            ResourceCategory::Food => "Food",
            ResourceCategory::ChargingStation => "Charging",
            ResourceCategory::Laundry => "Laundry",
            ResourceCategory::Storage => "Storage",
            ResourceCategory::Medical => "Medical",
            ResourceCategory::Library => "Library",
            ResourceCategory::Shelter => "Shelter",
            ResourceCategory::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    pub fn is_resource_category(s: &str) -> bool {
        Self::parse(s).is_some()
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntity {
    pub id: String,
    pub display_name: String,
    pub coordinate: Coordinate,
    pub is_urgent: bool,
    #[serde(default)]
    pub urgent_title: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntity {
    pub id: String,
    pub name: String,
    pub coordinate: Coordinate,
    pub category: ResourceCategory,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrackedEntity {
    Profile(ProfileEntity),
    Resource(ResourceEntity),
}

impl TrackedEntity {
    pub fn id(&self) -> &str {
        match self {
            TrackedEntity::Profile(p) => &p.id,
            TrackedEntity::Resource(r) => &r.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            TrackedEntity::Profile(_) => EntityKind::Profile,
            TrackedEntity::Resource(_) => EntityKind::Resource,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        match self {
            TrackedEntity::Profile(p) => p.coordinate,
            TrackedEntity::Resource(r) => r.coordinate,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            TrackedEntity::Profile(p) => &p.display_name,
            TrackedEntity::Resource(r) => &r.name,
        }
    }

    /// Alert categories this entity can fire under, most specific first.
    pub fn alert_categories(&self) -> Vec<&'static str> {
        match self {
            TrackedEntity::Profile(p) if p.is_urgent => vec![URGENT_CATEGORY, PROFILE_CATEGORY],
            TrackedEntity::Profile(_) => vec![PROFILE_CATEGORY],
            TrackedEntity::Resource(r) => vec![r.category.as_str()],
        }
    }
}
