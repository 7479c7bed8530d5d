use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_MILES: f64 = 3959.0;
pub const FEET_PER_MILE: f64 = 5280.0;
pub const FEET_DISPLAY_BELOW_MILES: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Great-circle distance in miles.
///
/// Out-of-range input still yields a finite number; validating coordinates is
/// the caller's job.
pub fn distance_miles(a: Coordinate, b: Coordinate) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let h = ((dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2))
        .clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_MILES * c
}

pub fn format_distance(miles: f64) -> String {
    if miles < FEET_DISPLAY_BELOW_MILES {
        format!("{} ft", (miles * FEET_PER_MILE).round() as i64)
    } else {
        format!("{:.2} mi", miles)
    }
}

pub fn format_radius(miles: f64) -> String {
    if miles < FEET_DISPLAY_BELOW_MILES {
        format!("{} feet", (miles * FEET_PER_MILE).round() as i64)
    } else if miles == 1.0 {
        "1 mile".to_string()
    } else {
        format!("{} miles", miles)
    }
}
