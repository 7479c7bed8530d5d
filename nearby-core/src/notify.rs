use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::entity::TrackedEntity;
use crate::error::NotifyError;
use crate::geo::format_distance;
use crate::matcher::ProximityResult;

pub const URGENT_TOAST_DURATION: Duration = Duration::from_secs(8);
pub const TOAST_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Normal,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub urgency: Urgency,
    pub duration: Duration,
    pub requires_interaction: bool,
    pub link: String,
}

pub trait ToastSink {
    fn toast(&mut self, alert: &Alert);
    fn message(&mut self, level: MessageLevel, text: &str);
}

pub trait OsNotificationSink {
    fn permission(&self) -> Permission;
    fn deliver(&mut self, alert: &Alert) -> Result<(), NotifyError>;
}

pub fn deep_link(entity: &TrackedEntity, base_url: Option<&str>) -> String {
    let path = match entity {
        TrackedEntity::Profile(p) => format!("/profile/{}", p.slug.as_deref().unwrap_or(&p.id)),
        TrackedEntity::Resource(r) => format!("/resource/{}", r.id),
    };
    match base_url {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
        None => path,
    }
}

pub fn build_alert(result: &ProximityResult, base_url: Option<&str>) -> Alert {
    let distance = format_distance(result.distance_miles);
    let urgent = result.is_urgent();
    let (title, body) = match &result.entity {
        TrackedEntity::Profile(p) if urgent => (
            "Urgent Need Nearby!".to_string(),
            format!(
                "{}: {} - {} away",
                p.display_name,
                p.urgent_title.as_deref().unwrap_or("Urgent need"),
                distance
            ),
        ),
        TrackedEntity::Profile(p) => (
            "Someone Nearby Needs Help".to_string(),
            format!("{} is {} away", p.display_name, distance),
        ),
        TrackedEntity::Resource(r) => (
            format!("{} Nearby!", r.category.label()),
            format!("{} is {} away", r.name, distance),
        ),
    };

    Alert {
        title,
        body,
        tag: result.key().to_string(),
        urgency: if urgent { Urgency::Urgent } else { Urgency::Normal },
        duration: if urgent {
            URGENT_TOAST_DURATION
        } else {
            TOAST_DURATION
        },
        requires_interaction: urgent,
        link: deep_link(&result.entity, base_url),
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub alert: Alert,
    pub os_delivered: bool,
}

pub struct Notifier {
    toast: Box<dyn ToastSink>,
    os: Option<Box<dyn OsNotificationSink>>,
    link_base: Option<String>,
}

impl Notifier {
    pub fn new(toast: Box<dyn ToastSink>) -> Self {
        Self {
            toast,
            os: None,
            link_base: None,
        }
    }

    pub fn with_os_sink(mut self, os: Box<dyn OsNotificationSink>) -> Self {
        self.os = Some(os);
        self
    }

    pub fn with_link_base(mut self, base: Option<String>) -> Self {
        self.link_base = base;
        self
    }

    pub fn os_permission(&self) -> Permission {
        self.os
            .as_ref()
            .map(|os| os.permission())
            .unwrap_or(Permission::Denied)
    }

    /// Toast always fires; the OS path is best effort.
    pub fn notify(&mut self, result: &ProximityResult) -> Delivery {
        let alert = build_alert(result, self.link_base.as_deref());
        self.toast.toast(&alert);

        let os_delivered = match self.os.as_mut() {
            Some(os) if os.permission() == Permission::Granted => match os.deliver(&alert) {
                Ok(()) => true,
                Err(err) => {
                    warn!(tag = %alert.tag, "os notification failed: {err}");
                    false
                }
            },
            Some(_) => {
                debug!(tag = %alert.tag, "os notifications not permitted, toast only");
                false
            }
            None => false,
        };

        Delivery {
            alert,
            os_delivered,
        }
    }

    pub fn message(&mut self, level: MessageLevel, text: &str) {
        self.toast.message(level, text);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingOs, RecordingToast};
    use super::*;
    use crate::entity::{ProfileEntity, ResourceCategory, ResourceEntity};
    use crate::geo::Coordinate;
    use std::sync::{Arc, Mutex};

    fn urgent_result() -> ProximityResult {
        ProximityResult {
            entity: TrackedEntity::Profile(ProfileEntity {
                id: "p1".to_string(),
                display_name: "Dana".to_string(),
                coordinate: Coordinate::new(26.645, -81.87),
                is_urgent: true,
                urgent_title: Some("Insulin refill".to_string()),
                verified: true,
                slug: Some("dana-m".to_string()),
            }),
            category: "urgent".to_string(),
            distance_miles: 0.35,
        }
    }

    fn resource_result(distance: f64) -> ProximityResult {
        ProximityResult {
            entity: TrackedEntity::Resource(ResourceEntity {
                id: "r9".to_string(),
                name: "Park spigot".to_string(),
                coordinate: Coordinate::new(26.64, -81.87),
                category: ResourceCategory::WaterSpigot,
                city: None,
            }),
            category: "water_spigot".to_string(),
            distance_miles: distance,
        }
    }

    fn os(permission: Permission, fail: bool) -> RecordingOs {
        RecordingOs {
            permission,
            fail,
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[test]
    fn urgent_alert_is_sticky_and_links_profile() {
        let alert = build_alert(&urgent_result(), Some("https://collect.example/"));
        assert_eq!(alert.title, "Urgent Need Nearby!");
        assert_eq!(alert.body, "Dana: Insulin refill - 0.35 mi away");
        assert_eq!(alert.urgency, Urgency::Urgent);
        assert!(alert.requires_interaction);
        assert_eq!(alert.duration, URGENT_TOAST_DURATION);
        assert_eq!(alert.tag, "urgent:p1");
        assert_eq!(alert.link, "https://collect.example/profile/dana-m");
    }

    #[test]
    fn resource_alert_uses_label_and_feet() {
        let alert = build_alert(&resource_result(0.05), None);
        assert_eq!(alert.title, "Water Nearby!");
        assert_eq!(alert.body, "Park spigot is 264 ft away");
        assert_eq!(alert.duration, TOAST_DURATION);
        assert!(!alert.requires_interaction);
        assert_eq!(alert.link, "/resource/r9");
    }

    #[test]
    fn granted_permission_reaches_os_sink() {
        let toast = RecordingToast::default();
        let sink = os(Permission::Granted, false);
        let mut notifier = Notifier::new(Box::new(toast.clone())).with_os_sink(Box::new(sink.clone()));

        let delivery = notifier.notify(&resource_result(0.2));
        assert!(delivery.os_delivered);
        assert_eq!(toast.alerts.lock().unwrap().len(), 1);
        assert_eq!(*sink.delivered.lock().unwrap(), vec!["water_spigot:r9".to_string()]);
    }

    #[test]
    fn os_permission_reflects_sink() {
        let toast = RecordingToast::default();
        assert_eq!(Notifier::new(Box::new(toast.clone())).os_permission(), Permission::Denied);
        let notifier = Notifier::new(Box::new(toast)).with_os_sink(Box::new(os(Permission::Default, false)));
        assert_eq!(notifier.os_permission(), Permission::Default);
    }

    #[test]
    fn denied_or_failing_os_degrades_to_toast() {
        for sink in [os(Permission::Denied, false), os(Permission::Granted, true)] {
            let toast = RecordingToast::default();
            let mut notifier = Notifier::new(Box::new(toast.clone())).with_os_sink(Box::new(sink.clone()));
            let delivery = notifier.notify(&urgent_result());
            assert!(!delivery.os_delivered);
            assert_eq!(toast.alerts.lock().unwrap().len(), 1);
            assert!(sink.delivered.lock().unwrap().is_empty());
        }
    }
}
