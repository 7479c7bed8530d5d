use nearby_core::error::NotifyError;
use nearby_core::notify::{Alert, OsNotificationSink, Permission, Urgency};

#[cfg(target_os = "linux")]
use nearby_os_linux as os;
#[cfg(target_os = "macos")]
use nearby_os_macos as os;

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub struct DesktopSink {
    notifier: os::DesktopNotifier,
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
impl OsNotificationSink for DesktopSink {
    fn permission(&self) -> Permission {
        match os::DesktopNotifier::availability() {
            os::Availability::Available => Permission::Granted,
            os::Availability::NoSession => Permission::Default,
            os::Availability::MissingTool => Permission::Denied,
        }
    }

    fn deliver(&mut self, alert: &Alert) -> Result<(), NotifyError> {
        let urgent = alert.urgency == Urgency::Urgent;
        let note = os::Note {
            title: &alert.title,
            body: &alert.body,
            tag: &alert.tag,
            urgent,
            expire: expire_for(alert),
        };
        self.notifier
            .show(&note)
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

/// Alerts that need interaction stay up until dismissed.
pub fn expire_for(alert: &Alert) -> Option<std::time::Duration> {
    if alert.requires_interaction {
        None
    } else {
        Some(alert.duration)
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn desktop_sink() -> Option<Box<dyn OsNotificationSink>> {
    match os::DesktopNotifier::detect() {
        Ok(notifier) => Some(Box::new(DesktopSink { notifier })),
        Err(reason) => {
            tracing::info!(?reason, "desktop notifications unavailable, terminal only");
            None
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn desktop_sink() -> Option<Box<dyn OsNotificationSink>> {
    None
}
