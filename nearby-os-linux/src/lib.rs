use std::env;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::debug;

const NOTIFY_SEND: &str = "notify-send";
const APP_NAME: &str = "nearby";
// Daemons that honour this hint replace a visible notification with the same tag.
const SYNC_HINT: &str = "string:x-canonical-private-synchronous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    NoSession,
    MissingTool,
}

#[derive(Debug, Clone)]
pub struct Note<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub tag: &'a str,
    pub urgent: bool,
    /// `None` keeps the notification up until dismissed.
    pub expire: Option<Duration>,
}

pub struct DesktopNotifier {
    binary: PathBuf,
}

impl DesktopNotifier {
    pub fn detect() -> Result<Self, Availability> {
        if env::var_os("DBUS_SESSION_BUS_ADDRESS").is_none() && env::var_os("DISPLAY").is_none() {
            return Err(Availability::NoSession);
        }
        let binary = find_on_path(NOTIFY_SEND).ok_or(Availability::MissingTool)?;
        debug!(binary = %binary.display(), "desktop notifications available");
        Ok(Self { binary })
    }

    pub fn availability() -> Availability {
        match Self::detect() {
            Ok(_) => Availability::Available,
            Err(a) => a,
        }
    }

    pub fn show(&self, note: &Note<'_>) -> io::Result<()> {
        let status = Command::new(&self.binary)
            .args(note_args(note))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} exited with {}", NOTIFY_SEND, status),
            ));
        }
        Ok(())
    }
}

fn note_args(note: &Note<'_>) -> Vec<String> {
    let urgency = if note.urgent { "critical" } else { "normal" };
    let expire_ms = note.expire.map(|d| d.as_millis()).unwrap_or(0);
    vec![
        format!("--app-name={}", APP_NAME),
        format!("--urgency={}", urgency),
        format!("--expire-time={}", expire_ms),
        format!("--hint={}:{}", SYNC_HINT, note.tag),
        note.title.to_string(),
        note.body.to_string(),
    ]
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgent_note_is_critical_and_sticky() {
        let note = Note {
            title: "Urgent Need Nearby!",
            body: "Dana: Insulin refill - 0.35 mi away",
            tag: "urgent:p1",
            urgent: true,
            expire: None,
        };
        let args = note_args(&note);
        assert!(args.contains(&"--urgency=critical".to_string()));
        assert!(args.contains(&"--expire-time=0".to_string()));
        assert!(args.contains(&format!("--hint={}:urgent:p1", SYNC_HINT)));
        assert_eq!(args[args.len() - 2], "Urgent Need Nearby!");
    }

    #[test]
    fn normal_note_expires() {
        let note = Note {
            title: "Water Nearby!",
            body: "Park spigot is 264 ft away",
            tag: "water_spigot:r1",
            urgent: false,
            expire: Some(Duration::from_secs(5)),
        };
        let args = note_args(&note);
        assert!(args.contains(&"--urgency=normal".to_string()));
        assert!(args.contains(&"--expire-time=5000".to_string()));
    }
}
