use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::debug;

const OSASCRIPT: &str = "/usr/bin/osascript";

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
    pub expire: Option<Duration>,
}

/// Notification Center via AppleScript. It has no replace-by-tag, so tags
/// already shown by this process are skipped here.
pub struct DesktopNotifier {
    shown: HashSet<String>,
}

impl DesktopNotifier {
    pub fn detect() -> Result<Self, Availability> {
        if !Path::new(OSASCRIPT).is_file() {
            return Err(Availability::MissingTool);
        }
        Ok(Self {
            shown: HashSet::new(),
        })
    }

    pub fn availability() -> Availability {
        match Self::detect() {
            Ok(_) => Availability::Available,
            Err(a) => a,
        }
    }

    pub fn show(&mut self, note: &Note<'_>) -> io::Result<()> {
        if self.shown.contains(note.tag) {
            debug!(tag = note.tag, "already shown");
            return Ok(());
        }
        let status = Command::new(OSASCRIPT)
            .arg("-e")
            .arg(script_for(note))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("osascript exited with {}", status),
            ));
        }
        self.shown.insert(note.tag.to_string());
        Ok(())
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn script_for(note: &Note<'_>) -> String {
    let mut script = format!(
        "display notification {} with title {}",
        quote(note.body),
        quote(note.title)
    );
    if note.urgent {
        script.push_str(" sound name \"Sosumi\"");
    }
    script
}
