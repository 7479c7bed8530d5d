use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationKey(String);

impl NotificationKey {
    pub fn new(category: &str, id: &str) -> Self {
        Self(format!("{category}:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys that already fired during the current monitoring session.
#[derive(Debug, Default)]
pub struct DedupLedger {
    fired: HashSet<NotificationKey>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_notify(&mut self, key: &NotificationKey) -> bool {
        if self.fired.contains(key) {
            return false;
        }
        self.fired.insert(key.clone())
    }

    pub fn reset(&mut self) {
        self.fired.clear();
    }

    pub fn contains(&self, key: &NotificationKey) -> bool {
        self.fired.contains(key)
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}
