use tracing::{info, warn};

use crate::entity::TrackedEntity;
use crate::error::FetchError;
use crate::now_unix_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFilter {
    pub profiles: bool,
    pub resources: bool,
}

impl CandidateFilter {
    pub fn everything() -> Self {
        Self {
            profiles: true,
            resources: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.profiles && !self.resources
    }
}

pub trait CandidateSource {
    fn fetch(&self, filter: &CandidateFilter) -> Result<Vec<TrackedEntity>, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Loading,
    Ready,
    Failed,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Updated(usize),
    Retained(FetchError),
}

pub struct CandidateStore {
    source: Box<dyn CandidateSource>,
    snapshot: Vec<TrackedEntity>,
    status: FeedStatus,
    last_success_ms: Option<i64>,
    consecutive_failures: u32,
}

impl CandidateStore {
    pub fn new(source: Box<dyn CandidateSource>) -> Self {
        Self {
            source,
            snapshot: Vec::new(),
            status: FeedStatus::Loading,
            last_success_ms: None,
            consecutive_failures: 0,
        }
    }

    /// Failures keep the previous snapshot; the next scheduled refresh retries.
    pub fn refresh(&mut self, filter: &CandidateFilter) -> RefreshOutcome {
        if filter.is_empty() {
            self.snapshot.clear();
            self.status = FeedStatus::Ready;
            return RefreshOutcome::Updated(0);
        }
        match self.source.fetch(filter) {
            Ok(entities) => {
                if self.consecutive_failures > 0 {
                    info!(after = self.consecutive_failures, "candidate feed recovered");
                }
                self.snapshot = entities;
                self.status = FeedStatus::Ready;
                self.last_success_ms = Some(now_unix_ms());
                self.consecutive_failures = 0;
                RefreshOutcome::Updated(self.snapshot.len())
            }
            Err(err) => {
                self.consecutive_failures += 1;
                warn!(
                    failures = self.consecutive_failures,
                    retained = self.snapshot.len(),
                    "candidate refresh failed: {err}"
                );
                if self.last_success_ms.is_none() {
                    self.status = FeedStatus::Failed;
                }
                RefreshOutcome::Retained(err)
            }
        }
    }

    pub fn snapshot(&self) -> &[TrackedEntity] {
        &self.snapshot
    }

    pub fn status(&self) -> FeedStatus {
        self.status
    }

    pub fn last_success_ms(&self) -> Option<i64> {
        self.last_success_ms
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
