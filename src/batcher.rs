//! Debounced change batching.
//!
//! Bursts of file-system events (editor saves, `git checkout`) collapse into
//! a single batch. Every event re-arms the deadline; when it passes the batch
//! is taken and the batcher goes idle again. Time is passed in by the caller,
//! so the state machine runs without sleeping in tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What happened to a path. The last event for a path wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Created or modified: copy into the build
    Upsert,
    /// Deleted: remove from the build
    Remove,
}

/// Debounce delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Delay for batches of plain files
    pub quick: Duration,
    /// Delay once any style file is pending
    pub style: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            quick: Duration::from_millis(100),
            style: Duration::from_millis(500),
        }
    }
}

/// A flushed batch. Copies are applied before deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub copies: Vec<PathBuf>,
    pub deletes: Vec<PathBuf>,
    pub style_related: bool,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.copies.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty() && self.deletes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ChangeBatcher {
    config: DebounceConfig,
    pending: BTreeMap<PathBuf, ChangeKind>,
    style_related: bool,
    deadline: Option<Instant>,
}

impl ChangeBatcher {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Record an event and re-arm the deadline
    pub fn record(&mut self, path: &Path, kind: ChangeKind, style_related: bool, now: Instant) {
        self.pending.insert(path.to_path_buf(), kind);
        self.style_related |= style_related;

        let delay = if self.style_related {
            self.config.style
        } else {
            self.config.quick
        };
        self.deadline = Some(now + delay);
    }

    /// Nothing pending
    pub fn is_idle(&self) -> bool {
        self.deadline.is_none()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Time left before the batch is due. `None` while idle.
    pub fn time_until_flush(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Take the batch if its deadline has passed
    pub fn take_if_due(&mut self, now: Instant) -> Option<Batch> {
        match self.deadline {
            Some(deadline) if now >= deadline => Some(self.take()),
            _ => None,
        }
    }

    /// Take whatever is pending regardless of the deadline
    pub fn take(&mut self) -> Batch {
        let mut batch = Batch {
            style_related: self.style_related,
            ..Default::default()
        };
        for (path, kind) in std::mem::take(&mut self.pending) {
            match kind {
                ChangeKind::Upsert => batch.copies.push(path),
                ChangeKind::Remove => batch.deletes.push(path),
            }
        }
        self.style_related = false;
        self.deadline = None;
        batch
    }
}
