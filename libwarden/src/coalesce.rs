//! Per-path cache that folds bursts of created/updated notifications.
//!
//! A path is held until it has been quiet for a while, or until it has been
//! held too long. Deletions are remembered briefly so the same deletion
//! reported twice (by the object and by its parent) becomes one signal.

use crate::utils::is_within;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedChange {
    pub path: PathBuf,
    pub is_directory: bool,
    pub kind: ChangeKind,
    pub first_seen: Instant,
    pub last_seen: Instant,
}

#[derive(Debug)]
pub struct UpdateCoalescer {
    quiet: Duration,
    max_age: Option<Duration>,
    dedupe_window: Duration,
    changes: HashMap<PathBuf, CachedChange>,
    recent_deletes: HashMap<PathBuf, Instant>,
}

impl UpdateCoalescer {
    pub fn new(quiet: Duration, max_age: Option<Duration>, dedupe_window: Duration) -> Self {
        Self {
            quiet,
            max_age,
            dedupe_window,
            changes: HashMap::new(),
            recent_deletes: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Record a change. An update never downgrades a pending creation.
    pub fn note(&mut self, path: PathBuf, is_directory: bool, kind: ChangeKind, now: Instant) {
        if kind == ChangeKind::Created {
            self.recent_deletes.remove(&path);
        }
        match self.changes.get_mut(&path) {
            Some(existing) => {
                if kind == ChangeKind::Created {
                    existing.kind = ChangeKind::Created;
                }
                existing.is_directory = is_directory;
                existing.last_seen = now;
            }
            None => {
                self.changes.insert(
                    path.clone(),
                    CachedChange {
                        path,
                        is_directory,
                        kind,
                        first_seen: now,
                        last_seen: now,
                    },
                );
            }
        }
    }

    /// Take the cached change for exactly `path`.
    pub fn take(&mut self, path: &Path) -> Option<CachedChange> {
        self.changes.remove(path)
    }

    /// Take every cached change at or below `prefix`, oldest first.
    pub fn take_under(&mut self, prefix: &Path) -> Vec<CachedChange> {
        let keys: Vec<PathBuf> = self
            .changes
            .keys()
            .filter(|p| is_within(p, prefix))
            .cloned()
            .collect();
        let mut out: Vec<CachedChange> =
            keys.iter().filter_map(|k| self.changes.remove(k)).collect();
        sort_oldest_first(&mut out);
        out
    }

    /// Remember a deletion. Returns `false` when the same path was already
    /// reported deleted within the dedupe window and nothing recreated it.
    pub fn note_deleted(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(at) = self.recent_deletes.get(path) {
            if now.saturating_duration_since(*at) < self.dedupe_window {
                return false;
            }
        }
        self.recent_deletes.insert(path.to_path_buf(), now);
        true
    }

    /// Forget a remembered deletion, e.g. because something was moved in.
    pub fn forget_deleted(&mut self, path: &Path) {
        self.recent_deletes.remove(path);
    }

    /// Drop cached changes for paths `keep` rejects, without emitting them.
    pub fn retain(&mut self, keep: impl Fn(&Path) -> bool) -> usize {
        let before = self.changes.len();
        self.changes.retain(|p, _| keep(p));
        before - self.changes.len()
    }

    /// Changes that are ready to be emitted at `now`, oldest first.
    pub fn due(&mut self, now: Instant) -> Vec<CachedChange> {
        let window = self.dedupe_window;
        self.recent_deletes
            .retain(|_, at| now.saturating_duration_since(*at) < window);

        let ready: Vec<PathBuf> = self
            .changes
            .values()
            .filter(|c| now >= self.deadline_of(c))
            .map(|c| c.path.clone())
            .collect();
        let mut out: Vec<CachedChange> =
            ready.iter().filter_map(|k| self.changes.remove(k)).collect();
        sort_oldest_first(&mut out);
        out
    }

    /// Earliest instant at which `due` would return something.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.changes.values().map(|c| self.deadline_of(c)).min()
    }

    /// Everything still cached, oldest first.
    pub fn drain(&mut self) -> Vec<CachedChange> {
        let mut out: Vec<CachedChange> = self.changes.drain().map(|(_, c)| c).collect();
        sort_oldest_first(&mut out);
        out
    }

    pub fn clear(&mut self) {
        self.changes.clear();
        self.recent_deletes.clear();
    }

    fn deadline_of(&self, c: &CachedChange) -> Instant {
        let quiet = c.last_seen + self.quiet;
        match self.max_age {
            Some(max) => quiet.min(c.first_seen + max),
            None => quiet,
        }
    }
}

fn sort_oldest_first(v: &mut [CachedChange]) {
    v.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.path.cmp(&b.path)));
}
