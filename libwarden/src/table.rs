//! Authoritative map from canonical path to watch metadata.
//!
//! Keys live in a `BTreeMap<PathBuf, _>`. `PathBuf` orders by component,
//! so an entry and all of its descendants form one contiguous range that
//! starts at the entry itself; subtree walks never see `/foobar` while
//! looking under `/foo`.

use crate::backend::{TokenId, WatchToken};
use crate::utils::{is_within, rebase};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct WatchEntry {
    pub path: PathBuf,
    pub is_directory: bool,
    token: Option<WatchToken>,
}

impl WatchEntry {
    pub fn new(path: PathBuf, is_directory: bool, token: Option<WatchToken>) -> Self {
        Self {
            path,
            is_directory,
            token,
        }
    }

    pub fn token_id(&self) -> Option<TokenId> {
        self.token.as_ref().map(WatchToken::id)
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Hand the token back so it can be released through the backend.
    pub fn take_token(&mut self) -> Option<WatchToken> {
        self.token.take()
    }
}

#[derive(Debug, Default)]
pub struct WatchTable {
    entries: BTreeMap<PathBuf, WatchEntry>,
    by_token: HashMap<TokenId, PathBuf>,
}

impl WatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&WatchEntry> {
        self.entries.get(path)
    }

    /// Insert a new entry. Returns the entry it displaced, if any, so its
    /// token can be released.
    pub fn insert(&mut self, entry: WatchEntry) -> Option<WatchEntry> {
        let displaced = self.detach(&entry.path.clone());
        if let Some(id) = entry.token_id() {
            self.by_token.insert(id, entry.path.clone());
        }
        self.entries.insert(entry.path.clone(), entry);
        displaced
    }

    /// Give an entry a (new) token. Returns the token it held before.
    pub fn set_token(&mut self, path: &Path, token: Option<WatchToken>) -> Option<WatchToken> {
        let entry = self.entries.get_mut(path)?;
        let old = entry.token.take();
        if let Some(old_id) = old.as_ref().map(WatchToken::id) {
            self.by_token.remove(&old_id);
        }
        if let Some(id) = token.as_ref().map(WatchToken::id) {
            self.by_token.insert(id, path.to_path_buf());
        }
        entry.token = token;
        old
    }

    pub fn remove(&mut self, path: &Path) -> Option<WatchEntry> {
        self.detach(path)
    }

    /// Remove `path` and everything under it.
    pub fn remove_subtree(&mut self, path: &Path) -> Vec<WatchEntry> {
        self.subtree_paths(path)
            .into_iter()
            .filter_map(|p| self.detach(&p))
            .collect()
    }

    /// `path` itself (if present) followed by its descendants, in order.
    pub fn subtree_paths(&self, path: &Path) -> Vec<PathBuf> {
        self.entries
            .range::<Path, _>((Bound::Included(path), Bound::Unbounded))
            .take_while(|(p, _)| is_within(p, path))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Logical path currently associated with a backend token.
    pub fn path_for_token(&self, id: TokenId) -> Option<&Path> {
        self.by_token.get(&id).map(PathBuf::as_path)
    }

    /// `true` when `path` is itself an entry or sits directly inside a
    /// directory entry, i.e. the backend would report changes to it.
    pub fn covers(&self, path: &Path) -> bool {
        if self.contains(path) {
            return true;
        }
        path.parent()
            .and_then(|parent| self.entries.get(parent))
            .is_some_and(|e| e.is_directory)
    }

    /// Rewrite `old_prefix` to `new_prefix` for the entry at `old_prefix`
    /// and every descendant. Tokens move with their entries; nothing is
    /// subscribed or released here.
    ///
    /// Returns the new path and token of every moved entry, in path order,
    /// plus the entries that already sat at a destination path so their
    /// tokens can be released.
    pub fn rebase(
        &mut self,
        old_prefix: &Path,
        new_prefix: &Path,
    ) -> (Vec<(PathBuf, Option<TokenId>)>, Vec<WatchEntry>) {
        if old_prefix == new_prefix {
            return (Vec::new(), Vec::new());
        }

        let moving: Vec<WatchEntry> = self
            .subtree_paths(old_prefix)
            .into_iter()
            .filter_map(|p| self.detach(&p))
            .collect();

        let mut displaced = Vec::new();
        let mut moved = Vec::with_capacity(moving.len());
        for mut entry in moving {
            let Some(new_path) = rebase(&entry.path, old_prefix, new_prefix) else {
                continue;
            };
            entry.path = new_path.clone();
            let id = entry.token_id();
            if let Some(old) = self.insert(entry) {
                displaced.push(old);
            }
            moved.push((new_path, id));
        }
        (moved, displaced)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Take every token out of the table, leaving the path records.
    pub fn drain_tokens(&mut self) -> Vec<(PathBuf, WatchToken)> {
        self.by_token.clear();
        self.entries
            .values_mut()
            .filter_map(|e| e.token.take().map(|t| (e.path.clone(), t)))
            .collect()
    }

    fn detach(&mut self, path: &Path) -> Option<WatchEntry> {
        let entry = self.entries.remove(path)?;
        if let Some(id) = entry.token_id() {
            self.by_token.remove(&id);
        }
        Some(entry)
    }
}
