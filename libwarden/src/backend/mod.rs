//! The low-level notification primitive the monitor consumes.
//!
//! A backend hands out one [`WatchToken`] per subscribed path and pushes
//! [`RawEvent`]s tagged with the token's [`TokenId`] and a name relative to
//! the subscribed path. Resolving names against the watch table (rather
//! than trusting absolute paths from the backend) is what lets a remapped
//! subscription keep reporting under its new logical path.

mod native;

pub use native::NotifyBackend;

use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Copyable identifier carried by raw events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u64);

/// Ownership of one backend subscription.
///
/// Deliberately neither `Clone` nor `Copy`: the only way to give it up is
/// [`Backend::unsubscribe`], which consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct WatchToken {
    id: TokenId,
}

impl WatchToken {
    pub fn new(id: u64) -> Self {
        Self { id: TokenId(id) }
    }

    pub fn id(&self) -> TokenId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    Created,
    Changed,
    AttributeChanged,
    Deleted,
    MovedFrom,
    MovedTo,
}

/// One low-level notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub token: TokenId,
    /// Path relative to the subscription; empty for the subscribed object.
    pub name: PathBuf,
    pub kind: RawEventKind,
    /// Correlates a `MovedFrom` with its `MovedTo` when the backend knows.
    pub cookie: Option<usize>,
    /// Directory hint, when the backend reports one.
    pub is_directory: Option<bool>,
    /// Absolute destination for backends that report both ends of a rename
    /// in a single `MovedFrom`.
    pub other_path: Option<PathBuf>,
}

impl RawEvent {
    pub fn new(token: TokenId, kind: RawEventKind, name: impl Into<PathBuf>) -> Self {
        Self {
            token,
            name: name.into(),
            kind,
            cookie: None,
            is_directory: None,
            other_path: None,
        }
    }

    pub fn with_cookie(mut self, cookie: usize) -> Self {
        self.cookie = Some(cookie);
        self
    }

    pub fn with_directory(mut self, is_directory: bool) -> Self {
        self.is_directory = Some(is_directory);
        self
    }

    pub fn with_other_path(mut self, other: impl Into<PathBuf>) -> Self {
        self.other_path = Some(other.into());
        self
    }

    /// The event concerns the subscribed object rather than a child.
    pub fn is_self(&self) -> bool {
        self.name.as_os_str().is_empty()
    }
}

/// Backends deliver asynchronous errors on the same stream as events.
pub type RawMessage = Result<RawEvent>;

/// Subscribe / unsubscribe plus a push stream of raw events.
pub trait Backend {
    /// Start watching `path`. The returned token is owned by the caller
    /// until handed back through [`Backend::unsubscribe`].
    fn subscribe(&mut self, path: &Path) -> Result<WatchToken>;

    /// Release a subscription.
    fn unsubscribe(&mut self, token: WatchToken);

    /// Point an existing subscription at the new name of its object after a
    /// rename. The token keeps its identity; on error the subscription
    /// should be treated as dead and released.
    fn relocate(&mut self, id: TokenId, new_path: &Path) -> Result<()>;

    /// Stream of raw events and asynchronous backend errors.
    fn receiver(&self) -> &Receiver<RawMessage>;

    fn name(&self) -> &'static str {
        "custom"
    }
}

// ────── deterministic backend ─────────────────────────────────────────────────

/// In-memory backend. Nothing touches the OS; callers inject events with
/// [`ManualBackend::push`] and can make subscriptions fail on demand.
#[derive(Debug)]
pub struct ManualBackend {
    tx: Sender<RawMessage>,
    rx: Receiver<RawMessage>,
    next_id: u64,
    live: HashMap<TokenId, PathBuf>,
    subscribe_calls: Vec<PathBuf>,
    unsubscribe_calls: Vec<PathBuf>,
    relocate_calls: Vec<(PathBuf, PathBuf)>,
    failing: HashSet<PathBuf>,
    fail_all: bool,
}

impl Default for ManualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualBackend {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            next_id: 1,
            live: HashMap::new(),
            subscribe_calls: Vec::new(),
            unsubscribe_calls: Vec::new(),
            relocate_calls: Vec::new(),
            failing: HashSet::new(),
            fail_all: false,
        }
    }

    /// Inject a raw event.
    pub fn push(&self, event: RawEvent) -> Result<()> {
        self.tx.send(Ok(event)).map_err(|_| Error::Disconnected)
    }

    /// Inject an asynchronous backend error.
    pub fn push_error(&self, error: Error) -> Result<()> {
        self.tx.send(Err(error)).map_err(|_| Error::Disconnected)
    }

    /// Make every subsequent subscribe fail (or succeed again).
    pub fn fail_subscriptions(&mut self, fail: bool) {
        self.fail_all = fail;
    }

    /// Make subscriptions for one path fail until cleared.
    pub fn fail_path(&mut self, path: impl Into<PathBuf>, fail: bool) {
        let path = path.into();
        if fail {
            self.failing.insert(path);
        } else {
            self.failing.remove(&path);
        }
    }

    /// Token of the live subscription currently pointed at `path`.
    pub fn token_for(&self, path: &Path) -> Option<TokenId> {
        self.live
            .iter()
            .filter(|(_, p)| p.as_path() == path)
            .map(|(id, _)| *id)
            .max()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Paths passed to `subscribe` (in call order, failures included).
    pub fn subscribe_calls(&self) -> &[PathBuf] {
        &self.subscribe_calls
    }

    /// Paths whose tokens were released (in call order).
    pub fn unsubscribe_calls(&self) -> &[PathBuf] {
        &self.unsubscribe_calls
    }

    /// `(from, to)` for every successful relocation, in call order.
    pub fn relocate_calls(&self) -> &[(PathBuf, PathBuf)] {
        &self.relocate_calls
    }
}

impl Backend for ManualBackend {
    fn subscribe(&mut self, path: &Path) -> Result<WatchToken> {
        self.subscribe_calls.push(path.to_path_buf());
        if self.fail_all || self.failing.contains(path) {
            return Err(Error::LimitReached(format!(
                "manual backend refused {}",
                path.display()
            )));
        }
        let token = WatchToken::new(self.next_id);
        self.next_id += 1;
        self.live.insert(token.id(), path.to_path_buf());
        Ok(token)
    }

    fn unsubscribe(&mut self, token: WatchToken) {
        match self.live.remove(&token.id()) {
            Some(path) => self.unsubscribe_calls.push(path),
            None => tracing::warn!("manual backend: unknown token {:?}", token.id()),
        }
    }

    fn relocate(&mut self, id: TokenId, new_path: &Path) -> Result<()> {
        let Some(path) = self.live.get_mut(&id) else {
            return Err(Error::Watch(format!("unknown token {id:?}")));
        };
        let old = std::mem::replace(path, new_path.to_path_buf());
        if self.fail_all || self.failing.contains(new_path) {
            return Err(Error::Watch(format!(
                "manual backend refused {}",
                new_path.display()
            )));
        }
        self.relocate_calls.push((old, new_path.to_path_buf()));
        Ok(())
    }

    fn receiver(&self) -> &Receiver<RawMessage> {
        &self.rx
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_backend_tracks_subscriptions() {
        let mut b = ManualBackend::new();
        let t1 = b.subscribe(Path::new("/w")).unwrap();
        let t2 = b.subscribe(Path::new("/w/sub")).unwrap();
        assert_ne!(t1.id(), t2.id());
        assert_eq!(b.token_for(Path::new("/w")), Some(t1.id()));
        assert_eq!(b.live_count(), 2);

        b.unsubscribe(t1);
        assert_eq!(b.live_count(), 1);
        assert_eq!(b.unsubscribe_calls(), &[PathBuf::from("/w")]);
        assert_eq!(b.token_for(Path::new("/w")), None);
    }

    #[test]
    fn manual_backend_relocates_in_place() {
        let mut b = ManualBackend::new();
        let t = b.subscribe(Path::new("/w/foo")).unwrap();
        b.relocate(t.id(), Path::new("/w/bar")).unwrap();
        assert_eq!(b.token_for(Path::new("/w/bar")), Some(t.id()));
        assert_eq!(b.token_for(Path::new("/w/foo")), None);
        assert_eq!(
            b.relocate_calls(),
            &[(PathBuf::from("/w/foo"), PathBuf::from("/w/bar"))]
        );
        assert!(b.relocate(TokenId(99), Path::new("/w/x")).is_err());

        b.unsubscribe(t);
        assert_eq!(b.unsubscribe_calls(), &[PathBuf::from("/w/bar")]);
    }

    #[test]
    fn manual_backend_failures() {
        let mut b = ManualBackend::new();
        b.fail_path("/bad", true);
        assert!(b.subscribe(Path::new("/bad")).is_err());
        assert!(b.subscribe(Path::new("/good")).is_ok());

        b.fail_subscriptions(true);
        assert!(b.subscribe(Path::new("/good")).is_err());
        assert_eq!(b.subscribe_calls().len(), 3);
    }

    #[test]
    fn manual_backend_delivers_events() {
        let b = ManualBackend::new();
        let ev = RawEvent::new(TokenId(7), RawEventKind::Created, "x.txt").with_cookie(3);
        b.push(ev.clone()).unwrap();
        b.push_error(Error::Watch("boom".into())).unwrap();

        assert_eq!(b.receiver().try_recv().unwrap().unwrap(), ev);
        assert!(b.receiver().try_recv().unwrap().is_err());
        assert!(!ev.is_self());
    }
}
