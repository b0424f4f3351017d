//! OS notifications through the `notify` crate.
//!
//! Every subscription is a non-recursive watch. The notify callback runs on
//! notify's own thread; it maps absolute paths back to `(token, name)`
//! using a shared route table and forwards the result over a bounded
//! channel.
//!
//! notify's inotify loop drops the watches of a directory (and everything
//! it recursively tracked below it) as soon as it sees the directory move
//! away, so a renamed subscription is re-armed at its new name by
//! [`Backend::relocate`] under the same token.

use super::{Backend, RawEvent, RawEventKind, RawMessage, TokenId, WatchToken};
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use notify::{
    event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

type Routes = Arc<Mutex<HashMap<PathBuf, TokenId>>>;

pub struct NotifyBackend {
    watcher: Option<RecommendedWatcher>,
    routes: Routes,
    subscribed: HashMap<TokenId, PathBuf>,
    next_id: u64,
    tx: Sender<RawMessage>,
    rx: Receiver<RawMessage>,
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("started", &self.watcher.is_some())
            .field("subscriptions", &self.subscribed.len())
            .finish()
    }
}

impl NotifyBackend {
    /// The OS watcher is created on first subscribe, so construction
    /// cannot fail.
    pub fn with_capacity(max_queue_size: usize) -> Self {
        let (tx, rx) = bounded(max_queue_size.max(1));
        Self {
            watcher: None,
            routes: Arc::new(Mutex::new(HashMap::new())),
            subscribed: HashMap::new(),
            next_id: 1,
            tx,
            rx,
        }
    }

    fn ensure_watcher(&mut self) -> Result<&mut RecommendedWatcher> {
        if self.watcher.is_none() {
            let event_tx = self.tx.clone();
            let routes = self.routes.clone();
            let w = RecommendedWatcher::new(
                move |res: notify::Result<Event>| {
                    let event = match res {
                        Ok(event) => event,
                        Err(e) => {
                            let _ = event_tx.send(Err(e.into()));
                            return;
                        }
                    };
                    // translate under the lock, send after releasing it: the
                    // loop may be waiting on the same lock in `subscribe`
                    let translated = match routes.lock() {
                        Ok(table) => translate(&event, &table),
                        Err(_) => {
                            let _ = event_tx.send(Err(Error::Watch("route table poisoned".into())));
                            return;
                        }
                    };
                    for raw in translated {
                        let _ = event_tx.send(Ok(raw));
                    }
                },
                notify::Config::default(),
            )?;
            debug!("notify backend started");
            self.watcher = Some(w);
        }
        self.watcher
            .as_mut()
            .ok_or_else(|| Error::Watch("watcher unavailable".into()))
    }
}

impl Default for NotifyBackend {
    fn default() -> Self {
        Self::with_capacity(crate::config::MonitorConfig::default().max_queue_size)
    }
}

impl Backend for NotifyBackend {
    fn subscribe(&mut self, path: &Path) -> Result<WatchToken> {
        self.ensure_watcher()?
            .watch(path, RecursiveMode::NonRecursive)?;

        let token = WatchToken::new(self.next_id);
        self.next_id += 1;
        self.subscribed.insert(token.id(), path.to_path_buf());
        self.routes
            .lock()
            .map_err(|_| Error::Watch("route table poisoned".into()))?
            .insert(path.to_path_buf(), token.id());
        trace!("subscribed {:?} -> {}", token.id(), path.display());
        Ok(token)
    }

    fn unsubscribe(&mut self, token: WatchToken) {
        let Some(path) = self.subscribed.remove(&token.id()) else {
            warn!("unsubscribe for unknown token {:?}", token.id());
            return;
        };

        if let Ok(mut routes) = self.routes.lock() {
            if routes.get(&path) == Some(&token.id()) {
                routes.remove(&path);
            }
        }

        // the kernel drops watches on deleted objects by itself, so
        // "not found" here is routine
        if let Some(w) = self.watcher.as_mut() {
            if let Err(e) = w.unwatch(&path) {
                debug!("unwatch {}: {}", path.display(), e);
            }
        }
    }

    fn relocate(&mut self, id: TokenId, new_path: &Path) -> Result<()> {
        let Some(old_path) = self.subscribed.get(&id).cloned() else {
            return Err(Error::Watch(format!("relocate for unknown token {id:?}")));
        };

        {
            let mut routes = self
                .routes
                .lock()
                .map_err(|_| Error::Watch("route table poisoned".into()))?;
            if routes.get(&old_path) == Some(&id) {
                routes.remove(&old_path);
            }
            routes.insert(new_path.to_path_buf(), id);
        }
        self.subscribed.insert(id, new_path.to_path_buf());

        // both names resolve to the same kernel watch, so the old one has
        // to go before the new one is added
        let w = self.ensure_watcher()?;
        if let Err(e) = w.unwatch(&old_path) {
            trace!("unwatch {} before relocate: {}", old_path.display(), e);
        }
        w.watch(new_path, RecursiveMode::NonRecursive)?;
        trace!("relocated {:?}: {} -> {}", id, old_path.display(), new_path.display());
        Ok(())
    }

    fn receiver(&self) -> &Receiver<RawMessage> {
        &self.rx
    }

    fn name(&self) -> &'static str {
        "notify"
    }
}

/// Map an absolute path to the subscription that reports it. A watched
/// parent wins over the object's own watch, so duplicates reported by both
/// collapse onto the same `(token, name)`.
fn route(path: &Path, routes: &HashMap<PathBuf, TokenId>) -> Option<(TokenId, PathBuf)> {
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Some(id) = routes.get(parent) {
            return Some((*id, PathBuf::from(name)));
        }
    }
    routes.get(path).map(|id| (*id, PathBuf::new()))
}

fn directory_hint(kind: &EventKind) -> Option<bool> {
    match kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => Some(true),
        EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File) => Some(false),
        _ => None,
    }
}

/// Translate one notify event into zero or more raw events.
fn translate(event: &Event, routes: &HashMap<PathBuf, TokenId>) -> Vec<RawEvent> {
    let cookie = event.tracker();
    let single = |kind: RawEventKind| -> Vec<RawEvent> {
        event
            .paths
            .iter()
            .filter_map(|p| route(p, routes))
            .map(|(token, name)| {
                let mut raw = RawEvent::new(token, kind, name);
                raw.is_directory = directory_hint(&event.kind);
                raw.cookie = cookie;
                raw
            })
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => single(RawEventKind::Created),
        EventKind::Remove(_) => single(RawEventKind::Deleted),
        EventKind::Modify(ModifyKind::Metadata(_)) => single(RawEventKind::AttributeChanged),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other) => single(RawEventKind::Changed),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => single(RawEventKind::Changed),

        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            // inotify reports IN_MOVE_SELF as an untracked `From`; the
            // parent's tracked pair already describes that rename
            RenameMode::From if cfg!(target_os = "linux") && cookie.is_none() => Vec::new(),
            RenameMode::From => single(RawEventKind::MovedFrom),
            RenameMode::To => single(RawEventKind::MovedTo),
            // tracked `Both` repeats a From/To pair we have already sent
            RenameMode::Both if cookie.is_some() => Vec::new(),
            RenameMode::Both => match (event.paths.first(), event.paths.get(1)) {
                (Some(from), Some(to)) => route(from, routes)
                    .map(|(token, name)| {
                        RawEvent::new(token, RawEventKind::MovedFrom, name).with_other_path(to)
                    })
                    .into_iter()
                    .collect(),
                _ => Vec::new(),
            },
            // direction unknown (FSEvents): decide by whether it still exists
            RenameMode::Any | RenameMode::Other => event
                .paths
                .iter()
                .filter_map(|p| {
                    let kind = if p.exists() {
                        RawEventKind::MovedTo
                    } else {
                        RawEventKind::MovedFrom
                    };
                    route(p, routes).map(|(token, name)| RawEvent::new(token, kind, name))
                })
                .collect(),
        },

        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
