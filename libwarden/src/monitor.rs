//! The monitor: watch bookkeeping plus raw-event normalization.
//!
//! A [`Monitor`] owns a [`Backend`], the [`WatchTable`] and the two pieces
//! of in-flight state (pending moves and cached changes). Everything runs
//! on the thread that owns the monitor; the backend only pushes raw
//! messages into a channel that [`Monitor::poll`] drains.
//!
//! Semantic events leave through a `crossbeam_channel` obtained with
//! [`Monitor::events`].

use crate::backend::{Backend, NotifyBackend, RawEvent, RawEventKind, TokenId, WatchToken};
use crate::coalesce::{CachedChange, ChangeKind, UpdateCoalescer};
use crate::config::MonitorConfig;
use crate::event::MonitorEvent;
use crate::pairer::{MovePairer, PendingMove};
use crate::table::{WatchEntry, WatchTable};
use crate::utils::{canonicalize_lossy, normalize_lexical, resolve_relative};

use crossbeam_channel::{after, select, unbounded, Receiver, Sender};
use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

pub struct Monitor<B: Backend = NotifyBackend> {
    backend: B,
    config: MonitorConfig,
    table: WatchTable,
    pairer: MovePairer,
    coalescer: UpdateCoalescer,
    enabled: bool,
    ignored: usize,
    limit_warned: bool,
    tx: Sender<MonitorEvent>,
    rx: Receiver<MonitorEvent>,
}

impl Monitor<NotifyBackend> {
    /// Monitor on the platform's native notification API, configured from
    /// the environment. Falls back to defaults when the environment holds
    /// invalid values.
    pub fn new() -> Self {
        let config = MonitorConfig::load().unwrap_or_else(|e| {
            warn!("ignoring monitor environment overrides: {e:#}");
            MonitorConfig::default()
        });
        Self::with_config(config)
    }

    pub fn with_config(config: MonitorConfig) -> Self {
        let backend = NotifyBackend::with_capacity(config.max_queue_size);
        Self::with_backend(backend, config)
    }
}

impl Default for Monitor<NotifyBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Monitor<B> {
    pub fn with_backend(backend: B, config: MonitorConfig) -> Self {
        let (tx, rx) = unbounded();
        let dedupe_window = config.pairing_window().max(config.update_quiet());
        info!(
            backend = backend.name(),
            pairing_ms = config.pairing_window_ms,
            limit = ?config.monitor_limit,
            "monitor ready"
        );
        Self {
            pairer: MovePairer::new(config.pairing_window(), config.max_pending_moves),
            coalescer: UpdateCoalescer::new(
                config.update_quiet(),
                config.update_max_age(),
                dedupe_window,
            ),
            backend,
            config,
            table: WatchTable::new(),
            enabled: true,
            ignored: 0,
            limit_warned: false,
            tx,
            rx,
        }
    }

    // ────── public bookkeeping API ────────────────────────────────────────

    pub fn get_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn monitoring on or off. Watch records survive either way; only
    /// the backend subscriptions come and go. No events are emitted.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;

        if enabled {
            let paths: Vec<PathBuf> = self.table.paths().map(Path::to_path_buf).collect();
            let mut live = 0usize;
            for path in paths {
                let token = self.subscribe(&path);
                live += usize::from(token.is_some());
                if let Some(stale) = self.table.set_token(&path, token) {
                    self.backend.unsubscribe(stale);
                }
            }
            info!(entries = self.table.len(), live, "monitoring enabled");
        } else {
            let drained = self.table.drain_tokens();
            let released = drained.len();
            for (_, token) in drained {
                self.backend.unsubscribe(token);
            }
            // nothing in flight can be resolved without subscriptions
            self.pairer.clear();
            self.coalescer.clear();
            info!(entries = self.table.len(), released, "monitoring disabled");
        }
    }

    /// Watch `path`. Whether it is a directory is read from the filesystem;
    /// paths that do not exist yet are treated as directories.
    pub fn add<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let path = canonicalize_lossy(path);
        let is_directory = fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(true);
        self.add_entry(path, is_directory)
    }

    /// Watch `path`, stating its type explicitly.
    pub fn add_with_type<P: AsRef<Path>>(&mut self, path: P, is_directory: bool) -> bool {
        self.add_entry(canonicalize_lossy(path), is_directory)
    }

    /// Watch `root` and every directory below it, skipping directories whose
    /// path matches one of `skip`. Returns the number of entries added.
    pub fn add_tree<P: AsRef<Path>>(&mut self, root: P, skip: &[Pattern]) -> usize {
        let root = root.as_ref();
        let mut added = 0usize;
        let walker = WalkDir::new(root).follow_links(false).into_iter();
        for entry in walker.filter_entry(|e| !skip.iter().any(|p| p.matches_path(e.path()))) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("skipping unreadable entry under {}: {e}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if !self.add_with_type(entry.path(), true) {
                // limit reached; everything deeper would be refused too
                break;
            }
            added += 1;
        }
        info!(root = %root.display(), added, "tree added");
        added
    }

    /// Stop watching exactly `path`.
    pub fn remove<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let path = canonicalize_lossy(path);
        let Some(entry) = self.table.remove(&path) else {
            return false;
        };
        self.release(entry);
        self.forget_under(&path);
        debug!(path = %path.display(), total = self.table.len(), "watch removed");
        true
    }

    /// Stop watching `path` and every entry below it.
    pub fn remove_recursively<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let path = canonicalize_lossy(path);
        let removed = self.table.remove_subtree(&path);
        let count = removed.len();
        for entry in removed {
            self.release(entry);
        }
        self.forget_under(&path);
        debug!(path = %path.display(), count, total = self.table.len(), "watches removed");
        count > 0
    }

    /// `true` while `path` has an entry, monitoring is enabled and the
    /// entry holds a live subscription.
    pub fn is_watched<P: AsRef<Path>>(&self, path: P) -> bool {
        if !self.enabled {
            return false;
        }
        let path = canonicalize_lossy(path);
        self.table.get(&path).is_some_and(WatchEntry::has_token)
    }

    pub fn is_watched_by_string(&self, path: &str) -> bool {
        self.is_watched(Path::new(path))
    }

    /// Number of entries, live or not.
    pub fn get_count(&self) -> usize {
        self.table.len()
    }

    /// Adds refused because the monitor limit was reached.
    pub fn get_ignored(&self) -> usize {
        self.ignored
    }

    pub fn get_limit(&self) -> Option<usize> {
        self.config.monitor_limit
    }

    /// Logical paths of all entries, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.table.paths().map(Path::to_path_buf).collect()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Receiving end of the semantic event stream.
    pub fn events(&self) -> Receiver<MonitorEvent> {
        self.rx.clone()
    }

    // ────── event loop ────────────────────────────────────────────────────

    /// Wait up to `timeout` for raw events, handle at most `batch_size` of
    /// them and fire whatever timers are due. Returns the number of raw
    /// events handled.
    pub fn poll(&mut self, timeout: Duration) -> usize {
        let give_up = Instant::now() + timeout;
        let rx = self.backend.receiver().clone();
        let batch = self.config.batch_size.max(1);
        let mut handled = 0usize;

        loop {
            let now = Instant::now();
            self.tick(now);
            if now >= give_up {
                break;
            }
            let wake = self.next_deadline().map_or(give_up, |d| d.min(give_up));

            let mut closed = false;
            select! {
                recv(rx) -> msg => match msg {
                    Ok(msg) => {
                        self.handle_message(msg, &mut handled);
                        while handled < batch {
                            let Ok(next) = rx.try_recv() else { break };
                            self.handle_message(next, &mut handled);
                        }
                    }
                    Err(_) => closed = true,
                },
                recv(after(wake.saturating_duration_since(now))) -> _ => {}
            }

            if closed {
                debug!("backend channel closed");
                break;
            }
            if handled > 0 {
                break;
            }
        }

        self.tick(Instant::now());
        handled
    }

    /// Earliest instant at which [`Monitor::tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.pairer.next_deadline(), self.coalescer.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire timers: unpaired moves older than the pairing window become
    /// deletions and quiet cached changes are emitted.
    pub fn tick(&mut self, now: Instant) {
        for change in self.coalescer.due(now) {
            self.emit_change(change);
        }
        for pending in self.pairer.expire(now) {
            self.expire_move(pending, now);
        }
    }

    /// Resolve everything still waiting: cached changes are emitted and
    /// unpaired moves become deletions.
    pub fn flush(&mut self) {
        let now = Instant::now();
        for change in self.coalescer.drain() {
            self.emit_change(change);
        }
        for pending in self.pairer.expire(now + self.config.pairing_window()) {
            self.expire_move(pending, now);
        }
    }

    /// Normalize one raw event.
    pub fn dispatch(&mut self, raw: RawEvent, now: Instant) {
        if !self.enabled {
            trace!(?raw, "dropped while disabled");
            return;
        }
        let Some(base) = self.table.path_for_token(raw.token) else {
            trace!(?raw, "dropped: stale token");
            return;
        };
        let path = resolve_relative(base, &raw.name);
        trace!(kind = ?raw.kind, path = %path.display(), cookie = ?raw.cookie, "raw event");

        match raw.kind {
            RawEventKind::Created => {
                let is_directory = self.resolve_is_directory(&path, raw.is_directory);
                self.coalescer
                    .note(path, is_directory, ChangeKind::Created, now);
            }
            RawEventKind::Changed | RawEventKind::AttributeChanged => {
                let is_directory = self.resolve_is_directory(&path, raw.is_directory);
                self.coalescer
                    .note(path, is_directory, ChangeKind::Updated, now);
            }
            RawEventKind::Deleted => {
                if raw.is_self() && self.parent_covered(&path) {
                    trace!(path = %path.display(), "self-delete left to the parent");
                    return;
                }
                let is_directory = self.resolve_is_directory(&path, raw.is_directory);
                self.handle_deleted(path, is_directory, now);
            }
            RawEventKind::MovedFrom => {
                if raw.is_self() {
                    trace!(path = %path.display(), "self-move left to the parent");
                    return;
                }
                let is_directory = self.resolve_is_directory(&path, raw.is_directory);
                self.flush_under(&path);

                if let Some(dest) = raw.other_path {
                    let dest = normalize_lexical(&dest);
                    if self.table.covers(&dest) {
                        self.complete_move(path, dest, is_directory);
                    } else {
                        self.expire_move(
                            PendingMove {
                                from_path: path,
                                from_is_directory: is_directory,
                                arrival_time: now,
                            },
                            now,
                        );
                    }
                    return;
                }

                for evicted in self.pairer.moved_from(path, is_directory, raw.cookie, now) {
                    debug!(from = %evicted.from_path.display(), "pending move evicted");
                    self.expire_move(evicted, now);
                }
            }
            RawEventKind::MovedTo => {
                if raw.is_self() {
                    trace!(path = %path.display(), "self-move left to the parent");
                    return;
                }
                match self.pairer.moved_to(raw.cookie) {
                    Some(pending) => {
                        let is_directory =
                            pending.from_is_directory || raw.is_directory.unwrap_or(false) || path.is_dir();
                        self.complete_move(pending.from_path, path, is_directory);
                    }
                    None => {
                        // content entering the watched set from outside
                        let is_directory = self.resolve_is_directory(&path, raw.is_directory);
                        if let Some(cached) = self.coalescer.take(&path) {
                            self.emit_change(cached);
                        }
                        self.coalescer.forget_deleted(&path);
                        self.emit(MonitorEvent::Created { path, is_directory });
                    }
                }
            }
        }
    }

    // ────── internals ─────────────────────────────────────────────────────

    fn add_entry(&mut self, path: PathBuf, is_directory: bool) -> bool {
        if self.table.contains(&path) {
            let needs_retry =
                self.enabled && self.table.get(&path).is_some_and(|e| !e.has_token());
            if needs_retry {
                if let Some(token) = self.subscribe(&path) {
                    if let Some(stale) = self.table.set_token(&path, Some(token)) {
                        self.backend.unsubscribe(stale);
                    }
                    debug!(path = %path.display(), "subscription restored");
                }
            }
            return true;
        }

        if let Some(limit) = self.config.monitor_limit {
            if self.table.len() >= limit {
                self.ignored += 1;
                if !self.limit_warned {
                    warn!(
                        limit,
                        path = %path.display(),
                        "monitor limit reached; further directories will not be watched"
                    );
                    self.limit_warned = true;
                }
                return false;
            }
        }

        let token = if self.enabled { self.subscribe(&path) } else { None };
        let entry = WatchEntry::new(path.clone(), is_directory, token);
        if let Some(displaced) = self.table.insert(entry) {
            self.release(displaced);
        }
        debug!(
            path = %path.display(),
            is_directory,
            total = self.table.len(),
            "watch added"
        );
        true
    }

    fn subscribe(&mut self, path: &Path) -> Option<WatchToken> {
        match self.backend.subscribe(path) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("could not watch {}: {e}; keeping it unwatched", path.display());
                None
            }
        }
    }

    /// Follow a remapped entry with its subscription. A subscription that
    /// cannot follow is released and the record kept, as after a failed add.
    fn relocate(&mut self, path: &Path, id: TokenId) {
        if let Err(e) = self.backend.relocate(id, path) {
            warn!("could not keep watching {}: {e}; keeping it unwatched", path.display());
            if let Some(token) = self.table.set_token(path, None) {
                self.backend.unsubscribe(token);
            }
        }
    }

    fn release(&mut self, mut entry: WatchEntry) {
        if let Some(token) = entry.take_token() {
            self.backend.unsubscribe(token);
        }
    }

    /// After a removal: pending moves and cached changes nobody watches any
    /// more are dropped. Whatever is still covered resolves as usual.
    fn forget_under(&mut self, path: &Path) {
        let table = &self.table;
        let cancelled = self.pairer.retain(|p| table.covers(&p.from_path));
        let dropped = self.coalescer.retain(|p| table.covers(p));
        if cancelled + dropped > 0 {
            debug!(path = %path.display(), cancelled, dropped, "in-flight state discarded");
        }
        if let Some(limit) = self.config.monitor_limit {
            if self.table.len() < limit {
                self.limit_warned = false;
            }
        }
    }

    fn handle_message(&mut self, msg: crate::backend::RawMessage, handled: &mut usize) {
        match msg {
            Ok(raw) => {
                self.dispatch(raw, Instant::now());
                *handled += 1;
            }
            Err(e) => warn!("backend error: {e}"),
        }
    }

    fn handle_deleted(&mut self, path: PathBuf, is_directory: bool, now: Instant) {
        // created and gone within one quiet window: only the deletion shows
        if let Some(cached) = self.coalescer.take(&path) {
            match cached.kind {
                ChangeKind::Created => {
                    trace!(path = %path.display(), "pending create superseded by delete");
                }
                ChangeKind::Updated => self.emit_change(cached),
            }
        }
        self.flush_under(&path);
        if self.coalescer.note_deleted(&path, now) {
            self.emit(MonitorEvent::Deleted {
                path: path.clone(),
                is_directory,
            });
        } else {
            trace!(path = %path.display(), "duplicate delete suppressed");
        }
        self.drop_subtree(&path);
    }

    /// The rename is resolved with both ends known.
    fn complete_move(&mut self, from: PathBuf, to: PathBuf, is_directory: bool) {
        self.flush_under(&from);
        if let Some(cached) = self.coalescer.take(&to) {
            self.emit_change(cached);
        }
        self.coalescer.forget_deleted(&to);

        let entry_is_directory = self.table.get(&from).map(|e| e.is_directory);
        match entry_is_directory {
            Some(false) => {
                // a directly watched file does not follow its name
                if let Some(entry) = self.table.remove(&from) {
                    self.release(entry);
                }
            }
            _ if is_directory || entry_is_directory == Some(true) => {
                let (moved, displaced) = self.table.rebase(&from, &to);
                // displaced tokens share the destination names, so they go
                // before the moved subscriptions are re-armed there
                for entry in displaced {
                    self.release(entry);
                }
                for (path, id) in &moved {
                    if let Some(id) = id {
                        self.relocate(path, *id);
                    }
                }
                if !moved.is_empty() {
                    debug!(
                        from = %from.display(),
                        to = %to.display(),
                        remapped = moved.len(),
                        "watches remapped"
                    );
                }
            }
            _ => {}
        }

        self.emit(MonitorEvent::Moved {
            from,
            to,
            is_directory,
            is_source_monitored: true,
        });
    }

    /// A move that will never be paired is reported as a deletion.
    fn expire_move(&mut self, pending: PendingMove, now: Instant) {
        let PendingMove {
            from_path,
            from_is_directory,
            ..
        } = pending;
        debug!(from = %from_path.display(), "move left the watched set");
        self.handle_deleted(from_path, from_is_directory, now);
    }

    fn drop_subtree(&mut self, path: &Path) {
        let dropped = self.table.remove_subtree(path);
        if dropped.is_empty() {
            return;
        }
        let count = dropped.len();
        for entry in dropped {
            self.release(entry);
        }
        debug!(path = %path.display(), count, "watches dropped with their path");
    }

    fn flush_under(&mut self, path: &Path) {
        for change in self.coalescer.take_under(path) {
            self.emit_change(change);
        }
    }

    fn parent_covered(&self, path: &Path) -> bool {
        path.parent()
            .and_then(|parent| self.table.get(parent))
            .is_some_and(|e| e.is_directory)
    }

    /// Backend hint first, then a live stat, then what the table knows.
    fn resolve_is_directory(&self, path: &Path, hint: Option<bool>) -> bool {
        if let Some(hint) = hint {
            return hint;
        }
        if let Ok(meta) = fs::symlink_metadata(path) {
            return meta.is_dir();
        }
        self.table.get(path).is_some_and(|e| e.is_directory)
    }

    fn emit_change(&self, change: CachedChange) {
        let CachedChange {
            path,
            is_directory,
            kind,
            ..
        } = change;
        let event = match kind {
            ChangeKind::Created => MonitorEvent::Created { path, is_directory },
            ChangeKind::Updated => MonitorEvent::Updated { path, is_directory },
        };
        self.emit(event);
    }

    fn emit(&self, event: MonitorEvent) {
        debug!("{event}");
        // the receiver lives in `self`, so the send cannot fail
        let _ = self.tx.send(event);
    }
}

impl<B: Backend> Drop for Monitor<B> {
    fn drop(&mut self) {
        for (_, token) in self.table.drain_tokens() {
            self.backend.unsubscribe(token);
        }
    }
}

impl<B: Backend> std::fmt::Debug for Monitor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("backend", &self.backend.name())
            .field("enabled", &self.enabled)
            .field("entries", &self.table.len())
            .field("pending_moves", &self.pairer.len())
            .field("cached_changes", &self.coalescer.len())
            .field("ignored", &self.ignored)
            .finish()
    }
}
