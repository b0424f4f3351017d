//! Pairs `moved_from` with `moved_to`.
//!
//! Every `moved_from` becomes a [`PendingMove`] that waits at most one
//! pairing window for its partner. Backends that supply a cookie get exact
//! correlation; without one, the oldest cookie-less pending move is taken.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PairKey {
    Cookie(usize),
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub from_path: PathBuf,
    pub from_is_directory: bool,
    pub arrival_time: Instant,
}

#[derive(Debug)]
pub struct MovePairer {
    window: Duration,
    capacity: usize,
    pending: HashMap<PairKey, PendingMove>,
    // arrival order, used for cookie-less pairing, eviction and expiry
    order: VecDeque<PairKey>,
}

impl MovePairer {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            pending: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Buffer a `moved_from`. Returns moves evicted to stay within capacity
    /// (and a previous move with the same key, which can never pair now).
    pub fn moved_from(
        &mut self,
        from_path: PathBuf,
        from_is_directory: bool,
        cookie: Option<usize>,
        now: Instant,
    ) -> Vec<PendingMove> {
        let key = match cookie {
            Some(c) => PairKey::Cookie(c),
            None => PairKey::Path(from_path.clone()),
        };

        let mut evicted = Vec::new();
        if let Some(stale) = self.take(&key) {
            evicted.push(stale);
        }

        self.pending.insert(
            key.clone(),
            PendingMove {
                from_path,
                from_is_directory,
                arrival_time: now,
            },
        );
        self.order.push_back(key);

        while self.pending.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => evicted.extend(self.pending.remove(&oldest)),
                None => break,
            }
        }
        evicted
    }

    /// Find the partner for a `moved_to`. `None` means the source was not
    /// watched, so the destination is new content.
    pub fn moved_to(&mut self, cookie: Option<usize>) -> Option<PendingMove> {
        match cookie {
            Some(c) => self.take(&PairKey::Cookie(c)),
            None => {
                let key = self
                    .order
                    .iter()
                    .find(|k| matches!(k, PairKey::Path(_)))
                    .cloned()?;
                self.take(&key)
            }
        }
    }

    /// Pop every move whose window has elapsed, oldest first.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingMove> {
        let mut out = Vec::new();
        while let Some(key) = self.order.front() {
            let Some(p) = self.pending.get(key) else {
                // already consumed
                self.order.pop_front();
                continue;
            };
            if now.saturating_duration_since(p.arrival_time) < self.window {
                break;
            }
            if let Some(key) = self.order.pop_front() {
                out.extend(self.pending.remove(&key));
            }
        }
        out
    }

    /// When the oldest pending move will expire.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|p| p.arrival_time + self.window)
            .min()
    }

    /// Keep only the pending moves `keep` accepts; the rest are dropped
    /// without being resolved. Returns how many were dropped.
    pub fn retain(&mut self, keep: impl Fn(&PendingMove) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| keep(p));
        self.compact();
        before - self.pending.len()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.order.clear();
    }

    fn take(&mut self, key: &PairKey) -> Option<PendingMove> {
        let p = self.pending.remove(key)?;
        self.order.retain(|k| k != key);
        Some(p)
    }

    fn compact(&mut self) {
        let pending = &self.pending;
        self.order.retain(|k| pending.contains_key(k));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn cookie_pairs_exactly() {
        let mut m = MovePairer::new(WINDOW, 16);
        let t0 = Instant::now();
        assert!(m.moved_from(p("/w/a"), false, Some(1), t0).is_empty());
        assert!(m.moved_from(p("/w/b"), false, Some(2), t0).is_empty());

        let got = m.moved_to(Some(2)).expect("paired");
        assert_eq!(got.from_path, p("/w/b"));
        assert_eq!(m.len(), 1);
        assert!(m.moved_to(Some(3)).is_none());
    }

    #[test]
    fn cookieless_pairs_oldest_first() {
        let mut m = MovePairer::new(WINDOW, 16);
        let t0 = Instant::now();
        m.moved_from(p("/w/a"), false, None, t0);
        m.moved_from(p("/w/x"), false, Some(5), t0);
        m.moved_from(p("/w/b"), false, None, t0);

        assert_eq!(m.moved_to(None).unwrap().from_path, p("/w/a"));
        assert_eq!(m.moved_to(None).unwrap().from_path, p("/w/b"));
        // the cookied move is never taken by a cookie-less partner
        assert!(m.moved_to(None).is_none());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn expiry_respects_window() {
        let mut m = MovePairer::new(WINDOW, 16);
        let t0 = Instant::now();
        m.moved_from(p("/w/a"), true, Some(1), t0);
        m.moved_from(p("/w/b"), false, Some(2), t0 + Duration::from_millis(300));

        assert_eq!(m.next_deadline(), Some(t0 + WINDOW));
        assert!(m.expire(t0 + Duration::from_millis(499)).is_empty());

        let gone = m.expire(t0 + WINDOW);
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].from_path, p("/w/a"));
        assert!(gone[0].from_is_directory);

        let gone = m.expire(t0 + Duration::from_secs(5));
        assert_eq!(gone[0].from_path, p("/w/b"));
        assert_eq!(m.len(), 0);
        assert_eq!(m.next_deadline(), None);
    }

    #[test]
    fn paired_moves_do_not_expire() {
        let mut m = MovePairer::new(WINDOW, 16);
        let t0 = Instant::now();
        m.moved_from(p("/w/a"), false, Some(1), t0);
        assert!(m.moved_to(Some(1)).is_some());
        assert!(m.expire(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut m = MovePairer::new(WINDOW, 2);
        let t0 = Instant::now();
        m.moved_from(p("/w/1"), false, Some(1), t0);
        m.moved_from(p("/w/2"), false, Some(2), t0);
        let evicted = m.moved_from(p("/w/3"), false, Some(3), t0);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].from_path, p("/w/1"));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn reused_cookie_evicts_previous() {
        let mut m = MovePairer::new(WINDOW, 8);
        let t0 = Instant::now();
        m.moved_from(p("/w/1"), false, Some(1), t0);
        let evicted = m.moved_from(p("/w/2"), false, Some(1), t0);
        assert_eq!(evicted[0].from_path, p("/w/1"));
        assert_eq!(m.moved_to(Some(1)).unwrap().from_path, p("/w/2"));
    }

    #[test]
    fn retain_drops_rejected_moves_only() {
        let mut m = MovePairer::new(WINDOW, 8);
        let t0 = Instant::now();
        m.moved_from(p("/w/foo/a"), false, Some(1), t0);
        m.moved_from(p("/w/foo"), true, Some(2), t0);
        m.moved_from(p("/w/foobar"), false, Some(3), t0);

        let foo = p("/w/foo");
        assert_eq!(m.retain(|pm| !pm.from_path.starts_with(&foo)), 2);
        assert_eq!(m.len(), 1);
        assert!(m.moved_to(Some(3)).is_some());
        assert!(m.expire(t0 + Duration::from_secs(1)).is_empty());
    }
}
