//! Newest-first status log shared between the run controller and displays.
//!
//! Every mutation bumps a revision on a `watch` channel so presentation layers
//! know when to redraw without polling the entries themselves.

use crate::model::{ReportKind, StatusEntry};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::watch;

#[derive(Default)]
struct FeedInner {
    // Front is the newest entry.
    entries: VecDeque<StatusEntry>,
    next_seq: u64,
}

/// Cheaply cloneable handle; all clones see the same entries.
#[derive(Clone)]
pub struct ReportFeed {
    inner: Arc<Mutex<FeedInner>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for ReportFeed {
    fn default() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(FeedInner::default())),
            revision: Arc::new(revision),
        }
    }
}

/// Local wall-clock time as `HH:MM:SS`, falling back to UTC when the local
/// offset cannot be determined.
pub fn local_time_string() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "--:--:--".into())
}

impl ReportFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FeedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Insert a new entry at the front and notify subscribers.
    pub fn push(&self, message: impl Into<String>, kind: ReportKind) -> u64 {
        let seq = {
            let mut inner = self.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.push_front(StatusEntry {
                seq,
                time: local_time_string(),
                kind,
                message: message.into(),
            });
            seq
        };
        self.bump();
        seq
    }

    pub fn push_plain(&self, message: impl Into<String>) -> u64 {
        self.push(message, ReportKind::Plain)
    }

    /// Drop every entry. Sequence numbers keep increasing afterwards.
    pub fn clear(&self) {
        self.lock().entries.clear();
        self.bump();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Newest-first copy of the feed.
    pub fn snapshot(&self) -> Vec<StatusEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn newest(&self) -> Option<StatusEntry> {
        self.lock().entries.front().cloned()
    }

    /// Entries with `seq >= from`, oldest first.
    pub fn entries_since(&self, from: u64) -> Vec<StatusEntry> {
        self.lock()
            .entries
            .iter()
            .take_while(|e| e.seq >= from)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
