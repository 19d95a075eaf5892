//! Pending-change queue shared by the change detector and the transfer worker.
//!
//! Each intent kind has its own FIFO partition. A partition behaves as an
//! ordered set keyed by path: while an entry waits, further events for the
//! same path are absorbed into it. Once the worker has peeked an entry it is
//! "in flight"; a new event for that path then queues a fresh entry behind the
//! others, because the file changed after the transfer started.

use crate::file_op::{IntentKind, SyncIntent};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

/// Identifies the entry handed out by [`ChangeQueue::peek_oldest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// The oldest entry of a partition, as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub ticket: Ticket,
    pub intent: SyncIntent,
    /// Failed transfer attempts so far.
    pub attempts: u32,
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    path: PathBuf,
    attempts: u32,
}

#[derive(Debug, Default)]
struct Partition {
    entries: VecDeque<Entry>,
    /// Paths that have an entry which is not in flight.
    waiting: HashSet<PathBuf>,
    in_flight: Option<u64>,
}

impl Partition {
    fn front_if(&mut self, ticket: Ticket) -> Option<&mut Entry> {
        self.entries.front_mut().filter(|e| e.seq == ticket.0)
    }
}

#[derive(Debug, Default)]
struct Partitions {
    uploads: Partition,
    deletes: Partition,
    next_seq: u64,
}

impl Partitions {
    fn get(&self, kind: IntentKind) -> &Partition {
        match kind {
            IntentKind::Upload => &self.uploads,
            IntentKind::Delete => &self.deletes,
        }
    }

    fn get_mut(&mut self, kind: IntentKind) -> &mut Partition {
        match kind {
            IntentKind::Upload => &mut self.uploads,
            IntentKind::Delete => &mut self.deletes,
        }
    }
}

/// Lock-guarded store of pending intents. The lock is only ever held for the
/// in-memory mutation.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    inner: Mutex<Partitions>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an intent. Returns `false` when an equal intent is already
    /// waiting and the new one was absorbed.
    pub fn enqueue(&self, intent: SyncIntent) -> bool {
        let mut inner = self.inner.lock();
        if inner.get(intent.kind).waiting.contains(&intent.path) {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let part = inner.get_mut(intent.kind);
        part.waiting.insert(intent.path.clone());
        part.entries.push_back(Entry {
            seq,
            path: intent.path,
            attempts: 0,
        });
        true
    }

    /// Return the oldest entry of `kind` without removing it, and mark it in
    /// flight.
    pub fn peek_oldest(&self, kind: IntentKind) -> Option<Pending> {
        let mut inner = self.inner.lock();
        let part = inner.get_mut(kind);
        let front = part.entries.front()?;
        let pending = Pending {
            ticket: Ticket(front.seq),
            intent: SyncIntent {
                path: front.path.clone(),
                kind,
            },
            attempts: front.attempts,
        };
        if part.in_flight != Some(front.seq) {
            part.waiting.remove(&pending.intent.path);
            part.in_flight = Some(front.seq);
        }
        Some(pending)
    }

    /// Remove the entry previously returned by [`ChangeQueue::peek_oldest`].
    /// Returns `false` if that entry is no longer at the front.
    pub fn remove_oldest(&self, kind: IntentKind, ticket: Ticket) -> bool {
        let mut inner = self.inner.lock();
        let part = inner.get_mut(kind);
        if part.front_if(ticket).is_none() {
            return false;
        }
        if let Some(entry) = part.entries.pop_front() {
            if part.in_flight == Some(entry.seq) {
                part.in_flight = None;
            } else {
                part.waiting.remove(&entry.path);
            }
        }
        true
    }

    /// Put a peeked entry back in the waiting state after a failed transfer.
    ///
    /// The entry keeps its place at the front. If the same path was queued
    /// again while it was in flight, that later entry is folded into it.
    pub fn record_failure(&self, kind: IntentKind, ticket: Ticket) -> bool {
        let mut inner = self.inner.lock();
        let part = inner.get_mut(kind);
        let path = match part.front_if(ticket) {
            Some(entry) => {
                entry.attempts = entry.attempts.saturating_add(1);
                entry.path.clone()
            }
            None => return false,
        };
        part.in_flight = None;
        if part.waiting.contains(&path) {
            if let Some(pos) = part.entries.iter().skip(1).position(|e| e.path == path) {
                part.entries.remove(pos + 1);
            }
        } else {
            part.waiting.insert(path);
        }
        true
    }

    /// Ordered copy of the paths queued for `kind`, oldest first.
    pub fn snapshot(&self, kind: IntentKind) -> Vec<PathBuf> {
        self.inner
            .lock()
            .get(kind)
            .entries
            .iter()
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn len(&self, kind: IntentKind) -> usize {
        self.inner.lock().get(kind).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.uploads.entries.is_empty() && inner.deletes.entries.is_empty()
    }
}
