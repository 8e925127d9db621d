// src/dispatch/queue.rs
//! Time-ordered pending queue: earliest `dispatch_at` first, FIFO among equal
//! times via an arrival sequence number.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::event::NotificationRequest;

#[derive(Debug)]
struct Pending {
    dispatch_at: DateTime<Utc>,
    seq: u64,
    request: Arc<NotificationRequest>,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.dispatch_at == other.dispatch_at && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl Ord for Pending {
    // BinaryHeap is a max-heap; reverse so the earliest item is on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dispatch_at
            .cmp(&self.dispatch_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<Pending>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: Arc<NotificationRequest>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Pending {
            dispatch_at: request.dispatch_at(),
            seq,
            request,
        });
    }

    /// Remove and return every item due at `now`, in release order.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<Arc<NotificationRequest>> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|p| p.dispatch_at <= now) {
            if let Some(p) = self.heap.pop() {
                due.push(p.request);
            }
        }
        due
    }

    /// Remove everything regardless of due time, in release order.
    pub fn drain_all(&mut self) -> Vec<Arc<NotificationRequest>> {
        let mut all = Vec::with_capacity(self.heap.len());
        while let Some(p) = self.heap.pop() {
            all.push(p.request);
        }
        all
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|p| p.dispatch_at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Source;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::collections::BTreeMap;

    fn req(title: &str, at: DateTime<Utc>) -> Arc<NotificationRequest> {
        Arc::new(NotificationRequest::new(
            Source::Generic,
            title.to_string(),
            String::new(),
            BTreeMap::new(),
            at,
            at,
        ))
    }

    #[test]
    fn earliest_first_then_fifo() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut q = PendingQueue::new();
        q.push(req("late", t0 + ChronoDuration::seconds(10)));
        q.push(req("a", t0));
        q.push(req("b", t0));

        assert_eq!(q.next_due(), Some(t0));
        let due: Vec<_> = q.pop_due(t0).iter().map(|r| r.title().to_string()).collect();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(q.len(), 1);
        assert!(q.pop_due(t0 + ChronoDuration::seconds(9)).is_empty());

        let rest = q.drain_all();
        assert_eq!(rest[0].title(), "late");
        assert!(q.is_empty());
    }
}
