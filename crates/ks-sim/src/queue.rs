//! Pending event executions.
//!
//! Provides:
//! - `EventExecution`, one scheduled run of an event's assignments
//! - `EventQueue`, ordered by time, then priority, then insertion

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ks_core::{EventId, Real};

/// A scheduled execution of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventExecution {
    pub event: EventId,
    /// Time at which the assignments are due.
    pub time: Real,
    /// Evaluated priority. `None` ranks below any explicit priority.
    pub priority: Option<Real>,
    /// Assignment values captured when the trigger fired, in the order of
    /// the event's assignments. `None` means evaluate at execution time.
    pub values: Option<Vec<Real>>,
}

impl EventExecution {
    fn rank(&self) -> Real {
        match self.priority {
            Some(p) if !p.is_nan() => p,
            _ => Real::NEG_INFINITY,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    exec: EventExecution,
    seq: u64,
}

// BinaryHeap pops the greatest entry, so "greater" means "runs first".
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .exec
            .time
            .total_cmp(&self.exec.time)
            .then_with(|| self.exec.rank().total_cmp(&other.exec.rank()))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

/// Priority queue of pending executions.
///
/// Ties on time are broken by higher priority first, then by insertion
/// order, so popping is deterministic.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, exec: EventExecution) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { exec, seq });
    }

    /// Remove and return the execution that runs first.
    pub fn pop(&mut self) -> Option<EventExecution> {
        self.heap.pop().map(|e| e.exec)
    }

    pub fn peek(&self) -> Option<&EventExecution> {
        self.heap.peek().map(|e| &e.exec)
    }

    /// Due time of the execution that runs first.
    pub fn peek_next_time(&self) -> Option<Real> {
        self.peek().map(|e| e.time)
    }

    /// Drop every pending execution of `event`; returns how many were dropped.
    pub fn remove_by_id(&mut self, event: EventId) -> usize {
        let before = self.heap.len();
        self.heap.retain(|e| e.exec.event != event);
        before - self.heap.len()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_seq = 0;
    }

    /// Pending executions in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &EventExecution> {
        self.heap.iter().map(|e| &e.exec)
    }
}
