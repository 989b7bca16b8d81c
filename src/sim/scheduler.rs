//! Wake-time queue for multi-rate stepped entities.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Min-heap of pending wake times.
///
/// Hard invariant: before a next wake time is selected, every entry at
/// or before the current time is popped. Duplicate times coalesce during
/// that drain, and a selected time is always strictly in the future.
#[derive(Debug, Default)]
pub struct WakeQueue {
    heap: BinaryHeap<Reverse<u64>>,
}

impl WakeQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Schedules a wake time.
    pub fn push(&mut self, time: u64) {
        self.heap.push(Reverse(time));
    }

    /// Drains every entry at or before `now`, then returns the earliest
    /// remaining time, if any.
    ///
    /// The returned time stays in the queue; it is drained by the call
    /// that reaches it.
    pub fn next_after(&mut self, now: u64) -> Option<u64> {
        while let Some(&Reverse(time)) = self.heap.peek() {
            if time <= now {
                self.heap.pop();
            } else {
                break;
            }
        }
        self.heap.peek().map(|&Reverse(time)| time)
    }

    /// Pending entries, drained or not.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
