use std::collections::VecDeque;

use convoy_api::Event;

/// Returned by `peek_front`/`drop_front` when fewer events are buffered
/// than requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient data: requested {requested}, available {available}")]
pub struct InsufficientData {
    pub requested: usize,
    pub available: usize,
}

/// Ordered in-process collection of decoded events, insertion order =
/// arrival order.
///
/// Flush always operates on the oldest events (FIFO), so later batches
/// never contain records older than an earlier batch's. The buffer itself
/// is not synchronized — the accumulator owns it behind a lock.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    events: VecDeque<Event>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clone the oldest `n` events without removing them.
    pub fn peek_front(&self, n: usize) -> Result<Vec<Event>, InsufficientData> {
        if self.events.len() < n {
            return Err(InsufficientData {
                requested: n,
                available: self.events.len(),
            });
        }
        Ok(self.events.iter().take(n).cloned().collect())
    }

    /// Remove the oldest `n` events.
    pub fn drop_front(&mut self, n: usize) -> Result<(), InsufficientData> {
        if self.events.len() < n {
            return Err(InsufficientData {
                requested: n,
                available: self.events.len(),
            });
        }
        self.events.drain(..n);
        Ok(())
    }
}
