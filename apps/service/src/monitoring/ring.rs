use std::collections::VecDeque;

use crate::database::models::Failure;

/// Fixed-capacity history of a service's most recent failures, newest first.
#[derive(Debug, Clone)]
pub struct FailureRing {
    capacity: usize,
    entries: VecDeque<Failure>,
}

impl FailureRing {
    pub const DEFAULT_CAPACITY: usize = 5;

    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: VecDeque::with_capacity(capacity) }
    }

    /// Replace the contents with `failures` (newest first), keeping at most
    /// `capacity` of them.
    pub fn seed(&mut self, failures: impl IntoIterator<Item = Failure>) {
        self.entries.clear();
        self.entries.extend(failures.into_iter().take(self.capacity));
    }

    /// Prepend a failure, evicting the oldest entry once full
    pub fn push(&mut self, failure: Failure) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(failure);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Failure> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Failure> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FailureRing {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::error::Reason;
    use chrono::Utc;

    fn failure(n: usize) -> Failure {
        Failure::new(1, format!("failure #{n}"), Reason::Connection, 0, 0, Utc::now())
    }

    #[test]
    fn test_ring_keeps_last_n_newest_first() {
        let capacity = 4;
        let mut ring = FailureRing::new(capacity);
        for n in 0..capacity + 3 {
            ring.push(failure(n));
        }

        assert_eq!(ring.len(), capacity);
        let issues: Vec<_> = ring.iter().map(|f| f.issue.as_str()).collect();
        assert_eq!(issues, ["failure #6", "failure #5", "failure #4", "failure #3"]);
        assert_eq!(ring.latest().map(|f| f.issue.as_str()), Some("failure #6"));
    }

    #[test]
    fn test_zero_capacity_ring_stays_empty() {
        let mut ring = FailureRing::new(0);
        ring.push(failure(1));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_seed_truncates_to_capacity() {
        let mut ring = FailureRing::new(2);
        ring.seed((0..5).map(failure));
        let issues: Vec<_> = ring.iter().map(|f| f.issue.as_str()).collect();
        assert_eq!(issues, ["failure #0", "failure #1"]);
    }
}
