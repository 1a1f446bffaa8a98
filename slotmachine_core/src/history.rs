use crate::{
    error::{Result, SlotError},
    grid::Grid,
    types::{amount, Balance},
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One settled play as remembered in a player's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub timestamp: u64,
    #[serde(with = "amount")]
    pub wager_amount: Balance,
    #[serde(with = "amount")]
    pub payout_amount: Balance,
    pub grid: Grid,
    pub caller_seed: String,
}

/// Oldest-first outcome buffer. Capacity is passed on each append so an
/// operator change takes effect on the next play.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryBuffer {
    entries: VecDeque<Outcome>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// With `capacity == 0` the buffer is unbounded. Otherwise, once the
    /// buffer holds `capacity` or more entries, the single oldest entry is
    /// dropped before the new one is pushed.
    pub fn append(&mut self, outcome: Outcome, capacity: u32) {
        if capacity > 0 && self.entries.len() >= capacity as usize {
            self.entries.pop_front();
        }
        self.entries.push_back(outcome);
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u64) -> Result<&Outcome> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .ok_or(SlotError::IndexOutOfRange {
                provided: index,
                length: self.len(),
            })
    }

    /// Up to `count` entries starting at `start`; `count` is clamped to what
    /// is available, only `start` must be in range.
    pub fn range(&self, start: u64, count: u64) -> Result<Vec<Outcome>> {
        let length = self.len();
        if start >= length {
            return Err(SlotError::IndexOutOfRange {
                provided: start,
                length,
            });
        }
        let take = count.min(length - start) as usize;
        Ok(self
            .entries
            .iter()
            .skip(start as usize)
            .take(take)
            .cloned()
            .collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outcome> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(n: u64) -> Outcome {
        Outcome {
            timestamp: n,
            wager_amount: n as Balance,
            payout_amount: 0,
            grid: Grid::default(),
            caller_seed: format!("seed-{n}"),
        }
    }

    #[test]
    fn capacity_keeps_newest_in_order() {
        let mut history = HistoryBuffer::new();
        for n in 0..5 {
            history.append(outcome(n), 3);
        }
        assert_eq!(history.len(), 3);
        let kept: Vec<u64> = history.iter().map(|o| o.timestamp).collect();
        assert_eq!(kept, vec![2, 3, 4]);
        assert_eq!(history.get(2).unwrap().timestamp, 4);
    }

    #[test]
    fn zero_capacity_is_unbounded() {
        let mut history = HistoryBuffer::new();
        for n in 0..100 {
            history.append(outcome(n), 0);
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.get(0).unwrap().timestamp, 0);
    }

    #[test]
    fn shrinking_capacity_evicts_one_per_append() {
        let mut history = HistoryBuffer::new();
        for n in 0..6 {
            history.append(outcome(n), 0);
        }
        history.append(outcome(6), 2);
        assert_eq!(history.len(), 6);
        assert_eq!(history.get(0).unwrap().timestamp, 1);
    }

    #[test]
    fn get_out_of_range() {
        let mut history = HistoryBuffer::new();
        assert_eq!(
            history.get(0),
            Err(SlotError::IndexOutOfRange { provided: 0, length: 0 })
        );
        history.append(outcome(1), 0);
        assert_eq!(
            history.get(1),
            Err(SlotError::IndexOutOfRange { provided: 1, length: 1 })
        );
    }

    #[test]
    fn range_clamps_count() {
        let mut history = HistoryBuffer::new();
        for n in 0..4 {
            history.append(outcome(n), 0);
        }
        let tail: Vec<u64> = history
            .range(2, 50)
            .unwrap()
            .iter()
            .map(|o| o.timestamp)
            .collect();
        assert_eq!(tail, vec![2, 3]);
        assert!(history.range(1, 0).unwrap().is_empty());
        assert_eq!(
            history.range(4, 1),
            Err(SlotError::IndexOutOfRange { provided: 4, length: 4 })
        );
    }
}
