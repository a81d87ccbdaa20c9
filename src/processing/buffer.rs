// BoundedHistory - fixed-capacity history of processed samples
//
// Single writer (the pipeline), many readers (statistics, CLI, tests).
// Readers always receive owned snapshots so they never observe a torn buffer.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::processing::ProcessedSample;

#[derive(Debug)]
struct HistoryState {
    samples: VecDeque<ProcessedSample>,
    capacity: usize,
}

/// Ring-semantics history: oldest sample evicted first
#[derive(Debug)]
pub struct BoundedHistory {
    state: Mutex<HistoryState>,
}

impl BoundedHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(HistoryState {
                samples: VecDeque::with_capacity(capacity.min(4096)),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Change the capacity, evicting the oldest samples if it shrinks
    pub fn set_capacity(&self, capacity: usize) {
        let mut state = self.lock();
        state.capacity = capacity.max(1);
        while state.samples.len() > state.capacity {
            state.samples.pop_front();
        }
    }

    pub fn append(&self, sample: ProcessedSample) {
        let mut state = self.lock();
        if state.samples.len() >= state.capacity {
            state.samples.pop_front();
        }
        state.samples.push_back(sample);
    }

    /// The `n` most recent samples, oldest first
    pub fn get_latest(&self, n: usize) -> Vec<ProcessedSample> {
        let state = self.lock();
        let samples = &state.samples;
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).cloned().collect()
    }

    /// Samples in `start..end`, clamped to the current length
    pub fn get_range(&self, start: usize, end: usize) -> Vec<ProcessedSample> {
        let state = self.lock();
        let samples = &state.samples;
        let end = end.min(samples.len());
        if start >= end {
            return Vec::new();
        }
        samples.range(start..end).cloned().collect()
    }

    pub fn get_all(&self) -> Vec<ProcessedSample> {
        self.lock().samples.iter().cloned().collect()
    }

    /// Effective values of the `n` most recent samples, oldest first
    pub fn latest_values(&self, n: usize) -> Vec<f64> {
        let state = self.lock();
        let samples = &state.samples;
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).map(ProcessedSample::value).collect()
    }

    /// Raw values of the `n` most recent samples, oldest first
    pub fn latest_raw_values(&self, n: usize) -> Vec<f64> {
        let state = self.lock();
        let samples = &state.samples;
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).map(|s| s.raw_value).collect()
    }

    pub fn clear(&self) {
        self.lock().samples.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().samples.is_empty()
    }

    // Mutations never panic midway, so a poisoned deque is still consistent.
    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample(raw: f64) -> ProcessedSample {
        ProcessedSample {
            timestamp: raw,
            raw_value: raw,
            filtered_value: None,
            calibrated_value: None,
            quality_score: 1.0,
        }
    }

    #[test]
    fn retains_most_recent_in_arrival_order() {
        let history = BoundedHistory::new(5);
        for i in 0..12 {
            history.append(sample(i as f64));
        }
        assert_eq!(history.len(), 5);
        let raws: Vec<f64> = history.get_all().iter().map(|s| s.raw_value).collect();
        assert_eq!(raws, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn latest_and_range_are_clamped() {
        let history = BoundedHistory::new(10);
        for i in 0..4 {
            history.append(sample(i as f64));
        }
        assert_eq!(history.get_latest(2).len(), 2);
        assert_eq!(history.get_latest(2)[0].raw_value, 2.0);
        assert_eq!(history.get_latest(100).len(), 4);
        assert_eq!(history.get_range(1, 3).len(), 2);
        assert_eq!(history.get_range(2, 100).len(), 2);
        assert!(history.get_range(3, 1).is_empty());
        assert_eq!(history.latest_values(3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn shrinking_capacity_evicts_oldest() {
        let history = BoundedHistory::new(10);
        for i in 0..8 {
            history.append(sample(i as f64));
        }
        history.set_capacity(3);
        assert_eq!(history.len(), 3);
        assert_eq!(history.get_all()[0].raw_value, 5.0);
    }

    #[test]
    fn clear_empties_history() {
        let history = BoundedHistory::new(3);
        history.append(sample(1.0));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 3);
    }

    #[test]
    fn concurrent_readers_see_bounded_snapshots() {
        let history = Arc::new(BoundedHistory::new(100));
        let reader = {
            let history = Arc::clone(&history);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    assert!(history.get_all().len() <= 100);
                }
            })
        };
        for i in 0..1000 {
            history.append(sample(i as f64));
        }
        reader.join().unwrap();
        assert_eq!(history.len(), 100);
    }
}
