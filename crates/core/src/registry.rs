//! Process-lifetime record of pull requests already handed to a worker.
//!
//! A number is recorded when it is *submitted*, not when its merge
//! completes, so a slow merge is never queued twice. Nothing is persisted;
//! a restart starts from an empty registry.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ProcessedRegistry {
    seen: Mutex<HashSet<u64>>,
}

impl ProcessedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically record `pr_number`. Returns `true` if it was not already
    /// present, i.e. the caller now owns submitting it.
    pub fn insert_new(&self, pr_number: u64) -> bool {
        self.lock().insert(pr_number)
    }

    pub fn contains(&self, pr_number: u64) -> bool {
        self.lock().contains(&pr_number)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted snapshot of the recorded numbers.
    pub fn snapshot(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self.lock().iter().copied().collect();
        numbers.sort_unstable();
        numbers
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<u64>> {
        // A panic while holding this lock cannot leave the set half-updated.
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_new_only_once() {
        let registry = ProcessedRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.insert_new(12));
        assert!(!registry.insert_new(12));
        assert!(registry.contains(12));
        assert!(!registry.contains(13));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_sorted() {
        let registry = ProcessedRegistry::new();
        for n in [9, 2, 5] {
            registry.insert_new(n);
        }
        assert_eq!(registry.snapshot(), vec![2, 5, 9]);
    }

    #[test]
    fn test_concurrent_insert_has_single_winner() {
        let registry = Arc::new(ProcessedRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.insert_new(42))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
