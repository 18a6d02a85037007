//! Bounded worker pool for bulk operations
//!
//! At most `size` units run at once. `run` returns only after every unit
//! has finished, and each unit's outcome is reported on its own: one
//! failing unit never cancels its siblings.

use crate::error::{AclError, Result};
use crossbeam::channel;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        WorkerPool { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Apply `f` to every item, returning outcomes in input order
    pub fn run<T, R, F>(&self, items: &[T], f: F) -> Vec<Result<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let workers = self.size.min(items.len());
        let (tx, rx) = channel::bounded::<usize>(items.len());
        for index in 0..items.len() {
            // Capacity equals the item count, so this never blocks
            let _ = tx.send(index);
        }
        drop(tx);

        let slots: Mutex<Vec<Option<Result<R>>>> =
            Mutex::new((0..items.len()).map(|_| None).collect());

        debug!("Dispatching {} units over {} workers", items.len(), workers);

        let scoped = crossbeam::scope(|scope| {
            for _ in 0..workers {
                let rx = rx.clone();
                let slots = &slots;
                let f = &f;
                scope.spawn(move |_| {
                    while let Ok(index) = rx.recv() {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&items[index])))
                            .unwrap_or_else(|_| {
                                warn!("Worker unit {} panicked", index);
                                Err(AclError::Internal(format!("worker unit {} panicked", index)))
                            });
                        slots.lock()[index] = Some(outcome);
                    }
                });
            }
        });

        if scoped.is_err() {
            warn!("Worker pool scope reported a panicked thread");
        }

        slots
            .into_inner()
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    Err(AclError::Internal(format!("worker unit {} never ran", index)))
                })
            })
            .collect()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        WorkerPool::new(8)
    }
}

/// Per-item outcome of a bulk call
#[derive(Debug)]
pub struct BulkOutcome<K> {
    pub succeeded: Vec<K>,
    pub failed: Vec<(K, AclError)>,
}

impl<K> BulkOutcome<K> {
    pub fn from_results<R>(keys: impl IntoIterator<Item = K>, results: Vec<Result<R>>) -> Self {
        let mut outcome = BulkOutcome {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(_) => outcome.succeeded.push(key),
                Err(err) => outcome.failed.push((key, err)),
            }
        }
        outcome
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

impl<K: fmt::Display> BulkOutcome<K> {
    /// Collapse to the first failure, if any
    pub fn into_result(self) -> Result<Vec<K>> {
        match self.failed.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(self.succeeded),
        }
    }

    /// One line per failed item
    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|(key, err)| format!("{}: {}", key, err))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_results_in_input_order() {
        let pool = WorkerPool::new(4);
        let items: Vec<u32> = (0..50).collect();
        let results = pool.run(&items, |n| Ok(n * 2));
        let doubled: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(doubled, items.iter().map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(3);
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u32> = (0..24).collect();

        pool.run(&items, |_| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_failures_do_not_abort_siblings() {
        let pool = WorkerPool::new(2);
        let items = vec!["a", "missing", "c"];
        let results = pool.run(&items, |name| {
            if *name == "missing" {
                Err(AclError::not_found("backup", name))
            } else {
                Ok(())
            }
        });

        let outcome = BulkOutcome::from_results(items.iter().map(|s| s.to_string()), results);
        assert_eq!(outcome.succeeded, vec!["a", "c"]);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failure_summary().contains("missing"));
        assert!(outcome.into_result().unwrap_err().is_not_found());
    }

    #[test]
    fn test_panicking_unit_is_reported() {
        let pool = WorkerPool::new(2);
        let items = vec![1, 2, 3];
        let results = pool.run(&items, |n| {
            if *n == 2 {
                panic!("boom");
            }
            Ok(*n)
        });
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(AclError::Internal(_))));
        assert!(results[2].is_ok());
    }
}
