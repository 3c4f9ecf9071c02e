//! The level-by-level task scheduler (component §4.8): Config (0) ->
//! Repart (1) -> SuperK per sample (2) -> Count per sample/partition (3)
//! -> Merge per partition (4) -> Format per sample (5). Each level is a
//! fence: every task at level N must finish (or the run must be
//! cancelled) before level N+1 tasks are submitted, since partitioning and
//! merging both need every sample's prior stage complete.

use std::sync::{Arc, Mutex};

use crate::error::KmtricksError;
use crate::signals::CancellationToken;
use crate::taskpool::{Task, TaskPool};

/// A unit of work bound to a DAG level, wrapping a fallible closure so the
/// scheduler can surface the first error without panicking worker threads.
pub struct LevelTask<F>
where
    F: FnOnce() -> Result<(), KmtricksError> + Send + 'static,
{
    label: String,
    body: F,
    errors: Arc<Mutex<Vec<(String, KmtricksError)>>>,
}

impl<F> Task for LevelTask<F>
where
    F: FnOnce() -> Result<(), KmtricksError> + Send + 'static,
{
    fn run(self: Box<Self>) {
        if let Err(e) = (self.body)() {
            self.errors
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((self.label, e));
        }
    }
}

/// Drives the pipeline's five fences. Each `run_level` call blocks until
/// every task submitted in it has completed.
pub struct Scheduler {
    pool: TaskPool,
    cancel: CancellationToken,
    errors: Arc<Mutex<Vec<(String, KmtricksError)>>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(workers: usize, queue_capacity: usize, cancel: CancellationToken) -> Self {
        Self {
            pool: TaskPool::new(workers, queue_capacity, cancel.clone()),
            cancel,
            errors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Runs a batch of same-level closures to completion before returning.
    /// Uses a fresh bounded channel internally via a one-shot barrier: each
    /// task decrements a countdown on completion and the caller waits on
    /// it, which is simpler to reason about than draining the pool's
    /// shared queue mid-pipeline.
    pub fn run_level<F>(&self, label: &str, tasks: Vec<F>)
    where
        F: FnOnce() -> Result<(), KmtricksError> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return;
        }
        let remaining = Arc::new((Mutex::new(tasks.len()), std::sync::Condvar::new()));
        for (i, body) in tasks.into_iter().enumerate() {
            let errors = Arc::clone(&self.errors);
            let remaining = Arc::clone(&remaining);
            let task_label = format!("{label}#{i}");
            let wrapped = move || {
                let result = body();
                let (lock, cvar) = &*remaining;
                let mut count = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                *count -= 1;
                cvar.notify_all();
                result
            };
            self.pool.submit(Box::new(LevelTask {
                label: task_label,
                body: wrapped,
                errors,
            }));
        }
        let (lock, cvar) = &*remaining;
        let mut count = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while *count > 0 {
            count = cvar
                .wait(count)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Returns the (label, error) pairs accumulated across all levels run
    /// so far, in completion order.
    #[must_use]
    pub fn errors(self) -> Vec<(String, KmtricksError)> {
        self.pool.join_all();
        Arc::try_unwrap(self.errors)
            .map(|m| m.into_inner().unwrap_or_default())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn run_level_waits_for_all_tasks() {
        let scheduler = Scheduler::new(2, 8, CancellationToken::new());
        let counter = Arc::new(AtomicU64::new(0));
        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let counter = Arc::clone(&counter);
                move || -> Result<(), KmtricksError> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .collect();
        scheduler.run_level("test", tasks);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn errors_are_collected_not_panicked() {
        let scheduler = Scheduler::new(1, 4, CancellationToken::new());
        scheduler.run_level(
            "fails",
            vec![|| {
                Err(KmtricksError::Pipeline {
                    details: "boom".to_string(),
                })
            }],
        );
        let errors = scheduler.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "fails#0");
    }

    #[test]
    fn cancelled_scheduler_skips_new_levels() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let scheduler = Scheduler::new(1, 4, cancel);
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        scheduler.run_level(
            "skip",
            vec![move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }],
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
