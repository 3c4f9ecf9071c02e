//! Fixed-size worker pool driving the task scheduler (component §4.8, §9's
//! "OS threads + work queue, no coroutines" design note).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::signals::CancellationToken;

/// One unit of schedulable work. `priority` lets the scheduler bias level-0
/// (config/repartition) work ahead of level-3+ work when both are queued.
pub trait Task: Send + 'static {
    fn priority(&self) -> u8 {
        0
    }
    fn run(self: Box<Self>);
}

enum Message {
    Work(Box<dyn Task>),
    Shutdown,
}

/// A fixed pool of `n` worker threads pulling from a bounded FIFO queue.
/// The bound provides backpressure: [`TaskPool::submit`] blocks once the
/// queue is full rather than letting memory-hungry partitions pile up
/// unboundedly ahead of the workers that will process them.
pub struct TaskPool {
    sender: Sender<Message>,
    handles: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
}

impl TaskPool {
    #[must_use]
    pub fn new(workers: usize, queue_capacity: usize, cancel: CancellationToken) -> Self {
        let (sender, receiver) = bounded::<Message>(queue_capacity.max(1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let handles = (0..workers.max(1))
            .map(|_| {
                let receiver: Receiver<Message> = receiver.clone();
                let in_flight = Arc::clone(&in_flight);
                let cancel = cancel.clone();
                std::thread::spawn(move || {
                    while let Ok(msg) = receiver.recv() {
                        match msg {
                            Message::Shutdown => break,
                            Message::Work(task) => {
                                if cancel.is_cancelled() {
                                    continue;
                                }
                                in_flight.fetch_add(1, Ordering::SeqCst);
                                task.run();
                                in_flight.fetch_sub(1, Ordering::SeqCst);
                            }
                        }
                    }
                })
            })
            .collect();
        Self {
            sender,
            handles,
            in_flight,
        }
    }

    /// Enqueues a task, blocking if the queue is at capacity.
    pub fn submit(&self, task: Box<dyn Task>) {
        let _ = self.sender.send(Message::Work(task));
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Sends a shutdown message per worker and joins all threads. Any work
    /// already queued ahead of the shutdown messages still runs.
    pub fn join_all(self) {
        for _ in &self.handles {
            let _ = self.sender.send(Message::Shutdown);
        }
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct Counting(Arc<AtomicU64>);

    impl Task for Counting {
        fn run(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn runs_all_submitted_tasks() {
        let counter = Arc::new(AtomicU64::new(0));
        let pool = TaskPool::new(2, 8, CancellationToken::new());
        for _ in 0..10 {
            pool.submit(Box::new(Counting(Arc::clone(&counter))));
        }
        pool.join_all();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn cancelled_tasks_are_skipped() {
        let counter = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = TaskPool::new(1, 8, cancel);
        pool.submit(Box::new(Counting(Arc::clone(&counter))));
        pool.join_all();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn in_flight_starts_at_zero() {
        let pool = TaskPool::new(1, 4, CancellationToken::new());
        assert_eq!(pool.in_flight(), 0);
        pool.join_all();
    }
}
