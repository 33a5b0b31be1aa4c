//! Serial execution contexts
//!
//! An [`ExecutionContext`] is anything that runs submitted jobs one at a
//! time and can say whether the caller already runs on it.
//! [`Store::dispatch_on`](crate::Store::dispatch_on) uses it to hop onto a
//! designated context before dispatching.
//!
//! [`SerialQueue`] is the stock implementation: one named worker thread
//! draining a channel of jobs in submission order.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::affinity::{self, ContextTag};
use crate::error::QueueError;

/// A unit of work submitted to an execution context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serial execution context.
pub trait ExecutionContext: Send + Sync {
    /// Identity used by [`affinity::is_current_context`].
    fn tag(&self) -> &ContextTag;

    /// Run `job` on this context with mutual exclusion against every other
    /// job on it, blocking the caller until the job has run.
    ///
    /// Callers already on this context must not use this (it would wait on
    /// itself); check [`affinity::is_current_context`] first.
    fn barrier_sync(&self, job: Job) -> Result<(), QueueError>;
}

/// A named worker thread running jobs strictly one after another.
///
/// Every job is exclusive on a serial queue, so barrier submissions and
/// plain submissions behave the same here.
#[derive(Debug)]
pub struct SerialQueue {
    label: String,
    tag: Arc<ContextTag>,
    tx: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
    /// Spawn the worker thread for a new queue.
    pub fn new(label: impl Into<String>) -> Result<Self, QueueError> {
        let label = label.into();
        let tag = Arc::new(ContextTag::new());
        let (tx, rx) = mpsc::channel::<Job>();

        let worker_tag = Arc::clone(&tag);
        let worker_label = label.clone();
        let worker = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                log::debug!("Serial queue '{}' started", worker_label);
                let _scope = affinity::enter(&worker_tag);
                for job in rx {
                    job();
                }
                log::debug!("Serial queue '{}' stopped", worker_label);
            })
            .map_err(|source| QueueError::Spawn {
                label: label.clone(),
                source,
            })?;

        Ok(Self {
            label,
            tag,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the calling code runs on this queue.
    pub fn is_current(&self) -> bool {
        affinity::is_current_tag(&self.tag)
    }

    /// Submit a job without waiting for it.
    pub fn exec(&self, job: impl FnOnce() + Send + 'static) -> Result<(), QueueError> {
        self.submit(Box::new(job))
    }

    /// Run `f` on the queue and return its result.
    ///
    /// Runs inline when already on the queue instead of waiting on itself.
    pub fn exec_sync<R, F>(&self, f: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return Ok(f());
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.submit(Box::new(move || {
            // The waiter only disappears if it panicked; nothing to report to.
            let _ = reply_tx.send(f());
        }))?;
        reply_rx.recv().map_err(|_| self.closed())
    }

    /// Stop accepting jobs, let queued jobs finish and join the worker.
    ///
    /// Called from the queue itself, the worker is detached instead of
    /// joined.
    pub fn shutdown(&self) {
        self.sender().take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if self.is_current() {
                return;
            }
            if worker.join().is_err() {
                log::error!("Serial queue '{}' worker panicked", self.label);
            }
        }
    }

    fn submit(&self, job: Job) -> Result<(), QueueError> {
        let sender = self.sender();
        let tx = sender.as_ref().ok_or_else(|| self.closed())?;
        tx.send(job).map_err(|_| self.closed())
    }

    fn sender(&self) -> MutexGuard<'_, Option<Sender<Job>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed(&self) -> QueueError {
        QueueError::Closed(self.label.clone())
    }
}

impl ExecutionContext for SerialQueue {
    fn tag(&self) -> &ContextTag {
        &self.tag
    }

    fn barrier_sync(&self, job: Job) -> Result<(), QueueError> {
        self.exec_sync(job)
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_jobs_run_in_submission_order() {
        let queue = SerialQueue::new("order").unwrap();
        assert_eq!(queue.label(), "order");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20 {
            let seen = Arc::clone(&seen);
            queue.exec(move || seen.lock().unwrap().push(i)).unwrap();
        }
        queue.exec_sync(|| ()).unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_exec_sync_returns_value_and_is_on_queue() {
        let queue = Arc::new(SerialQueue::new("value").unwrap());
        assert!(!queue.is_current());

        let handle = Arc::clone(&queue);
        let (value, on_queue) = queue.exec_sync(move || (42, handle.is_current())).unwrap();
        assert_eq!(value, 42);
        assert!(on_queue);
    }

    #[test]
    fn test_nested_exec_sync_runs_inline() {
        let queue = Arc::new(SerialQueue::new("nested").unwrap());
        let inner = Arc::clone(&queue);

        let result = queue
            .exec_sync(move || inner.exec_sync(|| "inline").unwrap())
            .unwrap();
        assert_eq!(result, "inline");
    }

    #[test]
    fn test_barrier_sync_waits_for_earlier_jobs() {
        let queue = SerialQueue::new("barrier").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            queue
                .exec(move || {
                    thread::sleep(std::time::Duration::from_millis(2));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        let observed = Arc::new(AtomicUsize::new(0));
        let (counter_in, observed_in) = (Arc::clone(&counter), Arc::clone(&observed));
        queue
            .barrier_sync(Box::new(move || {
                observed_in.store(counter_in.load(Ordering::SeqCst), Ordering::SeqCst);
            }))
            .unwrap();

        assert_eq!(observed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let queue = SerialQueue::new("closed").unwrap();
        queue.shutdown();

        assert!(matches!(queue.exec(|| ()), Err(QueueError::Closed(label)) if label == "closed"));
        assert!(queue.exec_sync(|| ()).is_err());
    }
}
