//! Dispatch controller and flush cycle
//!
//! Owns the "is an action running" flag and the pending queue, and decides
//! for every dispatch whether it runs now or waits its turn.
//!
//! ```text
//! Idle ──dispatch──► Running ──finish──► Draining ──pop──► Running
//!   ▲                                       │
//!   └───────────────queue empty─────────────┘
//! ```
//!
//! The next unit starts as soon as the previous one fires its [`Finish`],
//! whether that happens long after the body returned or while the body is
//! still running on another thread. No lock is held while a unit runs.
//! Units that finish on the thread running them, before their body returns,
//! do not recurse: that thread picks the next one up in a loop. A finish
//! fired from any other thread takes over and runs the next unit itself.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use crate::pending::PendingQueue;

/// Deferred dispatch waiting in the pending queue.
pub(crate) type Unit = Box<dyn FnOnce(Finish) + Send + 'static>;

/// Outcome of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The store was idle; the action body began before `dispatch` returned.
    Started,
    /// Another action was in flight; this one waits in the queue.
    Queued,
}

/// Where a store is in its flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPhase {
    /// Nothing running, nothing queued.
    Idle,
    /// One action is executing.
    Running,
    /// The current action finished and the next one has not started yet.
    Draining,
}

/// Signals the controller that the running unit is done.
///
/// Holds only a weak reference; finishing after the controller is gone is
/// a no-op.
pub(crate) struct Finish {
    controller: Weak<DispatchController>,
}

impl Finish {
    pub(crate) fn finish(self) {
        if let Some(controller) = self.controller.upgrade() {
            controller.flush();
        }
    }
}

#[derive(Debug, Default)]
struct Gate {
    /// True from the first dispatch until the queue is found empty.
    dispatching: bool,
    /// A unit has started and not finished yet.
    in_flight: bool,
    /// Bumped every time a unit starts.
    epoch: u64,
    /// Thread inside the call of the current unit, if it is still there.
    driver: Option<ThreadId>,
    /// The current unit finished on `driver` before its call returned.
    resumed: bool,
}

impl Gate {
    /// Mark a new unit as started by the calling thread; returns its epoch.
    fn start(&mut self) -> u64 {
        self.in_flight = true;
        self.epoch = self.epoch.wrapping_add(1);
        self.driver = Some(thread::current().id());
        self.resumed = false;
        self.epoch
    }
}

pub(crate) struct DispatchController {
    label: Arc<str>,
    backlog_warning: usize,
    gate: Mutex<Gate>,
    pending: PendingQueue<Unit>,
}

impl DispatchController {
    pub(crate) fn new(label: Arc<str>, backlog_warning: usize) -> Self {
        Self {
            label,
            backlog_warning,
            gate: Mutex::new(Gate::default()),
            pending: PendingQueue::new(),
        }
    }

    /// Run `unit` now if the store is idle, otherwise queue it.
    pub(crate) fn dispatch(self: &Arc<Self>, unit: Unit) -> Disposition {
        let mut gate = self.lock_gate();
        if gate.dispatching {
            let waiting = self.pending.enqueue(unit);
            drop(gate);
            log::debug!("Store '{}': queued action ({} waiting)", self.label, waiting);
            if self.backlog_warning > 0 && waiting == self.backlog_warning {
                log::warn!(
                    "Store '{}': {} actions waiting behind the running one",
                    self.label,
                    waiting
                );
            }
            return Disposition::Queued;
        }

        gate.dispatching = true;
        let epoch = gate.start();
        drop(gate);

        self.drive(unit, epoch);
        Disposition::Started
    }

    pub(crate) fn is_dispatching(&self) -> bool {
        self.lock_gate().dispatching
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn phase(&self) -> FlushPhase {
        let gate = self.lock_gate();
        match (gate.dispatching, gate.in_flight) {
            (false, _) => FlushPhase::Idle,
            (true, true) => FlushPhase::Running,
            (true, false) => FlushPhase::Draining,
        }
    }

    /// Completion hook of the running unit: start the next one or go idle.
    fn flush(self: &Arc<Self>) {
        let mut gate = self.lock_gate();
        gate.in_flight = false;
        if gate.driver == Some(thread::current().id()) {
            // Finished inline; the driving thread continues once the unit
            // call returns.
            gate.resumed = true;
            return;
        }

        // Finished elsewhere: whoever is still inside the old unit call is
        // superseded, this thread drives from here on.
        match self.pending.dequeue() {
            Some(next) => {
                let epoch = gate.start();
                drop(gate);
                self.drive(next, epoch);
            }
            None => {
                gate.dispatching = false;
                gate.driver = None;
                drop(gate);
                log::debug!("Store '{}': idle", self.label);
            }
        }
    }

    /// Run units until one finishes off this thread or the queue runs dry.
    ///
    /// Must be entered right after [`Gate::start`] returned `epoch`.
    fn drive(self: &Arc<Self>, first: Unit, mut epoch: u64) {
        let mut unit = first;
        loop {
            unit(Finish {
                controller: Arc::downgrade(self),
            });

            let mut gate = self.lock_gate();
            if gate.epoch != epoch {
                // Another thread finished the unit and moved on.
                return;
            }
            if !gate.resumed {
                // Still running asynchronously; its finish will drive on.
                gate.driver = None;
                return;
            }

            match self.pending.dequeue() {
                Some(next) => {
                    epoch = gate.start();
                    unit = next;
                }
                None => {
                    gate.dispatching = false;
                    gate.driver = None;
                    gate.resumed = false;
                    drop(gate);
                    log::debug!("Store '{}': idle", self.label);
                    return;
                }
            }
        }
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    type Journal = Arc<Mutex<Vec<&'static str>>>;
    type Parked = Arc<Mutex<Vec<Finish>>>;

    fn controller() -> Arc<DispatchController> {
        Arc::new(DispatchController::new(Arc::from("test"), 0))
    }

    fn sync_unit(journal: &Journal, name: &'static str) -> Unit {
        let journal = Arc::clone(journal);
        Box::new(move |finish| {
            journal.lock().unwrap().push(name);
            finish.finish();
        })
    }

    fn parked_unit(journal: &Journal, parked: &Parked, name: &'static str) -> Unit {
        let journal = Arc::clone(journal);
        let parked = Arc::clone(parked);
        Box::new(move |finish| {
            journal.lock().unwrap().push(name);
            parked.lock().unwrap().push(finish);
        })
    }

    fn release(parked: &Parked) {
        let finish = parked.lock().unwrap().pop().expect("nothing parked");
        finish.finish();
    }

    #[test]
    fn test_idle_dispatch_runs_inline() {
        let controller = controller();
        let journal = Journal::default();

        assert_eq!(controller.phase(), FlushPhase::Idle);
        assert_eq!(
            controller.dispatch(sync_unit(&journal, "a")),
            Disposition::Started
        );
        assert_eq!(*journal.lock().unwrap(), vec!["a"]);
        assert_eq!(controller.phase(), FlushPhase::Idle);
        assert!(!controller.is_dispatching());
    }

    #[test]
    fn test_busy_dispatch_queues_until_finish() {
        let controller = controller();
        let journal = Journal::default();
        let parked = Parked::default();

        controller.dispatch(parked_unit(&journal, &parked, "a"));
        assert_eq!(controller.phase(), FlushPhase::Running);

        assert_eq!(
            controller.dispatch(sync_unit(&journal, "b")),
            Disposition::Queued
        );
        assert_eq!(
            controller.dispatch(parked_unit(&journal, &parked, "c")),
            Disposition::Queued
        );
        assert_eq!(controller.pending_len(), 2);
        assert_eq!(*journal.lock().unwrap(), vec!["a"]);

        release(&parked);
        assert_eq!(*journal.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(controller.phase(), FlushPhase::Running);

        release(&parked);
        assert_eq!(controller.phase(), FlushPhase::Idle);
        assert_eq!(controller.pending_len(), 0);
    }

    #[test]
    fn test_long_sync_queue_drains_without_recursion() {
        let controller = controller();
        let journal = Journal::default();
        let parked = Parked::default();
        let ran = Arc::new(AtomicUsize::new(0));

        controller.dispatch(parked_unit(&journal, &parked, "gate"));
        for _ in 0..100_000 {
            let ran = Arc::clone(&ran);
            controller.dispatch(Box::new(move |finish: Finish| {
                ran.fetch_add(1, Ordering::Relaxed);
                finish.finish();
            }));
        }

        release(&parked);
        assert_eq!(ran.load(Ordering::Relaxed), 100_000);
        assert_eq!(controller.phase(), FlushPhase::Idle);
    }

    #[test]
    fn test_finish_from_other_thread_drives_next() {
        let controller = controller();
        let journal = Journal::default();
        let parked = Parked::default();

        controller.dispatch(parked_unit(&journal, &parked, "a"));
        controller.dispatch(sync_unit(&journal, "b"));

        let finish = parked.lock().unwrap().pop().unwrap();
        thread::spawn(move || finish.finish()).join().unwrap();

        assert_eq!(*journal.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(controller.phase(), FlushPhase::Idle);
    }

    #[test]
    fn test_finish_off_thread_starts_next_while_body_runs() {
        let controller = controller();
        let journal = Journal::default();
        let parked = Parked::default();
        let (began_tx, began_rx) = mpsc::channel();
        let saw_next = Arc::new(AtomicBool::new(false));

        controller.dispatch(parked_unit(&journal, &parked, "gate"));

        let (body_journal, flag) = (Arc::clone(&journal), Arc::clone(&saw_next));
        controller.dispatch(Box::new(move |finish: Finish| {
            body_journal.lock().unwrap().push("a");
            thread::spawn(move || finish.finish()).join().unwrap();
            let began = began_rx.recv_timeout(Duration::from_secs(2)).is_ok();
            flag.store(began, Ordering::SeqCst);
        }));

        let next_journal = Arc::clone(&journal);
        controller.dispatch(Box::new(move |finish: Finish| {
            next_journal.lock().unwrap().push("b");
            began_tx.send(()).unwrap();
            finish.finish();
        }));
        controller.dispatch(sync_unit(&journal, "c"));

        release(&parked);
        assert!(saw_next.load(Ordering::SeqCst));
        assert_eq!(*journal.lock().unwrap(), vec!["gate", "a", "b", "c"]);
        assert_eq!(controller.phase(), FlushPhase::Idle);
        assert_eq!(controller.pending_len(), 0);
    }

    #[test]
    fn test_finish_after_controller_dropped_is_noop() {
        let controller = controller();
        let journal = Journal::default();
        let parked = Parked::default();

        controller.dispatch(parked_unit(&journal, &parked, "a"));
        controller.dispatch(sync_unit(&journal, "b"));
        drop(controller);

        release(&parked);
        assert_eq!(*journal.lock().unwrap(), vec!["a"]);
    }
}
