//! Counter store: state, actions and middleware used by the demo

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serial_store::{Action, Completion, Middleware, Store};

#[derive(Debug, Clone, Default)]
pub struct Counter {
    pub value: i64,
    pub locked: bool,
    /// Value after every applied change
    pub history: Vec<i64>,
}

impl Counter {
    fn apply(&mut self, delta: i64) {
        self.value += delta;
        self.history.push(self.value);
    }
}

/// Synchronous change
#[derive(Debug)]
pub struct Add(pub i64);

impl Action for Add {
    type State = Counter;

    fn execute(self: Arc<Self>, store: &Store<Counter>, done: Completion) {
        store.update(|counter| counter.apply(self.0));
        done.complete();
    }
}

/// Change that only lands after a simulated remote round trip
///
/// Spawns onto the ambient Tokio runtime, so it must start on a runtime thread.
#[derive(Debug)]
pub struct AddRemote {
    pub amount: i64,
    pub latency: Duration,
}

impl Action for AddRemote {
    type State = Counter;

    fn execute(self: Arc<Self>, store: &Store<Counter>, done: Completion) {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(self.latency).await;
            store.update(|counter| counter.apply(self.amount));
            log::info!(
                "{} of {} landed after {:?}",
                done.action(),
                self.amount,
                self.latency
            );
            done.complete();
        });
    }
}

#[derive(Debug)]
pub struct Lock;

impl Action for Lock {
    type State = Counter;

    fn execute(self: Arc<Self>, store: &Store<Counter>, done: Completion) {
        store.update(|counter| counter.locked = true);
        done.complete();
    }
}

#[derive(Debug)]
pub struct Unlock;

impl Action for Unlock {
    type State = Counter;

    fn execute(self: Arc<Self>, store: &Store<Counter>, done: Completion) {
        store.update(|counter| counter.locked = false);
        done.complete();
    }
}

/// Vetoes everything but `Unlock` while the counter is locked
pub struct LockGuard;

impl Middleware<Counter> for LockGuard {
    fn should_execute(&self, store: &Store<Counter>, action: &dyn Action<State = Counter>) -> bool {
        let locked = store.read(|counter| counter.locked);
        if locked && action.name() != std::any::type_name::<Unlock>() {
            log::warn!("Counter locked, rejecting {:?}", action);
            return false;
        }
        true
    }
}

/// Counts handled actions
#[derive(Debug, Default)]
pub struct Tally {
    handled: AtomicUsize,
}

impl Tally {
    pub fn handled(&self) -> usize {
        self.handled.load(Ordering::Relaxed)
    }
}

impl Middleware<Counter> for Tally {
    fn did_execute(&self, _store: &Store<Counter>, _action: &dyn Action<State = Counter>) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }
}
