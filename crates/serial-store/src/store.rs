//! Store - holds one piece of state and serializes the actions mutating it
//!
//! ```text
//! dispatch(action) ─► idle? ──yes──► execute now (caller's thread)
//!                        └──no───► pending queue ─► executed when the
//!                                                   running action completes
//! ```
//!
//! `Store` is a cheap handle; clones share the same state, middleware and
//! queue. Queued work and completion continuations only hold a
//! [`WeakStore`], so dropping every `Store` handle turns whatever was still
//! waiting into silent no-ops.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::oneshot;

use crate::action::{Action, Callback};
use crate::affinity;
use crate::config::{ReentrancyPolicy, StoreConfig};
use crate::controller::{DispatchController, Disposition, Finish, FlushPhase, Unit};
use crate::error::{QueueError, WaitError};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::runner;
use crate::serial_queue::ExecutionContext;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

struct StoreInner<S> {
    id: StoreId,
    label: Arc<str>,
    reentrancy: ReentrancyPolicy,
    state: Mutex<S>,
    middleware: MiddlewareChain<S>,
    controller: Arc<DispatchController>,
}

/// Handle to a single-writer store.
pub struct Store<S> {
    inner: Arc<StoreInner<S>>,
}

/// Non-owning handle to a store.
pub struct WeakStore<S> {
    inner: Weak<StoreInner<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Clone for WeakStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S> WeakStore<S> {
    /// The store, if any handle to it is still alive.
    pub fn upgrade(&self) -> Option<Store<S>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl<S: 'static> std::fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("phase", &self.phase())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl<S: 'static> Store<S> {
    /// Create a store with default configuration and no middleware.
    pub fn new(state: S) -> Self {
        Self::builder(state).build()
    }

    pub fn builder(state: S) -> StoreBuilder<S> {
        StoreBuilder::new(state)
    }

    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn downgrade(&self) -> WeakStore<S> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles point at the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read the state.
    ///
    /// The state lock is held for the duration of `f` and is not reentrant.
    /// Do not dispatch from inside it: on an idle store the action body runs
    /// right there, and a body touching the state deadlocks.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lock_state())
    }

    /// Mutate the state. Meant to be called from action bodies.
    ///
    /// Same locking rules as [`read`](Self::read).
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.lock_state())
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> S
    where
        S: Clone,
    {
        self.lock_state().clone()
    }

    /// True while an action runs or queued actions remain.
    pub fn is_dispatching(&self) -> bool {
        self.inner.controller.is_dispatching()
    }

    /// Number of actions waiting behind the running one.
    pub fn pending_len(&self) -> usize {
        self.inner.controller.pending_len()
    }

    pub fn phase(&self) -> FlushPhase {
        self.inner.controller.phase()
    }

    pub(crate) fn shared_label(&self) -> Arc<str> {
        Arc::clone(&self.inner.label)
    }

    pub(crate) fn middleware(&self) -> &MiddlewareChain<S> {
        &self.inner.middleware
    }

    fn lock_state(&self) -> MutexGuard<'_, S> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: Send + 'static> Store<S> {
    /// Run `action` now if the store is idle, otherwise queue it.
    ///
    /// Actions run one at a time, in the order they were dispatched.
    pub fn dispatch<A>(&self, action: A) -> Disposition
    where
        A: Action<State = S>,
    {
        self.submit(action, None)
    }

    /// Like [`dispatch`](Self::dispatch), calling `completion` once the
    /// action has been handled (executed or vetoed).
    pub fn dispatch_then<A, F>(&self, action: A, completion: F) -> Disposition
    where
        A: Action<State = S>,
        F: FnOnce() + Send + 'static,
    {
        self.submit(action, Some(Box::new(completion)))
    }

    /// Dispatch from `context`.
    ///
    /// Already on `context`: dispatches synchronously right here. Anywhere
    /// else: blocks until `context` has run the dispatch as a barrier job.
    pub fn dispatch_on<C, A>(&self, context: &C, action: A) -> Result<(), QueueError>
    where
        C: ExecutionContext + ?Sized,
        A: Action<State = S>,
    {
        self.submit_on(context, action, None)
    }

    /// Like [`dispatch_on`](Self::dispatch_on), calling `completion` once the
    /// action has been handled.
    pub fn dispatch_on_then<C, A, F>(
        &self,
        context: &C,
        action: A,
        completion: F,
    ) -> Result<(), QueueError>
    where
        C: ExecutionContext + ?Sized,
        A: Action<State = S>,
        F: FnOnce() + Send + 'static,
    {
        self.submit_on(context, action, Some(Box::new(completion)))
    }

    fn submit_on<C, A>(
        &self,
        context: &C,
        action: A,
        completion: Option<Callback>,
    ) -> Result<(), QueueError>
    where
        C: ExecutionContext + ?Sized,
        A: Action<State = S>,
    {
        if affinity::is_current_context(context) {
            self.submit(action, completion);
            return Ok(());
        }

        let weak = self.downgrade();
        context.barrier_sync(Box::new(move || match weak.upgrade() {
            Some(store) => {
                store.submit(action, completion);
            }
            None => log::debug!("Store dropped before {} reached its queue", action.name()),
        }))
    }

    /// Dispatch now and return a future resolving once the action has been
    /// handled.
    ///
    /// The action takes its place in the queue before this returns; the
    /// future does not borrow the store.
    pub fn dispatch_and_wait<A>(
        &self,
        action: A,
    ) -> impl Future<Output = Result<(), WaitError>> + Send + 'static
    where
        A: Action<State = S>,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(
            action,
            Some(Box::new(move || {
                // The waiter may have given up; nothing to do then.
                let _ = tx.send(());
            })),
        );
        async move { rx.await.map_err(|_| WaitError::Abandoned) }
    }

    fn submit<A>(&self, action: A, completion: Option<Callback>) -> Disposition
    where
        A: Action<State = S>,
    {
        if runner::in_pre_check(self.id()) {
            match self.inner.reentrancy {
                ReentrancyPolicy::Enqueue => log::debug!(
                    "Store '{}': {} dispatched from a pre-check, queueing it",
                    self.label(),
                    action.name()
                ),
                ReentrancyPolicy::Panic => panic!(
                    "store '{}': {} dispatched from inside should_execute",
                    self.label(),
                    action.name()
                ),
            }
        }

        let weak = self.downgrade();
        let action = Arc::new(action);
        let unit: Unit = Box::new(move |finish: Finish| {
            let Some(store) = weak.upgrade() else {
                log::debug!("Store dropped before {} ran; skipping it", action.name());
                finish.finish();
                return;
            };
            let completion: Callback = Box::new(move || {
                if let Some(completion) = completion {
                    completion();
                }
                finish.finish();
            });
            runner::execute(&store, action, completion);
        });

        self.inner.controller.dispatch(unit)
    }
}

/// Builder for [`Store`].
pub struct StoreBuilder<S> {
    state: S,
    config: StoreConfig,
    middleware: MiddlewareChain<S>,
}

impl<S: 'static> StoreBuilder<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            config: StoreConfig::default(),
            middleware: MiddlewareChain::new(),
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn reentrancy(mut self, policy: ReentrancyPolicy) -> Self {
        self.config.reentrancy = policy;
        self
    }

    /// Attach middleware. Attachment order is invocation order.
    pub fn middleware(self, middleware: impl Middleware<S> + 'static) -> Self {
        self.shared_middleware(Arc::new(middleware))
    }

    /// Attach middleware that is also shared with other stores or callers.
    pub fn shared_middleware(mut self, middleware: Arc<dyn Middleware<S>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> Store<S> {
        let label: Arc<str> = Arc::from(self.config.label.as_str());
        let id = StoreId(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed));
        log::debug!(
            "Store '{}' created with {} middleware",
            label,
            self.middleware.len()
        );

        Store {
            inner: Arc::new(StoreInner {
                id,
                controller: Arc::new(DispatchController::new(
                    Arc::clone(&label),
                    self.config.backlog_warning,
                )),
                label,
                reentrancy: self.config.reentrancy,
                state: Mutex::new(self.state),
                middleware: self.middleware,
            }),
        }
    }
}
