//! Actions and their completion continuation
//!
//! An action is one intended mutation of one store type. Its body receives
//! the store and a [`Completion`]; it may finish synchronously or hand the
//! completion to a spawned task and finish much later. Until the completion
//! fires, no other action on the same store starts.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serial_store::{Action, Completion, Store};
//!
//! #[derive(Debug)]
//! struct Add(i64);
//!
//! impl Action for Add {
//!     type State = i64;
//!
//!     fn execute(self: Arc<Self>, store: &Store<i64>, done: Completion) {
//!         store.update(|total| *total += self.0);
//!         done.complete();
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::store::Store;

/// Callback fired once when a dispatched action has been handled.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// A unit of intended mutation bound to one store state type.
///
/// Actions run as `Arc<Self>` so middleware can still observe the action
/// after its body has finished.
pub trait Action: fmt::Debug + Send + Sync + 'static {
    /// State type of the store this action mutates.
    type State;

    /// Perform the mutation, then fire `done` exactly once.
    ///
    /// Every path out of the body (success, early return, async callback)
    /// must end in [`Completion::complete`]. A body that never completes
    /// stalls the store for good.
    fn execute(self: Arc<Self>, store: &Store<Self::State>, done: Completion);

    /// Name used in logs and by middleware.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Continuation handed to an action body.
///
/// Consumed by [`complete`](Self::complete), so it can fire at most once.
/// Dropping it unfired is logged as an error: the store stays busy and
/// every action queued behind this one waits forever.
#[must_use = "an action that never completes stalls its store"]
pub struct Completion {
    action: &'static str,
    store: Arc<str>,
    continuation: Option<Callback>,
}

impl Completion {
    pub(crate) fn new(action: &'static str, store: Arc<str>, continuation: Callback) -> Self {
        Self {
            action,
            store,
            continuation: Some(continuation),
        }
    }

    /// Signal that the action body is finished.
    pub fn complete(mut self) {
        if let Some(continuation) = self.continuation.take() {
            continuation();
        }
    }

    /// Name of the action this completion belongs to.
    pub fn action(&self) -> &'static str {
        self.action
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("action", &self.action)
            .field("store", &self.store)
            .field("fired", &self.continuation.is_none())
            .finish()
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.continuation.is_some() {
            log::error!(
                "Action {} dropped its completion without firing it; store '{}' is stalled",
                self.action,
                self.store
            );
        }
    }
}
