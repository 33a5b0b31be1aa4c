//! Middleware around action execution
//!
//! Middleware is consulted twice for every action a store runs:
//!
//! ```text
//! dispatch → should_execute (all, short-circuit) → action body → did_execute (all) → completion
//! ```
//!
//! Each middleware can:
//! - Inspect the store and the candidate action
//! - Veto the action before its body runs (return `false`)
//! - Observe that the action finished (logging, analytics, ...)
//!
//! Both hooks run synchronously on the context executing the action.
//! `did_execute` fires for every action, including vetoed ones.
//!
//! ## Example
//!
//! ```rust
//! use serial_store::{Action, Middleware, Store};
//!
//! struct ReadOnlyGuard;
//!
//! impl Middleware<Vec<String>> for ReadOnlyGuard {
//!     fn should_execute(
//!         &self,
//!         _store: &Store<Vec<String>>,
//!         action: &dyn Action<State = Vec<String>>,
//!     ) -> bool {
//!         !action.name().ends_with("Delete")
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::action::Action;
use crate::store::Store;

mod logging;

pub use logging::LoggingMiddleware;

/// Interceptor consulted before and after each action on a store.
///
/// Both hooks default to no-ops, so implementors only override the phase
/// they care about. Neither hook may dispatch onto the same store
/// synchronously from `should_execute`; see
/// [`ReentrancyPolicy`](crate::ReentrancyPolicy).
pub trait Middleware<S>: Send + Sync {
    /// Return `false` to veto the action. Later middleware is not consulted.
    fn should_execute(&self, _store: &Store<S>, _action: &dyn Action<State = S>) -> bool {
        true
    }

    /// Called after the action is handled, before its completion fires.
    fn did_execute(&self, _store: &Store<S>, _action: &dyn Action<State = S>) {}

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Ordered list of middleware shared by a store.
///
/// Attachment order is invocation order for both phases.
pub struct MiddlewareChain<S> {
    middleware: Vec<Arc<dyn Middleware<S>>>,
}

impl<S: 'static> MiddlewareChain<S> {
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
        }
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware<S>>) {
        self.middleware.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// AND-reduce of every `should_execute`, starting from `true` and
    /// stopping at the first veto.
    pub fn should_execute(&self, store: &Store<S>, action: &dyn Action<State = S>) -> bool {
        match self
            .middleware
            .iter()
            .find(|mw| !mw.should_execute(store, action))
        {
            Some(vetoed_by) => {
                log::debug!(
                    "Store '{}': {} vetoed by {}",
                    store.label(),
                    action.name(),
                    vetoed_by.name()
                );
                false
            }
            None => true,
        }
    }

    /// Notify every middleware, without short-circuit.
    pub fn did_execute(&self, store: &Store<S>, action: &dyn Action<State = S>) {
        for mw in &self.middleware {
            mw.did_execute(store, action);
        }
    }
}

impl<S: 'static> Default for MiddlewareChain<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> FromIterator<Arc<dyn Middleware<S>>> for MiddlewareChain<S> {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Middleware<S>>>>(iter: I) -> Self {
        Self {
            middleware: iter.into_iter().collect(),
        }
    }
}
