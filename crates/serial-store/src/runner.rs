//! Execution of a single action
//!
//! 1. Pre-check: every middleware in order, stopping at the first veto.
//! 2. Vetoed: skip the body.
//! 3. Approved: run the body with a [`Completion`] continuation.
//! 4. Once handled: post-notify every middleware, then fire the completion.
//!
//! The completion handed in here is what advances the store's queue, so
//! the next action starts when the body signals completion, not when
//! [`execute`] returns.

use std::cell::RefCell;
use std::sync::Arc;

use crate::action::{Action, Callback, Completion};
use crate::store::{Store, StoreId};

thread_local! {
    /// Stores whose pre-check is running on this thread, innermost last.
    static PRE_CHECKING: RefCell<Vec<StoreId>> = const { RefCell::new(Vec::new()) };
}

/// Whether `store`'s middleware pre-check is running on this thread.
pub(crate) fn in_pre_check(store: StoreId) -> bool {
    PRE_CHECKING.with(|stack| stack.borrow().contains(&store))
}

/// Pops the pre-check marker even if a middleware panics.
struct PreCheckScope;

impl PreCheckScope {
    fn enter(store: StoreId) -> Self {
        PRE_CHECKING.with(|stack| stack.borrow_mut().push(store));
        Self
    }
}

impl Drop for PreCheckScope {
    fn drop(&mut self) {
        PRE_CHECKING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

pub(crate) fn execute<A>(store: &Store<A::State>, action: Arc<A>, completion: Callback)
where
    A: Action,
    A::State: Send + 'static,
{
    let approved = {
        let _scope = PreCheckScope::enter(store.id());
        store.middleware().should_execute(store, &*action)
    };

    if !approved {
        store.middleware().did_execute(store, &*action);
        completion();
        return;
    }

    let weak = store.downgrade();
    let observed = Arc::clone(&action);
    let done = Completion::new(
        action.name(),
        store.shared_label(),
        Box::new(move || {
            match weak.upgrade() {
                Some(store) => store.middleware().did_execute(&store, &*observed),
                None => log::debug!(
                    "Store dropped while {} was running; skipping post-notify",
                    observed.name()
                ),
            }
            completion();
        }),
    );

    log::debug!("Store '{}': executing {}", store.label(), action.name());
    action.execute(store, done);
}
