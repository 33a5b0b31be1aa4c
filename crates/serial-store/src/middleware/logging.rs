use crate::action::Action;
use crate::middleware::Middleware;
use crate::store::Store;

/// LoggingMiddleware - logs all actions passing through a store
///
/// Never vetoes. Attach it first to see every action, including the ones
/// later middleware rejects.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl<S: 'static> Middleware<S> for LoggingMiddleware {
    fn should_execute(&self, store: &Store<S>, action: &dyn Action<State = S>) -> bool {
        log::debug!("Store '{}': action {:?}", store.label(), action);
        true
    }

    fn did_execute(&self, store: &Store<S>, action: &dyn Action<State = S>) {
        log::trace!("Store '{}': finished {}", store.label(), action.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Completion;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Quit;

    impl Action for Quit {
        type State = bool;

        fn execute(self: Arc<Self>, store: &Store<bool>, done: Completion) {
            store.update(|running| *running = false);
            done.complete();
        }
    }

    #[test]
    fn test_logging_middleware() {
        let middleware = LoggingMiddleware;
        let store = Store::new(true);

        assert!(middleware.should_execute(&store, &Quit));
        middleware.did_execute(&store, &Quit);
    }

    #[test]
    fn test_logging_middleware_does_not_block_store() {
        let store = Store::builder(true).middleware(LoggingMiddleware::new()).build();

        store.dispatch(Quit);
        assert!(!store.snapshot());
    }
}
