use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serial_store::{LoggingMiddleware, Middleware, SerialQueue, Store, StoreConfig};

mod counter;
mod logger;

use counter::{Add, AddRemote, Counter, Lock, LockGuard, Tally, Unlock};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init()?;

    log::info!("Starting serial-store-demo");

    let config = StoreConfig::load();
    let tally = Arc::new(Tally::default());

    // Add middleware in order (they execute in this order)
    let store = Store::builder(Counter::default())
        .config(config)
        .middleware(LoggingMiddleware::new())
        .middleware(LockGuard)
        .shared_middleware(Arc::clone(&tally) as Arc<dyn Middleware<Counter>>)
        .build();

    // Runs immediately, then everything below queues behind the remote add.
    store.dispatch(Add(1));
    store.dispatch(AddRemote {
        amount: 10,
        latency: Duration::from_millis(50),
    });
    store.dispatch(Add(2));
    store.dispatch(Lock);
    store.dispatch(Add(100)); // rejected by LockGuard
    store.dispatch(Unlock);

    // Hop onto a dedicated serial queue from a blocking thread.
    let queue = Arc::new(SerialQueue::new("counter-queue")?);
    let (queue_store, dispatch_queue) = (store.clone(), Arc::clone(&queue));
    tokio::task::spawn_blocking(move || {
        log::debug!("Dispatching through queue '{}'", dispatch_queue.label());
        queue_store.dispatch_on(dispatch_queue.as_ref(), Add(5))
    })
    .await
    .context("Dispatch thread panicked")??;

    store
        .dispatch_and_wait(Add(0))
        .await
        .context("Final dispatch was abandoned")?;

    let counter = store.snapshot();
    log::info!(
        "Counter settled at {} after {} handled actions (history {:?})",
        counter.value,
        tally.handled(),
        counter.history
    );

    queue.shutdown();
    log::info!("Exiting serial-store-demo");
    Ok(())
}
