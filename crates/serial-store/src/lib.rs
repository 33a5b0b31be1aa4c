//! Single-writer action dispatch store
//!
//! A [`Store`] owns one piece of state and accepts [`Action`]s that mutate
//! it. Actions run one at a time, in dispatch order, even when their bodies
//! are asynchronous: the next action only starts once the previous one has
//! fired its [`Completion`].
//!
//! This crate provides:
//! - [`Store`] / [`StoreBuilder`]: state holder, dispatch entry points
//! - [`Middleware`] / [`MiddlewareChain`]: pre-check and post-notify hooks
//! - [`SerialQueue`] / [`ExecutionContext`]: serial contexts for
//!   [`Store::dispatch_on`], with [`affinity`] detection
//! - [`StoreConfig`]: configuration loaded from TOML
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serial_store::{Action, Completion, Disposition, LoggingMiddleware, Store};
//!
//! #[derive(Debug)]
//! struct Push(&'static str);
//!
//! impl Action for Push {
//!     type State = Vec<&'static str>;
//!
//!     fn execute(self: Arc<Self>, store: &Store<Vec<&'static str>>, done: Completion) {
//!         store.update(|items| items.push(self.0));
//!         done.complete();
//!     }
//! }
//!
//! let store = Store::builder(Vec::new())
//!     .label("todo")
//!     .middleware(LoggingMiddleware::new())
//!     .build();
//!
//! assert_eq!(store.dispatch(Push("write tests")), Disposition::Started);
//! assert_eq!(store.snapshot(), vec!["write tests"]);
//! ```

pub mod action;
pub mod affinity;
pub mod config;
mod controller;
pub mod error;
pub mod middleware;
pub mod pending;
mod runner;
pub mod serial_queue;
pub mod store;

pub use action::{Action, Callback, Completion};
pub use affinity::{is_current_context, ContextTag};
pub use config::{ReentrancyPolicy, StoreConfig};
pub use controller::{Disposition, FlushPhase};
pub use error::{ConfigError, QueueError, WaitError};
pub use middleware::{LoggingMiddleware, Middleware, MiddlewareChain};
pub use pending::PendingQueue;
pub use serial_queue::{ExecutionContext, Job, SerialQueue};
pub use store::{Store, StoreBuilder, StoreId, WeakStore};
