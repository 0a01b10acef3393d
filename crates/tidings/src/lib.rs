//! Tidings: in-process publish/subscribe for decoupling components.
//!
//! Handlers are registered against event keys and run synchronously, in
//! registration order, on the thread that publishes. There is no process-wide
//! bus; every [`Dispatcher`] owns its own tables.
//!
//! # Key Forms
//!
//! - Exact: `"user.created"`, `42i64`, or a [`Symbol`]
//! - Namespace: `"user.*"` matches `"user.created"` but not `"user:login"`;
//!   `"user:*"` matches `"user:login"`
//! - Global: `"*"` matches everything and handlers receive the key
//!
//! # Publish Order
//!
//! For `emit("app:user.created", ..)`:
//!
//! ```text
//! exact "app:user.created"
//!   -> namespace "app:*"
//!   -> namespace "app:user.*"
//!   -> global "*"
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tidings::{Dispatcher, WaitOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tidings::DispatchError> {
//! let bus: Dispatcher<u32> = Dispatcher::new();
//!
//! bus.on_fn("job.*", |progress| {
//!     tracing::info!(?progress, "job update");
//!     Ok(())
//! });
//!
//! let done = bus.wait_for(
//!     "job.progress",
//!     WaitOptions::new()
//!         .filter(|p: Option<&u32>| p.is_some_and(|v| *v >= 100))
//!         .timeout(Duration::from_secs(5)),
//! );
//!
//! bus.emit("job.progress", 40)?;
//! bus.emit("job.progress", 100)?;
//! assert_eq!(done.await?, Some(100));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod key;
pub mod listener;
pub mod subscription;
pub mod wait;

mod tables;

// Re-export primary types at crate root.
pub use config::{DispatcherConfig, ErrorPolicy};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult};
pub use key::{EventKey, Route, Symbol, GLOBAL_WILDCARD, NAMESPACE_SEPARATORS};
pub use listener::{HandlerResult, Listener};
pub use subscription::Subscription;
pub use wait::{WaitFor, WaitOptions};
