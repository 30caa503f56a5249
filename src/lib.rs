//! Duplicate function call suppression.
//!
//! A [`Group`] forms a namespace in which units of work can be executed with
//! duplicate suppression: while the work for a key is running, every other
//! caller asking for the same key waits for it and receives the same result
//! instead of running the work again. Once the work finishes the key is free,
//! and the next call runs the work afresh. Results are not cached.
//!
//! ```
//! use singleflight::Group;
//!
//! let group = Group::new();
//! let outcome = group.work("config", || Ok::<_, std::io::Error>(42));
//! assert_eq!(outcome.result.unwrap(), 42);
//! assert!(!outcome.shared);
//! ```
//!
//! Three ways of calling in are offered: [`Group::work`] blocks the calling
//! thread, [`Group::work_async`] awaits a future, and [`Group::work_chan`] runs
//! the work on a worker thread and hands back a [`Handle`]. Callers of all
//! three attach to the same in-flight calls. [`Group::forget`] detaches a key
//! from its in-flight call so the next caller starts a new one.

use std::sync::Arc;

mod call;
mod error;
mod group;
mod handle;
mod types;
mod utils;

pub use error::FlightError;
pub use group::Group;
pub use handle::Handle;
pub use types::{Options, Outcome};

/// A failure as delivered to every caller of one execution.
///
/// The work's own error is converted into an [`anyhow::Error`] once and the
/// same allocation is shared, so `downcast_ref` recovers the original value.
pub type SharedError = Arc<anyhow::Error>;

/// Result of one execution, as handed to each of its callers.
pub type Result<T> = core::result::Result<T, SharedError>;
