use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::Arc;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::warn;

use crate::call::Key;
use crate::error::FlightError;
use crate::types::Outcome;

/// Receives the outcome of a [`Group::work_chan`](crate::Group::work_chan) call.
///
/// Resolves exactly once, either by awaiting it or with [`Handle::wait`].
/// Dropping the handle does not stop the work; its outcome is discarded.
#[derive(Debug)]
pub struct Handle<T> {
    key: Key,
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> Handle<T> {
    pub(crate) fn new(key: Key, rx: oneshot::Receiver<Outcome<T>>) -> Self {
        Handle { key, rx }
    }

    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Blocks the current thread until the outcome is ready.
    ///
    /// Safe to call from any thread, including runtime workers, though
    /// awaiting the handle is preferable there.
    pub fn wait(self) -> Outcome<T> {
        futures::executor::block_on(self)
    }

    /// Returns the outcome if it is ready, without blocking.
    pub fn try_take(&mut self) -> Option<Outcome<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(lost(&self.key)),
        }
    }
}

impl<T> Future for Handle<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| lost(&this.key)))
    }
}

/// The call went away without sending, e.g. its job never got to run.
fn lost<T>(key: &Key) -> Outcome<T> {
    warn!(key = %key, "Worker dropped the result");
    Outcome {
        result: Err(Arc::new(
            FlightError::Abandoned {
                key: key.to_string(),
            }
            .into(),
        )),
        shared: false,
    }
}
