use core::borrow::Borrow;
use core::fmt;
use core::mem;
use core::pin::pin;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tracing::trace;

use crate::types::Outcome;
use crate::Result;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Key(Arc<str>);

impl Key {
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key(Arc::from(key))
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One execution of the work for a key, shared by the caller running it and
/// every caller that attached while it ran.
///
/// The result is written once; after that it is only cloned out.
pub(crate) struct Call<T> {
    key: Key,
    dups: AtomicUsize,
    state: Mutex<State<T>>,
    cvar: Condvar,
    notify: Notify,
}

struct State<T> {
    result: Option<Result<T>>,
    /// Handles of attached `work_chan` callers, sent to on completion.
    subscribers: Vec<oneshot::Sender<Outcome<T>>>,
}

impl<T: Clone> Call<T> {
    pub(crate) fn new(key: Key) -> Self {
        Call {
            key,
            dups: AtomicUsize::new(0),
            state: Mutex::new(State {
                result: None,
                subscribers: Vec::new(),
            }),
            cvar: Condvar::new(),
            notify: Notify::new(),
        }
    }

    pub(crate) fn key(&self) -> &Key {
        &self.key
    }

    /// Counts one more caller waiting on this call. Callers hold the
    /// registry lock, so the count is final once the call is unregistered.
    pub(crate) fn attach(&self) {
        self.dups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dups(&self) -> usize {
        self.dups.load(Ordering::Relaxed)
    }

    /// Publishes the result and wakes every waiter, blocking, async or subscribed.
    /// Returns false if the call was already completed; the first result wins.
    pub(crate) fn complete(&self, result: Result<T>) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.result.is_some() {
            return false;
        }
        let subscribers = mem::take(&mut state.subscribers);
        state.result = Some(result.clone());
        drop(guard);

        trace!(key = %self.key, subscribers = subscribers.len(), "Call completed");
        self.cvar.notify_all();
        self.notify.notify_waiters();
        for tx in subscribers {
            // A dropped handle just discards its copy.
            let _ = tx.send(Outcome {
                result: result.clone(),
                shared: true,
            });
        }
        true
    }

    /// Delivers the result to `tx` once the call completes, without holding a
    /// thread while waiting.
    pub(crate) fn subscribe(&self, tx: oneshot::Sender<Outcome<T>>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match &state.result {
            Some(result) => {
                let _ = tx.send(Outcome {
                    result: result.clone(),
                    shared: true,
                });
            }
            None => state.subscribers.push(tx),
        }
    }

    /// Blocks the current thread until the call completes.
    pub(crate) fn wait(&self) -> Result<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(result) = state.result.as_ref() {
                return result.clone();
            }
            trace!(key = %self.key, "Not done, waiting...");
            self.cvar.wait(&mut state);
        }
    }

    pub(crate) async fn wait_async(&self) -> Result<T> {
        loop {
            // Registered before the check so a completion in between still wakes us.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            let done = self.state.lock().result.clone();
            if let Some(result) = done {
                return result;
            }
            trace!(key = %self.key, "Not done, waiting...");
            notified.await;
        }
    }
}
