use core::fmt;
use core::future::Future;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use threadpool::ThreadPool;
use tokio::sync::oneshot;
use tracing::{error, instrument, trace, warn};

use crate::call::{Call, Key};
use crate::error::FlightError;
use crate::handle::Handle;
use crate::types::{Options, Outcome};
use crate::utils::{panic_message, share};

struct Inner<T> {
    calls: Mutex<HashMap<Key, Arc<Call<T>>>>,
    options: Options,
    pool: Mutex<Option<ThreadPool>>,
}

impl<T: Clone> Inner<T> {
    /// Unregisters `call` if it is still the record for its key and reports
    /// whether anyone attached to it. A forgotten call never evicts its successor.
    fn release(&self, call: &Arc<Call<T>>) -> bool {
        let mut calls = self.calls.lock();
        if calls
            .get(call.key())
            .is_some_and(|current| Arc::ptr_eq(current, call))
        {
            calls.remove(call.key());
            trace!(key = %call.key(), "Entry removed");
        }
        call.dups() > 0
    }

    /// Runs `job` on a worker, adding one if every worker is busy. Work for one
    /// key may itself wait on another key, so jobs never queue behind each other.
    fn dispatch<J>(&self, job: J)
    where
        J: FnOnce() + Send + 'static,
    {
        let mut guard = self.pool.lock();
        let pool = guard.get_or_insert_with(|| {
            trace!(size = self.options.pool_size, "Starting worker pool");
            threadpool::Builder::new()
                .num_threads(self.options.pool_size.max(1))
                .thread_name(self.options.thread_name.clone())
                .build()
        });
        if pool.active_count() + pool.queued_count() >= pool.max_count() {
            let size = pool.max_count() + 1;
            trace!(size, "Growing worker pool");
            pool.set_num_threads(size);
        }
        pool.execute(job);
    }
}

/// Group represents a class of work and creates a space in which units of work
/// can be executed with duplicate suppression.
///
/// Cloning a group is cheap; clones share the same in-flight calls.
pub struct Group<T>(Arc<Inner<T>>);

impl<T> Clone for Group<T> {
    fn clone(&self) -> Self {
        Group(self.0.clone())
    }
}

impl<T> fmt::Debug for Group<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("in_flight", &self.0.calls.lock().len())
            .field("options", &self.0.options)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for Group<T> {
    fn default() -> Self {
        Self::new()
    }
}

enum Join<T: Clone> {
    /// Someone else runs the work; wait on their call.
    Waiter(Arc<Call<T>>),
    /// We registered the call and must run the work.
    Leader(Flight<T>),
}

/// Held by the caller running the work. Whatever way that caller leaves, the
/// call is unregistered and completed, so waiters never hang.
struct Flight<T: Clone> {
    inner: Arc<Inner<T>>,
    call: Arc<Call<T>>,
    finished: bool,
}

impl<T: Clone> Flight<T> {
    /// Runs `work` to its end, catching a panic so the call is always completed.
    fn run<E, F>(self, work: F) -> Ran<T>
    where
        E: Into<anyhow::Error>,
        F: FnOnce() -> Result<T, E>,
    {
        trace!(key = %self.call.key(), "working...");
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(result) => Ran::Returned(self.finish(result.map_err(share))),
            Err(payload) => Ran::Panicked(self.panicked(&*payload), payload),
        }
    }

    fn finish(mut self, result: crate::Result<T>) -> Outcome<T> {
        self.finished = true;
        // Unregister before waking anyone: a waiter that calls again must find the key free.
        let shared = self.inner.release(&self.call);
        self.call.complete(result.clone());
        trace!(key = %self.call.key(), shared, "Work done");
        Outcome { result, shared }
    }

    fn panicked(self, payload: &(dyn Any + Send)) -> Outcome<T> {
        let message = panic_message(payload);
        error!(key = %self.call.key(), %message, "Work panicked");
        let err = FlightError::Panicked {
            key: self.call.key().to_string(),
            message,
        };
        self.finish(Err(share(err)))
    }
}

impl<T: Clone> Drop for Flight<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(key = %self.call.key(), "Work abandoned before completing");
        self.inner.release(&self.call);
        self.call.complete(Err(share(FlightError::Abandoned {
            key: self.call.key().to_string(),
        })));
    }
}

/// How the work ended for the caller that ran it.
enum Ran<T> {
    Returned(Outcome<T>),
    Panicked(Outcome<T>, Box<dyn Any + Send>),
}

impl<T: Clone + Send + 'static> Group<T> {
    pub fn new() -> Group<T> {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Group<T> {
        Group(Arc::new(Inner {
            calls: Mutex::new(HashMap::new()),
            options,
            pool: Mutex::new(None),
        }))
    }

    pub fn options(&self) -> &Options {
        &self.0.options
    }

    /// work executes and returns the results of the given function, making
    /// sure that only one execution is in-flight for a given key at a
    /// time. If a duplicate comes in, the duplicate caller waits for the
    /// original to complete and receives the same results.
    /// The returned `shared` flag indicates whether the result was given to
    /// multiple callers.
    ///
    /// If `work` panics, the panic is resumed on this thread after the call is
    /// cleaned up, and callers waiting on it receive [`FlightError::Panicked`].
    #[instrument(level = "trace", skip(self, work))]
    pub fn work<E, F>(&self, key: &str, work: F) -> Outcome<T>
    where
        E: Into<anyhow::Error>,
        F: FnOnce() -> Result<T, E>,
    {
        let flight = match self.join(key) {
            Join::Waiter(call) => {
                return Outcome {
                    result: call.wait(),
                    shared: true,
                }
            }
            Join::Leader(flight) => flight,
        };

        match flight.run(work) {
            Ran::Returned(outcome) => outcome,
            Ran::Panicked(_, payload) => panic::resume_unwind(payload),
        }
    }

    /// work_async is like work but awaits `fut` in place, and waiting callers
    /// are suspended instead of blocking their thread.
    ///
    /// If the future of the caller running `fut` is dropped first, waiting
    /// callers receive [`FlightError::Abandoned`].
    #[instrument(level = "trace", skip(self, fut))]
    pub async fn work_async<E, Fut>(&self, key: &str, fut: Fut) -> Outcome<T>
    where
        E: Into<anyhow::Error>,
        Fut: Future<Output = Result<T, E>>,
    {
        let flight = match self.join(key) {
            Join::Waiter(call) => {
                return Outcome {
                    result: call.wait_async().await,
                    shared: true,
                }
            }
            Join::Leader(flight) => flight,
        };

        trace!("working...");
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => flight.finish(result.map_err(share)),
            Err(payload) => {
                flight.panicked(&*payload);
                panic::resume_unwind(payload)
            }
        }
    }

    /// work_chan is like work but returns a handle that will receive the
    /// outcome when it is ready, without blocking the calling thread.
    ///
    /// A caller that starts a call runs `work` on a worker of the group's
    /// pool; a caller that attaches to one takes no thread at all. The handle
    /// always resolves: a panic in `work` is delivered as
    /// [`FlightError::Panicked`].
    #[instrument(level = "trace", skip(self, work))]
    pub fn work_chan<E, F>(&self, key: &str, work: F) -> Handle<T>
    where
        E: Into<anyhow::Error> + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = Handle::new(Key::from(key), rx);
        let flight = match self.join(key) {
            Join::Waiter(call) => {
                call.subscribe(tx);
                return handle;
            }
            Join::Leader(flight) => flight,
        };

        self.0.dispatch(move || {
            let key = flight.call.key().clone();
            let outcome = match flight.run(work) {
                Ran::Returned(outcome) | Ran::Panicked(outcome, _) => outcome,
            };
            if tx.send(outcome).is_err() {
                trace!(key = %key, "Handle dropped, outcome discarded");
            }
        });
        handle
    }

    /// forget tells the group to forget about a key. Future calls for this
    /// key run the work rather than waiting for an earlier call to complete.
    /// Callers already waiting on the earlier call still get its result.
    #[instrument(level = "trace", skip(self))]
    pub fn forget(&self, key: &str) {
        if self.0.calls.lock().remove(key).is_some() {
            trace!("Entry forgotten");
        }
    }

    /// Number of keys with a call currently in flight.
    pub fn in_flight(&self) -> usize {
        self.0.calls.lock().len()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.0.calls.lock().contains_key(key)
    }

    fn join(&self, key: &str) -> Join<T> {
        let mut calls = self.0.calls.lock();
        if let Some(call) = calls.get(key) {
            call.attach();
            trace!("Attached to in-flight call");
            return Join::Waiter(call.clone());
        }

        let key = Key::from(key);
        let call = Arc::new(Call::new(key.clone()));
        calls.insert(key, call.clone());
        trace!("Entry inited");
        Join::Leader(Flight {
            inner: self.0.clone(),
            call,
            finished: false,
        })
    }
}
