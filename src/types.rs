use std::num::NonZeroUsize;
use std::thread;

use crate::Result;

/// What a caller gets back from the group.
#[derive(Debug)]
pub struct Outcome<T> {
    /// The work's value or failure. Every caller of one execution gets the
    /// same content; failures are the same `Arc`.
    pub result: Result<T>,
    /// Whether the result was given to more than one caller.
    pub shared: bool,
}

impl<T> Outcome<T> {
    pub fn into_parts(self) -> (Result<T>, bool) {
        (self.result, self.shared)
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl<T: Clone> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        Self {
            result: self.result.clone(),
            shared: self.shared,
        }
    }
}

/// Options represents the options for a group
#[derive(Debug, Clone)]
pub struct Options {
    /// PoolSize is the number of worker threads started for `work_chan` jobs.
    /// default is the available parallelism, at least 4.
    /// Workers are spawned the first time `work_chan` starts a call. The pool
    /// grows by one worker whenever a call would otherwise have to queue.
    pub pool_size: usize,
    /// ThreadName is the name given to the worker threads. default is "singleflight"
    pub thread_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pool_size: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4)
                .max(4),
            thread_name: "singleflight".to_owned(),
        }
    }
}
