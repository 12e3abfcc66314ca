mod chan;
mod polling;

use crate::core::error::LoadError;
use crate::core::models::{Loadable, ThreadSnapshot};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

pub use chan::{ChanApiSource, SavedReplies};
pub use polling::{PollingThreadLoader, ThreadSource};

/// Identifies one load session. Handles are never reused, so a completion
/// carrying a released handle can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderHandle(pub u64);

impl fmt::Display for LoaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct LoadCompletion {
    pub handle: LoaderHandle,
    pub outcome: Result<ThreadSnapshot, LoadError>,
}

/// Where loaders report fetch results. Results are queued and handled on the
/// scheduling context, never inline with the fetch.
#[derive(Debug, Clone)]
pub struct CompletionSink {
    tx: mpsc::UnboundedSender<LoadCompletion>,
}

impl CompletionSink {
    pub fn new(tx: mpsc::UnboundedSender<LoadCompletion>) -> Self {
        Self { tx }
    }

    pub fn on_data(&self, handle: LoaderHandle, thread: ThreadSnapshot) {
        self.deliver(LoadCompletion {
            handle,
            outcome: Ok(thread),
        });
    }

    pub fn on_error(&self, handle: LoaderHandle, error: LoadError) {
        self.deliver(LoadCompletion {
            handle,
            outcome: Err(error),
        });
    }

    fn deliver(&self, completion: LoadCompletion) {
        if self.tx.send(completion).is_err() {
            tracing::debug!("Completion receiver dropped, discarding load result");
        }
    }
}

/// Per-thread loader with its own retry timing. Each requested fetch ends in
/// exactly one `on_data` or `on_error` on the session's sink.
pub trait ThreadLoader: Send {
    fn obtain(&mut self, loadable: &Loadable, sink: CompletionSink) -> LoaderHandle;

    /// Ends the session and cancels any fetch still in flight.
    fn release(&mut self, handle: LoaderHandle);

    /// Starts a fetch now, regardless of the retry timer.
    fn request_more_data(&mut self, handle: LoaderHandle);

    /// Starts a fetch if the retry timer says one is due. Returns whether it did.
    fn load_more_if_time(&mut self, handle: LoaderHandle) -> bool;

    /// Makes the next `load_more_if_time` due immediately.
    fn clear_timer(&mut self, handle: LoaderHandle);

    fn time_until_next_load(&self, handle: LoaderHandle) -> Duration;
}
