use crate::core::error::LoadError;
use crate::core::models::{Pin, PinId, Post, ThreadSnapshot};
use crate::loader::{CompletionSink, LoaderHandle, ThreadLoader};

/// Tracks one pinned thread through its loader session and keeps the
/// posts and quotes seen on the last successful load.
#[derive(Debug)]
pub struct PinWatcher {
    pin_id: PinId,
    handle: LoaderHandle,
    posts: Vec<Post>,
    quotes: Vec<Post>,
    were_new_posts: bool,
    were_new_quotes: bool,
}

impl PinWatcher {
    pub fn new(pin: &Pin, loader: &mut dyn ThreadLoader, sink: CompletionSink) -> Self {
        let handle = loader.obtain(&pin.loadable, sink);
        tracing::debug!(pin_id = %pin.id, loadable = %pin.loadable, %handle, "Pin watcher created");

        Self {
            pin_id: pin.id,
            handle,
            posts: Vec::new(),
            quotes: Vec::new(),
            were_new_posts: false,
            were_new_quotes: false,
        }
    }

    pub fn pin_id(&self) -> PinId {
        self.pin_id
    }

    pub fn handle(&self) -> LoaderHandle {
        self.handle
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn quotes(&self) -> &[Post] {
        &self.quotes
    }

    /// Releases the loader session, cancelling any fetch in flight.
    pub fn destroy(self, loader: &mut dyn ThreadLoader) {
        tracing::debug!(pin_id = %self.pin_id, handle = %self.handle, "Pin watcher destroyed");
        loader.release(self.handle);
    }

    /// Asks the loader for fresh data. Returns whether a load was started.
    pub fn update(&mut self, pin: &Pin, loader: &mut dyn ThreadLoader, from_background: bool) -> bool {
        if pin.is_error || !pin.watching {
            return false;
        }

        if from_background {
            // Alarm intervals are far longer than the loader's timer, so its
            // remaining time is meaningless here.
            loader.clear_timer(self.handle);
            loader.request_more_data(self.handle);
            true
        } else {
            loader.load_more_if_time(self.handle)
        }
    }

    pub fn on_data(&mut self, pin: &mut Pin, thread: ThreadSnapshot, loader: &dyn ThreadLoader) {
        pin.is_error = false;

        if pin.thumbnail_url.is_none() {
            if let Some(thumbnail) = thread.op().and_then(|op| op.thumbnail_url.clone()) {
                pin.thumbnail_url = Some(thumbnail);
            }
        }

        self.quotes = thread.quotes_of_saved_replies();
        self.posts = thread.posts;

        let is_first_load = pin.watch_new_count < 0 || pin.quote_new_count < 0;
        let previous_post_count = pin.watch_new_count;
        let previous_quote_count = pin.quote_new_count;

        pin.watch_new_count = self.posts.len() as i32;
        pin.quote_new_count = self.quotes.len() as i32;

        if is_first_load {
            pin.watch_last_count = pin.watch_new_count;
            pin.quote_last_count = pin.quote_new_count;
        } else {
            if pin.watch_new_count > previous_post_count {
                self.were_new_posts = true;
            }
            if pin.quote_new_count > previous_quote_count {
                self.were_new_quotes = true;
            }
        }

        tracing::debug!(
            pin_id = %pin.id,
            post_last = pin.watch_last_count,
            post_new = pin.watch_new_count,
            were_new_posts = self.were_new_posts,
            quote_last = pin.quote_last_count,
            quote_new = pin.quote_new_count,
            were_new_quotes = self.were_new_quotes,
            next_load_secs = loader.time_until_next_load(self.handle).as_secs(),
            "Pin watcher loaded"
        );

        if thread.archived || thread.closed {
            tracing::info!(pin_id = %pin.id, "Thread archived or closed, no longer watching");
            pin.archived = true;
            pin.watching = false;
        }
    }

    pub fn on_error(&mut self, pin: &mut Pin, error: &LoadError) {
        if error.is_not_found() {
            tracing::info!(pin_id = %pin.id, loadable = %pin.loadable, "Thread is gone, no longer watching");
            pin.is_error = true;
            pin.watching = false;
        } else {
            tracing::debug!(pin_id = %pin.id, %error, "Pin load failed, retrying next cycle");
        }
    }

    pub fn unviewed_posts(&self, pin: &Pin) -> &[Post] {
        unviewed_suffix(&self.posts, pin.new_post_count())
    }

    pub fn unviewed_quotes(&self, pin: &Pin) -> &[Post] {
        unviewed_suffix(&self.quotes, pin.new_quote_count())
    }

    /// True once after a load found more posts; reading clears it.
    pub fn take_were_new_posts(&mut self) -> bool {
        std::mem::take(&mut self.were_new_posts)
    }

    /// True once after a load found more quotes; reading clears it.
    pub fn take_were_new_quotes(&mut self) -> bool {
        std::mem::take(&mut self.were_new_quotes)
    }

    pub fn clear_new_flags(&mut self) {
        self.were_new_posts = false;
        self.were_new_quotes = false;
    }
}

fn unviewed_suffix(items: &[Post], count: i32) -> &[Post] {
    let count = usize::try_from(count).unwrap_or(0).min(items.len());
    &items[items.len() - count..]
}
