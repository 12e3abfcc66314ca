use super::{CompletionSink, LoaderHandle, ThreadLoader};
use crate::core::error::LoadError;
use crate::core::models::{Loadable, ThreadSnapshot};
use crate::core::retry::WatchBackoff;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[async_trait]
pub trait ThreadSource: Send + Sync + 'static {
    async fn fetch(&self, loadable: &Loadable) -> Result<ThreadSnapshot, LoadError>;
}

#[derive(Default)]
struct SessionState {
    backoff: WatchBackoff,
    last_load: Option<Instant>,
    in_flight: bool,
}

struct Session {
    loadable: Loadable,
    sink: CompletionSink,
    state: Arc<Mutex<SessionState>>,
    task: Option<JoinHandle<()>>,
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs fetches from a [`ThreadSource`] as tokio tasks and paces them with
/// a per-session [`WatchBackoff`].
pub struct PollingThreadLoader<S: ThreadSource> {
    source: Arc<S>,
    sessions: HashMap<LoaderHandle, Session>,
    next_handle: u64,
}

impl<S: ThreadSource> PollingThreadLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            sessions: HashMap::new(),
            next_handle: 1,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl<S: ThreadSource> ThreadLoader for PollingThreadLoader<S> {
    fn obtain(&mut self, loadable: &Loadable, sink: CompletionSink) -> LoaderHandle {
        let handle = LoaderHandle(self.next_handle);
        self.next_handle += 1;

        self.sessions.insert(
            handle,
            Session {
                loadable: loadable.clone(),
                sink,
                state: Arc::new(Mutex::new(SessionState::default())),
                task: None,
            },
        );
        tracing::debug!(%handle, %loadable, "Loader session obtained");
        handle
    }

    fn release(&mut self, handle: LoaderHandle) {
        if let Some(session) = self.sessions.remove(&handle) {
            if let Some(task) = session.task {
                task.abort();
            }
            tracing::debug!(%handle, loadable = %session.loadable, "Loader session released");
        }
    }

    fn request_more_data(&mut self, handle: LoaderHandle) {
        let Some(session) = self.sessions.get_mut(&handle) else {
            return;
        };

        {
            let mut state = lock(&session.state);
            if state.in_flight {
                tracing::debug!(%handle, "Fetch already in flight");
                return;
            }
            state.in_flight = true;
            state.last_load = Some(Instant::now());
        }

        let source = Arc::clone(&self.source);
        let loadable = session.loadable.clone();
        let sink = session.sink.clone();
        let state = Arc::clone(&session.state);

        session.task = Some(tokio::spawn(async move {
            let result = source.fetch(&loadable).await;
            {
                let mut state = lock(&state);
                state.in_flight = false;
                match &result {
                    Ok(thread) => state.backoff.record_success(thread.posts.len()),
                    Err(_) => state.backoff.record_failure(),
                }
            }

            match result {
                Ok(thread) => sink.on_data(handle, thread),
                Err(error) => {
                    tracing::debug!(%handle, %loadable, %error, "Fetch failed");
                    sink.on_error(handle, error);
                }
            }
        }));
    }

    fn load_more_if_time(&mut self, handle: LoaderHandle) -> bool {
        let due = self
            .sessions
            .get(&handle)
            .map(|session| {
                let state = lock(&session.state);
                !state.in_flight
                    && state
                        .last_load
                        .map_or(true, |last| last.elapsed() >= state.backoff.current_delay())
            })
            .unwrap_or(false);

        if due {
            self.request_more_data(handle);
        }
        due
    }

    fn clear_timer(&mut self, handle: LoaderHandle) {
        if let Some(session) = self.sessions.get(&handle) {
            let mut state = lock(&session.state);
            state.last_load = None;
            state.backoff.reset();
        }
    }

    fn time_until_next_load(&self, handle: LoaderHandle) -> Duration {
        let Some(session) = self.sessions.get(&handle) else {
            return Duration::ZERO;
        };
        let state = lock(&session.state);
        match state.last_load {
            Some(last) => state.backoff.current_delay().saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Post;
    use crate::loader::LoadCompletion;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct ScriptedSource {
        results: Mutex<VecDeque<Result<ThreadSnapshot, LoadError>>>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<ThreadSnapshot, LoadError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ThreadSource for ScriptedSource {
        async fn fetch(&self, _loadable: &Loadable) -> Result<ThreadSnapshot, LoadError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LoadError::Transient("script exhausted".into())))
        }
    }

    fn thread(posts: u64) -> ThreadSnapshot {
        ThreadSnapshot {
            posts: (1..=posts).map(Post::new).collect(),
            ..Default::default()
        }
    }

    fn setup(
        results: Vec<Result<ThreadSnapshot, LoadError>>,
    ) -> (
        PollingThreadLoader<ScriptedSource>,
        LoaderHandle,
        mpsc::UnboundedReceiver<LoadCompletion>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut loader = PollingThreadLoader::new(ScriptedSource::new(results));
        let handle = loader.obtain(&Loadable::new("g", 1), CompletionSink::new(tx));
        (loader, handle, rx)
    }

    #[tokio::test]
    async fn test_first_load_is_due_immediately() {
        let (mut loader, handle, mut rx) = setup(vec![Ok(thread(3))]);
        assert_eq!(loader.time_until_next_load(handle), Duration::ZERO);
        assert!(loader.load_more_if_time(handle));

        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.handle, handle);
        assert_eq!(completion.outcome.unwrap().posts.len(), 3);
    }

    #[tokio::test]
    async fn test_not_due_again_until_backoff_elapses() {
        let (mut loader, handle, mut rx) = setup(vec![Ok(thread(3)), Ok(thread(4))]);
        assert!(loader.load_more_if_time(handle));
        rx.recv().await.unwrap();

        assert!(!loader.load_more_if_time(handle));
        assert!(loader.time_until_next_load(handle) > Duration::ZERO);

        loader.clear_timer(handle);
        assert!(loader.load_more_if_time(handle));
        assert_eq!(rx.recv().await.unwrap().outcome.unwrap().posts.len(), 4);
        assert_eq!(loader.source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_delivered_to_sink() {
        let (mut loader, handle, mut rx) = setup(vec![Err(LoadError::NotFound)]);
        loader.request_more_data(handle);
        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.outcome, Err(LoadError::NotFound));
    }

    #[tokio::test]
    async fn test_release_cancels_session() {
        let (mut loader, handle, _rx) = setup(vec![Ok(thread(1))]);
        loader.release(handle);
        assert_eq!(loader.session_count(), 0);
        assert!(!loader.load_more_if_time(handle));

        let (tx, _rx2) = mpsc::unbounded_channel();
        let next = loader.obtain(&Loadable::new("g", 1), CompletionSink::new(tx));
        assert_ne!(next, handle);
    }
}
