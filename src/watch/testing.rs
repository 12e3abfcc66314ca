//! Recording fakes for the scheduler's ports.

use super::coordinator::WatchCoordinator;
use super::events::PinEvent;
use super::platform::{
    AlarmScheduler, AlarmToken, ForegroundService, ForegroundTimer, Platform, WakeLock,
};
use crate::core::error::LoadError;
use crate::core::models::{Loadable, Pin, PinId, Post, ThreadSnapshot};
use crate::core::settings::WatchSettings;
use crate::core::store::PinStore;
use crate::loader::{CompletionSink, LoadCompletion, LoaderHandle, ThreadLoader};
use crate::storage::MemoryPinRepository;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
pub struct PlatformLog {
    pub timer_scheduled: Vec<Duration>,
    pub timer_cancels: usize,
    pub timer_pending: bool,
    pub alarm: Option<(AlarmToken, Duration)>,
    pub alarm_registrations: usize,
    pub acquires: usize,
    pub releases: usize,
    pub lock_held: bool,
    pub service_running: bool,
    pub service_starts: usize,
    pub service_stops: usize,
}

#[derive(Clone, Default)]
pub struct RecordingPlatform {
    log: Arc<Mutex<PlatformLog>>,
}

struct RecordingTimer(Arc<Mutex<PlatformLog>>);
struct RecordingAlarms(Arc<Mutex<PlatformLog>>);
struct RecordingWakeLock(Arc<Mutex<PlatformLog>>);
struct RecordingService(Arc<Mutex<PlatformLog>>);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, PlatformLog> {
        lock(&self.log)
    }

    pub fn timer(&self) -> Box<dyn ForegroundTimer> {
        Box::new(RecordingTimer(Arc::clone(&self.log)))
    }

    pub fn alarms(&self) -> Box<dyn AlarmScheduler> {
        Box::new(RecordingAlarms(Arc::clone(&self.log)))
    }

    pub fn wake_lock(&self) -> Box<dyn WakeLock> {
        Box::new(RecordingWakeLock(Arc::clone(&self.log)))
    }

    pub fn platform(&self) -> Platform {
        Platform {
            timer: self.timer(),
            alarms: self.alarms(),
            wake_lock: self.wake_lock(),
            service: Box::new(RecordingService(Arc::clone(&self.log))),
        }
    }
}

impl ForegroundTimer for RecordingTimer {
    fn schedule(&mut self, delay: Duration) {
        let mut log = lock(&self.0);
        log.timer_scheduled.push(delay);
        log.timer_pending = true;
    }

    fn cancel(&mut self) {
        let mut log = lock(&self.0);
        log.timer_cancels += 1;
        log.timer_pending = false;
    }
}

impl AlarmScheduler for RecordingAlarms {
    fn register(&mut self, token: AlarmToken, interval: Duration) {
        let mut log = lock(&self.0);
        log.alarm = Some((token, interval));
        log.alarm_registrations += 1;
    }

    fn unregister(&mut self, token: AlarmToken) {
        let mut log = lock(&self.0);
        if log.alarm.map(|(t, _)| t) == Some(token) {
            log.alarm = None;
        }
    }
}

impl WakeLock for RecordingWakeLock {
    fn acquire(&mut self) {
        let mut log = lock(&self.0);
        assert!(!log.lock_held, "wake lock acquired twice");
        log.acquires += 1;
        log.lock_held = true;
    }

    fn release(&mut self) {
        let mut log = lock(&self.0);
        assert!(log.lock_held, "wake lock released while not held");
        log.releases += 1;
        log.lock_held = false;
    }
}

impl ForegroundService for RecordingService {
    fn start(&mut self) {
        let mut log = lock(&self.0);
        if !log.service_running {
            log.service_starts += 1;
        }
        log.service_running = true;
    }

    fn stop(&mut self) {
        let mut log = lock(&self.0);
        if log.service_running {
            log.service_stops += 1;
        }
        log.service_running = false;
    }
}

#[derive(Default)]
pub struct LoaderLog {
    next_handle: u64,
    pub sessions: HashMap<LoaderHandle, Loadable>,
    sinks: HashMap<LoaderHandle, CompletionSink>,
    pub released: Vec<LoaderHandle>,
    pub requests: Vec<LoaderHandle>,
    pub timer_clears: Vec<LoaderHandle>,
    pub not_due: bool,
}

/// Loader that records calls and delivers results only when told to.
#[derive(Clone, Default)]
pub struct FakeLoader {
    log: Arc<Mutex<LoaderLog>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, LoaderLog> {
        lock(&self.log)
    }

    /// Makes `load_more_if_time` report that no load is due.
    pub fn set_due(&self, due: bool) {
        self.log().not_due = !due;
    }

    pub fn requests_for(&self, handle: LoaderHandle) -> usize {
        self.log().requests.iter().filter(|h| **h == handle).count()
    }

    pub fn deliver(&self, handle: LoaderHandle, outcome: Result<ThreadSnapshot, LoadError>) {
        let sink = self.log().sinks.get(&handle).cloned();
        if let Some(sink) = sink {
            match outcome {
                Ok(thread) => sink.on_data(handle, thread),
                Err(error) => sink.on_error(handle, error),
            }
        }
    }
}

impl ThreadLoader for FakeLoader {
    fn obtain(&mut self, loadable: &Loadable, sink: CompletionSink) -> LoaderHandle {
        let mut log = self.log();
        log.next_handle += 1;
        let handle = LoaderHandle(log.next_handle);
        log.sessions.insert(handle, loadable.clone());
        log.sinks.insert(handle, sink);
        handle
    }

    fn release(&mut self, handle: LoaderHandle) {
        let mut log = self.log();
        log.sessions.remove(&handle);
        log.released.push(handle);
    }

    fn request_more_data(&mut self, handle: LoaderHandle) {
        self.log().requests.push(handle);
    }

    fn load_more_if_time(&mut self, handle: LoaderHandle) -> bool {
        let mut log = self.log();
        if log.not_due {
            return false;
        }
        log.requests.push(handle);
        true
    }

    fn clear_timer(&mut self, handle: LoaderHandle) {
        self.log().timer_clears.push(handle);
    }

    fn time_until_next_load(&self, _handle: LoaderHandle) -> Duration {
        Duration::ZERO
    }
}

pub fn thread_with(posts: u64, own: &[u64], quoting_own: &[u64]) -> ThreadSnapshot {
    let posts = (1..=posts)
        .map(|no| {
            let mut post = Post::new(no);
            post.is_saved_reply = own.contains(&no);
            if quoting_own.contains(&no) {
                post.replies_to = own.iter().copied().collect();
            }
            post
        })
        .collect();
    ThreadSnapshot {
        posts,
        ..Default::default()
    }
}

pub fn watch_settings(enabled: bool, background: bool) -> WatchSettings {
    WatchSettings {
        enabled,
        background,
        ..WatchSettings::default()
    }
}

/// A coordinator wired to recording fakes.
pub struct Harness {
    pub coordinator: WatchCoordinator,
    pub loader: FakeLoader,
    pub platform: RecordingPlatform,
    pub repo: MemoryPinRepository,
    pub events: mpsc::UnboundedReceiver<PinEvent>,
    completions: mpsc::UnboundedReceiver<LoadCompletion>,
}

impl Harness {
    pub fn new(settings: WatchSettings, in_foreground: bool) -> Self {
        Self::with_repo(MemoryPinRepository::new(), settings, in_foreground)
    }

    pub fn with_repo(
        repo: MemoryPinRepository,
        settings: WatchSettings,
        in_foreground: bool,
    ) -> Self {
        let loader = FakeLoader::new();
        let platform = RecordingPlatform::new();
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();

        let mut coordinator = WatchCoordinator::new(
            PinStore::load(Box::new(repo.clone())),
            Box::new(loader.clone()),
            completion_tx,
            platform.platform(),
            settings,
            in_foreground,
        );
        coordinator.subscribe(Box::new(event_tx));

        Self {
            coordinator,
            loader,
            platform,
            repo,
            events,
            completions,
        }
    }

    pub fn pin(&mut self, thread: u64) -> PinId {
        let loadable = Loadable::new("g", thread);
        assert!(self.coordinator.create_pin(loadable.clone(), None));
        let id = self
            .coordinator
            .find_pin_by_loadable(&loadable)
            .map(|p| p.id)
            .expect("pin was just created");
        self.drain_events();
        id
    }

    pub fn pin_state(&self, id: PinId) -> Pin {
        self.coordinator
            .find_pin_by_id(id)
            .cloned()
            .expect("pin exists")
    }

    pub fn handle(&self, id: PinId) -> LoaderHandle {
        self.coordinator
            .pin_watcher(id)
            .map(|w| w.handle())
            .expect("pin has a watcher")
    }

    pub fn complete(&mut self, id: PinId, outcome: Result<ThreadSnapshot, LoadError>) {
        let handle = self.handle(id);
        self.loader.deliver(handle, outcome);
        self.pump();
    }

    pub fn pump(&mut self) {
        while let Ok(completion) = self.completions.try_recv() {
            self.coordinator.on_load_completion(completion);
        }
    }

    pub fn drain_events(&mut self) -> Vec<PinEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
