use super::dbus::{start_dbus_server, ControlCommand};
use super::notifier::WatchNotifier;
use super::power::LogindWakeLock;
use super::timers::{TokioAlarmScheduler, TokioForegroundTimer};
use crate::core::models::{Loadable, Pin, PinId};
use crate::core::settings::{Settings, SettingsWatcher};
use crate::core::store::PinStore;
use crate::loader::{ChanApiSource, LoadCompletion, PollingThreadLoader, SavedReplies};
use crate::storage::{JsonPinRepository, MemoryPinRepository, PinRepository};
use crate::watch::{AlarmToken, PinEvent, Platform, WatchCoordinator, WATCH_ALARM};
use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Default)]
pub struct DaemonOptions {
    /// Start as if the pin list were on screen.
    pub foreground: bool,
    /// Keep pins in memory only.
    pub ephemeral: bool,
}

/// Everything the daemon loop reacts to, handled strictly one at a time.
#[derive(Debug)]
pub enum DaemonEvent {
    ForegroundTick,
    AlarmFired(AlarmToken),
    LoadCompleted(LoadCompletion),
    SettingsChanged(Box<Settings>),
    Control(ControlCommand),
    Shutdown,
}

pub async fn run(options: DaemonOptions) -> Result<()> {
    let mut settings_watcher = SettingsWatcher::new()?;
    let settings = settings_watcher.get().await;
    settings_watcher.start_watching()?;

    let repository: Box<dyn PinRepository> = if options.ephemeral {
        tracing::info!("Running with in-memory pins");
        Box::new(MemoryPinRepository::new())
    } else {
        let path = JsonPinRepository::default_path().context("Could not determine data directory")?;
        Box::new(JsonPinRepository::open(&path).with_context(|| {
            format!("Failed to open pin store: {}", path.display())
        })?)
    };
    let store = PinStore::load(repository);

    let saved_replies = SavedReplies::new(&settings.saved_replies);
    let source = ChanApiSource::new(settings.api.clone(), saved_replies.clone())?;
    let loader = PollingThreadLoader::new(source);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<DaemonEvent>();
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel::<LoadCompletion>();
    let notifier = WatchNotifier::new();

    let platform = Platform {
        timer: Box::new(TokioForegroundTimer::new(event_tx.clone())),
        alarms: Box::new(TokioAlarmScheduler::new(event_tx.clone())),
        wake_lock: Box::new(LogindWakeLock::spawn()),
        service: Box::new(notifier.clone()),
    };

    let mut coordinator = WatchCoordinator::new(
        store,
        Box::new(loader),
        completion_tx,
        platform,
        settings.watch.clone(),
        options.foreground,
    );
    let (pin_tx, pin_rx) = mpsc::unbounded_channel::<PinEvent>();
    coordinator.subscribe(Box::new(pin_tx));

    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<ControlCommand>();
    let _dbus_connection = match start_dbus_server(control_tx).await {
        Ok(connection) => Some(connection),
        Err(e) => {
            tracing::warn!(error = %e, "D-Bus control unavailable");
            None
        }
    };

    let mut settings_rx = settings_watcher.subscribe();
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tracing::info!(
        pins = coordinator.all_pins().len(),
        state = %coordinator.interval_state(),
        "Daemon ready"
    );

    let mut daemon = Daemon::new(coordinator, notifier, saved_replies, settings, pin_rx);

    loop {
        let event = tokio::select! {
            Some(event) = event_rx.recv() => event,
            Some(completion) = completion_rx.recv() => DaemonEvent::LoadCompleted(completion),
            Some(command) = control_rx.recv() => DaemonEvent::Control(command),
            Ok(settings) = settings_rx.recv() => DaemonEvent::SettingsChanged(Box::new(settings)),
            _ = tokio::signal::ctrl_c() => DaemonEvent::Shutdown,
            _ = terminate.recv() => DaemonEvent::Shutdown,
        };

        if !daemon.handle(event) {
            break;
        }
    }

    tracing::info!("Shutting down");
    daemon.coordinator.shutdown();
    Ok(())
}

struct Daemon {
    coordinator: WatchCoordinator,
    notifier: WatchNotifier,
    saved_replies: SavedReplies,
    settings: Settings,
    pin_rx: mpsc::UnboundedReceiver<PinEvent>,
    /// Pins removed by the last non-empty clear, for `RestorePins`.
    last_cleared: Vec<Pin>,
}

impl Daemon {
    fn new(
        coordinator: WatchCoordinator,
        notifier: WatchNotifier,
        saved_replies: SavedReplies,
        settings: Settings,
        pin_rx: mpsc::UnboundedReceiver<PinEvent>,
    ) -> Self {
        Self {
            coordinator,
            notifier,
            saved_replies,
            settings,
            pin_rx,
            last_cleared: Vec::new(),
        }
    }

    /// Returns false once the loop should stop.
    fn handle(&mut self, event: DaemonEvent) -> bool {
        match event {
            DaemonEvent::ForegroundTick => self.coordinator.run_foreground_tick(),
            DaemonEvent::AlarmFired(token) if token == WATCH_ALARM => {
                self.coordinator.on_alarm_fired();
            }
            DaemonEvent::AlarmFired(token) => {
                tracing::debug!(%token, "Ignoring unknown alarm");
            }
            DaemonEvent::LoadCompleted(completion) => self.coordinator.on_load_completion(completion),
            DaemonEvent::SettingsChanged(settings) => self.apply_settings(*settings),
            DaemonEvent::Control(command) => self.handle_control(command),
            DaemonEvent::Shutdown => return false,
        }

        self.dispatch_pin_events();
        true
    }

    fn apply_settings(&mut self, settings: Settings) {
        if settings.api != self.settings.api {
            tracing::warn!("API settings changed; restart the daemon to apply them");
        }
        self.saved_replies.replace(&settings.saved_replies);
        self.coordinator.apply_watch_settings(settings.watch.clone());
        self.settings = settings;
    }

    fn handle_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::AddPin {
                board,
                thread,
                title,
                reply,
            } => {
                let loadable = Loadable::new(board, thread);
                let added = match title {
                    Some(title) => self.coordinator.insert_pin(Pin::new(loadable, title)).is_some(),
                    None => self.coordinator.create_pin(loadable, None),
                };
                let _ = reply.send(added);
            }
            ControlCommand::RemovePin { id, reply } => {
                let _ = reply.send(self.coordinator.delete_pin(id));
            }
            ControlCommand::ToggleWatch { id, reply } => {
                let _ = reply.send(self.coordinator.toggle_watch(id));
            }
            ControlCommand::MarkViewed { id, reply } => {
                let _ = reply.send(self.coordinator.on_bottom_post_viewed(id));
            }
            ControlCommand::PauseAll => self.coordinator.pause_all(),
            ControlCommand::ClearPins { all, reply } => {
                let removed = self.coordinator.clear_pins(all);
                let _ = reply.send(u32::try_from(removed.len()).unwrap_or(u32::MAX));
                if !removed.is_empty() {
                    self.last_cleared = removed;
                }
            }
            ControlCommand::RestorePins { reply } => {
                let pins = std::mem::take(&mut self.last_cleared);
                let restored = self.coordinator.add_all(pins);
                tracing::info!(restored, "Restored cleared pins");
                let _ = reply.send(u32::try_from(restored).unwrap_or(u32::MAX));
            }
            ControlCommand::MovePin { id, index, reply } => {
                let index = usize::try_from(index).unwrap_or(usize::MAX);
                let _ = reply.send(self.coordinator.move_pin(id, index));
            }
            ControlCommand::SetForeground(in_foreground) => {
                self.coordinator.on_app_foreground_changed(in_foreground);
            }
        }
    }

    /// Drains queued pin events. Returns each changed pin once, in the
    /// order it first changed.
    fn drain_changed(&mut self) -> Vec<PinId> {
        let mut changed: Vec<PinId> = Vec::new();
        while let Ok(event) = self.pin_rx.try_recv() {
            let id = event.pin().id;
            match event {
                PinEvent::Changed(_) if !changed.contains(&id) => changed.push(id),
                PinEvent::Changed(_) => {}
                PinEvent::Added(_) => tracing::debug!(pin_id = %id, "Pin added"),
                PinEvent::Removed(_) => {
                    tracing::debug!(pin_id = %id, "Pin removed");
                    changed.retain(|c| *c != id);
                }
            }
        }
        changed
    }

    fn dispatch_pin_events(&mut self) {
        let changed = self.drain_changed();
        if changed.is_empty() {
            return;
        }

        self.notifier.on_pins_changed(
            &mut self.coordinator,
            &changed,
            self.settings.notifications.enabled,
        );
    }
}
