use super::barrier::WakeBarrier;
use super::events::{PinEvent, PinEventBus, PinListener};
use super::interval::{IntervalController, IntervalState};
use super::platform::{ForegroundService, Platform};
use super::watcher::PinWatcher;
use crate::core::models::{Loadable, Pin, PinId, Post};
use crate::core::settings::WatchSettings;
use crate::core::store::PinStore;
use crate::loader::{CompletionSink, LoadCompletion, ThreadLoader};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc;

/// Global settings the coordinator reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalSetting {
    WatchEnabled(bool),
    BackgroundEnabled(bool),
}

/// Owns the pin list, the watchers and the interval state. Every method
/// must be called from the one context that owns the coordinator.
pub struct WatchCoordinator {
    store: PinStore,
    loader: Box<dyn ThreadLoader>,
    completions: mpsc::UnboundedSender<LoadCompletion>,
    watchers: HashMap<PinId, PinWatcher>,
    interval: IntervalController,
    barrier: WakeBarrier,
    service: Box<dyn ForegroundService>,
    events: PinEventBus,
    settings: WatchSettings,
    in_foreground: bool,
    last_alarm: Option<Instant>,
}

impl WatchCoordinator {
    pub fn new(
        store: PinStore,
        loader: Box<dyn ThreadLoader>,
        completions: mpsc::UnboundedSender<LoadCompletion>,
        platform: Platform,
        settings: WatchSettings,
        in_foreground: bool,
    ) -> Self {
        let interval = IntervalController::new(
            platform.timer,
            platform.alarms,
            settings.foreground_interval(),
            settings.background_interval(),
        );

        let mut coordinator = Self {
            store,
            loader,
            completions,
            watchers: HashMap::new(),
            interval,
            barrier: WakeBarrier::new(platform.wake_lock),
            service: platform.service,
            events: PinEventBus::default(),
            settings,
            in_foreground,
            last_alarm: None,
        };
        coordinator.update_state();
        coordinator
    }

    pub fn subscribe(&mut self, listener: Box<dyn PinListener>) {
        self.events.subscribe(listener);
    }

    /// Pins `loadable`. Returns false if it is already pinned.
    pub fn create_pin(&mut self, loadable: Loadable, post: Option<&Post>) -> bool {
        self.insert_pin(Pin::from_post(loadable, post)).is_some()
    }

    /// Adds a fully formed pin. A non-negative `order` is kept.
    pub fn insert_pin(&mut self, pin: Pin) -> Option<PinId> {
        let loadable = pin.loadable.clone();
        let Some(id) = self.store.add(pin) else {
            tracing::debug!(%loadable, "Thread already pinned");
            return None;
        };
        tracing::info!(pin_id = %id, %loadable, "Pin created");

        self.update_state();
        self.publish(PinEvent::Added, id);
        Some(id)
    }

    /// Re-inserts pins returned by `clear_pins`, restoring their positions.
    pub fn add_all(&mut self, mut pins: Vec<Pin>) -> usize {
        pins.sort_by_key(|p| p.order);
        pins.into_iter()
            .filter_map(|pin| self.insert_pin(pin))
            .count()
    }

    pub fn delete_pin(&mut self, id: PinId) -> bool {
        if self.store.find_by_id(id).is_none() {
            return false;
        }
        self.destroy_watcher(id);

        let Some(pin) = self.store.remove(id) else {
            return false;
        };
        tracing::info!(pin_id = %id, loadable = %pin.loadable, "Pin deleted");

        self.update_state();
        self.events.publish(PinEvent::Removed(pin));
        true
    }

    /// Replaces a pin's fields with `pin` (matched by id). Its position is
    /// kept; use `move_pin` to reorder.
    pub fn update_pin(&mut self, pin: Pin) -> bool {
        let id = pin.id;
        let Some(slot) = self.store.get_mut(id) else {
            return false;
        };
        let order = slot.order;
        *slot = pin;
        slot.order = order;

        self.pin_changed(id);
        true
    }

    pub fn toggle_watch(&mut self, id: PinId) -> bool {
        let Some(pin) = self.store.get_mut(id) else {
            return false;
        };
        pin.watching = !pin.watching;
        tracing::info!(pin_id = %id, watching = pin.watching, "Pin watch toggled");

        self.pin_changed(id);
        true
    }

    /// Marks everything currently known about the pin as seen.
    pub fn on_bottom_post_viewed(&mut self, id: PinId) -> bool {
        let Some(pin) = self.store.get_mut(id) else {
            return false;
        };
        if pin.watch_new_count >= 0 {
            pin.watch_last_count = pin.watch_new_count;
        }
        if pin.quote_new_count >= 0 {
            pin.quote_last_count = pin.quote_new_count;
        }
        if let Some(watcher) = self.watchers.get_mut(&id) {
            watcher.clear_new_flags();
        }

        self.pin_changed(id);
        true
    }

    pub fn pause_all(&mut self) {
        let ids: Vec<PinId> = self.watching_pins().iter().map(|p| p.id).collect();
        for id in &ids {
            if let Some(pin) = self.store.get_mut(*id) {
                pin.watching = false;
            }
        }
        tracing::info!(paused = ids.len(), "Paused all pins");

        self.update_state();
        self.store.flush();
        self.publish_all_changed();
    }

    /// Removes pins and returns copies of them for `add_all`.
    ///
    /// Without `all`, removes pins that are not watching while watching is
    /// enabled, or dead (archived or errored) pins while it is disabled.
    pub fn clear_pins(&mut self, all: bool) -> Vec<Pin> {
        let watch_enabled = self.settings.enabled;
        let removed: Vec<Pin> = self
            .store
            .all()
            .iter()
            .filter(|pin| {
                all || if watch_enabled {
                    !pin.watching
                } else {
                    pin.archived || pin.is_error
                }
            })
            .cloned()
            .collect();

        for pin in &removed {
            self.delete_pin(pin.id);
        }
        removed
    }

    pub fn move_pin(&mut self, id: PinId, to_index: usize) -> bool {
        if !self.store.move_pin(id, to_index) {
            return false;
        }
        self.publish(PinEvent::Changed, id);
        true
    }

    pub fn on_app_foreground_changed(&mut self, in_foreground: bool) {
        if self.in_foreground == in_foreground {
            return;
        }
        self.in_foreground = in_foreground;
        tracing::info!(in_foreground, "Foreground state changed");

        self.update_state();
        if !in_foreground {
            self.store.flush();
        }
    }

    pub fn on_global_setting_changed(&mut self, setting: GlobalSetting) {
        match setting {
            GlobalSetting::WatchEnabled(enabled) => self.settings.enabled = enabled,
            GlobalSetting::BackgroundEnabled(enabled) => self.settings.background = enabled,
        }
        tracing::info!(?setting, "Watch setting changed");

        self.update_state();
        self.publish_all_changed();
    }

    /// Takes new timing policy and global flags from reloaded settings.
    pub fn apply_watch_settings(&mut self, settings: WatchSettings) {
        self.interval
            .set_intervals(settings.foreground_interval(), settings.background_interval());
        self.settings.foreground_interval_secs = settings.foreground_interval_secs;
        self.settings.background_interval_secs = settings.background_interval_secs;
        self.settings.alarm_debounce_secs = settings.alarm_debounce_secs;

        if settings.enabled != self.settings.enabled {
            self.on_global_setting_changed(GlobalSetting::WatchEnabled(settings.enabled));
        }
        if settings.background != self.settings.background {
            self.on_global_setting_changed(GlobalSetting::BackgroundEnabled(settings.background));
        }
    }

    /// Handles the background alarm. Returns whether a cycle ran.
    pub fn on_alarm_fired(&mut self) -> bool {
        self.on_alarm_fired_at(Instant::now())
    }

    pub fn on_alarm_fired_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_alarm {
            let since = now.saturating_duration_since(last);
            if since < self.settings.alarm_debounce() {
                tracing::warn!(
                    since_secs = since.as_secs(),
                    "Background update ignored because it was requested too soon"
                );
                return false;
            }
        }
        self.last_alarm = Some(now);
        self.run_cycle(true);
        true
    }

    pub fn run_foreground_tick(&mut self) {
        if self.interval.current() != IntervalState::Foreground {
            tracing::debug!(state = %self.interval.current(), "Skipping stale foreground tick");
            return;
        }
        self.run_cycle(false);
        self.interval.rearm_foreground();
    }

    /// Asks every watching pin's watcher to update. Background cycles hold
    /// the wake lock until every load they started has completed.
    pub fn run_cycle(&mut self, from_background: bool) {
        tracing::debug!(from_background, "Running watch cycle");
        if from_background {
            self.barrier.begin();
        }

        let ids: Vec<PinId> = self.watching_pins().iter().map(|p| p.id).collect();
        let mut started = Vec::new();
        for id in ids {
            let (Some(pin), Some(watcher)) = (self.store.find_by_id(id), self.watchers.get_mut(&id))
            else {
                continue;
            };
            if watcher.update(pin, self.loader.as_mut(), from_background) {
                started.push(id);
            }
        }

        for id in started {
            self.publish(PinEvent::Changed, id);
            if from_background {
                self.barrier.track(id);
            }
        }

        if from_background {
            self.barrier.commit();
        }
    }

    pub fn on_load_completion(&mut self, completion: LoadCompletion) {
        let Some(id) = self
            .watchers
            .iter()
            .find(|(_, w)| w.handle() == completion.handle)
            .map(|(id, _)| *id)
        else {
            tracing::debug!(handle = %completion.handle, "Dropping completion for a released loader");
            return;
        };

        let (Some(pin), Some(watcher)) = (self.store.get_mut(id), self.watchers.get_mut(&id)) else {
            return;
        };
        match completion.outcome {
            Ok(thread) => watcher.on_data(pin, thread, self.loader.as_ref()),
            Err(error) => watcher.on_error(pin, &error),
        }

        self.pin_watcher_updated(id);
    }

    /// Stops all timers and loads and writes every pin out.
    pub fn shutdown(&mut self) {
        self.interval.apply(IntervalState::None);
        self.barrier.abandon();
        for (_, watcher) in self.watchers.drain() {
            watcher.destroy(self.loader.as_mut());
        }
        self.service.stop();
        self.store.flush();
        tracing::info!("Watch coordinator stopped");
    }

    /// Pins the scheduler polls. Empty while watching is globally disabled.
    pub fn watching_pins(&self) -> Vec<&Pin> {
        if !self.settings.enabled {
            return Vec::new();
        }
        self.store.all().iter().filter(|p| p.watching).collect()
    }

    pub fn all_pins(&self) -> &[Pin] {
        self.store.all()
    }

    pub fn find_pin_by_id(&self, id: PinId) -> Option<&Pin> {
        self.store.find_by_id(id)
    }

    pub fn find_pin_by_loadable(&self, loadable: &Loadable) -> Option<&Pin> {
        self.store.find_by_loadable(loadable)
    }

    pub fn pin_watcher(&self, id: PinId) -> Option<&PinWatcher> {
        self.watchers.get(&id)
    }

    pub fn pin_watcher_mut(&mut self, id: PinId) -> Option<&mut PinWatcher> {
        self.watchers.get_mut(&id)
    }

    pub fn interval_state(&self) -> IntervalState {
        self.interval.current()
    }

    fn pin_changed(&mut self, id: PinId) {
        self.store.persist(id);
        self.update_state();
        self.publish(PinEvent::Changed, id);
    }

    fn pin_watcher_updated(&mut self, id: PinId) {
        self.update_state();
        self.store.persist(id);
        self.publish(PinEvent::Changed, id);
        self.barrier.complete(id);
    }

    /// Re-derives the interval state and brings watchers and the service
    /// in line with it.
    fn update_state(&mut self) {
        let watch_enabled = !self.watching_pins().is_empty();
        let background_enabled = self.settings.background;
        let target = IntervalState::derive(watch_enabled, self.in_foreground, background_enabled);
        tracing::debug!(
            watch_enabled,
            background_enabled,
            in_foreground = self.in_foreground,
            %target,
            "Updating watch state"
        );

        self.interval.apply(target);
        self.reconcile_watchers();

        if watch_enabled && background_enabled {
            self.service.start();
        } else {
            self.service.stop();
        }
    }

    fn reconcile_watchers(&mut self) {
        let stale: Vec<PinId> = self
            .watchers
            .keys()
            .filter(|id| !self.settings.enabled || self.store.find_by_id(**id).is_none())
            .copied()
            .collect();
        for id in stale {
            self.destroy_watcher(id);
        }

        if !self.settings.enabled {
            return;
        }
        for pin in self.store.all() {
            if !self.watchers.contains_key(&pin.id) {
                let sink = CompletionSink::new(self.completions.clone());
                let watcher = PinWatcher::new(pin, self.loader.as_mut(), sink);
                self.watchers.insert(pin.id, watcher);
            }
        }
    }

    fn destroy_watcher(&mut self, id: PinId) {
        if let Some(watcher) = self.watchers.remove(&id) {
            self.barrier.forget(id);
            watcher.destroy(self.loader.as_mut());
        }
    }

    fn publish(&mut self, event: fn(Pin) -> PinEvent, id: PinId) {
        if let Some(pin) = self.store.find_by_id(id) {
            self.events.publish(event(pin.clone()));
        }
    }

    fn publish_all_changed(&mut self) {
        for pin in self.store.all() {
            self.events.publish(PinEvent::Changed(pin.clone()));
        }
    }
}
