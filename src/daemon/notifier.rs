use crate::core::models::PinId;
use crate::core::notifications::{self, PinActivity};
use crate::watch::{ForegroundService, WatchCoordinator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Desktop notifier for new posts and quotes. It only reports while the
/// coordinator keeps it running, which is whenever background watching is
/// active.
#[derive(Debug, Clone, Default)]
pub struct WatchNotifier {
    running: Arc<AtomicBool>,
}

impl WatchNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consumes the new-data flags of changed pins and notifies when any of
    /// them saw new posts or quotes.
    pub fn on_pins_changed(
        &self,
        coordinator: &mut WatchCoordinator,
        changed: &[PinId],
        notifications_enabled: bool,
    ) {
        if !self.is_running() {
            return;
        }

        let mut any_new = false;
        for id in changed {
            if let Some(watcher) = coordinator.pin_watcher_mut(*id) {
                let new_posts = watcher.take_were_new_posts();
                let new_quotes = watcher.take_were_new_quotes();
                any_new |= new_posts || new_quotes;
            }
        }
        if !any_new || !notifications_enabled {
            return;
        }

        let Some(summary) = notifications::summarize(&activity(coordinator)) else {
            return;
        };
        tokio::task::spawn_blocking(move || {
            if let Err(e) = notifications::send_watch_notification(&summary) {
                tracing::warn!(error = %e, "Failed to send watch notification");
            }
        });
    }
}

fn activity(coordinator: &WatchCoordinator) -> Vec<PinActivity> {
    coordinator
        .watching_pins()
        .into_iter()
        .filter_map(|pin| {
            let watcher = coordinator.pin_watcher(pin.id)?;
            Some(PinActivity {
                title: pin.title.clone(),
                new_posts: watcher.unviewed_posts(pin).len(),
                new_quotes: watcher.unviewed_quotes(pin).len(),
            })
        })
        .collect()
}

impl ForegroundService for WatchNotifier {
    fn start(&mut self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Watch notifier started");
        }
    }

    fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Watch notifier stopped");
        }
    }
}
