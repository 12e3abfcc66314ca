mod barrier;
mod coordinator;
mod events;
mod interval;
mod platform;
mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::WatchCoordinator;
pub use events::PinEvent;
pub use interval::WATCH_ALARM;
pub use platform::{AlarmScheduler, AlarmToken, ForegroundService, ForegroundTimer, Platform, WakeLock};
