//! OS scheduling capabilities the watch scheduler relies on.

use std::fmt;
use std::time::Duration;

/// One-shot delayed callback. Scheduling again replaces the pending one.
pub trait ForegroundTimer: Send {
    fn schedule(&mut self, delay: Duration);
    fn cancel(&mut self);
}

/// Opaque key for a repeating wake-up registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmToken(pub &'static str);

impl fmt::Display for AlarmToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Repeating wake-up alarms. Registering an already registered token
/// replaces its interval.
pub trait AlarmScheduler: Send {
    fn register(&mut self, token: AlarmToken, interval: Duration);
    fn unregister(&mut self, token: AlarmToken);
}

/// Exclusive lock keeping the device awake. Callers keep acquire and
/// release balanced.
pub trait WakeLock: Send {
    fn acquire(&mut self);
    fn release(&mut self);
}

/// Long-running companion service (the watch notifier). Both calls are
/// idempotent.
pub trait ForegroundService: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

/// The capability set handed to the coordinator.
pub struct Platform {
    pub timer: Box<dyn ForegroundTimer>,
    pub alarms: Box<dyn AlarmScheduler>,
    pub wake_lock: Box<dyn WakeLock>,
    pub service: Box<dyn ForegroundService>,
}
