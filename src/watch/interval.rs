use super::platform::{AlarmScheduler, AlarmToken, ForegroundTimer};
use std::fmt;
use std::time::Duration;

pub const WATCH_ALARM: AlarmToken = AlarmToken("pinwatch.watch-update");

/// Which timing regime drives update cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalState {
    /// Self-rescheduling short timer while the app is in the foreground.
    Foreground,
    /// Repeating OS alarm while the app is in the background.
    Background,
    None,
}

impl IntervalState {
    pub fn derive(watch_enabled: bool, in_foreground: bool, background_enabled: bool) -> Self {
        match (watch_enabled, in_foreground, background_enabled) {
            (false, _, _) => IntervalState::None,
            (true, true, _) => IntervalState::Foreground,
            (true, false, true) => IntervalState::Background,
            (true, false, false) => IntervalState::None,
        }
    }
}

impl fmt::Display for IntervalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntervalState::Foreground => "foreground",
            IntervalState::Background => "background",
            IntervalState::None => "none",
        };
        f.write_str(name)
    }
}

/// Owns the foreground timer and the background alarm and keeps exactly
/// the one matching the current state armed.
pub struct IntervalController {
    current: IntervalState,
    timer: Box<dyn ForegroundTimer>,
    alarms: Box<dyn AlarmScheduler>,
    foreground_interval: Duration,
    background_interval: Duration,
}

impl IntervalController {
    pub fn new(
        timer: Box<dyn ForegroundTimer>,
        alarms: Box<dyn AlarmScheduler>,
        foreground_interval: Duration,
        background_interval: Duration,
    ) -> Self {
        Self {
            current: IntervalState::None,
            timer,
            alarms,
            foreground_interval,
            background_interval,
        }
    }

    pub fn current(&self) -> IntervalState {
        self.current
    }

    /// Moves to `target`, tearing down the old regime and arming the new
    /// one. Returns false when already in `target`.
    pub fn apply(&mut self, target: IntervalState) -> bool {
        if self.current == target {
            return false;
        }

        match self.current {
            IntervalState::Foreground => self.timer.cancel(),
            IntervalState::Background => self.alarms.unregister(WATCH_ALARM),
            IntervalState::None => {}
        }

        tracing::info!(from = %self.current, to = %target, "Changing watch interval");
        self.current = target;

        match target {
            IntervalState::Foreground => self.timer.schedule(self.foreground_interval),
            IntervalState::Background => {
                self.alarms.register(WATCH_ALARM, self.background_interval)
            }
            IntervalState::None => {}
        }
        true
    }

    /// Arms the next foreground tick after a cycle finished.
    pub fn rearm_foreground(&mut self) -> bool {
        if self.current != IntervalState::Foreground {
            return false;
        }
        self.timer.schedule(self.foreground_interval);
        true
    }

    pub fn set_intervals(&mut self, foreground: Duration, background: Duration) {
        let background_changed = self.background_interval != background;
        self.foreground_interval = foreground;
        self.background_interval = background;

        if background_changed && self.current == IntervalState::Background {
            self.alarms.register(WATCH_ALARM, background);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::testing::RecordingPlatform;

    fn controller(platform: &RecordingPlatform) -> IntervalController {
        IntervalController::new(
            platform.timer(),
            platform.alarms(),
            Duration::from_secs(15),
            Duration::from_secs(900),
        )
    }

    #[test]
    fn test_derive_truth_table() {
        use IntervalState as S;
        assert_eq!(S::derive(false, true, true), S::None);
        assert_eq!(S::derive(false, false, true), S::None);
        assert_eq!(S::derive(true, true, false), S::Foreground);
        assert_eq!(S::derive(true, true, true), S::Foreground);
        assert_eq!(S::derive(true, false, true), S::Background);
        assert_eq!(S::derive(true, false, false), S::None);
    }

    #[test]
    fn test_entering_foreground_arms_timer() {
        let platform = RecordingPlatform::new();
        let mut controller = controller(&platform);

        assert!(controller.apply(IntervalState::Foreground));
        let log = platform.log();
        assert_eq!(log.timer_scheduled, vec![Duration::from_secs(15)]);
        assert!(log.alarm.is_none());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let platform = RecordingPlatform::new();
        let mut controller = controller(&platform);

        controller.apply(IntervalState::Background);
        assert!(!controller.apply(IntervalState::Background));
        assert_eq!(platform.log().alarm_registrations, 1);
    }

    #[test]
    fn test_leaving_states_tears_down() {
        let platform = RecordingPlatform::new();
        let mut controller = controller(&platform);

        controller.apply(IntervalState::Foreground);
        controller.apply(IntervalState::Background);
        {
            let log = platform.log();
            assert_eq!(log.timer_cancels, 1);
            assert_eq!(log.alarm, Some((WATCH_ALARM, Duration::from_secs(900))));
        }

        controller.apply(IntervalState::None);
        let log = platform.log();
        assert!(log.alarm.is_none());
        assert!(!log.timer_pending);
    }

    #[test]
    fn test_rearm_only_in_foreground() {
        let platform = RecordingPlatform::new();
        let mut controller = controller(&platform);

        assert!(!controller.rearm_foreground());
        controller.apply(IntervalState::Foreground);
        assert!(controller.rearm_foreground());
        assert_eq!(platform.log().timer_scheduled.len(), 2);
    }

    #[test]
    fn test_background_interval_change_reregisters() {
        let platform = RecordingPlatform::new();
        let mut controller = controller(&platform);
        controller.apply(IntervalState::Background);

        controller.set_intervals(Duration::from_secs(15), Duration::from_secs(1800));
        assert_eq!(
            platform.log().alarm,
            Some((WATCH_ALARM, Duration::from_secs(1800)))
        );
    }
}
