use std::time::Duration;

/// Delay between loads of one thread, stepping up while nothing new arrives.
const WATCH_DELAYS_SECS: [u64; 13] = [10, 15, 20, 30, 60, 90, 120, 180, 240, 300, 600, 1800, 3600];

#[derive(Debug, Clone)]
pub struct WatchBackoff {
    step: usize,
    last_post_count: Option<usize>,
    consecutive_failures: u32,
}

impl WatchBackoff {
    pub fn new() -> Self {
        Self {
            step: 0,
            last_post_count: None,
            consecutive_failures: 0,
        }
    }

    /// Records a successful load; new posts reset the delay to the shortest step.
    pub fn record_success(&mut self, post_count: usize) {
        self.consecutive_failures = 0;
        let grew = self.last_post_count.map_or(true, |last| post_count > last);
        self.last_post_count = Some(post_count);

        if grew {
            self.step = 0;
        } else {
            self.step_up();
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.step_up();
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    pub fn current_delay(&self) -> Duration {
        Duration::from_secs(WATCH_DELAYS_SECS[self.step])
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_in_backoff(&self) -> bool {
        self.consecutive_failures > 0
    }

    fn step_up(&mut self) {
        self.step = (self.step + 1).min(WATCH_DELAYS_SECS.len() - 1);
    }
}

impl Default for WatchBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_delay() {
        let state = WatchBackoff::new();
        assert_eq!(state.current_delay(), Duration::from_secs(10));
        assert_eq!(state.consecutive_failures(), 0);
        assert!(!state.is_in_backoff());
    }

    #[test]
    fn test_unchanged_thread_steps_up() {
        let mut state = WatchBackoff::new();
        state.record_success(5);
        assert_eq!(state.current_delay(), Duration::from_secs(10));

        state.record_success(5);
        assert_eq!(state.current_delay(), Duration::from_secs(15));

        state.record_success(5);
        assert_eq!(state.current_delay(), Duration::from_secs(20));

        state.record_success(6);
        assert_eq!(state.current_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_max_delay_cap() {
        let mut state = WatchBackoff::new();
        for _ in 0..50 {
            state.record_failure();
        }
        assert_eq!(state.current_delay(), Duration::from_secs(3600));
        assert_eq!(state.consecutive_failures(), 50);
    }

    #[test]
    fn test_success_clears_failures() {
        let mut state = WatchBackoff::new();
        state.record_failure();
        state.record_failure();
        assert!(state.is_in_backoff());

        state.record_success(1);
        assert!(!state.is_in_backoff());
        assert_eq!(state.current_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_reset_returns_to_shortest_delay() {
        let mut state = WatchBackoff::new();
        state.record_failure();
        state.record_failure();
        state.reset();
        assert_eq!(state.current_delay(), Duration::from_secs(10));
    }
}
