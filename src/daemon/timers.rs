use super::app::DaemonEvent;
use crate::watch::{AlarmScheduler, AlarmToken, ForegroundTimer};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// One-shot tick delivered to the daemon loop after a delay.
pub struct TokioForegroundTimer {
    tx: mpsc::UnboundedSender<DaemonEvent>,
    pending: Option<JoinHandle<()>>,
}

impl TokioForegroundTimer {
    pub fn new(tx: mpsc::UnboundedSender<DaemonEvent>) -> Self {
        Self { tx, pending: None }
    }
}

impl ForegroundTimer for TokioForegroundTimer {
    fn schedule(&mut self, delay: Duration) {
        self.cancel();
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(DaemonEvent::ForegroundTick);
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for TokioForegroundTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Repeating alarms backed by tokio intervals. The first firing comes one
/// full period after registration.
pub struct TokioAlarmScheduler {
    tx: mpsc::UnboundedSender<DaemonEvent>,
    alarms: HashMap<AlarmToken, JoinHandle<()>>,
}

impl TokioAlarmScheduler {
    pub fn new(tx: mpsc::UnboundedSender<DaemonEvent>) -> Self {
        Self {
            tx,
            alarms: HashMap::new(),
        }
    }
}

impl AlarmScheduler for TokioAlarmScheduler {
    fn register(&mut self, token: AlarmToken, interval: Duration) {
        self.unregister(token);
        tracing::info!(%token, interval_secs = interval.as_secs(), "Registering alarm");

        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(DaemonEvent::AlarmFired(token)).is_err() {
                    break;
                }
            }
        });
        self.alarms.insert(token, task);
    }

    fn unregister(&mut self, token: AlarmToken) {
        if let Some(task) = self.alarms.remove(&token) {
            tracing::info!(%token, "Unregistering alarm");
            task.abort();
        }
    }
}

impl Drop for TokioAlarmScheduler {
    fn drop(&mut self) {
        for (_, task) in self.alarms.drain() {
            task.abort();
        }
    }
}
