//! Reconfigurable periodic timer.
//!
//! The period lives in a `watch` channel: the owner resets it, the loop
//! holding [`Ticks`] picks the new value up without being restarted. A
//! reset restarts the countdown from the moment of the reset.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Period meaning "never fires" (one hundred years).
pub const OFF_PERIOD: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Owner side of a periodic timer.
#[derive(Debug)]
pub struct PeriodicTimer {
    name: &'static str,
    tx: watch::Sender<Duration>,
    resets: AtomicU64,
}

/// Firing side of a periodic timer, held by exactly one loop.
#[derive(Debug)]
pub struct Ticks {
    rx: watch::Receiver<Duration>,
    deadline: Option<Instant>,
}

impl PeriodicTimer {
    /// Create a timer that starts switched off.
    pub fn new(name: &'static str) -> (Self, Ticks) {
        let (tx, rx) = watch::channel(OFF_PERIOD);
        (
            Self {
                name,
                tx,
                resets: AtomicU64::new(0),
            },
            Ticks { rx, deadline: None },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        *self.tx.borrow()
    }

    pub fn is_off(&self) -> bool {
        self.period() >= OFF_PERIOD
    }

    /// Number of resets since creation.
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    /// Change the period and restart the countdown.
    pub fn reset(&self, period: Duration) {
        tracing::debug!(timer = self.name, period_secs = period.as_secs(), "Timer reset");
        self.resets.fetch_add(1, Ordering::Relaxed);
        self.tx.send_replace(period);
    }

    pub fn turn_off(&self) {
        self.reset(OFF_PERIOD);
    }
}

impl Ticks {
    /// Wait for the next firing.
    ///
    /// Returns `false` once the owning [`PeriodicTimer`] is dropped.
    pub async fn tick(&mut self) -> bool {
        loop {
            // A reset made between two calls restarts the countdown too.
            if matches!(self.rx.has_changed(), Ok(true)) {
                self.deadline = None;
            }
            let period = *self.rx.borrow_and_update();
            if period.is_zero() || period >= OFF_PERIOD {
                self.deadline = None;
                if self.rx.changed().await.is_err() {
                    return false;
                }
                continue;
            }

            let deadline = *self.deadline.get_or_insert_with(|| Instant::now() + period);
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    self.deadline = Some(deadline + period);
                    return true;
                }
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    self.deadline = None;
                }
            }
        }
    }
}
