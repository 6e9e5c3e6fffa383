//! Clock abstraction
//!
//! Every site reads "now" from its own clock (one per timezone) and asks it to
//! ring the session reaper periodically. [`ManualClock`] is the simulated
//! clock used by tests, [`SystemClock`] follows the wall clock.
mod manual;
mod system;

pub use self::manual::*;
pub use self::system::*;

use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked each time an alarm rings, with the clock's current time
pub type AlarmCallback = Arc<dyn Fn(NaiveDateTime) + Send + Sync + 'static>;

pub trait Clock: Send + Sync {
    /// Current local time of the clock's timezone
    fn now(&self) -> NaiveDateTime;

    fn timezone(&self) -> i32;

    /// Call `callback` every `interval` until the returned [`Alarm`] is dropped
    fn schedule_recurring(&self, interval: Duration, callback: AlarmCallback) -> Alarm;
}

pub type SharedClock = Arc<dyn Clock>;

/// Hands out one clock per timezone
pub trait ClockFactory: Send + Sync {
    fn clock_for(&self, timezone: i32) -> SharedClock;
}

pub type SharedClockFactory = Arc<dyn ClockFactory>;

/// A scheduled recurring callback
///
/// Dropping it stops the callback from being called again.
pub struct Alarm {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Alarm {
    /// `cancel` runs once, when the alarm is dropped
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Alarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alarm")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
