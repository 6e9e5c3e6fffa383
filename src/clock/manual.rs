use super::*;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Weak;

struct ScheduledAlarm {
    interval: chrono::Duration,
    next_ring: NaiveDateTime,
    callback: AlarmCallback,
}

#[derive(Default)]
struct Alarms {
    last_id: u64,
    scheduled: BTreeMap<u64, ScheduledAlarm>,
}

struct ManualClockInner {
    timezone: i32,
    now: Mutex<NaiveDateTime>,
    alarms: Mutex<Alarms>,
}

/// Simulated clock
///
/// Time only moves when told to. Alarms ring from inside [`ManualClock::advance`]
/// (once per `advance`, however many intervals were skipped) or on demand
/// with [`ManualClock::ring`]. Clones share the same time and alarms.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<ManualClockInner>,
}

impl ManualClock {
    pub fn new(timezone: i32, start: NaiveDateTime) -> Self {
        Self {
            inner: Arc::new(ManualClockInner {
                timezone,
                now: Mutex::new(start),
                alarms: Mutex::new(Alarms::default()),
            }),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.inner.now.lock() = now;
        self.ring_due();
    }

    pub fn advance(&self, by: chrono::Duration) {
        {
            let mut now = self.inner.now.lock();
            *now += by;
        }
        self.ring_due();
    }

    /// Ring every scheduled alarm right now, regardless of its interval
    pub fn ring(&self) {
        let now = self.now();
        let callbacks: Vec<_> = self
            .inner
            .alarms
            .lock()
            .scheduled
            .values()
            .map(|a| a.callback.clone())
            .collect();
        for callback in callbacks {
            callback(now);
        }
    }

    pub fn scheduled_alarms(&self) -> usize {
        self.inner.alarms.lock().scheduled.len()
    }

    fn ring_due(&self) {
        let now = self.now();
        let due: Vec<_> = {
            let mut alarms = self.inner.alarms.lock();
            alarms
                .scheduled
                .values_mut()
                .filter(|a| a.next_ring <= now)
                .map(|a| {
                    while a.next_ring <= now {
                        a.next_ring += a.interval;
                    }
                    a.callback.clone()
                })
                .collect()
        };
        // the lock is released: callbacks are free to read the clock
        for callback in due {
            callback(now);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.inner.now.lock()
    }

    fn timezone(&self) -> i32 {
        self.inner.timezone
    }

    fn schedule_recurring(&self, interval: Duration, callback: AlarmCallback) -> Alarm {
        let interval = chrono::Duration::from_std(interval)
            .ok()
            .filter(|i| chrono::Duration::zero() < *i)
            .unwrap_or_else(|| chrono::Duration::seconds(1));
        let id = {
            let mut alarms = self.inner.alarms.lock();
            alarms.last_id += 1;
            let id = alarms.last_id;
            alarms.scheduled.insert(
                id,
                ScheduledAlarm {
                    interval,
                    next_ring: self.now() + interval,
                    callback,
                },
            );
            id
        };

        let inner: Weak<ManualClockInner> = Arc::downgrade(&self.inner);
        Alarm::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.alarms.lock().scheduled.remove(&id);
            }
        })
    }
}

/// Hands out one shared [`ManualClock`] per timezone, all starting at the same instant
#[derive(Clone)]
pub struct ManualClockFactory {
    start: NaiveDateTime,
    clocks: Arc<Mutex<BTreeMap<i32, ManualClock>>>,
}

impl ManualClockFactory {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            start,
            clocks: Arc::default(),
        }
    }

    pub fn clock(&self, timezone: i32) -> ManualClock {
        self.clocks
            .lock()
            .entry(timezone)
            .or_insert_with(|| ManualClock::new(timezone, self.start))
            .clone()
    }
}

impl ClockFactory for ManualClockFactory {
    fn clock_for(&self, timezone: i32) -> SharedClock {
        Arc::new(self.clock(timezone))
    }
}
