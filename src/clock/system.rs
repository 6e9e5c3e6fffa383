use super::*;
use anyhow::{bail, format_err, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, error};

/// How often an alarm thread wakes up to check whether it was cancelled
const TICK: Duration = Duration::from_millis(100);

/// Wall clock shifted by a whole number of hours from UTC
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: i32,
}

impl SystemClock {
    pub fn new(timezone: i32) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc() + chrono::Duration::hours(i64::from(self.timezone))
    }

    fn timezone(&self) -> i32 {
        self.timezone
    }

    fn schedule_recurring(&self, interval: Duration, callback: AlarmCallback) -> Alarm {
        let clock = *self;
        let mut last_ring = Instant::now();

        let handle = spawn_loop(move || {
            let elapsed = last_ring.elapsed();
            if interval <= elapsed {
                last_ring = Instant::now();
                callback(clock.now());
            } else {
                thread::sleep(TICK.min(interval - elapsed));
            }
            Ok(())
        });

        Alarm::new(move || drop(handle))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClockFactory;

impl ClockFactory for SystemClockFactory {
    fn clock_for(&self, timezone: i32) -> SharedClock {
        Arc::new(SystemClock::new(timezone))
    }
}

/// Start a new background loop, with a certain body
///
/// The loop runs until the returned handle is dropped, `f` returns an error
/// or panics.
fn spawn_loop<F>(mut f: F) -> JoinHandle
where
    F: FnMut() -> Result<()> + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));

    JoinHandle::new(
        stop.clone(),
        thread::spawn(move || {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                while !stop.load(Ordering::SeqCst) {
                    f()?;
                }
                Ok(())
            })) {
                Err(_e) => {
                    error!("alarm callback panicked");
                    bail!("alarm panicked");
                }
                Ok(res) => res,
            }
        }),
    )
}

/// Simple thread join wrapper that stops and joins the thread on drop
struct JoinHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<Result<()>>>,
}

impl JoinHandle {
    fn new(stop: Arc<AtomicBool>, handle: thread::JoinHandle<Result<()>>) -> Self {
        JoinHandle {
            stop,
            thread: Some(handle),
        }
    }

    fn join_mut(&mut self) -> Result<()> {
        if let Some(h) = self.thread.take() {
            h.join().map_err(|e| format_err!("join failed: {:?}", e))?
        } else {
            Ok(())
        }
    }
}

impl Drop for JoinHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Err(e) = self.join_mut() {
            debug!(error = %e, "alarm thread ended with an error");
        }
    }
}
