use crate::{
    Argon2Hasher, Host, InMemoryPersistence, ManualClock, ManualClockFactory, SharedPersistence,
    Site,
};
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;

mod bidding_engine;
mod lifecycle;

pub(crate) const PASSWORD: &str = "secret";

pub(crate) fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid date")
}

pub(crate) fn secs(s: i64) -> chrono::Duration {
    chrono::Duration::seconds(s)
}

/// A host over an in-memory store, driven by a manual clock
pub(crate) struct Fixture {
    pub store: Arc<InMemoryPersistence>,
    pub clocks: ManualClockFactory,
    pub host: Host,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        Self::with_reap_interval(crate::host::DEFAULT_REAP_INTERVAL)
    }

    pub fn with_reap_interval(reap_interval: Duration) -> Result<Self> {
        let store = Arc::new(InMemoryPersistence::new());
        let clocks = ManualClockFactory::new(start());
        let shared: SharedPersistence = store.clone();
        let host = Host::new(shared, Arc::new(clocks.clone()))?
            .with_reap_interval(reap_interval)
            .with_password_hasher(Argon2Hasher::new_shared(1, 8)?);
        Ok(Self {
            store,
            clocks,
            host,
        })
    }

    /// Clock of the sites created by [`Fixture::site`]
    pub fn clock(&self) -> ManualClock {
        self.clocks.clock(0)
    }

    pub fn site(&self, name: &str, session_expiration_secs: i64, increment: i64) -> Result<Site> {
        self.host
            .create_site(name, 0, session_expiration_secs, increment)?;
        Ok(self.host.load_site(name)?)
    }
}
