//! Entry point of the marketplace
//!
//! A [`Host`] owns the store, the clocks and the password hasher, and hands
//! out [`Site`] handles bound to them.
use crate::auction::Amount;
use crate::clock::SharedClockFactory;
use crate::error::{AuctionSiteError, Result};
use crate::password::{Argon2Hasher, SharedPasswordHasher};
use crate::persistence::{with_transaction, Persistence, SharedPersistence};
use crate::site::{self, NewSite, Site};
use crate::validation;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How often each loaded site removes its expired sessions
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteInfo {
    pub name: String,
    pub timezone: i32,
}

pub struct Host {
    persistence: SharedPersistence,
    clock_factory: SharedClockFactory,
    hasher: SharedPasswordHasher,
    reap_interval: Duration,
}

impl Host {
    /// Drop everything in the store and lay down an empty schema
    pub fn create_schema(persistence: &dyn Persistence) -> Result<()> {
        persistence.initialize(true)?;
        info!("schema created");
        Ok(())
    }

    /// Connect to an existing store, creating the schema if it is missing
    pub fn new(persistence: SharedPersistence, clock_factory: SharedClockFactory) -> Result<Self> {
        persistence.initialize(false)?;
        Ok(Self {
            persistence,
            clock_factory,
            hasher: Arc::new(Argon2Hasher::default()),
            reap_interval: DEFAULT_REAP_INTERVAL,
        })
    }

    pub fn with_reap_interval(self, reap_interval: Duration) -> Self {
        Self {
            reap_interval,
            ..self
        }
    }

    pub fn with_password_hasher(self, hasher: SharedPasswordHasher) -> Self {
        Self { hasher, ..self }
    }

    /// Name and timezone of every site
    pub fn site_infos(&self) -> Result<Vec<SiteInfo>> {
        with_transaction(&*self.persistence, |tr| {
            Ok(tr
                .list_sites()?
                .into_iter()
                .map(|s| SiteInfo {
                    name: s.name,
                    timezone: s.timezone,
                })
                .collect())
        })
    }

    pub fn create_site(
        &self,
        name: &str,
        timezone: i32,
        session_expiration_secs: i64,
        minimum_bid_increment: Amount,
    ) -> Result<()> {
        validation::check_site_name(name)?;
        validation::check_site_parameters(timezone, session_expiration_secs, minimum_bid_increment)?;

        with_transaction(&*self.persistence, |tr| {
            let site = tr
                .insert_site(&NewSite {
                    name: name.to_owned(),
                    timezone,
                    session_expiration_secs,
                    minimum_bid_increment,
                })
                .map_err(|e| AuctionSiteError::from_store_with_name(e, name))?;
            info!(site = %site.name, id = site.id, timezone, "site created");
            Ok(())
        })
    }

    /// Load a site and start reaping its expired sessions
    ///
    /// Reaping goes on for as long as a handle derived from the returned
    /// site (users, sessions, auctions included) is alive.
    pub fn load_site(&self, name: &str) -> Result<Site> {
        validation::check_site_name(name)?;

        let record = with_transaction(&*self.persistence, |tr| {
            tr.site_by_name(name)?
                .ok_or_else(|| AuctionSiteError::InexistentName(name.to_owned()))
        })?;

        let clock = self.clock_factory.clock_for(record.timezone);
        let reaper = clock.schedule_recurring(
            self.reap_interval,
            site::session_reaper(self.persistence.clone(), record.id, record.name.clone()),
        );
        info!(site = %record.name, "site loaded");

        Ok(Site::new(
            record,
            self.persistence.clone(),
            clock,
            self.hasher.clone(),
            reaper,
        ))
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("reap_interval", &self.reap_interval)
            .finish()
    }
}
