use crate::auction::{Amount, Auction};
use crate::clock::{Alarm, AlarmCallback, SharedClock};
use crate::error::{AuctionSiteError, EntityKind, Result};
use crate::password::SharedPasswordHasher;
use crate::persistence::{with_transaction, SharedPersistence, Transaction};
use crate::session::{self, Session, SessionRecord};
use crate::user::User;
use crate::validation;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type SiteId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteRecord {
    pub id: SiteId,
    pub name: String,
    pub timezone: i32,
    pub session_expiration_secs: i64,
    pub minimum_bid_increment: Amount,
}

#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: String,
    pub timezone: i32,
    pub session_expiration_secs: i64,
    pub minimum_bid_increment: Amount,
}

/// Everything a handle of a loaded site needs to re-validate itself
pub(crate) struct SiteContext {
    pub(crate) site_id: SiteId,
    pub(crate) name: String,
    pub(crate) persistence: SharedPersistence,
    pub(crate) clock: SharedClock,
    pub(crate) hasher: SharedPasswordHasher,
    /// Keeps the session reaper ringing for as long as any handle is alive
    _reaper: Alarm,
}

impl SiteContext {
    pub(crate) fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        with_transaction(&*self.persistence, f)
    }

    pub(crate) fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Live-check of the site itself
    ///
    /// A site deleted and re-created under the same name is a different site.
    pub(crate) fn load_site(&self, transaction: &mut dyn Transaction) -> Result<SiteRecord> {
        transaction
            .site_by_name(&self.name)?
            .filter(|s| s.id == self.site_id)
            .ok_or(AuctionSiteError::EntityDeleted(EntityKind::Site))
    }
}

/// Alarm callback removing the expired sessions of a site
///
/// Uses a single predicate delete, so a session refreshed after `now` was
/// taken is left alone.
pub(crate) fn session_reaper(
    persistence: SharedPersistence,
    site_id: SiteId,
    name: String,
) -> AlarmCallback {
    Arc::new(move |now| {
        match with_transaction(&*persistence, |tr| {
            Ok(tr.delete_expired_sessions(site_id, now)?)
        }) {
            Ok(0) => {}
            Ok(reaped) => debug!(site = %name, reaped, "expired sessions removed"),
            Err(e) => warn!(site = %name, error = %e, "session reaping failed"),
        }
    })
}

/// Handle to a loaded site
#[derive(Clone)]
pub struct Site {
    ctx: Arc<SiteContext>,
    record: SiteRecord,
}

impl Site {
    pub(crate) fn new(
        record: SiteRecord,
        persistence: SharedPersistence,
        clock: SharedClock,
        hasher: SharedPasswordHasher,
        reaper: Alarm,
    ) -> Self {
        Self {
            ctx: Arc::new(SiteContext {
                site_id: record.id,
                name: record.name.clone(),
                persistence,
                clock,
                hasher,
                _reaper: reaper,
            }),
            record,
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn timezone(&self) -> i32 {
        self.record.timezone
    }

    pub fn session_expiration_secs(&self) -> i64 {
        self.record.session_expiration_secs
    }

    pub fn minimum_bid_increment(&self) -> Amount {
        self.record.minimum_bid_increment
    }

    /// Current local time of the site
    pub fn now(&self) -> Result<NaiveDateTime> {
        self.ctx.transaction(|tr| self.ctx.load_site(tr))?;
        Ok(self.ctx.now())
    }

    /// All users of the site
    pub fn users(&self) -> Result<Vec<User>> {
        self.ctx.transaction(|tr| {
            let site = self.ctx.load_site(tr)?;
            Ok(tr
                .list_users(site.id)?
                .into_iter()
                .map(|u| User::new(self.ctx.clone(), u.username))
                .collect())
        })
    }

    /// All sessions of the site, expired ones included until they are reaped
    pub fn sessions(&self) -> Result<Vec<Session>> {
        self.ctx.transaction(|tr| {
            let site = self.ctx.load_site(tr)?;
            tr.list_sessions(site.id)?
                .into_iter()
                .map(|s| {
                    let user = tr
                        .user_by_id(s.user_id)?
                        .ok_or(AuctionSiteError::EntityDeleted(EntityKind::User))?;
                    Ok(Session::new(self.ctx.clone(), s.id, user.username))
                })
                .collect()
        })
    }

    /// All auctions of the site, or only those that have not ended yet
    pub fn auctions(&self, only_not_ended: bool) -> Result<Vec<Auction>> {
        self.ctx.transaction(|tr| {
            let site = self.ctx.load_site(tr)?;
            let now = self.ctx.now();
            let records = tr
                .list_auctions(site.id)?
                .into_iter()
                .filter(|a| !only_not_ended || now <= a.ends_on)
                .collect();
            Auction::from_records(&self.ctx, tr, records)
        })
    }

    pub fn create_user(&self, username: &str, password: &str) -> Result<User> {
        validation::check_credentials(username, password)?;
        let password_hash = self.ctx.hasher.hash(password)?;

        self.ctx.transaction(|tr| {
            let site = self.ctx.load_site(tr)?;
            tr.insert_user(site.id, username, &password_hash)
                .map_err(|e| AuctionSiteError::from_store_with_name(e, username))?;
            info!(site = %site.name, user = %username, "user created");
            Ok(User::new(self.ctx.clone(), username.to_owned()))
        })
    }

    /// Log a user in
    ///
    /// Wrong credentials are not an error: they yield `None`. Logging in again
    /// returns the same session with its expiration pushed forward.
    pub fn login(&self, username: &str, password: &str) -> Result<Option<Session>> {
        validation::check_credentials(username, password)?;

        self.ctx.transaction(|tr| {
            let site = self.ctx.load_site(tr)?;
            let Some(user) = tr
                .user_by_name(site.id, username)?
                .filter(|u| self.ctx.hasher.verify(password, &u.password_hash))
            else {
                debug!(site = %site.name, user = %username, "login refused");
                return Ok(None);
            };

            let now = self.ctx.now();
            let stored = tr.upsert_session(&SessionRecord {
                id: session::id_for(user.id),
                site_id: site.id,
                user_id: user.id,
                valid_until: session::expiry(now, site.session_expiration_secs)?,
            })?;

            debug!(
                site = %site.name,
                user = %username,
                valid_until = %stored.valid_until,
                "logged in"
            );
            Ok(Some(Session::new(self.ctx.clone(), stored.id, user.username)))
        })
    }

    /// Remove expired sessions now, without waiting for the alarm
    pub fn reap_expired_sessions(&self) -> Result<u64> {
        self.ctx.transaction(|tr| {
            let site = self.ctx.load_site(tr)?;
            Ok(tr.delete_expired_sessions(site.id, self.ctx.now())?)
        })
    }

    /// Remove the site with all its users, sessions and auctions
    pub fn delete(&self) -> Result<()> {
        self.ctx.transaction(|tr| {
            let site = self.ctx.load_site(tr)?;
            tr.delete_site(site.id)?;
            info!(site = %site.name, "site deleted");
            Ok(())
        })
    }
}

impl PartialEq for Site {
    fn eq(&self, other: &Self) -> bool {
        self.ctx.site_id == other.ctx.site_id && self.record.name == other.record.name
    }
}

impl Eq for Site {}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("name", &self.record.name)
            .field("timezone", &self.record.timezone)
            .finish()
    }
}
