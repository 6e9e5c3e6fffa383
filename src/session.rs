use crate::auction::{Amount, Auction, NewAuction};
use crate::error::{AuctionSiteError, EntityKind, Result};
use crate::persistence::Transaction;
use crate::site::{SiteContext, SiteId};
use crate::user::{User, UserId};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

pub type SessionId = String;
pub type SessionIdRef<'a> = &'a str;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub site_id: SiteId,
    pub user_id: UserId,
    pub valid_until: NaiveDateTime,
}

/// Session identity is derived from its user: one user, at most one session
pub(crate) fn id_for(user_id: UserId) -> SessionId {
    format!("session-{user_id}")
}

/// New expiration time of a session touched at `now`
pub(crate) fn expiry(now: NaiveDateTime, session_expiration_secs: i64) -> Result<NaiveDateTime> {
    chrono::Duration::try_seconds(session_expiration_secs)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| {
            AuctionSiteError::ArgumentOutOfRange(format!(
                "session expiration of {session_expiration_secs}s from {now} is out of range"
            ))
        })
}

/// Push the expiration of session `id` forward from `now`
///
/// The session must still exist: it was read earlier in the same transaction.
pub(crate) fn slide(
    transaction: &mut dyn Transaction,
    id: SessionIdRef,
    now: NaiveDateTime,
    session_expiration_secs: i64,
) -> Result<()> {
    let valid_until = expiry(now, session_expiration_secs)?;
    if !transaction.update_session_valid_until(id, valid_until)? {
        return Err(AuctionSiteError::OperationNotAllowed(
            "session expired or logged out".to_owned(),
        ));
    }
    Ok(())
}

/// An existing session record is usable only strictly before `valid_until`
pub(crate) fn is_live(session: &SessionRecord, now: NaiveDateTime) -> bool {
    now < session.valid_until
}

/// Handle to a login session
#[derive(Clone)]
pub struct Session {
    ctx: Arc<SiteContext>,
    id: SessionId,
    username: String,
}

impl Session {
    pub(crate) fn new(ctx: Arc<SiteContext>, id: SessionId, username: String) -> Self {
        Self { ctx, id, username }
    }

    pub fn id(&self) -> SessionIdRef<'_> {
        &self.id
    }

    /// The user who logged in
    pub fn user(&self) -> User {
        User::new(self.ctx.clone(), self.username.clone())
    }

    pub fn valid_until(&self) -> Result<NaiveDateTime> {
        self.ctx.transaction(|tr| {
            Ok(tr
                .session_by_id(&self.id)?
                .ok_or(AuctionSiteError::EntityDeleted(EntityKind::Session))?
                .valid_until)
        })
    }

    /// Whether the session still exists and has not expired
    pub fn is_valid(&self) -> Result<bool> {
        self.ctx.transaction(|tr| {
            let now = self.ctx.now();
            Ok(tr
                .session_by_id(&self.id)?
                .map_or(false, |s| is_live(&s, now)))
        })
    }

    pub fn logout(&self) -> Result<()> {
        self.ctx.transaction(|tr| {
            if !tr.delete_session(&self.id)? {
                return Err(AuctionSiteError::EntityDeleted(EntityKind::Session));
            }
            debug!(site = %self.ctx.name, user = %self.username, "logged out");
            Ok(())
        })
    }

    /// Put something up for sale on behalf of the session owner
    ///
    /// An expired session is refused just like one that was logged out or
    /// reaped. On success the session expiration slides forward.
    pub fn create_auction(
        &self,
        description: &str,
        ends_on: NaiveDateTime,
        starting_price: Amount,
    ) -> Result<Auction> {
        self.ctx.transaction(|tr| {
            let now = self.ctx.now();
            let session = tr
                .session_by_id(&self.id)?
                .filter(|s| is_live(s, now))
                .ok_or_else(|| {
                    AuctionSiteError::OperationNotAllowed(
                        "session expired or logged out".to_owned(),
                    )
                })?;
            if description.is_empty() {
                return Err(AuctionSiteError::ArgumentInvalid(
                    "description must not be empty".to_owned(),
                ));
            }
            if starting_price < 0 {
                return Err(AuctionSiteError::ArgumentOutOfRange(format!(
                    "starting price must not be negative, got {starting_price}"
                )));
            }
            if ends_on < now {
                return Err(AuctionSiteError::UnavailableTimeMachine(format!(
                    "auction would end on {ends_on}, before {now}"
                )));
            }
            let seller = tr.user_for_share(session.user_id)?.ok_or_else(|| {
                AuctionSiteError::OperationNotAllowed("session owner no longer exists".to_owned())
            })?;
            let site = self.ctx.load_site(tr)?;

            let record = tr.insert_auction(&NewAuction {
                site_id: site.id,
                seller_id: seller.id,
                description: description.to_owned(),
                ends_on,
                starting_price,
            })?;
            slide(tr, &self.id, now, site.session_expiration_secs)?;

            info!(
                site = %site.name,
                seller = %seller.username,
                auction = record.id,
                "auction created"
            );
            Ok(Auction::from_record(self.ctx.clone(), record, seller.username))
        })
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Session {}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("site", &self.ctx.name)
            .field("user", &self.username)
            .finish()
    }
}
