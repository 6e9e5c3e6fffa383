//! Database persistence traits
//!
//! The core never talks to a database directly. Everything goes through a
//! [`Transaction`] obtained from a [`Connection`] of a [`Persistence`], and every
//! read-decide-write sequence (a bid, a login, a user deletion) runs inside a
//! single transaction. Backends must make the rows returned by
//! [`Transaction::auction_for_update`], [`Transaction::user_for_update`] and
//! [`Transaction::user_for_share`] stable until commit/rollback.
pub mod in_memory;
pub mod postgres;

pub use self::in_memory::*;
pub use self::postgres::*;

use crate::auction::{Amount, AuctionId, AuctionRecord, NewAuction};
use crate::session::{SessionIdRef, SessionRecord};
use crate::site::{NewSite, SiteId, SiteRecord};
use crate::user::{UserId, UserRecord};
use chrono::NaiveDateTime;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StoreError {
    /// An insert collided with a uniqueness constraint
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    /// Anything else: the store is down, misconfigured, or misbehaving
    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// An instance of a persistence (store) that can hold data
///
/// Must be thread-safe; handed around as [`SharedPersistence`].
pub trait Persistence: Send + Sync {
    /// Get a connection to a store
    fn get_connection(&self) -> StoreResult<Box<dyn Connection>>;

    /// Make sure the schema exists; with `reset` everything is dropped first
    fn initialize(&self, reset: bool) -> StoreResult<()>;
}

pub type SharedPersistence = Arc<dyn Persistence>;

/// A connection to a database/persistence
pub trait Connection {
    fn start_transaction(&mut self) -> StoreResult<Box<dyn Transaction + '_>>;
}

/// A database transaction to a database/persistence
///
/// Dropping a transaction without calling [`Transaction::commit`] discards
/// its writes.
pub trait Transaction {
    fn commit(self: Box<Self>) -> StoreResult<()>;
    fn rollback(self: Box<Self>) -> StoreResult<()>;

    fn insert_site(&mut self, site: &NewSite) -> StoreResult<SiteRecord>;
    fn site_by_name(&mut self, name: &str) -> StoreResult<Option<SiteRecord>>;
    fn site_by_id(&mut self, id: SiteId) -> StoreResult<Option<SiteRecord>>;
    fn list_sites(&mut self) -> StoreResult<Vec<SiteRecord>>;
    /// Remove a site together with its users, sessions and auctions
    fn delete_site(&mut self, id: SiteId) -> StoreResult<bool>;

    fn insert_user(
        &mut self,
        site_id: SiteId,
        username: &str,
        password_hash: &str,
    ) -> StoreResult<UserRecord>;
    fn user_by_name(&mut self, site_id: SiteId, username: &str)
        -> StoreResult<Option<UserRecord>>;
    fn user_by_id(&mut self, id: UserId) -> StoreResult<Option<UserRecord>>;
    /// Like [`Transaction::user_by_name`], but the row is locked exclusively
    /// until the transaction ends
    fn user_for_update(
        &mut self,
        site_id: SiteId,
        username: &str,
    ) -> StoreResult<Option<UserRecord>>;
    /// Like [`Transaction::user_by_id`], but the row cannot be deleted until
    /// the transaction ends
    fn user_for_share(&mut self, id: UserId) -> StoreResult<Option<UserRecord>>;
    fn list_users(&mut self, site_id: SiteId) -> StoreResult<Vec<UserRecord>>;
    /// Remove a user together with its session and the auctions it sold;
    /// auctions it was winning lose their winner.
    fn delete_user(&mut self, id: UserId) -> StoreResult<bool>;

    fn session_by_id(&mut self, id: SessionIdRef) -> StoreResult<Option<SessionRecord>>;
    /// Insert `session`, or refresh the session its user already has
    ///
    /// On refresh the stored id is kept and `valid_until` never moves
    /// backwards. Returns the stored record.
    fn upsert_session(&mut self, session: &SessionRecord) -> StoreResult<SessionRecord>;
    fn update_session_valid_until(
        &mut self,
        id: SessionIdRef,
        valid_until: NaiveDateTime,
    ) -> StoreResult<bool>;
    fn delete_session(&mut self, id: SessionIdRef) -> StoreResult<bool>;
    /// Bulk removal of every session of the site with `valid_until <= now`
    fn delete_expired_sessions(&mut self, site_id: SiteId, now: NaiveDateTime)
        -> StoreResult<u64>;
    fn list_sessions(&mut self, site_id: SiteId) -> StoreResult<Vec<SessionRecord>>;

    fn insert_auction(&mut self, auction: &NewAuction) -> StoreResult<AuctionRecord>;
    fn auction_by_id(
        &mut self,
        site_id: SiteId,
        id: AuctionId,
    ) -> StoreResult<Option<AuctionRecord>>;
    /// Like [`Transaction::auction_by_id`], but the row is locked until the
    /// transaction ends
    fn auction_for_update(
        &mut self,
        site_id: SiteId,
        id: AuctionId,
    ) -> StoreResult<Option<AuctionRecord>>;
    fn update_auction_bid(
        &mut self,
        site_id: SiteId,
        id: AuctionId,
        price_now: Amount,
        maximum_amount: Amount,
        winner_id: Option<UserId>,
    ) -> StoreResult<bool>;
    fn clear_winner(&mut self, user_id: UserId) -> StoreResult<u64>;
    fn delete_auction(&mut self, site_id: SiteId, id: AuctionId) -> StoreResult<bool>;
    fn auctions_by_seller(&mut self, seller_id: UserId) -> StoreResult<Vec<AuctionRecord>>;
    fn auctions_won_by(&mut self, winner_id: UserId) -> StoreResult<Vec<AuctionRecord>>;
    fn list_auctions(&mut self, site_id: SiteId) -> StoreResult<Vec<AuctionRecord>>;
}

/// Run `f` inside a fresh transaction
///
/// Commits if `f` succeeds, rolls back otherwise.
pub fn with_transaction<T, F>(persistence: &dyn Persistence, f: F) -> crate::Result<T>
where
    F: FnOnce(&mut dyn Transaction) -> crate::Result<T>,
{
    let mut connection = persistence.get_connection()?;
    let mut transaction = connection.start_transaction()?;

    match f(&mut *transaction) {
        Ok(v) => {
            transaction.commit()?;
            Ok(v)
        }
        Err(e) => {
            if let Err(rollback_err) = transaction.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}
