use crate::bidding_engine;
use crate::error::{AuctionSiteError, EntityKind, Result};
use crate::persistence::Transaction;
use crate::session::Session;
use crate::site::{SiteContext, SiteId};
use crate::user::{User, UserId};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Money, in minor currency units
pub type Amount = i64;
pub type AuctionId = i64;

/// An auction row as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuctionRecord {
    pub id: AuctionId,
    pub site_id: SiteId,
    pub seller_id: UserId,
    pub description: String,
    pub ends_on: NaiveDateTime,
    pub price_now: Amount,
    pub maximum_amount: Amount,
    pub winner_id: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct NewAuction {
    pub site_id: SiteId,
    pub seller_id: UserId,
    pub description: String,
    pub ends_on: NaiveDateTime,
    pub starting_price: Amount,
}

/// Handle to an auction of a loaded site
///
/// Description, seller and end time never change after creation and are kept
/// in the handle; price and winner are always read from the store.
#[derive(Clone)]
pub struct Auction {
    ctx: Arc<SiteContext>,
    id: AuctionId,
    seller: String,
    description: String,
    ends_on: NaiveDateTime,
}

impl Auction {
    pub(crate) fn from_record(ctx: Arc<SiteContext>, record: AuctionRecord, seller: String) -> Self {
        Self {
            ctx,
            id: record.id,
            seller,
            description: record.description,
            ends_on: record.ends_on,
        }
    }

    /// Build handles for `records`, resolving seller names in the same transaction
    pub(crate) fn from_records(
        ctx: &Arc<SiteContext>,
        transaction: &mut dyn Transaction,
        records: Vec<AuctionRecord>,
    ) -> Result<Vec<Self>> {
        records
            .into_iter()
            .map(|record| {
                let seller = transaction
                    .user_by_id(record.seller_id)?
                    .ok_or(AuctionSiteError::EntityDeleted(EntityKind::User))?;
                Ok(Self::from_record(ctx.clone(), record, seller.username))
            })
            .collect()
    }

    pub fn id(&self) -> AuctionId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn ends_on(&self) -> NaiveDateTime {
        self.ends_on
    }

    pub fn seller(&self) -> User {
        User::new(self.ctx.clone(), self.seller.clone())
    }

    fn load(&self, transaction: &mut dyn Transaction) -> Result<AuctionRecord> {
        transaction
            .auction_by_id(self.ctx.site_id, self.id)?
            .ok_or(AuctionSiteError::EntityDeleted(EntityKind::Auction))
    }

    /// Persisted state of the auction
    pub fn snapshot(&self) -> Result<AuctionRecord> {
        self.ctx.transaction(|tr| self.load(tr))
    }

    /// The lowest amount needed to beat the second highest bid, or the
    /// starting price while fewer than two bids were placed
    pub fn current_price(&self) -> Result<Amount> {
        Ok(self.snapshot()?.price_now)
    }

    /// The user holding the highest bid, if any
    ///
    /// Also `None` when the winner was deleted after the auction ended.
    pub fn current_winner(&self) -> Result<Option<User>> {
        self.ctx.transaction(|tr| {
            let auction = self.load(tr)?;
            let Some(winner_id) = auction.winner_id else {
                return Ok(None);
            };
            Ok(tr
                .user_by_id(winner_id)?
                .map(|winner| User::new(self.ctx.clone(), winner.username)))
        })
    }

    pub fn delete(&self) -> Result<()> {
        self.ctx.transaction(|tr| {
            self.load(tr)?;
            tr.delete_auction(self.ctx.site_id, self.id)?;
            info!(site = %self.ctx.name, auction = self.id, "auction deleted");
            Ok(())
        })
    }

    /// Bid `offer` on behalf of the owner of `session`
    ///
    /// `Ok(false)` means the auction rules turned the bid down (too low); the
    /// auction is left untouched and a higher offer may be retried. Malformed
    /// requests are errors.
    pub fn bid(&self, session: Option<&Session>, offer: Amount) -> Result<bool> {
        self.ctx.transaction(|tr| {
            bidding_engine::submit_bid(
                tr,
                self.ctx.now(),
                self.ctx.site_id,
                self.id,
                session.map(Session::id),
                offer,
            )
        })
    }
}

impl PartialEq for Auction {
    fn eq(&self, other: &Self) -> bool {
        self.ctx.site_id == other.ctx.site_id && self.id == other.id
    }
}

impl Eq for Auction {}

impl std::fmt::Debug for Auction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auction")
            .field("site", &self.ctx.name)
            .field("id", &self.id)
            .field("seller", &self.seller)
            .field("ends_on", &self.ends_on)
            .finish()
    }
}
