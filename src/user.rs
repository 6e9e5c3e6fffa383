use crate::auction::Auction;
use crate::error::{AuctionSiteError, EntityKind, Result};
use crate::persistence::Transaction;
use crate::site::{SiteContext, SiteId};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub site_id: SiteId,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
}

/// Handle to a user of a loaded site, identified by its username
#[derive(Clone)]
pub struct User {
    ctx: Arc<SiteContext>,
    username: String,
}

impl User {
    pub(crate) fn new(ctx: Arc<SiteContext>, username: String) -> Self {
        Self { ctx, username }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn load(&self, transaction: &mut dyn Transaction) -> Result<UserRecord> {
        transaction
            .user_by_name(self.ctx.site_id, &self.username)?
            .ok_or(AuctionSiteError::EntityDeleted(EntityKind::User))
    }

    /// Auctions that ended with this user as the winner
    pub fn won_auctions(&self) -> Result<Vec<Auction>> {
        self.ctx.transaction(|tr| {
            let user = self.load(tr)?;
            let now = self.ctx.now();
            let won = tr
                .auctions_won_by(user.id)?
                .into_iter()
                .filter(|a| a.ends_on <= now)
                .collect();
            Auction::from_records(&self.ctx, tr, won)
        })
    }

    /// Auctions this user is selling, ended or not
    pub fn selling(&self) -> Result<Vec<Auction>> {
        self.ctx.transaction(|tr| {
            let user = self.load(tr)?;
            let records = tr.auctions_by_seller(user.id)?;
            Auction::from_records(&self.ctx, tr, records)
        })
    }

    /// Auctions still open where this user holds the highest bid
    pub fn currently_winning(&self) -> Result<Vec<Auction>> {
        self.ctx.transaction(|tr| {
            let user = self.load(tr)?;
            let now = self.ctx.now();
            let winning = tr
                .auctions_won_by(user.id)?
                .into_iter()
                .filter(|a| now <= a.ends_on)
                .collect();
            Auction::from_records(&self.ctx, tr, winning)
        })
    }

    /// Remove the user
    ///
    /// Refused while the user sells an auction that has not ended yet.
    /// Auctions the user was winning stay, without a winner; ended auctions
    /// the user sold go away with it.
    pub fn delete(&self) -> Result<()> {
        self.ctx.transaction(|tr| {
            // no auction can be put up for this user until the transaction ends
            let user = tr
                .user_for_update(self.ctx.site_id, &self.username)?
                .ok_or(AuctionSiteError::EntityDeleted(EntityKind::User))?;
            let now = self.ctx.now();
            if tr
                .auctions_by_seller(user.id)?
                .iter()
                .any(|a| now <= a.ends_on)
            {
                return Err(AuctionSiteError::OperationNotAllowed(format!(
                    "{} is selling an auction that has not ended yet",
                    self.username
                )));
            }

            let cleared = tr.clear_winner(user.id)?;
            tr.delete_user(user.id)?;
            info!(
                site = %self.ctx.name,
                user = %self.username,
                cleared_wins = cleared,
                "user deleted"
            );
            Ok(())
        })
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.ctx.site_id == other.ctx.site_id && self.username == other.username
    }
}

impl Eq for User {}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("site", &self.ctx.name)
            .field("username", &self.username)
            .finish()
    }
}
