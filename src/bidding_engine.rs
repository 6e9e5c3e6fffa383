//! Bidding Engine
//!
//! Proxy bidding: a bid states the bidder's maximum willingness to pay, and the
//! visible price only tracks what is needed to beat the second highest bid by
//! the site's minimum increment.
//!
//! [`BidState::handle_bid`] is the pure transition; [`submit_bid`] runs it
//! against the locked auction row inside a store transaction, together with
//! the bidder's session refresh.
use crate::auction::{Amount, AuctionId, AuctionRecord};
use crate::error::{AuctionSiteError, EntityKind, Result};
use crate::persistence::Transaction;
use crate::session::{self, SessionIdRef};
use crate::site::SiteId;
use crate::user::UserId;
use chrono::NaiveDateTime;
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BidState {
    pub price_now: Amount,
    /// Highest offer received so far; meaningless while there is no winner
    pub maximum_amount: Amount,
    pub winner: Option<UserId>,
}

impl From<&AuctionRecord> for BidState {
    fn from(auction: &AuctionRecord) -> Self {
        Self {
            price_now: auction.price_now,
            maximum_amount: auction.maximum_amount,
            winner: auction.winner_id,
        }
    }
}

impl BidState {
    pub fn new(starting_price: Amount) -> Self {
        Self {
            price_now: starting_price,
            maximum_amount: 0,
            winner: None,
        }
    }

    /// Lowest offer a challenger has to make once somebody is winning
    fn next_valid_bid(self, increment: Amount) -> Amount {
        self.price_now.saturating_add(increment)
    }

    /// Lowest offer the current winner has to make to raise its own maximum
    fn next_valid_raise(self, increment: Amount) -> Amount {
        self.maximum_amount.saturating_add(increment)
    }

    /// New state after `bidder` offers `offer`, or `None` if the bid is rejected
    pub fn handle_bid(self, bidder: UserId, offer: Amount, increment: Amount) -> Option<Self> {
        match self.winner {
            None => {
                if offer < self.price_now {
                    return None;
                }
                Some(Self {
                    maximum_amount: offer,
                    winner: Some(bidder),
                    ..self
                })
            }
            Some(winner) if winner == bidder => {
                if offer < self.next_valid_raise(increment) {
                    return None;
                }
                Some(Self {
                    maximum_amount: offer,
                    ..self
                })
            }
            Some(_) => {
                if offer < self.price_now || offer < self.next_valid_bid(increment) {
                    return None;
                }
                if self.maximum_amount < offer {
                    Some(Self {
                        price_now: offer.min(self.next_valid_raise(increment)),
                        maximum_amount: offer,
                        winner: Some(bidder),
                    })
                } else {
                    Some(Self {
                        price_now: self.maximum_amount.min(offer.saturating_add(increment)),
                        ..self
                    })
                }
            }
        }
    }
}

/// Place a bid on behalf of the owner of `session_id`
///
/// Everything is read and written through `transaction`, starting with the
/// auction row, which stays locked until the caller commits. `Ok(false)` is
/// a bid rejected by the auction rules, with nothing written.
pub(crate) fn submit_bid(
    transaction: &mut dyn Transaction,
    now: NaiveDateTime,
    site_id: SiteId,
    auction_id: AuctionId,
    session_id: Option<SessionIdRef>,
    offer: Amount,
) -> Result<bool> {
    let auction = transaction
        .auction_for_update(site_id, auction_id)?
        .ok_or(AuctionSiteError::EntityDeleted(EntityKind::Auction))?;
    if auction.ends_on < now {
        return Err(AuctionSiteError::OperationNotAllowed(format!(
            "auction {auction_id} ended on {}",
            auction.ends_on
        )));
    }
    if offer < 0 {
        return Err(AuctionSiteError::ArgumentOutOfRange(format!(
            "offer must not be negative, got {offer}"
        )));
    }
    let session_id = session_id.ok_or(AuctionSiteError::ArgumentNull("session"))?;
    let session = transaction
        .session_by_id(session_id)?
        .filter(|s| session::is_live(s, now))
        .ok_or_else(|| {
            AuctionSiteError::OperationNotAllowed("session expired or logged out".to_owned())
        })?;
    let bidder = transaction.user_for_share(session.user_id)?.ok_or_else(|| {
        AuctionSiteError::OperationNotAllowed("session owner no longer exists".to_owned())
    })?;
    if bidder.id == auction.seller_id {
        return Err(AuctionSiteError::ArgumentInvalid(
            "sellers cannot bid on their own auctions".to_owned(),
        ));
    }
    if bidder.site_id != auction.site_id {
        return Err(AuctionSiteError::ArgumentInvalid(
            "bidder belongs to another site".to_owned(),
        ));
    }
    let site = transaction
        .site_by_id(site_id)?
        .ok_or(AuctionSiteError::EntityDeleted(EntityKind::Site))?;

    let state = BidState::from(&auction);
    let Some(new_state) = state.handle_bid(bidder.id, offer, site.minimum_bid_increment) else {
        debug!(
            auction = auction_id,
            bidder = %bidder.username,
            offer,
            price = state.price_now,
            "bid rejected"
        );
        return Ok(false);
    };

    transaction.update_auction_bid(
        site_id,
        auction_id,
        new_state.price_now,
        new_state.maximum_amount,
        new_state.winner,
    )?;
    session::slide(transaction, &session.id, now, site.session_expiration_secs)?;

    debug!(
        auction = auction_id,
        bidder = %bidder.username,
        offer,
        price = new_state.price_now,
        "bid accepted"
    );
    Ok(true)
}
