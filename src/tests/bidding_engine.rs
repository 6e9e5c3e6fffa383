use super::{secs, Fixture, PASSWORD};
use crate::{bidding_engine::BidState, Amount, AuctionSiteError, Clock, EntityKind};
use anyhow::Result;

const A: i64 = 1;
const B: i64 = 2;

#[test]
fn first_bid_at_starting_price_wins_without_moving_price() {
    let state = BidState::new(10);

    assert_eq!(state.handle_bid(A, 9, 1), None);
    assert_eq!(
        state.handle_bid(A, 10, 1),
        Some(BidState {
            price_now: 10,
            maximum_amount: 10,
            winner: Some(A),
        })
    );
}

#[test]
fn winner_raises_own_maximum_by_at_least_the_increment() {
    let state = BidState {
        price_now: 10,
        maximum_amount: 20,
        winner: Some(A),
    };

    assert_eq!(state.handle_bid(A, 24, 5), None);
    assert_eq!(
        state.handle_bid(A, 25, 5),
        Some(BidState {
            maximum_amount: 25,
            ..state
        })
    );
}

#[test]
fn challenger_over_maximum_takes_the_lead() {
    let state = BidState {
        price_now: 10,
        maximum_amount: 20,
        winner: Some(A),
    };

    assert_eq!(
        state.handle_bid(B, 100, 5),
        Some(BidState {
            price_now: 25,
            maximum_amount: 100,
            winner: Some(B),
        })
    );
    assert_eq!(
        state.handle_bid(B, 22, 5),
        Some(BidState {
            price_now: 22,
            maximum_amount: 22,
            winner: Some(B),
        })
    );
}

#[test]
fn challenger_under_maximum_only_pushes_the_price() {
    let state = BidState {
        price_now: 10,
        maximum_amount: 20,
        winner: Some(A),
    };

    assert_eq!(state.handle_bid(B, 14, 5), None);
    assert_eq!(
        state.handle_bid(B, 15, 5),
        Some(BidState {
            price_now: 20,
            ..state
        })
    );
    assert_eq!(
        state.handle_bid(B, 20, 5),
        Some(BidState {
            price_now: 20,
            ..state
        })
    );
}

#[test]
fn price_never_decreases() {
    let bids = [(A, 10), (B, 12), (B, 40), (A, 15), (A, 39), (A, 45), (B, 46), (B, 30)];
    let mut state = BidState::new(10);
    for (bidder, offer) in bids {
        if let Some(next) = state.handle_bid(bidder, offer, 2) {
            assert!(state.price_now <= next.price_now, "{state:?} -> {next:?}");
            assert!(next.price_now <= next.maximum_amount);
            state = next;
        }
    }
    assert_eq!(state.winner, Some(B));
}

#[test]
fn proxy_bidding_scenario() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("scenario", 3600, 1)?;
    let seller = site.create_user("seller", PASSWORD)?;
    let alice = site.create_user("alice", PASSWORD)?;
    let bob = site.create_user("bob", PASSWORD)?;

    let seller_session = site.login("seller", PASSWORD)?.expect("seller logs in");
    let auction = seller_session.create_auction("a lamp", fixture.clock().now() + secs(3600), 10)?;
    let alice_session = site.login("alice", PASSWORD)?.expect("alice logs in");
    let bob_session = site.login("bob", PASSWORD)?.expect("bob logs in");

    assert!(auction.bid(Some(&alice_session), 10)?);
    let state = auction.snapshot()?;
    assert_eq!((state.price_now, state.maximum_amount), (10, 10));
    assert_eq!(auction.current_winner()?, Some(alice.clone()));

    assert!(auction.bid(Some(&bob_session), 15)?);
    let state = auction.snapshot()?;
    assert_eq!((state.price_now, state.maximum_amount), (11, 15));
    assert_eq!(auction.current_winner()?, Some(bob));

    assert!(auction.bid(Some(&alice_session), 20)?);
    let state = auction.snapshot()?;
    assert_eq!((state.price_now, state.maximum_amount), (16, 20));
    assert_eq!(auction.current_winner()?, Some(alice));

    assert_eq!(auction.seller(), seller);
    Ok(())
}

#[test]
fn rejected_bid_changes_nothing() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("rejections", 3600, 5)?;
    site.create_user("seller", PASSWORD)?;
    site.create_user("alice", PASSWORD)?;
    site.create_user("bob", PASSWORD)?;

    let auction = site
        .login("seller", PASSWORD)?
        .expect("seller logs in")
        .create_auction("a chair", fixture.clock().now() + secs(3600), 50)?;
    let alice = site.login("alice", PASSWORD)?.expect("alice logs in");
    let bob = site.login("bob", PASSWORD)?.expect("bob logs in");

    assert!(!auction.bid(Some(&alice), 49)?);
    assert_eq!(auction.current_winner()?, None);

    assert!(auction.bid(Some(&alice), 60)?);
    let before = auction.snapshot()?;
    assert!(!auction.bid(Some(&alice), 64)?);
    assert!(!auction.bid(Some(&bob), 54)?);
    assert_eq!(auction.snapshot()?, before);

    // a rejected bid may be retried with a higher offer
    assert!(auction.bid(Some(&bob), 55)?);
    assert_eq!(auction.current_price()?, 60);
    Ok(())
}

#[test]
fn malformed_bids_are_errors() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("malformed", 3600, 1)?;
    site.create_user("seller", PASSWORD)?;
    site.create_user("alice", PASSWORD)?;

    let seller = site.login("seller", PASSWORD)?.expect("seller logs in");
    let auction = seller.create_auction("a vase", fixture.clock().now() + secs(60), 10)?;
    let alice = site.login("alice", PASSWORD)?.expect("alice logs in");

    assert!(matches!(
        auction.bid(None, -1),
        Err(AuctionSiteError::ArgumentOutOfRange(_))
    ));
    assert!(matches!(
        auction.bid(None, 10),
        Err(AuctionSiteError::ArgumentNull(_))
    ));
    assert!(matches!(
        auction.bid(Some(&seller), 10),
        Err(AuctionSiteError::ArgumentInvalid(_))
    ));

    fixture.clock().advance(secs(61));
    assert!(matches!(
        auction.bid(Some(&alice), 10),
        Err(AuctionSiteError::OperationNotAllowed(_))
    ));
    assert_eq!(auction.current_winner()?, None);
    Ok(())
}

#[test]
fn bidding_until_the_last_second() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("last-second", 3600, 1)?;
    site.create_user("seller", PASSWORD)?;
    site.create_user("alice", PASSWORD)?;

    let auction = site
        .login("seller", PASSWORD)?
        .expect("seller logs in")
        .create_auction("a clock", fixture.clock().now() + secs(60), 10)?;
    let alice = site.login("alice", PASSWORD)?.expect("alice logs in");

    fixture.clock().advance(secs(60));
    assert!(auction.bid(Some(&alice), 10)?);
    Ok(())
}

#[test]
fn bidder_from_another_site_is_refused() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("home", 3600, 1)?;
    let other = fixture.site("elsewhere", 3600, 1)?;
    site.create_user("seller", PASSWORD)?;
    other.create_user("stranger", PASSWORD)?;

    let auction = site
        .login("seller", PASSWORD)?
        .expect("seller logs in")
        .create_auction("a rug", fixture.clock().now() + secs(60), 10)?;
    let stranger = other.login("stranger", PASSWORD)?.expect("stranger logs in");

    assert!(matches!(
        auction.bid(Some(&stranger), 10),
        Err(AuctionSiteError::ArgumentInvalid(_))
    ));
    Ok(())
}

#[test]
fn bid_on_deleted_auction() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("deleted-auction", 3600, 1)?;
    site.create_user("seller", PASSWORD)?;
    site.create_user("alice", PASSWORD)?;

    let auction = site
        .login("seller", PASSWORD)?
        .expect("seller logs in")
        .create_auction("a bike", fixture.clock().now() + secs(60), 10)?;
    let alice = site.login("alice", PASSWORD)?.expect("alice logs in");
    auction.delete()?;

    assert!(matches!(
        auction.bid(Some(&alice), 10),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Auction))
    ));
    Ok(())
}

#[test]
fn racing_bids_keep_the_highest_offer() -> Result<()> {
    const BIDDERS: usize = 4;
    const ROUNDS: i64 = 25;

    let fixture = Fixture::new()?;
    let site = fixture.site("race", 3600, 1)?;
    site.create_user("seller", PASSWORD)?;
    let auction = site
        .login("seller", PASSWORD)?
        .expect("seller logs in")
        .create_auction("a clock", fixture.clock().now() + secs(3600), 10)?;
    let sessions = (0..BIDDERS)
        .map(|i| {
            let name = format!("bidder{i}");
            site.create_user(&name, PASSWORD)?;
            Ok(site.login(&name, PASSWORD)?.expect("bidder logs in"))
        })
        .collect::<Result<Vec<_>>>()?;

    let accepted = std::thread::scope(|scope| {
        let handles: Vec<_> = sessions
            .iter()
            .enumerate()
            .map(|(i, session)| {
                let auction = &auction;
                scope.spawn(move || -> crate::Result<Vec<(String, Amount)>> {
                    let mut accepted = vec![];
                    for round in 0..ROUNDS {
                        // offers never tie across bidders
                        let offer = 10 + round * BIDDERS as i64 * 3 + i as i64;
                        if auction.bid(Some(session), offer)? {
                            accepted.push((session.user().username().to_owned(), offer));
                        }
                    }
                    Ok(accepted)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("bidder thread"))
            .collect::<crate::Result<Vec<_>>>()
    })?;

    let (top_bidder, top_offer) = accepted
        .into_iter()
        .flatten()
        .max_by_key(|(_, offer)| *offer)
        .expect("some bid was accepted");
    let state = auction.snapshot()?;
    assert_eq!(state.maximum_amount, top_offer);
    assert_eq!(
        auction.current_winner()?.map(|u| u.username().to_owned()),
        Some(top_bidder)
    );
    assert!(10 <= state.price_now && state.price_now <= state.maximum_amount);
    Ok(())
}
