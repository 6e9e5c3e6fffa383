use super::{secs, Fixture, PASSWORD};
use crate::{AuctionSiteError, Clock, EntityKind};
use anyhow::Result;

#[test]
fn seller_of_open_auction_cannot_be_deleted() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("selling", 3600, 1)?;
    let seller = site.create_user("seller", PASSWORD)?;

    let session = site.login("seller", PASSWORD)?.expect("valid credentials");
    let auction = session.create_auction("a lamp", fixture.clock().now() + secs(60), 10)?;

    assert!(matches!(
        seller.delete(),
        Err(AuctionSiteError::OperationNotAllowed(_))
    ));
    // still refused on the very last second
    fixture.clock().advance(secs(60));
    assert!(matches!(
        seller.delete(),
        Err(AuctionSiteError::OperationNotAllowed(_))
    ));

    fixture.clock().advance(secs(1));
    seller.delete()?;
    assert!(site.users()?.is_empty());
    assert!(matches!(
        auction.current_price(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Auction))
    ));
    assert!(matches!(
        session.valid_until(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Session))
    ));
    assert!(matches!(
        seller.delete(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::User))
    ));
    Ok(())
}

#[test]
fn deleting_the_winner_keeps_the_auction() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("winner", 3600, 1)?;
    site.create_user("seller", PASSWORD)?;
    let alice = site.create_user("alice", PASSWORD)?;
    site.create_user("bob", PASSWORD)?;

    let auction = site
        .login("seller", PASSWORD)?
        .expect("valid credentials")
        .create_auction("a lamp", fixture.clock().now() + secs(3600), 10)?;
    let alice_session = site.login("alice", PASSWORD)?.expect("valid credentials");
    assert!(auction.bid(Some(&alice_session), 30)?);
    assert_eq!(alice.currently_winning()?, vec![auction.clone()]);

    alice.delete()?;
    assert_eq!(auction.current_winner()?, None);
    assert_eq!(auction.current_price()?, 10);

    // the auction is open again to a first bidder
    let bob = site.login("bob", PASSWORD)?.expect("valid credentials");
    assert!(auction.bid(Some(&bob), 10)?);
    assert_eq!(
        auction.current_winner()?.map(|u| u.username().to_owned()),
        Some("bob".to_owned())
    );
    Ok(())
}

#[test]
fn won_and_selling_auctions() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("derived", 3600, 1)?;
    let seller = site.create_user("seller", PASSWORD)?;
    let alice = site.create_user("alice", PASSWORD)?;

    let seller_session = site.login("seller", PASSWORD)?.expect("valid credentials");
    let now = fixture.clock().now();
    let short = seller_session.create_auction("a lamp", now + secs(60), 10)?;
    let long = seller_session.create_auction("a chair", now + secs(600), 10)?;
    let alice_session = site.login("alice", PASSWORD)?.expect("valid credentials");
    assert!(short.bid(Some(&alice_session), 10)?);
    assert!(long.bid(Some(&alice_session), 10)?);

    assert_eq!(seller.selling()?.len(), 2);
    assert!(alice.won_auctions()?.is_empty());
    assert_eq!(alice.currently_winning()?.len(), 2);

    fixture.clock().advance(secs(61));
    assert_eq!(alice.won_auctions()?, vec![short.clone()]);
    assert_eq!(alice.currently_winning()?, vec![long.clone()]);
    assert_eq!(site.auctions(true)?, vec![long]);
    assert_eq!(site.auctions(false)?.len(), 2);
    assert_eq!(short.description(), "a lamp");
    Ok(())
}

#[test]
fn deleted_auction_handles_fail() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("auction-delete", 3600, 1)?;
    site.create_user("seller", PASSWORD)?;

    let auction = site
        .login("seller", PASSWORD)?
        .expect("valid credentials")
        .create_auction("a lamp", fixture.clock().now() + secs(60), 10)?;
    auction.delete()?;

    assert!(matches!(
        auction.delete(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Auction))
    ));
    assert!(matches!(
        auction.current_winner(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Auction))
    ));
    // the seller has nothing left to sell
    site.users()?
        .into_iter()
        .try_for_each(|u| u.delete())?;
    Ok(())
}

#[test]
fn deleted_site_invalidates_every_handle() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("doomed", 3600, 1)?;
    let user = site.create_user("seller", PASSWORD)?;
    let session = site.login("seller", PASSWORD)?.expect("valid credentials");
    let auction = session.create_auction("a lamp", fixture.clock().now() + secs(60), 10)?;

    site.delete()?;

    assert!(matches!(
        site.users(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Site))
    ));
    assert!(matches!(
        site.now(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Site))
    ));
    assert!(matches!(
        site.delete(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Site))
    ));
    assert!(matches!(
        user.selling(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::User))
    ));
    assert!(matches!(
        session.logout(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Session))
    ));
    assert!(matches!(
        auction.current_price(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Auction))
    ));
    assert!(fixture.host.site_infos()?.is_empty());
    Ok(())
}

#[test]
fn recreated_site_is_a_different_site() -> Result<()> {
    let fixture = Fixture::new()?;
    let old = fixture.site("phoenix", 3600, 1)?;
    old.delete()?;
    let new = fixture.site("phoenix", 3600, 1)?;
    assert_ne!(old, new);
    assert_eq!(new, fixture.host.load_site("phoenix")?);

    new.create_user("alice", PASSWORD)?;
    assert!(matches!(
        old.users(),
        Err(AuctionSiteError::EntityDeleted(EntityKind::Site))
    ));
    assert_eq!(new.users()?.len(), 1);
    Ok(())
}

#[test]
fn seller_deletion_racing_new_auctions_leaves_no_orphan() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = fixture.site("race", 3600, 1)?;
    let seller = site.create_user("seller", PASSWORD)?;
    let session = site.login("seller", PASSWORD)?.expect("valid credentials");
    let ends_on = fixture.clock().now() + secs(3600);

    let (deleted, created) = std::thread::scope(|scope| {
        let creator = scope.spawn(|| {
            (0..20)
                .map(|i| session.create_auction(&format!("item {i}"), ends_on, 1))
                .filter(|created| created.is_ok())
                .count()
        });
        let deleter = scope.spawn(|| seller.delete());
        (
            deleter.join().expect("deleter thread"),
            creator.join().expect("creator thread"),
        )
    });

    let auctions = site.auctions(false)?;
    assert_eq!(auctions.len(), created);
    match deleted {
        // the seller went first: every later auction was refused
        Ok(()) => {
            assert_eq!(created, 0);
            assert!(site.users()?.is_empty());
        }
        Err(AuctionSiteError::OperationNotAllowed(_)) => {
            assert!(created > 0);
            assert_eq!(site.users()?, vec![seller.clone()]);
            assert!(auctions.iter().all(|a| a.seller() == seller));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
