//! Multi-site auction marketplace with proxy bidding
//!
//! Start from a [`Host`], create and load [`Site`]s, and work with the
//! [`User`], [`Session`] and [`Auction`] handles they hand out. Every handle
//! re-reads its backing record on each call and fails with
//! [`AuctionSiteError::EntityDeleted`] once that record is gone.
pub mod auction;
pub mod bidding_engine;
pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod password;
pub mod persistence;
pub mod session;
pub mod site;
pub mod user;
pub mod validation;

pub use self::auction::{Amount, Auction, AuctionId, AuctionRecord};
pub use self::clock::{
    Alarm, Clock, ClockFactory, ManualClock, ManualClockFactory, SystemClock, SystemClockFactory,
};
pub use self::error::{AuctionSiteError, EntityKind, Result};
pub use self::host::{Host, SiteInfo};
pub use self::password::{Argon2Hasher, PasswordHasher};
pub use self::persistence::{InMemoryPersistence, Persistence, PostgresPersistence, SharedPersistence};
pub use self::session::Session;
pub use self::site::Site;
pub use self::user::User;

#[cfg(test)]
mod tests;
