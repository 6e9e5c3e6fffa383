//! Shape checks done before touching the store
use crate::auction::Amount;
use crate::error::{AuctionSiteError, Result};

pub const MIN_SITE_NAME: usize = 1;
pub const MAX_SITE_NAME: usize = 128;
pub const MIN_USERNAME: usize = 3;
pub const MAX_USERNAME: usize = 64;
pub const MIN_PASSWORD: usize = 4;
pub const MIN_TIMEZONE: i32 = -12;
pub const MAX_TIMEZONE: i32 = 12;
/// Ten years
pub const MAX_SESSION_EXPIRATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

pub fn check_site_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(MIN_SITE_NAME..=MAX_SITE_NAME).contains(&len) {
        return Err(AuctionSiteError::ArgumentInvalid(format!(
            "site name length must be between {MIN_SITE_NAME} and {MAX_SITE_NAME}, got {len}"
        )));
    }
    Ok(())
}

pub fn check_site_parameters(
    timezone: i32,
    session_expiration_secs: i64,
    minimum_bid_increment: Amount,
) -> Result<()> {
    if !(MIN_TIMEZONE..=MAX_TIMEZONE).contains(&timezone) {
        return Err(AuctionSiteError::ArgumentOutOfRange(format!(
            "timezone must be between {MIN_TIMEZONE} and {MAX_TIMEZONE}, got {timezone}"
        )));
    }
    if !(1..=MAX_SESSION_EXPIRATION_SECS).contains(&session_expiration_secs) {
        return Err(AuctionSiteError::ArgumentOutOfRange(format!(
            "session expiration must be between 1 and {MAX_SESSION_EXPIRATION_SECS} seconds, got {session_expiration_secs}"
        )));
    }
    if minimum_bid_increment < 0 {
        return Err(AuctionSiteError::ArgumentOutOfRange(format!(
            "minimum bid increment must not be negative, got {minimum_bid_increment}"
        )));
    }
    Ok(())
}

pub fn check_credentials(username: &str, password: &str) -> Result<()> {
    let len = username.chars().count();
    if !(MIN_USERNAME..=MAX_USERNAME).contains(&len) {
        return Err(AuctionSiteError::ArgumentInvalid(format!(
            "username length must be between {MIN_USERNAME} and {MAX_USERNAME}, got {len}"
        )));
    }
    if password.chars().count() < MIN_PASSWORD {
        return Err(AuctionSiteError::ArgumentInvalid(format!(
            "password must be at least {MIN_PASSWORD} characters long"
        )));
    }
    Ok(())
}
