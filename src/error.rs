use crate::persistence::StoreError;
use thiserror::Error;

/// Everything the auction site can fail with
///
/// Store-specific faults never escape as-is: they are translated into
/// [`AuctionSiteError::StoreUnavailable`] (or [`AuctionSiteError::NameAlreadyInUse`]
/// for uniqueness violations) at the boundary.
#[derive(Error, Debug)]
pub enum AuctionSiteError {
    #[error("missing required argument: {0}")]
    ArgumentNull(&'static str),
    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),
    #[error("argument out of range: {0}")]
    ArgumentOutOfRange(String),
    #[error("name already in use: {0}")]
    NameAlreadyInUse(String),
    #[error("no such name: {0}")]
    InexistentName(String),
    #[error("{0} has been deleted")]
    EntityDeleted(EntityKind),
    #[error("operation not allowed: {0}")]
    OperationNotAllowed(String),
    #[error("time runs forward only: {0}")]
    UnavailableTimeMachine(String),
    #[error("store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

pub type Result<T, E = AuctionSiteError> = std::result::Result<T, E>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Site,
    User,
    Session,
    Auction,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntityKind::Site => "site",
            EntityKind::User => "user",
            EntityKind::Session => "session",
            EntityKind::Auction => "auction",
        })
    }
}

impl From<StoreError> for AuctionSiteError {
    fn from(e: StoreError) -> Self {
        match e {
            // Callers that know which name collided map this themselves;
            // reaching here means a constraint fired where none was expected.
            StoreError::UniqueViolation(constraint) => {
                AuctionSiteError::NameAlreadyInUse(constraint)
            }
            StoreError::Unavailable(e) => AuctionSiteError::StoreUnavailable(e),
        }
    }
}

impl AuctionSiteError {
    /// Map a uniqueness violation to `NameAlreadyInUse(name)`
    pub(crate) fn from_store_with_name(e: StoreError, name: &str) -> Self {
        match e {
            StoreError::UniqueViolation(_) => AuctionSiteError::NameAlreadyInUse(name.to_owned()),
            other => other.into(),
        }
    }
}
