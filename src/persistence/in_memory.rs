use super::*;
use anyhow::format_err;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
struct Tables {
    last_id: i64,
    sites: BTreeMap<SiteId, SiteRecord>,
    users: BTreeMap<UserId, UserRecord>,
    sessions: BTreeMap<String, SessionRecord>,
    auctions: BTreeMap<AuctionId, AuctionRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn remove_user_cascade(&mut self, id: UserId) {
        self.users.remove(&id);
        self.sessions.retain(|_, s| s.user_id != id);
        self.auctions.retain(|_, a| a.seller_id != id);
        for auction in self.auctions.values_mut() {
            if auction.winner_id == Some(id) {
                auction.winner_id = None;
            }
        }
    }
}

/// Fake in-memory persistence.
///
/// Useful for unit-tests. Transactions are fully serialized: a transaction
/// holds the store lock from start to commit/rollback, and works on a copy of
/// the tables that is swapped in on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedPersistence {
        Arc::new(Self::new())
    }

    /// Simulate the store going down (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(format_err!("in-memory store is offline").into());
        }
        Ok(())
    }
}

impl Persistence for InMemoryPersistence {
    fn get_connection(&self) -> StoreResult<Box<dyn Connection>> {
        self.ensure_available()?;
        Ok(Box::new(InMemoryConnection {
            tables: self.tables.clone(),
            unavailable: self.unavailable.clone(),
        }))
    }

    fn initialize(&self, reset: bool) -> StoreResult<()> {
        self.ensure_available()?;
        if reset {
            *self.tables.lock() = Tables::default();
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryConnection {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl Connection for InMemoryConnection {
    fn start_transaction(&mut self) -> StoreResult<Box<dyn Transaction + '_>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(format_err!("in-memory store is offline").into());
        }
        let lock_guard = self.tables.lock();
        let working = lock_guard.clone();
        Ok(Box::new(InMemoryTransaction {
            lock_guard,
            working,
        }))
    }
}

#[derive(Debug)]
pub struct InMemoryTransaction<'a> {
    lock_guard: MutexGuard<'a, Tables>,
    working: Tables,
}

impl<'a> Transaction for InMemoryTransaction<'a> {
    fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTransaction {
            mut lock_guard,
            working,
        } = *self;
        *lock_guard = working;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }

    fn insert_site(&mut self, site: &NewSite) -> StoreResult<SiteRecord> {
        if self.working.sites.values().any(|s| s.name == site.name) {
            return Err(StoreError::UniqueViolation("sites.name".to_owned()));
        }
        let id = self.working.next_id();
        let record = SiteRecord {
            id,
            name: site.name.clone(),
            timezone: site.timezone,
            session_expiration_secs: site.session_expiration_secs,
            minimum_bid_increment: site.minimum_bid_increment,
        };
        self.working.sites.insert(id, record.clone());
        Ok(record)
    }

    fn site_by_name(&mut self, name: &str) -> StoreResult<Option<SiteRecord>> {
        Ok(self.working.sites.values().find(|s| s.name == name).cloned())
    }

    fn site_by_id(&mut self, id: SiteId) -> StoreResult<Option<SiteRecord>> {
        Ok(self.working.sites.get(&id).cloned())
    }

    fn list_sites(&mut self) -> StoreResult<Vec<SiteRecord>> {
        Ok(self.working.sites.values().cloned().collect())
    }

    fn delete_site(&mut self, id: SiteId) -> StoreResult<bool> {
        if self.working.sites.remove(&id).is_none() {
            return Ok(false);
        }
        self.working.sessions.retain(|_, s| s.site_id != id);
        self.working.auctions.retain(|_, a| a.site_id != id);
        self.working.users.retain(|_, u| u.site_id != id);
        Ok(true)
    }

    fn insert_user(
        &mut self,
        site_id: SiteId,
        username: &str,
        password_hash: &str,
    ) -> StoreResult<UserRecord> {
        if !self.working.sites.contains_key(&site_id) {
            return Err(format_err!("site {site_id} does not exist").into());
        }
        if self
            .working
            .users
            .values()
            .any(|u| u.site_id == site_id && u.username == username)
        {
            return Err(StoreError::UniqueViolation("users.site_id_username".to_owned()));
        }
        let id = self.working.next_id();
        let record = UserRecord {
            id,
            site_id,
            username: username.to_owned(),
            password_hash: password_hash.to_owned(),
        };
        self.working.users.insert(id, record.clone());
        Ok(record)
    }

    fn user_by_name(
        &mut self,
        site_id: SiteId,
        username: &str,
    ) -> StoreResult<Option<UserRecord>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.site_id == site_id && u.username == username)
            .cloned())
    }

    fn user_by_id(&mut self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.working.users.get(&id).cloned())
    }

    fn user_for_update(
        &mut self,
        site_id: SiteId,
        username: &str,
    ) -> StoreResult<Option<UserRecord>> {
        self.user_by_name(site_id, username)
    }

    fn user_for_share(&mut self, id: UserId) -> StoreResult<Option<UserRecord>> {
        self.user_by_id(id)
    }

    fn list_users(&mut self, site_id: SiteId) -> StoreResult<Vec<UserRecord>> {
        Ok(self
            .working
            .users
            .values()
            .filter(|u| u.site_id == site_id)
            .cloned()
            .collect())
    }

    fn delete_user(&mut self, id: UserId) -> StoreResult<bool> {
        if !self.working.users.contains_key(&id) {
            return Ok(false);
        }
        self.working.remove_user_cascade(id);
        Ok(true)
    }

    fn session_by_id(&mut self, id: SessionIdRef) -> StoreResult<Option<SessionRecord>> {
        Ok(self.working.sessions.get(id).cloned())
    }

    fn upsert_session(&mut self, session: &SessionRecord) -> StoreResult<SessionRecord> {
        if !self.working.users.contains_key(&session.user_id) {
            return Err(format_err!("user {} does not exist", session.user_id).into());
        }
        if let Some(existing) = self
            .working
            .sessions
            .values_mut()
            .find(|s| s.user_id == session.user_id)
        {
            existing.valid_until = existing.valid_until.max(session.valid_until);
            return Ok(existing.clone());
        }
        if self.working.sessions.contains_key(&session.id) {
            return Err(StoreError::UniqueViolation("sessions.id".to_owned()));
        }
        self.working
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(session.clone())
    }

    fn update_session_valid_until(
        &mut self,
        id: SessionIdRef,
        valid_until: NaiveDateTime,
    ) -> StoreResult<bool> {
        Ok(match self.working.sessions.get_mut(id) {
            Some(session) => {
                session.valid_until = valid_until;
                true
            }
            None => false,
        })
    }

    fn delete_session(&mut self, id: SessionIdRef) -> StoreResult<bool> {
        Ok(self.working.sessions.remove(id).is_some())
    }

    fn delete_expired_sessions(
        &mut self,
        site_id: SiteId,
        now: NaiveDateTime,
    ) -> StoreResult<u64> {
        let before = self.working.sessions.len();
        self.working
            .sessions
            .retain(|_, s| !(s.site_id == site_id && s.valid_until <= now));
        Ok(u64::try_from(before - self.working.sessions.len()).map_err(anyhow::Error::from)?)
    }

    fn list_sessions(&mut self, site_id: SiteId) -> StoreResult<Vec<SessionRecord>> {
        Ok(self
            .working
            .sessions
            .values()
            .filter(|s| s.site_id == site_id)
            .cloned()
            .collect())
    }

    fn insert_auction(&mut self, auction: &NewAuction) -> StoreResult<AuctionRecord> {
        if !self.working.users.contains_key(&auction.seller_id) {
            return Err(format_err!("seller {} does not exist", auction.seller_id).into());
        }
        let id = self.working.next_id();
        let record = AuctionRecord {
            id,
            site_id: auction.site_id,
            seller_id: auction.seller_id,
            description: auction.description.clone(),
            ends_on: auction.ends_on,
            price_now: auction.starting_price,
            maximum_amount: 0,
            winner_id: None,
        };
        self.working.auctions.insert(id, record.clone());
        Ok(record)
    }

    fn auction_by_id(
        &mut self,
        site_id: SiteId,
        id: AuctionId,
    ) -> StoreResult<Option<AuctionRecord>> {
        Ok(self
            .working
            .auctions
            .get(&id)
            .filter(|a| a.site_id == site_id)
            .cloned())
    }

    fn auction_for_update(
        &mut self,
        site_id: SiteId,
        id: AuctionId,
    ) -> StoreResult<Option<AuctionRecord>> {
        // the whole store is locked for the duration of the transaction already
        self.auction_by_id(site_id, id)
    }

    fn update_auction_bid(
        &mut self,
        site_id: SiteId,
        id: AuctionId,
        price_now: Amount,
        maximum_amount: Amount,
        winner_id: Option<UserId>,
    ) -> StoreResult<bool> {
        Ok(
            match self
                .working
                .auctions
                .get_mut(&id)
                .filter(|a| a.site_id == site_id)
            {
                Some(auction) => {
                    auction.price_now = price_now;
                    auction.maximum_amount = maximum_amount;
                    auction.winner_id = winner_id;
                    true
                }
                None => false,
            },
        )
    }

    fn clear_winner(&mut self, user_id: UserId) -> StoreResult<u64> {
        let mut cleared = 0;
        for auction in self.working.auctions.values_mut() {
            if auction.winner_id == Some(user_id) {
                auction.winner_id = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    fn delete_auction(&mut self, site_id: SiteId, id: AuctionId) -> StoreResult<bool> {
        if self.auction_by_id(site_id, id)?.is_none() {
            return Ok(false);
        }
        Ok(self.working.auctions.remove(&id).is_some())
    }

    fn auctions_by_seller(&mut self, seller_id: UserId) -> StoreResult<Vec<AuctionRecord>> {
        Ok(self
            .working
            .auctions
            .values()
            .filter(|a| a.seller_id == seller_id)
            .cloned()
            .collect())
    }

    fn auctions_won_by(&mut self, winner_id: UserId) -> StoreResult<Vec<AuctionRecord>> {
        Ok(self
            .working
            .auctions
            .values()
            .filter(|a| a.winner_id == Some(winner_id))
            .cloned()
            .collect())
    }

    fn list_auctions(&mut self, site_id: SiteId) -> StoreResult<Vec<AuctionRecord>> {
        Ok(self
            .working
            .auctions
            .values()
            .filter(|a| a.site_id == site_id)
            .cloned()
            .collect())
    }
}
