use super::*;
use ::postgres::error::SqlState;
use ::postgres::Row;
use anyhow::Context as _;
use r2d2_postgres::{postgres::NoTls, PostgresConnectionManager};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sites (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(128) NOT NULL,
    timezone INTEGER NOT NULL,
    session_expiration_secs BIGINT NOT NULL,
    minimum_bid_increment BIGINT NOT NULL,
    CONSTRAINT sites_name_unique UNIQUE (name)
);
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    site_id BIGINT NOT NULL REFERENCES sites (id) ON DELETE CASCADE,
    username VARCHAR(64) NOT NULL,
    password_hash TEXT NOT NULL,
    CONSTRAINT users_username_unique UNIQUE (site_id, username)
);
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    site_id BIGINT NOT NULL REFERENCES sites (id) ON DELETE CASCADE,
    user_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    valid_until TIMESTAMP NOT NULL,
    CONSTRAINT sessions_user_unique UNIQUE (user_id)
);
CREATE INDEX IF NOT EXISTS sessions_site_valid_until ON sessions (site_id, valid_until);
CREATE TABLE IF NOT EXISTS auctions (
    id BIGSERIAL PRIMARY KEY,
    site_id BIGINT NOT NULL REFERENCES sites (id) ON DELETE CASCADE,
    seller_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    ends_on TIMESTAMP NOT NULL,
    price_now BIGINT NOT NULL,
    maximum_amount BIGINT NOT NULL DEFAULT 0,
    winner_id BIGINT REFERENCES users (id) ON DELETE SET NULL
);
CREATE INDEX IF NOT EXISTS auctions_seller ON auctions (seller_id);
CREATE INDEX IF NOT EXISTS auctions_winner ON auctions (winner_id);
"#;

const DROP_SCHEMA: &str = r#"
DROP TABLE IF EXISTS auctions;
DROP TABLE IF EXISTS sessions;
DROP TABLE IF EXISTS users;
DROP TABLE IF EXISTS sites;
"#;

const AUCTION_COLUMNS: &str =
    "id, site_id, seller_id, description, ends_on, price_now, maximum_amount, winner_id";

type Pool = r2d2::Pool<PostgresConnectionManager<NoTls>>;

impl From<::postgres::Error> for StoreError {
    fn from(e: ::postgres::Error) -> Self {
        match e.code() {
            Some(code) if *code == SqlState::UNIQUE_VIOLATION => StoreError::UniqueViolation(
                e.as_db_error()
                    .and_then(|db| db.constraint())
                    .unwrap_or("unknown")
                    .to_owned(),
            ),
            _ => StoreError::Unavailable(e.into()),
        }
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Unavailable(e.into())
    }
}

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: Pool,
}

impl PostgresPersistence {
    pub fn connect(database_url: &str, pool_size: u32) -> StoreResult<Self> {
        let config = database_url
            .parse::<::postgres::Config>()
            .context("malformed database url")?;
        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .build(PostgresConnectionManager::new(config, NoTls))?;
        Ok(Self { pool })
    }

    pub fn new_shared(database_url: &str, pool_size: u32) -> StoreResult<SharedPersistence> {
        Ok(Arc::new(Self::connect(database_url, pool_size)?))
    }
}

impl Persistence for PostgresPersistence {
    fn get_connection(&self) -> StoreResult<Box<dyn Connection>> {
        Ok(Box::new(PostgresConnection(self.pool.get()?)))
    }

    fn initialize(&self, reset: bool) -> StoreResult<()> {
        let mut client = self.pool.get()?;
        let mut transaction = client.transaction()?;
        if reset {
            transaction.batch_execute(DROP_SCHEMA)?;
        }
        transaction.batch_execute(SCHEMA)?;
        transaction.commit()?;
        Ok(())
    }
}

pub struct PostgresConnection(r2d2::PooledConnection<PostgresConnectionManager<NoTls>>);

impl Connection for PostgresConnection {
    fn start_transaction(&mut self) -> StoreResult<Box<dyn Transaction + '_>> {
        Ok(Box::new(PostgresTransaction(self.0.transaction()?)))
    }
}

pub struct PostgresTransaction<'a>(::postgres::Transaction<'a>);

fn site_from_row(row: &Row) -> StoreResult<SiteRecord> {
    Ok(SiteRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        timezone: row.try_get("timezone")?,
        session_expiration_secs: row.try_get("session_expiration_secs")?,
        minimum_bid_increment: row.try_get("minimum_bid_increment")?,
    })
}

fn user_from_row(row: &Row) -> StoreResult<UserRecord> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        site_id: row.try_get("site_id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
    })
}

fn session_from_row(row: &Row) -> StoreResult<SessionRecord> {
    Ok(SessionRecord {
        id: row.try_get("id")?,
        site_id: row.try_get("site_id")?,
        user_id: row.try_get("user_id")?,
        valid_until: row.try_get("valid_until")?,
    })
}

fn auction_from_row(row: &Row) -> StoreResult<AuctionRecord> {
    Ok(AuctionRecord {
        id: row.try_get("id")?,
        site_id: row.try_get("site_id")?,
        seller_id: row.try_get("seller_id")?,
        description: row.try_get("description")?,
        ends_on: row.try_get("ends_on")?,
        price_now: row.try_get("price_now")?,
        maximum_amount: row.try_get("maximum_amount")?,
        winner_id: row.try_get("winner_id")?,
    })
}

fn collect<T>(rows: Vec<Row>, f: fn(&Row) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(f).collect()
}

impl<'a> Transaction for PostgresTransaction<'a> {
    fn commit(self: Box<Self>) -> StoreResult<()> {
        Ok(self.0.commit()?)
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(self.0.rollback()?)
    }

    fn insert_site(&mut self, site: &NewSite) -> StoreResult<SiteRecord> {
        let row = self.0.query_one(
            "INSERT INTO sites (name, timezone, session_expiration_secs, minimum_bid_increment) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, name, timezone, session_expiration_secs, minimum_bid_increment",
            &[
                &site.name,
                &site.timezone,
                &site.session_expiration_secs,
                &site.minimum_bid_increment,
            ],
        )?;
        site_from_row(&row)
    }

    fn site_by_name(&mut self, name: &str) -> StoreResult<Option<SiteRecord>> {
        self.0
            .query_opt(
                "SELECT id, name, timezone, session_expiration_secs, minimum_bid_increment \
                 FROM sites WHERE name = $1",
                &[&name],
            )?
            .as_ref()
            .map(site_from_row)
            .transpose()
    }

    fn site_by_id(&mut self, id: SiteId) -> StoreResult<Option<SiteRecord>> {
        self.0
            .query_opt(
                "SELECT id, name, timezone, session_expiration_secs, minimum_bid_increment \
                 FROM sites WHERE id = $1",
                &[&id],
            )?
            .as_ref()
            .map(site_from_row)
            .transpose()
    }

    fn list_sites(&mut self) -> StoreResult<Vec<SiteRecord>> {
        let rows = self.0.query(
            "SELECT id, name, timezone, session_expiration_secs, minimum_bid_increment \
             FROM sites ORDER BY id",
            &[],
        )?;
        collect(rows, site_from_row)
    }

    fn delete_site(&mut self, id: SiteId) -> StoreResult<bool> {
        // auctions reference users, so they go first
        self.0
            .execute("DELETE FROM auctions WHERE site_id = $1", &[&id])?;
        Ok(self.0.execute("DELETE FROM sites WHERE id = $1", &[&id])? > 0)
    }

    fn insert_user(
        &mut self,
        site_id: SiteId,
        username: &str,
        password_hash: &str,
    ) -> StoreResult<UserRecord> {
        let row = self.0.query_one(
            "INSERT INTO users (site_id, username, password_hash) VALUES ($1, $2, $3) \
             RETURNING id, site_id, username, password_hash",
            &[&site_id, &username, &password_hash],
        )?;
        user_from_row(&row)
    }

    fn user_by_name(
        &mut self,
        site_id: SiteId,
        username: &str,
    ) -> StoreResult<Option<UserRecord>> {
        self.0
            .query_opt(
                "SELECT id, site_id, username, password_hash FROM users \
                 WHERE site_id = $1 AND username = $2",
                &[&site_id, &username],
            )?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    fn user_by_id(&mut self, id: UserId) -> StoreResult<Option<UserRecord>> {
        self.0
            .query_opt(
                "SELECT id, site_id, username, password_hash FROM users WHERE id = $1",
                &[&id],
            )?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    fn user_for_update(
        &mut self,
        site_id: SiteId,
        username: &str,
    ) -> StoreResult<Option<UserRecord>> {
        self.0
            .query_opt(
                "SELECT id, site_id, username, password_hash FROM users \
                 WHERE site_id = $1 AND username = $2 FOR UPDATE",
                &[&site_id, &username],
            )?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    fn user_for_share(&mut self, id: UserId) -> StoreResult<Option<UserRecord>> {
        self.0
            .query_opt(
                "SELECT id, site_id, username, password_hash FROM users \
                 WHERE id = $1 FOR SHARE",
                &[&id],
            )?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    fn list_users(&mut self, site_id: SiteId) -> StoreResult<Vec<UserRecord>> {
        let rows = self.0.query(
            "SELECT id, site_id, username, password_hash FROM users \
             WHERE site_id = $1 ORDER BY id",
            &[&site_id],
        )?;
        collect(rows, user_from_row)
    }

    fn delete_user(&mut self, id: UserId) -> StoreResult<bool> {
        Ok(self.0.execute("DELETE FROM users WHERE id = $1", &[&id])? > 0)
    }

    fn session_by_id(&mut self, id: SessionIdRef) -> StoreResult<Option<SessionRecord>> {
        self.0
            .query_opt(
                "SELECT id, site_id, user_id, valid_until FROM sessions WHERE id = $1",
                &[&id],
            )?
            .as_ref()
            .map(session_from_row)
            .transpose()
    }

    fn upsert_session(&mut self, session: &SessionRecord) -> StoreResult<SessionRecord> {
        // without a conflict target every unique index arbitrates, so a
        // concurrent first login waits for the other one and skips
        self.0.execute(
            "INSERT INTO sessions (id, site_id, user_id, valid_until) VALUES ($1, $2, $3, $4) \
             ON CONFLICT DO NOTHING",
            &[
                &session.id,
                &session.site_id,
                &session.user_id,
                &session.valid_until,
            ],
        )?;
        let row = self.0.query_one(
            "UPDATE sessions SET valid_until = GREATEST(valid_until, $2) WHERE user_id = $1 \
             RETURNING id, site_id, user_id, valid_until",
            &[&session.user_id, &session.valid_until],
        )?;
        session_from_row(&row)
    }

    fn update_session_valid_until(
        &mut self,
        id: SessionIdRef,
        valid_until: NaiveDateTime,
    ) -> StoreResult<bool> {
        Ok(self.0.execute(
            "UPDATE sessions SET valid_until = $2 WHERE id = $1",
            &[&id, &valid_until],
        )? > 0)
    }

    fn delete_session(&mut self, id: SessionIdRef) -> StoreResult<bool> {
        Ok(self
            .0
            .execute("DELETE FROM sessions WHERE id = $1", &[&id])?
            > 0)
    }

    fn delete_expired_sessions(
        &mut self,
        site_id: SiteId,
        now: NaiveDateTime,
    ) -> StoreResult<u64> {
        Ok(self.0.execute(
            "DELETE FROM sessions WHERE site_id = $1 AND valid_until <= $2",
            &[&site_id, &now],
        )?)
    }

    fn list_sessions(&mut self, site_id: SiteId) -> StoreResult<Vec<SessionRecord>> {
        let rows = self.0.query(
            "SELECT id, site_id, user_id, valid_until FROM sessions \
             WHERE site_id = $1 ORDER BY id",
            &[&site_id],
        )?;
        collect(rows, session_from_row)
    }

    fn insert_auction(&mut self, auction: &NewAuction) -> StoreResult<AuctionRecord> {
        let row = self.0.query_one(
            format!(
                "INSERT INTO auctions (site_id, seller_id, description, ends_on, price_now) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {AUCTION_COLUMNS}"
            ).as_str(),
            &[
                &auction.site_id,
                &auction.seller_id,
                &auction.description,
                &auction.ends_on,
                &auction.starting_price,
            ],
        )?;
        auction_from_row(&row)
    }

    fn auction_by_id(
        &mut self,
        site_id: SiteId,
        id: AuctionId,
    ) -> StoreResult<Option<AuctionRecord>> {
        self.0
            .query_opt(
                format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE site_id = $1 AND id = $2").as_str(),
                &[&site_id, &id],
            )?
            .as_ref()
            .map(auction_from_row)
            .transpose()
    }

    fn auction_for_update(
        &mut self,
        site_id: SiteId,
        id: AuctionId,
    ) -> StoreResult<Option<AuctionRecord>> {
        self.0
            .query_opt(
                format!(
                    "SELECT {AUCTION_COLUMNS} FROM auctions \
                     WHERE site_id = $1 AND id = $2 FOR UPDATE"
                ).as_str(),
                &[&site_id, &id],
            )?
            .as_ref()
            .map(auction_from_row)
            .transpose()
    }

    fn update_auction_bid(
        &mut self,
        site_id: SiteId,
        id: AuctionId,
        price_now: Amount,
        maximum_amount: Amount,
        winner_id: Option<UserId>,
    ) -> StoreResult<bool> {
        Ok(self.0.execute(
            "UPDATE auctions SET price_now = $3, maximum_amount = $4, winner_id = $5 \
             WHERE site_id = $1 AND id = $2",
            &[&site_id, &id, &price_now, &maximum_amount, &winner_id],
        )? > 0)
    }

    fn clear_winner(&mut self, user_id: UserId) -> StoreResult<u64> {
        Ok(self.0.execute(
            "UPDATE auctions SET winner_id = NULL WHERE winner_id = $1",
            &[&user_id],
        )?)
    }

    fn delete_auction(&mut self, site_id: SiteId, id: AuctionId) -> StoreResult<bool> {
        Ok(self.0.execute(
            "DELETE FROM auctions WHERE site_id = $1 AND id = $2",
            &[&site_id, &id],
        )? > 0)
    }

    fn auctions_by_seller(&mut self, seller_id: UserId) -> StoreResult<Vec<AuctionRecord>> {
        let rows = self.0.query(
            format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE seller_id = $1 ORDER BY id").as_str(),
            &[&seller_id],
        )?;
        collect(rows, auction_from_row)
    }

    fn auctions_won_by(&mut self, winner_id: UserId) -> StoreResult<Vec<AuctionRecord>> {
        let rows = self.0.query(
            format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE winner_id = $1 ORDER BY id").as_str(),
            &[&winner_id],
        )?;
        collect(rows, auction_from_row)
    }

    fn list_auctions(&mut self, site_id: SiteId) -> StoreResult<Vec<AuctionRecord>> {
        let rows = self.0.query(
            format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE site_id = $1 ORDER BY id").as_str(),
            &[&site_id],
        )?;
        collect(rows, auction_from_row)
    }
}
