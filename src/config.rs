use crate::password::Argon2Hasher;
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "auction-site", about = "Multi-site auction marketplace")]
pub struct Config {
    /// Postgres connection string; the in-memory store is used when absent
    #[arg(long, env = "AUCTION_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "AUCTION_POOL_SIZE", default_value_t = 8)]
    pub pool_size: u32,

    /// Seconds between two sweeps of expired sessions
    #[arg(long, env = "AUCTION_REAP_INTERVAL_SECS", default_value_t = 300)]
    pub reap_interval_secs: u64,

    /// Argon2id passes over memory per password hash
    #[arg(long, env = "AUCTION_HASH_TIME_COST", default_value_t = Argon2Hasher::DEFAULT_TIME_COST)]
    pub hash_time_cost: u32,

    /// Argon2id memory per password hash, in KiB
    #[arg(long, env = "AUCTION_HASH_MEMORY_KIB", default_value_t = Argon2Hasher::DEFAULT_MEMORY_KIB)]
    pub hash_memory_kib: u32,

    /// Drop all data and recreate the schema before starting
    #[arg(long)]
    pub reset: bool,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    #[arg(long, help = "Log as JSON lines")]
    pub log_json: bool,
}

impl Config {
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_parsed() {
        let config = Config::parse_from([
            "auction-site",
            "--database-url",
            "postgres://localhost/auctions",
            "--reap-interval-secs",
            "60",
            "--reset",
        ]);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/auctions")
        );
        assert_eq!(config.reap_interval(), Duration::from_secs(60));
        assert!(config.reset);
    }

    #[test]
    fn zero_reap_interval_is_clamped() {
        let config = Config::parse_from(["auction-site", "--reap-interval-secs", "0"]);
        assert_eq!(config.reap_interval(), Duration::from_secs(1));
    }
}
