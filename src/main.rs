use anyhow::{Context, Result};
use auction_site::{
    config::Config, Argon2Hasher, Host, InMemoryPersistence, PostgresPersistence,
    SharedPersistence, SystemClockFactory,
};
use clap::Parser;
use std::sync::{mpsc, Arc};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::parse();
    init_logging(&config);

    let persistence: SharedPersistence = match &config.database_url {
        Some(url) => PostgresPersistence::new_shared(url, config.pool_size)
            .context("connecting to the database")?,
        None => {
            info!("no database configured, using the in-memory store");
            InMemoryPersistence::new_shared()
        }
    };

    if config.reset {
        Host::create_schema(&*persistence)?;
    }

    let host = Host::new(persistence, Arc::new(SystemClockFactory))?
        .with_reap_interval(config.reap_interval())
        .with_password_hasher(Argon2Hasher::new_shared(
            config.hash_time_cost,
            config.hash_memory_kib,
        )?);

    // Keep every site loaded so that their sessions keep being reaped
    let sites = host
        .site_infos()?
        .into_iter()
        .map(|info| host.load_site(&info.name))
        .collect::<Result<Vec<_>, _>>()?;
    info!(sites = sites.len(), "auction site running");

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;
    let _ = stop_rx.recv();

    info!("stopping");
    drop(sites);

    Ok(())
}
