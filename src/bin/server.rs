//! Ledger service: HTTP surface plus the background purge sweep.
//! Run with: cargo run --bin server

use std::sync::Arc;

use anyhow::Result;
use taskledger::api::{self, ApiState};
use taskledger::config::Config;
use taskledger::logging::{self, obj, v_str, Domain, Level};
use taskledger::reaper;
use taskledger::store::Store;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    logging::log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("listen_addr", v_str(&cfg.listen_addr)),
            ("sqlite_path", v_str(&cfg.sqlite_path)),
            ("config_hash", v_str(&cfg.config_hash())),
        ]),
    );

    let mut store = Store::open(&cfg.sqlite_path)?;
    store.init()?;
    let store = Arc::new(Mutex::new(store));

    tokio::spawn(reaper::run_periodic(store.clone(), cfg.clone()));

    let app = api::routes(ApiState {
        store,
        cfg: cfg.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
