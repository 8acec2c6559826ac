//! One-shot purge sweep for operations: runs the reaper once against the
//! configured database and prints the report as JSON.
//! Run with: cargo run --bin reap

use anyhow::Result;
use taskledger::config::Config;
use taskledger::daykey::now_ts;
use taskledger::reaper;
use taskledger::store::Store;

fn main() -> Result<()> {
    let cfg = Config::from_env();
    let mut store = Store::open(&cfg.sqlite_path)?;
    store.init()?;
    let report = reaper::sweep(store.conn_mut(), now_ts())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
