//! Lifecycle reaper: purges accounts whose deletion grace period elapsed.
//!
//! The cascade is explicit and ownership-respecting: grant rows have two
//! owning sides, so automatic FK cascade would miss the referrer half.
//! Each user purges in its own transaction, re-checking the deadline under
//! the write lock so a cancellation racing the sweep wins.

use std::sync::Arc;

use rusqlite::{params, Connection};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};

use crate::config::Config;
use crate::daykey::now_ts;
use crate::errors::LedgerResult;
use crate::logging::{self, obj, v_int, Domain, Level};
use crate::store::{self, Store};

#[derive(Debug, Default, Clone, Serialize)]
pub struct PurgeReport {
    pub users: u64,
    pub assignments: u64,
    pub completions: u64,
    pub withdrawals: u64,
    pub grants: u64,
}

/// One sweep over all users whose `delete_effective_ts` has passed.
pub fn sweep(conn: &mut Connection, now: i64) -> LedgerResult<PurgeReport> {
    let due: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM users
             WHERE delete_effective_ts IS NOT NULL AND delete_effective_ts <= ?1",
        )?;
        let rows = stmt.query_map(params![now], |r| r.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        ids
    };

    let mut report = PurgeReport::default();
    for user_id in due {
        let tx = store::write_tx(conn)?;
        let assignments =
            tx.execute("DELETE FROM assignments WHERE user_id = ?1", params![user_id])? as u64;
        let completions =
            tx.execute("DELETE FROM completions WHERE user_id = ?1", params![user_id])? as u64;
        let withdrawals =
            tx.execute("DELETE FROM withdrawals WHERE user_id = ?1", params![user_id])? as u64;
        let grants = tx.execute(
            "DELETE FROM referral_grants WHERE referrer_id = ?1 OR referred_id = ?1",
            params![user_id],
        )? as u64;
        // Deadline re-checked under the write lock; a user restored since
        // the scan keeps all rows (transaction drops without commit).
        let removed = tx.execute(
            "DELETE FROM users
             WHERE id = ?1 AND delete_effective_ts IS NOT NULL AND delete_effective_ts <= ?2",
            params![user_id, now],
        )?;
        if removed == 0 {
            continue;
        }
        tx.commit()?;

        report.users += 1;
        report.assignments += assignments;
        report.completions += completions;
        report.withdrawals += withdrawals;
        report.grants += grants;
        logging::log_purge(&user_id, assignments, completions, withdrawals, grants);
    }
    Ok(report)
}

/// Background loop for the server binary: one sweep per interval tick.
pub async fn run_periodic(store: Arc<Mutex<Store>>, cfg: Config) {
    let mut ticker = interval(Duration::from_secs(cfg.reaper_interval_secs.max(1)));
    loop {
        ticker.tick().await;
        let mut guard = store.lock().await;
        match sweep(guard.conn_mut(), now_ts()) {
            Ok(report) if report.users > 0 => {
                logging::log(
                    Level::Info,
                    Domain::Reaper,
                    "sweep_complete",
                    obj(&[("purged_users", v_int(report.users as i64))]),
                );
            }
            Ok(_) => {}
            Err(err) => {
                logging::log(
                    Level::Error,
                    Domain::Reaper,
                    "sweep_failed",
                    obj(&[("error", logging::v_str(&err.to_string()))]),
                );
            }
        }
    }
}
