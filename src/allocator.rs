//! Daily allocator: draws each user's bounded task set for a day key.
//!
//! Allocation is idempotent and frozen once full: repeat calls return the
//! stored set unchanged even if the catalog has since changed. The draw
//! takes an explicit random source so a seeded RNG reproduces it exactly.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::catalog;
use crate::config::Config;
use crate::errors::LedgerResult;
use crate::logging;
use crate::store;

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub user_id: String,
    pub day_key: String,
    pub task_id: String,
    pub category: String,
    pub reward: i64,
    pub assigned_ts: i64,
    pub completed_ts: Option<i64>,
    pub answer: Option<String>,
}

fn assignment_from_row(row: &Row) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        user_id: row.get(0)?,
        day_key: row.get(1)?,
        task_id: row.get(2)?,
        category: row.get(3)?,
        reward: row.get(4)?,
        assigned_ts: row.get(5)?,
        completed_ts: row.get(6)?,
        answer: row.get(7)?,
    })
}

pub fn assignments_for_day(
    conn: &Connection,
    user_id: &str,
    day_key: &str,
) -> LedgerResult<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, day_key, task_id, category, reward, assigned_ts, completed_ts, answer
         FROM assignments WHERE user_id = ?1 AND day_key = ?2
         ORDER BY assigned_ts, task_id",
    )?;
    let rows = stmt.query_map(params![user_id, day_key], assignment_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Count of today's assignments not yet completed.
pub fn remaining_for_day(conn: &Connection, user_id: &str, day_key: &str) -> LedgerResult<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM assignments
         WHERE user_id = ?1 AND day_key = ?2 AND completed_ts IS NULL",
        params![user_id, day_key],
        |r| r.get(0),
    )?;
    Ok(n)
}

/// Ensure the user's allocation for `day_key` exists and return it, oldest
/// first. Safe to call on every request:
///
/// - a full day is returned unchanged;
/// - a partial day is topped up from the active catalog, skipping categories
///   already used, until the limit or the catalog runs out of fresh
///   categories (fewer than the limit is fine, a duplicate category never is);
/// - racing allocators serialize on the store's write lock, and conflicting
///   inserts are absorbed by `INSERT OR IGNORE` under the triple and
///   category unique indexes.
pub fn ensure_assignments<R: Rng>(
    conn: &mut Connection,
    cfg: &Config,
    rng: &mut R,
    user_id: &str,
    day_key: &str,
    now: i64,
) -> LedgerResult<Vec<Assignment>> {
    let existing = assignments_for_day(conn, user_id, day_key)?;
    if existing.len() >= cfg.daily_task_limit {
        return Ok(existing);
    }

    let tx = store::write_tx(conn)?;
    // Re-read under the write lock; a racing request may have filled the day.
    let mut used: HashSet<String> = {
        let mut stmt = tx.prepare(
            "SELECT category FROM assignments WHERE user_id = ?1 AND day_key = ?2",
        )?;
        let rows = stmt.query_map(params![user_id, day_key], |r| r.get::<_, String>(0))?;
        let mut set = HashSet::new();
        for row in rows {
            set.insert(row?);
        }
        set
    };
    let mut have = used.len();

    let mut pool = catalog::active_tasks(&tx)?;
    pool.shuffle(rng);

    let mut fresh = 0usize;
    for task in pool {
        if have >= cfg.daily_task_limit {
            break;
        }
        if used.contains(&task.category) {
            continue;
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO assignments
             (user_id, day_key, task_id, category, reward, assigned_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, day_key, task.id, task.category, task.reward, now],
        )?;
        if inserted > 0 {
            used.insert(task.category);
            have += 1;
            fresh += 1;
        }
    }
    tx.commit()?;

    let all = assignments_for_day(conn, user_id, day_key)?;
    if fresh > 0 {
        logging::log_allocation(user_id, day_key, fresh, all.len());
    }
    Ok(all)
}
