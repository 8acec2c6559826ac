//! Completion ledger: validates a task completion and commits it as one
//! atomic credit event.
//!
//! The guard checks, the assignment flip, the audit row, and the balance
//! credit all happen inside a single IMMEDIATE transaction. An error at any
//! point rolls the whole unit back, so a credited balance without its
//! completion row (or the reverse) cannot exist, and a retried request is
//! rejected by the completed-flag check instead of crediting twice.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::catalog;
use crate::config::Config;
use crate::daykey::day_key;
use crate::errors::{LedgerError, LedgerResult};
use crate::logging;
use crate::referral;
use crate::store;

#[derive(Debug, Clone, Serialize)]
pub struct CompletionEntry {
    pub ts: i64,
    pub task_id: String,
    pub category: String,
    pub reward: i64,
}

/// Commit a completion for (user, today, task) and return the new balance.
pub fn complete(
    conn: &mut Connection,
    cfg: &Config,
    user_id: &str,
    task_id: &str,
    answer: &str,
    now: i64,
) -> LedgerResult<i64> {
    let answer = answer.trim();
    if answer.len() < cfg.min_answer_len {
        return Err(LedgerError::AnswerTooShort);
    }
    let key = day_key(now, cfg.utc_offset_hours);

    let tx = store::write_tx(conn)?;

    let assignment: Option<(i64, Option<i64>)> = tx
        .query_row(
            "SELECT reward, completed_ts FROM assignments
             WHERE user_id = ?1 AND day_key = ?2 AND task_id = ?3",
            params![user_id, key, task_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let (reward, completed_ts) = assignment.ok_or(LedgerError::NotAssignedToday)?;
    if completed_ts.is_some() {
        return Err(LedgerError::AlreadyCompleted);
    }
    let still_active = catalog::get_task(&tx, task_id)?.map(|t| t.active).unwrap_or(false);
    if !still_active {
        return Err(LedgerError::TaskUnavailable);
    }

    tx.execute(
        "UPDATE assignments SET completed_ts = ?1, answer = ?2
         WHERE user_id = ?3 AND day_key = ?4 AND task_id = ?5",
        params![now, answer, user_id, key, task_id],
    )?;
    tx.execute(
        "INSERT INTO completions (user_id, task_id, day_key, reward, answer, ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![user_id, task_id, key, reward, answer, now],
    )?;
    let credited = tx.execute(
        "UPDATE users SET balance = balance + ?1 WHERE id = ?2",
        params![reward, user_id],
    )?;
    if credited == 0 {
        return Err(LedgerError::UnknownUser(user_id.to_string()));
    }
    let new_balance: i64 = tx.query_row(
        "SELECT balance FROM users WHERE id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;

    // Referral payout rides in the same transaction; the grant row's
    // uniqueness keeps it exactly-once even across retried requests.
    referral::maybe_grant_first_completion(&tx, cfg, user_id, now)?;

    tx.commit()?;
    logging::log_credit(user_id, "task_completion", reward, new_balance);
    Ok(new_balance)
}

/// Completed-task history, newest first, bounded to one page.
pub fn completion_history(
    conn: &Connection,
    cfg: &Config,
    user_id: &str,
) -> LedgerResult<Vec<CompletionEntry>> {
    let mut stmt = conn.prepare(
        "SELECT c.ts, c.task_id, COALESCE(t.category, ''), c.reward
         FROM completions c LEFT JOIN tasks t ON t.id = c.task_id
         WHERE c.user_id = ?1
         ORDER BY c.ts DESC, c.id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, cfg.history_page_size as i64], |r| {
        Ok(CompletionEntry {
            ts: r.get(0)?,
            task_id: r.get(1)?,
            category: r.get(2)?,
            reward: r.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
