//! Referral bonus engine.
//!
//! The grant row is the single source of truth for "has this referral been
//! paid": payout happens iff the row insert takes under the pair's primary
//! key. No counter or flag on the user is consulted, so retried requests
//! and races collapse to one payout.

use rusqlite::{params, Connection, OptionalExtension};

use crate::account;
use crate::config::Config;
use crate::errors::{LedgerError, LedgerResult};
use crate::logging;
use crate::store;

/// Called inside the completion transaction. If this completion is the
/// referred user's first ever, pay the referrer's bonus balance exactly
/// once. A pre-existing grant row is an idempotent no-op.
pub fn maybe_grant_first_completion(
    conn: &Connection,
    cfg: &Config,
    user_id: &str,
    now: i64,
) -> LedgerResult<()> {
    let referred_by: Option<String> = conn
        .query_row(
            "SELECT referred_by FROM users WHERE id = ?1",
            params![user_id],
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    let Some(referrer) = referred_by else {
        return Ok(());
    };
    // The referrer may have been purged since registration; a grant row
    // must never point at a user that no longer exists.
    if account::get_user(conn, &referrer)?.is_none() {
        return Ok(());
    }

    let completions: i64 = conn.query_row(
        "SELECT COUNT(*) FROM completions WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;
    if completions != 1 {
        return Ok(());
    }

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO referral_grants (referrer_id, referred_id, amount, granted_ts)
         VALUES (?1, ?2, ?3, ?4)",
        params![referrer, user_id, cfg.referral_bonus, now],
    )?;
    if inserted == 0 {
        // Already granted for this pair; absorb silently.
        return Ok(());
    }

    conn.execute(
        "UPDATE users SET bonus_balance = bonus_balance + ?1 WHERE id = ?2",
        params![cfg.referral_bonus, referrer],
    )?;
    logging::log_grant(&referrer, user_id, cfg.referral_bonus);
    Ok(())
}

/// Move one fixed block from bonus balance to spendable balance. Rejected
/// below the threshold; the check and the move share one transaction.
pub fn redeem_bonus(conn: &mut Connection, cfg: &Config, user_id: &str) -> LedgerResult<(i64, i64)> {
    let tx = store::write_tx(conn)?;
    let user = account::require_user(&tx, user_id)?;
    if user.bonus_balance < cfg.bonus_redeem_block {
        return Err(LedgerError::BonusThresholdUnmet {
            have: user.bonus_balance,
            need: cfg.bonus_redeem_block,
        });
    }
    tx.execute(
        "UPDATE users SET bonus_balance = bonus_balance - ?1, balance = balance + ?1
         WHERE id = ?2",
        params![cfg.bonus_redeem_block, user_id],
    )?;
    let (balance, bonus_balance): (i64, i64) = tx.query_row(
        "SELECT balance, bonus_balance FROM users WHERE id = ?1",
        params![user_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    tx.commit()?;
    logging::log_credit(user_id, "bonus_redemption", cfg.bonus_redeem_block, balance);
    Ok((balance, bonus_balance))
}

/// (count of referred users whose bonus has been paid out, current bonus balance)
pub fn referral_status(conn: &Connection, user_id: &str) -> LedgerResult<(i64, i64)> {
    let user = account::require_user(conn, user_id)?;
    let referral_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM referral_grants WHERE referrer_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;
    Ok((referral_count, user.bonus_balance))
}
