//! User rows: creation, balance reads, and the deletion request lifecycle.
//!
//! `referred_by` is set once at creation and never mutated afterwards; the
//! idempotent insert makes re-registration a no-op rather than an update.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::config::Config;
use crate::errors::{LedgerError, LedgerResult};
use crate::logging::{self, obj, v_int, v_str, Domain, Level};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub balance: i64,
    pub bonus_balance: i64,
    pub referred_by: Option<String>,
    pub created_ts: i64,
    pub delete_requested_ts: Option<i64>,
    pub delete_effective_ts: Option<i64>,
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        balance: row.get(1)?,
        bonus_balance: row.get(2)?,
        referred_by: row.get(3)?,
        created_ts: row.get(4)?,
        delete_requested_ts: row.get(5)?,
        delete_effective_ts: row.get(6)?,
    })
}

const USER_COLS: &str =
    "id, balance, bonus_balance, referred_by, created_ts, delete_requested_ts, delete_effective_ts";

/// Register a user, optionally recording who referred them. Self-referrals
/// are dropped to NULL. Idempotent: an existing row is left untouched, so
/// `referred_by` can never be rewritten after the fact.
pub fn create_user(
    conn: &Connection,
    user_id: &str,
    referred_by: Option<&str>,
    now: i64,
) -> LedgerResult<()> {
    let referrer = referred_by.filter(|r| *r != user_id);
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO users (id, referred_by, created_ts) VALUES (?1, ?2, ?3)",
        params![user_id, referrer, now],
    )?;
    if inserted > 0 {
        logging::log(
            Level::Info,
            Domain::Account,
            "user_created",
            obj(&[
                ("user_id", v_str(user_id)),
                (
                    "referred_by",
                    referrer.map(v_str).unwrap_or(serde_json::Value::Null),
                ),
            ]),
        );
    }
    Ok(())
}

/// First-touch creation without a referrer, used on the request path where
/// identity arrives from the authentication collaborator.
pub fn ensure_user(conn: &Connection, user_id: &str, now: i64) -> LedgerResult<()> {
    create_user(conn, user_id, None, now)
}

pub fn get_user(conn: &Connection, user_id: &str) -> LedgerResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            params![user_id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn require_user(conn: &Connection, user_id: &str) -> LedgerResult<User> {
    get_user(conn, user_id)?.ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))
}

/// Start the deletion grace period. Both timestamps are set together;
/// repeating the request refreshes them. Returns the effective timestamp.
pub fn request_deletion(
    conn: &Connection,
    cfg: &Config,
    user_id: &str,
    now: i64,
) -> LedgerResult<i64> {
    let effective = now + cfg.deletion_grace_secs;
    let changed = conn.execute(
        "UPDATE users SET delete_requested_ts = ?1, delete_effective_ts = ?2 WHERE id = ?3",
        params![now, effective, user_id],
    )?;
    if changed == 0 {
        return Err(LedgerError::UnknownUser(user_id.to_string()));
    }
    logging::log(
        Level::Info,
        Domain::Account,
        "deletion_requested",
        obj(&[
            ("user_id", v_str(user_id)),
            ("effective_ts", v_int(effective)),
        ]),
    );
    Ok(effective)
}

/// Clear both deletion timestamps. A no-op for users with no pending
/// deletion; the caller's intent is satisfied either way.
pub fn cancel_deletion(conn: &Connection, user_id: &str) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE users SET delete_requested_ts = NULL, delete_effective_ts = NULL WHERE id = ?1",
        params![user_id],
    )?;
    if changed == 0 {
        return Err(LedgerError::UnknownUser(user_id.to_string()));
    }
    logging::log(
        Level::Info,
        Domain::Account,
        "deletion_cancelled",
        obj(&[("user_id", v_str(user_id))]),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn fresh_store() -> Store {
        let mut store = Store::open_in_memory().expect("open");
        store.init().expect("init");
        store
    }

    #[test]
    fn test_referred_by_set_once() {
        let store = fresh_store();
        let conn = store.conn();
        create_user(conn, "b", Some("a"), 100).expect("create");
        // A second registration with a different referrer must not rewrite it.
        create_user(conn, "b", Some("c"), 200).expect("re-create");
        let user = require_user(conn, "b").expect("get");
        assert_eq!(user.referred_by.as_deref(), Some("a"));
        assert_eq!(user.created_ts, 100);
    }

    #[test]
    fn test_self_referral_dropped() {
        let store = fresh_store();
        create_user(store.conn(), "a", Some("a"), 0).expect("create");
        let user = require_user(store.conn(), "a").expect("get");
        assert_eq!(user.referred_by, None);
    }

    #[test]
    fn test_deletion_timestamps_paired() {
        let store = fresh_store();
        let cfg = Config {
            deletion_grace_secs: 1_000,
            ..Config::from_env()
        };
        create_user(store.conn(), "a", None, 0).expect("create");
        let effective = request_deletion(store.conn(), &cfg, "a", 500).expect("request");
        assert_eq!(effective, 1_500);
        let user = require_user(store.conn(), "a").expect("get");
        assert_eq!(user.delete_requested_ts, Some(500));
        assert_eq!(user.delete_effective_ts, Some(1_500));

        cancel_deletion(store.conn(), "a").expect("cancel");
        let user = require_user(store.conn(), "a").expect("get");
        assert_eq!(user.delete_requested_ts, None);
        assert_eq!(user.delete_effective_ts, None);
    }

    #[test]
    fn test_unknown_user_surfaces() {
        let store = fresh_store();
        let err = require_user(store.conn(), "ghost").unwrap_err();
        assert_eq!(err.reason(), "unknown_user");
    }
}
