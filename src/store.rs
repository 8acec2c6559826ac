//! Durable store: SQLite schema and connection management.
//!
//! Every unique constraint the engine relies on lives here as a real index,
//! not an application-side convention: the assignment triple, the per-day
//! category rule, and the referral grant pair. Balances carry CHECK
//! constraints so a bug that would drive them negative aborts the
//! transaction instead of corrupting the ledger.

use anyhow::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        configure(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        Ok(Self { conn })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
                bonus_balance INTEGER NOT NULL DEFAULT 0 CHECK (bonus_balance >= 0),
                referred_by TEXT,
                created_ts INTEGER NOT NULL,
                delete_requested_ts INTEGER,
                delete_effective_ts INTEGER
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                reward INTEGER NOT NULL CHECK (reward > 0),
                active INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS assignments (
                user_id TEXT NOT NULL,
                day_key TEXT NOT NULL,
                task_id TEXT NOT NULL,
                category TEXT NOT NULL,
                reward INTEGER NOT NULL,
                assigned_ts INTEGER NOT NULL,
                completed_ts INTEGER,
                answer TEXT,
                PRIMARY KEY (user_id, day_key, task_id)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_category
                ON assignments (user_id, day_key, category);
            CREATE TABLE IF NOT EXISTS completions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                day_key TEXT NOT NULL,
                reward INTEGER NOT NULL,
                answer TEXT NOT NULL,
                ts INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_completions_user
                ON completions (user_id, ts);
            CREATE TABLE IF NOT EXISTS referral_grants (
                referrer_id TEXT NOT NULL,
                referred_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                granted_ts INTEGER NOT NULL,
                PRIMARY KEY (referrer_id, referred_id)
            );
            CREATE TABLE IF NOT EXISTS withdrawals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                amount INTEGER NOT NULL CHECK (amount > 0),
                phone TEXT NOT NULL,
                method TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                receipt_ref TEXT,
                created_ts INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_withdrawals_user
                ON withdrawals (user_id, created_ts);
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    // Writers from other connections wait instead of failing fast; a busy
    // store is a retryable condition, not an error surface.
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

/// An IMMEDIATE transaction takes the write lock up front, so the guard
/// check and the mutation it justifies are atomic against every other
/// connection, not just this one.
pub fn write_tx(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_idempotent() {
        let mut store = Store::open_in_memory().expect("open");
        store.init().expect("first init");
        store.init().expect("second init");
    }

    #[test]
    fn test_negative_balance_rejected_by_schema() {
        let mut store = Store::open_in_memory().expect("open");
        store.init().expect("init");
        store
            .conn()
            .execute(
                "INSERT INTO users (id, balance, created_ts) VALUES ('u1', 10, 0)",
                [],
            )
            .expect("insert");
        let res = store.conn().execute(
            "UPDATE users SET balance = balance - 20 WHERE id = 'u1'",
            [],
        );
        assert!(res.is_err(), "CHECK constraint should reject negative balance");
    }

    #[test]
    fn test_category_unique_per_day() {
        let mut store = Store::open_in_memory().expect("open");
        store.init().expect("init");
        let conn = store.conn();
        conn.execute(
            "INSERT INTO assignments (user_id, day_key, task_id, category, reward, assigned_ts)
             VALUES ('u1', '2024-01-01', 't1', 'survey', 10, 0)",
            [],
        )
        .expect("first insert");
        let dup = conn.execute(
            "INSERT INTO assignments (user_id, day_key, task_id, category, reward, assigned_ts)
             VALUES ('u1', '2024-01-01', 't2', 'survey', 10, 0)",
            [],
        );
        assert!(dup.is_err(), "same category twice in one day must conflict");
    }
}
