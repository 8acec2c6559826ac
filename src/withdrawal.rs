//! Withdrawal ledger: requests debit the balance up front; payout marking
//! is a privileged, monotone status advance.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::account;
use crate::config::Config;
use crate::errors::{LedgerError, LedgerResult};
use crate::logging;
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Paid,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Paid => "paid",
        }
    }
}

impl FromSql for WithdrawalStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(WithdrawalStatus::Pending),
            "paid" => Ok(WithdrawalStatus::Paid),
            other => Err(FromSqlError::Other(
                format!("unknown withdrawal status: {other}").into(),
            )),
        }
    }
}

impl ToSql for WithdrawalStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Withdrawal {
    pub id: i64,
    pub user_id: String,
    pub amount: i64,
    pub phone: String,
    pub method: String,
    pub status: WithdrawalStatus,
    pub receipt_ref: Option<String>,
    pub created_ts: i64,
}

fn withdrawal_from_row(row: &Row) -> rusqlite::Result<Withdrawal> {
    Ok(Withdrawal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        phone: row.get(3)?,
        method: row.get(4)?,
        status: row.get(5)?,
        receipt_ref: row.get(6)?,
        created_ts: row.get(7)?,
    })
}

const WITHDRAWAL_COLS: &str =
    "id, user_id, amount, phone, method, status, receipt_ref, created_ts";

/// Validate and record a withdrawal request. The balance check and the
/// debit share one transaction, so overlapping requests cannot both spend
/// the same funds.
pub fn request_withdrawal(
    conn: &mut Connection,
    user_id: &str,
    amount: i64,
    phone: &str,
    method: &str,
    now: i64,
) -> LedgerResult<Withdrawal> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount);
    }
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(LedgerError::DestinationMissing);
    }

    let tx = store::write_tx(conn)?;
    let user = account::require_user(&tx, user_id)?;
    if user.balance < amount {
        return Err(LedgerError::InsufficientBalance {
            have: user.balance,
            need: amount,
        });
    }
    tx.execute(
        "UPDATE users SET balance = balance - ?1 WHERE id = ?2",
        params![amount, user_id],
    )?;
    tx.execute(
        "INSERT INTO withdrawals (user_id, amount, phone, method, status, created_ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![user_id, amount, phone, method, WithdrawalStatus::Pending, now],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    logging::log_withdrawal(user_id, id, amount, method);
    logging::log_debit(user_id, "withdrawal", amount, user.balance - amount);
    Ok(Withdrawal {
        id,
        user_id: user_id.to_string(),
        amount,
        phone: phone.to_string(),
        method: method.to_string(),
        status: WithdrawalStatus::Pending,
        receipt_ref: None,
        created_ts: now,
    })
}

/// Privileged: advance pending -> paid and attach the receipt reference.
/// The only allowed status transition; a paid row is terminal.
pub fn mark_paid(conn: &mut Connection, withdrawal_id: i64, receipt_ref: &str) -> LedgerResult<()> {
    let tx = store::write_tx(conn)?;
    let status: Option<WithdrawalStatus> = tx
        .query_row(
            "SELECT status FROM withdrawals WHERE id = ?1",
            params![withdrawal_id],
            |r| r.get(0),
        )
        .optional()?;
    match status {
        None => Err(LedgerError::WithdrawalNotFound(withdrawal_id)),
        Some(WithdrawalStatus::Paid) => Err(LedgerError::AlreadyPaid(withdrawal_id)),
        Some(WithdrawalStatus::Pending) => {
            tx.execute(
                "UPDATE withdrawals SET status = ?1, receipt_ref = ?2
                 WHERE id = ?3 AND status = ?4",
                params![
                    WithdrawalStatus::Paid,
                    receipt_ref,
                    withdrawal_id,
                    WithdrawalStatus::Pending
                ],
            )?;
            tx.commit()?;
            logging::log(
                logging::Level::Info,
                logging::Domain::Withdraw,
                "withdrawal_paid",
                logging::obj(&[
                    ("withdrawal_id", logging::v_int(withdrawal_id)),
                    ("receipt_ref", logging::v_str(receipt_ref)),
                ]),
            );
            Ok(())
        }
    }
}

/// Request history, newest first, bounded to one page.
pub fn withdrawal_history(
    conn: &Connection,
    cfg: &Config,
    user_id: &str,
) -> LedgerResult<Vec<Withdrawal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {WITHDRAWAL_COLS} FROM withdrawals
         WHERE user_id = ?1
         ORDER BY created_ts DESC, id DESC
         LIMIT ?2"
    ))?;
    let rows = stmt.query_map(
        params![user_id, cfg.history_page_size as i64],
        withdrawal_from_row,
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_sql_round_trip() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE t (s TEXT)").expect("ddl");
        conn.execute("INSERT INTO t (s) VALUES (?1)", params![WithdrawalStatus::Paid])
            .expect("insert");
        let status: WithdrawalStatus = conn
            .query_row("SELECT s FROM t", [], |r| r.get(0))
            .expect("read");
        assert_eq!(status, WithdrawalStatus::Paid);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE t (s TEXT); INSERT INTO t VALUES ('refunded');")
            .expect("ddl");
        let res: rusqlite::Result<WithdrawalStatus> =
            conn.query_row("SELECT s FROM t", [], |r| r.get(0));
        assert!(res.is_err());
    }
}
