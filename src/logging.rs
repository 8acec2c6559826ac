//! Structured logging for the reward ledger.
//!
//! Design goals:
//! 1. Multi-level granularity (TRACE -> FATAL)
//! 2. Domain-specific categories for filtering
//! 3. JSONL output suitable for replay and audit of ledger mutations
//! 4. Redaction of payout destinations before anything hits disk

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Alloc,    // Daily assignment draws
    Ledger,   // Completion credits
    Referral, // Bonus grants and redemptions
    Withdraw, // Withdrawal requests and payouts
    Account,  // User lifecycle (creation, deletion requests)
    Reaper,   // Purge sweeps
    System,   // Startup, shutdown, config
    Audit,    // Balance-mutation audit trail
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Alloc => "alloc",
            Domain::Ledger => "ledger",
            Domain::Referral => "referral",
            Domain::Withdraw => "withdraw",
            Domain::Account => "account",
            Domain::Reaper => "reaper",
            Domain::System => "system",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list, or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context and sequencing
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Mutex<BufWriter<File>>,
    audit: Mutex<BufWriter<File>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let events_path = run_dir.join("events.jsonl");
        let audit_path = run_dir.join("audit.jsonl");

        let events = File::create(events_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create events log: {}", err);
            File::create("/tmp/taskledger-events.jsonl").expect("events fallback")
        });
        let audit = File::create(audit_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create audit log: {}", err);
            File::create("/tmp/taskledger-audit.jsonl").expect("audit fallback")
        });

        RunContext {
            run_id,
            events: Mutex::new(BufWriter::new(events)),
            audit: Mutex::new(BufWriter::new(audit)),
        }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["phone", "destination", "receipt_ref"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["user_id", "task_id", "day_key", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    let ctx = ensure_run_context();
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("domain".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    if domain == Domain::Audit {
        write_line(&ctx.audit, &line);
    }
    write_line(&ctx.events, &line);
    println!("{}", line);
}

// =============================================================================
// Domain-specific helpers
// =============================================================================

pub fn log_allocation(user_id: &str, day_key: &str, fresh: usize, total: usize) {
    log(
        Level::Info,
        Domain::Alloc,
        "assignments_ensured",
        obj(&[
            ("user_id", v_str(user_id)),
            ("day_key", v_str(day_key)),
            ("fresh", v_int(fresh as i64)),
            ("total", v_int(total as i64)),
        ]),
    );
}

/// Every balance credit goes through here so the audit file is a complete
/// record of upward mutations.
pub fn log_credit(user_id: &str, source: &str, amount: i64, balance_after: i64) {
    log(
        Level::Info,
        Domain::Audit,
        "balance_credit",
        obj(&[
            ("user_id", v_str(user_id)),
            ("source", v_str(source)),
            ("amount", v_int(amount)),
            ("balance_after", v_int(balance_after)),
        ]),
    );
}

pub fn log_debit(user_id: &str, sink: &str, amount: i64, balance_after: i64) {
    log(
        Level::Info,
        Domain::Audit,
        "balance_debit",
        obj(&[
            ("user_id", v_str(user_id)),
            ("sink", v_str(sink)),
            ("amount", v_int(amount)),
            ("balance_after", v_int(balance_after)),
        ]),
    );
}

pub fn log_grant(referrer_id: &str, referred_id: &str, amount: i64) {
    log(
        Level::Info,
        Domain::Referral,
        "bonus_granted",
        obj(&[
            ("user_id", v_str(referrer_id)),
            ("referred_id", v_str(referred_id)),
            ("amount", v_int(amount)),
        ]),
    );
}

pub fn log_withdrawal(user_id: &str, withdrawal_id: i64, amount: i64, method: &str) {
    log(
        Level::Info,
        Domain::Withdraw,
        "withdrawal_requested",
        obj(&[
            ("user_id", v_str(user_id)),
            ("withdrawal_id", v_int(withdrawal_id)),
            ("amount", v_int(amount)),
            ("method", v_str(method)),
        ]),
    );
}

pub fn log_purge(user_id: &str, assignments: u64, completions: u64, withdrawals: u64, grants: u64) {
    log(
        Level::Info,
        Domain::Reaper,
        "account_purged",
        obj(&[
            ("user_id", v_str(user_id)),
            ("assignments", v_int(assignments as i64)),
            ("completions", v_int(completions as i64)),
            ("withdrawals", v_int(withdrawals as i64)),
            ("grants", v_int(grants as i64)),
        ]),
    );
}

// =============================================================================
// Field helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_int(n: i64) -> Value {
    json!(n)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_int(42))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }

    #[test]
    fn test_phone_redacted() {
        let fields = sanitize_fields(obj(&[("phone", v_str("+254700000000"))]));
        assert_eq!(fields.get("phone").unwrap(), "[REDACTED]");
    }

    #[test]
    fn test_split_promotes_user_id() {
        let (top, data) = split_fields(obj(&[("user_id", v_str("u1")), ("amount", v_int(5))]));
        assert!(top.contains_key("user_id"));
        assert!(data.contains_key("amount"));
        assert!(!data.contains_key("user_id"));
    }
}
