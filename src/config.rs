use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub sqlite_path: String,
    pub listen_addr: String,
    /// Reference timezone as a fixed UTC offset; the daily reset boundary is
    /// local midnight at this offset, not UTC midnight.
    pub utc_offset_hours: i32,
    pub daily_task_limit: usize,
    pub min_answer_len: usize,
    pub referral_bonus: i64,
    pub bonus_redeem_block: i64,
    pub deletion_grace_secs: i64,
    pub reaper_interval_secs: u64,
    pub history_page_size: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./ledger.sqlite".to_string()),
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:8088".to_string()),
            utc_offset_hours: std::env::var("UTC_OFFSET_HOURS").ok().and_then(|v| v.parse().ok()).unwrap_or(3),
            daily_task_limit: std::env::var("DAILY_TASK_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
            min_answer_len: std::env::var("MIN_ANSWER_LEN").ok().and_then(|v| v.parse().ok()).unwrap_or(2),
            referral_bonus: std::env::var("REFERRAL_BONUS").ok().and_then(|v| v.parse().ok()).unwrap_or(50),
            bonus_redeem_block: std::env::var("BONUS_REDEEM_BLOCK").ok().and_then(|v| v.parse().ok()).unwrap_or(100),
            deletion_grace_secs: std::env::var("DELETION_GRACE_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30 * 86_400),
            reaper_interval_secs: std::env::var("REAPER_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(3_600),
            history_page_size: std::env::var("HISTORY_PAGE_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(50),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Fingerprint of the effective configuration, logged at startup so a
    /// run can be correlated with the exact knobs it ran under.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_hash_deterministic() {
        let cfg1 = Config::from_env();
        let cfg2 = Config::from_env();
        assert_eq!(cfg1.config_hash(), cfg2.config_hash());
        assert_eq!(cfg1.config_hash().len(), 64);
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg = Config::from_env();
        let json = cfg.to_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("config JSON should be valid");
        assert!(parsed.is_object());
        assert!(json.contains("\"daily_task_limit\""));
        assert!(json.contains("\"bonus_redeem_block\""));
    }
}
