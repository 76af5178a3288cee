use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Pacing and limits of transfers and the slot wizard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferTiming {
    /// Pause between two slots of a multi-slot run.
    pub slot_delay: Duration,
    /// Upper bound for the number of slots one run may book.
    pub max_slots: u32,
    /// How long each wizard question waits for a reply.
    pub ask_timeout: Duration,
    /// Pause after every copy attempt that reached the platform.
    pub copy_cool_down: Duration,
    /// Progress is reported after every n-th processed id.
    pub progress_every: u32,
}

impl Default for TransferTiming {
    fn default() -> Self {
        Self {
            slot_delay: Duration::from_secs(60),
            max_slots: 10,
            ask_timeout: Duration::from_secs(600),
            copy_cool_down: Duration::from_secs(2),
            progress_every: 10,
        }
    }
}

/// Typed configuration, loaded from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_allowed_users: Vec<i64>,
    pub secondary_bot_token: Option<String>,
    pub probe_chat_id: Option<i64>,

    // Transfers
    pub multibatch_destination: Option<i64>,
    pub timing: TransferTiming,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let telegram_allowed_users = parse_csv_i64(env_str("TELEGRAM_ALLOWED_USERS"));

        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        if telegram_allowed_users.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_ALLOWED_USERS environment variable is required".to_string(),
            ));
        }

        let secondary_bot_token = env_str("SECONDARY_BOT_TOKEN").and_then(non_empty);
        let probe_chat_id = env_i64("PROBE_CHAT_ID");
        let multibatch_destination = env_i64("MULTIBATCH_DESTINATION");

        let defaults = TransferTiming::default();
        let max_slots = env_u32("MAX_SLOTS").unwrap_or(defaults.max_slots);
        if max_slots == 0 {
            return Err(Error::Config("MAX_SLOTS must be at least 1".to_string()));
        }
        let progress_every = env_u32("PROGRESS_EVERY")
            .unwrap_or(defaults.progress_every)
            .max(1);
        let timing = TransferTiming {
            slot_delay: env_u64("SLOT_DELAY_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.slot_delay),
            max_slots,
            ask_timeout: env_u64("ASK_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ask_timeout),
            copy_cool_down: env_u64("COPY_COOL_DOWN_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.copy_cool_down),
            progress_every,
        };

        // Audit logging
        let audit_log_path = PathBuf::from(
            env_str("AUDIT_LOG_PATH").unwrap_or("/tmp/media-transfer-audit.log".to_string()),
        );
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            secondary_bot_token,
            probe_chat_id,
            multibatch_destination,
            timing,
            audit_log_path,
            audit_log_json,
        })
    }

    /// Chat that receives probe forwards; the first allowed user by default.
    pub fn probe_chat(&self) -> Option<i64> {
        self.probe_chat_id
            .or_else(|| self.telegram_allowed_users.first().copied())
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_lines_strip_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nTELEGRAM_BOT_TOKEN=\"abc\"\n\nMAX_SLOTS = 4\nbroken line\n=nokey\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "abc".to_string()),
                ("MAX_SLOTS".to_string(), "4".to_string()),
            ]
        );
    }

    #[test]
    fn csv_ids_skip_garbage() {
        assert_eq!(
            parse_csv_i64(Some("1, 2,,x, -100".to_string())),
            vec![1, 2, -100]
        );
        assert!(parse_csv_i64(None).is_empty());
    }

    #[test]
    fn bool_values() {
        assert!(parse_bool("Yes"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("off"));
    }

    #[test]
    fn default_timing_matches_documented_values() {
        let t = TransferTiming::default();
        assert_eq!(t.slot_delay, Duration::from_secs(60));
        assert_eq!(t.max_slots, 10);
        assert_eq!(t.ask_timeout, Duration::from_secs(600));
        assert_eq!(t.copy_cool_down, Duration::from_secs(2));
        assert_eq!(t.progress_every, 10);
    }

    #[test]
    fn probe_chat_falls_back_to_first_allowed_user() {
        let mut cfg = Config {
            telegram_bot_token: "x".to_string(),
            telegram_allowed_users: vec![42, 7],
            secondary_bot_token: None,
            probe_chat_id: None,
            multibatch_destination: None,
            timing: TransferTiming::default(),
            audit_log_path: "/tmp/a.log".into(),
            audit_log_json: false,
        };
        assert_eq!(cfg.probe_chat(), Some(42));
        cfg.probe_chat_id = Some(-100);
        assert_eq!(cfg.probe_chat(), Some(-100));
    }
}
