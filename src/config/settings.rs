// src/config/settings.rs
//! Process settings from the environment (`.env` is loaded by the binary first).

use anyhow::{anyhow, Context, Result};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::analyze::rules::{DEFAULT_RULES_CONFIG_PATH, ENV_RULES_CONFIG_PATH, ENV_RULES_HOT_RELOAD};
use crate::dashboard::MAX_TREND_DAYS;

pub const ENV_PAGE_SIZE: &str = "PAGE_SIZE";
pub const ENV_MAX_BODY_CHARS: &str = "MAX_BODY_CHARS";
pub const ENV_TREND_MAX_DAYS: &str = "TREND_MAX_DAYS";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_MAX_BODY_CHARS: usize = 2000;
pub const DEFAULT_TREND_MAX_DAYS: usize = 90;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub rules_path: PathBuf,
    pub hot_reload: bool,
    pub page_size: NonZeroUsize,
    /// Body characters fed to the matcher per posting.
    pub max_body_chars: usize,
    /// Upper bound for `GET /stats/trend?days=N`.
    pub trend_max_days: usize,
    pub log_format: LogFormat,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from(DEFAULT_RULES_CONFIG_PATH),
            hot_reload: false,
            page_size: NonZeroUsize::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroUsize::MIN),
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
            trend_max_days: DEFAULT_TREND_MAX_DAYS,
            log_format: LogFormat::Compact,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut s = Self::default();

        if let Some(p) = get(ENV_RULES_CONFIG_PATH) {
            s.rules_path = PathBuf::from(p);
        }
        s.hot_reload = get(ENV_RULES_HOT_RELOAD).as_deref() == Some("1");

        if let Some(v) = get(ENV_PAGE_SIZE) {
            let n: usize = v
                .parse()
                .with_context(|| format!("{ENV_PAGE_SIZE}={v} is not a number"))?;
            s.page_size =
                NonZeroUsize::new(n).ok_or_else(|| anyhow!("{ENV_PAGE_SIZE} must be positive"))?;
        }
        if let Some(v) = get(ENV_MAX_BODY_CHARS) {
            s.max_body_chars = v
                .parse()
                .with_context(|| format!("{ENV_MAX_BODY_CHARS}={v} is not a number"))?;
        }
        if let Some(v) = get(ENV_TREND_MAX_DAYS) {
            let n: usize = v
                .parse()
                .with_context(|| format!("{ENV_TREND_MAX_DAYS}={v} is not a number"))?;
            if n == 0 || n > MAX_TREND_DAYS {
                return Err(anyhow!(
                    "{ENV_TREND_MAX_DAYS} must be between 1 and {MAX_TREND_DAYS} (got {n})"
                ));
            }
            s.trend_max_days = n;
        }
        s.log_format = match get(ENV_LOG_FORMAT).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };
        Ok(s)
    }
}
