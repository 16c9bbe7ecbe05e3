use crate::selection::selector::TimeOrdering;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;
use std::time::Duration;

// same truthiness test the booking page script applies to its own flag
static FLAG_ON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)on|true").unwrap());

/// Runtime settings, read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bind_addr: String,
    pub port: u16,
    pub webdriver_url: String,
    pub headless: bool,
    pub poll_interval: Duration,
    pub watch_timeout: Option<Duration>,
    pub auto_submit: bool,
    pub submit_delay: Duration,
    pub time_ordering: TimeOrdering,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            bind_addr: "0.0.0.0".to_string(),
            port: 80,
            webdriver_url: "http://localhost:60103".to_string(),
            headless: true,
            poll_interval: Duration::from_millis(50),
            watch_timeout: None,
            auto_submit: true,
            submit_delay: Duration::ZERO,
            time_ordering: TimeOrdering::Numeric,
        }
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = BotConfig::default();

        let watch_timeout = match lookup("WATCH_TIMEOUT_MS") {
            Some(raw) if !raw.trim().is_empty() => Some(Duration::from_millis(
                parse_value("WATCH_TIMEOUT_MS", &raw)?,
            )),
            _ => None,
        };

        Ok(BotConfig {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            webdriver_url: lookup("WEBDRIVER_URL").unwrap_or(defaults.webdriver_url),
            headless: lookup("HEADLESS")
                .map(|raw| is_flag_on(&raw))
                .unwrap_or(defaults.headless),
            poll_interval: Duration::from_millis(parse_or(&lookup, "POLL_INTERVAL_MS", 50)?),
            watch_timeout,
            auto_submit: lookup("AUTO_SUBMIT")
                .map(|raw| is_flag_on(&raw))
                .unwrap_or(defaults.auto_submit),
            submit_delay: Duration::from_millis(parse_or(&lookup, "SUBMIT_DELAY_MS", 0)?),
            time_ordering: parse_or(&lookup, "TIME_ORDERING", defaults.time_ordering)?,
        })
    }
}

pub fn is_flag_on(raw: &str) -> bool {
    FLAG_ON.is_match(raw)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("invalid value {:?} for {}", raw, key))
}
