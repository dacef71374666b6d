use crate::adapters::{telegram, vendista};
use crate::app::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vendista_login: String,
    pub vendista_password: String,
    pub vendista_base_url: String,
    pub telegram_token: String,
    pub telegram_group_id: String,
    pub telegram_base_url: String,
    pub terminal_ids: Vec<i64>,
    pub poll_interval_secs: u64,
    pub csv_path: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            vendista_login: required(&lookup, "VENDISTA_LOGIN")?,
            vendista_password: required(&lookup, "VENDISTA_PASSWORD")?,
            vendista_base_url: optional(&lookup, "VENDISTA_BASE_URL", vendista::DEFAULT_BASE_URL),
            telegram_token: required(&lookup, "TELEGRAM_TOKEN")?,
            telegram_group_id: required(&lookup, "TELEGRAM_GROUP_ID")?,
            telegram_base_url: optional(&lookup, "TELEGRAM_BASE_URL", telegram::DEFAULT_BASE_URL),
            terminal_ids: parse_terminal_ids(&required(&lookup, "TERMINAL_IDS")?)?,
            poll_interval_secs: parse_or_default(&lookup, "POLL_INTERVAL_SECS", 60_u64)?,
            csv_path: optional(&lookup, "CSV_PATH", "terminal_status_log.csv"),
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::config(format!("{key} is required")))
}

fn optional<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

fn parse_terminal_ids(raw: &str) -> Result<Vec<i64>, AppError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| AppError::config(format!("TERMINAL_IDS contains an invalid id: {part}")))
        })
        .collect::<Result<Vec<i64>, AppError>>()?;

    if ids.is_empty() {
        return Err(AppError::config("TERMINAL_IDS must list at least one terminal"));
    }

    Ok(ids)
}
