use std::{fmt::Display, str::FromStr};

use anyhow::{Context, Result};

use super::config_model::{BackendServer, BotApi, Database, DotEnvyConfig, YooKassa};

const DEFAULT_YOOKASSA_API_URL: &str = "https://api.yookassa.ru/v3";
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    load_with(&|name| std::env::var(name).ok())
}

pub fn load_with(lookup: &dyn Fn(&str) -> Option<String>) -> Result<DotEnvyConfig> {
    let backend_server = BackendServer {
        port: required(lookup, "SERVER_PORT_BACKEND")?,
        body_limit: required(lookup, "SERVER_BODY_LIMIT")?,
        timeout: required(lookup, "SERVER_TIMEOUT")?,
    };

    Ok(DotEnvyConfig {
        backend_server,
        database: database(lookup)?,
        yookassa: yookassa(lookup)?,
        bot_api: bot_api(lookup)?,
    })
}

pub fn database(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Database> {
    Ok(Database {
        url: optional(lookup, "DATABASE_URL").context("DATABASE_URL is invalid")?,
        lock_timeout_ms: with_default(lookup, "DATABASE_LOCK_TIMEOUT_MS", 5000)?,
    })
}

pub fn yookassa(lookup: &dyn Fn(&str) -> Option<String>) -> Result<YooKassa> {
    Ok(YooKassa {
        api_url: optional(lookup, "YOOKASSA_API_URL")
            .unwrap_or_else(|| DEFAULT_YOOKASSA_API_URL.to_string()),
        return_url: optional(lookup, "YOOKASSA_RETURN_URL")
            .context("YOOKASSA_RETURN_URL is invalid")?,
        timeout_secs: with_default(lookup, "YOOKASSA_TIMEOUT_SECS", 10)?,
    })
}

pub fn bot_api(lookup: &dyn Fn(&str) -> Option<String>) -> Result<BotApi> {
    Ok(BotApi {
        telegram_api_url: optional(lookup, "TELEGRAM_API_URL")
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
        admin_bot_token: optional(lookup, "ADMIN_BOT_TOKEN"),
        admin_chat_id: optional(lookup, "ADMIN_CHAT_ID"),
        api_token: optional(lookup, "BOT_API_TOKEN"),
    })
}

/// Trimmed value, with blank treated as unset.
pub fn optional(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

pub fn required<T>(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = optional(lookup, name).with_context(|| format!("{name} is invalid"))?;
    raw.parse::<T>()
        .map_err(|err| anyhow::anyhow!("{err}"))
        .with_context(|| format!("{name} is invalid"))
}

pub fn with_default<T>(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(lookup, name) {
        Some(_) => required(lookup, name),
        None => Ok(default),
    }
}
