use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramApiError {
    /// The user blocked the bot or left the chat; retrying will not help.
    #[error("telegram recipient is unreachable: {0}")]
    Forbidden(String),
    #[error("telegram rejected {method} (status {status}): {description}")]
    Rejected {
        method: &'static str,
        status: u16,
        description: String,
    },
    #[error("telegram request for {method} failed: {reason}")]
    Transport {
        method: &'static str,
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

/// Thin Bot API caller shared by user notifications, admin messages and channel access.
#[derive(Clone)]
pub struct TelegramBotApi {
    http: reqwest::Client,
    api_url: String,
}

impl TelegramBotApi {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn call(
        &self,
        token: &str,
        method: &'static str,
        payload: &Value,
    ) -> Result<Value, TelegramApiError> {
        let url = format!("{}/bot{}/{}", self.api_url, token, method);

        // reqwest errors embed the URL, which carries the bot token.
        let resp = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| TelegramApiError::Transport {
                method,
                reason: if err.is_timeout() {
                    "timed out".to_string()
                } else {
                    "connection failed".to_string()
                },
            })?;

        let status = resp.status();
        let reply = resp.json::<Reply>().await.ok();
        let description = reply
            .as_ref()
            .and_then(|r| r.description.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));

        match reply {
            Some(Reply {
                ok: true, result, ..
            }) if status.is_success() => Ok(result.unwrap_or(Value::Null)),
            _ if status == StatusCode::FORBIDDEN => Err(TelegramApiError::Forbidden(description)),
            _ => Err(TelegramApiError::Rejected {
                method,
                status: status.as_u16(),
                description,
            }),
        }
    }
}

/// Numeric chat ids are sent as integers, `@username` ids as strings.
pub fn chat_id_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(id) => Value::from(id),
        Err(_) => Value::from(trimmed),
    }
}
