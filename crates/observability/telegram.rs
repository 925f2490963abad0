use super::alert_queue::{AlertEvent, AlertSink};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::json;

const MESSAGE_LIMIT: usize = 4096;

/// Forwards alert-level events to an operator chat through the Bot API.
pub(crate) struct TelegramAlertSink {
    endpoint: String,
    chat_id: String,
    client: Client,
}

impl TelegramAlertSink {
    pub(crate) fn new(api_url: &str, bot_token: &str, chat_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(3))
            .build()?;

        Ok(Self {
            endpoint: format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), bot_token),
            chat_id,
            client,
        })
    }
}

pub(crate) fn format_alert(event: &AlertEvent) -> String {
    let mut lines = vec![
        format!(
            "[{}] {} / {} / {}",
            event.level.as_str(),
            event.service_name,
            event.environment,
            event.component
        ),
        format!(
            "{} {}{}",
            event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            event.target,
            match (&event.file, event.line) {
                (Some(file), Some(line)) => format!(" ({file}:{line})"),
                _ => String::new(),
            }
        ),
    ];

    if let Some(message) = event.message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        lines.push(message.to_string());
    }

    for span in &event.spans {
        let fields = span
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!("in {} {}", span.name, fields).trim_end().to_string());
    }

    lines.extend(event.fields.iter().map(|(k, v)| format!("{k} = {v}")));

    truncate(lines.join("\n"))
}

fn truncate(content: String) -> String {
    const SUFFIX: &str = "\n…";

    if content.chars().count() <= MESSAGE_LIMIT {
        return content;
    }

    let keep = MESSAGE_LIMIT - SUFFIX.chars().count();
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str(SUFFIX);
    truncated
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": format_alert(event),
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            // The endpoint embeds the bot token; never surface reqwest's URL-bearing message.
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow!("telegram alert request timed out")
                } else {
                    anyhow!("telegram alert request failed")
                }
            })?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(anyhow!(
            "telegram alert returned non-success status: {}",
            response.status()
        ))
    }

    fn sink_name(&self) -> &'static str {
        "telegram"
    }
}
