use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::telegram_api::{TelegramApiError, TelegramBotApi, chat_id_value};
use crate::domain::repositories::{bots::BotRepository, notifications::NotificationSink};

#[derive(Clone)]
pub struct AdminChat {
    pub bot_token: String,
    pub chat_id: String,
}

/// Sends user messages through the tenant bot and admin messages through the admin bot.
pub struct TelegramNotificationSink {
    api: TelegramBotApi,
    bot_repository: Arc<dyn BotRepository + Send + Sync>,
    admin: Option<AdminChat>,
}

impl TelegramNotificationSink {
    pub fn new(
        api: TelegramBotApi,
        bot_repository: Arc<dyn BotRepository + Send + Sync>,
        admin: Option<AdminChat>,
    ) -> Self {
        Self {
            api,
            bot_repository,
            admin,
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotificationSink {
    async fn send_user_message(&self, bot_id: Uuid, telegram_id: i64, text: String) -> Result<()> {
        let bot = self
            .bot_repository
            .find_by_id(bot_id)
            .await?
            .filter(|bot| bot.is_active)
            .ok_or_else(|| anyhow!("bot {bot_id} not found or inactive"))?;

        let payload = json!({ "chat_id": telegram_id, "text": text });
        match self.api.call(&bot.telegram_token, "sendMessage", &payload).await {
            Ok(_) => Ok(()),
            Err(TelegramApiError::Forbidden(reason)) => {
                info!(
                    bot_id = %bot_id,
                    telegram_id,
                    reason = %reason,
                    "notifications: user unreachable; message dropped"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn send_admin_message(&self, text: String) -> Result<()> {
        let Some(admin) = self.admin.as_ref() else {
            return Ok(());
        };

        let payload = json!({ "chat_id": chat_id_value(&admin.chat_id), "text": text });
        self.api
            .call(&admin.bot_token, "sendMessage", &payload)
            .await?;
        Ok(())
    }
}
