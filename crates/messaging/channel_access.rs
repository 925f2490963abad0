use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::telegram_api::{TelegramBotApi, chat_id_value};
use crate::domain::{
    entities::{bots::BotEntity, channels::ChannelEntity},
    repositories::{
        bots::BotRepository, channel_access::ChannelAccessGranter, channels::ChannelRepository,
    },
    value_objects::channel_access::ChannelInvite,
};

/// Grants and revokes channel membership through the tenant bot.
pub struct TelegramChannelAccess {
    api: TelegramBotApi,
    bot_repository: Arc<dyn BotRepository + Send + Sync>,
    channel_repository: Arc<dyn ChannelRepository + Send + Sync>,
}

impl TelegramChannelAccess {
    pub fn new(
        api: TelegramBotApi,
        bot_repository: Arc<dyn BotRepository + Send + Sync>,
        channel_repository: Arc<dyn ChannelRepository + Send + Sync>,
    ) -> Self {
        Self {
            api,
            bot_repository,
            channel_repository,
        }
    }

    /// Plan channels, or every required channel of the bot when the plan lists none.
    async fn channels_for(&self, bot_id: Uuid, plan_id: Option<Uuid>) -> Result<Vec<ChannelEntity>> {
        if let Some(plan_id) = plan_id {
            let linked = self.channel_repository.list_for_plan(plan_id).await?;
            if !linked.is_empty() {
                return Ok(linked);
            }
        }
        self.channel_repository.list_required_for_bot(bot_id).await
    }

    async fn active_bot(&self, bot_id: Uuid) -> Result<BotEntity> {
        self.bot_repository
            .find_by_id(bot_id)
            .await?
            .filter(|bot| bot.is_active)
            .ok_or_else(|| anyhow!("bot {bot_id} not found or inactive"))
    }

    async fn invite_link(&self, token: &str, channel: &ChannelEntity) -> Option<String> {
        if let Some(link) = channel.invite_link.as_deref().filter(|l| !l.trim().is_empty()) {
            return Some(link.to_string());
        }

        let payload = json!({
            "chat_id": chat_id_value(&channel.channel_id),
            "member_limit": 1,
            "creates_join_request": false,
        });
        match self.api.call(token, "createChatInviteLink", &payload).await {
            Ok(result) => {
                if let Some(link) = result.get("invite_link").and_then(|v| v.as_str()) {
                    return Some(link.to_string());
                }
            }
            Err(err) => {
                debug!(
                    channel = %channel.channel_name,
                    error = %err,
                    "channel_access: invite link creation failed"
                );
            }
        }

        username_link(channel.channel_username.as_deref())
    }
}

fn username_link(username: Option<&str>) -> Option<String> {
    username
        .map(|u| u.trim().trim_start_matches('@'))
        .filter(|u| !u.is_empty())
        .map(|u| format!("https://t.me/{u}"))
}

#[async_trait]
impl ChannelAccessGranter for TelegramChannelAccess {
    async fn grant(
        &self,
        bot_id: Uuid,
        telegram_id: i64,
        plan_id: Option<Uuid>,
    ) -> Result<Vec<ChannelInvite>> {
        let channels = self.channels_for(bot_id, plan_id).await?;
        if channels.is_empty() {
            return Ok(Vec::new());
        }

        let bot = self.active_bot(bot_id).await?;
        let mut invites = Vec::with_capacity(channels.len());

        for channel in &channels {
            // Lifts a ban left behind by a previous expiry.
            let unban = json!({
                "chat_id": chat_id_value(&channel.channel_id),
                "user_id": telegram_id,
                "only_if_banned": true,
            });
            if let Err(err) = self
                .api
                .call(&bot.telegram_token, "unbanChatMember", &unban)
                .await
            {
                debug!(
                    channel = %channel.channel_name,
                    telegram_id,
                    error = %err,
                    "channel_access: unban before grant failed"
                );
            }

            invites.push(ChannelInvite {
                channel_name: channel.channel_name.clone(),
                link: self.invite_link(&bot.telegram_token, channel).await,
            });
        }

        Ok(invites)
    }

    async fn revoke(&self, bot_id: Uuid, telegram_id: i64, plan_id: Option<Uuid>) -> Result<()> {
        let channels = self.channels_for(bot_id, plan_id).await?;
        if channels.is_empty() {
            return Ok(());
        }

        let bot = self.active_bot(bot_id).await?;
        let mut failures = 0usize;

        for channel in &channels {
            let chat_id = chat_id_value(&channel.channel_id);

            // Ban then unban removes the member without keeping them on the ban list.
            let removed = match self
                .api
                .call(
                    &bot.telegram_token,
                    "banChatMember",
                    &json!({ "chat_id": chat_id, "user_id": telegram_id }),
                )
                .await
            {
                Ok(_) => self
                    .api
                    .call(
                        &bot.telegram_token,
                        "unbanChatMember",
                        &json!({ "chat_id": chat_id, "user_id": telegram_id, "only_if_banned": true }),
                    )
                    .await
                    .map(|_| ()),
                Err(err) => Err(err),
            };

            match removed {
                Ok(()) => info!(
                    channel = %channel.channel_name,
                    telegram_id,
                    "channel_access: member removed"
                ),
                Err(err) => {
                    failures += 1;
                    warn!(
                        channel = %channel.channel_name,
                        telegram_id,
                        error = %err,
                        "channel_access: member removal failed"
                    );
                }
            }
        }

        if failures > 0 {
            return Err(anyhow!(
                "failed to remove user {telegram_id} from {failures} of {} channel(s)",
                channels.len()
            ));
        }
        Ok(())
    }
}
