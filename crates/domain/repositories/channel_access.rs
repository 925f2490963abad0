use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::channel_access::ChannelInvite;

#[automock]
#[async_trait]
pub trait ChannelAccessGranter {
    /// Grants access to the plan's channels (or the bot's required channels when the plan has
    /// none) and returns the links to hand to the user.
    async fn grant(
        &self,
        bot_id: Uuid,
        telegram_id: i64,
        plan_id: Option<Uuid>,
    ) -> Result<Vec<ChannelInvite>>;

    async fn revoke(&self, bot_id: Uuid, telegram_id: i64, plan_id: Option<Uuid>) -> Result<()>;
}
