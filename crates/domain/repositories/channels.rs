use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::channels::ChannelEntity;

#[automock]
#[async_trait]
pub trait ChannelRepository {
    async fn list_for_plan(&self, plan_id: Uuid) -> Result<Vec<ChannelEntity>>;

    /// Active channels of the bot flagged as requiring a subscription.
    async fn list_required_for_bot(&self, bot_id: Uuid) -> Result<Vec<ChannelEntity>>;
}
