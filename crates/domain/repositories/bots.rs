use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::bots::BotEntity;

#[automock]
#[async_trait]
pub trait BotRepository {
    async fn find_by_id(&self, bot_id: Uuid) -> Result<Option<BotEntity>>;
}
