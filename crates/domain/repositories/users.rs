use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::users::UserEntity;

#[automock]
#[async_trait]
pub trait UserRepository {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>>;

    async fn find_by_telegram_id(&self, bot_id: Uuid, telegram_id: i64)
    -> Result<Option<UserEntity>>;
}
