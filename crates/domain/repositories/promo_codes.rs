use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::promo_codes::PromoCodeEntity;

#[automock]
#[async_trait]
pub trait PromoCodeRepository {
    /// `code` is expected in its normalized (upper-case) form.
    async fn find_by_code(&self, bot_id: Uuid, code: &str) -> Result<Option<PromoCodeEntity>>;
}
