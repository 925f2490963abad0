use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::plans::PlanEntity;

#[automock]
#[async_trait]
pub trait PlanRepository {
    async fn find_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>>;
}
