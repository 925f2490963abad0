use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::domain;
use crate::infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscription_plans};
use domain::{entities::plans::PlanEntity, repositories::plans::PlanRepository};

pub struct PlanPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PlanPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PlanRepository for PlanPostgres {
    async fn find_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<PlanEntity>> {
            let mut conn = db_pool.get()?;

            let plan = subscription_plans::table
                .find(plan_id)
                .select(PlanEntity::as_select())
                .first::<PlanEntity>(&mut conn)
                .optional()?;

            Ok(plan)
        })
        .await?
    }
}
