use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{entities::channels::ChannelEntity, repositories::channels::ChannelRepository},
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{channels, subscription_plan_channels},
    },
};

pub struct ChannelPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ChannelPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ChannelRepository for ChannelPostgres {
    async fn list_for_plan(&self, plan_id: Uuid) -> Result<Vec<ChannelEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<ChannelEntity>> {
            let mut conn = db_pool.get()?;

            let result = channels::table
                .inner_join(
                    subscription_plan_channels::table
                        .on(subscription_plan_channels::channel_id.eq(channels::id)),
                )
                .filter(subscription_plan_channels::plan_id.eq(plan_id))
                .filter(channels::is_active.eq(true))
                .select(ChannelEntity::as_select())
                .order(channels::channel_name.asc())
                .load::<ChannelEntity>(&mut conn)?;

            Ok(result)
        })
        .await?
    }

    async fn list_required_for_bot(&self, bot_id: Uuid) -> Result<Vec<ChannelEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<ChannelEntity>> {
            let mut conn = db_pool.get()?;

            let result = channels::table
                .filter(channels::bot_id.eq(bot_id))
                .filter(channels::is_active.eq(true))
                .filter(channels::requires_subscription.eq(true))
                .select(ChannelEntity::as_select())
                .order(channels::channel_name.asc())
                .load::<ChannelEntity>(&mut conn)?;

            Ok(result)
        })
        .await?
    }
}
