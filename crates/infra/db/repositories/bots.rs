use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{entities::bots::BotEntity, repositories::bots::BotRepository},
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::bots},
};

pub struct BotPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl BotPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl BotRepository for BotPostgres {
    async fn find_by_id(&self, bot_id: Uuid) -> Result<Option<BotEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<BotEntity>> {
            let mut conn = db_pool.get()?;
            Ok(bots::table
                .find(bot_id)
                .select(BotEntity::as_select())
                .first::<BotEntity>(&mut conn)
                .optional()?)
        })
        .await?
    }
}
