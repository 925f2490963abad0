use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{entities::users::UserEntity, repositories::users::UserRepository},
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::users},
};

pub struct UserPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserRepository for UserPostgres {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<UserEntity>> {
            let mut conn = db_pool.get()?;
            Ok(users::table
                .find(user_id)
                .select(UserEntity::as_select())
                .first::<UserEntity>(&mut conn)
                .optional()?)
        })
        .await?
    }

    async fn find_by_telegram_id(
        &self,
        bot_id: Uuid,
        telegram_id: i64,
    ) -> Result<Option<UserEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<UserEntity>> {
            let mut conn = db_pool.get()?;
            Ok(users::table
                .filter(users::bot_id.eq(bot_id))
                .filter(users::telegram_id.eq(telegram_id))
                .select(UserEntity::as_select())
                .first::<UserEntity>(&mut conn)
                .optional()?)
        })
        .await?
    }
}
