use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::promo_codes::PromoCodeEntity, repositories::promo_codes::PromoCodeRepository,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::promo_codes},
};

pub struct PromoCodePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PromoCodePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PromoCodeRepository for PromoCodePostgres {
    async fn find_by_code(&self, bot_id: Uuid, code: &str) -> Result<Option<PromoCodeEntity>> {
        let db_pool = Arc::clone(&self.db_pool);
        let code = code.to_string();

        task::spawn_blocking(move || -> Result<Option<PromoCodeEntity>> {
            let mut conn = db_pool.get()?;
            Ok(promo_codes::table
                .filter(promo_codes::bot_id.eq(bot_id))
                .filter(promo_codes::code.eq(code))
                .select(PromoCodeEntity::as_select())
                .first::<PromoCodeEntity>(&mut conn)
                .optional()?)
        })
        .await?
    }
}
