use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::payment_provider_credentials::PaymentProviderCredentialEntity,
        repositories::payment_provider_credentials::PaymentProviderCredentialRepository,
        value_objects::enums::payment_providers::PaymentProvider,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::payment_provider_credentials},
};

pub struct PaymentProviderCredentialPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentProviderCredentialPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentProviderCredentialRepository for PaymentProviderCredentialPostgres {
    async fn find_for_bot(
        &self,
        provider: PaymentProvider,
        bot_id: Uuid,
    ) -> Result<Option<PaymentProviderCredentialEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<PaymentProviderCredentialEntity>> {
            let mut conn = db_pool.get()?;

            // Bot-specific row first, shared row (NULL bot_id) as fallback.
            let credential = payment_provider_credentials::table
                .filter(payment_provider_credentials::provider.eq(provider.as_str()))
                .filter(
                    payment_provider_credentials::bot_id
                        .eq(bot_id)
                        .or(payment_provider_credentials::bot_id.is_null()),
                )
                .order(payment_provider_credentials::bot_id.asc().nulls_last())
                .select(PaymentProviderCredentialEntity::as_select())
                .first::<PaymentProviderCredentialEntity>(&mut conn)
                .optional()?;

            Ok(credential)
        })
        .await?
    }

    async fn find_by_shop_id(
        &self,
        provider: PaymentProvider,
        shop_id: &str,
    ) -> Result<Option<PaymentProviderCredentialEntity>> {
        let db_pool = Arc::clone(&self.db_pool);
        let shop_id = shop_id.to_string();

        task::spawn_blocking(move || -> Result<Option<PaymentProviderCredentialEntity>> {
            let mut conn = db_pool.get()?;

            let credential = payment_provider_credentials::table
                .filter(payment_provider_credentials::provider.eq(provider.as_str()))
                .filter(payment_provider_credentials::shop_id.eq(shop_id))
                .select(PaymentProviderCredentialEntity::as_select())
                .first::<PaymentProviderCredentialEntity>(&mut conn)
                .optional()?;

            Ok(credential)
        })
        .await?
    }
}
