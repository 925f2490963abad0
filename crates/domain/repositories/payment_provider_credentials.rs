use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::payment_provider_credentials::PaymentProviderCredentialEntity,
    value_objects::enums::payment_providers::PaymentProvider,
};

#[automock]
#[async_trait]
pub trait PaymentProviderCredentialRepository {
    /// Credentials scoped to the bot, falling back to the shared (bot-less) row.
    async fn find_for_bot(
        &self,
        provider: PaymentProvider,
        bot_id: Uuid,
    ) -> Result<Option<PaymentProviderCredentialEntity>>;

    async fn find_by_shop_id(
        &self,
        provider: PaymentProvider,
        shop_id: &str,
    ) -> Result<Option<PaymentProviderCredentialEntity>>;
}
