use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::payment_provider_credentials;

#[derive(Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payment_provider_credentials)]
pub struct PaymentProviderCredentialEntity {
    pub id: Uuid,
    pub bot_id: Option<Uuid>,
    pub provider: String,
    pub shop_id: String,
    pub secret_key: String,
    pub created_at: DateTime<Utc>,
}

// Keep the secret out of Debug output (and therefore out of logs).
impl std::fmt::Debug for PaymentProviderCredentialEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentProviderCredentialEntity")
            .field("id", &self.id)
            .field("bot_id", &self.bot_id)
            .field("provider", &self.provider)
            .field("shop_id", &self.shop_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}
