use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::bots;

#[derive(Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = bots)]
pub struct BotEntity {
    pub id: Uuid,
    pub name: String,
    pub telegram_token: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for BotEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotEntity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("telegram_token", &"[REDACTED]")
            .field("is_active", &self.is_active)
            .finish()
    }
}
