use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::channels;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = channels)]
pub struct ChannelEntity {
    pub id: Uuid,
    pub bot_id: Uuid,
    /// Telegram chat id of the channel (e.g. `-100123...`).
    pub channel_id: String,
    pub channel_name: String,
    pub channel_username: Option<String>,
    pub invite_link: Option<String>,
    pub is_active: bool,
    pub requires_subscription: bool,
    pub created_at: DateTime<Utc>,
}
