use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::subscriptions;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub auto_renew: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub bot_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub auto_renew: bool,
}

/// Active subscription joined with its owner, as read by the lifecycle sweeps.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionHolder {
    pub subscription: SubscriptionEntity,
    pub telegram_id: i64,
}
