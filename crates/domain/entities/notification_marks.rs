use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::notification_marks;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = notification_marks)]
pub struct NotificationMarkEntity {
    pub user_id: Uuid,
    pub kind: String,
    pub last_sent_at: DateTime<Utc>,
}
