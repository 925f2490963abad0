use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::{RunQueryDsl, delete, insert_into, prelude::*, upsert::excluded};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::notification_marks::NotificationMarkEntity,
        repositories::notification_marks::NotificationMarkRepository,
        value_objects::enums::notification_kinds::NotificationKind,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::notification_marks},
};

pub struct NotificationMarkPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl NotificationMarkPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl NotificationMarkRepository for NotificationMarkPostgres {
    async fn try_claim(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool> {
        let db_pool = Arc::clone(&self.db_pool);
        let threshold = now - cooldown;

        task::spawn_blocking(move || -> Result<bool> {
            let mut conn = db_pool.get()?;

            let mark = NotificationMarkEntity {
                user_id,
                kind: kind.as_str().to_string(),
                last_sent_at: now,
            };

            // A conflicting row newer than the threshold is left alone and returns nothing.
            let upsert = insert_into(notification_marks::table)
                .values(&mark)
                .on_conflict((notification_marks::user_id, notification_marks::kind))
                .do_update()
                .set(notification_marks::last_sent_at.eq(excluded(notification_marks::last_sent_at)));

            // Importing `FilterDsl` would make `.filter` ambiguous with `QueryDsl` in this module.
            let claimed = diesel::query_dsl::methods::FilterDsl::filter(
                upsert,
                notification_marks::last_sent_at.lt(threshold),
            )
            .returning(notification_marks::user_id)
            .get_result::<Uuid>(&mut conn)
            .optional()?;

            Ok(claimed.is_some())
        })
        .await?
    }

    async fn release(&self, user_id: Uuid, kind: NotificationKind) -> Result<()> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db_pool.get()?;

            delete(
                notification_marks::table
                    .filter(notification_marks::user_id.eq(user_id))
                    .filter(notification_marks::kind.eq(kind.as_str())),
            )
            .execute(&mut conn)?;

            Ok(())
        })
        .await?
    }
}
