use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, dsl::max, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::subscriptions::{SubscriptionEntity, SubscriptionHolder},
        repositories::subscription_lifecycle::SubscriptionLifecycleRepository,
    },
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{subscriptions, users},
    },
};

pub struct SubscriptionLifecyclePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionLifecyclePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

fn into_holders(rows: Vec<(SubscriptionEntity, i64)>) -> Vec<SubscriptionHolder> {
    rows.into_iter()
        .map(|(subscription, telegram_id)| SubscriptionHolder {
            subscription,
            telegram_id,
        })
        .collect()
}

#[async_trait]
impl SubscriptionLifecycleRepository for SubscriptionLifecyclePostgres {
    async fn list_lapsed_active(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionHolder>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<SubscriptionHolder>> {
            let mut conn = db_pool.get()?;

            let rows = subscriptions::table
                .inner_join(users::table)
                .filter(subscriptions::is_active.eq(true))
                .filter(subscriptions::ends_at.le(now))
                .order(subscriptions::ends_at.asc())
                .limit(limit)
                .select((SubscriptionEntity::as_select(), users::telegram_id))
                .load::<(SubscriptionEntity, i64)>(&mut conn)?;

            Ok(into_holders(rows))
        })
        .await?
    }

    async fn expire_subscription(&self, subscription_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<bool> {
            let mut conn = db_pool.get()?;

            let expired = conn.transaction::<bool, diesel::result::Error, _>(|conn| {
                let Some(user_id) = subscriptions::table
                    .find(subscription_id)
                    .select(subscriptions::user_id)
                    .first::<Uuid>(conn)
                    .optional()?
                else {
                    return Ok(false);
                };

                // Same lock order as activation: user row first, then subscriptions.
                users::table
                    .find(user_id)
                    .select(users::id)
                    .for_update()
                    .first::<Uuid>(conn)
                    .optional()?;

                let flipped = update(
                    subscriptions::table
                        .filter(subscriptions::id.eq(subscription_id))
                        .filter(subscriptions::is_active.eq(true))
                        .filter(subscriptions::ends_at.le(now)),
                )
                .set((
                    subscriptions::is_active.eq(false),
                    subscriptions::updated_at.eq(now),
                ))
                .execute(conn)?;

                if flipped == 0 {
                    return Ok(false);
                }

                let remaining_end = subscriptions::table
                    .filter(subscriptions::user_id.eq(user_id))
                    .filter(subscriptions::is_active.eq(true))
                    .filter(subscriptions::ends_at.gt(now))
                    .select(max(subscriptions::ends_at))
                    .first::<Option<DateTime<Utc>>>(conn)?;

                update(users::table.find(user_id))
                    .set((
                        users::subscription_end.eq(remaining_end),
                        users::is_premium.eq(remaining_end.is_some()),
                        users::updated_at.eq(now),
                    ))
                    .execute(conn)?;

                Ok(true)
            })?;

            Ok(expired)
        })
        .await?
    }

    async fn list_active_ending_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionHolder>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<SubscriptionHolder>> {
            let mut conn = db_pool.get()?;

            let rows = subscriptions::table
                .inner_join(users::table)
                .filter(subscriptions::is_active.eq(true))
                .filter(subscriptions::ends_at.gt(from))
                .filter(subscriptions::ends_at.le(to))
                .filter(users::is_blocked.eq(false))
                .order(subscriptions::ends_at.asc())
                .select((SubscriptionEntity::as_select(), users::telegram_id))
                .load::<(SubscriptionEntity, i64)>(&mut conn)?;

            Ok(into_holders(rows))
        })
        .await?
    }
}
