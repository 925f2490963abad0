use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{payments, subscriptions},
    },
};
use domain::{
    entities::{
        payments::{InsertPaymentEntity, PaymentEntity},
        subscriptions::SubscriptionEntity,
    },
    repositories::payments::PaymentRepository,
    value_objects::enums::payment_statuses::PaymentStatus,
};

pub struct PaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn create_pending_payment(&self, payment: InsertPaymentEntity) -> Result<PaymentEntity> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<PaymentEntity> {
            let mut conn = db_pool.get()?;

            let created = insert_into(payments::table)
                .values(&payment)
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(&mut conn)?;

            Ok(created)
        })
        .await?
    }

    async fn attach_gateway_payment(
        &self,
        payment_id: Uuid,
        external_id: String,
        payload: serde_json::Value,
    ) -> Result<()> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db_pool.get()?;

            let updated = update(
                payments::table
                    .filter(payments::id.eq(payment_id))
                    .filter(payments::status.eq(PaymentStatus::Pending.as_str())),
            )
            .set((
                payments::external_id.eq(Some(external_id)),
                payments::payload.eq(payload),
                payments::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

            if updated == 0 {
                bail!("payment {payment_id} is no longer pending; gateway id not attached");
            }
            Ok(())
        })
        .await?
    }

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<PaymentEntity>> {
            let mut conn = db_pool.get()?;

            let payment = payments::table
                .find(payment_id)
                .select(PaymentEntity::as_select())
                .first::<PaymentEntity>(&mut conn)
                .optional()?;

            Ok(payment)
        })
        .await?
    }

    async fn find_subscription_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let subscription = subscriptions::table
                .filter(subscriptions::payment_id.eq(payment_id))
                .select(SubscriptionEntity::as_select())
                .first::<SubscriptionEntity>(&mut conn)
                .optional()?;

            Ok(subscription)
        })
        .await?
    }

    async fn list_pending_for_sweep(&self, limit: i64) -> Result<Vec<PaymentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<Vec<PaymentEntity>> {
            let mut conn = db_pool.get()?;

            // The locks only filter out rows a webhook or manual confirm is working on right
            // now; each candidate is re-locked by the state machine.
            let candidates = conn.transaction::<Vec<PaymentEntity>, diesel::result::Error, _>(
                |conn| {
                    payments::table
                        .select(PaymentEntity::as_select())
                        .filter(payments::status.eq(PaymentStatus::Pending.as_str()))
                        .filter(payments::external_id.is_not_null())
                        .order(payments::created_at.asc())
                        .limit(limit)
                        .for_update()
                        .skip_locked()
                        .load::<PaymentEntity>(conn)
                },
            )?;

            Ok(candidates)
        })
        .await?
    }
}
