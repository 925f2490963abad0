use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            payments::{PaymentEntity, PaymentStateUpdate},
            plans::PlanEntity,
            promo_codes::PromoCodeEntity,
            subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
            users::UserEntity,
        },
        repositories::reconciliation::{
            PaymentLock, ReconciliationStore, ReconciliationUnitOfWork,
        },
        value_objects::{
            enums::row_lock_modes::RowLockMode,
            reconciliation::{PaymentRef, StoreError, StoreResult},
        },
    },
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{payments, promo_codes, subscription_plans, subscriptions, users},
    },
};

pub struct ReconciliationPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ReconciliationPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

enum TransactionError<E> {
    Database(diesel::result::Error),
    Work(E),
}

impl<E> From<diesel::result::Error> for TransactionError<E> {
    fn from(err: diesel::result::Error) -> Self {
        TransactionError::Database(err)
    }
}

#[async_trait]
impl ReconciliationStore for ReconciliationPostgres {
    async fn within_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&mut dyn ReconciliationUnitOfWork) -> Result<T, E> + Send + 'static,
    {
        // Diesel is synchronous; the whole transaction runs on the blocking threadpool so row
        // lock waits never stall Tokio workers.
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<T, E> {
            let mut pooled = db_pool.get().map_err(|err| E::from(StoreError::from(err)))?;
            let conn: &mut PgConnection = &mut pooled;

            conn.transaction::<T, TransactionError<E>, _>(|conn| {
                let mut unit_of_work = PgUnitOfWork { conn };
                work(&mut unit_of_work).map_err(TransactionError::Work)
            })
            .map_err(|err| match err {
                TransactionError::Database(db_err) => E::from(StoreError::from(db_err)),
                TransactionError::Work(err) => err,
            })
        })
        .await
        .map_err(|join_err| {
            E::from(StoreError::Other(anyhow::anyhow!(
                "reconciliation transaction task failed: {join_err}"
            )))
        })?
    }
}

struct PgUnitOfWork<'a> {
    conn: &'a mut PgConnection,
}

impl PgUnitOfWork<'_> {
    fn resolve_payment_id(&mut self, payment: &PaymentRef) -> StoreResult<Option<Uuid>> {
        match payment {
            PaymentRef::Id(id) => Ok(Some(*id)),
            PaymentRef::External {
                provider,
                external_id,
                bot_id,
            } => {
                let found = payments::table
                    .filter(payments::provider.eq(provider.as_str()))
                    .filter(payments::external_id.eq(external_id))
                    .select((payments::id, payments::bot_id))
                    .first::<(Uuid, Uuid)>(self.conn)
                    .optional()?;

                Ok(found.and_then(|(id, owner)| {
                    bot_id.is_none_or(|tenant| tenant == owner).then_some(id)
                }))
            }
        }
    }
}

impl ReconciliationUnitOfWork for PgUnitOfWork<'_> {
    fn lock_payment(
        &mut self,
        payment: &PaymentRef,
        mode: RowLockMode,
    ) -> StoreResult<PaymentLock> {
        let Some(payment_id) = self.resolve_payment_id(payment)? else {
            return Ok(PaymentLock::Missing);
        };

        let locked = match mode {
            RowLockMode::Wait => payments::table
                .find(payment_id)
                .select(PaymentEntity::as_select())
                .for_update()
                .first::<PaymentEntity>(self.conn)
                .optional()?,
            RowLockMode::SkipLocked => payments::table
                .find(payment_id)
                .select(PaymentEntity::as_select())
                .for_update()
                .skip_locked()
                .first::<PaymentEntity>(self.conn)
                .optional()?,
        };

        if let Some(payment) = locked {
            return Ok(PaymentLock::Acquired(payment));
        }

        // SKIP LOCKED hides a locked row the same way as a missing one.
        let exists = diesel::select(diesel::dsl::exists(payments::table.find(payment_id)))
            .get_result::<bool>(self.conn)?;

        if exists && mode == RowLockMode::SkipLocked {
            Ok(PaymentLock::Contended)
        } else {
            Ok(PaymentLock::Missing)
        }
    }

    fn save_payment_state(
        &mut self,
        payment_id: Uuid,
        state: &PaymentStateUpdate,
    ) -> StoreResult<PaymentEntity> {
        let payment = update(payments::table.find(payment_id))
            .set((
                payments::status.eq(state.status.as_str()),
                payments::paid_at.eq(state.paid_at),
                payments::payload.eq(&state.payload),
                payments::updated_at.eq(Utc::now()),
            ))
            .returning(PaymentEntity::as_returning())
            .get_result::<PaymentEntity>(self.conn)?;

        Ok(payment)
    }

    fn find_subscription_by_payment(
        &mut self,
        payment_id: Uuid,
    ) -> StoreResult<Option<SubscriptionEntity>> {
        Ok(subscriptions::table
            .filter(subscriptions::payment_id.eq(payment_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(self.conn)
            .optional()?)
    }

    fn find_plan(&mut self, plan_id: Uuid) -> StoreResult<Option<PlanEntity>> {
        Ok(subscription_plans::table
            .find(plan_id)
            .select(PlanEntity::as_select())
            .first::<PlanEntity>(self.conn)
            .optional()?)
    }

    fn lock_user(&mut self, user_id: Uuid) -> StoreResult<Option<UserEntity>> {
        Ok(users::table
            .find(user_id)
            .select(UserEntity::as_select())
            .for_update()
            .first::<UserEntity>(self.conn)
            .optional()?)
    }

    fn insert_subscription(
        &mut self,
        subscription: &InsertSubscriptionEntity,
    ) -> StoreResult<SubscriptionEntity> {
        Ok(diesel::insert_into(subscriptions::table)
            .values(subscription)
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(self.conn)?)
    }

    fn deactivate_other_subscriptions(
        &mut self,
        user_id: Uuid,
        keep_subscription_id: Uuid,
    ) -> StoreResult<usize> {
        Ok(update(
            subscriptions::table
                .filter(subscriptions::user_id.eq(user_id))
                .filter(subscriptions::id.ne(keep_subscription_id))
                .filter(subscriptions::is_active.eq(true)),
        )
        .set((
            subscriptions::is_active.eq(false),
            subscriptions::updated_at.eq(Utc::now()),
        ))
        .execute(self.conn)?)
    }

    fn update_user_subscription_cache(
        &mut self,
        user_id: Uuid,
        subscription_end: Option<DateTime<Utc>>,
        is_premium: bool,
    ) -> StoreResult<()> {
        update(users::table.find(user_id))
            .set((
                users::subscription_end.eq(subscription_end),
                users::is_premium.eq(is_premium),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn lock_promo_code(&mut self, promo_code_id: Uuid) -> StoreResult<Option<PromoCodeEntity>> {
        Ok(promo_codes::table
            .find(promo_code_id)
            .select(PromoCodeEntity::as_select())
            .for_update()
            .first::<PromoCodeEntity>(self.conn)
            .optional()?)
    }

    fn increment_promo_usage(&mut self, promo_code_id: Uuid) -> StoreResult<i32> {
        Ok(update(promo_codes::table.find(promo_code_id))
            .set(promo_codes::used_count.eq(promo_codes::used_count + 1))
            .returning(promo_codes::used_count)
            .get_result::<i32>(self.conn)?)
    }
}
