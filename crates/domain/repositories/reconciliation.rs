use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::{
        payments::{PaymentEntity, PaymentStateUpdate},
        plans::PlanEntity,
        promo_codes::PromoCodeEntity,
        subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        users::UserEntity,
    },
    value_objects::{
        enums::row_lock_modes::RowLockMode,
        reconciliation::{PaymentRef, StoreError, StoreResult},
    },
};

/// Outcome of trying to take the payment row lock.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentLock {
    Acquired(PaymentEntity),
    Missing,
    /// Row exists but another transaction holds it (only with `RowLockMode::SkipLocked`).
    Contended,
}

/// Row-level operations available inside one reconciliation transaction.
///
/// Everything called on a unit of work commits or rolls back together.
pub trait ReconciliationUnitOfWork {
    fn lock_payment(&mut self, payment: &PaymentRef, mode: RowLockMode)
    -> StoreResult<PaymentLock>;

    fn save_payment_state(
        &mut self,
        payment_id: Uuid,
        update: &PaymentStateUpdate,
    ) -> StoreResult<PaymentEntity>;

    fn find_subscription_by_payment(
        &mut self,
        payment_id: Uuid,
    ) -> StoreResult<Option<SubscriptionEntity>>;

    fn find_plan(&mut self, plan_id: Uuid) -> StoreResult<Option<PlanEntity>>;

    fn lock_user(&mut self, user_id: Uuid) -> StoreResult<Option<UserEntity>>;

    fn insert_subscription(
        &mut self,
        subscription: &InsertSubscriptionEntity,
    ) -> StoreResult<SubscriptionEntity>;

    /// Sets `is_active = false` on every other active subscription of the user.
    fn deactivate_other_subscriptions(
        &mut self,
        user_id: Uuid,
        keep_subscription_id: Uuid,
    ) -> StoreResult<usize>;

    fn update_user_subscription_cache(
        &mut self,
        user_id: Uuid,
        subscription_end: Option<DateTime<Utc>>,
        is_premium: bool,
    ) -> StoreResult<()>;

    fn lock_promo_code(&mut self, promo_code_id: Uuid) -> StoreResult<Option<PromoCodeEntity>>;

    /// Returns the new `used_count`.
    fn increment_promo_usage(&mut self, promo_code_id: Uuid) -> StoreResult<i32>;
}

/// Runs reconciliation work as a single database transaction.
///
/// `work` returning `Err` rolls everything back; `Ok` commits. Storage failures (including a
/// failed commit) reach the caller through `E: From<StoreError>`.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    async fn within_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&mut dyn ReconciliationUnitOfWork) -> Result<T, E> + Send + 'static;
}
