//! In-memory reconciliation store for use-case tests.
//!
//! Transactions are fully serialized and work on a copy of the state that replaces the shared
//! state only when the closure returns `Ok`, which gives the same all-or-nothing visibility as
//! a PostgreSQL transaction. Rows can be marked as held by an outside transaction to exercise
//! `SKIP LOCKED` and lock-timeout paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subpay_core::domain::{
    entities::{
        payments::{PaymentEntity, PaymentStateUpdate},
        plans::PlanEntity,
        promo_codes::PromoCodeEntity,
        subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        users::UserEntity,
    },
    repositories::reconciliation::{PaymentLock, ReconciliationStore, ReconciliationUnitOfWork},
    value_objects::{
        enums::row_lock_modes::RowLockMode,
        reconciliation::{PaymentRef, StoreError, StoreResult},
    },
};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    payments: HashMap<Uuid, PaymentEntity>,
    subscriptions: Vec<SubscriptionEntity>,
    plans: HashMap<Uuid, PlanEntity>,
    users: HashMap<Uuid, UserEntity>,
    promo_codes: HashMap<Uuid, PromoCodeEntity>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    gate: Arc<tokio::sync::Mutex<()>>,
    held_payments: Arc<Mutex<HashSet<Uuid>>>,
    injected_conflicts: Arc<AtomicUsize>,
    transactions: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_payment(&self, payment: PaymentEntity) {
        self.state.lock().unwrap().payments.insert(payment.id, payment);
    }

    pub fn seed_plan(&self, plan: PlanEntity) {
        self.state.lock().unwrap().plans.insert(plan.id, plan);
    }

    pub fn seed_user(&self, user: UserEntity) {
        self.state.lock().unwrap().users.insert(user.id, user);
    }

    pub fn seed_promo(&self, promo: PromoCodeEntity) {
        self.state.lock().unwrap().promo_codes.insert(promo.id, promo);
    }

    pub fn seed_subscription(&self, subscription: SubscriptionEntity) {
        self.state.lock().unwrap().subscriptions.push(subscription);
    }

    pub fn payment(&self, id: Uuid) -> Option<PaymentEntity> {
        self.state.lock().unwrap().payments.get(&id).cloned()
    }

    pub fn user(&self, id: Uuid) -> Option<UserEntity> {
        self.state.lock().unwrap().users.get(&id).cloned()
    }

    pub fn promo(&self, id: Uuid) -> Option<PromoCodeEntity> {
        self.state.lock().unwrap().promo_codes.get(&id).cloned()
    }

    pub fn subscriptions_for(&self, user_id: Uuid) -> Vec<SubscriptionEntity> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Pretends another transaction holds the payment row until `release_payment`.
    pub fn hold_payment(&self, id: Uuid) {
        self.held_payments.lock().unwrap().insert(id);
    }

    pub fn release_payment(&self, id: Uuid) {
        self.held_payments.lock().unwrap().remove(&id);
    }

    /// The next `count` transactions fail before running with a storage conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn transactions_started(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryStore {
    async fn within_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&mut dyn ReconciliationUnitOfWork) -> Result<T, E> + Send + 'static,
    {
        let _serialized = self.gate.lock().await;
        self.transactions.fetch_add(1, Ordering::SeqCst);

        let pending_conflicts = self.injected_conflicts.load(Ordering::SeqCst);
        if pending_conflicts > 0 {
            self.injected_conflicts
                .store(pending_conflicts - 1, Ordering::SeqCst);
            return Err(E::from(StoreError::Conflict(
                "deadlock detected".to_string(),
            )));
        }

        let mut uow = MemoryUnitOfWork {
            state: self.state.lock().unwrap().clone(),
            held_payments: self.held_payments.lock().unwrap().clone(),
        };

        let result = work(&mut uow);
        if result.is_ok() {
            *self.state.lock().unwrap() = uow.state;
        }
        result
    }
}

struct MemoryUnitOfWork {
    state: MemoryState,
    held_payments: HashSet<Uuid>,
}

impl ReconciliationUnitOfWork for MemoryUnitOfWork {
    fn lock_payment(&mut self, payment: &PaymentRef, mode: RowLockMode) -> StoreResult<PaymentLock> {
        let found = match payment {
            PaymentRef::Id(id) => self.state.payments.get(id),
            PaymentRef::External {
                provider,
                external_id,
                bot_id,
            } => self.state.payments.values().find(|p| {
                p.provider == provider.as_str()
                    && p.external_id.as_deref() == Some(external_id)
                    && bot_id.is_none_or(|tenant| tenant == p.bot_id)
            }),
        };

        let Some(found) = found else {
            return Ok(PaymentLock::Missing);
        };

        if self.held_payments.contains(&found.id) {
            return match mode {
                RowLockMode::SkipLocked => Ok(PaymentLock::Contended),
                RowLockMode::Wait => Err(StoreError::Conflict(
                    "canceling statement due to lock timeout".to_string(),
                )),
            };
        }

        Ok(PaymentLock::Acquired(found.clone()))
    }

    fn save_payment_state(
        &mut self,
        payment_id: Uuid,
        update: &PaymentStateUpdate,
    ) -> StoreResult<PaymentEntity> {
        let payment = self
            .state
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| StoreError::Other(anyhow!("payment {payment_id} missing")))?;
        payment.status = update.status.as_str().to_string();
        payment.paid_at = update.paid_at;
        payment.payload = update.payload.clone();
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    fn find_subscription_by_payment(
        &mut self,
        payment_id: Uuid,
    ) -> StoreResult<Option<SubscriptionEntity>> {
        Ok(self
            .state
            .subscriptions
            .iter()
            .find(|s| s.payment_id == Some(payment_id))
            .cloned())
    }

    fn find_plan(&mut self, plan_id: Uuid) -> StoreResult<Option<PlanEntity>> {
        Ok(self.state.plans.get(&plan_id).cloned())
    }

    fn lock_user(&mut self, user_id: Uuid) -> StoreResult<Option<UserEntity>> {
        Ok(self.state.users.get(&user_id).cloned())
    }

    fn insert_subscription(
        &mut self,
        subscription: &InsertSubscriptionEntity,
    ) -> StoreResult<SubscriptionEntity> {
        if subscription.payment_id.is_some()
            && self
                .state
                .subscriptions
                .iter()
                .any(|s| s.payment_id == subscription.payment_id)
        {
            return Err(StoreError::Conflict(
                "duplicate key value violates unique constraint".to_string(),
            ));
        }

        let now = Utc::now();
        let created = SubscriptionEntity {
            id: Uuid::new_v4(),
            bot_id: subscription.bot_id,
            user_id: subscription.user_id,
            plan_id: subscription.plan_id,
            payment_id: subscription.payment_id,
            starts_at: subscription.starts_at,
            ends_at: subscription.ends_at,
            is_active: subscription.is_active,
            auto_renew: subscription.auto_renew,
            created_at: now,
            updated_at: now,
        };
        self.state.subscriptions.push(created.clone());
        Ok(created)
    }

    fn deactivate_other_subscriptions(
        &mut self,
        user_id: Uuid,
        keep_subscription_id: Uuid,
    ) -> StoreResult<usize> {
        let mut count = 0;
        for subscription in self.state.subscriptions.iter_mut().filter(|s| {
            s.user_id == user_id && s.id != keep_subscription_id && s.is_active
        }) {
            subscription.is_active = false;
            count += 1;
        }
        Ok(count)
    }

    fn update_user_subscription_cache(
        &mut self,
        user_id: Uuid,
        subscription_end: Option<DateTime<Utc>>,
        is_premium: bool,
    ) -> StoreResult<()> {
        if let Some(user) = self.state.users.get_mut(&user_id) {
            user.subscription_end = subscription_end;
            user.is_premium = is_premium;
        }
        Ok(())
    }

    fn lock_promo_code(&mut self, promo_code_id: Uuid) -> StoreResult<Option<PromoCodeEntity>> {
        Ok(self.state.promo_codes.get(&promo_code_id).cloned())
    }

    fn increment_promo_usage(&mut self, promo_code_id: Uuid) -> StoreResult<i32> {
        let promo = self
            .state
            .promo_codes
            .get_mut(&promo_code_id)
            .ok_or_else(|| StoreError::Other(anyhow!("promo code {promo_code_id} missing")))?;
        // Mirrors the used_count <= max_uses check constraint.
        if promo.max_uses.is_some_and(|max| promo.used_count + 1 > max) {
            return Err(StoreError::Other(anyhow!(
                "new row violates check constraint promo_codes_usage_cap"
            )));
        }
        promo.used_count += 1;
        Ok(promo.used_count)
    }
}

pub mod fixtures {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;
    use subpay_core::domain::{
        entities::{
            payments::PaymentEntity, plans::PlanEntity, promo_codes::PromoCodeEntity,
            subscriptions::SubscriptionEntity, users::UserEntity,
        },
        value_objects::{
            enums::{
                discount_types::DiscountType, payment_providers::PaymentProvider,
                payment_statuses::PaymentStatus,
            },
            payment_payload::PromoApplication,
        },
    };
    use uuid::Uuid;

    use crate::usecases::promo_ledger::quote;

    pub fn user(bot_id: Uuid) -> UserEntity {
        let now = Utc::now();
        UserEntity {
            id: Uuid::new_v4(),
            bot_id,
            telegram_id: 100_500,
            username: Some("subscriber".to_string()),
            first_name: Some("Sam".to_string()),
            is_premium: false,
            subscription_end: None,
            is_blocked: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn plan(bot_id: Uuid, duration_days: i32) -> PlanEntity {
        PlanEntity {
            id: Uuid::new_v4(),
            bot_id,
            name: "Monthly".to_string(),
            price_amount: Decimal::new(100_000, 2),
            price_currency: "RUB".to_string(),
            duration_days,
            is_active: true,
        }
    }

    pub fn promo(bot_id: Uuid, code: &str, kind: DiscountType, value: Decimal) -> PromoCodeEntity {
        PromoCodeEntity {
            id: Uuid::new_v4(),
            bot_id,
            code: code.to_string(),
            discount_type: kind.as_str().to_string(),
            discount_value: value,
            max_uses: None,
            used_count: 0,
            is_active: true,
            valid_from: None,
            valid_until: None,
            description: None,
            created_at: Utc::now(),
        }
    }

    pub fn promo_application(promo: &PromoCodeEntity, price: Decimal) -> PromoApplication {
        let kind = promo.kind().unwrap_or(DiscountType::Fixed);
        let (discount_amount, final_price) = quote(kind, promo.discount_value, price);
        PromoApplication {
            promo_code: promo.code.clone(),
            promo_code_id: promo.id,
            discount_type: kind,
            discount_value: promo.discount_value,
            original_price: price,
            discount_amount,
            final_price,
            applied: None,
        }
    }

    pub fn pending_payment(
        user: &UserEntity,
        plan: Option<&PlanEntity>,
        external_id: Option<&str>,
    ) -> PaymentEntity {
        let now = Utc::now();
        PaymentEntity {
            id: Uuid::new_v4(),
            bot_id: user.bot_id,
            user_id: user.id,
            plan_id: plan.map(|p| p.id),
            amount: plan.map_or(Decimal::new(50_000, 2), |p| p.price_amount),
            currency: "RUB".to_string(),
            provider: PaymentProvider::YooKassa.as_str().to_string(),
            external_id: external_id.map(str::to_string),
            status: PaymentStatus::Pending.as_str().to_string(),
            description: None,
            payload: json!({}),
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn active_subscription(user: &UserEntity, ends_at: DateTime<Utc>) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            bot_id: user.bot_id,
            user_id: user.id,
            plan_id: None,
            payment_id: None,
            starts_at: now - chrono::Duration::days(28),
            ends_at,
            is_active: true,
            auto_renew: false,
            created_at: now,
            updated_at: now,
        }
    }
}
