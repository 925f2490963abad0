use chrono::{DateTime, Duration, Utc};
use subpay_core::domain::{
    entities::{
        payments::PaymentEntity,
        plans::PlanEntity,
        subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        users::UserEntity,
    },
    repositories::reconciliation::ReconciliationUnitOfWork,
    value_objects::payment_payload::PaymentPayload,
};
use tracing::info;

use super::errors::{ReconcileError, ReconcileResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub subscription: SubscriptionEntity,
    pub user: UserEntity,
    pub plan: Option<PlanEntity>,
    /// `false` when the subscription already existed for this payment.
    pub created: bool,
}

/// Renewals continue from the cached end when it is still in the future.
pub fn subscription_window(
    now: DateTime<Utc>,
    cached_end: Option<DateTime<Utc>>,
    duration_days: i32,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = cached_end.filter(|end| *end > now).unwrap_or(now);
    (start, start + Duration::days(i64::from(duration_days)))
}

/// Creates the subscription paid for by `payment`, at most once per payment.
///
/// Must run in the same unit of work that marks the payment succeeded.
pub fn activate(
    uow: &mut dyn ReconciliationUnitOfWork,
    payment: &PaymentEntity,
    payload: &PaymentPayload,
    now: DateTime<Utc>,
) -> ReconcileResult<Activation> {
    let user = uow
        .lock_user(payment.user_id)?
        .ok_or(ReconcileError::UserMissing)?;

    if let Some(subscription) = uow.find_subscription_by_payment(payment.id)? {
        let plan = match payment.plan_id {
            Some(plan_id) => uow.find_plan(plan_id)?,
            None => None,
        };
        return Ok(Activation {
            subscription,
            user,
            plan,
            created: false,
        });
    }

    let plan = match payment.plan_id {
        Some(plan_id) => Some(uow.find_plan(plan_id)?.ok_or(ReconcileError::PlanNotFound)?),
        None => None,
    };

    let duration_days = plan
        .as_ref()
        .map(|plan| plan.duration_days)
        .or(payload.duration_days)
        .filter(|days| *days > 0)
        .ok_or(ReconcileError::DurationRequired)?;

    let (starts_at, ends_at) = subscription_window(now, user.subscription_end, duration_days);

    let subscription = uow.insert_subscription(&InsertSubscriptionEntity {
        bot_id: payment.bot_id,
        user_id: user.id,
        plan_id: payment.plan_id,
        payment_id: Some(payment.id),
        starts_at,
        ends_at,
        is_active: true,
        auto_renew: false,
    })?;

    let deactivated = uow.deactivate_other_subscriptions(user.id, subscription.id)?;
    uow.update_user_subscription_cache(user.id, Some(ends_at), true)?;

    info!(
        payment_id = %payment.id,
        user_id = %user.id,
        subscription_id = %subscription.id,
        %starts_at,
        %ends_at,
        deactivated,
        "subscription_activator: subscription activated"
    );

    let mut user = user;
    user.subscription_end = Some(ends_at);
    user.is_premium = true;

    Ok(Activation {
        subscription,
        user,
        plan,
        created: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::test_support::{InMemoryStore, fixtures};
    use subpay_core::domain::repositories::reconciliation::ReconciliationStore;
    use uuid::Uuid;

    async fn run_activation(
        store: &InMemoryStore,
        payment: PaymentEntity,
        now: DateTime<Utc>,
    ) -> ReconcileResult<Activation> {
        store
            .within_transaction(move |uow| {
                let payload = payment.typed_payload();
                activate(uow, &payment, &payload, now)
            })
            .await
    }

    #[test]
    fn renewal_continues_from_future_end() {
        let now = Utc::now();
        let cached_end = now + Duration::days(2);

        let (start, end) = subscription_window(now, Some(cached_end), 30);

        assert_eq!(start, cached_end);
        assert_eq!(end, cached_end + Duration::days(30));
    }

    #[test]
    fn lapsed_end_starts_now() {
        let now = Utc::now();
        let (start, end) = subscription_window(now, Some(now - Duration::days(5)), 7);
        assert_eq!(start, now);
        assert_eq!(end, now + Duration::days(7));

        let (start, _) = subscription_window(now, None, 7);
        assert_eq!(start, now);
    }

    #[tokio::test]
    async fn activation_keeps_one_active_subscription_and_updates_cache() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let bot_id = Uuid::new_v4();
        let mut user = fixtures::user(bot_id);
        user.subscription_end = Some(now + Duration::days(2));
        let plan = fixtures::plan(bot_id, 30);
        let previous = fixtures::active_subscription(&user, now + Duration::days(2));
        let payment = fixtures::pending_payment(&user, Some(&plan), Some("ext-1"));
        store.seed_user(user.clone());
        store.seed_plan(plan.clone());
        store.seed_subscription(previous.clone());
        store.seed_payment(payment.clone());

        let activation = run_activation(&store, payment.clone(), now).await.unwrap();

        assert!(activation.created);
        assert_eq!(activation.subscription.starts_at, now + Duration::days(2));
        assert_eq!(activation.subscription.ends_at, now + Duration::days(32));

        let active: Vec<_> = store
            .subscriptions_for(user.id)
            .into_iter()
            .filter(|s| s.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].payment_id, Some(payment.id));

        let cached = store.user(user.id).unwrap();
        assert_eq!(cached.subscription_end, Some(now + Duration::days(32)));
        assert!(cached.is_premium);
    }

    #[tokio::test]
    async fn second_activation_returns_existing_subscription() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let bot_id = Uuid::new_v4();
        let user = fixtures::user(bot_id);
        let plan = fixtures::plan(bot_id, 30);
        let payment = fixtures::pending_payment(&user, Some(&plan), None);
        store.seed_user(user.clone());
        store.seed_plan(plan);
        store.seed_payment(payment.clone());

        let first = run_activation(&store, payment.clone(), now).await.unwrap();
        let second = run_activation(&store, payment, now + Duration::hours(1))
            .await
            .unwrap();

        assert!(!second.created);
        assert_eq!(second.subscription.id, first.subscription.id);
        assert_eq!(store.subscriptions_for(user.id).len(), 1);
    }

    #[tokio::test]
    async fn planless_payment_uses_payload_duration() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let user = fixtures::user(Uuid::new_v4());
        let mut payment = fixtures::pending_payment(&user, None, None);
        payment.payload = serde_json::json!({ "duration_days": 14 });
        store.seed_user(user.clone());
        store.seed_payment(payment.clone());

        let activation = run_activation(&store, payment, now).await.unwrap();

        assert_eq!(activation.subscription.ends_at, now + Duration::days(14));
        assert_eq!(activation.plan, None);
    }

    #[tokio::test]
    async fn planless_payment_without_duration_is_rejected_and_rolled_back() {
        let store = InMemoryStore::new();
        let user = fixtures::user(Uuid::new_v4());
        let payment = fixtures::pending_payment(&user, None, None);
        store.seed_user(user.clone());
        store.seed_payment(payment.clone());

        let err = run_activation(&store, payment, Utc::now()).await.unwrap_err();

        assert!(matches!(err, ReconcileError::DurationRequired));
        assert!(store.subscriptions_for(user.id).is_empty());
    }

    #[tokio::test]
    async fn missing_user_is_reported() {
        let store = InMemoryStore::new();
        let user = fixtures::user(Uuid::new_v4());
        let payment = fixtures::pending_payment(&user, None, None);
        store.seed_payment(payment.clone());

        let err = run_activation(&store, payment, Utc::now()).await.unwrap_err();

        assert!(matches!(err, ReconcileError::UserMissing));
    }
}
