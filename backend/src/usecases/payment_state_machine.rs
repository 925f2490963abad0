use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use subpay_core::domain::{
    entities::{
        payments::{PaymentEntity, PaymentStateUpdate},
        plans::PlanEntity,
        subscriptions::SubscriptionEntity,
        users::UserEntity,
    },
    repositories::reconciliation::{PaymentLock, ReconciliationStore, ReconciliationUnitOfWork},
    value_objects::{
        enums::{
            payment_statuses::PaymentStatus, remote_statuses::RemoteStatus,
            row_lock_modes::RowLockMode,
        },
        payment_payload::PaymentPayload,
        reconciliation::{PaymentRef, RemoteObservation},
    },
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    errors::{ReconcileError, ReconcileResult},
    promo_ledger, subscription_activator,
};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: StdDuration = StdDuration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// This call performed the `pending -> succeeded` transition.
    Activated {
        payment: PaymentEntity,
        subscription: SubscriptionEntity,
        user: UserEntity,
        plan: Option<PlanEntity>,
        promo_applied: Option<bool>,
    },
    /// The payment was already finalized as succeeded; nothing was written.
    AlreadySucceeded {
        payment: PaymentEntity,
        subscription: Option<SubscriptionEntity>,
    },
    /// The gateway has not decided yet; nothing was written.
    StillPending { payment: PaymentEntity },
    /// The row was locked by another reconciliation (skip-locked mode only).
    Skipped,
}

enum Transition {
    Outcome(AdvanceOutcome),
    Canceled { payment_id: Uuid },
}

/// Evaluates one observation against the locked payment row.
///
/// Everything written here belongs to the caller's unit of work.
fn evaluate(
    uow: &mut dyn ReconciliationUnitOfWork,
    payment_ref: &PaymentRef,
    mode: RowLockMode,
    observation: &RemoteObservation,
    now: DateTime<Utc>,
) -> ReconcileResult<Transition> {
    let payment = match uow.lock_payment(payment_ref, mode)? {
        PaymentLock::Acquired(payment) => payment,
        PaymentLock::Missing => return Err(ReconcileError::PaymentNotFound),
        PaymentLock::Contended => return Ok(Transition::Outcome(AdvanceOutcome::Skipped)),
    };

    let status = payment.payment_status().ok_or_else(|| {
        ReconcileError::Internal(anyhow!(
            "payment {} has unrecognised status {:?}",
            payment.id,
            payment.status
        ))
    })?;

    match status {
        PaymentStatus::Succeeded => {
            let subscription = uow.find_subscription_by_payment(payment.id)?;
            return Ok(Transition::Outcome(AdvanceOutcome::AlreadySucceeded {
                payment,
                subscription,
            }));
        }
        PaymentStatus::Canceled => {
            if observation.status == RemoteStatus::Succeeded {
                warn!(
                    payment_id = %payment.id,
                    "payment_state_machine: gateway reports success for a canceled payment"
                );
            }
            return Err(ReconcileError::AlreadyFinalized);
        }
        PaymentStatus::Pending => {}
    }

    let mut payload = payment.typed_payload();
    record_observation(&mut payload, observation);

    match &observation.status {
        RemoteStatus::Pending | RemoteStatus::WaitingForCapture => {
            Ok(Transition::Outcome(AdvanceOutcome::StillPending { payment }))
        }
        RemoteStatus::Succeeded => {
            let activation = subscription_activator::activate(uow, &payment, &payload, now)?;

            let promo_applied = match payload.promo_code.as_mut() {
                Some(application) => Some(promo_ledger::apply(uow, application)?),
                None => None,
            };

            let payment = uow.save_payment_state(
                payment.id,
                &PaymentStateUpdate {
                    status: PaymentStatus::Succeeded,
                    paid_at: Some(observation.paid_at.unwrap_or(now)),
                    payload: payload.to_value(),
                },
            )?;

            Ok(Transition::Outcome(AdvanceOutcome::Activated {
                payment,
                subscription: activation.subscription,
                user: activation.user,
                plan: activation.plan,
                promo_applied,
            }))
        }
        RemoteStatus::Canceled => {
            uow.save_payment_state(
                payment.id,
                &PaymentStateUpdate {
                    status: PaymentStatus::Canceled,
                    paid_at: None,
                    payload: payload.to_value(),
                },
            )?;
            Ok(Transition::Canceled {
                payment_id: payment.id,
            })
        }
        RemoteStatus::Unknown(raw) => Err(ReconcileError::UnknownRemoteStatus(raw.clone())),
    }
}

fn record_observation(payload: &mut PaymentPayload, observation: &RemoteObservation) {
    if let Some(snapshot) = observation.snapshot.as_ref() {
        payload.gateway_payment = Some(snapshot.clone());
    }
    if let Some(event) = observation.event.as_ref() {
        payload.gateway_event = Some(event.clone());
    }
}

/// The single transition function shared by webhook, manual confirmation and polling.
pub struct PaymentStateMachine<S>
where
    S: ReconciliationStore + 'static,
{
    store: Arc<S>,
}

impl<S> PaymentStateMachine<S>
where
    S: ReconciliationStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Locks the payment row, applies `observation` and commits.
    ///
    /// A gateway cancellation is committed first and then reported as
    /// `ReconcileError::PaymentCanceled`. Storage conflicts are retried a bounded number of
    /// times before surfacing as `StorageConflict`.
    pub async fn advance(
        &self,
        payment_ref: PaymentRef,
        mode: RowLockMode,
        observation: RemoteObservation,
    ) -> ReconcileResult<AdvanceOutcome> {
        let mut attempt = 1;
        loop {
            let task_ref = payment_ref.clone();
            let task_observation = observation.clone();

            let result = self
                .store
                .within_transaction(move |uow| {
                    evaluate(uow, &task_ref, mode, &task_observation, Utc::now())
                })
                .await;

            match result {
                Ok(Transition::Outcome(outcome)) => {
                    log_outcome(&payment_ref, &outcome);
                    return Ok(outcome);
                }
                Ok(Transition::Canceled { payment_id }) => {
                    info!(%payment_id, "payment_state_machine: payment canceled by gateway");
                    return Err(ReconcileError::PaymentCanceled { payment_id });
                }
                Err(ReconcileError::StorageConflict(reason)) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        payment = %payment_ref,
                        attempt,
                        reason = %reason,
                        "payment_state_machine: storage conflict, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(ReconcileError::UnknownRemoteStatus(raw)) => {
                    error!(
                        payment = %payment_ref,
                        remote_status = %raw,
                        "payment_state_machine: unknown remote status; payment left pending"
                    );
                    return Err(ReconcileError::UnknownRemoteStatus(raw));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn log_outcome(payment_ref: &PaymentRef, outcome: &AdvanceOutcome) {
    match outcome {
        AdvanceOutcome::Activated {
            payment,
            subscription,
            promo_applied,
            ..
        } => info!(
            payment_id = %payment.id,
            subscription_id = %subscription.id,
            ends_at = %subscription.ends_at,
            promo_applied = ?promo_applied,
            "payment_state_machine: payment succeeded"
        ),
        AdvanceOutcome::AlreadySucceeded { payment, .. } => info!(
            payment_id = %payment.id,
            "payment_state_machine: payment already succeeded"
        ),
        AdvanceOutcome::StillPending { payment } => info!(
            payment_id = %payment.id,
            "payment_state_machine: payment still pending at gateway"
        ),
        AdvanceOutcome::Skipped => info!(
            payment = %payment_ref,
            "payment_state_machine: payment locked elsewhere; skipped"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::test_support::{InMemoryStore, fixtures};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use serde_json::json;
    use subpay_core::domain::value_objects::enums::{
        discount_types::DiscountType, payment_providers::PaymentProvider,
    };

    struct Scenario {
        store: Arc<InMemoryStore>,
        machine: Arc<PaymentStateMachine<InMemoryStore>>,
        user: UserEntity,
        payment: PaymentEntity,
    }

    fn scenario() -> Scenario {
        let store = Arc::new(InMemoryStore::new());
        let bot_id = Uuid::new_v4();
        let user = fixtures::user(bot_id);
        let plan = fixtures::plan(bot_id, 30);
        let payment = fixtures::pending_payment(&user, Some(&plan), Some("ext-1"));
        store.seed_user(user.clone());
        store.seed_plan(plan);
        store.seed_payment(payment.clone());

        Scenario {
            machine: Arc::new(PaymentStateMachine::new(Arc::clone(&store))),
            store,
            user,
            payment,
        }
    }

    fn succeeded() -> RemoteObservation {
        RemoteObservation::new(RemoteStatus::Succeeded, None)
    }

    fn by_external(id: &str) -> PaymentRef {
        PaymentRef::External {
            provider: PaymentProvider::YooKassa,
            external_id: id.to_string(),
            bot_id: None,
        }
    }

    #[tokio::test]
    async fn success_activates_once_and_stamps_paid_at() {
        let s = scenario();
        let paid_at = Utc::now() - Duration::minutes(3);

        let outcome = s
            .machine
            .advance(
                by_external("ext-1"),
                RowLockMode::Wait,
                RemoteObservation::new(RemoteStatus::Succeeded, Some(paid_at))
                    .with_snapshot(json!({ "id": "ext-1", "status": "succeeded" }))
                    .with_event(Some("payment.succeeded".to_string())),
            )
            .await
            .unwrap();

        let AdvanceOutcome::Activated { payment, .. } = outcome else {
            panic!("expected activation, got {outcome:?}");
        };
        assert_eq!(payment.status, "succeeded");
        assert_eq!(payment.paid_at, Some(paid_at));
        assert_eq!(payment.payload["gateway_event"], json!("payment.succeeded"));
        assert_eq!(payment.payload["gateway_payment"]["id"], json!("ext-1"));
        assert_eq!(s.store.subscriptions_for(s.user.id).len(), 1);
    }

    #[tokio::test]
    async fn planless_payment_with_a_malformed_payload_key_still_activates() {
        let store = Arc::new(InMemoryStore::new());
        let user = fixtures::user(Uuid::new_v4());
        let mut payment = fixtures::pending_payment(&user, None, Some("ext-9"));
        payment.payload = json!({ "duration_days": 14, "gateway_event": 42, "source": "bot" });
        store.seed_user(user.clone());
        store.seed_payment(payment.clone());
        let machine = PaymentStateMachine::new(Arc::clone(&store));

        let outcome = machine
            .advance(by_external("ext-9"), RowLockMode::Wait, succeeded())
            .await
            .unwrap();

        let AdvanceOutcome::Activated { subscription, payment, .. } = outcome else {
            panic!("expected activation, got {outcome:?}");
        };
        assert_eq!(subscription.ends_at - subscription.starts_at, Duration::days(14));
        assert_eq!(payment.payload["duration_days"], json!(14));
        assert_eq!(payment.payload["source"], json!("bot"));
    }

    #[tokio::test]
    async fn concurrent_triggers_activate_exactly_once() {
        let s = scenario();

        let mut handles = Vec::new();
        for i in 0..8 {
            let machine = Arc::clone(&s.machine);
            let payment_ref = if i % 2 == 0 {
                by_external("ext-1")
            } else {
                PaymentRef::Id(s.payment.id)
            };
            handles.push(tokio::spawn(async move {
                machine
                    .advance(payment_ref, RowLockMode::Wait, succeeded())
                    .await
            }));
        }

        let mut activated = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                AdvanceOutcome::Activated { .. } => activated += 1,
                AdvanceOutcome::AlreadySucceeded { subscription, .. } => {
                    assert!(subscription.is_some());
                    already += 1;
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(activated, 1);
        assert_eq!(already, 7);
        assert_eq!(s.store.subscriptions_for(s.user.id).len(), 1);
    }

    #[tokio::test]
    async fn stale_pending_after_success_changes_nothing() {
        let s = scenario();
        s.machine
            .advance(PaymentRef::Id(s.payment.id), RowLockMode::Wait, succeeded())
            .await
            .unwrap();
        let before = s.store.payment(s.payment.id).unwrap();

        let outcome = s
            .machine
            .advance(
                by_external("ext-1"),
                RowLockMode::Wait,
                RemoteObservation::new(RemoteStatus::Pending, None),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, AdvanceOutcome::AlreadySucceeded { .. }));
        assert_eq!(s.store.payment(s.payment.id).unwrap(), before);
    }

    #[tokio::test]
    async fn cancellation_commits_and_is_terminal() {
        let s = scenario();

        let err = s
            .machine
            .advance(
                PaymentRef::Id(s.payment.id),
                RowLockMode::Wait,
                RemoteObservation::new(RemoteStatus::Canceled, None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::PaymentCanceled { payment_id } if payment_id == s.payment.id));
        assert_eq!(s.store.payment(s.payment.id).unwrap().status, "canceled");

        let err = s
            .machine
            .advance(PaymentRef::Id(s.payment.id), RowLockMode::Wait, succeeded())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::AlreadyFinalized));
        assert_eq!(s.store.payment(s.payment.id).unwrap().status, "canceled");
        assert!(s.store.subscriptions_for(s.user.id).is_empty());
    }

    #[tokio::test]
    async fn waiting_for_capture_is_not_final() {
        let s = scenario();

        let outcome = s
            .machine
            .advance(
                PaymentRef::Id(s.payment.id),
                RowLockMode::Wait,
                RemoteObservation::new(RemoteStatus::WaitingForCapture, None),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, AdvanceOutcome::StillPending { .. }));
        assert_eq!(s.store.payment(s.payment.id).unwrap(), s.payment);
    }

    #[tokio::test]
    async fn unknown_remote_status_commits_nothing() {
        let s = scenario();

        let err = s
            .machine
            .advance(
                PaymentRef::Id(s.payment.id),
                RowLockMode::Wait,
                RemoteObservation::new(RemoteStatus::parse("refunded"), None),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::UnknownRemoteStatus(ref raw) if raw == "refunded"));
        assert_eq!(s.store.payment(s.payment.id).unwrap(), s.payment);
    }

    #[tokio::test]
    async fn unknown_payment_is_not_found() {
        let s = scenario();

        let err = s
            .machine
            .advance(by_external("nope"), RowLockMode::Wait, succeeded())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::PaymentNotFound));
    }

    #[tokio::test]
    async fn skip_locked_mode_skips_held_rows() {
        let s = scenario();
        s.store.hold_payment(s.payment.id);

        let outcome = s
            .machine
            .advance(PaymentRef::Id(s.payment.id), RowLockMode::SkipLocked, succeeded())
            .await
            .unwrap();

        assert_eq!(outcome, AdvanceOutcome::Skipped);
        assert_eq!(s.store.payment(s.payment.id).unwrap().status, "pending");
    }

    #[tokio::test]
    async fn storage_conflicts_are_retried_then_surfaced() {
        let s = scenario();
        s.store.inject_conflicts(2);

        let outcome = s
            .machine
            .advance(PaymentRef::Id(s.payment.id), RowLockMode::Wait, succeeded())
            .await
            .unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Activated { .. }));
        assert_eq!(s.store.transactions_started(), 3);

        let other = scenario();
        other.store.hold_payment(other.payment.id);
        let err = other
            .machine
            .advance(PaymentRef::Id(other.payment.id), RowLockMode::Wait, succeeded())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(other.store.transactions_started(), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn concurrent_finalizations_never_exceed_promo_cap() {
        let store = Arc::new(InMemoryStore::new());
        let machine = Arc::new(PaymentStateMachine::new(Arc::clone(&store)));
        let bot_id = Uuid::new_v4();
        let plan = fixtures::plan(bot_id, 30);
        store.seed_plan(plan.clone());

        let mut promo = fixtures::promo(bot_id, "ONCE", DiscountType::Percentage, Decimal::new(20, 0));
        promo.max_uses = Some(1);
        store.seed_promo(promo.clone());

        let mut payment_ids = Vec::new();
        for _ in 0..4 {
            let user = fixtures::user(bot_id);
            let mut payment = fixtures::pending_payment(&user, Some(&plan), None);
            payment.payload = json!({
                "promo_code": fixtures::promo_application(&promo, plan.price_amount),
            });
            store.seed_user(user);
            store.seed_payment(payment.clone());
            payment_ids.push(payment.id);
        }

        let handles: Vec<_> = payment_ids
            .iter()
            .map(|id| {
                let machine = Arc::clone(&machine);
                let id = *id;
                tokio::spawn(async move {
                    machine
                        .advance(PaymentRef::Id(id), RowLockMode::Wait, succeeded())
                        .await
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                AdvanceOutcome::Activated { promo_applied, .. } => {
                    if promo_applied == Some(true) {
                        applied += 1;
                    }
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(store.promo(promo.id).unwrap().used_count, 1);
        let not_applied = payment_ids
            .iter()
            .filter(|id| {
                store.payment(**id).unwrap().payload["promo_code"]["applied"] == json!(false)
            })
            .count();
        assert_eq!(not_applied, 3);
    }

    #[tokio::test]
    async fn renewal_before_expiry_keeps_continuity() {
        let s = scenario();
        let now = Utc::now();
        let mut user = s.store.user(s.user.id).unwrap();
        user.subscription_end = Some(now + Duration::days(2));
        s.store.seed_user(user.clone());
        s.store
            .seed_subscription(fixtures::active_subscription(&user, now + Duration::days(2)));

        let outcome = s
            .machine
            .advance(PaymentRef::Id(s.payment.id), RowLockMode::Wait, succeeded())
            .await
            .unwrap();

        let AdvanceOutcome::Activated { subscription, .. } = outcome else {
            panic!("expected activation");
        };
        assert_eq!(subscription.starts_at, now + Duration::days(2));
        assert_eq!(subscription.ends_at, now + Duration::days(32));
        let active = s
            .store
            .subscriptions_for(user.id)
            .into_iter()
            .filter(|sub| sub.is_active)
            .count();
        assert_eq!(active, 1);
    }
}
