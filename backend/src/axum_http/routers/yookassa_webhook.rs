use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde_json::Value;
use subpay_core::domain::{
    entities::payment_provider_credentials::PaymentProviderCredentialEntity,
    repositories::{
        payment_provider_credentials::PaymentProviderCredentialRepository,
        reconciliation::ReconciliationStore,
    },
    value_objects::{
        enums::{payment_providers::PaymentProvider, remote_statuses::RemoteStatus},
        payment_gateway::{GatewayNotification, remote_paid_at},
        reconciliation::RemoteObservation,
    },
};
use tracing::{info, warn};

use crate::{
    axum_http::{
        auth::{basic_credentials, secrets_match},
        error_responses::AppError,
    },
    usecases::reconciler::{Reconciler, WebhookAck},
};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_BACKEND/api/v1/payments/yookassa/webhook" \
//     -u "$SHOP_ID:$SECRET_KEY" -H "Content-Type: application/json" \
//     -d '{"event":"payment.succeeded","object":{"id":"2d9f...","status":"succeeded"}}'

pub struct WebhookState<S>
where
    S: ReconciliationStore + 'static,
{
    reconciler: Arc<Reconciler<S>>,
    credential_repository: Arc<dyn PaymentProviderCredentialRepository + Send + Sync>,
}

impl<S> Clone for WebhookState<S>
where
    S: ReconciliationStore + 'static,
{
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
            credential_repository: Arc::clone(&self.credential_repository),
        }
    }
}

pub fn routes<S>(
    reconciler: Arc<Reconciler<S>>,
    credential_repository: Arc<dyn PaymentProviderCredentialRepository + Send + Sync>,
) -> Router
where
    S: ReconciliationStore + 'static,
{
    Router::new()
        .route("/yookassa/webhook", post(yookassa_webhook::<S>))
        .with_state(WebhookState {
            reconciler,
            credential_repository,
        })
}

pub async fn yookassa_webhook<S>(
    State(state): State<WebhookState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError>
where
    S: ReconciliationStore + 'static,
{
    let credentials = authenticate(&state, &headers).await?;

    let raw: Value = serde_json::from_slice(&body).map_err(|err| {
        warn!(error = %err, "yookassa_webhook: body is not JSON");
        AppError::BadRequest("malformed notification".to_string())
    })?;
    let notification: GatewayNotification =
        serde_json::from_value(raw.clone()).map_err(|err| {
            warn!(error = %err, "yookassa_webhook: unexpected notification shape");
            AppError::BadRequest("malformed notification".to_string())
        })?;

    let object = notification.object;
    let external_id = object
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("notification has no payment id".to_string()))?;

    let status = RemoteStatus::parse(object.status.as_deref().unwrap_or_default());
    if let RemoteStatus::Unknown(raw_status) = &status {
        warn!(%external_id, status = %raw_status, event = ?notification.event, "yookassa_webhook: unknown payment status");
    }

    let observation = RemoteObservation::new(
        status,
        remote_paid_at(object.paid_at.as_deref(), object.captured_at.as_deref()),
    )
    .with_snapshot(raw.get("object").cloned().unwrap_or(Value::Null))
    .with_event(notification.event);

    let ack = state
        .reconciler
        .handle_webhook(credentials.bot_id, external_id, observation)
        .await?;
    if ack == WebhookAck::UnknownPayment {
        info!(%external_id, "yookassa_webhook: notification for a payment we never issued");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Returns the matched credentials; their `bot_id` scopes which payments the notification may touch.
async fn authenticate<S>(
    state: &WebhookState<S>,
    headers: &HeaderMap,
) -> Result<PaymentProviderCredentialEntity, AppError>
where
    S: ReconciliationStore + 'static,
{
    let (shop_id, secret) = basic_credentials(headers).ok_or(AppError::Unauthorized)?;

    let credentials = state
        .credential_repository
        .find_by_shop_id(PaymentProvider::YooKassa, &shop_id)
        .await
        .map_err(AppError::Internal)?;

    match credentials {
        Some(credentials) if secrets_match(&secret, &credentials.secret_key) => Ok(credentials),
        _ => {
            warn!(%shop_id, "yookassa_webhook: rejected notification with bad credentials");
            Err(AppError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::test_support::{InMemoryStore, fixtures};
    use axum::{
        http::{HeaderValue, header::AUTHORIZATION},
        response::IntoResponse,
    };
    use base64::{Engine, engine::general_purpose::STANDARD};
    use chrono::Utc;
    use serde_json::json;
    use subpay_core::domain::{
        repositories::{
            channel_access::MockChannelAccessGranter, notifications::MockNotificationSink,
            payment_gateway::MockPaymentGateway,
            payment_provider_credentials::MockPaymentProviderCredentialRepository,
            payments::MockPaymentRepository,
        },
    };
    use uuid::Uuid;

    fn state(store: Arc<InMemoryStore>) -> WebhookState<InMemoryStore> {
        state_with_bound_shop(store, Uuid::new_v4())
    }

    /// `shop-1` is shared across bots; `shop-bound` belongs to `bound_bot` only.
    fn state_with_bound_shop(
        store: Arc<InMemoryStore>,
        bound_bot: Uuid,
    ) -> WebhookState<InMemoryStore> {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_provider()
            .return_const(PaymentProvider::YooKassa);
        let mut notifier = MockNotificationSink::new();
        notifier.expect_send_user_message().returning(|_, _, _| Ok(()));
        notifier.expect_send_admin_message().returning(|_| Ok(()));
        let mut channels = MockChannelAccessGranter::new();
        channels.expect_grant().returning(|_, _, _| Ok(Vec::new()));

        let mut credentials = MockPaymentProviderCredentialRepository::new();
        credentials
            .expect_find_by_shop_id()
            .returning(move |provider, shop_id| {
                let bot_id = match shop_id {
                    "shop-1" => None,
                    "shop-bound" => Some(bound_bot),
                    _ => return Ok(None),
                };
                Ok(Some(PaymentProviderCredentialEntity {
                    id: Uuid::new_v4(),
                    bot_id,
                    provider: provider.as_str().to_string(),
                    shop_id: shop_id.to_string(),
                    secret_key: "live_secret".to_string(),
                    created_at: Utc::now(),
                }))
            });

        let reconciler = Reconciler::new(
            store,
            Arc::new(MockPaymentRepository::new()),
            Arc::new(MockPaymentProviderCredentialRepository::new()),
            Arc::new(gateway),
            Arc::new(notifier),
            Arc::new(channels),
        );

        WebhookState {
            reconciler: Arc::new(reconciler),
            credential_repository: Arc::new(credentials),
        }
    }

    fn basic(user: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode(format!("{user}:{password}"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        headers
    }

    fn seeded() -> (Arc<InMemoryStore>, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let bot_id = Uuid::new_v4();
        let user = fixtures::user(bot_id);
        let plan = fixtures::plan(bot_id, 30);
        let payment = fixtures::pending_payment(&user, Some(&plan), Some("ext-1"));
        let payment_id = payment.id;
        store.seed_user(user);
        store.seed_plan(plan);
        store.seed_payment(payment);
        (store, payment_id)
    }

    fn body(status: &str) -> Bytes {
        Bytes::from(
            json!({
                "type": "notification",
                "event": format!("payment.{status}"),
                "object": { "id": "ext-1", "status": status, "paid": true }
            })
            .to_string(),
        )
    }

    fn status_of(result: Result<StatusCode, AppError>) -> StatusCode {
        match result {
            Ok(status) => status,
            Err(err) => err.into_response().status(),
        }
    }

    #[tokio::test]
    async fn authenticated_success_notification_activates_payment() {
        let (store, payment_id) = seeded();

        let result = yookassa_webhook(
            State(state(Arc::clone(&store))),
            basic("shop-1", "live_secret"),
            body("succeeded"),
        )
        .await;

        assert_eq!(status_of(result), StatusCode::NO_CONTENT);
        let payment = store.payment(payment_id).unwrap();
        assert_eq!(payment.status, "succeeded");
        assert_eq!(payment.payload["gateway_payment"]["id"], "ext-1");
        assert_eq!(payment.payload["gateway_event"], "payment.succeeded");
    }

    #[tokio::test]
    async fn wrong_secret_or_missing_auth_is_unauthorized() {
        let (store, payment_id) = seeded();

        let wrong = yookassa_webhook(
            State(state(Arc::clone(&store))),
            basic("shop-1", "guess"),
            body("succeeded"),
        )
        .await;
        let unknown_shop = yookassa_webhook(
            State(state(Arc::clone(&store))),
            basic("shop-2", "live_secret"),
            body("succeeded"),
        )
        .await;
        let anonymous =
            yookassa_webhook(State(state(Arc::clone(&store))), HeaderMap::new(), body("succeeded"))
                .await;

        assert_eq!(status_of(wrong), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(unknown_shop), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(anonymous), StatusCode::UNAUTHORIZED);
        assert_eq!(store.payment(payment_id).unwrap().status, "pending");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (store, _) = seeded();

        let garbage = yookassa_webhook(
            State(state(Arc::clone(&store))),
            basic("shop-1", "live_secret"),
            Bytes::from_static(b"{not json"),
        )
        .await;
        let no_id = yookassa_webhook(
            State(state(Arc::clone(&store))),
            basic("shop-1", "live_secret"),
            Bytes::from(json!({ "object": { "status": "succeeded" } }).to_string()),
        )
        .await;

        assert_eq!(status_of(garbage), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(no_id), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_status_and_unknown_payment_are_acknowledged() {
        let (store, payment_id) = seeded();

        let odd_status = yookassa_webhook(
            State(state(Arc::clone(&store))),
            basic("shop-1", "live_secret"),
            body("refunded"),
        )
        .await;
        let unknown_payment = yookassa_webhook(
            State(state(Arc::clone(&store))),
            basic("shop-1", "live_secret"),
            Bytes::from(json!({ "object": { "id": "never-issued", "status": "succeeded" } }).to_string()),
        )
        .await;

        assert_eq!(status_of(odd_status), StatusCode::NO_CONTENT);
        assert_eq!(status_of(unknown_payment), StatusCode::NO_CONTENT);
        assert_eq!(store.payment(payment_id).unwrap().status, "pending");
    }

    #[tokio::test]
    async fn shop_bound_to_another_bot_cannot_touch_the_payment() {
        let (store, payment_id) = seeded();

        let result = yookassa_webhook(
            State(state_with_bound_shop(Arc::clone(&store), Uuid::new_v4())),
            basic("shop-bound", "live_secret"),
            body("succeeded"),
        )
        .await;

        assert_eq!(status_of(result), StatusCode::NO_CONTENT);
        let payment = store.payment(payment_id).unwrap();
        assert_eq!(payment.status, "pending");
        assert!(store.subscriptions_for(payment.user_id).is_empty());
    }

    #[tokio::test]
    async fn shop_bound_to_the_owning_bot_finalizes_the_payment() {
        let (store, payment_id) = seeded();
        let owner = store.payment(payment_id).unwrap().bot_id;

        let result = yookassa_webhook(
            State(state_with_bound_shop(Arc::clone(&store), owner)),
            basic("shop-bound", "live_secret"),
            body("succeeded"),
        )
        .await;

        assert_eq!(status_of(result), StatusCode::NO_CONTENT);
        assert_eq!(store.payment(payment_id).unwrap().status, "succeeded");
    }

    #[tokio::test]
    async fn exhausted_lock_retries_ask_for_redelivery() {
        let (store, payment_id) = seeded();
        store.hold_payment(payment_id);

        let result = yookassa_webhook(
            State(state(Arc::clone(&store))),
            basic("shop-1", "live_secret"),
            body("succeeded"),
        )
        .await;

        assert_eq!(status_of(result), StatusCode::SERVICE_UNAVAILABLE);
    }
}
