use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use backend::{axum_http::auth::authorize_bearer, usecases::reconciler::Reconciler};
use serde::Deserialize;
use subpay_core::domain::repositories::reconciliation::ReconciliationStore;
use tracing::{error, info};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_WORKER/internal/v1/payments/sync" \
//     -H "Authorization: Bearer $INTERNAL_SYNC_TOKEN" \
//     -H "Content-Type: application/json" \
//     -d '{"limit":50}'

const MAX_SYNC_LIMIT: i64 = 500;

pub struct PaymentSyncState<S>
where
    S: ReconciliationStore + 'static,
{
    reconciler: Arc<Reconciler<S>>,
    sync_token: Option<String>,
    default_limit: i64,
}

impl<S> Clone for PaymentSyncState<S>
where
    S: ReconciliationStore + 'static,
{
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
            sync_token: self.sync_token.clone(),
            default_limit: self.default_limit,
        }
    }
}

pub fn routes<S>(
    reconciler: Arc<Reconciler<S>>,
    sync_token: Option<String>,
    default_limit: i64,
) -> Router
where
    S: ReconciliationStore + 'static,
{
    Router::new()
        .route("/sync", post(sync_payments::<S>))
        .with_state(PaymentSyncState {
            reconciler,
            sync_token,
            default_limit,
        })
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncPaymentsRequest {
    pub limit: Option<i64>,
}

pub async fn sync_payments<S>(
    State(state): State<PaymentSyncState<S>>,
    headers: HeaderMap,
    payload: Option<Json<SyncPaymentsRequest>>,
) -> Response
where
    S: ReconciliationStore + 'static,
{
    let expected_token = match state.sync_token.as_deref() {
        Some(token) => token,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "sync token is not configured",
            )
                .into_response();
        }
    };

    if let Err(status) = authorize_bearer(&headers, expected_token) {
        return (status, "unauthorized").into_response();
    }

    let Json(request) = payload.unwrap_or_default();
    let limit = request
        .limit
        .unwrap_or(state.default_limit)
        .clamp(1, MAX_SYNC_LIMIT);

    info!(limit, "payment_sync: on-demand sweep requested");
    match state.reconciler.sweep_pending(limit).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => {
            error!(error = ?err, "payment_sync: sweep failed");
            (err.status_code(), "payment sync failed").into_response()
        }
    }
}
