use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subpay_core::domain::{
    repositories::reconciliation::ReconciliationStore,
    value_objects::payment_payload::PromoApplication,
};
use uuid::Uuid;

use crate::{
    axum_http::{auth::authorize_bearer, error_responses::AppError},
    usecases::{
        checkout::{CheckoutResult, CheckoutUseCase, CreatePaymentCommand},
        reconciler::{ConfirmOutcome, Reconciler},
    },
};

pub struct BotPaymentsState<S>
where
    S: ReconciliationStore + 'static,
{
    checkout: Arc<CheckoutUseCase>,
    reconciler: Arc<Reconciler<S>>,
    api_token: Option<String>,
}

impl<S> Clone for BotPaymentsState<S>
where
    S: ReconciliationStore + 'static,
{
    fn clone(&self) -> Self {
        Self {
            checkout: Arc::clone(&self.checkout),
            reconciler: Arc::clone(&self.reconciler),
            api_token: self.api_token.clone(),
        }
    }
}

impl<S> BotPaymentsState<S>
where
    S: ReconciliationStore + 'static,
{
    fn authorize(&self, headers: &HeaderMap) -> Result<(), AppError> {
        match self.api_token.as_deref() {
            Some(token) => authorize_bearer(headers, token).map_err(|_| AppError::Unauthorized),
            None => Ok(()),
        }
    }
}

pub fn routes<S>(
    checkout: Arc<CheckoutUseCase>,
    reconciler: Arc<Reconciler<S>>,
    api_token: Option<String>,
) -> Router
where
    S: ReconciliationStore + 'static,
{
    Router::new()
        .route("/payments/create", post(create_payment::<S>))
        .route("/payments/:payment_id/confirm", post(confirm_payment::<S>))
        .route("/promo-codes/validate", post(validate_promo_code::<S>))
        .with_state(BotPaymentsState {
            checkout,
            reconciler,
            api_token,
        })
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ConfirmPaymentResponse {
    pub payment_id: Uuid,
    pub status: &'static str,
    pub subscription_end: Option<DateTime<Utc>>,
    pub deferred: bool,
}

impl From<ConfirmOutcome> for ConfirmPaymentResponse {
    fn from(outcome: ConfirmOutcome) -> Self {
        match outcome {
            ConfirmOutcome::Succeeded {
                payment_id,
                subscription_end,
            } => Self {
                payment_id,
                status: "succeeded",
                subscription_end,
                deferred: false,
            },
            ConfirmOutcome::Pending {
                payment_id,
                deferred,
            } => Self {
                payment_id,
                status: "pending",
                subscription_end: None,
                deferred,
            },
            ConfirmOutcome::Canceled { payment_id } => Self {
                payment_id,
                status: "canceled",
                subscription_end: None,
                deferred: false,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidatePromoRequest {
    pub bot_id: Uuid,
    pub plan_id: Uuid,
    pub promo_code: String,
}

pub async fn create_payment<S>(
    State(state): State<BotPaymentsState<S>>,
    headers: HeaderMap,
    Json(command): Json<CreatePaymentCommand>,
) -> Result<Json<CheckoutResult>, AppError>
where
    S: ReconciliationStore + 'static,
{
    state.authorize(&headers)?;
    Ok(Json(state.checkout.create_payment(command).await?))
}

pub async fn confirm_payment<S>(
    State(state): State<BotPaymentsState<S>>,
    headers: HeaderMap,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ConfirmPaymentResponse>, AppError>
where
    S: ReconciliationStore + 'static,
{
    state.authorize(&headers)?;
    let outcome = state.reconciler.confirm_payment(payment_id).await?;
    Ok(Json(outcome.into()))
}

pub async fn validate_promo_code<S>(
    State(state): State<BotPaymentsState<S>>,
    headers: HeaderMap,
    Json(request): Json<ValidatePromoRequest>,
) -> Result<Json<PromoApplication>, AppError>
where
    S: ReconciliationStore + 'static,
{
    state.authorize(&headers)?;
    let quote = state
        .checkout
        .preview_promo(request.bot_id, request.plan_id, &request.promo_code)
        .await?;
    Ok(Json(quote))
}
