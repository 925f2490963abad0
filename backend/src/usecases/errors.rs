use axum::http::StatusCode;
use subpay_core::domain::value_objects::{
    payment_gateway::GatewayError, reconciliation::StoreError,
};
use thiserror::Error;
use uuid::Uuid;

/// Why a promo code cannot be redeemed. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PromoError {
    #[error("promo code not found")]
    NotFound,
    #[error("promo code is inactive")]
    Inactive,
    #[error("promo code is not valid yet")]
    NotYetValid,
    #[error("promo code has expired")]
    Expired,
    #[error("promo code usage limit reached")]
    Exhausted,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("payment not found")]
    PaymentNotFound,
    #[error("plan not found")]
    PlanNotFound,
    #[error("plan is not available for this bot")]
    PlanUnavailable,
    #[error("user not found")]
    UserMissing,
    #[error("subscription duration is required when the payment has no plan")]
    DurationRequired,
    #[error(transparent)]
    Promo(#[from] PromoError),
    #[error("payment is already finalized")]
    AlreadyFinalized,
    #[error("payment {payment_id} was canceled")]
    PaymentCanceled { payment_id: Uuid },
    #[error("unknown remote payment status: {0}")]
    UnknownRemoteStatus(String),
    #[error("payment gateway is not configured for this bot")]
    GatewayNotConfigured,
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("payment gateway rejected the request: {0}")]
    GatewayRejected(String),
    #[error("storage conflict: {0}")]
    StorageConflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReconcileError {
    /// Transient failures: the payment stays pending and a later trigger resolves it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::GatewayUnavailable(_) | ReconcileError::StorageConflict(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ReconcileError::PaymentNotFound
            | ReconcileError::PlanNotFound
            | ReconcileError::UserMissing => StatusCode::NOT_FOUND,
            ReconcileError::PlanUnavailable
            | ReconcileError::DurationRequired
            | ReconcileError::Promo(_) => StatusCode::BAD_REQUEST,
            ReconcileError::AlreadyFinalized | ReconcileError::PaymentCanceled { .. } => {
                StatusCode::CONFLICT
            }
            ReconcileError::UnknownRemoteStatus(_) | ReconcileError::GatewayRejected(_) => {
                StatusCode::BAD_GATEWAY
            }
            ReconcileError::GatewayNotConfigured
            | ReconcileError::GatewayUnavailable(_)
            | ReconcileError::StorageConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            ReconcileError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(reason) => ReconcileError::StorageConflict(reason),
            StoreError::Other(err) => ReconcileError::Internal(err),
        }
    }
}

impl From<GatewayError> for ReconcileError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected { status, message } => {
                ReconcileError::GatewayRejected(format!("HTTP {status}: {message}"))
            }
            // A garbled answer leaves the payment as undecided as a timeout does.
            GatewayError::Unavailable(reason) | GatewayError::InvalidResponse(reason) => {
                ReconcileError::GatewayUnavailable(reason)
            }
        }
    }
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(ReconcileError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(ReconcileError::StorageConflict("deadlock".into()).is_retryable());
        assert!(!ReconcileError::PaymentCanceled { payment_id: Uuid::nil() }.is_retryable());
        assert!(!ReconcileError::Promo(PromoError::Exhausted).is_retryable());
        assert!(!ReconcileError::UnknownRemoteStatus("refunded".into()).is_retryable());
    }

    #[test]
    fn store_and_gateway_errors_keep_their_kind() {
        let conflict: ReconcileError = StoreError::Conflict("lock timeout".into()).into();
        assert!(matches!(conflict, ReconcileError::StorageConflict(_)));
        assert_eq!(conflict.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let rejected: ReconcileError = GatewayError::Rejected {
            status: 400,
            message: "amount must be positive".into(),
        }
        .into();
        assert_eq!(rejected.status_code(), StatusCode::BAD_GATEWAY);

        let garbled: ReconcileError = GatewayError::InvalidResponse("eof".into()).into();
        assert!(garbled.is_retryable());
    }
}
