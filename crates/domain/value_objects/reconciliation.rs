use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::enums::{
    payment_providers::PaymentProvider, remote_statuses::RemoteStatus,
};

/// Identifies the payment a trigger is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRef {
    Id(Uuid),
    /// Gateway id, optionally scoped to the bot whose credentials authenticated the trigger.
    /// A payment owned by another bot resolves as missing.
    External {
        provider: PaymentProvider,
        external_id: String,
        bot_id: Option<Uuid>,
    },
}

impl std::fmt::Display for PaymentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentRef::Id(id) => write!(f, "{id}"),
            PaymentRef::External {
                provider,
                external_id,
                ..
            } => write!(f, "{provider}:{external_id}"),
        }
    }
}

/// What a trigger saw at the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObservation {
    pub status: RemoteStatus,
    pub paid_at: Option<DateTime<Utc>>,
    /// Raw gateway object, stashed into the payment payload.
    pub snapshot: Option<Value>,
    pub event: Option<String>,
}

impl RemoteObservation {
    pub fn new(status: RemoteStatus, paid_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status,
            paid_at,
            snapshot: None,
            event: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Value) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_event(mut self, event: Option<String>) -> Self {
        self.event = event;
        self
    }
}

/// Storage failures surfaced through the reconciliation unit of work.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lock timeout, deadlock, serialization failure or unique race. Safe to retry.
    #[error("storage conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
