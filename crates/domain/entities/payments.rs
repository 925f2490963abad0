use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        enums::payment_statuses::PaymentStatus, payment_payload::PaymentPayload,
    },
    infra::db::postgres::schema::payments,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub external_id: Option<String>,
    pub status: String,
    pub description: Option<String>,
    pub payload: serde_json::Value,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentEntity {
    /// `None` for a status string outside the known set; callers treat it as a corrupt row.
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_str(&self.status)
    }

    /// Typed view over the JSON payload. Unknown keys are preserved on write-back.
    pub fn typed_payload(&self) -> PaymentPayload {
        PaymentPayload::from_value(&self.payload)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub bot_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub external_id: Option<String>,
    pub status: String,
    pub description: Option<String>,
    pub payload: serde_json::Value,
}

/// Column set written by the state machine when a payment is re-evaluated under its row lock.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentStateUpdate {
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
}
