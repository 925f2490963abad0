use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::value_objects::enums::remote_statuses::RemoteStatus;

/// Shop credentials used both to call the gateway and to authenticate its webhooks.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayCredentials {
    pub shop_id: String,
    pub secret_key: String,
}

impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("shop_id", &self.shop_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateGatewayPayment {
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub metadata: Value,
    pub return_url: String,
    /// Sent as the provider idempotence key so a retried create never double-charges.
    pub idempotence_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedGatewayPayment {
    pub external_id: String,
    pub confirmation_url: Option<String>,
    pub status: RemoteStatus,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePayment {
    pub external_id: String,
    pub status: RemoteStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub raw: Value,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Timeout, connection failure, throttling or 5xx. The payment stays pending.
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
    #[error("payment gateway rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("payment gateway returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Webhook body pushed by the gateway: `{event, object: {id, status, paid_at?, ...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayNotification {
    #[serde(default)]
    pub event: Option<String>,
    pub object: GatewayNotificationObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayNotificationObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub captured_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Parses the gateway's ISO-8601 timestamps, preferring `paid_at` over `captured_at`.
pub fn remote_paid_at(paid_at: Option<&str>, captured_at: Option<&str>) -> Option<DateTime<Utc>> {
    paid_at
        .and_then(parse_remote_timestamp)
        .or_else(|| captured_at.and_then(parse_remote_timestamp))
}

fn parse_remote_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn paid_at_wins_over_captured_at() {
        let paid_at = remote_paid_at(
            Some("2024-03-01T10:00:00.000Z"),
            Some("2024-03-01T09:00:00.000Z"),
        );
        assert_eq!(paid_at, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single());
    }

    #[test]
    fn falls_back_to_captured_at_and_ignores_garbage() {
        let paid_at = remote_paid_at(Some("not-a-date"), Some("2024-03-01T09:00:00+03:00"));
        assert_eq!(paid_at, Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).single());
        assert_eq!(remote_paid_at(None, None), None);
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = GatewayCredentials {
            shop_id: "123".to_string(),
            secret_key: "live_secret".to_string(),
        };
        assert!(!format!("{creds:?}").contains("live_secret"));
    }
}
