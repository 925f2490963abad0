use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::error;
use uuid::Uuid;

use crate::domain::value_objects::enums::discount_types::DiscountType;

/// Promo metadata captured at checkout and finalized by the promo ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromoApplication {
    pub promo_code: String,
    pub promo_code_id: Uuid,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub original_price: Decimal,
    pub discount_amount: Decimal,
    pub final_price: Decimal,
    /// `None` until the payment is finalized; `Some(false)` when the usage cap was already
    /// reached at finalization time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
}

/// Typed view of `payments.payload`.
///
/// Known keys are read one by one. A key whose value does not parse stays in `extra` verbatim,
/// so it neither hides its well-formed siblings nor disappears on write-back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentPayload {
    pub promo_code: Option<PromoApplication>,
    /// Duration used when the payment does not reference a plan.
    pub duration_days: Option<i32>,
    pub gateway_payment: Option<Value>,
    pub gateway_event: Option<String>,
    pub extra: Map<String, Value>,
}

impl PaymentPayload {
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };

        let mut extra = map.clone();
        Self {
            promo_code: take_known(&mut extra, "promo_code"),
            duration_days: take_known(&mut extra, "duration_days"),
            gateway_payment: take_known(&mut extra, "gateway_payment"),
            gateway_event: take_known(&mut extra, "gateway_event"),
            extra,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        put_known(&mut map, "promo_code", &self.promo_code);
        put_known(&mut map, "duration_days", &self.duration_days);
        put_known(&mut map, "gateway_payment", &self.gateway_payment);
        put_known(&mut map, "gateway_event", &self.gateway_event);
        Value::Object(map)
    }
}

fn take_known<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let raw = map.get(key)?;
    match serde_json::from_value::<Option<T>>(raw.clone()) {
        Ok(parsed) => {
            map.remove(key);
            parsed
        }
        Err(err) => {
            error!(key, error = %err, "payment_payload: unreadable key kept verbatim");
            None
        }
    }
}

fn put_known<T: Serialize>(map: &mut Map<String, Value>, key: &str, value: &Option<T>) {
    let Some(value) = value else {
        return;
    };
    match serde_json::to_value(value) {
        Ok(value) => {
            map.insert(key.to_string(), value);
        }
        Err(err) => error!(key, error = %err, "payment_payload: failed to serialize key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preserves_unknown_keys_on_write_back() {
        let raw = json!({
            "duration_days": 30,
            "legacy_note": "imported",
        });

        let mut payload = PaymentPayload::from_value(&raw);
        payload.gateway_event = Some("payment.succeeded".to_string());
        let written = payload.to_value();

        assert_eq!(written["duration_days"], json!(30));
        assert_eq!(written["legacy_note"], json!("imported"));
        assert_eq!(written["gateway_event"], json!("payment.succeeded"));
    }

    #[test]
    fn reads_promo_metadata_written_at_checkout() {
        let promo_code_id = Uuid::new_v4();
        let raw = json!({
            "promo_code": {
                "promo_code": "SPRING20",
                "promo_code_id": promo_code_id,
                "discount_type": "percentage",
                "discount_value": "20",
                "original_price": "1000.00",
                "discount_amount": "200.00",
                "final_price": "800.00"
            }
        });

        let payload = PaymentPayload::from_value(&raw);
        let promo = payload.promo_code.unwrap();

        assert_eq!(promo.promo_code_id, promo_code_id);
        assert_eq!(promo.discount_type, DiscountType::Percentage);
        assert_eq!(promo.final_price, Decimal::new(80000, 2));
        assert_eq!(promo.applied, None);
    }

    #[test]
    fn malformed_key_leaves_siblings_readable_and_survives_write_back() {
        let raw = json!({
            "duration_days": 14,
            "gateway_event": 42,
            "promo_code": { "promo_code": "BROKEN" },
        });

        let mut payload = PaymentPayload::from_value(&raw);

        assert_eq!(payload.duration_days, Some(14));
        assert_eq!(payload.gateway_event, None);
        assert_eq!(payload.promo_code, None);
        assert_eq!(payload.extra["gateway_event"], json!(42));

        let untouched = payload.to_value();
        assert_eq!(untouched["promo_code"], json!({ "promo_code": "BROKEN" }));
        assert_eq!(untouched["gateway_event"], json!(42));

        payload.gateway_event = Some("payment.succeeded".to_string());
        let written = payload.to_value();
        assert_eq!(written["gateway_event"], json!("payment.succeeded"));
        assert_eq!(written["duration_days"], json!(14));
    }

    #[test]
    fn null_keys_read_as_absent() {
        let payload = PaymentPayload::from_value(&json!({ "duration_days": null }));

        assert_eq!(payload.duration_days, None);
        assert!(payload.extra.is_empty());
    }

    #[test]
    fn non_object_payload_reads_as_empty() {
        assert_eq!(PaymentPayload::from_value(&Value::Null), PaymentPayload::default());
    }
}
