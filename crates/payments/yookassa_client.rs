use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, warn};
use url::Url;

use crate::domain::{
    repositories::payment_gateway::PaymentGateway,
    value_objects::{
        enums::{payment_providers::PaymentProvider, remote_statuses::RemoteStatus},
        payment_gateway::{
            CreateGatewayPayment, CreatedGatewayPayment, GatewayCredentials, GatewayError,
            RemotePayment, remote_paid_at,
        },
    },
};

const IDEMPOTENCE_KEY_HEADER: &str = "Idempotence-Key";

/// YooKassa REST client (`/v3/payments`) built on reqwest with HTTP Basic auth
/// (`shop_id:secret_key`).
pub struct YooKassaClient {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResource {
    id: String,
    status: String,
    #[serde(default)]
    paid_at: Option<String>,
    #[serde(default)]
    captured_at: Option<String>,
    #[serde(default)]
    confirmation: Option<Confirmation>,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    #[serde(default)]
    confirmation_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameter: Option<String>,
}

impl YooKassaClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let api_url = api_url.into();
        let parsed = Url::parse(&api_url)
            .map_err(|err| GatewayError::Unavailable(format!("invalid api url {api_url}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GatewayError::Unavailable(format!(
                "unsupported api url scheme: {}",
                parsed.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Unavailable(format!("http client build failed: {err}")))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn payments_url(&self) -> String {
        format!("{}/payments", self.api_url)
    }

    async fn read_payment(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<(PaymentResource, Value), GatewayError> {
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let envelope = serde_json::from_str::<ErrorEnvelope>(&body).ok();
            let message = envelope
                .as_ref()
                .and_then(|e| e.description.clone())
                .unwrap_or_else(|| format!("HTTP {status}"));

            error!(
                status = %status,
                yookassa_error_code = ?envelope.as_ref().and_then(|e| e.code.as_deref()),
                yookassa_error_parameter = ?envelope.as_ref().and_then(|e| e.parameter.as_deref()),
                message = %message,
                "yookassa: {context} failed"
            );

            return Err(classify_status(status, message));
        }

        let raw = resp
            .json::<Value>()
            .await
            .map_err(|err| GatewayError::InvalidResponse(format!("{context}: {err}")))?;
        let payment = serde_json::from_value::<PaymentResource>(raw.clone())
            .map_err(|err| GatewayError::InvalidResponse(format!("{context}: {err}")))?;

        Ok((payment, raw))
    }
}

/// Throttling and server faults are transient; any other non-2xx is a definitive rejection.
fn classify_status(status: StatusCode, message: String) -> GatewayError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::Unavailable(format!("HTTP {status}: {message}"))
    } else {
        GatewayError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn transport_error(err: reqwest::Error, context: &str) -> GatewayError {
    if err.is_timeout() {
        warn!(context, "yookassa: request timed out");
        GatewayError::Unavailable(format!("{context}: request timed out"))
    } else if err.is_connect() {
        warn!(context, "yookassa: connection failed");
        GatewayError::Unavailable(format!("{context}: connection failed"))
    } else if err.is_decode() {
        GatewayError::InvalidResponse(format!("{context}: {err}"))
    } else {
        GatewayError::Unavailable(format!("{context}: {err}"))
    }
}

fn create_body(request: &CreateGatewayPayment) -> Value {
    json!({
        "amount": {
            "value": format!("{:.2}", request.amount.round_dp(2)),
            "currency": request.currency,
        },
        "confirmation": { "type": "redirect", "return_url": request.return_url },
        "capture": true,
        "description": request.description,
        "metadata": request.metadata,
    })
}

#[async_trait]
impl PaymentGateway for YooKassaClient {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::YooKassa
    }

    async fn create_payment(
        &self,
        credentials: &GatewayCredentials,
        request: CreateGatewayPayment,
    ) -> Result<CreatedGatewayPayment, GatewayError> {
        let resp = self
            .http
            .post(self.payments_url())
            .basic_auth(&credentials.shop_id, Some(&credentials.secret_key))
            .header(IDEMPOTENCE_KEY_HEADER, &request.idempotence_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&create_body(&request))
            .send()
            .await
            .map_err(|err| transport_error(err, "create payment"))?;

        let (payment, raw) = Self::read_payment(resp, "create payment").await?;

        Ok(CreatedGatewayPayment {
            external_id: payment.id,
            confirmation_url: payment.confirmation.and_then(|c| c.confirmation_url),
            status: RemoteStatus::parse(&payment.status),
            raw,
        })
    }

    async fn get_payment(
        &self,
        credentials: &GatewayCredentials,
        external_id: &str,
    ) -> Result<RemotePayment, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.payments_url(), external_id))
            .basic_auth(&credentials.shop_id, Some(&credentials.secret_key))
            .send()
            .await
            .map_err(|err| transport_error(err, "get payment"))?;

        let (payment, raw) = Self::read_payment(resp, "get payment").await?;

        Ok(RemotePayment {
            paid_at: remote_paid_at(payment.paid_at.as_deref(), payment.captured_at.as_deref()),
            status: RemoteStatus::parse(&payment.status),
            external_id: payment.id,
            raw,
        })
    }
}
