use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use subpay_core::domain::{
    entities::{payments::InsertPaymentEntity, plans::PlanEntity, users::UserEntity},
    repositories::{
        notifications::NotificationSink, payment_gateway::PaymentGateway,
        payment_provider_credentials::PaymentProviderCredentialRepository,
        payments::PaymentRepository, plans::PlanRepository, users::UserRepository,
    },
    value_objects::{
        enums::payment_statuses::PaymentStatus,
        payment_gateway::{CreateGatewayPayment, GatewayCredentials},
        payment_payload::{PaymentPayload, PromoApplication},
    },
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    errors::{ReconcileError, ReconcileResult},
    promo_ledger::PromoLedger,
    reconciler::format_amount,
};

const DEFAULT_DESCRIPTION: &str = "Subscription";

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentCommand {
    pub bot_id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub telegram_id: Option<i64>,
    pub plan_id: Uuid,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutResult {
    pub payment_id: Uuid,
    pub external_id: String,
    pub confirmation_url: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub original_price: Decimal,
    pub discount_amount: Decimal,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub duration_days: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
}

pub struct CheckoutUseCase {
    user_repository: Arc<dyn UserRepository + Send + Sync>,
    plan_repository: Arc<dyn PlanRepository + Send + Sync>,
    payment_repository: Arc<dyn PaymentRepository + Send + Sync>,
    credential_repository: Arc<dyn PaymentProviderCredentialRepository + Send + Sync>,
    gateway: Arc<dyn PaymentGateway + Send + Sync>,
    notifier: Arc<dyn NotificationSink + Send + Sync>,
    promo_ledger: PromoLedger,
    return_url: String,
}

impl CheckoutUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_repository: Arc<dyn UserRepository + Send + Sync>,
        plan_repository: Arc<dyn PlanRepository + Send + Sync>,
        payment_repository: Arc<dyn PaymentRepository + Send + Sync>,
        credential_repository: Arc<dyn PaymentProviderCredentialRepository + Send + Sync>,
        gateway: Arc<dyn PaymentGateway + Send + Sync>,
        notifier: Arc<dyn NotificationSink + Send + Sync>,
        promo_ledger: PromoLedger,
        return_url: String,
    ) -> Self {
        Self {
            user_repository,
            plan_repository,
            payment_repository,
            credential_repository,
            gateway,
            notifier,
            promo_ledger,
            return_url,
        }
    }

    pub async fn create_payment(
        &self,
        command: CreatePaymentCommand,
    ) -> ReconcileResult<CheckoutResult> {
        let user = self.resolve_user(&command).await?;
        let plan = self.purchasable_plan(command.bot_id, command.plan_id).await?;

        let promo = match command.promo_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(
                self.promo_ledger
                    .validate(command.bot_id, code, plan.price_amount, Utc::now())
                    .await?,
            ),
            _ => None,
        };

        let original_price = plan.price_amount.round_dp(2);
        let (amount, discount_amount) = match &promo {
            Some(promo) => (promo.final_price, promo.discount_amount),
            None => (original_price, Decimal::ZERO),
        };

        // Resolved before inserting so a bot without a shop never leaves orphan pending rows.
        let credentials = self.credentials_for(command.bot_id).await?;

        let payload = PaymentPayload {
            promo_code: promo.clone(),
            duration_days: Some(plan.duration_days),
            ..PaymentPayload::default()
        };
        let description = command
            .description
            .clone()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| {
                if plan.name.trim().is_empty() {
                    DEFAULT_DESCRIPTION.to_string()
                } else {
                    plan.name.clone()
                }
            });

        let payment = self
            .payment_repository
            .create_pending_payment(InsertPaymentEntity {
                bot_id: command.bot_id,
                user_id: user.id,
                plan_id: Some(plan.id),
                amount,
                currency: plan.price_currency.clone(),
                provider: self.gateway.provider().as_str().to_string(),
                external_id: None,
                status: PaymentStatus::Pending.as_str().to_string(),
                description: Some(description.clone()),
                payload: payload.to_value(),
            })
            .await
            .map_err(|err| {
                error!(user_id = %user.id, db_error = ?err, "checkout: failed to insert payment");
                ReconcileError::Internal(err)
            })?;

        let request = CreateGatewayPayment {
            amount,
            currency: plan.price_currency.clone(),
            description,
            metadata: gateway_metadata(payment.id, &user, &plan, promo.as_ref()),
            return_url: self.return_url.clone(),
            idempotence_key: payment.id.to_string(),
        };

        let created = self
            .gateway
            .create_payment(&credentials, request)
            .await
            .inspect_err(|err| {
                warn!(payment_id = %payment.id, error = %err, "checkout: gateway refused payment creation");
            })?;

        let mut stored_payload = payload;
        stored_payload.gateway_payment = Some(created.raw.clone());
        self.payment_repository
            .attach_gateway_payment(
                payment.id,
                created.external_id.clone(),
                stored_payload.to_value(),
            )
            .await
            .map_err(|err| {
                error!(payment_id = %payment.id, db_error = ?err, "checkout: failed to store gateway id");
                ReconcileError::Internal(err)
            })?;

        info!(
            payment_id = %payment.id,
            external_id = %created.external_id,
            amount = %amount,
            "checkout: payment created"
        );

        if let Err(err) = self
            .notifier
            .send_admin_message(format!(
                "Invoice #{} created for {}",
                payment.id,
                format_amount(amount, &plan.price_currency)
            ))
            .await
        {
            warn!(payment_id = %payment.id, error = ?err, "checkout: admin notification failed");
        }

        Ok(CheckoutResult {
            payment_id: payment.id,
            external_id: created.external_id,
            confirmation_url: created.confirmation_url,
            amount,
            currency: plan.price_currency,
            original_price,
            discount_amount,
            plan_id: plan.id,
            plan_name: plan.name,
            duration_days: plan.duration_days,
            promo_code: promo.map(|promo| promo.promo_code),
        })
    }

    /// Prices a promo code against a plan without reserving anything.
    pub async fn preview_promo(
        &self,
        bot_id: Uuid,
        plan_id: Uuid,
        code: &str,
    ) -> ReconcileResult<PromoApplication> {
        let plan = self.purchasable_plan(bot_id, plan_id).await?;
        self.promo_ledger
            .validate(bot_id, code, plan.price_amount, Utc::now())
            .await
    }

    async fn resolve_user(&self, command: &CreatePaymentCommand) -> ReconcileResult<UserEntity> {
        let found = match (command.user_id, command.telegram_id) {
            (Some(user_id), _) => self.user_repository.find_by_id(user_id).await,
            (None, Some(telegram_id)) => {
                self.user_repository
                    .find_by_telegram_id(command.bot_id, telegram_id)
                    .await
            }
            (None, None) => return Err(ReconcileError::UserMissing),
        }
        .map_err(|err| {
            error!(bot_id = %command.bot_id, db_error = ?err, "checkout: failed to load user");
            ReconcileError::Internal(err)
        })?;

        found
            .filter(|user| user.bot_id == command.bot_id)
            .ok_or(ReconcileError::UserMissing)
    }

    async fn purchasable_plan(&self, bot_id: Uuid, plan_id: Uuid) -> ReconcileResult<PlanEntity> {
        let plan = self
            .plan_repository
            .find_by_id(plan_id)
            .await
            .map_err(|err| {
                error!(%plan_id, db_error = ?err, "checkout: failed to load plan");
                ReconcileError::Internal(err)
            })?
            .ok_or(ReconcileError::PlanNotFound)?;

        if plan.bot_id != bot_id || !plan.is_active {
            return Err(ReconcileError::PlanUnavailable);
        }
        Ok(plan)
    }

    async fn credentials_for(&self, bot_id: Uuid) -> ReconcileResult<GatewayCredentials> {
        let record = self
            .credential_repository
            .find_for_bot(self.gateway.provider(), bot_id)
            .await
            .map_err(ReconcileError::Internal)?
            .ok_or_else(|| {
                warn!(%bot_id, "checkout: bot has no gateway credentials");
                ReconcileError::GatewayNotConfigured
            })?;

        Ok(GatewayCredentials {
            shop_id: record.shop_id,
            secret_key: record.secret_key,
        })
    }
}

fn gateway_metadata(
    payment_id: Uuid,
    user: &UserEntity,
    plan: &PlanEntity,
    promo: Option<&PromoApplication>,
) -> serde_json::Value {
    let mut metadata = json!({
        "payment_id": payment_id.to_string(),
        "user_id": user.id.to_string(),
        "plan_id": plan.id.to_string(),
        "duration_days": plan.duration_days.to_string(),
    });
    if let Some(promo) = promo {
        metadata["promo_code_id"] = json!(promo.promo_code_id.to_string());
    }
    metadata
}
