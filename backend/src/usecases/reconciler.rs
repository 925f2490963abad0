use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use subpay_core::domain::{
    entities::payments::PaymentEntity,
    repositories::{
        channel_access::ChannelAccessGranter, notifications::NotificationSink,
        payment_gateway::PaymentGateway,
        payment_provider_credentials::PaymentProviderCredentialRepository,
        payments::PaymentRepository, reconciliation::ReconciliationStore,
    },
    value_objects::{
        channel_access::ChannelInvite,
        enums::{payment_statuses::PaymentStatus, row_lock_modes::RowLockMode},
        payment_gateway::{GatewayCredentials, GatewayError},
        reconciliation::{PaymentRef, RemoteObservation},
    },
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    errors::{ReconcileError, ReconcileResult},
    payment_state_machine::{AdvanceOutcome, PaymentStateMachine},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    Applied,
    UnknownPayment,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Succeeded {
        payment_id: Uuid,
        subscription_end: Option<DateTime<Utc>>,
    },
    /// `deferred` is set when the gateway could not be reached; a later sweep resolves it.
    Pending { payment_id: Uuid, deferred: bool },
    Canceled { payment_id: Uuid },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub succeeded: usize,
    pub canceled: usize,
    pub still_pending: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Webhook, manual confirmation and poll-sweep entry points over the payment state machine.
pub struct Reconciler<S>
where
    S: ReconciliationStore + 'static,
{
    state_machine: PaymentStateMachine<S>,
    payment_repository: Arc<dyn PaymentRepository + Send + Sync>,
    credential_repository: Arc<dyn PaymentProviderCredentialRepository + Send + Sync>,
    gateway: Arc<dyn PaymentGateway + Send + Sync>,
    notifier: Arc<dyn NotificationSink + Send + Sync>,
    channel_access: Arc<dyn ChannelAccessGranter + Send + Sync>,
}

impl<S> Reconciler<S>
where
    S: ReconciliationStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        payment_repository: Arc<dyn PaymentRepository + Send + Sync>,
        credential_repository: Arc<dyn PaymentProviderCredentialRepository + Send + Sync>,
        gateway: Arc<dyn PaymentGateway + Send + Sync>,
        notifier: Arc<dyn NotificationSink + Send + Sync>,
        channel_access: Arc<dyn ChannelAccessGranter + Send + Sync>,
    ) -> Self {
        Self {
            state_machine: PaymentStateMachine::new(store),
            payment_repository,
            credential_repository,
            gateway,
            notifier,
            channel_access,
        }
    }

    /// Applies a pushed gateway notification. The caller has already authenticated it.
    ///
    /// `tenant` is the bot the authenticating credentials belong to (`None` for shared
    /// credentials); payments of other bots are treated as unknown.
    ///
    /// Only transient failures are returned as errors so the gateway redelivers; every other
    /// outcome is acknowledged.
    pub async fn handle_webhook(
        &self,
        tenant: Option<Uuid>,
        external_id: &str,
        observation: RemoteObservation,
    ) -> ReconcileResult<WebhookAck> {
        let payment_ref = PaymentRef::External {
            provider: self.gateway.provider(),
            external_id: external_id.to_string(),
            bot_id: tenant,
        };

        match self
            .state_machine
            .advance(payment_ref, RowLockMode::Wait, observation)
            .await
        {
            Ok(outcome) => {
                self.after_commit(&outcome).await;
                Ok(WebhookAck::Applied)
            }
            Err(ReconcileError::PaymentNotFound) => {
                warn!(%external_id, tenant = ?tenant, "reconciler: webhook for unknown payment acknowledged");
                Ok(WebhookAck::UnknownPayment)
            }
            Err(ReconcileError::PaymentCanceled { payment_id }) => {
                self.announce_cancellation(payment_id).await;
                Ok(WebhookAck::Applied)
            }
            Err(ReconcileError::AlreadyFinalized) | Err(ReconcileError::UnknownRemoteStatus(_)) => {
                Ok(WebhookAck::Ignored)
            }
            Err(err) => {
                error!(%external_id, error = ?err, "reconciler: webhook processing failed");
                Err(err)
            }
        }
    }

    /// Asks the gateway for the current status, then advances with that observation.
    pub async fn confirm_payment(&self, payment_id: Uuid) -> ReconcileResult<ConfirmOutcome> {
        let payment = self
            .payment_repository
            .find_by_id(payment_id)
            .await
            .map_err(|err| {
                error!(%payment_id, db_error = ?err, "reconciler: failed to load payment");
                ReconcileError::Internal(err)
            })?
            .ok_or(ReconcileError::PaymentNotFound)?;

        match payment.payment_status() {
            Some(PaymentStatus::Succeeded) => return self.already_succeeded(&payment).await,
            Some(PaymentStatus::Canceled) => return Ok(ConfirmOutcome::Canceled { payment_id }),
            _ => {}
        }

        let Some(external_id) = payment.external_id.clone() else {
            info!(%payment_id, "reconciler: payment has no gateway id yet");
            return Ok(ConfirmOutcome::Pending {
                payment_id,
                deferred: false,
            });
        };

        let credentials = self.credentials_for(payment.bot_id).await?;
        let remote = match self.gateway.get_payment(&credentials, &external_id).await {
            Ok(remote) => remote,
            Err(GatewayError::Unavailable(reason)) => {
                warn!(%payment_id, reason = %reason, "reconciler: gateway unavailable; confirmation deferred");
                return Ok(ConfirmOutcome::Pending {
                    payment_id,
                    deferred: true,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let observation =
            RemoteObservation::new(remote.status, remote.paid_at).with_snapshot(remote.raw);

        match self
            .state_machine
            .advance(PaymentRef::Id(payment_id), RowLockMode::Wait, observation)
            .await
        {
            Ok(outcome) => {
                self.after_commit(&outcome).await;
                Ok(match outcome {
                    AdvanceOutcome::Activated { subscription, .. } => ConfirmOutcome::Succeeded {
                        payment_id,
                        subscription_end: Some(subscription.ends_at),
                    },
                    AdvanceOutcome::AlreadySucceeded { subscription, .. } => {
                        ConfirmOutcome::Succeeded {
                            payment_id,
                            subscription_end: subscription.map(|s| s.ends_at),
                        }
                    }
                    AdvanceOutcome::StillPending { .. } | AdvanceOutcome::Skipped => {
                        ConfirmOutcome::Pending {
                            payment_id,
                            deferred: false,
                        }
                    }
                })
            }
            Err(ReconcileError::PaymentCanceled { payment_id }) => {
                self.announce_cancellation(payment_id).await;
                Ok(ConfirmOutcome::Canceled { payment_id })
            }
            Err(ReconcileError::AlreadyFinalized) => Ok(ConfirmOutcome::Canceled { payment_id }),
            Err(err) => Err(err),
        }
    }

    /// Polls the gateway for a bounded batch of pending payments.
    ///
    /// Per-payment failures are counted and logged; they never abort the batch.
    pub async fn sweep_pending(&self, limit: i64) -> ReconcileResult<SweepReport> {
        let candidates = self
            .payment_repository
            .list_pending_for_sweep(limit)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "reconciler: failed to list pending payments");
                ReconcileError::Internal(err)
            })?;

        let mut report = SweepReport::default();
        let mut credentials: HashMap<Uuid, Option<GatewayCredentials>> = HashMap::new();

        for payment in candidates {
            report.scanned += 1;

            let Some(external_id) = payment.external_id.clone() else {
                report.skipped += 1;
                continue;
            };

            let creds = match credentials.get(&payment.bot_id) {
                Some(cached) => cached.clone(),
                None => {
                    let resolved = match self.credentials_for(payment.bot_id).await {
                        Ok(creds) => Some(creds),
                        Err(err) => {
                            warn!(bot_id = %payment.bot_id, error = ?err, "reconciler: no gateway credentials for bot");
                            None
                        }
                    };
                    credentials.insert(payment.bot_id, resolved.clone());
                    resolved
                }
            };
            let Some(creds) = creds else {
                report.failed += 1;
                continue;
            };

            let remote = match self.gateway.get_payment(&creds, &external_id).await {
                Ok(remote) => remote,
                Err(err) => {
                    warn!(payment_id = %payment.id, error = %err, "reconciler: gateway lookup failed during sweep");
                    report.failed += 1;
                    continue;
                }
            };

            let observation =
                RemoteObservation::new(remote.status, remote.paid_at).with_snapshot(remote.raw);

            match self
                .state_machine
                .advance(PaymentRef::Id(payment.id), RowLockMode::SkipLocked, observation)
                .await
            {
                Ok(outcome) => {
                    match &outcome {
                        AdvanceOutcome::Activated { .. } => report.succeeded += 1,
                        AdvanceOutcome::StillPending { .. } => report.still_pending += 1,
                        AdvanceOutcome::AlreadySucceeded { .. } | AdvanceOutcome::Skipped => {
                            report.skipped += 1
                        }
                    }
                    self.after_commit(&outcome).await;
                }
                Err(ReconcileError::PaymentCanceled { payment_id }) => {
                    report.canceled += 1;
                    self.announce_cancellation(payment_id).await;
                }
                Err(ReconcileError::AlreadyFinalized) => report.skipped += 1,
                Err(err) => {
                    warn!(payment_id = %payment.id, error = ?err, "reconciler: sweep item failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            succeeded = report.succeeded,
            canceled = report.canceled,
            still_pending = report.still_pending,
            skipped = report.skipped,
            failed = report.failed,
            "reconciler: sweep finished"
        );

        Ok(report)
    }

    async fn credentials_for(&self, bot_id: Uuid) -> ReconcileResult<GatewayCredentials> {
        let provider = self.gateway.provider();
        let record = self
            .credential_repository
            .find_for_bot(provider, bot_id)
            .await
            .map_err(|err| {
                error!(%bot_id, db_error = ?err, "reconciler: failed to load gateway credentials");
                ReconcileError::Internal(err)
            })?
            .ok_or(ReconcileError::GatewayNotConfigured)?;

        Ok(GatewayCredentials {
            shop_id: record.shop_id,
            secret_key: record.secret_key,
        })
    }

    async fn already_succeeded(&self, payment: &PaymentEntity) -> ReconcileResult<ConfirmOutcome> {
        let subscription = self
            .payment_repository
            .find_subscription_for_payment(payment.id)
            .await
            .map_err(ReconcileError::Internal)?;

        Ok(ConfirmOutcome::Succeeded {
            payment_id: payment.id,
            subscription_end: subscription.map(|s| s.ends_at),
        })
    }

    /// Side effects of a fresh activation. Failures are logged and never undo the commit.
    async fn after_commit(&self, outcome: &AdvanceOutcome) {
        let AdvanceOutcome::Activated {
            payment,
            subscription,
            user,
            plan,
            ..
        } = outcome
        else {
            return;
        };

        let invites = match self
            .channel_access
            .grant(payment.bot_id, user.telegram_id, payment.plan_id)
            .await
        {
            Ok(invites) => invites,
            Err(err) => {
                warn!(payment_id = %payment.id, error = ?err, "reconciler: channel access grant failed");
                Vec::new()
            }
        };

        let amount = format_amount(payment.amount, &payment.currency);
        let text = payment_success_text(
            &amount,
            plan.as_ref().map(|p| p.name.as_str()),
            subscription.ends_at,
            Utc::now(),
            &invites,
        );
        if let Err(err) = self
            .notifier
            .send_user_message(payment.bot_id, user.telegram_id, text)
            .await
        {
            warn!(payment_id = %payment.id, error = ?err, "reconciler: user notification failed");
        }

        if let Err(err) = self
            .notifier
            .send_admin_message(format!("Payment #{} confirmed. Amount: {amount}", payment.id))
            .await
        {
            warn!(payment_id = %payment.id, error = ?err, "reconciler: admin notification failed");
        }
    }

    async fn announce_cancellation(&self, payment_id: Uuid) {
        if let Err(err) = self
            .notifier
            .send_admin_message(format!("Payment #{payment_id} was canceled by the gateway."))
            .await
        {
            warn!(%payment_id, error = ?err, "reconciler: admin notification failed");
        }
    }
}

pub fn format_amount(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {}", amount.round_dp(2), currency)
}

pub fn payment_success_text(
    amount: &str,
    plan_name: Option<&str>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
    invites: &[ChannelInvite],
) -> String {
    let days_left = (ends_at - now).num_days().max(0);
    let mut lines = vec![
        "Payment received, thank you!".to_string(),
        format!("Amount: {amount}"),
    ];
    if let Some(plan_name) = plan_name {
        lines.push(format!("Plan: {plan_name}"));
    }
    lines.push(format!(
        "Subscription active until {} ({days_left} days left).",
        ends_at.format("%d.%m.%Y")
    ));

    let links: Vec<String> = invites
        .iter()
        .filter_map(|invite| {
            invite
                .link
                .as_ref()
                .map(|link| format!("{}: {link}", invite.channel_name))
        })
        .collect();
    if !links.is_empty() {
        lines.push(String::new());
        lines.push("Your channels:".to_string());
        lines.extend(links);
    }

    lines.join("\n")
}
