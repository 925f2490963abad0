use std::{sync::Arc, time::Duration};

use anyhow::Result;
use subpay_core::{
    domain::repositories::{
        bots::BotRepository, channel_access::ChannelAccessGranter, channels::ChannelRepository,
        notifications::NotificationSink, payment_gateway::PaymentGateway,
        payment_provider_credentials::PaymentProviderCredentialRepository,
        payments::PaymentRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            bots::BotPostgres, channels::ChannelPostgres,
            payment_provider_credentials::PaymentProviderCredentialPostgres,
            payments::PaymentPostgres, plans::PlanPostgres, promo_codes::PromoCodePostgres,
            reconciliation::ReconciliationPostgres, users::UserPostgres,
        },
    },
    messaging::{
        channel_access::TelegramChannelAccess,
        notifications::{AdminChat, TelegramNotificationSink},
        telegram_api::TelegramBotApi,
    },
    payments::yookassa_client::YooKassaClient,
};
use tracing::warn;

use crate::{
    config::config_model::{BotApi, YooKassa},
    usecases::{checkout::CheckoutUseCase, promo_ledger::PromoLedger, reconciler::Reconciler},
};

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(15);

pub type PgReconciler = Reconciler<ReconciliationPostgres>;

/// Use cases and adapters shared by the HTTP server and the worker loops.
pub struct Services {
    pub reconciler: Arc<PgReconciler>,
    pub checkout: Arc<CheckoutUseCase>,
    pub credential_repository: Arc<dyn PaymentProviderCredentialRepository + Send + Sync>,
    pub notifier: Arc<dyn NotificationSink + Send + Sync>,
    pub channel_access: Arc<dyn ChannelAccessGranter + Send + Sync>,
}

pub fn build(db_pool: Arc<PgPoolSquad>, yookassa: &YooKassa, bot_api: &BotApi) -> Result<Services> {
    let bot_repository: Arc<dyn BotRepository + Send + Sync> =
        Arc::new(BotPostgres::new(Arc::clone(&db_pool)));
    let channel_repository: Arc<dyn ChannelRepository + Send + Sync> =
        Arc::new(ChannelPostgres::new(Arc::clone(&db_pool)));
    let payment_repository: Arc<dyn PaymentRepository + Send + Sync> =
        Arc::new(PaymentPostgres::new(Arc::clone(&db_pool)));
    let credential_repository: Arc<dyn PaymentProviderCredentialRepository + Send + Sync> =
        Arc::new(PaymentProviderCredentialPostgres::new(Arc::clone(&db_pool)));

    let gateway: Arc<dyn PaymentGateway + Send + Sync> = Arc::new(YooKassaClient::new(
        yookassa.api_url.clone(),
        Duration::from_secs(yookassa.timeout_secs),
    )?);

    let telegram = TelegramBotApi::new(bot_api.telegram_api_url.clone(), TELEGRAM_TIMEOUT)?;
    let admin_chat = match (&bot_api.admin_bot_token, &bot_api.admin_chat_id) {
        (Some(bot_token), Some(chat_id)) => Some(AdminChat {
            bot_token: bot_token.clone(),
            chat_id: chat_id.clone(),
        }),
        _ => {
            warn!("services: ADMIN_BOT_TOKEN or ADMIN_CHAT_ID missing; admin messages disabled");
            None
        }
    };
    let notifier: Arc<dyn NotificationSink + Send + Sync> = Arc::new(
        TelegramNotificationSink::new(telegram.clone(), Arc::clone(&bot_repository), admin_chat),
    );
    let channel_access: Arc<dyn ChannelAccessGranter + Send + Sync> = Arc::new(
        TelegramChannelAccess::new(telegram, bot_repository, channel_repository),
    );

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(ReconciliationPostgres::new(Arc::clone(&db_pool))),
        Arc::clone(&payment_repository),
        Arc::clone(&credential_repository),
        Arc::clone(&gateway),
        Arc::clone(&notifier),
        Arc::clone(&channel_access),
    ));

    let checkout = Arc::new(CheckoutUseCase::new(
        Arc::new(UserPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PlanPostgres::new(Arc::clone(&db_pool))),
        payment_repository,
        Arc::clone(&credential_repository),
        gateway,
        Arc::clone(&notifier),
        PromoLedger::new(Arc::new(PromoCodePostgres::new(db_pool))),
        yookassa.return_url.clone(),
    ));

    Ok(Services {
        reconciler,
        checkout,
        credential_repository,
        notifier,
        channel_access,
    })
}
