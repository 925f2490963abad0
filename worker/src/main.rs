use anyhow::Result;
use backend::services;
use chrono::Duration as ChronoDuration;
use std::{sync::Arc, time::Duration};
use subpay_core::{
    domain::repositories::{
        notification_marks::NotificationMarkRepository,
        subscription_lifecycle::SubscriptionLifecycleRepository,
    },
    infra::db::{
        postgres::postgres_connection,
        repositories::{
            notification_marks::NotificationMarkPostgres,
            subscription_lifecycle::SubscriptionLifecyclePostgres,
        },
    },
};
use tracing::{error, info};
use worker::{
    axum_http, config, payment_polling, subscription_lifecycle,
    usecases::subscription_lifecycle::SubscriptionLifecycleUseCase,
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Worker exited with error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    subpay_core::observability::init_observability("worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.lock_timeout_ms,
    )?;
    info!("Postgres connection has been established");

    let db_pool_arc = Arc::new(postgres_pool);

    let services = services::build(
        Arc::clone(&db_pool_arc),
        &dotenvy_env.yookassa,
        &dotenvy_env.bot_api,
    )?;

    let lifecycle_repository: Arc<dyn SubscriptionLifecycleRepository + Send + Sync> =
        Arc::new(SubscriptionLifecyclePostgres::new(Arc::clone(&db_pool_arc)));
    let mark_repository: Arc<dyn NotificationMarkRepository + Send + Sync> =
        Arc::new(NotificationMarkPostgres::new(Arc::clone(&db_pool_arc)));

    let lifecycle_usecase = Arc::new(SubscriptionLifecycleUseCase::new(
        lifecycle_repository,
        mark_repository,
        Arc::clone(&services.notifier),
        Arc::clone(&services.channel_access),
        ChronoDuration::hours(dotenvy_env.subscription_lifecycle.reminder_cooldown_hours),
    ));

    let payment_poll_loop = tokio::spawn(payment_polling::worker::run(
        Arc::clone(&services.reconciler),
        Duration::from_secs(dotenvy_env.payment_polling.interval_secs),
        dotenvy_env.payment_polling.batch_size,
    ));

    let subscription_lifecycle_loop = tokio::spawn(subscription_lifecycle::worker::run(
        lifecycle_usecase,
        Duration::from_secs(dotenvy_env.subscription_lifecycle.interval_secs),
    ));

    let server_config = Arc::clone(&dotenvy_env);
    let server_reconciler = Arc::clone(&services.reconciler);
    let internal_server =
        tokio::spawn(async move { axum_http::http_serve::start(server_config, server_reconciler).await });

    tokio::select! {
        result = payment_poll_loop => result??,
        result = subscription_lifecycle_loop => result??,
        result = internal_server => result??,
    };

    Ok(())
}
