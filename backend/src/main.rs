use anyhow::Result;
use backend::axum_http::http_serve;
use backend::config::config_loader;
use backend::services;
use std::sync::Arc;
use subpay_core::infra::db::postgres::postgres_connection;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Backend exited with error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    subpay_core::observability::init_observability("backend")?;

    let dotenvy_env = config_loader::load()?;
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.lock_timeout_ms,
    )?;
    info!("Postgres connection has been established");

    let services = services::build(
        Arc::new(postgres_pool),
        &dotenvy_env.yookassa,
        &dotenvy_env.bot_api,
    )?;

    http_serve::start(Arc::new(dotenvy_env), services).await?;

    Ok(())
}
