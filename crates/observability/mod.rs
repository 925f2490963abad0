mod config;
mod layer;
mod alert_queue;
mod telegram;

use anyhow::Result;
use config::ObservabilityConfig;
use layer::AlertLayer;
use alert_queue::AlertQueue;
use std::sync::Arc;
use telegram::TelegramAlertSink;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Installs the global subscriber: local-time fmt output filtered by `RUST_LOG` (default
/// `info`) plus, when configured, Telegram alerts for events at or above
/// `TELEGRAM_ALERT_LEVEL`.
///
/// Must be called from inside a Tokio runtime because the alert queue spawns a task.
pub fn init_observability(component: &str) -> Result<()> {
    let config = ObservabilityConfig::from_env(component);
    let mut warnings = config.warnings.clone();

    let alert_layer = match config.telegram.as_ref() {
        Some(telegram) => {
            match TelegramAlertSink::new(
                &telegram.api_url,
                &telegram.bot_token,
                telegram.chat_id.clone(),
            ) {
                Ok(sink) => {
                    let alerts = AlertQueue::spawn(vec![Arc::new(sink)]);
                    Some(
                        AlertLayer::new(
                            alerts,
                            config.service_context.clone(),
                            telegram.min_level,
                        )
                        .with_filter(LevelFilter::from_level(telegram.min_level)),
                    )
                }
                Err(err) => {
                    warnings.push(format!("telegram alert client could not be built: {err}"));
                    None
                }
            }
        }
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    let alerts_enabled = alert_layer.is_some();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(alert_layer)
        .with(env_filter)
        .try_init()?;

    let ctx = &config.service_context;
    for warning in &warnings {
        warn!(
            service = %ctx.service_name,
            environment = %ctx.environment,
            component = %ctx.component,
            warning = %warning,
            "observability: config warning"
        );
    }

    info!(
        service = %ctx.service_name,
        environment = %ctx.environment,
        component = %ctx.component,
        alerts_enabled,
        "observability: initialized"
    );

    Ok(())
}
