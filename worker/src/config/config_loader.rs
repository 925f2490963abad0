use anyhow::{Result, bail};
use backend::config::config_loader::{
    bot_api, database, optional, required, with_default, yookassa,
};

use super::config_model::{
    DotEnvyConfig, InternalApi, PaymentPolling, SubscriptionLifecycle, WorkerServer,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    load_with(&|name| std::env::var(name).ok())
}

pub fn load_with(lookup: &dyn Fn(&str) -> Option<String>) -> Result<DotEnvyConfig> {
    let worker_server = WorkerServer {
        port: required(lookup, "SERVER_PORT_WORKER")?,
        body_limit: required(lookup, "SERVER_BODY_LIMIT")?,
        timeout: required(lookup, "SERVER_TIMEOUT")?,
    };

    let payment_polling = PaymentPolling {
        interval_secs: with_default(lookup, "PAYMENT_POLL_INTERVAL_SECS", 120)?,
        batch_size: with_default(lookup, "PAYMENT_POLL_BATCH_SIZE", 20)?,
    };
    if payment_polling.interval_secs == 0 || payment_polling.batch_size <= 0 {
        bail!("PAYMENT_POLL_INTERVAL_SECS and PAYMENT_POLL_BATCH_SIZE must be positive");
    }

    let subscription_lifecycle = SubscriptionLifecycle {
        interval_secs: with_default(lookup, "SUBSCRIPTION_SWEEP_INTERVAL_SECS", 3600)?,
        reminder_cooldown_hours: with_default(lookup, "REMINDER_COOLDOWN_HOURS", 20)?,
    };
    if subscription_lifecycle.interval_secs == 0 {
        bail!("SUBSCRIPTION_SWEEP_INTERVAL_SECS must be positive");
    }

    Ok(DotEnvyConfig {
        worker_server,
        database: database(lookup)?,
        yookassa: yookassa(lookup)?,
        bot_api: bot_api(lookup)?,
        payment_polling,
        subscription_lifecycle,
        internal_api: InternalApi {
            sync_token: optional(lookup, "INTERNAL_SYNC_TOKEN"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<String, String> {
        [
            ("SERVER_PORT_WORKER", "8081"),
            ("SERVER_BODY_LIMIT", "1"),
            ("SERVER_TIMEOUT", "30"),
            ("DATABASE_URL", "postgres://localhost/subpay"),
            ("YOOKASSA_RETURN_URL", "https://t.me/shop_bot"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn loop_settings_default_sensibly() {
        let vars = base();
        let config = load_with(&|name| vars.get(name).cloned()).unwrap();

        assert_eq!(config.payment_polling.interval_secs, 120);
        assert_eq!(config.payment_polling.batch_size, 20);
        assert_eq!(config.subscription_lifecycle.interval_secs, 3600);
        assert_eq!(config.subscription_lifecycle.reminder_cooldown_hours, 20);
        assert!(config.internal_api.sync_token.is_none());
    }

    #[test]
    fn rejects_zero_batch() {
        let mut vars = base();
        vars.insert("PAYMENT_POLL_BATCH_SIZE".into(), "0".into());
        assert!(load_with(&|name| vars.get(name).cloned()).is_err());
    }
}
