use backend::config::config_model::{BotApi, Database, YooKassa};

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub worker_server: WorkerServer,
    pub database: Database,
    pub yookassa: YooKassa,
    pub bot_api: BotApi,
    pub payment_polling: PaymentPolling,
    pub subscription_lifecycle: SubscriptionLifecycle,
    pub internal_api: InternalApi,
}

#[derive(Debug, Clone)]
pub struct WorkerServer {
    pub port: u16,
    pub timeout: u64,
    pub body_limit: u64,
}

#[derive(Debug, Clone)]
pub struct PaymentPolling {
    pub interval_secs: u64,
    pub batch_size: i64,
}

#[derive(Debug, Clone)]
pub struct SubscriptionLifecycle {
    pub interval_secs: u64,
    pub reminder_cooldown_hours: i64,
}

#[derive(Clone)]
pub struct InternalApi {
    pub sync_token: Option<String>,
}

impl std::fmt::Debug for InternalApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalApi")
            .field("sync_token", &self.sync_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
