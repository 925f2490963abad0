#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub yookassa: YooKassa,
    pub bot_api: BotApi,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct YooKassa {
    pub api_url: String,
    pub return_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone)]
pub struct BotApi {
    pub telegram_api_url: String,
    pub admin_bot_token: Option<String>,
    pub admin_chat_id: Option<String>,
    /// Bearer token required on `/api/v1/bot/*` when set.
    pub api_token: Option<String>,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("telegram_api_url", &self.telegram_api_url)
            .field("admin_bot_token", &self.admin_bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("admin_chat_id", &self.admin_chat_id)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
