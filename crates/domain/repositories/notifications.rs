use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

/// Best-effort message delivery. Callers log failures and move on.
#[automock]
#[async_trait]
pub trait NotificationSink {
    async fn send_user_message(&self, bot_id: Uuid, telegram_id: i64, text: String) -> Result<()>;

    async fn send_admin_message(&self, text: String) -> Result<()>;
}
