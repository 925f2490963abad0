use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::enums::notification_kinds::NotificationKind;

#[automock]
#[async_trait]
pub trait NotificationMarkRepository {
    /// Atomically records `now` as the last send time unless a mark newer than `cooldown`
    /// exists. Returns whether the caller won the right to send.
    async fn try_claim(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool>;

    async fn release(&self, user_id: Uuid, kind: NotificationKind) -> Result<()>;
}
