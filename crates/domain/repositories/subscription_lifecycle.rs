use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscriptions::SubscriptionHolder;

#[automock]
#[async_trait]
pub trait SubscriptionLifecycleRepository {
    /// Active subscriptions whose end is at or before `now`.
    async fn list_lapsed_active(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SubscriptionHolder>>;

    /// Deactivates the subscription if it is still active and lapsed, then recomputes the
    /// owner's cached `subscription_end`/`is_premium` under the user row lock.
    ///
    /// Returns `true` only for the call that performed the flip.
    async fn expire_subscription(&self, subscription_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    async fn list_active_ending_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionHolder>>;
}
