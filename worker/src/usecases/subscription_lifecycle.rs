use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use subpay_core::domain::{
    entities::subscriptions::SubscriptionHolder,
    repositories::{
        channel_access::ChannelAccessGranter, notification_marks::NotificationMarkRepository,
        notifications::NotificationSink, subscription_lifecycle::SubscriptionLifecycleRepository,
    },
    value_objects::enums::notification_kinds::NotificationKind,
};
use tracing::{error, info, warn};

const REMINDER_WINDOW_HOURS: i64 = 12;

const EXPIRED_TEXT: &str = "Your subscription has expired.\n\n\
To get access to the private channels back, buy a new subscription.\n\n\
Use /buy to subscribe.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    pub scanned: usize,
    pub expired: usize,
    pub revoke_failed: usize,
    pub notify_failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub candidates: usize,
    pub sent: usize,
    pub already_sent: usize,
    pub failed: usize,
}

pub struct SubscriptionLifecycleUseCase {
    lifecycle_repository: Arc<dyn SubscriptionLifecycleRepository + Send + Sync>,
    mark_repository: Arc<dyn NotificationMarkRepository + Send + Sync>,
    notifier: Arc<dyn NotificationSink + Send + Sync>,
    channel_access: Arc<dyn ChannelAccessGranter + Send + Sync>,
    reminder_cooldown: Duration,
}

impl SubscriptionLifecycleUseCase {
    pub fn new(
        lifecycle_repository: Arc<dyn SubscriptionLifecycleRepository + Send + Sync>,
        mark_repository: Arc<dyn NotificationMarkRepository + Send + Sync>,
        notifier: Arc<dyn NotificationSink + Send + Sync>,
        channel_access: Arc<dyn ChannelAccessGranter + Send + Sync>,
        reminder_cooldown: Duration,
    ) -> Self {
        Self {
            lifecycle_repository,
            mark_repository,
            notifier,
            channel_access,
            reminder_cooldown,
        }
    }

    /// Deactivates lapsed subscriptions. Side effects run only for the call that flipped the row,
    /// so overlapping sweeps never revoke or notify twice.
    pub async fn expire_lapsed(&self, now: DateTime<Utc>, limit: i64) -> Result<ExpiryReport> {
        let lapsed = self
            .lifecycle_repository
            .list_lapsed_active(now, limit)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "subscription_lifecycle: failed to list lapsed subscriptions");
                err
            })?;

        let mut report = ExpiryReport {
            scanned: lapsed.len(),
            ..ExpiryReport::default()
        };

        for holder in lapsed {
            let subscription = &holder.subscription;
            match self
                .lifecycle_repository
                .expire_subscription(subscription.id, now)
                .await
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    warn!(subscription_id = %subscription.id, db_error = ?err, "subscription_lifecycle: failed to expire subscription");
                    continue;
                }
            }
            report.expired += 1;

            if let Err(err) = self
                .channel_access
                .revoke(subscription.bot_id, holder.telegram_id, subscription.plan_id)
                .await
            {
                report.revoke_failed += 1;
                warn!(subscription_id = %subscription.id, error = ?err, "subscription_lifecycle: channel revoke failed");
            }

            if let Err(err) = self
                .notifier
                .send_user_message(subscription.bot_id, holder.telegram_id, EXPIRED_TEXT.to_string())
                .await
            {
                report.notify_failed += 1;
                warn!(subscription_id = %subscription.id, error = ?err, "subscription_lifecycle: expiry notification failed");
            }

            info!(
                subscription_id = %subscription.id,
                user_id = %subscription.user_id,
                "subscription_lifecycle: subscription expired"
            );
        }

        Ok(report)
    }

    /// Sends the 7/3/1-day reminders. Each (user, kind) is claimed in storage before sending and
    /// released again when delivery fails.
    pub async fn send_reminders(&self, now: DateTime<Utc>) -> Result<ReminderReport> {
        let mut report = ReminderReport::default();

        for kind in NotificationKind::REMINDERS {
            let days = kind.days_before_expiry();
            let target = now + Duration::days(days);
            let window = Duration::hours(REMINDER_WINDOW_HOURS);

            let holders = self
                .lifecycle_repository
                .list_active_ending_between(target - window, target + window)
                .await
                .map_err(|err| {
                    error!(db_error = ?err, %kind, "subscription_lifecycle: failed to list expiring subscriptions");
                    err
                })?;

            for holder in holders {
                // Whole days left must match the reminder, or the text would lie.
                if (holder.subscription.ends_at - now).num_days() != days {
                    continue;
                }
                report.candidates += 1;
                self.remind(&holder, kind, now, &mut report).await;
            }
        }

        Ok(report)
    }

    async fn remind(
        &self,
        holder: &SubscriptionHolder,
        kind: NotificationKind,
        now: DateTime<Utc>,
        report: &mut ReminderReport,
    ) {
        let subscription = &holder.subscription;
        match self
            .mark_repository
            .try_claim(subscription.user_id, kind, now, self.reminder_cooldown)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                report.already_sent += 1;
                return;
            }
            Err(err) => {
                report.failed += 1;
                warn!(user_id = %subscription.user_id, db_error = ?err, "subscription_lifecycle: failed to claim reminder");
                return;
            }
        }

        let text = reminder_text(kind.days_before_expiry(), subscription.ends_at);
        match self
            .notifier
            .send_user_message(subscription.bot_id, holder.telegram_id, text)
            .await
        {
            Ok(()) => {
                report.sent += 1;
                info!(user_id = %subscription.user_id, %kind, "subscription_lifecycle: reminder sent");
            }
            Err(err) => {
                report.failed += 1;
                warn!(user_id = %subscription.user_id, %kind, error = ?err, "subscription_lifecycle: reminder failed");
                if let Err(err) = self.mark_repository.release(subscription.user_id, kind).await {
                    error!(user_id = %subscription.user_id, db_error = ?err, "subscription_lifecycle: failed to release reminder claim");
                }
            }
        }
    }
}

pub fn reminder_text(days_left: i64, ends_at: DateTime<Utc>) -> String {
    let end_date = ends_at.format("%d.%m.%Y");
    let when = if days_left == 1 {
        format!("tomorrow ({end_date})")
    } else {
        format!("in {days_left} days ({end_date})")
    };
    format!(
        "Reminder: your subscription expires {when}.\n\n\
Renew it to keep access to all channels.\n\n\
Use /buy to renew."
    )
}
