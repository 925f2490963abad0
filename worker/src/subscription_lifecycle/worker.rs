use anyhow::Result;
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::usecases::subscription_lifecycle::SubscriptionLifecycleUseCase;

const EXPIRY_BATCH_SIZE: i64 = 500;

pub async fn run(usecase: Arc<SubscriptionLifecycleUseCase>, interval: Duration) -> Result<()> {
    info!(
        interval_secs = interval.as_secs(),
        "subscription_lifecycle: starting worker loop"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match usecase.expire_lapsed(Utc::now(), EXPIRY_BATCH_SIZE).await {
            Ok(report) if report.scanned > 0 => info!(
                scanned = report.scanned,
                expired = report.expired,
                revoke_failed = report.revoke_failed,
                notify_failed = report.notify_failed,
                "subscription_lifecycle: expiry sweep finished"
            ),
            Ok(_) => {}
            Err(err) => error!(error = ?err, "subscription_lifecycle: expiry sweep failed"),
        }

        match usecase.send_reminders(Utc::now()).await {
            Ok(report) if report.candidates > 0 => info!(
                candidates = report.candidates,
                sent = report.sent,
                already_sent = report.already_sent,
                failed = report.failed,
                "subscription_lifecycle: reminders finished"
            ),
            Ok(_) => {}
            Err(err) => error!(error = ?err, "subscription_lifecycle: reminders failed"),
        }
    }
}
