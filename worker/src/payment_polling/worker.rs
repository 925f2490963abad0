use anyhow::Result;
use backend::usecases::reconciler::Reconciler;
use std::{sync::Arc, time::Duration};
use subpay_core::domain::repositories::reconciliation::ReconciliationStore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Periodically polls the gateway for pending payments whose webhook never arrived.
pub async fn run<S>(reconciler: Arc<Reconciler<S>>, interval: Duration, batch_size: i64) -> Result<()>
where
    S: ReconciliationStore + 'static,
{
    info!(
        interval_secs = interval.as_secs(),
        batch_size, "payment_poll: starting worker loop"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if let Err(err) = reconciler.sweep_pending(batch_size).await {
            error!(error = ?err, "payment_poll: sweep failed");
        }
    }
}
