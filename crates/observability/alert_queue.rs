use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::Level;

const QUEUE_CAPACITY: usize = 256;
const REPEAT_WINDOW_MINUTES: i64 = 10;

#[derive(Clone, Debug)]
pub(crate) struct SpanContext {
    pub(crate) name: String,
    pub(crate) fields: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub(crate) struct AlertEvent {
    pub(crate) level: Level,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
    pub(crate) target: String,
    pub(crate) file: Option<String>,
    pub(crate) line: Option<u32>,
    pub(crate) message: Option<String>,
    pub(crate) fields: BTreeMap<String, String>,
    pub(crate) spans: Vec<SpanContext>,
}

impl AlertEvent {
    fn repeat_key(&self) -> (String, String) {
        (self.target.clone(), self.message.clone().unwrap_or_default())
    }
}

#[async_trait]
pub(crate) trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &AlertEvent) -> Result<()>;
    fn sink_name(&self) -> &'static str;
}

/// Holds back an alert whose target and message already went out inside the window.
///
/// A failing sweep repeats every poll interval; the operator chat gets the first alert and then
/// one per window carrying the number of repeats it absorbed.
pub(crate) struct RepeatFilter {
    window: Duration,
    last_sent: HashMap<(String, String), (DateTime<Utc>, u64)>,
}

impl RepeatFilter {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// Returns the alert to deliver, or `None` when it is a repeat inside the window.
    pub(crate) fn admit(&mut self, mut alert: AlertEvent) -> Option<AlertEvent> {
        let key = alert.repeat_key();
        let now = alert.timestamp;

        match self.last_sent.get_mut(&key) {
            Some((sent_at, held_back)) if now - *sent_at < self.window => {
                *held_back += 1;
                None
            }
            Some((sent_at, held_back)) => {
                if *held_back > 0 {
                    alert
                        .fields
                        .insert("repeats_suppressed".to_string(), held_back.to_string());
                }
                *sent_at = now;
                *held_back = 0;
                Some(alert)
            }
            None => {
                self.last_sent.insert(key, (now, 0));
                Some(alert)
            }
        }
    }
}

/// Queues alerts from inside the tracing layer and delivers them from a background task.
///
/// Nothing on this path may log at a level the layer forwards, so delivery failures go to stderr.
#[derive(Clone)]
pub(crate) struct AlertQueue {
    tx: mpsc::Sender<AlertEvent>,
    dropped: Arc<AtomicU64>,
}

impl AlertQueue {
    pub(crate) fn spawn(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        let (tx, mut rx) = mpsc::channel::<AlertEvent>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            let mut repeats = RepeatFilter::new(Duration::minutes(REPEAT_WINDOW_MINUTES));

            while let Some(alert) = rx.recv().await {
                let Some(alert) = repeats.admit(alert) else {
                    continue;
                };

                for sink in &sinks {
                    if let Err(error) = sink.deliver(&alert).await {
                        eprintln!("observability: alert sink {} failed: {error}", sink.sink_name());
                    }
                }
            }
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn enqueue(&self, alert: AlertEvent) {
        if let Err(TrySendError::Full(_) | TrySendError::Closed(_)) = self.tx.try_send(alert) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            eprintln!("observability: alert queue unavailable; {dropped} alert(s) dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alert(message: &str, at: DateTime<Utc>) -> AlertEvent {
        AlertEvent {
            level: Level::ERROR,
            timestamp: at,
            service_name: "subpay".to_string(),
            environment: "test".to_string(),
            component: "worker".to_string(),
            target: "worker::payment_polling::worker".to_string(),
            file: None,
            line: None,
            message: Some(message.to_string()),
            fields: BTreeMap::new(),
            spans: Vec::new(),
        }
    }

    #[test]
    fn repeats_inside_the_window_are_held_back_and_counted() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut filter = RepeatFilter::new(Duration::minutes(10));

        assert!(filter.admit(alert("sweep failed", start)).is_some());
        assert!(filter.admit(alert("sweep failed", start + Duration::minutes(1))).is_none());
        assert!(filter.admit(alert("sweep failed", start + Duration::minutes(2))).is_none());
        assert!(filter.admit(alert("gateway down", start + Duration::minutes(2))).is_some());

        let resumed = filter
            .admit(alert("sweep failed", start + Duration::minutes(11)))
            .unwrap();
        assert_eq!(resumed.fields.get("repeats_suppressed").map(String::as_str), Some("2"));

        let next = filter
            .admit(alert("sweep failed", start + Duration::minutes(22)))
            .unwrap();
        assert!(!next.fields.contains_key("repeats_suppressed"));
    }
}
