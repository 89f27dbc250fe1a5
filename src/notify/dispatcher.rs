//! Notification delivery queue
//!
//! Producers enqueue without waiting on delivery; a single background task
//! drains the queue and retries each message with linear backoff. A full
//! queue drops the message with a warning rather than stall the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::Notifier;
use super::message::{Notification, Sms};

/// Configuration for the delivery worker
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub queue_size: usize,
    /// Attempts per message, including the first
    pub max_attempts: u32,
    /// Delay before retry `n` is `n * retry_backoff`
    pub retry_backoff: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Sender side of the delivery queue
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Sms>,
}

impl NotificationDispatcher {
    /// Start the delivery worker on the current runtime
    pub fn spawn(notifier: Arc<dyn Notifier>, config: DeliveryConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let handle = tokio::spawn(delivery_loop(notifier, rx, config));
        (Self { tx }, handle)
    }

    /// Queue every message of `notification`
    pub fn dispatch(&self, notification: Notification) {
        let kind = notification.kind();
        for sms in notification.render() {
            match self.tx.try_send(sms) {
                Ok(()) => debug!(kind, "Notification queued"),
                Err(mpsc::error::TrySendError::Full(sms)) => {
                    warn!(kind, phone_number = %sms.phone_number, "Notification queue full, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(sms)) => {
                    error!(kind, phone_number = %sms.phone_number, "Notification queue closed, message dropped");
                }
            }
        }
    }
}

async fn delivery_loop(notifier: Arc<dyn Notifier>, mut rx: mpsc::Receiver<Sms>, config: DeliveryConfig) {
    while let Some(sms) = rx.recv().await {
        deliver(notifier.as_ref(), &sms, &config).await;
    }
    debug!(notifier = notifier.name(), "Notification queue drained, delivery worker stopping");
}

/// Deliver one message, retrying up to `max_attempts`. Returns whether it was sent.
async fn deliver(notifier: &dyn Notifier, sms: &Sms, config: &DeliveryConfig) -> bool {
    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        match notifier.notify(&sms.phone_number, &sms.message).await {
            Ok(()) => return true,
            Err(e) if attempt < attempts => {
                warn!(
                    notifier = notifier.name(),
                    attempt,
                    error = %e,
                    "Notification delivery failed, retrying"
                );
                tokio::time::sleep(config.retry_backoff * attempt).await;
            }
            Err(e) => {
                error!(
                    notifier = notifier.name(),
                    phone_number = %sms.phone_number,
                    attempts,
                    error = %e,
                    "Notification delivery gave up"
                );
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockNotifier;

    fn fast() -> DeliveryConfig {
        DeliveryConfig {
            queue_size: 16,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn atm(code: &str) -> Notification {
        Notification::AtmCode {
            phone_number: "+201000".into(),
            code: code.into(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let mock = Arc::new(MockNotifier::new());
        let (dispatcher, _handle) = NotificationDispatcher::spawn(mock.clone(), fast());

        dispatcher.dispatch(atm("111111"));
        dispatcher.dispatch(atm("222222"));

        assert!(mock.wait_for(2, Duration::from_secs(2)).await);
        let sent = mock.sent();
        assert!(sent[0].message.contains("111111"));
        assert!(sent[1].message.contains("222222"));
    }

    #[tokio::test]
    async fn test_delivery_retries_then_succeeds() {
        let mock = MockNotifier::new();
        mock.fail_next(2);
        let sms = Sms {
            phone_number: "+201000".into(),
            message: "hello".into(),
        };
        assert!(deliver(&mock, &sms, &fast()).await);
        assert_eq!(mock.attempt_count(), 3);
        assert_eq!(mock.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_delivery_gives_up_after_max_attempts() {
        let mock = MockNotifier::new();
        mock.fail_next(10);
        let sms = Sms {
            phone_number: "+201000".into(),
            message: "hello".into(),
        };
        assert!(!deliver(&mock, &sms, &fast()).await);
        assert_eq!(mock.attempt_count(), 3);
        assert_eq!(mock.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_stops_when_dispatchers_dropped() {
        let mock = Arc::new(MockNotifier::new());
        let (dispatcher, handle) = NotificationDispatcher::spawn(mock, fast());
        drop(dispatcher);
        assert!(tokio::time::timeout(Duration::from_secs(1), handle).await.is_ok());
    }
}
