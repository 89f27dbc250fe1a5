//! Notifier
//!
//! Outbound user messages (SMS). Delivery is best-effort and never part of
//! a ledger unit of work: callers enqueue a [`Notification`] on the
//! [`NotificationDispatcher`] only after their unit of work has committed,
//! and a delivery failure is logged, never propagated.

pub mod dispatcher;
pub mod message;

pub use dispatcher::{DeliveryConfig, NotificationDispatcher};
pub use message::{Notification, Sms, TransferNotice, WalletNotice};

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::core_types::UserId;
use crate::ledger::models::UserContact;
use crate::ledger::store::LedgerStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Notifier misconfigured: {0}")]
    Config(String),
}

/// Sends one message to one phone number
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Get notifier name for logging
    fn name(&self) -> &'static str;

    async fn notify(&self, phone_number: &str, message: &str) -> Result<(), NotifyError>;
}

// ============================================================================
// Log notifier (dev profile)
// ============================================================================

/// Writes messages to the log instead of sending them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, phone_number: &str, message: &str) -> Result<(), NotifyError> {
        tracing::info!(phone_number, message, "SMS");
        Ok(())
    }
}

// ============================================================================
// HTTP SMS gateway
// ============================================================================

#[derive(Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    message: &'a str,
}

/// Posts `{"to", "message"}` to an SMS gateway
pub struct HttpSmsNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpSmsNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpSmsNotifier {
    fn name(&self) -> &'static str {
        "http_sms"
    }

    async fn notify(&self, phone_number: &str, message: &str) -> Result<(), NotifyError> {
        self.client
            .post(&self.url)
            .json(&SmsRequest {
                to: phone_number,
                message,
            })
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// Mock notifier
// ============================================================================

/// Records every delivered message; can be told to fail the first N attempts
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<Sms>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` delivery attempts
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sms> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Poll until at least `n` messages were delivered or `timeout` elapses
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.sent_count() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.sent_count() >= n
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn notify(&self, phone_number: &str, message: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(NotifyError::Delivery("mock failure".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Sms {
                phone_number: phone_number.to_string(),
                message: message.to_string(),
            });
        }
        Ok(())
    }
}

/// Look up who to notify. A missing or unreadable contact skips the message.
pub async fn load_contact(store: &dyn LedgerStore, user_id: UserId) -> Option<UserContact> {
    match store.user_contact(user_id).await {
        Ok(Some(contact)) => Some(contact),
        Ok(None) => {
            tracing::warn!(user_id, "No contact for user, notification skipped");
            None
        }
        Err(e) => {
            tracing::error!(user_id, error = %e, "Failed to load contact, notification skipped");
            None
        }
    }
}
