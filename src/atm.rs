//! ATM codes
//!
//! Six-digit one-time credentials a user requests from the app and types at
//! an ATM. A code is consumed by the first successful login; consuming it is
//! a CAS on `is_used`, so a reused code is rejected rather than ignored.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{info, warn};

use crate::ledger::error::LedgerError;
use crate::ledger::models::{Actor, AtmCode};
use crate::ledger::store::LedgerStore;
use crate::notify::{Notification, NotificationDispatcher, load_contact};

/// Default lifetime of an issued code
pub const DEFAULT_ATM_CODE_TTL_SECS: i64 = 600;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX).to_string()
}

#[derive(Clone)]
pub struct AtmCodeService {
    store: Arc<dyn LedgerStore>,
    notifier: NotificationDispatcher,
    ttl: Duration,
}

impl AtmCodeService {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: NotificationDispatcher) -> Self {
        Self {
            store,
            notifier,
            ttl: Duration::seconds(DEFAULT_ATM_CODE_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Create a fresh code for `actor` and send it to their phone
    pub async fn issue(&self, actor: &Actor) -> Result<AtmCode, LedgerError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let code = tx
            .insert_atm_code(actor.user_id, &generate_code(), now + self.ttl)
            .await?;
        tx.commit().await?;

        info!(user_id = actor.user_id, expires_at = %code.expires_at, "ATM code issued");
        if let Some(contact) = load_contact(self.store.as_ref(), actor.user_id).await {
            self.notifier.dispatch(Notification::AtmCode {
                phone_number: contact.phone_number,
                code: code.code.clone(),
            });
        }
        Ok(code)
    }

    /// Verify and consume a code typed at an ATM
    ///
    /// # Errors
    /// * `InvalidCredentials` - no code for this phone number, or it expired
    /// * `AlreadyUsed` - the code was consumed before; it is left untouched
    pub async fn login(&self, phone_number: &str, code: &str) -> Result<AtmCode, LedgerError> {
        let phone_number = phone_number.trim();
        let code = code.trim();
        if phone_number.is_empty() || code.is_empty() {
            return Err(LedgerError::Validation(
                "phone_number and pass_code are required".into(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut row = tx
            .lock_atm_code(phone_number, code)
            .await?
            .ok_or(LedgerError::InvalidCredentials)?;

        if row.is_used {
            warn!(user_id = row.user_id, code_id = row.id, "ATM code reuse rejected");
            return Err(LedgerError::AlreadyUsed);
        }
        if !row.is_valid(now) {
            return Err(LedgerError::InvalidCredentials);
        }
        if !tx.mark_atm_code_used(row.id).await? {
            return Err(LedgerError::AlreadyUsed);
        }
        tx.commit().await?;

        row.is_used = true;
        info!(user_id = row.user_id, code_id = row.id, "ATM login accepted");
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }
}
