//! Core types used throughout the ledger
//!
//! Plain id aliases match the `BIGINT` primary keys in PostgreSQL.
//! [`Reference`] is the only newtype: it is what ties the two legs of a
//! wallet-to-wallet transfer together and is handed out to users.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wallet ID - primary key of `wallets`.
pub type WalletId = i64;

/// User ID - supplied by the identity provider, never minted by the ledger.
pub type UserId = i64;

/// Tier ID - selects the limit table row together with the currency.
pub type TierId = i64;

/// Transaction (leg) ID - primary key of `transactions`.
pub type TransactionId = i64;

/// Currency code, e.g. `"EGP"`, `"USD"`.
pub type CurrencyCode = String;

/// Shared reference of a transaction.
///
/// Format: `<PREFIX>-<YYYYmmddHHMMSS>-<8 hex uppercase>`, e.g.
/// `WTRF-20261017093000-1A2B3C4D`. Both legs of a wallet transfer carry
/// the same reference; single-leg operations get their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    /// Prefix for wallet-to-wallet transfers
    pub const TRANSFER_PREFIX: &'static str = "WTRF";
    /// Prefix for single-leg ledger operations
    pub const TXN_PREFIX: &'static str = "TXN";

    /// Generate a new reference stamped with `now`
    pub fn generate(prefix: &str, now: DateTime<Utc>) -> Self {
        let uid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}",
            prefix,
            now.format("%Y%m%d%H%M%S"),
            uid[..8].to_uppercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Reference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Reference {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reference_format() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap();
        let r = Reference::generate(Reference::TRANSFER_PREFIX, now);
        let parts: Vec<&str> = r.as_str().split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "WTRF");
        assert_eq!(parts[1], "20261017093000");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_references_are_unique() {
        let now = Utc::now();
        let a = Reference::generate(Reference::TXN_PREFIX, now);
        let b = Reference::generate(Reference::TXN_PREFIX, now);
        assert_ne!(a, b);
    }
}
