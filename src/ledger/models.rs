//! Ledger data model
//!
//! Rows as the ledger sees them. Enum discriminants are stored as their
//! SCREAMING_SNAKE names (`TEXT` columns), which are also the wire names.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{CurrencyCode, Reference, TierId, TransactionId, UserId, WalletId};

// ============================================================================
// Enums
// ============================================================================

/// Direction/kind of one ledger leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::TransferIn => "TRANSFER_IN",
            TransactionType::TransferOut => "TRANSFER_OUT",
        }
    }

    /// Legs that take money out of the owning wallet
    #[inline]
    pub fn is_outgoing(&self) -> bool {
        matches!(
            self,
            TransactionType::Withdrawal | TransactionType::TransferOut
        )
    }
}

/// Channel the money moved through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoneySource {
    BankTransfer,
    Atm,
    WalletToWallet,
}

impl MoneySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoneySource::BankTransfer => "BANK_TRANSFER",
            MoneySource::Atm => "ATM",
            MoneySource::WalletToWallet => "WALLET_TO_WALLET",
        }
    }
}

/// Status of a transaction leg
///
/// Only PENDING and PROCESSING are non-terminal. Single-leg operations are
/// written directly as COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Declined,
    Failed,
    Expired,
    Canceled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Declined => "DECLINED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Expired => "EXPIRED",
            TransactionStatus::Canceled => "CANCELED",
        }
    }

    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            TransactionStatus::Pending | TransactionStatus::Processing
        )
    }

    /// Statuses that count against the daily transaction-count limit
    #[inline]
    pub fn counts_toward_daily_usage(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Pending | TransactionStatus::Processing | TransactionStatus::Completed
        )
    }
}

macro_rules! impl_text_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(format!("Unknown {}: {}", stringify!($ty), s))
            }
        }
    };
}

impl_text_enum!(TransactionType { Deposit, Withdrawal, TransferIn, TransferOut });
impl_text_enum!(MoneySource { BankTransfer, Atm, WalletToWallet });
impl_text_enum!(TransactionStatus {
    Pending,
    Processing,
    Completed,
    Declined,
    Failed,
    Expired,
    Canceled,
});

// ============================================================================
// Wallet
// ============================================================================

/// A per-user, per-currency balance holder.
///
/// `balance >= 0` is enforced both here (every debit is checked under the
/// row lock) and by a `CHECK` constraint in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub name: String,
    pub currency: CurrencyCode,
    pub balance: Decimal,
    pub transferred_today: Decimal,
    pub withdrawn_today: Decimal,
    pub is_active: bool,
    /// Bumped by every daily reset of the counters above
    pub counter_epoch: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert form of a wallet
#[derive(Debug, Clone)]
pub struct NewWallet {
    pub user_id: UserId,
    pub name: String,
    pub currency: CurrencyCode,
}

/// Pick a display name that does not collide with `existing`.
///
/// `"USD Wallet"`, then `"USD Wallet 2"`, `"USD Wallet 3"`, ...
pub fn generate_wallet_name<I, S>(existing: I, currency: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let taken: HashSet<String> = existing
        .into_iter()
        .map(|n| n.as_ref().to_string())
        .collect();

    let base = format!("{} Wallet", currency);
    if !taken.contains(&base) {
        return base;
    }

    let mut i = 2u32;
    loop {
        let candidate = format!("{} {}", base, i);
        if !taken.contains(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// One immutable leg in the ledger. Only `status` changes after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub related_wallet_id: Option<WalletId>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub money_source: MoneySource,
    pub status: TransactionStatus,
    pub reference: Reference,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Source wallet's `counter_epoch` when this TRANSFER_OUT leg reserved
    /// headroom. The reservation is void once the epoch has moved on.
    pub reserved_epoch: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A PENDING leg past its deadline
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Pending
            && self.expires_at.is_some_and(|deadline| now > deadline)
    }
}

/// Insert form of a transaction leg
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub wallet_id: WalletId,
    pub related_wallet_id: Option<WalletId>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub money_source: MoneySource,
    pub status: TransactionStatus,
    pub reference: Reference,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reserved_epoch: Option<i64>,
}

/// Both legs of one wallet-to-wallet transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferLegs {
    pub out_leg: Transaction,
    pub in_leg: Transaction,
}

impl TransferLegs {
    pub fn reference(&self) -> &Reference {
        &self.out_leg.reference
    }

    pub fn amount(&self) -> Decimal {
        self.out_leg.amount
    }

    pub fn source_wallet_id(&self) -> WalletId {
        self.out_leg.wallet_id
    }

    pub fn target_wallet_id(&self) -> WalletId {
        self.in_leg.wallet_id
    }

    /// Both legs share one status, or `None` if they have diverged
    pub fn status(&self) -> Option<TransactionStatus> {
        (self.out_leg.status == self.in_leg.status).then_some(self.out_leg.status)
    }
}

// ============================================================================
// Limits
// ============================================================================

/// Daily ceilings for one (tier, currency) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitEntry {
    pub tier_id: TierId,
    pub currency: CurrencyCode,
    pub daily_withdrawal_limit: Decimal,
    pub daily_transfer_limit: Decimal,
    pub daily_transactions_limit: i64,
}

// ============================================================================
// Identity
// ============================================================================

/// The authenticated caller, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub tier_id: TierId,
    pub is_active: bool,
}

/// What the notifier needs to reach a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContact {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

impl UserContact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ============================================================================
// ATM codes
// ============================================================================

/// Short-lived one-time ATM credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtmCode {
    pub id: i64,
    pub user_id: UserId,
    pub code: String,
    pub is_used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AtmCode {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && now < self.expires_at
    }
}
