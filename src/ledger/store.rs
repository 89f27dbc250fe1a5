//! Ledger storage seam
//!
//! Every balance-changing operation runs against one [`LedgerTx`]: a unit of
//! work that either commits every mutation or none. Dropping a `LedgerTx`
//! without calling [`LedgerTx::commit`] rolls it back.
//!
//! Row locks taken through `lock_*` are held until commit or drop. Callers
//! that lock more than one wallet must do so in ascending id order.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::core_types::{Reference, TierId, UserId, WalletId};

use super::error::LedgerError;
use super::models::{
    Actor, AtmCode, LimitEntry, NewTransaction, NewWallet, Transaction, TransactionStatus,
    TransferLegs, UserContact, Wallet,
};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Backing store of the ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new unit of work
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>>;

    // === Unlocked reads ===

    async fn load_actor(&self, user_id: UserId) -> LedgerResult<Option<Actor>>;

    async fn user_contact(&self, user_id: UserId) -> LedgerResult<Option<UserContact>>;

    async fn get_wallet(&self, wallet_id: WalletId) -> LedgerResult<Option<Wallet>>;

    /// Wallets of one user, by id
    async fn user_wallets(&self, user_id: UserId) -> LedgerResult<Vec<Wallet>>;

    async fn transfer_legs(&self, reference: &Reference) -> LedgerResult<Option<TransferLegs>>;

    /// Legs of one wallet, newest first
    async fn wallet_transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Latest accounting day whose counter reset completed
    async fn last_daily_reset(&self) -> LedgerResult<Option<NaiveDate>>;
}

/// One open unit of work
#[async_trait]
pub trait LedgerTx: Send {
    // === Users / tiers ===

    /// Lock the user row, serializing wallet creation per user
    async fn lock_user(&mut self, user_id: UserId) -> LedgerResult<Option<Actor>>;

    async fn user_tier(&mut self, user_id: UserId) -> LedgerResult<Option<TierId>>;

    /// Maximum number of wallets a user of `tier_id` may hold
    async fn wallet_quota(&mut self, tier_id: TierId) -> LedgerResult<Option<i64>>;

    async fn limit_entry(
        &mut self,
        tier_id: TierId,
        currency: &str,
    ) -> LedgerResult<Option<LimitEntry>>;

    // === Wallets ===

    /// `SELECT ... FOR UPDATE`
    async fn lock_wallet(&mut self, wallet_id: WalletId) -> LedgerResult<Option<Wallet>>;

    /// Persist balance, counters and `is_active` of a locked wallet
    async fn save_wallet(&mut self, wallet: &Wallet) -> LedgerResult<()>;

    async fn insert_wallet(&mut self, wallet: NewWallet) -> LedgerResult<Wallet>;

    async fn wallet_names(&mut self, user_id: UserId) -> LedgerResult<Vec<String>>;

    // === Transactions ===

    async fn insert_transaction(&mut self, leg: NewTransaction) -> LedgerResult<Transaction>;

    /// Outgoing legs of `wallet_id` created at or after `since` that still
    /// count toward daily usage
    async fn count_outgoing_since(
        &mut self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> LedgerResult<i64>;

    /// Lock both legs of a transfer
    async fn lock_transfer(&mut self, reference: &Reference) -> LedgerResult<Option<TransferLegs>>;

    /// CAS both legs from `from` to `to`. Returns the number of legs moved.
    async fn set_transfer_status(
        &mut self,
        reference: &Reference,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> LedgerResult<u64>;

    /// PENDING transfers whose deadline is before `now`, oldest first
    async fn expired_transfer_references(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> LedgerResult<Vec<Reference>>;

    // === ATM codes ===

    async fn insert_atm_code(
        &mut self,
        user_id: UserId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> LedgerResult<AtmCode>;

    /// Newest code matching the phone number and code, locked
    async fn lock_atm_code(&mut self, phone_number: &str, code: &str)
    -> LedgerResult<Option<AtmCode>>;

    /// CAS `is_used` false -> true. Returns false if it was already used.
    async fn mark_atm_code_used(&mut self, id: i64) -> LedgerResult<bool>;

    // === Daily reset ===

    /// Wallet ids strictly greater than `cursor`, ascending
    async fn wallet_ids_after(&mut self, cursor: WalletId, limit: i64) -> LedgerResult<Vec<WalletId>>;

    async fn reset_daily_counters(&mut self, wallet_ids: &[WalletId]) -> LedgerResult<u64>;

    /// Mark the counter reset of `day` as complete
    async fn record_daily_reset(&mut self, day: NaiveDate) -> LedgerResult<()>;

    // === Boundary ===

    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}
