//! In-memory ledger store
//!
//! Used by the dev profile when no `postgres_url` is configured, and by the
//! test suites. A unit of work holds the store-wide lock from `begin` until
//! commit or drop and mutates a private copy of the state, so units of work
//! are fully serialized and a dropped one leaves no trace.
//!
//! The same row constraints as the PostgreSQL schema are enforced here
//! (`balance >= 0`, `amount > 0`, unique wallet name per user).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core_types::{CurrencyCode, Reference, TierId, UserId, WalletId};

use super::error::LedgerError;
use super::models::{
    Actor, AtmCode, LimitEntry, NewTransaction, NewWallet, Transaction, TransactionStatus,
    TransactionType, TransferLegs, UserContact, Wallet, generate_wallet_name,
};
use super::store::{LedgerResult, LedgerStore, LedgerTx};

#[derive(Debug, Clone, Default)]
struct State {
    actors: HashMap<UserId, Actor>,
    contacts: HashMap<UserId, UserContact>,
    wallet_quotas: HashMap<TierId, i64>,
    limits: HashMap<(TierId, CurrencyCode), LimitEntry>,
    wallets: BTreeMap<WalletId, Wallet>,
    transactions: Vec<Transaction>,
    atm_codes: Vec<AtmCode>,
    last_reset: Option<NaiveDate>,
}

impl State {
    fn legs(&self, reference: &Reference) -> Option<TransferLegs> {
        let find = |ty: TransactionType| {
            self.transactions
                .iter()
                .find(|t| &t.reference == reference && t.transaction_type == ty)
                .cloned()
        };
        Some(TransferLegs {
            out_leg: find(TransactionType::TransferOut)?,
            in_leg: find(TransactionType::TransferIn)?,
        })
    }

    fn insert_wallet(&mut self, wallet: NewWallet) -> LedgerResult<Wallet> {
        let duplicate = self
            .wallets
            .values()
            .any(|w| w.user_id == wallet.user_id && w.name == wallet.name);
        if duplicate {
            return Err(LedgerError::Database(format!(
                "duplicate key value violates unique constraint \"wallets_user_id_name_key\" ({})",
                wallet.name
            )));
        }

        let id = self.wallets.keys().next_back().copied().unwrap_or(0) + 1;
        let now = Utc::now();
        let row = Wallet {
            id,
            user_id: wallet.user_id,
            name: wallet.name,
            currency: wallet.currency,
            balance: Decimal::ZERO,
            transferred_today: Decimal::ZERO,
            withdrawn_today: Decimal::ZERO,
            is_active: true,
            counter_epoch: 0,
            created_at: now,
            updated_at: now,
        };
        self.wallets.insert(id, row.clone());
        Ok(row)
    }
}

/// Store that keeps the whole ledger behind one async mutex
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Seeding (dev profile and tests)
    // ========================================================================

    pub async fn add_tier(&self, tier_id: TierId, number_of_wallets: i64) {
        self.state
            .lock()
            .await
            .wallet_quotas
            .insert(tier_id, number_of_wallets);
    }

    pub async fn set_limit(&self, entry: LimitEntry) {
        self.state
            .lock()
            .await
            .limits
            .insert((entry.tier_id, entry.currency.clone()), entry);
    }

    pub async fn add_user(&self, actor: Actor, contact: UserContact) {
        let mut state = self.state.lock().await;
        state.contacts.insert(actor.user_id, contact);
        state.actors.insert(actor.user_id, actor);
    }

    /// Create an active wallet with an opening balance
    pub async fn add_wallet(
        &self,
        user_id: UserId,
        currency: &str,
        balance: Decimal,
    ) -> LedgerResult<Wallet> {
        let mut state = self.state.lock().await;
        let names: Vec<String> = state
            .wallets
            .values()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.name.clone())
            .collect();
        let mut wallet = state.insert_wallet(NewWallet {
            user_id,
            name: generate_wallet_name(names, currency),
            currency: currency.to_string(),
        })?;
        wallet.balance = balance;
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    /// Apply `f` to a wallet row outside of any unit of work
    pub async fn update_wallet<F>(&self, wallet_id: WalletId, f: F) -> bool
    where
        F: FnOnce(&mut Wallet),
    {
        let mut state = self.state.lock().await;
        match state.wallets.get_mut(&wallet_id) {
            Some(wallet) => {
                f(wallet);
                true
            }
            None => false,
        }
    }

    pub async fn atm_codes(&self, user_id: UserId) -> Vec<AtmCode> {
        self.state
            .lock()
            .await
            .atm_codes
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn load_actor(&self, user_id: UserId) -> LedgerResult<Option<Actor>> {
        Ok(self.state.lock().await.actors.get(&user_id).cloned())
    }

    async fn user_contact(&self, user_id: UserId) -> LedgerResult<Option<UserContact>> {
        Ok(self.state.lock().await.contacts.get(&user_id).cloned())
    }

    async fn get_wallet(&self, wallet_id: WalletId) -> LedgerResult<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(&wallet_id).cloned())
    }

    async fn user_wallets(&self, user_id: UserId) -> LedgerResult<Vec<Wallet>> {
        let state = self.state.lock().await;
        Ok(state
            .wallets
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn transfer_legs(&self, reference: &Reference) -> LedgerResult<Option<TransferLegs>> {
        Ok(self.state.lock().await.legs(reference))
    }

    async fn wallet_transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.wallet_id == wallet_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn last_daily_reset(&self) -> LedgerResult<Option<NaiveDate>> {
        Ok(self.state.lock().await.last_reset)
    }
}

/// Unit of work over a private copy of the state
struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    work: State,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_user(&mut self, user_id: UserId) -> LedgerResult<Option<Actor>> {
        Ok(self.work.actors.get(&user_id).cloned())
    }

    async fn user_tier(&mut self, user_id: UserId) -> LedgerResult<Option<TierId>> {
        Ok(self.work.actors.get(&user_id).map(|a| a.tier_id))
    }

    async fn wallet_quota(&mut self, tier_id: TierId) -> LedgerResult<Option<i64>> {
        Ok(self.work.wallet_quotas.get(&tier_id).copied())
    }

    async fn limit_entry(
        &mut self,
        tier_id: TierId,
        currency: &str,
    ) -> LedgerResult<Option<LimitEntry>> {
        Ok(self
            .work
            .limits
            .get(&(tier_id, currency.to_string()))
            .cloned())
    }

    async fn lock_wallet(&mut self, wallet_id: WalletId) -> LedgerResult<Option<Wallet>> {
        Ok(self.work.wallets.get(&wallet_id).cloned())
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> LedgerResult<()> {
        if wallet.balance < Decimal::ZERO {
            return Err(LedgerError::Database(
                "new row violates check constraint \"wallets_balance_check\"".into(),
            ));
        }
        let row = self
            .work
            .wallets
            .get_mut(&wallet.id)
            .ok_or(LedgerError::WalletNotFound(wallet.id))?;
        row.balance = wallet.balance;
        row.transferred_today = wallet.transferred_today;
        row.withdrawn_today = wallet.withdrawn_today;
        row.is_active = wallet.is_active;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_wallet(&mut self, wallet: NewWallet) -> LedgerResult<Wallet> {
        self.work.insert_wallet(wallet)
    }

    async fn wallet_names(&mut self, user_id: UserId) -> LedgerResult<Vec<String>> {
        Ok(self
            .work
            .wallets
            .values()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.name.clone())
            .collect())
    }

    async fn insert_transaction(&mut self, leg: NewTransaction) -> LedgerResult<Transaction> {
        if leg.amount <= Decimal::ZERO {
            return Err(LedgerError::Database(
                "new row violates check constraint \"transactions_amount_check\"".into(),
            ));
        }
        let now = Utc::now();
        let row = Transaction {
            id: self.work.transactions.len() as i64 + 1,
            wallet_id: leg.wallet_id,
            related_wallet_id: leg.related_wallet_id,
            amount: leg.amount,
            transaction_type: leg.transaction_type,
            money_source: leg.money_source,
            status: leg.status,
            reference: leg.reference,
            description: leg.description,
            expires_at: leg.expires_at,
            reserved_epoch: leg.reserved_epoch,
            created_at: now,
            updated_at: now,
        };
        self.work.transactions.push(row.clone());
        Ok(row)
    }

    async fn count_outgoing_since(
        &mut self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> LedgerResult<i64> {
        let count = self
            .work
            .transactions
            .iter()
            .filter(|t| {
                t.wallet_id == wallet_id
                    && t.transaction_type.is_outgoing()
                    && t.status.counts_toward_daily_usage()
                    && t.created_at >= since
            })
            .count();
        Ok(count as i64)
    }

    async fn lock_transfer(&mut self, reference: &Reference) -> LedgerResult<Option<TransferLegs>> {
        Ok(self.work.legs(reference))
    }

    async fn set_transfer_status(
        &mut self,
        reference: &Reference,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> LedgerResult<u64> {
        let now = Utc::now();
        let mut moved = 0;
        for leg in self
            .work
            .transactions
            .iter_mut()
            .filter(|t| &t.reference == reference && t.status == from)
        {
            leg.status = to;
            leg.updated_at = now;
            moved += 1;
        }
        Ok(moved)
    }

    async fn expired_transfer_references(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> LedgerResult<Vec<Reference>> {
        let mut stale: Vec<&Transaction> = self
            .work
            .transactions
            .iter()
            .filter(|t| {
                t.transaction_type == TransactionType::TransferOut
                    && t.status == TransactionStatus::Pending
                    && t.expires_at.is_some_and(|deadline| deadline < now)
            })
            .collect();
        stale.sort_by_key(|t| t.created_at);
        Ok(stale
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|t| t.reference.clone())
            .collect())
    }

    async fn insert_atm_code(
        &mut self,
        user_id: UserId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> LedgerResult<AtmCode> {
        let row = AtmCode {
            id: self.work.atm_codes.len() as i64 + 1,
            user_id,
            code: code.to_string(),
            is_used: false,
            expires_at,
            created_at: Utc::now(),
        };
        self.work.atm_codes.push(row.clone());
        Ok(row)
    }

    async fn lock_atm_code(
        &mut self,
        phone_number: &str,
        code: &str,
    ) -> LedgerResult<Option<AtmCode>> {
        let contacts = &self.work.contacts;
        Ok(self
            .work
            .atm_codes
            .iter()
            .filter(|c| {
                c.code == code
                    && contacts
                        .get(&c.user_id)
                        .is_some_and(|u| u.phone_number == phone_number)
            })
            .max_by_key(|c| (c.created_at, c.id))
            .cloned())
    }

    async fn mark_atm_code_used(&mut self, id: i64) -> LedgerResult<bool> {
        match self
            .work
            .atm_codes
            .iter_mut()
            .find(|c| c.id == id && !c.is_used)
        {
            Some(code) => {
                code.is_used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn wallet_ids_after(
        &mut self,
        cursor: WalletId,
        limit: i64,
    ) -> LedgerResult<Vec<WalletId>> {
        Ok(self
            .work
            .wallets
            .range(cursor + 1..)
            .take(limit.max(0) as usize)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn reset_daily_counters(&mut self, wallet_ids: &[WalletId]) -> LedgerResult<u64> {
        let now = Utc::now();
        let mut reset = 0;
        for id in wallet_ids {
            if let Some(wallet) = self.work.wallets.get_mut(id) {
                wallet.transferred_today = Decimal::ZERO;
                wallet.withdrawn_today = Decimal::ZERO;
                wallet.counter_epoch += 1;
                wallet.updated_at = now;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn record_daily_reset(&mut self, day: NaiveDate) -> LedgerResult<()> {
        self.work.last_reset = self.work.last_reset.max(Some(day));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
