//! Ledger Engine
//!
//! Single-leg balance operations and the wallet lifecycle. Each public
//! operation is one unit of work: the wallet row is locked, every check runs
//! against the locked row, and balance, counters and the transaction row are
//! written together. Any error before `commit` drops the unit of work.
//!
//! Notifications are queued only after a successful commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::core_types::{Reference, WalletId};
use crate::money::{self, MAX_AMOUNT, MoneyError};
use crate::notify::{Notification, NotificationDispatcher, WalletNotice, load_contact};

use super::error::LedgerError;
use super::limits::{LimitEnforcer, LimitKind};
use super::models::{
    Actor, MoneySource, NewTransaction, NewWallet, Transaction, TransactionStatus,
    TransactionType, Wallet, generate_wallet_name,
};
use super::store::{LedgerStore, LedgerTx};

/// Wallets a tier may hold when the tier row carries no quota
pub const DEFAULT_WALLET_QUOTA: i64 = 5;

/// Largest page of transaction history returned by one read
pub const MAX_HISTORY_LIMIT: i64 = 200;

/// Transactional core over a [`LedgerStore`]
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    notifier: NotificationDispatcher,
}

/// Lock `wallet_id` or fail with `WalletNotFound`
pub(crate) async fn lock_existing(
    tx: &mut dyn LedgerTx,
    wallet_id: WalletId,
) -> Result<Wallet, LedgerError> {
    tx.lock_wallet(wallet_id)
        .await?
        .ok_or(LedgerError::WalletNotFound(wallet_id))
}

pub(crate) fn ensure_active(wallet: &Wallet) -> Result<(), LedgerError> {
    if !wallet.is_active {
        return Err(LedgerError::InactiveWallet(wallet.id));
    }
    Ok(())
}

pub(crate) fn ensure_owner(actor: &Actor, wallet: &Wallet) -> Result<(), LedgerError> {
    if wallet.user_id != actor.user_id {
        return Err(LedgerError::NotWalletOwner);
    }
    Ok(())
}

pub(crate) fn ensure_funds(wallet: &Wallet, amount: Decimal) -> Result<(), LedgerError> {
    if wallet.balance < amount {
        return Err(LedgerError::InsufficientBalance);
    }
    Ok(())
}

/// Credit `amount`, refusing balances the store cannot represent
pub(crate) fn credit(wallet: &mut Wallet, amount: Decimal) -> Result<(), LedgerError> {
    let balance = wallet.balance + amount;
    if balance > MAX_AMOUNT {
        return Err(MoneyError::Overflow.into());
    }
    wallet.balance = balance;
    Ok(())
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: NotificationDispatcher) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    // ========================================================================
    // Primitive operations
    // ========================================================================

    /// Credit `target` from outside the ledger. Deposits are not limited.
    pub async fn deposit(
        &self,
        target: WalletId,
        amount: Decimal,
        source: MoneySource,
    ) -> Result<Transaction, LedgerError> {
        if source == MoneySource::WalletToWallet {
            return Err(LedgerError::Validation(
                "Deposits come from an ATM or a bank transfer".into(),
            ));
        }
        let amount = money::validate_amount(amount)?;

        let mut tx = self.store.begin().await?;
        let mut wallet = lock_existing(tx.as_mut(), target).await?;
        ensure_active(&wallet)?;

        credit(&mut wallet, amount)?;
        tx.save_wallet(&wallet).await?;
        let leg = tx
            .insert_transaction(single_leg(
                &wallet,
                amount,
                TransactionType::Deposit,
                source,
                Utc::now(),
            ))
            .await?;
        tx.commit().await?;

        info!(
            wallet_id = wallet.id,
            amount = %amount,
            source = %source,
            reference = %leg.reference,
            "Deposit committed"
        );
        self.notify_owner(&wallet, &leg, Notification::Deposit).await;
        Ok(leg)
    }

    /// Debit `wallet_id` through `channel` against the withdrawal ceiling
    pub async fn withdraw(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        channel: MoneySource,
    ) -> Result<Transaction, LedgerError> {
        if channel == MoneySource::WalletToWallet {
            return Err(LedgerError::Validation(
                "Withdrawals go through an ATM or a bank transfer".into(),
            ));
        }
        let amount = money::validate_amount(amount)?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut wallet = lock_existing(tx.as_mut(), wallet_id).await?;
        ensure_active(&wallet)?;
        LimitEnforcer::check(tx.as_mut(), &wallet, LimitKind::Withdrawal, amount, now).await?;
        ensure_funds(&wallet, amount)?;

        wallet.balance -= amount;
        wallet.withdrawn_today += amount;
        tx.save_wallet(&wallet).await?;
        let leg = tx
            .insert_transaction(single_leg(
                &wallet,
                amount,
                TransactionType::Withdrawal,
                channel,
                now,
            ))
            .await?;
        tx.commit().await?;

        info!(
            wallet_id = wallet.id,
            amount = %amount,
            channel = %channel,
            reference = %leg.reference,
            balance = %wallet.balance,
            "Withdrawal committed"
        );
        self.notify_owner(&wallet, &leg, Notification::Withdrawal).await;
        Ok(leg)
    }

    /// Send money from an owned wallet to a bank account, against the transfer ceiling
    pub async fn bank_transfer_out(
        &self,
        actor: &Actor,
        wallet_id: WalletId,
        amount: Decimal,
    ) -> Result<Transaction, LedgerError> {
        let amount = money::validate_amount(amount)?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut wallet = lock_existing(tx.as_mut(), wallet_id).await?;
        ensure_owner(actor, &wallet)?;
        ensure_active(&wallet)?;
        LimitEnforcer::check(tx.as_mut(), &wallet, LimitKind::Transfer, amount, now).await?;
        ensure_funds(&wallet, amount)?;

        wallet.balance -= amount;
        wallet.transferred_today += amount;
        tx.save_wallet(&wallet).await?;
        let leg = tx
            .insert_transaction(single_leg(
                &wallet,
                amount,
                TransactionType::TransferOut,
                MoneySource::BankTransfer,
                now,
            ))
            .await?;
        tx.commit().await?;

        info!(
            wallet_id = wallet.id,
            amount = %amount,
            reference = %leg.reference,
            balance = %wallet.balance,
            "Bank transfer out committed"
        );
        self.notify_owner(&wallet, &leg, Notification::BankTransferOut).await;
        Ok(leg)
    }

    // ========================================================================
    // Wallet lifecycle
    // ========================================================================

    /// Open a new wallet for `actor`, within the tier's wallet quota.
    ///
    /// Without a `name` the first free `"<CUR> Wallet"`, `"<CUR> Wallet 2"`, ...
    /// is used.
    pub async fn open_wallet(
        &self,
        actor: &Actor,
        currency: &str,
        name: Option<&str>,
    ) -> Result<Wallet, LedgerError> {
        let currency = normalize_currency(currency)?;
        let name = match name.map(str::trim) {
            Some("") => return Err(LedgerError::Validation("Wallet name cannot be blank".into())),
            other => other.map(str::to_string),
        };

        let mut tx = self.store.begin().await?;
        let user = tx
            .lock_user(actor.user_id)
            .await?
            .ok_or_else(|| LedgerError::Validation(format!("Unknown user {}", actor.user_id)))?;

        let existing = tx.wallet_names(user.user_id).await?;
        let quota = tx
            .wallet_quota(user.tier_id)
            .await?
            .unwrap_or(DEFAULT_WALLET_QUOTA);
        if existing.len() as i64 >= quota {
            return Err(LedgerError::WalletQuotaExceeded);
        }

        let name = match name {
            Some(name) if existing.contains(&name) => {
                return Err(LedgerError::DuplicateWalletName(name));
            }
            Some(name) => name,
            None => generate_wallet_name(&existing, &currency),
        };

        let wallet = tx
            .insert_wallet(NewWallet {
                user_id: user.user_id,
                name,
                currency,
            })
            .await?;
        tx.commit().await?;

        info!(
            wallet_id = wallet.id,
            user_id = wallet.user_id,
            currency = %wallet.currency,
            name = %wallet.name,
            "Wallet opened"
        );
        Ok(wallet)
    }

    /// Soft-delete: the wallet stays readable but takes no new transactions
    pub async fn deactivate_wallet(
        &self,
        actor: &Actor,
        wallet_id: WalletId,
    ) -> Result<Wallet, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut wallet = lock_existing(tx.as_mut(), wallet_id).await?;
        ensure_owner(actor, &wallet)?;
        if !wallet.is_active {
            return Err(LedgerError::WalletAlreadyInactive);
        }

        wallet.is_active = false;
        tx.save_wallet(&wallet).await?;
        tx.commit().await?;

        info!(wallet_id, user_id = actor.user_id, "Wallet deactivated");
        Ok(wallet)
    }

    /// Read a wallet owned by `actor`
    pub async fn wallet(&self, actor: &Actor, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;
        ensure_owner(actor, &wallet)?;
        Ok(wallet)
    }

    /// Every wallet `actor` holds, active or not
    pub async fn wallets(&self, actor: &Actor) -> Result<Vec<Wallet>, LedgerError> {
        self.store.user_wallets(actor.user_id).await
    }

    /// Newest-first legs of a wallet owned by `actor`, at most `limit`
    /// (capped at [`MAX_HISTORY_LIMIT`])
    pub async fn transactions(
        &self,
        actor: &Actor,
        wallet_id: WalletId,
        limit: i64,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.wallet(actor, wallet_id).await?;
        self.store
            .wallet_transactions(wallet_id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
    }

    async fn notify_owner<F>(&self, wallet: &Wallet, leg: &Transaction, make: F)
    where
        F: FnOnce(WalletNotice) -> Notification,
    {
        let Some(owner) = load_contact(self.store.as_ref(), wallet.user_id).await else {
            return;
        };
        self.notifier.dispatch(make(WalletNotice {
            owner,
            wallet_name: wallet.name.clone(),
            currency: wallet.currency.clone(),
            amount: leg.amount,
            reference: leg.reference.clone(),
        }));
    }
}

fn single_leg(
    wallet: &Wallet,
    amount: Decimal,
    transaction_type: TransactionType,
    money_source: MoneySource,
    now: DateTime<Utc>,
) -> NewTransaction {
    NewTransaction {
        wallet_id: wallet.id,
        related_wallet_id: None,
        amount,
        transaction_type,
        money_source,
        status: TransactionStatus::Completed,
        reference: Reference::generate(Reference::TXN_PREFIX, now),
        description: None,
        expires_at: None,
        reserved_epoch: None,
    }
}

fn normalize_currency(currency: &str) -> Result<String, LedgerError> {
    let code = currency.trim().to_ascii_uppercase();
    if code.is_empty() || code.len() > 10 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LedgerError::Validation(format!(
            "Invalid currency code: {}",
            currency
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryStore;
    use crate::ledger::models::{LimitEntry, UserContact};
    use crate::notify::{DeliveryConfig, MockNotifier};
    use std::str::FromStr;
    use std::time::Duration;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn actor(user_id: i64) -> Actor {
        Actor {
            user_id,
            tier_id: 1,
            is_active: true,
        }
    }

    async fn setup() -> (LedgerEngine, InMemoryStore, Arc<MockNotifier>) {
        let store = InMemoryStore::new();
        store.add_tier(1, 2).await;
        store
            .set_limit(LimitEntry {
                tier_id: 1,
                currency: "USD".into(),
                daily_withdrawal_limit: d("300"),
                daily_transfer_limit: d("5000"),
                daily_transactions_limit: 10,
            })
            .await;
        for user_id in [1, 2] {
            store
                .add_user(
                    actor(user_id),
                    UserContact {
                        user_id,
                        first_name: format!("User{}", user_id),
                        last_name: "Test".into(),
                        phone_number: format!("+20100000000{}", user_id),
                    },
                )
                .await;
        }
        let mock = Arc::new(MockNotifier::new());
        let (dispatcher, _) = NotificationDispatcher::spawn(mock.clone(), DeliveryConfig::default());
        let engine = LedgerEngine::new(Arc::new(store.clone()), dispatcher);
        (engine, store, mock)
    }

    #[tokio::test]
    async fn test_withdraw_updates_balance_and_counter() {
        let (engine, store, mock) = setup().await;
        let w = store.add_wallet(1, "USD", d("500")).await.unwrap();

        let leg = engine.withdraw(w.id, d("120.50"), MoneySource::Atm).await.unwrap();
        assert_eq!(leg.transaction_type, TransactionType::Withdrawal);
        assert_eq!(leg.status, TransactionStatus::Completed);

        let w = store.get_wallet(w.id).await.unwrap().unwrap();
        assert_eq!(w.balance, d("379.50"));
        assert_eq!(w.withdrawn_today, d("120.50"));
        assert!(mock.wait_for(1, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_withdraw_over_limit_reports_headroom() {
        let (engine, store, _) = setup().await;
        let w = store.add_wallet(1, "USD", d("1000")).await.unwrap();
        engine.withdraw(w.id, d("200"), MoneySource::Atm).await.unwrap();

        let err = engine.withdraw(w.id, d("150"), MoneySource::Atm).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::LimitExceeded {
                kind: LimitKind::Withdrawal,
                remaining: d("100"),
                currency: "USD".into(),
            }
        );
        assert_eq!(store.get_wallet(w.id).await.unwrap().unwrap().balance, d("800"));
    }

    #[tokio::test]
    async fn test_withdraw_inactive_wallet_rejected() {
        let (engine, store, _) = setup().await;
        let w = store.add_wallet(1, "USD", d("100")).await.unwrap();
        store.update_wallet(w.id, |w| w.is_active = false).await;

        let err = engine.withdraw(w.id, d("10"), MoneySource::Atm).await.unwrap_err();
        assert_eq!(err, LedgerError::InactiveWallet(w.id));
        assert_eq!(store.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_limit_entry_is_an_error() {
        let (engine, store, _) = setup().await;
        let w = store.add_wallet(1, "EGP", d("100")).await.unwrap();

        let err = engine.withdraw(w.id, d("10"), MoneySource::Atm).await.unwrap_err();
        assert!(matches!(err, LedgerError::LimitConfigurationMissing { tier_id: 1, .. }));
    }

    #[tokio::test]
    async fn test_deposit_requires_active_wallet_and_valid_amount() {
        let (engine, store, _) = setup().await;
        let w = store.add_wallet(1, "USD", d("0")).await.unwrap();

        assert!(matches!(
            engine.deposit(w.id, d("0"), MoneySource::Atm).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            engine.deposit(w.id, d("1.001"), MoneySource::Atm).await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(
            engine.deposit(999, d("1"), MoneySource::Atm).await.unwrap_err(),
            LedgerError::WalletNotFound(999)
        );

        store.update_wallet(w.id, |w| w.is_active = false).await;
        assert_eq!(
            engine.deposit(w.id, d("1"), MoneySource::Atm).await.unwrap_err(),
            LedgerError::InactiveWallet(w.id)
        );
    }

    #[tokio::test]
    async fn test_bank_transfer_out_requires_ownership() {
        let (engine, store, _) = setup().await;
        let w = store.add_wallet(1, "USD", d("100")).await.unwrap();

        let err = engine.bank_transfer_out(&actor(2), w.id, d("10")).await.unwrap_err();
        assert_eq!(err, LedgerError::NotWalletOwner);

        let leg = engine.bank_transfer_out(&actor(1), w.id, d("10")).await.unwrap();
        assert_eq!(leg.transaction_type, TransactionType::TransferOut);
        assert_eq!(leg.money_source, MoneySource::BankTransfer);
        let w = store.get_wallet(w.id).await.unwrap().unwrap();
        assert_eq!(w.balance, d("90"));
        assert_eq!(w.transferred_today, d("10"));
    }

    #[tokio::test]
    async fn test_daily_transaction_count_limit() {
        let (engine, store, _) = setup().await;
        store
            .set_limit(LimitEntry {
                tier_id: 1,
                currency: "USD".into(),
                daily_withdrawal_limit: d("300"),
                daily_transfer_limit: d("5000"),
                daily_transactions_limit: 2,
            })
            .await;
        let w = store.add_wallet(1, "USD", d("100")).await.unwrap();

        engine.withdraw(w.id, d("1"), MoneySource::Atm).await.unwrap();
        engine.bank_transfer_out(&actor(1), w.id, d("1")).await.unwrap();
        let err = engine.withdraw(w.id, d("1"), MoneySource::Atm).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::LimitExceeded {
                kind: LimitKind::TransactionCount,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_open_wallet_names_and_quota() {
        let (engine, _store, _) = setup().await;
        let a = engine.open_wallet(&actor(1), "usd", None).await.unwrap();
        assert_eq!(a.currency, "USD");
        assert_eq!(a.name, "USD Wallet");

        let err = engine
            .open_wallet(&actor(1), "USD", Some("USD Wallet"))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicateWalletName("USD Wallet".into()));

        let b = engine.open_wallet(&actor(1), "USD", None).await.unwrap();
        assert_eq!(b.name, "USD Wallet 2");

        // Tier 1 allows two wallets
        let err = engine.open_wallet(&actor(1), "EGP", None).await.unwrap_err();
        assert_eq!(err, LedgerError::WalletQuotaExceeded);
    }

    #[tokio::test]
    async fn test_deactivate_wallet_once() {
        let (engine, store, _) = setup().await;
        let w = store.add_wallet(1, "USD", d("10")).await.unwrap();

        assert_eq!(
            engine.deactivate_wallet(&actor(2), w.id).await.unwrap_err(),
            LedgerError::NotWalletOwner
        );
        let w = engine.deactivate_wallet(&actor(1), w.id).await.unwrap();
        assert!(!w.is_active);
        assert_eq!(
            engine.deactivate_wallet(&actor(1), w.id).await.unwrap_err(),
            LedgerError::WalletAlreadyInactive
        );
        // Still readable
        assert_eq!(engine.wallet(&actor(1), w.id).await.unwrap().balance, d("10"));
    }
}
