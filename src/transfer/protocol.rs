//! Transfer Protocol
//!
//! Drives the PENDING -> terminal transitions of wallet-to-wallet transfers.
//! Every call is one unit of work that locks both legs (where they exist)
//! and both wallets before checking anything.
//!
//! Transitions forced by the ledger itself (EXPIRED on a late action, FAILED
//! on a settlement-time limit breach) are committed before the error is
//! returned to the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core_types::{Reference, WalletId};
use crate::ledger::engine::{credit, ensure_active, ensure_funds, ensure_owner, lock_existing};
use crate::ledger::error::LedgerError;
use crate::ledger::limits::{LimitEnforcer, LimitKind};
use crate::ledger::models::{
    Actor, MoneySource, NewTransaction, TransactionStatus, TransactionType, TransferLegs, Wallet,
};
use crate::ledger::store::{LedgerStore, LedgerTx};
use crate::money;
use crate::notify::{Notification, NotificationDispatcher, TransferNotice, load_contact};

use super::state::{TransferAction, is_valid_transition};

/// Longest description accepted on a transfer
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Default time the recipient has to act
pub const DEFAULT_TRANSFER_TTL_SECS: i64 = 600;

/// Input of [`TransferProtocol::initiate`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_wallet_id: WalletId,
    pub target_wallet_id: WalletId,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

/// Two-phase wallet-to-wallet transfers
#[derive(Clone)]
pub struct TransferProtocol {
    store: Arc<dyn LedgerStore>,
    notifier: NotificationDispatcher,
    ttl: Duration,
}

/// Whether the headroom reserved at initiation is still part of the
/// source's `transferred_today`. A counter reset since then dropped it.
fn reservation_active(source: &Wallet, legs: &TransferLegs) -> bool {
    legs.out_leg.reserved_epoch == Some(source.counter_epoch)
}

/// Give back the headroom reserved at initiation
fn release_reservation(source: &mut Wallet, legs: &TransferLegs) {
    if reservation_active(source, legs) {
        source.transferred_today = (source.transferred_today - legs.amount()).max(Decimal::ZERO);
    }
}

/// Lock two distinct wallets in ascending id order; returns them as `(a, b)`
async fn lock_pair(
    tx: &mut dyn LedgerTx,
    a: WalletId,
    b: WalletId,
) -> Result<(Wallet, Wallet), LedgerError> {
    if a < b {
        let wa = lock_existing(tx, a).await?;
        let wb = lock_existing(tx, b).await?;
        Ok((wa, wb))
    } else {
        let wb = lock_existing(tx, b).await?;
        let wa = lock_existing(tx, a).await?;
        Ok((wa, wb))
    }
}

/// CAS both legs PENDING -> `to`; anything but two rows is a broken pair
async fn transition(
    tx: &mut dyn LedgerTx,
    legs: &mut TransferLegs,
    to: TransactionStatus,
) -> Result<(), LedgerError> {
    let from = TransactionStatus::Pending;
    if !is_valid_transition(from, to) {
        return Err(LedgerError::Internal(format!("invalid transition {} -> {}", from, to)));
    }
    let moved = tx.set_transfer_status(legs.reference(), from, to).await?;
    if moved != 2 {
        return Err(LedgerError::Internal(format!(
            "transfer {} moved {} legs to {}, expected 2",
            legs.reference(),
            moved,
            to
        )));
    }
    legs.out_leg.status = to;
    legs.in_leg.status = to;
    Ok(())
}

impl TransferProtocol {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: NotificationDispatcher) -> Self {
        Self {
            store,
            notifier,
            ttl: Duration::seconds(DEFAULT_TRANSFER_TTL_SECS),
        }
    }

    /// Override how long the recipient has to act
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // ========================================================================
    // initiate
    // ========================================================================

    /// Create the two PENDING legs and reserve the source's transfer headroom.
    ///
    /// No balance moves until the recipient accepts.
    pub async fn initiate(
        &self,
        actor: &Actor,
        req: TransferRequest,
    ) -> Result<TransferLegs, LedgerError> {
        let amount = money::validate_amount(req.amount)?;
        if req.source_wallet_id == req.target_wallet_id {
            return Err(LedgerError::SameWallet);
        }
        let description = req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
        {
            return Err(LedgerError::Validation(format!(
                "Description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let (mut source, target) =
            lock_pair(tx.as_mut(), req.source_wallet_id, req.target_wallet_id).await?;

        ensure_owner(actor, &source)?;
        ensure_active(&source)?;
        ensure_active(&target)?;
        if source.currency != target.currency {
            return Err(LedgerError::CurrencyMismatch);
        }
        ensure_funds(&source, amount)?;
        LimitEnforcer::check(tx.as_mut(), &source, LimitKind::Transfer, amount, now).await?;

        source.transferred_today += amount;
        tx.save_wallet(&source).await?;

        let reference = Reference::generate(Reference::TRANSFER_PREFIX, now);
        let expires_at = Some(now + self.ttl);
        let out_leg = tx
            .insert_transaction(NewTransaction {
                wallet_id: source.id,
                related_wallet_id: Some(target.id),
                amount,
                transaction_type: TransactionType::TransferOut,
                money_source: MoneySource::WalletToWallet,
                status: TransactionStatus::Pending,
                reference: reference.clone(),
                description: description.clone(),
                expires_at,
                reserved_epoch: Some(source.counter_epoch),
            })
            .await?;
        let in_leg = tx
            .insert_transaction(NewTransaction {
                wallet_id: target.id,
                related_wallet_id: Some(source.id),
                amount,
                transaction_type: TransactionType::TransferIn,
                money_source: MoneySource::WalletToWallet,
                status: TransactionStatus::Pending,
                reference: reference.clone(),
                description,
                expires_at,
                reserved_epoch: None,
            })
            .await?;
        tx.commit().await?;

        info!(
            reference = %reference,
            source_wallet_id = source.id,
            target_wallet_id = target.id,
            amount = %amount,
            "Transfer initiated"
        );

        let legs = TransferLegs { out_leg, in_leg };
        self.notify_parties(&source, &target, &legs, Notification::TransferInitiated)
            .await;
        Ok(legs)
    }

    // ========================================================================
    // finalize
    // ========================================================================

    /// Recipient accepts or declines a PENDING transfer.
    ///
    /// Accept re-checks the source's headroom (not counting this transfer's
    /// own reservation) and balance. A headroom breach fails the transfer;
    /// an insufficient balance leaves it PENDING.
    ///
    /// Decline skips the headroom re-check: it moves no money and only
    /// releases the reservation, so a lowered limit cannot make it fail.
    pub async fn finalize(
        &self,
        actor: &Actor,
        reference: &Reference,
        action: TransferAction,
    ) -> Result<TransferLegs, LedgerError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut legs = lock_pending(tx.as_mut(), reference).await?;
        let (mut source, mut target) =
            lock_pair(tx.as_mut(), legs.source_wallet_id(), legs.target_wallet_id()).await?;

        // Only the recipient sees the transfer as theirs to settle
        if target.user_id != actor.user_id {
            return Err(LedgerError::NoPendingTransaction(reference.to_string()));
        }

        if legs.out_leg.is_expired(now) {
            return self
                .close_with_error(
                    tx,
                    legs,
                    source,
                    target,
                    TransactionStatus::Expired,
                    LedgerError::TransferExpired(reference.to_string()),
                )
                .await;
        }

        if action == TransferAction::Decline {
            release_reservation(&mut source, &legs);
            tx.save_wallet(&source).await?;
            transition(tx.as_mut(), &mut legs, TransactionStatus::Declined).await?;
            tx.commit().await?;

            info!(reference = %reference, "Transfer declined");
            self.notify_parties(&source, &target, &legs, Notification::TransferDeclined)
                .await;
            return Ok(legs);
        }

        if let Err(e) = ensure_active(&source).and_then(|_| ensure_active(&target)) {
            return self
                .close_with_error(tx, legs, source, target, TransactionStatus::Failed, e)
                .await;
        }

        let amount = legs.amount();
        let reserved = reservation_active(&source, &legs);
        let mut headroom_view = source.clone();
        if reserved {
            headroom_view.transferred_today =
                (headroom_view.transferred_today - amount).max(Decimal::ZERO);
        }
        let limit = LimitEnforcer::limit_for(tx.as_mut(), &source).await?;
        if let Err(e) = LimitEnforcer::check_amount(&limit, &headroom_view, LimitKind::Transfer, amount)
        {
            return self
                .close_with_error(tx, legs, source, target, TransactionStatus::Failed, e)
                .await;
        }
        ensure_funds(&source, amount)?;

        source.balance -= amount;
        if !reserved {
            source.transferred_today += amount;
        }
        credit(&mut target, amount)?;
        tx.save_wallet(&source).await?;
        tx.save_wallet(&target).await?;
        transition(tx.as_mut(), &mut legs, TransactionStatus::Completed).await?;
        tx.commit().await?;

        info!(
            reference = %reference,
            source_wallet_id = source.id,
            target_wallet_id = target.id,
            amount = %amount,
            "Transfer completed"
        );
        self.notify_parties(&source, &target, &legs, Notification::TransferAccepted)
            .await;
        Ok(legs)
    }

    // ========================================================================
    // cancel
    // ========================================================================

    /// Sender withdraws a PENDING transfer. No balance moves.
    pub async fn cancel(
        &self,
        actor: &Actor,
        reference: &Reference,
    ) -> Result<TransferLegs, LedgerError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut legs = lock_pending(tx.as_mut(), reference).await?;
        let (mut source, target) =
            lock_pair(tx.as_mut(), legs.source_wallet_id(), legs.target_wallet_id()).await?;

        if source.user_id != actor.user_id {
            return Err(LedgerError::NoPendingTransaction(reference.to_string()));
        }

        if legs.out_leg.is_expired(now) {
            return self
                .close_with_error(
                    tx,
                    legs,
                    source,
                    target,
                    TransactionStatus::Expired,
                    LedgerError::TransferExpired(reference.to_string()),
                )
                .await;
        }

        release_reservation(&mut source, &legs);
        tx.save_wallet(&source).await?;
        transition(tx.as_mut(), &mut legs, TransactionStatus::Canceled).await?;
        tx.commit().await?;

        info!(reference = %reference, "Transfer canceled");
        self.notify_parties(&source, &target, &legs, Notification::TransferCanceled)
            .await;
        Ok(legs)
    }

    // ========================================================================
    // expiry
    // ========================================================================

    /// Expire up to `batch_size` PENDING transfers past their deadline.
    ///
    /// Each transfer is closed in its own unit of work. Returns how many
    /// were expired.
    pub async fn expire_due(&self, now: DateTime<Utc>, batch_size: i64) -> Result<usize, LedgerError> {
        let references = {
            let mut tx = self.store.begin().await?;
            tx.expired_transfer_references(now, batch_size).await?
        };

        let mut expired = 0;
        for reference in references {
            match self.expire_one(&reference, now).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => warn!(reference = %reference, error = %e, "Failed to expire transfer"),
            }
        }
        Ok(expired)
    }

    async fn expire_one(&self, reference: &Reference, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        let mut tx = self.store.begin().await?;
        let Some(mut legs) = tx.lock_transfer(reference).await? else {
            return Ok(false);
        };
        // Settled or canceled since the scan
        if legs.status() != Some(TransactionStatus::Pending) || !legs.out_leg.is_expired(now) {
            return Ok(false);
        }
        let (mut source, target) =
            lock_pair(tx.as_mut(), legs.source_wallet_id(), legs.target_wallet_id()).await?;

        release_reservation(&mut source, &legs);
        tx.save_wallet(&source).await?;
        transition(tx.as_mut(), &mut legs, TransactionStatus::Expired).await?;
        tx.commit().await?;

        info!(reference = %reference, "Transfer expired");
        self.notify_parties(&source, &target, &legs, Notification::TransferExpired)
            .await;
        Ok(true)
    }

    // ========================================================================
    // reads
    // ========================================================================

    /// Both legs of a transfer the actor is a party to
    pub async fn legs(&self, actor: &Actor, reference: &Reference) -> Result<TransferLegs, LedgerError> {
        let not_found = || LedgerError::NoPendingTransaction(reference.to_string());
        let legs = self
            .store
            .transfer_legs(reference)
            .await?
            .ok_or_else(not_found)?;

        let mut parties = Vec::with_capacity(2);
        for wallet_id in [legs.source_wallet_id(), legs.target_wallet_id()] {
            if let Some(wallet) = self.store.get_wallet(wallet_id).await? {
                parties.push(wallet.user_id);
            }
        }
        if !parties.contains(&actor.user_id) {
            return Err(not_found());
        }
        Ok(legs)
    }

    // ========================================================================
    // helpers
    // ========================================================================

    /// Commit a forced terminal transition, notify, then report `error`
    async fn close_with_error(
        &self,
        mut tx: Box<dyn LedgerTx>,
        mut legs: TransferLegs,
        mut source: Wallet,
        target: Wallet,
        to: TransactionStatus,
        error: LedgerError,
    ) -> Result<TransferLegs, LedgerError> {
        release_reservation(&mut source, &legs);
        tx.save_wallet(&source).await?;
        transition(tx.as_mut(), &mut legs, to).await?;
        tx.commit().await?;

        warn!(
            reference = %legs.reference(),
            status = %to,
            error = %error,
            "Transfer closed by the ledger"
        );
        let notification = match to {
            TransactionStatus::Expired => Notification::TransferExpired,
            _ => Notification::TransferFailed,
        };
        self.notify_parties(&source, &target, &legs, notification).await;
        Err(error)
    }

    async fn notify_parties<F>(&self, source: &Wallet, target: &Wallet, legs: &TransferLegs, make: F)
    where
        F: FnOnce(TransferNotice) -> Notification,
    {
        let store = self.store.as_ref();
        let (Some(sender), Some(recipient)) = (
            load_contact(store, source.user_id).await,
            load_contact(store, target.user_id).await,
        ) else {
            return;
        };
        self.notifier.dispatch(make(TransferNotice {
            sender,
            recipient,
            source_wallet_name: source.name.clone(),
            currency: source.currency.clone(),
            amount: legs.amount(),
            reference: legs.reference().clone(),
        }));
    }
}

/// Lock the legs of `reference` and require them to be PENDING
async fn lock_pending(
    tx: &mut dyn LedgerTx,
    reference: &Reference,
) -> Result<TransferLegs, LedgerError> {
    match tx.lock_transfer(reference).await? {
        Some(legs) if legs.status() == Some(TransactionStatus::Pending) => Ok(legs),
        _ => Err(LedgerError::NoPendingTransaction(reference.to_string())),
    }
}
