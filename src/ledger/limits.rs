//! Limit Enforcer
//!
//! Daily ceilings are looked up per (tier of the wallet owner, wallet
//! currency). A missing entry is an error: limits are never implicitly
//! unlimited.
//!
//! The enforcer only reads. Counters are advanced by the engine inside the
//! same unit of work, after the check, while the wallet row is locked.

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::models::{LimitEntry, Wallet};
use super::store::LedgerTx;

/// Which daily ceiling an operation draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Transfer,
    Withdrawal,
    /// Number of outgoing legs per day
    TransactionCount,
}

/// Start of the accounting day containing `now`. Days roll over at 00:00 UTC.
pub fn accounting_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Remaining amount under an amount-based ceiling, never below zero.
///
/// Count headroom depends on the log, not the wallet row: this returns zero
/// for [`LimitKind::TransactionCount`], see [`LimitEnforcer::remaining`].
pub fn amount_headroom(limit: &LimitEntry, wallet: &Wallet, kind: LimitKind) -> Decimal {
    let (ceiling, used) = match kind {
        LimitKind::Transfer => (limit.daily_transfer_limit, wallet.transferred_today),
        LimitKind::Withdrawal => (limit.daily_withdrawal_limit, wallet.withdrawn_today),
        LimitKind::TransactionCount => return Decimal::ZERO,
    };
    (ceiling - used).max(Decimal::ZERO)
}

/// Remaining number of outgoing legs today, never below zero.
pub fn count_headroom(limit: &LimitEntry, used_today: i64) -> Decimal {
    Decimal::from((limit.daily_transactions_limit - used_today).max(0))
}

/// Stateless limit checks over an open unit of work
pub struct LimitEnforcer;

impl LimitEnforcer {
    /// Resolve the limit entry for the wallet owner's tier and the wallet currency
    pub async fn limit_for(tx: &mut dyn LedgerTx, wallet: &Wallet) -> Result<LimitEntry, LedgerError> {
        let tier_id = tx
            .user_tier(wallet.user_id)
            .await?
            .ok_or_else(|| LedgerError::Internal(format!("user {} has no tier", wallet.user_id)))?;

        tx.limit_entry(tier_id, &wallet.currency)
            .await?
            .ok_or_else(|| LedgerError::LimitConfigurationMissing {
                tier_id,
                currency: wallet.currency.clone(),
            })
    }

    /// Remaining headroom for `kind`, as of `now`
    pub async fn remaining(
        tx: &mut dyn LedgerTx,
        wallet: &Wallet,
        kind: LimitKind,
        now: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        let limit = Self::limit_for(tx, wallet).await?;
        match kind {
            LimitKind::TransactionCount => {
                let used = tx
                    .count_outgoing_since(wallet.id, accounting_day_start(now))
                    .await?;
                Ok(count_headroom(&limit, used))
            }
            _ => Ok(amount_headroom(&limit, wallet, kind)),
        }
    }

    /// Fail with `LimitExceeded` if `amount` does not fit under the `kind` ceiling.
    pub fn check_amount(
        limit: &LimitEntry,
        wallet: &Wallet,
        kind: LimitKind,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let remaining = amount_headroom(limit, wallet, kind);
        if amount > remaining {
            return Err(LedgerError::LimitExceeded {
                kind,
                remaining,
                currency: wallet.currency.clone(),
            });
        }
        Ok(())
    }

    /// Check both the amount ceiling for `kind` and the daily count ceiling.
    ///
    /// Must be called with `wallet` locked in `tx`.
    pub async fn check(
        tx: &mut dyn LedgerTx,
        wallet: &Wallet,
        kind: LimitKind,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<LimitEntry, LedgerError> {
        let limit = Self::limit_for(tx, wallet).await?;
        Self::check_amount(&limit, wallet, kind, amount)?;

        let used = tx
            .count_outgoing_since(wallet.id, accounting_day_start(now))
            .await?;
        let remaining = count_headroom(&limit, used);
        if remaining < Decimal::ONE {
            return Err(LedgerError::LimitExceeded {
                kind: LimitKind::TransactionCount,
                remaining,
                currency: wallet.currency.clone(),
            });
        }

        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limit(withdrawal: i64, transfer: i64, count: i64) -> LimitEntry {
        LimitEntry {
            tier_id: 1,
            currency: "USD".into(),
            daily_withdrawal_limit: Decimal::from(withdrawal),
            daily_transfer_limit: Decimal::from(transfer),
            daily_transactions_limit: count,
        }
    }

    fn wallet(transferred: i64, withdrawn: i64) -> Wallet {
        let now = Utc::now();
        Wallet {
            id: 1,
            user_id: 1,
            name: "USD Wallet".into(),
            currency: "USD".into(),
            balance: Decimal::from(1000),
            transferred_today: Decimal::from(transferred),
            withdrawn_today: Decimal::from(withdrawn),
            is_active: true,
            counter_epoch: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_amount_headroom() {
        let l = limit(300, 5000, 10);
        let w = wallet(1200, 100);
        assert_eq!(amount_headroom(&l, &w, LimitKind::Transfer), Decimal::from(3800));
        assert_eq!(amount_headroom(&l, &w, LimitKind::Withdrawal), Decimal::from(200));
    }

    #[test]
    fn test_headroom_never_negative() {
        // Limit lowered below what was already used today
        let l = limit(50, 50, 10);
        let w = wallet(80, 80);
        assert_eq!(amount_headroom(&l, &w, LimitKind::Transfer), Decimal::ZERO);
        assert_eq!(count_headroom(&l, 15), Decimal::ZERO);
    }

    #[test]
    fn test_check_amount_exact_fit_passes() {
        let l = limit(100, 100, 10);
        let w = wallet(0, 0);
        assert!(LimitEnforcer::check_amount(&l, &w, LimitKind::Transfer, Decimal::from(100)).is_ok());
    }

    #[test]
    fn test_check_amount_reports_remaining() {
        let l = limit(100, 100, 10);
        let w = wallet(0, 0);
        let err = LimitEnforcer::check_amount(&l, &w, LimitKind::Transfer, Decimal::from(150))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::LimitExceeded {
                kind: LimitKind::Transfer,
                remaining: Decimal::from(100),
                currency: "USD".into(),
            }
        );
    }

    #[test]
    fn test_accounting_day_start_is_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 23, 59, 59).unwrap();
        assert_eq!(
            accounting_day_start(now),
            Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap()
        );
    }
}
