//! PostgreSQL ledger store
//!
//! Every unit of work is one `sqlx::Transaction`. Wallet, transfer leg and
//! ATM code rows are read with `FOR UPDATE` so concurrent read-check-write
//! sequences on the same row are serialized by the database. Status changes
//! are CAS updates (`WHERE status = $expected`).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};

use crate::core_types::{Reference, TierId, UserId, WalletId};

use super::error::LedgerError;
use super::models::{
    Actor, AtmCode, LimitEntry, NewTransaction, NewWallet, Transaction, TransactionStatus,
    TransactionType, TransferLegs, UserContact, Wallet,
};
use super::store::{LedgerResult, LedgerStore, LedgerTx};

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_wallet(row: &PgRow) -> Wallet {
    Wallet {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        currency: row.get("currency"),
        balance: row.get("balance"),
        transferred_today: row.get("transferred_today"),
        withdrawn_today: row.get("withdrawn_today"),
        is_active: row.get("is_active"),
        counter_epoch: row.get("counter_epoch"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_transaction(row: &PgRow) -> LedgerResult<Transaction> {
    let transaction_type: String = row.get("transaction_type");
    let money_source: String = row.get("money_source");
    let status: String = row.get("status");
    let reference: String = row.get("reference");

    Ok(Transaction {
        id: row.get("id"),
        wallet_id: row.get("wallet_id"),
        related_wallet_id: row.get("related_wallet_id"),
        amount: row.get("amount"),
        transaction_type: transaction_type.parse().map_err(LedgerError::Internal)?,
        money_source: money_source.parse().map_err(LedgerError::Internal)?,
        status: status.parse().map_err(LedgerError::Internal)?,
        reference: Reference::from(reference),
        description: row.get("description"),
        expires_at: row.get("expires_at"),
        reserved_epoch: row.get("reserved_epoch"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_atm_code(row: &PgRow) -> AtmCode {
    AtmCode {
        id: row.get("id"),
        user_id: row.get("user_id"),
        code: row.get("code"),
        is_used: row.get("is_used"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }
}

fn rows_to_legs(rows: &[PgRow]) -> LedgerResult<Option<TransferLegs>> {
    let mut out_leg = None;
    let mut in_leg = None;
    for row in rows {
        let leg = row_to_transaction(row)?;
        match leg.transaction_type {
            TransactionType::TransferOut => out_leg = Some(leg),
            TransactionType::TransferIn => in_leg = Some(leg),
            _ => {}
        }
    }
    match (out_leg, in_leg) {
        (Some(out_leg), Some(in_leg)) => Ok(Some(TransferLegs { out_leg, in_leg })),
        (None, None) => Ok(None),
        _ => Err(LedgerError::Internal(
            "transfer reference with a single leg".into(),
        )),
    }
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn load_actor(&self, user_id: UserId) -> LedgerResult<Option<Actor>> {
        let row = sqlx::query("SELECT id, tier_id, is_active FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Actor {
            user_id: row.get("id"),
            tier_id: row.get("tier_id"),
            is_active: row.get("is_active"),
        }))
    }

    async fn user_contact(&self, user_id: UserId) -> LedgerResult<Option<UserContact>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, phone_number FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserContact {
            user_id: row.get("id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            phone_number: row.get("phone_number"),
        }))
    }

    async fn get_wallet(&self, wallet_id: WalletId) -> LedgerResult<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, currency, balance, transferred_today,
                   withdrawn_today, is_active, counter_epoch, created_at, updated_at
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_wallet))
    }

    async fn user_wallets(&self, user_id: UserId) -> LedgerResult<Vec<Wallet>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, name, currency, balance, transferred_today,
                   withdrawn_today, is_active, counter_epoch, created_at, updated_at
            FROM wallets
            WHERE user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_wallet).collect())
    }

    async fn transfer_legs(&self, reference: &Reference) -> LedgerResult<Option<TransferLegs>> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet_id, related_wallet_id, amount, transaction_type, money_source,
                   status, reference, description, expires_at, reserved_epoch, created_at, updated_at
            FROM transactions
            WHERE reference = $1 AND transaction_type IN ('TRANSFER_OUT', 'TRANSFER_IN')
            "#,
        )
        .bind(reference.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_to_legs(&rows)
    }

    async fn wallet_transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> LedgerResult<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet_id, related_wallet_id, amount, transaction_type, money_source,
                   status, reference, description, expires_at, reserved_epoch, created_at, updated_at
            FROM transactions
            WHERE wallet_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn last_daily_reset(&self) -> LedgerResult<Option<NaiveDate>> {
        let day = sqlx::query_scalar::<_, Option<NaiveDate>>("SELECT MAX(day) FROM daily_resets")
            .fetch_one(&self.pool)
            .await?;
        Ok(day)
    }
}

// ============================================================================
// Unit of work
// ============================================================================

struct PgLedgerTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_user(&mut self, user_id: UserId) -> LedgerResult<Option<Actor>> {
        let row = sqlx::query("SELECT id, tier_id, is_active FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|row| Actor {
            user_id: row.get("id"),
            tier_id: row.get("tier_id"),
            is_active: row.get("is_active"),
        }))
    }

    async fn user_tier(&mut self, user_id: UserId) -> LedgerResult<Option<TierId>> {
        let tier = sqlx::query_scalar::<_, i64>("SELECT tier_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(tier)
    }

    async fn wallet_quota(&mut self, tier_id: TierId) -> LedgerResult<Option<i64>> {
        let quota =
            sqlx::query_scalar::<_, i64>("SELECT number_of_wallets FROM tiers WHERE id = $1")
                .bind(tier_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(quota)
    }

    async fn limit_entry(
        &mut self,
        tier_id: TierId,
        currency: &str,
    ) -> LedgerResult<Option<LimitEntry>> {
        let row = sqlx::query(
            r#"
            SELECT tier_id, currency, daily_withdrawal_limit, daily_transfer_limit,
                   daily_transactions_limit
            FROM tier_limits
            WHERE tier_id = $1 AND currency = $2
            "#,
        )
        .bind(tier_id)
        .bind(currency)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|row| LimitEntry {
            tier_id: row.get("tier_id"),
            currency: row.get("currency"),
            daily_withdrawal_limit: row.get("daily_withdrawal_limit"),
            daily_transfer_limit: row.get("daily_transfer_limit"),
            daily_transactions_limit: row.get("daily_transactions_limit"),
        }))
    }

    async fn lock_wallet(&mut self, wallet_id: WalletId) -> LedgerResult<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, currency, balance, transferred_today,
                   withdrawn_today, is_active, counter_epoch, created_at, updated_at
            FROM wallets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(row_to_wallet))
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $1, transferred_today = $2, withdrawn_today = $3,
                is_active = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(wallet.balance)
        .bind(wallet.transferred_today)
        .bind(wallet.withdrawn_today)
        .bind(wallet.is_active)
        .bind(wallet.id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(LedgerError::WalletNotFound(wallet.id));
        }
        Ok(())
    }

    async fn insert_wallet(&mut self, wallet: NewWallet) -> LedgerResult<Wallet> {
        let row = sqlx::query(
            r#"
            INSERT INTO wallets (user_id, name, currency, balance, transferred_today, withdrawn_today)
            VALUES ($1, $2, $3, $4, $4, $4)
            RETURNING id, user_id, name, currency, balance, transferred_today,
                      withdrawn_today, is_active, counter_epoch, created_at, updated_at
            "#,
        )
        .bind(wallet.user_id)
        .bind(&wallet.name)
        .bind(&wallet.currency)
        .bind(Decimal::ZERO)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row_to_wallet(&row))
    }

    async fn wallet_names(&mut self, user_id: UserId) -> LedgerResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(names)
    }

    async fn insert_transaction(&mut self, leg: NewTransaction) -> LedgerResult<Transaction> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions
                (wallet_id, related_wallet_id, amount, transaction_type, money_source,
                 status, reference, description, expires_at, reserved_epoch)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, wallet_id, related_wallet_id, amount, transaction_type, money_source,
                      status, reference, description, expires_at, reserved_epoch, created_at, updated_at
            "#,
        )
        .bind(leg.wallet_id)
        .bind(leg.related_wallet_id)
        .bind(leg.amount)
        .bind(leg.transaction_type.as_str())
        .bind(leg.money_source.as_str())
        .bind(leg.status.as_str())
        .bind(leg.reference.as_str())
        .bind(&leg.description)
        .bind(leg.expires_at)
        .bind(leg.reserved_epoch)
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_transaction(&row)
    }

    async fn count_outgoing_since(
        &mut self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> LedgerResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM transactions
            WHERE wallet_id = $1
              AND transaction_type IN ('WITHDRAWAL', 'TRANSFER_OUT')
              AND status IN ('PENDING', 'PROCESSING', 'COMPLETED')
              AND created_at >= $2
            "#,
        )
        .bind(wallet_id)
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn lock_transfer(&mut self, reference: &Reference) -> LedgerResult<Option<TransferLegs>> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet_id, related_wallet_id, amount, transaction_type, money_source,
                   status, reference, description, expires_at, reserved_epoch, created_at, updated_at
            FROM transactions
            WHERE reference = $1 AND transaction_type IN ('TRANSFER_OUT', 'TRANSFER_IN')
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(reference.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        rows_to_legs(&rows)
    }

    async fn set_transfer_status(
        &mut self,
        reference: &Reference,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> LedgerResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $1, updated_at = NOW()
            WHERE reference = $2 AND status = $3
            "#,
        )
        .bind(to.as_str())
        .bind(reference.as_str())
        .bind(from.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn expired_transfer_references(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> LedgerResult<Vec<Reference>> {
        let refs = sqlx::query_scalar::<_, String>(
            r#"
            SELECT reference
            FROM transactions
            WHERE transaction_type = 'TRANSFER_OUT'
              AND status = 'PENDING'
              AND expires_at < $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(refs.into_iter().map(Reference::from).collect())
    }

    async fn insert_atm_code(
        &mut self,
        user_id: UserId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> LedgerResult<AtmCode> {
        let row = sqlx::query(
            r#"
            INSERT INTO atm_codes (user_id, code, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, code, is_used, expires_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row_to_atm_code(&row))
    }

    async fn lock_atm_code(
        &mut self,
        phone_number: &str,
        code: &str,
    ) -> LedgerResult<Option<AtmCode>> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.user_id, c.code, c.is_used, c.expires_at, c.created_at
            FROM atm_codes c
            JOIN users u ON u.id = c.user_id
            WHERE u.phone_number = $1 AND c.code = $2
            ORDER BY c.created_at DESC, c.id DESC
            LIMIT 1
            FOR UPDATE OF c
            "#,
        )
        .bind(phone_number)
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(row_to_atm_code))
    }

    async fn mark_atm_code_used(&mut self, id: i64) -> LedgerResult<bool> {
        let result =
            sqlx::query("UPDATE atm_codes SET is_used = TRUE WHERE id = $1 AND is_used = FALSE")
                .bind(id)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn wallet_ids_after(
        &mut self,
        cursor: WalletId,
        limit: i64,
    ) -> LedgerResult<Vec<WalletId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM wallets WHERE id > $1 ORDER BY id LIMIT $2",
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }

    async fn reset_daily_counters(&mut self, wallet_ids: &[WalletId]) -> LedgerResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET transferred_today = 0, withdrawn_today = 0,
                counter_epoch = counter_epoch + 1, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(wallet_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn record_daily_reset(&mut self, day: NaiveDate) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_resets (day) VALUES ($1)
            ON CONFLICT (day) DO UPDATE SET completed_at = NOW()
            "#,
        )
        .bind(day)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
