//! Ledger core
//!
//! Wallets, the transaction log, tiered daily limits and the single-leg
//! balance operations, behind a unit-of-work storage seam with PostgreSQL and
//! in-memory implementations.

pub mod engine;
pub mod error;
pub mod limits;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use engine::LedgerEngine;
pub use error::LedgerError;
pub use limits::{LimitEnforcer, LimitKind};
pub use memory::InMemoryStore;
pub use models::{
    Actor, AtmCode, LimitEntry, MoneySource, Transaction, TransactionStatus, TransactionType,
    TransferLegs, UserContact, Wallet,
};
pub use postgres::PgLedgerStore;
pub use store::{LedgerStore, LedgerTx};
