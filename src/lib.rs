//! Wallet Ledger - Multi-Currency Digital-Wallet Ledger
//!
//! Users hold one or more single-currency wallets. Money enters from ATMs
//! and bank transfers, leaves the same way, and moves between wallets
//! through a two-phase accept/decline protocol. Every balance change is an
//! immutable transaction leg; daily per-tier limits are enforced on every
//! outgoing movement.
//!
//! # Modules
//!
//! - [`core_types`] - Id aliases and the transaction [`Reference`]
//! - [`money`] - Amount validation and parsing
//! - [`ledger`] - Wallets, legs, limits, the store seam and primitive operations
//! - [`transfer`] - Two-phase wallet-to-wallet transfers and expiry
//! - [`events`] - Bank/ATM event routing
//! - [`atm`] - One-time ATM codes
//! - [`notify`] - Outbound SMS, delivered after commit
//! - [`reset`] - Daily counter reset
//! - [`gateway`] - HTTP boundary
//! - [`config`], [`logging`], [`db`] - Process wiring

// Core types - must be first!
pub mod core_types;
pub mod money;

// Ledger components
pub mod atm;
pub mod events;
pub mod ledger;
pub mod notify;
pub mod reset;
pub mod transfer;

// Service wiring
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;

// Convenient re-exports at crate root
pub use core_types::{Reference, TierId, TransactionId, UserId, WalletId};
pub use events::{EventDispatcher, EventOutcome};
pub use ledger::{
    Actor, InMemoryStore, LedgerEngine, LedgerError, LedgerStore, PgLedgerStore, Wallet,
};
pub use transfer::{TransferAction, TransferProtocol, TransferRequest};
