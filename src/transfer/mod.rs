//! Wallet-to-Wallet Transfer Protocol
//!
//! Two-phase transfer between wallets of the same currency. Initiation
//! writes two linked PENDING legs sharing one reference; the recipient then
//! settles it, or the sender withdraws it.
//!
//! # State Machine
//!
//! ```text
//!           initiate
//!  (none) ───────────► PENDING
//! PENDING ── accept ──► COMPLETED   (balances move)
//! PENDING ── decline ─► DECLINED
//! PENDING ── cancel ──► CANCELED    (sender only)
//! PENDING ── limit recheck fails ─► FAILED
//! PENDING ── deadline passed ─────► EXPIRED
//! ```
//!
//! # Invariants
//!
//! 1. Both legs move together: every transition is one CAS over both rows
//!    inside one unit of work and must touch exactly two rows.
//! 2. Transfer headroom is reserved on the source at initiation and released
//!    by every terminal state except COMPLETED.
//! 3. Wallet rows are locked in ascending id order.

pub mod protocol;
pub mod state;
pub mod worker;

pub use protocol::{TransferProtocol, TransferRequest};
pub use state::TransferAction;
pub use worker::{ExpiryWorker, WorkerConfig};
