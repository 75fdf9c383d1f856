//! Swap orchestration engine
//!
//! Drives sequences of randomized swaps for an owner's wallets against a
//! ledger until a cumulative stop threshold or an attempt ceiling is reached.
//! See [`volume::SwapEngine`] for the entry points.

pub mod amounts;
pub mod arguments;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod logger;
pub mod notifications;
pub mod paths;
pub mod store;
pub mod volume;
