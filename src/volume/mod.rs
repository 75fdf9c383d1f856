//! Volume runs
//!
//! The swap loop, its per-owner guard, the per-task delta aggregator and the
//! injected randomness, plus the types shared with the stores and the CLI.

pub mod aggregator;
pub mod context;
pub mod engine;
pub mod guard;
pub mod random;
mod runner;
pub mod sweep;
pub mod types;

#[cfg(test)]
mod tests;

pub use aggregator::{DeltaTotals, TaskDeltaAggregator};
pub use context::RunContext;
pub use engine::{EngineDeps, EngineSettings, RejectReason, RunOutcome, StartOutcome, SwapEngine};
pub use guard::{OwnerGuard, OwnerLease};
pub use random::{default_factory, RandomAmountGenerator, RandomFactory, RandomSource, RngSource};
pub use sweep::SWEEP_MIN_BALANCE;
pub use types::*;
