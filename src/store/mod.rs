//! Persistence seams
//!
//! The engine talks to storage only through these traits. `SwapDatabase`
//! implements all of them on SQLite; `MemoryStore` implements them in memory
//! for tests and dry runs.

pub mod database;
mod history;
pub mod memory;
mod process;
mod strategies;
mod tasks;

use async_trait::async_trait;

use crate::errors::SwapResult;
use crate::volume::types::{
    DeleteScope, DeltaQuery, HistoryFilter, Page, ProcessState, StrategyPreset, SwapAttempt,
    TaskRecord, TaskStatus, WalletDelta,
};

pub use database::SwapDatabase;
pub use memory::MemoryStore;

/// Per-owner run flags
#[async_trait]
pub trait ProcessStateStore: Send + Sync {
    /// Atomically flips `is_active` from false to true, clearing the cancel
    /// flag and the previous summary. Returns the new run token, or `None`
    /// if a run is active.
    async fn try_acquire(&self, owner: &str) -> SwapResult<Option<String>>;

    /// Marks the owner inactive and stores the summary, but only while
    /// `run_token` still holds the row. Returns false when a newer run has
    /// taken over.
    async fn release_run(&self, owner: &str, run_token: &str, summary: &str) -> SwapResult<bool>;

    /// Sets the cancel flag and clears `is_active`. Idempotent.
    async fn request_cancel(&self, owner: &str) -> SwapResult<()>;

    /// True once cancel was requested or another run has acquired the owner
    async fn is_cancelled(&self, owner: &str, run_token: &str) -> SwapResult<bool>;

    async fn get_state(&self, owner: &str) -> SwapResult<Option<ProcessState>>;
}

/// Append-only attempt history
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Bulk insert in order. Returns the number of rows written.
    async fn append_batch(&self, records: &[SwapAttempt]) -> SwapResult<usize>;

    /// Matching records, newest first
    async fn query_history(&self, filter: &HistoryFilter) -> SwapResult<Vec<SwapAttempt>>;

    /// Removes failed ad-hoc records (no job name) for an owner
    async fn delete_failed_history(&self, owner: &str, scope: &DeleteScope)
        -> SwapResult<usize>;
}

/// Live status of tracked tasks
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    /// A missing task is an error
    async fn status(&self, task_id: &str) -> SwapResult<TaskStatus>;
}

/// Task lifecycle management on top of the status source
#[async_trait]
pub trait TaskRegistry: TaskStatusSource {
    async fn create_task(&self, owner: &str, name: &str) -> SwapResult<TaskRecord>;

    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> SwapResult<()>;

    async fn get_task(&self, task_id: &str) -> SwapResult<Option<TaskRecord>>;
}

/// Per-wallet task deltas
#[async_trait]
pub trait DeltaSink: Send + Sync {
    /// Adds each row onto any existing row for the same
    /// (owner, task, job, wallet)
    async fn persist_deltas(&self, rows: &[WalletDelta]) -> SwapResult<usize>;

    async fn task_deltas(&self, query: &DeltaQuery) -> SwapResult<Page<WalletDelta>>;
}

/// Saved strategy presets
#[async_trait]
pub trait StrategyStore: Send + Sync {
    async fn upsert_strategy(&self, preset: &StrategyPreset) -> SwapResult<()>;

    async fn get_strategy(&self, id: &str) -> SwapResult<Option<StrategyPreset>>;

    async fn list_strategies(&self) -> SwapResult<Vec<StrategyPreset>>;

    /// Returns true if a preset was removed
    async fn delete_strategy(&self, id: &str) -> SwapResult<bool>;
}

/// Validates the arguments of a failed-history delete
pub(crate) fn validate_delete(owner: &str, scope: &DeleteScope) -> SwapResult<()> {
    if owner.trim().is_empty() {
        return Err(crate::errors::SwapError::invalid("owner", "must not be empty"));
    }
    if let DeleteScope::Pool(pool) = scope {
        if pool.trim().is_empty() {
            return Err(crate::errors::SwapError::invalid(
                "pool_address",
                "must not be empty when deleting a single pool",
            ));
        }
    }
    Ok(())
}
