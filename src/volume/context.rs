/// What a run is bound to: an owner-wide lease or a tracked task
use crate::errors::SwapResult;
use crate::ledger::SwapOutcome;
use crate::store::TaskStatusSource;

use super::aggregator::TaskDeltaAggregator;
use super::guard::OwnerLease;
use super::types::{Direction, RunMode};

pub enum RunContext {
    OwnerGuarded {
        lease: OwnerLease,
        mode: RunMode,
    },
    TaskTracked {
        task_id: String,
        job_name: String,
        aggregator: TaskDeltaAggregator,
    },
}

impl RunContext {
    pub fn ad_hoc(lease: OwnerLease) -> Self {
        RunContext::OwnerGuarded {
            lease,
            mode: RunMode::AdHoc,
        }
    }

    pub fn sweep(lease: OwnerLease) -> Self {
        RunContext::OwnerGuarded {
            lease,
            mode: RunMode::Sweep,
        }
    }

    pub fn tracked(owner: &str, task_id: &str, job_name: &str) -> Self {
        RunContext::TaskTracked {
            task_id: task_id.to_string(),
            job_name: job_name.to_string(),
            aggregator: TaskDeltaAggregator::new(owner, task_id, job_name),
        }
    }

    pub fn mode(&self) -> RunMode {
        match self {
            RunContext::OwnerGuarded { mode, .. } => *mode,
            RunContext::TaskTracked { .. } => RunMode::Tracked,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            RunContext::TaskTracked { task_id, .. } => Some(task_id),
            RunContext::OwnerGuarded { .. } => None,
        }
    }

    pub fn job_name(&self) -> Option<&str> {
        match self {
            RunContext::TaskTracked { job_name, .. } => Some(job_name),
            RunContext::OwnerGuarded { .. } => None,
        }
    }

    /// Cancel flag for guarded runs, terminal task status for tracked ones
    pub async fn should_stop(&self, tasks: &dyn TaskStatusSource) -> SwapResult<bool> {
        match self {
            RunContext::OwnerGuarded { lease, .. } => lease.is_cancelled().await,
            RunContext::TaskTracked { task_id, .. } => {
                Ok(tasks.status(task_id).await?.is_terminal())
            }
        }
    }

    /// Only tracked runs keep per-wallet totals
    pub fn record_success(&mut self, wallet: &str, outcome: &SwapOutcome, direction: Direction) {
        if let RunContext::TaskTracked { aggregator, .. } = self {
            aggregator.add(
                wallet,
                outcome.amount_in,
                outcome.amount_out,
                outcome.gas.net(),
                direction,
            );
        }
    }
}
