//! Sweep runs (swap-all)
//!
//! Drains each selected wallet's whole input-token balance into the pool.
//! Holds the same per-owner guard as an ad-hoc run. A wallet leaves the
//! rotation once it is swapped successfully or its balance is at or below
//! [`SWEEP_MIN_BALANCE`]; failed wallets stay eligible until the iteration
//! bound is reached.

use std::sync::Arc;

use crate::errors::{SwapError, SwapResult};
use crate::ledger::SwapRequest;
use crate::logger::{self, LogTag};

use super::context::RunContext;
use super::engine::{RejectReason, RunOutcome, StartOutcome, SwapEngine};
use super::guard::OwnerLease;
use super::random::RandomAmountGenerator;
use super::runner::{AttemptLabels, RunTally};
use super::types::{
    failure_summary, tally_summary, RunMode, RunReport, StopReason, SweepRequest, SwapAttempt,
    SWEEP_STRATEGY,
};

/// Balances at or below this many base units are not worth a swap
pub const SWEEP_MIN_BALANCE: u64 = 1000;

impl SweepRequest {
    pub fn validate(&self) -> SwapResult<()> {
        if self.owner.trim().is_empty() {
            return Err(SwapError::invalid("owner", "must not be empty"));
        }
        if self.pool_address.trim().is_empty() {
            return Err(SwapError::invalid("pool_address", "must not be empty"));
        }
        if self.wallets.is_empty() {
            return Err(SwapError::invalid("wallets", "at least one wallet is required"));
        }
        if !self.slippage.is_finite() || !(0.0..1.0).contains(&self.slippage) {
            return Err(SwapError::invalid("slippage", "must be in [0, 1)"));
        }
        Ok(())
    }
}

impl SwapEngine {
    pub async fn start_sweep(self: &Arc<Self>, request: SweepRequest) -> SwapResult<StartOutcome> {
        let owner = request.owner.to_lowercase();
        let Some(lease) = self.guard.try_acquire(&owner).await? else {
            logger::info(
                LogTag::Engine,
                &format!("Rejected sweep for {}: already running", owner),
            );
            return Ok(StartOutcome::Rejected(RejectReason::AlreadyRunning));
        };

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.sweep_with_lease(lease, request).await });
        Ok(StartOutcome::Accepted(handle))
    }

    pub async fn run_sweep(&self, request: SweepRequest) -> SwapResult<RunOutcome> {
        let owner = request.owner.to_lowercase();
        match self.guard.try_acquire(&owner).await? {
            Some(lease) => Ok(RunOutcome::Completed(
                self.sweep_with_lease(lease, request).await,
            )),
            None => Ok(RunOutcome::Rejected(RejectReason::AlreadyRunning)),
        }
    }

    async fn sweep_with_lease(&self, lease: OwnerLease, request: SweepRequest) -> RunReport {
        if let Err(e) = request.validate() {
            return self.abort_guarded(lease, RunMode::Sweep, e).await;
        }

        let owner = lease.owner().to_string();
        let mut eligible: Vec<String> = Vec::new();
        for wallet in &request.wallets {
            let wallet = wallet.to_lowercase();
            if !eligible.contains(&wallet) {
                eligible.push(wallet);
            }
        }
        let selected = eligible.len() as u32;
        logger::info(
            LogTag::Engine,
            &format!(
                "Starting sweep for {} on pool {} ({} wallets)",
                owner, request.pool_address, selected
            ),
        );

        let ctx = RunContext::sweep(lease);
        let mut tally = RunTally::default();
        let mut batch = Vec::new();
        let mut generator = RandomAmountGenerator::new((self.random)());

        let result = self
            .sweep_loop(
                &owner,
                &request,
                &ctx,
                &mut eligible,
                &mut generator,
                &mut tally,
                &mut batch,
            )
            .await;

        let (stop_reason, error) = match result {
            Ok(reason) => (reason, None),
            Err(e) => {
                logger::error(
                    LogTag::Engine,
                    &format!("Sweep for {} aborted: {}", owner, e),
                );
                (StopReason::Aborted, Some(e.to_string()))
            }
        };
        let summary = if stop_reason.is_failure() {
            failure_summary(tally.successes, selected)
        } else {
            tally_summary(tally.successes, selected)
        };

        self.flush_history(&owner, &batch).await;
        if let RunContext::OwnerGuarded { lease, .. } = ctx {
            if let Err(e) = lease.release(&summary).await {
                logger::error(
                    LogTag::Guard,
                    &format!("Failed to release guard for {}: {}", owner, e),
                );
            }
        }
        self.notify_owner(&owner, &summary).await;
        logger::info(
            LogTag::Engine,
            &format!("Sweep for {} finished ({:?}): {}", owner, stop_reason, summary),
        );

        RunReport {
            owner,
            mode: RunMode::Sweep,
            attempts: tally.attempts,
            successes: tally.successes,
            consumed: tally.consumed,
            remaining: 0,
            gas_used: tally.gas_used,
            stop_reason,
            summary,
            error,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn sweep_loop(
        &self,
        owner: &str,
        request: &SweepRequest,
        ctx: &RunContext,
        eligible: &mut Vec<String>,
        generator: &mut RandomAmountGenerator,
        tally: &mut RunTally,
        batch: &mut Vec<SwapAttempt>,
    ) -> SwapResult<StopReason> {
        let labels = AttemptLabels {
            owner,
            pool_address: &request.pool_address,
            direction: request.direction,
            strategy_id: Some(SWEEP_STRATEGY),
            strategy_name: Some(SWEEP_STRATEGY),
            task_id: None,
            job_name: None,
        };
        let limit = self.settings.max_swap_attempts;
        let mut iterations = 0u32;

        while !eligible.is_empty() {
            if iterations >= limit {
                logger::warning(
                    LogTag::Engine,
                    &format!(
                        "Sweep for {} stopped after {} iterations with {} wallets left",
                        owner,
                        iterations,
                        eligible.len()
                    ),
                );
                return Ok(StopReason::AttemptCeiling);
            }
            iterations += 1;

            if ctx.should_stop(self.tasks.as_ref()).await? {
                logger::info(LogTag::Engine, &format!("Sweep for {} cancelled", owner));
                return Ok(StopReason::Cancelled);
            }

            let index = generator.wallet_index(eligible.len());
            let wallet = eligible[index].clone();
            let balance = match tokio::time::timeout(
                self.settings.ledger_timeout,
                self.ledger
                    .token_balance(&wallet, &request.pool_address, request.direction),
            )
            .await
            {
                Ok(Ok(balance)) => balance,
                Ok(Err(e)) => {
                    logger::warning(
                        LogTag::Ledger,
                        &format!("Balance read for {} failed: {}", wallet, e),
                    );
                    continue;
                }
                Err(_) => {
                    logger::warning(
                        LogTag::Ledger,
                        &format!("Balance read for {} timed out", wallet),
                    );
                    continue;
                }
            };

            if balance <= SWEEP_MIN_BALANCE {
                logger::debug(
                    LogTag::Engine,
                    &format!("Dropping {} from sweep, balance {}", wallet, balance),
                );
                eligible.remove(index);
                continue;
            }

            let swap = SwapRequest {
                wallet: wallet.clone(),
                pool_address: request.pool_address.clone(),
                direction: request.direction,
                amount: balance,
                slippage: request.slippage,
                decimals_a: request.decimals_a,
                decimals_b: request.decimals_b,
            };
            let outcome = self.execute_attempt(&swap).await;
            if outcome.ok {
                tally.successes += 1;
                tally.consumed = tally.consumed.saturating_add(balance);
                tally.gas_used = tally.gas_used.saturating_add(outcome.gas.net());
                eligible.remove(index);
            }
            batch.push(labels.record(&wallet, balance, &outcome));
            tally.attempts += 1;

            if !eligible.is_empty() {
                self.pause(generator).await;
            }
        }

        Ok(StopReason::Completed)
    }
}
