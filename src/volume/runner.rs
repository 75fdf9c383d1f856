/// The planned-amount swap loop shared by ad-hoc and tracked runs
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::errors::SwapResult;
use crate::ledger::{SwapOutcome, SwapRequest};
use crate::logger::{self, LogTag};

use super::context::RunContext;
use super::engine::SwapEngine;
use super::random::RandomAmountGenerator;
use super::types::{
    failure_summary, tally_summary, AttemptStatus, Direction, RunReport, StopReason, SwapAttempt,
    SwapRunConfig,
};

/// Counters carried across attempts
#[derive(Debug, Clone, Default)]
pub(super) struct RunTally {
    pub attempts: u32,
    pub successes: u32,
    pub consumed: u64,
    pub remaining: u64,
    pub gas_used: u64,
}

/// Labels copied onto every history row of one run
pub(super) struct AttemptLabels<'a> {
    pub owner: &'a str,
    pub pool_address: &'a str,
    pub direction: Direction,
    pub strategy_id: Option<&'a str>,
    pub strategy_name: Option<&'a str>,
    pub task_id: Option<&'a str>,
    pub job_name: Option<&'a str>,
}

impl AttemptLabels<'_> {
    pub fn record(&self, wallet: &str, requested: u64, outcome: &SwapOutcome) -> SwapAttempt {
        SwapAttempt {
            timestamp: Utc::now(),
            owner: self.owner.to_string(),
            wallet: wallet.to_string(),
            pool_address: self.pool_address.to_string(),
            direction: self.direction,
            status: if outcome.ok {
                AttemptStatus::Success
            } else {
                AttemptStatus::Failure
            },
            tx_reference: outcome.tx_reference.clone(),
            amount_in: if outcome.ok { outcome.amount_in } else { requested },
            amount_out: outcome.amount_out,
            gas_total: outcome.gas.total(),
            gas_net: outcome.gas.net(),
            strategy_id: self.strategy_id.map(str::to_string),
            strategy_name: self.strategy_name.map(str::to_string),
            task_id: self.task_id.map(str::to_string),
            job_name: self.job_name.map(str::to_string),
        }
    }
}

/// The next attempt takes the whole remainder when the draw would overshoot
/// it or when it is the last attempt allowed
pub(super) fn clip_next(next: u64, remaining: u64, attempts_done: u32, max_attempts: u32) -> u64 {
    if remaining <= next || attempts_done.saturating_add(1) >= max_attempts {
        remaining
    } else {
        next
    }
}

impl SwapEngine {
    pub(super) async fn drive(&self, config: SwapRunConfig, mut ctx: RunContext) -> RunReport {
        let mut tally = RunTally {
            remaining: config.stop_threshold,
            ..RunTally::default()
        };
        let mut batch = Vec::new();
        let mut generator = RandomAmountGenerator::new((self.random)());

        let result = self
            .swap_loop(&config, &mut ctx, &mut generator, &mut tally, &mut batch)
            .await;
        self.finish_run(&config, ctx, batch, tally, result).await
    }

    async fn swap_loop(
        &self,
        config: &SwapRunConfig,
        ctx: &mut RunContext,
        generator: &mut RandomAmountGenerator,
        tally: &mut RunTally,
        batch: &mut Vec<SwapAttempt>,
    ) -> SwapResult<StopReason> {
        let started = Instant::now();
        let input_decimals = config.input_decimals();
        // The first draw is used as is; only recomputed draws are clipped
        let mut next = generator.amount(config.lower_bound, config.upper_bound, input_decimals)?;

        while tally.remaining >= next && tally.attempts < config.max_attempts {
            if ctx.should_stop(self.tasks.as_ref()).await? {
                logger::info(
                    LogTag::Engine,
                    &format!("Run for {} cancelled after {} attempts", config.owner, tally.attempts),
                );
                return Ok(StopReason::Cancelled);
            }
            if let Some(limit) = self.settings.max_run_duration {
                if started.elapsed() >= limit {
                    logger::warning(
                        LogTag::Engine,
                        &format!("Run for {} hit its {}s deadline", config.owner, limit.as_secs()),
                    );
                    return Ok(StopReason::Deadline);
                }
            }

            let wallet = config.wallets[generator.wallet_index(config.wallets.len())].clone();
            let request = SwapRequest {
                wallet: wallet.clone(),
                pool_address: config.pool_address.clone(),
                direction: config.direction,
                amount: next,
                slippage: config.slippage,
                decimals_a: config.decimals_a,
                decimals_b: config.decimals_b,
            };
            let outcome = self.execute_attempt(&request).await;

            if outcome.ok {
                tally.remaining = tally.remaining.saturating_sub(next);
                tally.consumed = tally.consumed.saturating_add(next);
                tally.successes += 1;
                tally.gas_used = tally.gas_used.saturating_add(outcome.gas.net());
                ctx.record_success(&wallet, &outcome, config.direction);
            }
            logger::debug(
                LogTag::Engine,
                &format!(
                    "Attempt {} for {}: wallet={} amount={} ok={} remaining={}",
                    tally.attempts + 1,
                    config.owner,
                    wallet,
                    next,
                    outcome.ok,
                    tally.remaining
                ),
            );

            let labels = AttemptLabels {
                owner: &config.owner,
                pool_address: &config.pool_address,
                direction: config.direction,
                strategy_id: config.strategy_id.as_deref(),
                strategy_name: config.strategy_name.as_deref(),
                task_id: ctx.task_id(),
                job_name: ctx.job_name(),
            };
            batch.push(labels.record(&wallet, next, &outcome));
            tally.attempts += 1;

            if tally.remaining == 0 {
                return Ok(StopReason::Completed);
            }
            if tally.attempts >= config.max_attempts {
                return Ok(StopReason::AttemptCeiling);
            }

            self.pause(generator).await;
            next = generator.amount(config.lower_bound, config.upper_bound, input_decimals)?;
            next = clip_next(next, tally.remaining, tally.attempts, config.max_attempts);
        }

        if tally.attempts >= config.max_attempts {
            Ok(StopReason::AttemptCeiling)
        } else {
            Ok(StopReason::ThresholdUnreachable)
        }
    }

    pub(super) async fn pause(&self, generator: &mut RandomAmountGenerator) {
        let delay_ms = generator.delay_ms(&self.settings.delay);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    /// Flushes history, then either releases the lease and notifies or
    /// persists the task's delta rows
    async fn finish_run(
        &self,
        config: &SwapRunConfig,
        ctx: RunContext,
        batch: Vec<SwapAttempt>,
        tally: RunTally,
        result: SwapResult<StopReason>,
    ) -> RunReport {
        let mode = ctx.mode();
        let (stop_reason, error) = match result {
            Ok(reason) => (reason, None),
            Err(e) => {
                logger::error(
                    LogTag::Engine,
                    &format!("Run for {} aborted after {} attempts: {}", config.owner, tally.attempts, e),
                );
                let reason = if e.is_configuration() {
                    StopReason::ConfigError
                } else {
                    StopReason::Aborted
                };
                (reason, Some(e.to_string()))
            }
        };
        let summary = if stop_reason.is_failure() {
            failure_summary(tally.successes, tally.attempts)
        } else {
            tally_summary(tally.successes, tally.attempts)
        };

        self.flush_history(&config.owner, &batch).await;

        match ctx {
            RunContext::OwnerGuarded { lease, .. } => {
                if let Err(e) = lease.release(&summary).await {
                    logger::error(
                        LogTag::Guard,
                        &format!("Failed to release guard for {}: {}", config.owner, e),
                    );
                }
                self.notify_owner(&config.owner, &summary).await;
            }
            RunContext::TaskTracked {
                task_id, aggregator, ..
            } => {
                let rows = aggregator.flush();
                if !rows.is_empty() {
                    match self.deltas.persist_deltas(&rows).await {
                        Ok(n) => logger::debug(
                            LogTag::Tasks,
                            &format!("Persisted {} delta rows for task {}", n, task_id),
                        ),
                        Err(e) => logger::error(
                            LogTag::Tasks,
                            &format!("Failed to persist deltas for task {}: {}", task_id, e),
                        ),
                    }
                }
            }
        }

        logger::info(
            LogTag::Engine,
            &format!("Run for {} finished ({:?}): {}", config.owner, stop_reason, summary),
        );

        RunReport {
            owner: config.owner.clone(),
            mode,
            attempts: tally.attempts,
            successes: tally.successes,
            consumed: tally.consumed,
            remaining: tally.remaining,
            gas_used: tally.gas_used,
            stop_reason,
            summary,
            error,
        }
    }

    pub(super) async fn flush_history(&self, owner: &str, batch: &[SwapAttempt]) {
        if batch.is_empty() {
            return;
        }
        match self.history.append_batch(batch).await {
            Ok(n) => logger::debug(
                LogTag::History,
                &format!("Wrote {} history records for {}", n, owner),
            ),
            Err(e) => logger::error(
                LogTag::History,
                &format!("Failed to write {} history records for {}: {}", batch.len(), owner, e),
            ),
        }
    }
}
