//! Swap orchestration engine
//!
//! Entry points for the three run modes. Ad-hoc and sweep runs hold the
//! per-owner guard for their whole lifetime; tracked runs are bound to a task
//! and rely on its lifecycle status instead. Collaborators are injected as
//! trait objects so tests can swap the ledger and the stores.
//!
//! ```text
//! start_run ──> OwnerGuard::try_acquire ──┬─ None ──> Rejected(AlreadyRunning)
//!                                         └─ lease ─> resolve preset ─> drive loop
//! run_tracked ─────────────────────────────────────> resolve preset ─> drive loop
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::errors::{SwapError, SwapResult};
use crate::ledger::{LedgerClient, SwapOutcome, SwapRequest};
use crate::logger::{self, LogTag};
use crate::notifications::{Notification, Notifier};
use crate::store::{DeltaSink, HistorySink, ProcessStateStore, StrategyStore, TaskStatusSource};

use super::context::RunContext;
use super::guard::{OwnerGuard, OwnerLease};
use super::random::RandomFactory;
use super::types::{
    failure_summary, DelayConfig, DeleteScope, DeltaQuery, HistoryFilter, Page, RunMode,
    RunReport, RunRequest, RunState, StopReason, SwapAttempt, SwapRunConfig, WalletDelta,
};

/// Engine-wide limits, fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub max_swap_attempts: u32,
    pub ledger_timeout: Duration,
    pub delay: DelayConfig,
    /// Optional wall-clock ceiling per run
    pub max_run_duration: Option<Duration>,
    pub channel_suffix: String,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        let engine = &config.engine;
        Self {
            max_swap_attempts: engine.max_swap_attempts,
            ledger_timeout: Duration::from_secs(engine.ledger_timeout_secs.max(1)),
            delay: DelayConfig::from_range(engine.delay_min_ms, engine.delay_max_ms),
            max_run_duration: (engine.max_run_duration_secs > 0)
                .then(|| Duration::from_secs(engine.max_run_duration_secs)),
            channel_suffix: config.notifier.channel_suffix.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Collaborators the engine talks to
#[derive(Clone)]
pub struct EngineDeps {
    pub ledger: Arc<dyn LedgerClient>,
    pub process: Arc<dyn ProcessStateStore>,
    pub history: Arc<dyn HistorySink>,
    pub tasks: Arc<dyn TaskStatusSource>,
    pub deltas: Arc<dyn DeltaSink>,
    pub strategies: Arc<dyn StrategyStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl EngineDeps {
    /// Every persistence seam served by one store
    pub fn from_store<S>(
        store: Arc<S>,
        ledger: Arc<dyn LedgerClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self
    where
        S: ProcessStateStore + HistorySink + TaskStatusSource + DeltaSink + StrategyStore + 'static,
    {
        Self {
            ledger,
            process: store.clone(),
            history: store.clone(),
            tasks: store.clone(),
            deltas: store.clone(),
            strategies: store,
            notifier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AlreadyRunning,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::AlreadyRunning => write!(f, "already running"),
        }
    }
}

/// Result of handing a run to the background
#[derive(Debug)]
pub enum StartOutcome {
    Accepted(JoinHandle<RunReport>),
    Rejected(RejectReason),
}

/// Result of running to completion on the caller's task
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunReport),
    Rejected(RejectReason),
}

pub struct SwapEngine {
    pub(super) ledger: Arc<dyn LedgerClient>,
    pub(super) guard: OwnerGuard,
    pub(super) process: Arc<dyn ProcessStateStore>,
    pub(super) history: Arc<dyn HistorySink>,
    pub(super) tasks: Arc<dyn TaskStatusSource>,
    pub(super) deltas: Arc<dyn DeltaSink>,
    pub(super) strategies: Arc<dyn StrategyStore>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) settings: EngineSettings,
    pub(super) random: RandomFactory,
}

impl SwapEngine {
    pub fn new(deps: EngineDeps, settings: EngineSettings, random: RandomFactory) -> Self {
        Self {
            ledger: deps.ledger,
            guard: OwnerGuard::new(deps.process.clone()),
            process: deps.process,
            history: deps.history,
            tasks: deps.tasks,
            deltas: deps.deltas,
            strategies: deps.strategies,
            notifier: deps.notifier,
            settings,
            random,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // =========================================================================
    // AD-HOC RUNS
    // =========================================================================

    /// Acquires the owner's guard and spawns the run.
    /// Rejection leaves the owner's stored state untouched.
    pub async fn start_run(self: &Arc<Self>, request: RunRequest) -> SwapResult<StartOutcome> {
        let owner = request.owner.to_lowercase();
        let Some(lease) = self.guard.try_acquire(&owner).await? else {
            logger::info(
                LogTag::Engine,
                &format!("Rejected run for {}: already running", owner),
            );
            return Ok(StartOutcome::Rejected(RejectReason::AlreadyRunning));
        };

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run_with_lease(lease, request).await });
        Ok(StartOutcome::Accepted(handle))
    }

    /// Same as [`start_run`](Self::start_run) but drives the loop inline
    pub async fn run_adhoc(&self, request: RunRequest) -> SwapResult<RunOutcome> {
        let owner = request.owner.to_lowercase();
        match self.guard.try_acquire(&owner).await? {
            Some(lease) => Ok(RunOutcome::Completed(
                self.run_with_lease(lease, request).await,
            )),
            None => Ok(RunOutcome::Rejected(RejectReason::AlreadyRunning)),
        }
    }

    async fn run_with_lease(&self, lease: OwnerLease, request: RunRequest) -> RunReport {
        let config = match self.resolve_config(&request, None).await {
            Ok(config) => config,
            Err(e) => return self.abort_guarded(lease, RunMode::AdHoc, e).await,
        };
        logger::info(
            LogTag::Engine,
            &format!(
                "Starting run for {} on pool {} ({} wallets, threshold {})",
                config.owner,
                config.pool_address,
                config.wallets.len(),
                config.stop_threshold
            ),
        );
        self.drive(config, RunContext::ad_hoc(lease)).await
    }

    // =========================================================================
    // TRACKED RUNS
    // =========================================================================

    /// Runs bound to `task_id`; no owner-wide guard is taken
    pub async fn run_tracked(&self, request: RunRequest, task_id: &str, job_name: &str) -> RunReport {
        let owner = request.owner.to_lowercase();
        let config = match self
            .resolve_config(&request, Some(job_name.to_string()))
            .await
        {
            Ok(config) => config,
            Err(e) => {
                logger::error(
                    LogTag::Engine,
                    &format!("Tracked run {} for {} not started: {}", task_id, owner, e),
                );
                return aborted_report(&owner, RunMode::Tracked, &e);
            }
        };
        logger::info(
            LogTag::Engine,
            &format!(
                "Starting tracked run {} ({}) for {}",
                task_id, job_name, config.owner
            ),
        );
        let ctx = RunContext::tracked(&config.owner, task_id, job_name);
        self.drive(config, ctx).await
    }

    pub fn start_tracked(
        self: &Arc<Self>,
        request: RunRequest,
        task_id: &str,
        job_name: &str,
    ) -> JoinHandle<RunReport> {
        let engine = Arc::clone(self);
        let task_id = task_id.to_string();
        let job_name = job_name.to_string();
        tokio::spawn(async move { engine.run_tracked(request, &task_id, &job_name).await })
    }

    // =========================================================================
    // QUERIES AND CONTROL
    // =========================================================================

    /// Always safe, even without an active run
    pub async fn cancel(&self, owner: &str) -> SwapResult<()> {
        self.guard.request_cancel(&owner.to_lowercase()).await
    }

    pub async fn run_state(&self, owner: &str) -> SwapResult<RunState> {
        let state = self.process.get_state(&owner.to_lowercase()).await?;
        Ok(RunState::from(state))
    }

    pub async fn task_deltas(&self, query: &DeltaQuery) -> SwapResult<Page<WalletDelta>> {
        self.deltas.task_deltas(query).await
    }

    pub async fn query_history(&self, filter: &HistoryFilter) -> SwapResult<Vec<SwapAttempt>> {
        self.history.query_history(filter).await
    }

    pub async fn delete_failed_history(&self, owner: &str, scope: &DeleteScope) -> SwapResult<usize> {
        self.history
            .delete_failed_history(&owner.to_lowercase(), scope)
            .await
    }

    // =========================================================================
    // SHARED HELPERS
    // =========================================================================

    async fn resolve_config(
        &self,
        request: &RunRequest,
        task_tag: Option<String>,
    ) -> SwapResult<SwapRunConfig> {
        let preset = self
            .strategies
            .get_strategy(&request.strategy_id)
            .await?
            .ok_or_else(|| SwapError::StrategyNotFound(request.strategy_id.clone()))?;
        preset.to_run_config(
            &request.owner,
            &request.wallets,
            self.settings.max_swap_attempts,
            task_tag,
        )
    }

    /// Ends a guarded run that never reached its first attempt
    pub(super) async fn abort_guarded(
        &self,
        lease: OwnerLease,
        mode: RunMode,
        error: SwapError,
    ) -> RunReport {
        let owner = lease.owner().to_string();
        logger::error(
            LogTag::Engine,
            &format!("Run for {} aborted before start: {}", owner, error),
        );
        let report = aborted_report(&owner, mode, &error);
        if let Err(e) = lease.release(&report.summary).await {
            logger::error(
                LogTag::Guard,
                &format!("Failed to release guard for {}: {}", owner, e),
            );
        }
        report
    }

    /// Ledger call bounded by the configured timeout.
    /// Errors and timeouts become failed outcomes.
    pub(super) async fn execute_attempt(&self, request: &SwapRequest) -> SwapOutcome {
        match tokio::time::timeout(self.settings.ledger_timeout, self.ledger.execute_swap(request))
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                logger::warning(
                    LogTag::Ledger,
                    &format!("Swap for {} failed: {}", request.wallet, e),
                );
                SwapOutcome::failed()
            }
            Err(_) => {
                let e = SwapError::LedgerTimeout {
                    seconds: self.settings.ledger_timeout.as_secs(),
                };
                logger::warning(
                    LogTag::Ledger,
                    &format!("Swap for {} failed: {}", request.wallet, e),
                );
                SwapOutcome::failed()
            }
        }
    }

    /// Failures are logged; the run result never depends on delivery
    pub(super) async fn notify_owner(&self, owner: &str, summary: &str) {
        let notification = Notification::for_owner(owner, &self.settings.channel_suffix, summary);
        if let Err(e) = self.notifier.publish(&notification).await {
            logger::warning(
                LogTag::Notify,
                &format!("Failed to notify {}: {}", owner, e),
            );
        }
    }
}

pub(super) fn aborted_report(owner: &str, mode: RunMode, error: &SwapError) -> RunReport {
    let stop_reason = if error.is_configuration() {
        StopReason::ConfigError
    } else {
        StopReason::Aborted
    };
    RunReport {
        owner: owner.to_string(),
        mode,
        attempts: 0,
        successes: 0,
        consumed: 0,
        remaining: 0,
        gas_used: 0,
        stop_reason,
        summary: failure_summary(0, 0),
        error: Some(error.to_string()),
    }
}
