//! Engine scenarios against in-memory and SQLite stores with scripted
//! randomness and scripted ledgers

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::random::ScriptedSource;
use super::*;
use crate::errors::{SwapError, SwapResult};
use crate::ledger::{GasCost, LedgerClient, SwapOutcome, SwapRequest};
use crate::notifications::{owner_channel, Notification, Notifier};
use crate::store::{HistorySink, MemoryStore, ProcessStateStore, StrategyStore};

const OWNER: &str = "0xowner";
const SUFFIX: &str = "_account_stream";

// =============================================================================
// TEST DOUBLES
// =============================================================================

/// Plays back a fixed list of results, then repeats `fallback`
struct ScriptedLedger {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    calls: Mutex<Vec<SwapRequest>>,
    balances: HashMap<String, u64>,
    latency: Duration,
    cancel_after: Option<(usize, Arc<MemoryStore>)>,
    error: bool,
}

impl ScriptedLedger {
    fn always(ok: bool) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: ok,
            calls: Mutex::new(Vec::new()),
            balances: HashMap::new(),
            latency: Duration::ZERO,
            cancel_after: None,
            error: false,
        }
    }

    fn scripted(results: &[bool], fallback: bool) -> Self {
        let ledger = Self::always(fallback);
        ledger.script.lock().extend(results.iter().copied());
        ledger
    }

    fn erroring() -> Self {
        Self {
            error: true,
            ..Self::always(false)
        }
    }

    fn with_balances(mut self, balances: &[(&str, u64)]) -> Self {
        self.balances = balances
            .iter()
            .map(|(w, b)| (w.to_string(), *b))
            .collect();
        self
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn cancelling_after(mut self, calls: usize, store: Arc<MemoryStore>) -> Self {
        self.cancel_after = Some((calls, store));
        self
    }

    fn calls(&self) -> Vec<SwapRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn execute_swap(&self, request: &SwapRequest) -> SwapResult<SwapOutcome> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let call_count = {
            let mut calls = self.calls.lock();
            calls.push(request.clone());
            calls.len()
        };
        if let Some((after, store)) = &self.cancel_after {
            if call_count == *after {
                store.request_cancel(OWNER).await?;
            }
        }
        if self.error {
            return Err(SwapError::Ledger("node unreachable".to_string()));
        }

        let ok = self.script.lock().pop_front().unwrap_or(self.fallback);
        if !ok {
            return Ok(SwapOutcome {
                gas: GasCost::new(10, 0, 0),
                ..SwapOutcome::failed()
            });
        }
        Ok(SwapOutcome {
            ok: true,
            amount_in: request.amount,
            amount_out: request.amount / 100 * 95,
            gas: GasCost::new(10, 5, 3),
            tx_reference: Some(format!("tx-{}", call_count)),
        })
    }

    async fn token_balance(
        &self,
        wallet: &str,
        _pool_address: &str,
        _direction: Direction,
    ) -> SwapResult<u64> {
        self.balances
            .get(wallet)
            .copied()
            .ok_or_else(|| SwapError::Ledger(format!("no balance for {}", wallet)))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notification: &Notification) -> SwapResult<()> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Counts guard releases and can start failing cancel checks mid-run
struct CountingProcessStore {
    inner: Arc<MemoryStore>,
    releases: AtomicUsize,
    cancel_checks: AtomicUsize,
    fail_checks_after: Option<usize>,
}

impl CountingProcessStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            releases: AtomicUsize::new(0),
            cancel_checks: AtomicUsize::new(0),
            fail_checks_after: None,
        }
    }

    fn failing_after(inner: Arc<MemoryStore>, checks: usize) -> Self {
        Self {
            fail_checks_after: Some(checks),
            ..Self::new(inner)
        }
    }

    /// Lets any background release from a dropped lease land first
    async fn settled_releases(&self) -> usize {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessStateStore for CountingProcessStore {
    async fn try_acquire(&self, owner: &str) -> SwapResult<Option<String>> {
        self.inner.try_acquire(owner).await
    }

    async fn release_run(&self, owner: &str, run_token: &str, summary: &str) -> SwapResult<bool> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release_run(owner, run_token, summary).await
    }

    async fn request_cancel(&self, owner: &str) -> SwapResult<()> {
        self.inner.request_cancel(owner).await
    }

    async fn is_cancelled(&self, owner: &str, run_token: &str) -> SwapResult<bool> {
        let checks = self.cancel_checks.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_checks_after.map_or(false, |limit| checks > limit) {
            return Err(SwapError::Store("state store unavailable".to_string()));
        }
        self.inner.is_cancelled(owner, run_token).await
    }

    async fn get_state(&self, owner: &str) -> SwapResult<Option<ProcessState>> {
        self.inner.get_state(owner).await
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

fn settings(max_swap_attempts: u32) -> EngineSettings {
    EngineSettings {
        max_swap_attempts,
        ledger_timeout: Duration::from_secs(5),
        delay: DelayConfig::fixed(0),
        max_run_duration: None,
        channel_suffix: SUFFIX.to_string(),
    }
}

fn preset(id: &str, stop_threshold: &str) -> StrategyPreset {
    StrategyPreset {
        id: id.to_string(),
        name: format!("{} preset", id),
        pool_address: "0xpool".to_string(),
        direction: Direction::AToB,
        lower_bound: 1.0,
        upper_bound: 2.0,
        decimals_a: 6,
        decimals_b: 9,
        slippage: 0.01,
        stop_threshold: stop_threshold.to_string(),
    }
}

fn request(strategy_id: &str, wallets: &[&str]) -> RunRequest {
    RunRequest {
        owner: OWNER.to_string(),
        strategy_id: strategy_id.to_string(),
        wallets: wallets.iter().map(|w| w.to_string()).collect(),
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    ledger: Arc<ScriptedLedger>,
    notifier: Arc<RecordingNotifier>,
    engine: Arc<SwapEngine>,
}

async fn harness(
    ledger: ScriptedLedger,
    settings: EngineSettings,
    draws: Vec<f64>,
    indices: Vec<usize>,
) -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()), ledger, settings, draws, indices).await
}

async fn harness_with_store(
    store: Arc<MemoryStore>,
    ledger: ScriptedLedger,
    settings: EngineSettings,
    draws: Vec<f64>,
    indices: Vec<usize>,
) -> Harness {
    build_harness(store, None, ledger, settings, draws, indices).await
}

/// Guard flags go through `process`; everything else hits its inner store
async fn harness_with_process(
    process: Arc<CountingProcessStore>,
    ledger: ScriptedLedger,
    settings: EngineSettings,
    draws: Vec<f64>,
) -> Harness {
    let store = process.inner.clone();
    let process: Arc<dyn ProcessStateStore> = process;
    build_harness(store, Some(process), ledger, settings, draws, vec![0]).await
}

async fn build_harness(
    store: Arc<MemoryStore>,
    process: Option<Arc<dyn ProcessStateStore>>,
    ledger: ScriptedLedger,
    settings: EngineSettings,
    draws: Vec<f64>,
    indices: Vec<usize>,
) -> Harness {
    store.upsert_strategy(&preset("s1", "3.2")).await.unwrap();
    store.upsert_strategy(&preset("s-small", "1.5")).await.unwrap();
    store.upsert_strategy(&preset("s-big", "1000")).await.unwrap();

    let ledger = Arc::new(ledger);
    let notifier = Arc::new(RecordingNotifier::default());
    let mut deps = EngineDeps::from_store(store.clone(), ledger.clone(), notifier.clone());
    if let Some(process) = process {
        deps.process = process;
    }
    let engine = Arc::new(SwapEngine::new(
        deps,
        settings,
        ScriptedSource::factory(draws, indices),
    ));
    Harness {
        store,
        ledger,
        notifier,
        engine,
    }
}

fn completed(outcome: RunOutcome) -> RunReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::Rejected(reason) => panic!("run rejected: {}", reason),
    }
}

// =============================================================================
// AD-HOC RUNS
// =============================================================================

#[tokio::test]
async fn test_threshold_run_clips_final_attempt_to_remainder() {
    let h = harness(
        ScriptedLedger::always(true),
        settings(10),
        vec![1.2, 1.1, 1.5],
        vec![0],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("s1", &["0xW1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.successes, 3);
    assert_eq!(report.consumed, 3_200_000);
    assert_eq!(report.remaining, 0);
    assert_eq!(report.gas_used, 36);
    assert_eq!(report.summary, "3 success swaps/3 transactions");

    let amounts: Vec<u64> = h.ledger.calls().iter().map(|c| c.amount).collect();
    assert_eq!(amounts, vec![1_200_000, 1_100_000, 900_000]);
    assert!(h.ledger.calls().iter().all(|c| c.wallet == "0xw1"));

    let history = h.engine.query_history(&HistoryFilter::for_owner(OWNER)).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.is_success()));
    assert_eq!(history[0].amount_in, 900_000);
    assert_eq!(history[0].strategy_id.as_deref(), Some("s1"));

    let state = h.engine.run_state(OWNER).await.unwrap();
    assert!(!state.active);
    assert_eq!(state.last_summary, "3 success swaps/3 transactions");

    let sent = h.notifier.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, owner_channel(OWNER, SUFFIX));
    assert_eq!(sent[0].message, "3 success swaps/3 transactions");
}

#[tokio::test]
async fn test_overshooting_draw_takes_the_remainder() {
    let h = harness(
        ScriptedLedger::always(true),
        settings(10),
        vec![1.2, 1.1],
        vec![0],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("s-small", &["0xw1"])).await.unwrap());

    assert_eq!(report.attempts, 2);
    assert_eq!(report.consumed, 1_500_000);
    let amounts: Vec<u64> = h.ledger.calls().iter().map(|c| c.amount).collect();
    assert_eq!(amounts, vec![1_200_000, 300_000]);
}

#[tokio::test]
async fn test_all_failures_hit_the_attempt_ceiling() {
    let h = harness(ScriptedLedger::always(false), settings(5), vec![1.5], vec![0]).await;

    let report = completed(h.engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::AttemptCeiling);
    assert_eq!(report.attempts, 5);
    assert_eq!(report.successes, 0);
    assert_eq!(report.remaining, 3_200_000);
    assert_eq!(report.summary, "0 success swaps/5 transactions");
    assert_eq!(h.store.history_len(), 5);

    let state = h.engine.run_state(OWNER).await.unwrap();
    assert!(!state.active);
    assert_eq!(state.last_summary, "0 success swaps/5 transactions");
}

#[tokio::test]
async fn test_last_allowed_attempt_consumes_the_remainder() {
    let h = harness(
        ScriptedLedger::always(true),
        settings(3),
        vec![1.0],
        vec![0],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("s-big", &["0xw1"])).await.unwrap());

    assert_eq!(report.attempts, 3);
    assert_eq!(report.stop_reason, StopReason::Completed);
    let amounts: Vec<u64> = h.ledger.calls().iter().map(|c| c.amount).collect();
    assert_eq!(amounts, vec![1_000_000, 1_000_000, 998_000_000]);
}

#[tokio::test]
async fn test_failed_attempts_do_not_consume_threshold() {
    let h = harness(
        ScriptedLedger::scripted(&[true, false, true], true),
        settings(10),
        vec![1.0],
        vec![0, 1],
    )
    .await;

    let report = completed(
        h.engine
            .run_adhoc(request("s-small", &["0xw1", "0xw2"]))
            .await
            .unwrap(),
    );

    // 1.0, failed 0.5 clipped, 0.5 again
    let amounts: Vec<u64> = h.ledger.calls().iter().map(|c| c.amount).collect();
    assert_eq!(amounts, vec![1_000_000, 500_000, 500_000]);
    assert_eq!(report.successes, 2);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.summary, "2 success swaps/3 transactions");

    let wallets: Vec<String> = h.ledger.calls().iter().map(|c| c.wallet.clone()).collect();
    assert_eq!(wallets, vec!["0xw1", "0xw2", "0xw2"]);

    let failed = h
        .engine
        .query_history(&HistoryFilter {
            status: Some(AttemptStatus::Failure),
            ..HistoryFilter::for_owner(OWNER)
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].amount_in, 500_000);
    assert_eq!(failed[0].gas_total, 10);
}

#[tokio::test]
async fn test_ledger_errors_are_failed_attempts() {
    let h = harness(ScriptedLedger::erroring(), settings(4), vec![1.0], vec![0]).await;

    let report = completed(h.engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::AttemptCeiling);
    assert_eq!(report.attempts, 4);
    assert!(report.error.is_none());
    assert_eq!(h.store.history_len(), 4);
}

#[tokio::test]
async fn test_ledger_timeout_is_a_failed_attempt() {
    let mut s = settings(2);
    s.ledger_timeout = Duration::from_millis(20);
    let h = harness(
        ScriptedLedger::always(true).with_latency(Duration::from_secs(5)),
        s,
        vec![1.0],
        vec![0],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap());

    assert_eq!(report.attempts, 2);
    assert_eq!(report.successes, 0);
    assert_eq!(report.summary, "0 success swaps/2 transactions");
}

#[tokio::test]
async fn test_first_draw_above_threshold_makes_no_attempt() {
    let h = harness(ScriptedLedger::always(true), settings(10), vec![1.0], vec![0]).await;
    h.store.upsert_strategy(&preset("s-tiny", "0.5")).await.unwrap();

    let report = completed(h.engine.run_adhoc(request("s-tiny", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::ThresholdUnreachable);
    assert_eq!(report.attempts, 0);
    assert_eq!(report.consumed, 0);
    assert_eq!(report.remaining, 500_000);
    assert_eq!(report.summary, "0 success swaps/0 transactions");
    assert!(h.ledger.calls().is_empty());
    assert_eq!(h.store.history_len(), 0);

    let state = h.engine.run_state(OWNER).await.unwrap();
    assert!(!state.active);
    assert_eq!(state.last_summary, "0 success swaps/0 transactions");
    assert_eq!(h.notifier.sent.lock().len(), 1);
}

#[tokio::test]
async fn test_single_attempt_swaps_the_unclipped_first_draw() {
    let h = harness(ScriptedLedger::always(true), settings(1), vec![1.0], vec![0]).await;

    let report = completed(h.engine.run_adhoc(request("s-big", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::AttemptCeiling);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.remaining, 999_000_000);
    let amounts: Vec<u64> = h.ledger.calls().iter().map(|c| c.amount).collect();
    assert_eq!(amounts, vec![1_000_000]);
}

#[tokio::test]
async fn test_cancel_is_seen_at_the_next_iteration() {
    let store = Arc::new(MemoryStore::new());
    let h = harness_with_store(
        store.clone(),
        ScriptedLedger::always(true).cancelling_after(1, store),
        settings(10),
        vec![1.0],
        vec![0],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.summary, "1 success swaps/1 transactions");
    assert_eq!(h.store.history_len(), 1);

    let state = h.engine.run_state(OWNER).await.unwrap();
    assert!(!state.active);
    assert_eq!(state.last_summary, "1 success swaps/1 transactions");
    assert_eq!(h.notifier.sent.lock().len(), 1);
}

#[tokio::test]
async fn test_cancel_without_active_run_is_safe() {
    let h = harness(ScriptedLedger::always(true), settings(3), vec![1.0], vec![0]).await;

    h.engine.cancel(OWNER).await.unwrap();
    h.engine.cancel(OWNER).await.unwrap();

    let state = h.engine.run_state(OWNER).await.unwrap();
    assert!(!state.active);

    // A new run clears the stale cancel flag
    let report = completed(h.engine.run_adhoc(request("s-small", &["0xw1"])).await.unwrap());
    assert_ne!(report.stop_reason, StopReason::Cancelled);
}

#[tokio::test]
async fn test_rejected_run_leaves_state_untouched() {
    let h = harness(ScriptedLedger::always(true), settings(3), vec![1.0], vec![0]).await;
    assert!(h.store.try_acquire(OWNER).await.unwrap().is_some());
    let before = h.store.get_state(OWNER).await.unwrap();

    let outcome = h.engine.start_run(request("s1", &["0xw1"])).await.unwrap();
    assert!(matches!(
        outcome,
        StartOutcome::Rejected(RejectReason::AlreadyRunning)
    ));
    let outcome = h.engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap();
    assert_eq!(outcome, RunOutcome::Rejected(RejectReason::AlreadyRunning));

    assert_eq!(h.store.get_state(OWNER).await.unwrap(), before);
    assert!(h.ledger.calls().is_empty());
    assert!(h.notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn test_started_run_blocks_a_second_start() {
    let h = harness(
        ScriptedLedger::always(true).with_latency(Duration::from_millis(50)),
        settings(10),
        vec![1.2, 1.1, 1.5],
        vec![0],
    )
    .await;

    let first = h.engine.start_run(request("s1", &["0xw1"])).await.unwrap();
    let second = h.engine.start_run(request("s1", &["0xw1"])).await.unwrap();
    assert!(matches!(second, StartOutcome::Rejected(_)));
    assert!(h.engine.run_state(OWNER).await.unwrap().active);

    let StartOutcome::Accepted(handle) = first else {
        panic!("first run was rejected");
    };
    let report = handle.await.unwrap();
    assert_eq!(report.summary, "3 success swaps/3 transactions");
    assert!(!h.engine.run_state(OWNER).await.unwrap().active);
}

#[tokio::test]
async fn test_cancel_then_restart_stops_the_old_loop() {
    let h = harness(
        ScriptedLedger::always(true).with_latency(Duration::from_millis(30)),
        settings(10),
        vec![1.0],
        vec![0],
    )
    .await;

    let StartOutcome::Accepted(first) = h.engine.start_run(request("s-big", &["0xw1"])).await.unwrap()
    else {
        panic!("first run was rejected");
    };
    tokio::time::sleep(Duration::from_millis(45)).await;
    h.engine.cancel(OWNER).await.unwrap();
    let StartOutcome::Accepted(second) = h.engine.start_run(request("s-big", &["0xw1"])).await.unwrap()
    else {
        panic!("restart after cancel was rejected");
    };

    let first = first.await.unwrap();
    assert_eq!(first.stop_reason, StopReason::Cancelled);
    assert!(first.attempts < 10);
    // The old loop must not clear the new run's flag
    assert!(h.engine.run_state(OWNER).await.unwrap().active);

    let second = second.await.unwrap();
    assert_eq!(second.stop_reason, StopReason::Completed);
    assert_eq!(second.attempts, 10);
    assert_eq!(second.summary, "10 success swaps/10 transactions");

    let state = h.engine.run_state(OWNER).await.unwrap();
    assert!(!state.active);
    assert_eq!(state.last_summary, "10 success swaps/10 transactions");
    assert_eq!(h.ledger.calls().len() as u32, first.attempts + second.attempts);
}

#[tokio::test]
async fn test_two_owners_run_side_by_side() {
    let h = harness(
        ScriptedLedger::always(true).with_latency(Duration::from_millis(20)),
        settings(10),
        vec![1.0],
        vec![0],
    )
    .await;
    let other = RunRequest {
        owner: "0xOther".to_string(),
        ..request("s-small", &["0xw9"])
    };

    let StartOutcome::Accepted(a) = h.engine.start_run(request("s-small", &["0xw1"])).await.unwrap()
    else {
        panic!("first owner was rejected");
    };
    let StartOutcome::Accepted(b) = h.engine.start_run(other).await.unwrap() else {
        panic!("second owner was rejected");
    };
    assert!(h.engine.run_state(OWNER).await.unwrap().active);
    assert!(h.engine.run_state("0xother").await.unwrap().active);

    let a = a.await.unwrap();
    let b = b.await.unwrap();
    for report in [&a, &b] {
        assert_eq!(report.stop_reason, StopReason::Completed);
        assert_eq!(report.attempts, 2);
        assert_eq!(report.consumed, 1_500_000);
        assert_eq!(report.summary, "2 success swaps/2 transactions");
    }
    assert_eq!(b.owner, "0xother");

    for owner in [OWNER, "0xother"] {
        let state = h.engine.run_state(owner).await.unwrap();
        assert!(!state.active);
        assert_eq!(state.last_summary, "2 success swaps/2 transactions");
    }

    let calls = h.ledger.calls();
    assert_eq!(calls.iter().filter(|c| c.wallet == "0xw1").count(), 2);
    assert_eq!(calls.iter().filter(|c| c.wallet == "0xw9").count(), 2);

    let mut channels: Vec<String> = h.notifier.sent.lock().iter().map(|n| n.channel.clone()).collect();
    channels.sort();
    let mut expected = vec![owner_channel(OWNER, SUFFIX), owner_channel("0xother", SUFFIX)];
    expected.sort();
    assert_eq!(channels, expected);
}

#[tokio::test]
async fn test_missing_strategy_aborts_before_any_attempt() {
    let h = harness(ScriptedLedger::always(true), settings(3), vec![1.0], vec![0]).await;

    let report = completed(h.engine.run_adhoc(request("nope", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::ConfigError);
    assert_eq!(report.attempts, 0);
    assert_eq!(report.summary, "Error while swap: 0 success swaps/0 transactions");
    assert!(report.error.unwrap().contains("nope"));
    assert!(h.ledger.calls().is_empty());
    assert_eq!(h.store.history_len(), 0);

    let state = h.engine.run_state(OWNER).await.unwrap();
    assert!(!state.active);
    assert_eq!(state.last_summary, "Error while swap: 0 success swaps/0 transactions");
}

#[tokio::test]
async fn test_run_without_wallets_is_a_config_error() {
    let h = harness(ScriptedLedger::always(true), settings(3), vec![1.0], vec![0]).await;

    let report = completed(h.engine.run_adhoc(request("s1", &[])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::ConfigError);
    assert!(!h.engine.run_state(OWNER).await.unwrap().active);
}

#[tokio::test]
async fn test_deadline_stops_the_run() {
    let mut s = settings(10);
    s.max_run_duration = Some(Duration::ZERO);
    let h = harness(ScriptedLedger::always(true), s, vec![1.0], vec![0]).await;

    let report = completed(h.engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::Deadline);
    assert_eq!(report.attempts, 0);
    assert_eq!(report.summary, "0 success swaps/0 transactions");
    assert!(!h.engine.run_state(OWNER).await.unwrap().active);
}

// =============================================================================
// GUARD RELEASE PER EXIT PATH
// =============================================================================

#[tokio::test]
async fn test_threshold_exit_releases_once() {
    let process = Arc::new(CountingProcessStore::new(Arc::new(MemoryStore::new())));
    let h = harness_with_process(
        process.clone(),
        ScriptedLedger::always(true),
        settings(10),
        vec![1.2, 1.1, 1.5],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(process.settled_releases().await, 1);
}

#[tokio::test]
async fn test_cancel_exit_releases_once() {
    let store = Arc::new(MemoryStore::new());
    let process = Arc::new(CountingProcessStore::new(store.clone()));
    let h = harness_with_process(
        process.clone(),
        ScriptedLedger::always(true).cancelling_after(2, store),
        settings(10),
        vec![1.0],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("s-big", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.attempts, 2);
    assert_eq!(process.settled_releases().await, 1);
}

#[tokio::test]
async fn test_ceiling_exit_releases_once() {
    let process = Arc::new(CountingProcessStore::new(Arc::new(MemoryStore::new())));
    let h = harness_with_process(
        process.clone(),
        ScriptedLedger::always(false),
        settings(3),
        vec![1.0],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::AttemptCeiling);
    assert_eq!(process.settled_releases().await, 1);
}

#[tokio::test]
async fn test_config_error_exit_releases_once() {
    let process = Arc::new(CountingProcessStore::new(Arc::new(MemoryStore::new())));
    let h = harness_with_process(
        process.clone(),
        ScriptedLedger::always(true),
        settings(3),
        vec![1.0],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("nope", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::ConfigError);
    assert_eq!(process.settled_releases().await, 1);
    assert!(!h.engine.run_state(OWNER).await.unwrap().active);
}

#[tokio::test]
async fn test_store_fault_mid_run_aborts_flushes_and_releases_once() {
    let process = Arc::new(CountingProcessStore::failing_after(
        Arc::new(MemoryStore::new()),
        2,
    ));
    let h = harness_with_process(
        process.clone(),
        ScriptedLedger::always(true),
        settings(10),
        vec![1.0],
    )
    .await;

    let report = completed(h.engine.run_adhoc(request("s-big", &["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::Aborted);
    assert_eq!(report.attempts, 2);
    assert_eq!(report.successes, 2);
    assert_eq!(report.summary, "Error while swap: 2 success swaps/2 transactions");
    assert!(report.error.unwrap().contains("state store unavailable"));
    assert_eq!(h.ledger.calls().len(), 2);

    // Both completed attempts were flushed before the guard came down
    assert_eq!(h.store.history_len(), 2);
    assert_eq!(process.settled_releases().await, 1);

    let state = h.engine.run_state(OWNER).await.unwrap();
    assert!(!state.active);
    assert_eq!(state.last_summary, "Error while swap: 2 success swaps/2 transactions");
    assert_eq!(
        h.notifier.sent.lock()[0].message,
        "Error while swap: 2 success swaps/2 transactions"
    );
}

// =============================================================================
// TRACKED RUNS
// =============================================================================

#[tokio::test]
async fn test_tracked_run_persists_one_delta_row_per_wallet() {
    let h = harness(
        ScriptedLedger::always(true),
        settings(10),
        vec![1.2, 1.1, 1.5],
        vec![0, 1, 0],
    )
    .await;
    h.store.insert_task("t1", OWNER, TaskStatus::Active);

    let report = h
        .engine
        .run_tracked(request("s1", &["0xw1", "0xw2"]), "t1", "morning")
        .await;

    assert_eq!(report.mode, RunMode::Tracked);
    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.attempts, 3);

    let rows = h.store.delta_rows();
    assert_eq!(rows.len(), 2);
    let w1 = rows.iter().find(|r| r.wallet == "0xw1").unwrap();
    assert_eq!(w1.token_a_change, -2_100_000);
    assert_eq!(w1.token_b_change, 1_995_000);
    assert_eq!(w1.gas_used, 24);
    assert_eq!(w1.job_name, "morning");
    let w2 = rows.iter().find(|r| r.wallet == "0xw2").unwrap();
    assert_eq!(w2.token_a_change, -1_100_000);

    let history = h.engine.query_history(&HistoryFilter::for_owner(OWNER)).await.unwrap();
    assert!(history
        .iter()
        .all(|r| r.task_id.as_deref() == Some("t1") && r.job_name.as_deref() == Some("morning")));

    // No owner-wide guard and no owner notification
    assert!(h.store.get_state(OWNER).await.unwrap().is_none());
    assert!(h.notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn test_tracked_run_with_all_failures_writes_no_deltas() {
    let h = harness(ScriptedLedger::always(false), settings(4), vec![1.0], vec![0]).await;
    h.store.insert_task("t1", OWNER, TaskStatus::Active);

    let report = h.engine.run_tracked(request("s1", &["0xw1"]), "t1", "job").await;

    assert_eq!(report.summary, "0 success swaps/4 transactions");
    assert!(h.store.delta_rows().is_empty());
    assert_eq!(h.store.history_len(), 4);
}

#[tokio::test]
async fn test_tracked_run_stops_on_terminal_task() {
    let h = harness(ScriptedLedger::always(true), settings(10), vec![1.0], vec![0]).await;
    h.store.insert_task("t1", OWNER, TaskStatus::Completed);

    let handle = h.engine.start_tracked(request("s1", &["0xw1"]), "t1", "job");
    let report = handle.await.unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.attempts, 0);
    assert!(h.ledger.calls().is_empty());
    assert!(h.store.delta_rows().is_empty());
}

#[tokio::test]
async fn test_tracked_run_aborts_when_task_is_missing() {
    let h = harness(ScriptedLedger::always(true), settings(10), vec![1.0], vec![0]).await;

    let report = h.engine.run_tracked(request("s1", &["0xw1"]), "ghost", "job").await;

    assert_eq!(report.stop_reason, StopReason::Aborted);
    assert_eq!(report.summary, "Error while swap: 0 success swaps/0 transactions");
    assert!(report.error.is_some());
}

// =============================================================================
// SWEEP RUNS
// =============================================================================

fn sweep_request(wallets: &[&str]) -> SweepRequest {
    SweepRequest {
        owner: OWNER.to_string(),
        pool_address: "0xpool".to_string(),
        direction: Direction::BToA,
        slippage: 0.01,
        wallets: wallets.iter().map(|w| w.to_string()).collect(),
        decimals_a: 6,
        decimals_b: 9,
    }
}

#[tokio::test]
async fn test_sweep_drains_each_wallet_once() {
    let h = harness(
        ScriptedLedger::always(true).with_balances(&[("0xw1", 5_000_000), ("0xw2", 800)]),
        settings(10),
        vec![1.0],
        vec![0],
    )
    .await;

    let report = completed(
        h.engine
            .run_sweep(sweep_request(&["0xW1", "0xw2"]))
            .await
            .unwrap(),
    );

    assert_eq!(report.mode, RunMode::Sweep);
    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.successes, 1);
    assert_eq!(report.summary, "1 success swaps/2 transactions");

    let calls = h.ledger.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].wallet, "0xw1");
    assert_eq!(calls[0].amount, 5_000_000);

    let history = h.engine.query_history(&HistoryFilter::for_owner(OWNER)).await.unwrap();
    assert_eq!(history[0].strategy_id.as_deref(), Some(SWEEP_STRATEGY));
    assert_eq!(history[0].strategy_name.as_deref(), Some(SWEEP_STRATEGY));

    assert!(!h.engine.run_state(OWNER).await.unwrap().active);
    assert_eq!(h.notifier.sent.lock()[0].message, "1 success swaps/2 transactions");
}

#[tokio::test]
async fn test_sweep_keeps_failed_wallets_until_the_bound() {
    let h = harness(
        ScriptedLedger::always(false).with_balances(&[("0xw1", 5_000_000)]),
        settings(3),
        vec![1.0],
        vec![0],
    )
    .await;

    let report = completed(h.engine.run_sweep(sweep_request(&["0xw1"])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::AttemptCeiling);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.summary, "0 success swaps/1 transactions");
}

#[tokio::test]
async fn test_sweep_without_wallets_is_a_config_error() {
    let h = harness(ScriptedLedger::always(true), settings(3), vec![1.0], vec![0]).await;

    let report = completed(h.engine.run_sweep(sweep_request(&[])).await.unwrap());

    assert_eq!(report.stop_reason, StopReason::ConfigError);
    assert!(!h.engine.run_state(OWNER).await.unwrap().active);
}

// =============================================================================
// SQLITE
// =============================================================================

#[tokio::test]
async fn test_adhoc_run_against_sqlite() {
    let (_dir, db) = crate::store::database::test_support::temp_db();
    let db = Arc::new(db);
    db.upsert_strategy(&preset("s1", "3.2")).await.unwrap();

    let ledger = Arc::new(ScriptedLedger::always(true));
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = SwapEngine::new(
        EngineDeps::from_store(db.clone(), ledger, notifier.clone()),
        settings(10),
        ScriptedSource::factory(vec![1.2, 1.1, 1.5], vec![0]),
    );

    let report = completed(engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap());
    assert_eq!(report.summary, "3 success swaps/3 transactions");

    let history = db.query_history(&HistoryFilter::for_owner(OWNER)).await.unwrap();
    assert_eq!(history.len(), 3);
    let state = engine.run_state(OWNER).await.unwrap();
    assert!(!state.active);
    assert_eq!(state.last_summary, "3 success swaps/3 transactions");

    let again = engine.run_adhoc(request("s1", &["0xw1"])).await.unwrap();
    assert!(matches!(again, RunOutcome::Completed(_)));
}
