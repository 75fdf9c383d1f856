/// Configuration sections, each declared once with its defaults
use crate::config_struct;
use std::path::PathBuf;

// ============================================================================
// ENGINE
// ============================================================================

config_struct! {
    /// Swap loop limits and pacing
    pub struct EngineConfig {
        /// Attempt ceiling per run, also the sweep iteration bound
        max_swap_attempts: u32 = 100,
        /// Timeout for a single ledger call
        ledger_timeout_secs: u64 = 60,
        /// Inter-attempt pause range
        delay_min_ms: u64 = 200,
        delay_max_ms: u64 = 500,
        /// Wall-clock ceiling for one run, 0 disables it
        max_run_duration_secs: u64 = 0,
        default_slippage: f64 = 0.01,
    }
}

// ============================================================================
// NOTIFIER
// ============================================================================

config_struct! {
    /// Completion notifications over a Centrifugo-style publish API
    pub struct NotifierConfig {
        enabled: bool = false,
        url: String = String::new(),
        api_key: String = String::new(),
        channel_suffix: String = "_account_stream".to_string(),
        timeout_secs: u64 = 5,
    }
}

// ============================================================================
// DATABASE
// ============================================================================

config_struct! {
    pub struct DatabaseConfig {
        /// Empty means `<data dir>/swaps.db`
        path: String = String::new(),
        pool_max_size: u32 = 10,
    }
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if self.path.trim().is_empty() {
            crate::paths::get_swaps_db_path()
        } else {
            PathBuf::from(&self.path)
        }
    }
}

// ============================================================================
// SIMULATION
// ============================================================================

config_struct! {
    /// Parameters of the simulated ledger used by the CLI
    pub struct SimulationConfig {
        success_rate: f64 = 0.9,
        /// Output tokens per input token, in human units
        price: f64 = 1.0,
        fee_bps: u32 = 30,
        computation_cost: u64 = 1_000_000,
        storage_cost: u64 = 2_000_000,
        storage_rebate: u64 = 1_500_000,
        latency_ms: u64 = 50,
        /// Starting balance of each token per wallet, in base units
        initial_balance: u64 = 1_000_000_000_000,
        /// 0 seeds from entropy
        seed: u64 = 0,
    }
}

// ============================================================================
// ROOT
// ============================================================================

config_struct! {
    pub struct Config {
        engine: EngineConfig = EngineConfig::default(),
        notifier: NotifierConfig = NotifierConfig::default(),
        database: DatabaseConfig = DatabaseConfig::default(),
        simulation: SimulationConfig = SimulationConfig::default(),
    }
}
