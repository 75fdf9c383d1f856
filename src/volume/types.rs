//! Volume run types
//!
//! Configuration, persisted records and run results shared by the engine,
//! the stores and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amounts;
use crate::errors::{SwapError, SwapResult};

/// Summary stored when a run dies without reporting its own tally
pub const ERROR_SUMMARY: &str = "Error while swap";

/// Strategy id recorded on history rows written by sweep runs
pub const SWEEP_STRATEGY: &str = "SWAP_ALL";

/// `"<N> success swaps/<M> transactions"`
pub fn tally_summary(successes: u32, attempts: u32) -> String {
    format!("{} success swaps/{} transactions", successes, attempts)
}

/// Failure summary that still carries the tally
pub fn failure_summary(successes: u32, attempts: u32) -> String {
    format!("{}: {}", ERROR_SUMMARY, tally_summary(successes, attempts))
}

// =============================================================================
// DIRECTION / STATUS ENUMS
// =============================================================================

/// Which side of the pool is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Spend token A, receive token B
    AToB,
    /// Spend token B, receive token A
    BToA,
}

impl Direction {
    pub fn is_a_to_b(&self) -> bool {
        matches!(self, Direction::AToB)
    }

    /// `(input decimals, output decimals)`
    pub fn io_decimals(&self, decimals_a: u8, decimals_b: u8) -> (u8, u8) {
        match self {
            Direction::AToB => (decimals_a, decimals_b),
            Direction::BToA => (decimals_b, decimals_a),
        }
    }

    pub fn input_decimals(&self, decimals_a: u8, decimals_b: u8) -> u8 {
        self.io_decimals(decimals_a, decimals_b).0
    }

    pub fn to_db_value(&self) -> &'static str {
        match self {
            Direction::AToB => "a2b",
            Direction::BToA => "b2a",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "a2b" | "a_to_b" | "atob" => Some(Direction::AToB),
            "b2a" | "b_to_a" | "btoa" => Some(Direction::BToA),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_value())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::from_db_value(s).ok_or_else(|| format!("unknown direction '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failure,
}

impl AttemptStatus {
    pub fn to_db_value(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failure => "failure",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "success" => Some(AttemptStatus::Success),
            "failure" => Some(AttemptStatus::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_value())
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttemptStatus::from_db_value(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown attempt status '{}'", s))
    }
}

/// Lifecycle of a tracked task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Canceled,
    Completed,
}

impl TaskStatus {
    /// Tracked runs stop as soon as their task reaches one of these
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Canceled | TaskStatus::Completed)
    }

    pub fn to_db_value(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "active" => Some(TaskStatus::Active),
            "canceled" | "cancelled" => Some(TaskStatus::Canceled),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_value())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::from_db_value(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown task status '{}'", s))
    }
}

// =============================================================================
// DELAY CONFIGURATION
// =============================================================================

/// Pause between attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelayConfig {
    Fixed { delay_ms: u64 },
    Random { min_ms: u64, max_ms: u64 },
}

impl Default for DelayConfig {
    fn default() -> Self {
        DelayConfig::Random {
            min_ms: 200,
            max_ms: 500,
        }
    }
}

impl DelayConfig {
    pub fn fixed(delay_ms: u64) -> Self {
        DelayConfig::Fixed { delay_ms }
    }

    /// Collapses to `Fixed` when the range is empty
    pub fn from_range(min_ms: u64, max_ms: u64) -> Self {
        if max_ms <= min_ms {
            DelayConfig::Fixed { delay_ms: min_ms }
        } else {
            DelayConfig::Random { min_ms, max_ms }
        }
    }
}

// =============================================================================
// RUN CONFIGURATION
// =============================================================================

/// Everything one run needs. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRunConfig {
    pub owner: String,
    pub pool_address: String,
    pub direction: Direction,
    /// Draw bounds in human units of the input token
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub decimals_a: u8,
    pub decimals_b: u8,
    pub slippage: f64,
    /// Cumulative input cap in base units
    pub stop_threshold: u64,
    pub max_attempts: u32,
    pub wallets: Vec<String>,
    /// Job name of a tracked run
    pub task_tag: Option<String>,
    pub strategy_id: Option<String>,
    pub strategy_name: Option<String>,
}

impl SwapRunConfig {
    pub fn input_decimals(&self) -> u8 {
        self.direction.input_decimals(self.decimals_a, self.decimals_b)
    }

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
        if self.max_attempts == 0 {
            return Err(SwapError::invalid("max_attempts", "must be at least 1"));
        }
        if self.stop_threshold == 0 {
            return Err(SwapError::invalid("stop_threshold", "must be positive"));
        }
        if !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return Err(SwapError::invalid("bounds", "must be finite numbers"));
        }
        if self.lower_bound > self.upper_bound {
            return Err(SwapError::invalid(
                "lower_bound",
                format!("{} exceeds upper bound {}", self.lower_bound, self.upper_bound),
            ));
        }
        // The smallest draw must still move at least one base unit
        if amounts::draw_to_base_units(self.lower_bound, self.input_decimals())? == 0 {
            return Err(SwapError::invalid(
                "lower_bound",
                format!(
                    "{} rounds to zero at {} decimals",
                    self.lower_bound,
                    self.input_decimals()
                ),
            ));
        }
        amounts::draw_to_base_units(self.upper_bound, self.input_decimals())?;
        if !(0.0..1.0).contains(&self.slippage) {
            return Err(SwapError::invalid("slippage", "must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Saved run parameters, referenced by id from run requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPreset {
    pub id: String,
    pub name: String,
    pub pool_address: String,
    pub direction: Direction,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub decimals_a: u8,
    pub decimals_b: u8,
    pub slippage: f64,
    /// Human decimal string in input-token units, e.g. "250.5"
    pub stop_threshold: String,
}

impl StrategyPreset {
    /// Resolves the preset for one owner and wallet set.
    /// Owner and wallet addresses are lower-cased.
    pub fn to_run_config(
        &self,
        owner: &str,
        wallets: &[String],
        max_attempts: u32,
        task_tag: Option<String>,
    ) -> SwapResult<SwapRunConfig> {
        let input_decimals = self.direction.input_decimals(self.decimals_a, self.decimals_b);
        let stop_threshold = amounts::parse_units(&self.stop_threshold, input_decimals)?;

        let config = SwapRunConfig {
            owner: owner.to_lowercase(),
            pool_address: self.pool_address.clone(),
            direction: self.direction,
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
            decimals_a: self.decimals_a,
            decimals_b: self.decimals_b,
            slippage: self.slippage,
            stop_threshold,
            max_attempts,
            wallets: wallets.iter().map(|w| w.to_lowercase()).collect(),
            task_tag,
            strategy_id: Some(self.id.clone()),
            strategy_name: Some(self.name.clone()),
        };
        config.validate()?;
        Ok(config)
    }
}

/// A caller asking for a run of a stored strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub owner: String,
    pub strategy_id: String,
    pub wallets: Vec<String>,
}

/// Drain every selected wallet's input-token balance into the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRequest {
    pub owner: String,
    pub pool_address: String,
    pub direction: Direction,
    pub slippage: f64,
    pub wallets: Vec<String>,
    pub decimals_a: u8,
    pub decimals_b: u8,
}

// =============================================================================
// PERSISTED RECORDS
// =============================================================================

/// One row per owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    pub owner: String,
    pub is_active: bool,
    pub cancel_requested: bool,
    pub last_result: String,
    /// Set on every successful acquire; empty until the first run
    #[serde(default)]
    pub run_token: String,
    pub updated_at: DateTime<Utc>,
}

/// What callers see of an owner's run state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub active: bool,
    pub last_summary: String,
}

impl From<Option<ProcessState>> for RunState {
    fn from(state: Option<ProcessState>) -> Self {
        match state {
            Some(s) => RunState {
                active: s.is_active,
                last_summary: s.last_result,
            },
            None => RunState::default(),
        }
    }
}

/// History row for one swap attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapAttempt {
    pub timestamp: DateTime<Utc>,
    pub owner: String,
    pub wallet: String,
    pub pool_address: String,
    pub direction: Direction,
    pub status: AttemptStatus,
    pub tx_reference: Option<String>,
    pub amount_in: u64,
    pub amount_out: u64,
    pub gas_total: u64,
    pub gas_net: u64,
    pub strategy_id: Option<String>,
    pub strategy_name: Option<String>,
    pub task_id: Option<String>,
    pub job_name: Option<String>,
}

impl SwapAttempt {
    pub fn is_success(&self) -> bool {
        self.status == AttemptStatus::Success
    }
}

/// Net per-wallet change over one tracked run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletDelta {
    pub owner: String,
    pub task_id: String,
    pub job_name: String,
    pub wallet: String,
    pub token_a_change: i128,
    pub token_b_change: i128,
    pub gas_used: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub owner: String,
    pub name: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// QUERIES
// =============================================================================

/// History lookup. `owner` is required, every other field narrows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub owner: String,
    pub status: Option<AttemptStatus>,
    pub wallet: Option<String>,
    pub pool_address: Option<String>,
    pub direction: Option<Direction>,
    pub tx_reference: Option<String>,
}

impl HistoryFilter {
    pub fn for_owner(owner: &str) -> Self {
        Self {
            owner: owner.to_lowercase(),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &SwapAttempt) -> bool {
        record.owner == self.owner
            && self.status.map_or(true, |s| record.status == s)
            && self.wallet.as_ref().map_or(true, |w| &record.wallet == w)
            && self
                .pool_address
                .as_ref()
                .map_or(true, |p| &record.pool_address == p)
            && self.direction.map_or(true, |d| record.direction == d)
            && self
                .tx_reference
                .as_ref()
                .map_or(true, |t| record.tx_reference.as_ref() == Some(t))
    }
}

/// Which failed ad-hoc history rows to delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteScope {
    AllPools,
    Pool(String),
}

/// Whitelisted sort keys for delta listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaSortKey {
    #[default]
    CreatedAt,
    Wallet,
    TokenAChange,
    TokenBChange,
    GasUsed,
}

impl DeltaSortKey {
    pub fn column(&self) -> &'static str {
        match self {
            DeltaSortKey::CreatedAt => "created_at",
            DeltaSortKey::Wallet => "wallet",
            DeltaSortKey::TokenAChange => "token_a_change",
            DeltaSortKey::TokenBChange => "token_b_change",
            DeltaSortKey::GasUsed => "gas_used",
        }
    }
}

impl std::str::FromStr for DeltaSortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "created_at" | "createdat" => Ok(DeltaSortKey::CreatedAt),
            "wallet" => Ok(DeltaSortKey::Wallet),
            "token_a_change" | "tokenachange" => Ok(DeltaSortKey::TokenAChange),
            "token_b_change" | "tokenbchange" => Ok(DeltaSortKey::TokenBChange),
            "gas_used" | "gasused" => Ok(DeltaSortKey::GasUsed),
            other => Err(format!("unsupported sort key '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaQuery {
    pub task_id: String,
    /// 1-based, 0 is treated as 1
    pub page: u32,
    /// 0 is treated as 1
    pub size: u32,
    pub sort: DeltaSortKey,
    pub descending: bool,
}

impl DeltaQuery {
    pub fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            page: 1,
            size: 20,
            sort: DeltaSortKey::CreatedAt,
            descending: true,
        }
    }

    pub fn normalized_page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn normalized_size(&self) -> u32 {
        self.size.max(1)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.normalized_page() - 1) * u64::from(self.normalized_size())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

// =============================================================================
// RUN RESULTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    AdHoc,
    Tracked,
    Sweep,
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The whole threshold was consumed, or every sweep wallet was drained
    Completed,
    /// The next draw no longer fits the remainder
    ThresholdUnreachable,
    Cancelled,
    AttemptCeiling,
    Deadline,
    /// Configuration error before any attempt
    ConfigError,
    /// Infrastructure fault mid-run
    Aborted,
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::ConfigError | StopReason::Aborted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub owner: String,
    pub mode: RunMode,
    pub attempts: u32,
    pub successes: u32,
    /// Base units consumed by successful attempts
    pub consumed: u64,
    pub remaining: u64,
    pub gas_used: u64,
    pub stop_reason: StopReason,
    pub summary: String,
    pub error: Option<String>,
}
