//! Ledger client seam
//!
//! The engine never builds, signs or broadcasts transactions itself. It hands
//! a [`SwapRequest`] to a [`LedgerClient`] and consumes the typed
//! [`SwapOutcome`]. Ordinary swap failures (insufficient liquidity, slippage
//! exceeded) come back as `ok == false`; only infrastructure faults are
//! returned as `Err`.

pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SwapResult;
use crate::volume::types::Direction;

pub use simulated::SimulatedLedger;

/// Gas charged for one transaction, in the chain's base units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasCost {
    pub computation_cost: u64,
    pub storage_cost: u64,
    pub storage_rebate: u64,
}

impl GasCost {
    pub fn new(computation_cost: u64, storage_cost: u64, storage_rebate: u64) -> Self {
        Self {
            computation_cost,
            storage_cost,
            storage_rebate,
        }
    }

    /// Computation plus storage, before the rebate
    pub fn total(&self) -> u64 {
        self.computation_cost.saturating_add(self.storage_cost)
    }

    /// What the wallet actually paid
    pub fn net(&self) -> u64 {
        self.total().saturating_sub(self.storage_rebate)
    }
}

/// One swap to execute
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    pub wallet: String,
    pub pool_address: String,
    pub direction: Direction,
    /// Input amount in the input token's base units
    pub amount: u64,
    /// Tolerance as a fraction, 0.01 = 1%
    pub slippage: f64,
    pub decimals_a: u8,
    pub decimals_b: u8,
}

/// Result of one swap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOutcome {
    pub ok: bool,
    pub amount_in: u64,
    pub amount_out: u64,
    pub gas: GasCost,
    pub tx_reference: Option<String>,
}

impl SwapOutcome {
    /// A failed attempt that never reached the chain
    pub fn failed() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn execute_swap(&self, request: &SwapRequest) -> SwapResult<SwapOutcome>;

    /// Balance of the token the wallet would spend in `direction`
    async fn token_balance(
        &self,
        wallet: &str,
        pool_address: &str,
        direction: Direction,
    ) -> SwapResult<u64>;
}
