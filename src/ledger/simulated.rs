/// Deterministic in-process ledger used for dry runs and the CLI
///
/// Wallet balances start at `initial_balance` for both tokens of every pool
/// and move with each successful swap. Outcomes are rolled from the
/// configured success rate with a seedable RNG.
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{GasCost, LedgerClient, SwapOutcome, SwapRequest};
use crate::config::SimulationConfig;
use crate::errors::{SwapError, SwapResult};
use crate::logger::{self, LogTag};
use crate::volume::types::Direction;

pub struct SimulatedLedger {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
    balances: Mutex<HashMap<String, u64>>,
}

fn balance_key(pool_address: &str, wallet: &str, token_a: bool) -> String {
    format!("{}:{}:{}", pool_address, wallet, if token_a { "a" } else { "b" })
}

impl SimulatedLedger {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = if config.seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        Self {
            config,
            rng: Mutex::new(rng),
            balances: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides a wallet's balance of one side of a pool
    pub fn set_balance(&self, wallet: &str, pool_address: &str, token_a: bool, amount: u64) {
        self.balances
            .lock()
            .insert(balance_key(pool_address, wallet, token_a), amount);
    }

    fn balance_of(&self, wallet: &str, pool_address: &str, token_a: bool) -> u64 {
        self.balances
            .lock()
            .get(&balance_key(pool_address, wallet, token_a))
            .copied()
            .unwrap_or(self.config.initial_balance)
    }

    /// Output amount after price and fee, scaled between the two precisions
    fn quote(&self, request: &SwapRequest) -> SwapResult<u64> {
        let (in_decimals, out_decimals) = request
            .direction
            .io_decimals(request.decimals_a, request.decimals_b);
        let price = match request.direction {
            Direction::AToB => self.config.price,
            Direction::BToA => {
                if self.config.price <= 0.0 {
                    return Err(SwapError::Ledger("pool price is zero".to_string()));
                }
                1.0 / self.config.price
            }
        };
        let fee_bps = u128::from(self.config.fee_bps.min(10_000));
        let net_in = u128::from(request.amount) * (10_000 - fee_bps) / 10_000;
        let scale = i32::from(out_decimals) - i32::from(in_decimals);
        let out = net_in as f64 * price * 10f64.powi(scale);
        if !out.is_finite() || out < 0.0 || out > u64::MAX as f64 {
            return Err(SwapError::Ledger(format!("quote out of range: {}", out)));
        }
        Ok(out.floor() as u64)
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    async fn execute_swap(&self, request: &SwapRequest) -> SwapResult<SwapOutcome> {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        let fee = f64::from(self.config.fee_bps) / 10_000.0;
        if fee > request.slippage {
            logger::debug(
                LogTag::Ledger,
                &format!(
                    "Slippage exceeded for {}: fee {:.4} > tolerance {:.4}",
                    request.wallet, fee, request.slippage
                ),
            );
            return Ok(SwapOutcome::failed());
        }

        let rolled_ok = self.rng.lock().gen::<f64>() < self.config.success_rate;
        if !rolled_ok {
            logger::debug(
                LogTag::Ledger,
                &format!("Simulated failure for wallet {}", request.wallet),
            );
            return Ok(SwapOutcome::failed());
        }

        let from_a = request.direction.is_a_to_b();
        let available = self.balance_of(&request.wallet, &request.pool_address, from_a);
        if available < request.amount {
            logger::debug(
                LogTag::Ledger,
                &format!(
                    "Insufficient balance for {}: {} < {}",
                    request.wallet, available, request.amount
                ),
            );
            return Ok(SwapOutcome::failed());
        }

        let amount_out = self.quote(request)?;
        let received = self.balance_of(&request.wallet, &request.pool_address, !from_a);
        {
            let mut balances = self.balances.lock();
            balances.insert(
                balance_key(&request.pool_address, &request.wallet, from_a),
                available - request.amount,
            );
            balances.insert(
                balance_key(&request.pool_address, &request.wallet, !from_a),
                received.saturating_add(amount_out),
            );
        }

        Ok(SwapOutcome {
            ok: true,
            amount_in: request.amount,
            amount_out,
            gas: GasCost::new(
                self.config.computation_cost,
                self.config.storage_cost,
                self.config.storage_rebate,
            ),
            tx_reference: Some(uuid::Uuid::new_v4().simple().to_string()),
        })
    }

    async fn token_balance(
        &self,
        wallet: &str,
        pool_address: &str,
        direction: Direction,
    ) -> SwapResult<u64> {
        Ok(self.balance_of(wallet, pool_address, direction.is_a_to_b()))
    }
}
