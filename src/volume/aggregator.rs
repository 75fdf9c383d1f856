/// Per-wallet running totals of one tracked run
///
/// Entries are keyed by wallet and kept in first-seen order. `flush` consumes
/// the aggregator, so a run can only produce its delta rows once.
use std::collections::HashMap;

use chrono::Utc;

use super::types::{Direction, WalletDelta};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaTotals {
    pub token_a_change: i128,
    pub token_b_change: i128,
    pub gas_used: u64,
}

#[derive(Debug)]
pub struct TaskDeltaAggregator {
    owner: String,
    task_id: String,
    job_name: String,
    totals: HashMap<String, DeltaTotals>,
    order: Vec<String>,
}

impl TaskDeltaAggregator {
    pub fn new(owner: &str, task_id: &str, job_name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            task_id: task_id.to_string(),
            job_name: job_name.to_string(),
            totals: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Input side decreases, output side increases
    pub fn add(
        &mut self,
        wallet: &str,
        amount_in: u64,
        amount_out: u64,
        gas_fee: u64,
        direction: Direction,
    ) {
        if !self.totals.contains_key(wallet) {
            self.order.push(wallet.to_string());
        }
        let entry = self.totals.entry(wallet.to_string()).or_default();

        let spent = amount_in as i128;
        let received = amount_out as i128;
        match direction {
            Direction::AToB => {
                entry.token_a_change -= spent;
                entry.token_b_change += received;
            }
            Direction::BToA => {
                entry.token_b_change -= spent;
                entry.token_a_change += received;
            }
        }
        entry.gas_used = entry.gas_used.saturating_add(gas_fee);
    }

    pub fn get(&self, wallet: &str) -> Option<&DeltaTotals> {
        self.totals.get(wallet)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// One row per wallet, in the order wallets first succeeded
    pub fn flush(mut self) -> Vec<WalletDelta> {
        let created_at = Utc::now();
        let mut rows = Vec::with_capacity(self.order.len());
        for wallet in std::mem::take(&mut self.order) {
            let Some(totals) = self.totals.remove(&wallet) else {
                continue;
            };
            rows.push(WalletDelta {
                owner: self.owner.clone(),
                task_id: self.task_id.clone(),
                job_name: self.job_name.clone(),
                wallet,
                token_a_change: totals.token_a_change,
                token_b_change: totals.token_b_change,
                gas_used: totals.gas_used,
                created_at,
            });
        }
        rows
    }
}
