/// In-memory store implementing every persistence trait
///
/// Used by tests and by embedders without a database file. Each map sits behind its own
/// mutex; `try_acquire` holds the process lock for the whole check-and-set.
use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{
    validate_delete, DeltaSink, HistorySink, ProcessStateStore, StrategyStore, TaskRegistry,
    TaskStatusSource,
};
use crate::errors::{SwapError, SwapResult};
use crate::volume::types::{
    AttemptStatus, DeleteScope, DeltaQuery, DeltaSortKey, HistoryFilter, Page, ProcessState,
    StrategyPreset, SwapAttempt, TaskRecord, TaskStatus, WalletDelta,
};

#[derive(Default)]
pub struct MemoryStore {
    process: Mutex<HashMap<String, ProcessState>>,
    history: Mutex<Vec<SwapAttempt>>,
    tasks: Mutex<HashMap<String, TaskRecord>>,
    deltas: Mutex<Vec<WalletDelta>>,
    strategies: Mutex<HashMap<String, StrategyPreset>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a task with a caller-chosen id
    pub fn insert_task(&self, task_id: &str, owner: &str, status: TaskStatus) {
        let now = Utc::now();
        self.tasks.lock().insert(
            task_id.to_string(),
            TaskRecord {
                task_id: task_id.to_string(),
                owner: owner.to_string(),
                name: task_id.to_string(),
                status,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn delta_rows(&self) -> Vec<WalletDelta> {
        self.deltas.lock().clone()
    }

    fn blank_state(owner: &str) -> ProcessState {
        ProcessState {
            owner: owner.to_string(),
            is_active: false,
            cancel_requested: false,
            last_result: String::new(),
            run_token: String::new(),
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ProcessStateStore for MemoryStore {
    async fn try_acquire(&self, owner: &str) -> SwapResult<Option<String>> {
        let mut process = self.process.lock();
        let state = process
            .entry(owner.to_string())
            .or_insert_with(|| Self::blank_state(owner));
        if state.is_active {
            return Ok(None);
        }
        state.is_active = true;
        state.cancel_requested = false;
        state.last_result.clear();
        state.run_token = uuid::Uuid::new_v4().to_string();
        state.updated_at = Utc::now();
        Ok(Some(state.run_token.clone()))
    }

    async fn release_run(&self, owner: &str, run_token: &str, summary: &str) -> SwapResult<bool> {
        let mut process = self.process.lock();
        match process.get_mut(owner) {
            Some(state) if state.run_token == run_token => {
                state.is_active = false;
                state.last_result = summary.to_string();
                state.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn request_cancel(&self, owner: &str) -> SwapResult<()> {
        let mut process = self.process.lock();
        let state = process
            .entry(owner.to_string())
            .or_insert_with(|| Self::blank_state(owner));
        state.is_active = false;
        state.cancel_requested = true;
        state.updated_at = Utc::now();
        Ok(())
    }

    async fn is_cancelled(&self, owner: &str, run_token: &str) -> SwapResult<bool> {
        Ok(self
            .process
            .lock()
            .get(owner)
            .map_or(true, |s| s.cancel_requested || s.run_token != run_token))
    }

    async fn get_state(&self, owner: &str) -> SwapResult<Option<ProcessState>> {
        Ok(self.process.lock().get(owner).cloned())
    }
}

#[async_trait]
impl HistorySink for MemoryStore {
    async fn append_batch(&self, records: &[SwapAttempt]) -> SwapResult<usize> {
        self.history.lock().extend_from_slice(records);
        Ok(records.len())
    }

    async fn query_history(&self, filter: &HistoryFilter) -> SwapResult<Vec<SwapAttempt>> {
        Ok(self
            .history
            .lock()
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn delete_failed_history(
        &self,
        owner: &str,
        scope: &DeleteScope,
    ) -> SwapResult<usize> {
        validate_delete(owner, scope)?;
        let owner = owner.to_lowercase();
        let mut history = self.history.lock();
        let before = history.len();
        history.retain(|r| {
            let in_scope = match scope {
                DeleteScope::AllPools => true,
                DeleteScope::Pool(pool) => &r.pool_address == pool,
            };
            !(r.owner == owner
                && r.status == AttemptStatus::Failure
                && r.job_name.is_none()
                && in_scope)
        });
        Ok(before - history.len())
    }
}

#[async_trait]
impl TaskStatusSource for MemoryStore {
    async fn status(&self, task_id: &str) -> SwapResult<TaskStatus> {
        self.tasks
            .lock()
            .get(task_id)
            .map(|t| t.status)
            .ok_or_else(|| SwapError::Store(format!("task {} not found", task_id)))
    }
}

#[async_trait]
impl TaskRegistry for MemoryStore {
    async fn create_task(&self, owner: &str, name: &str) -> SwapResult<TaskRecord> {
        if owner.trim().is_empty() {
            return Err(SwapError::invalid("owner", "must not be empty"));
        }
        let now = Utc::now();
        let record = TaskRecord {
            task_id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_lowercase(),
            name: name.to_string(),
            status: TaskStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.tasks
            .lock()
            .insert(record.task_id.clone(), record.clone());
        Ok(record)
    }

    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> SwapResult<()> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| SwapError::Store(format!("task {} not found", task_id)))?;
        task.status = status;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> SwapResult<Option<TaskRecord>> {
        Ok(self.tasks.lock().get(task_id).cloned())
    }
}

fn compare_deltas(a: &WalletDelta, b: &WalletDelta, key: DeltaSortKey) -> Ordering {
    match key {
        DeltaSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        DeltaSortKey::Wallet => a.wallet.cmp(&b.wallet),
        DeltaSortKey::TokenAChange => a.token_a_change.cmp(&b.token_a_change),
        DeltaSortKey::TokenBChange => a.token_b_change.cmp(&b.token_b_change),
        DeltaSortKey::GasUsed => a.gas_used.cmp(&b.gas_used),
    }
}

#[async_trait]
impl DeltaSink for MemoryStore {
    async fn persist_deltas(&self, rows: &[WalletDelta]) -> SwapResult<usize> {
        let mut deltas = self.deltas.lock();
        for row in rows {
            let existing = deltas.iter_mut().find(|d| {
                d.owner == row.owner
                    && d.task_id == row.task_id
                    && d.job_name == row.job_name
                    && d.wallet == row.wallet
            });
            match existing {
                Some(d) => {
                    d.token_a_change += row.token_a_change;
                    d.token_b_change += row.token_b_change;
                    d.gas_used = d.gas_used.saturating_add(row.gas_used);
                }
                None => deltas.push(row.clone()),
            }
        }
        Ok(rows.len())
    }

    async fn task_deltas(&self, query: &DeltaQuery) -> SwapResult<Page<WalletDelta>> {
        let page = query.normalized_page();
        let size = query.normalized_size();

        let mut matching: Vec<WalletDelta> = self
            .deltas
            .lock()
            .iter()
            .filter(|d| d.task_id == query.task_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for ties
        matching.sort_by(|a, b| {
            let ord = compare_deltas(a, b, query.sort);
            if query.descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(size as usize)
            .collect();
        Ok(Page {
            items,
            total,
            page,
            size,
        })
    }
}

#[async_trait]
impl StrategyStore for MemoryStore {
    async fn upsert_strategy(&self, preset: &StrategyPreset) -> SwapResult<()> {
        if preset.id.trim().is_empty() {
            return Err(SwapError::invalid("id", "must not be empty"));
        }
        self.strategies
            .lock()
            .insert(preset.id.clone(), preset.clone());
        Ok(())
    }

    async fn get_strategy(&self, id: &str) -> SwapResult<Option<StrategyPreset>> {
        Ok(self.strategies.lock().get(id).cloned())
    }

    async fn list_strategies(&self) -> SwapResult<Vec<StrategyPreset>> {
        let mut presets: Vec<StrategyPreset> = self.strategies.lock().values().cloned().collect();
        presets.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(presets)
    }

    async fn delete_strategy(&self, id: &str) -> SwapResult<bool> {
        Ok(self.strategies.lock().remove(id).is_some())
    }
}
