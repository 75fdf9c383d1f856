/// `swap_tasks` and `swap_task_changes` tables
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::database::{
    db_error, decode_error, delta_to_db_int, from_db_int, parse_timestamp, to_db_int,
    SwapDatabase,
};
use super::{DeltaSink, TaskRegistry, TaskStatusSource};
use crate::errors::{SwapError, SwapResult};
use crate::logger::{self, LogTag};
use crate::volume::types::{DeltaQuery, Page, TaskRecord, TaskStatus, WalletDelta};

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(TaskRecord {
        task_id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        status: TaskStatus::from_db_value(&status).ok_or_else(|| decode_error(3, &status))?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_delta(row: &Row<'_>) -> rusqlite::Result<WalletDelta> {
    let a: i64 = row.get(4)?;
    let b: i64 = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(WalletDelta {
        owner: row.get(0)?,
        task_id: row.get(1)?,
        job_name: row.get(2)?,
        wallet: row.get(3)?,
        token_a_change: i128::from(a),
        token_b_change: i128::from(b),
        gas_used: from_db_int(row.get(6)?),
        created_at: parse_timestamp(&created_at),
    })
}

#[async_trait]
impl TaskStatusSource for SwapDatabase {
    async fn status(&self, task_id: &str) -> SwapResult<TaskStatus> {
        let conn = self.connection()?;
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM swap_tasks WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_error("read task status", e))?;

        let status = status.ok_or_else(|| SwapError::Store(format!("task {} not found", task_id)))?;
        TaskStatus::from_db_value(&status)
            .ok_or_else(|| SwapError::Store(format!("task {} has unknown status '{}'", task_id, status)))
    }
}

#[async_trait]
impl TaskRegistry for SwapDatabase {
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

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO swap_tasks (task_id, owner, name, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.task_id,
                record.owner,
                record.name,
                record.status.to_db_value(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| db_error("insert task", e))?;

        logger::info(
            LogTag::Tasks,
            &format!("Created task {} ({}) for {}", record.task_id, record.name, record.owner),
        );
        Ok(record)
    }

    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> SwapResult<()> {
        let conn = self.connection()?;
        let updated = conn
            .execute(
                "UPDATE swap_tasks SET status = ?1, updated_at = ?2 WHERE task_id = ?3",
                params![status.to_db_value(), Utc::now().to_rfc3339(), task_id],
            )
            .map_err(|e| db_error("update task status", e))?;
        if updated == 0 {
            return Err(SwapError::Store(format!("task {} not found", task_id)));
        }
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> SwapResult<Option<TaskRecord>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT task_id, owner, name, status, created_at, updated_at \
             FROM swap_tasks WHERE task_id = ?1",
            params![task_id],
            row_to_task,
        )
        .optional()
        .map_err(|e| db_error("read task", e))
    }
}

#[async_trait]
impl DeltaSink for SwapDatabase {
    async fn persist_deltas(&self, rows: &[WalletDelta]) -> SwapResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_error("begin delta transaction", e))?;
        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO swap_task_changes
                        (owner, task_id, job_name, wallet, token_a_change, token_b_change, gas_used, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(owner, task_id, job_name, wallet) DO UPDATE SET
                        token_a_change = token_a_change + excluded.token_a_change,
                        token_b_change = token_b_change + excluded.token_b_change,
                        gas_used = gas_used + excluded.gas_used
                    "#,
                )
                .map_err(|e| db_error("prepare delta upsert", e))?;

            for row in rows {
                stmt.execute(params![
                    row.owner,
                    row.task_id,
                    row.job_name,
                    row.wallet,
                    delta_to_db_int(row.token_a_change, "token_a_change")?,
                    delta_to_db_int(row.token_b_change, "token_b_change")?,
                    to_db_int(row.gas_used, "gas_used")?,
                    row.created_at.to_rfc3339(),
                ])
                .map_err(|e| db_error("upsert task delta", e))?;
            }
        }
        tx.commit().map_err(|e| db_error("commit task deltas", e))?;

        logger::debug(
            LogTag::Tasks,
            &format!("Stored {} wallet deltas", rows.len()),
        );
        Ok(rows.len())
    }

    async fn task_deltas(&self, query: &DeltaQuery) -> SwapResult<Page<WalletDelta>> {
        let page = query.normalized_page();
        let size = query.normalized_size();
        let order = if query.descending { "DESC" } else { "ASC" };
        // Column name comes from the whitelisted sort key
        let sql = format!(
            "SELECT owner, task_id, job_name, wallet, token_a_change, token_b_change, gas_used, created_at \
             FROM swap_task_changes WHERE task_id = ?1 \
             ORDER BY {} {}, id ASC LIMIT ?2 OFFSET ?3",
            query.sort.column(),
            order
        );

        let conn = self.connection()?;
        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM swap_task_changes WHERE task_id = ?1",
                params![query.task_id],
                |row| row.get(0),
            )
            .map_err(|e| db_error("count task deltas", e))?;

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| db_error("prepare task delta query", e))?;
        let offset = to_db_int(query.offset(), "offset")?;
        let items = stmt
            .query_map(params![query.task_id, i64::from(size), offset], row_to_delta)
            .map_err(|e| db_error("query task deltas", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_error("read task delta row", e))?;

        Ok(Page {
            items,
            total: from_db_int(total),
            page,
            size,
        })
    }
}
