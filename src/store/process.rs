/// `swap_process` table: the per-owner guard flags
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::database::{db_error, parse_timestamp, SwapDatabase};
use super::ProcessStateStore;
use crate::errors::SwapResult;
use crate::volume::types::ProcessState;

#[async_trait]
impl ProcessStateStore for SwapDatabase {
    async fn try_acquire(&self, owner: &str) -> SwapResult<Option<String>> {
        let conn = self.connection()?;
        let run_token = Uuid::new_v4().to_string();
        // Single statement compare-and-set: the update branch only fires
        // while the existing row is inactive
        let changed = conn
            .execute(
                r#"
                INSERT INTO swap_process (owner, is_active, cancel_requested, last_result, run_token, updated_at)
                VALUES (?1, 1, 0, '', ?2, ?3)
                ON CONFLICT(owner) DO UPDATE SET
                    is_active = 1,
                    cancel_requested = 0,
                    last_result = '',
                    run_token = excluded.run_token,
                    updated_at = excluded.updated_at
                WHERE swap_process.is_active = 0
                "#,
                params![owner, run_token, Utc::now().to_rfc3339()],
            )
            .map_err(|e| db_error("acquire swap process", e))?;
        Ok((changed == 1).then_some(run_token))
    }

    async fn release_run(&self, owner: &str, run_token: &str, summary: &str) -> SwapResult<bool> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                r#"
                UPDATE swap_process
                SET is_active = 0, last_result = ?3, updated_at = ?4
                WHERE owner = ?1 AND run_token = ?2
                "#,
                params![owner, run_token, summary, Utc::now().to_rfc3339()],
            )
            .map_err(|e| db_error("release swap run", e))?;
        Ok(changed == 1)
    }

    async fn request_cancel(&self, owner: &str) -> SwapResult<()> {
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO swap_process (owner, is_active, cancel_requested, last_result, run_token, updated_at)
            VALUES (?1, 0, 1, '', '', ?2)
            ON CONFLICT(owner) DO UPDATE SET
                is_active = 0,
                cancel_requested = 1,
                updated_at = excluded.updated_at
            "#,
            params![owner, Utc::now().to_rfc3339()],
        )
        .map_err(|e| db_error("request cancel", e))?;
        Ok(())
    }

    async fn is_cancelled(&self, owner: &str, run_token: &str) -> SwapResult<bool> {
        let conn = self.connection()?;
        let row: Option<(bool, String)> = conn
            .query_row(
                "SELECT cancel_requested, run_token FROM swap_process WHERE owner = ?1",
                params![owner],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| db_error("read cancel flag", e))?;
        Ok(match row {
            Some((cancel_requested, current)) => cancel_requested || current != run_token,
            None => true,
        })
    }

    async fn get_state(&self, owner: &str) -> SwapResult<Option<ProcessState>> {
        let conn = self.connection()?;
        conn.query_row(
            r#"
            SELECT owner, is_active, cancel_requested, last_result, run_token, updated_at
            FROM swap_process WHERE owner = ?1
            "#,
            params![owner],
            |row| {
                let updated_at: String = row.get(5)?;
                Ok(ProcessState {
                    owner: row.get(0)?,
                    is_active: row.get(1)?,
                    cancel_requested: row.get(2)?,
                    last_result: row.get(3)?,
                    run_token: row.get(4)?,
                    updated_at: parse_timestamp(&updated_at),
                })
            },
        )
        .optional()
        .map_err(|e| db_error("read swap process", e))
    }
}
