/// `swap_strategies` table
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::database::{db_error, decode_error, SwapDatabase};
use super::StrategyStore;
use crate::errors::{SwapError, SwapResult};
use crate::logger::{self, LogTag};
use crate::volume::types::{Direction, StrategyPreset};

const STRATEGY_COLUMNS: &str = "id, name, pool_address, direction, lower_bound, upper_bound, \
     decimals_a, decimals_b, slippage, stop_threshold";

fn row_to_preset(row: &Row<'_>) -> rusqlite::Result<StrategyPreset> {
    let direction: String = row.get(3)?;
    Ok(StrategyPreset {
        id: row.get(0)?,
        name: row.get(1)?,
        pool_address: row.get(2)?,
        direction: Direction::from_db_value(&direction).ok_or_else(|| decode_error(3, &direction))?,
        lower_bound: row.get(4)?,
        upper_bound: row.get(5)?,
        decimals_a: row.get(6)?,
        decimals_b: row.get(7)?,
        slippage: row.get(8)?,
        stop_threshold: row.get(9)?,
    })
}

#[async_trait]
impl StrategyStore for SwapDatabase {
    async fn upsert_strategy(&self, preset: &StrategyPreset) -> SwapResult<()> {
        if preset.id.trim().is_empty() {
            return Err(SwapError::invalid("id", "must not be empty"));
        }
        let now = Utc::now().to_rfc3339();
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO swap_strategies
                (id, name, pool_address, direction, lower_bound, upper_bound,
                 decimals_a, decimals_b, slippage, stop_threshold, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                pool_address = excluded.pool_address,
                direction = excluded.direction,
                lower_bound = excluded.lower_bound,
                upper_bound = excluded.upper_bound,
                decimals_a = excluded.decimals_a,
                decimals_b = excluded.decimals_b,
                slippage = excluded.slippage,
                stop_threshold = excluded.stop_threshold,
                updated_at = excluded.updated_at
            "#,
            params![
                preset.id,
                preset.name,
                preset.pool_address,
                preset.direction.to_db_value(),
                preset.lower_bound,
                preset.upper_bound,
                preset.decimals_a,
                preset.decimals_b,
                preset.slippage,
                preset.stop_threshold,
                now,
            ],
        )
        .map_err(|e| db_error("upsert strategy", e))?;

        logger::debug(
            LogTag::Database,
            &format!("Saved strategy {} ({})", preset.id, preset.name),
        );
        Ok(())
    }

    async fn get_strategy(&self, id: &str) -> SwapResult<Option<StrategyPreset>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {} FROM swap_strategies WHERE id = ?1", STRATEGY_COLUMNS),
            params![id],
            row_to_preset,
        )
        .optional()
        .map_err(|e| db_error("read strategy", e))
    }

    async fn list_strategies(&self) -> SwapResult<Vec<StrategyPreset>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM swap_strategies ORDER BY name ASC, id ASC",
                STRATEGY_COLUMNS
            ))
            .map_err(|e| db_error("prepare strategy list", e))?;
        let rows = stmt
            .query_map([], row_to_preset)
            .map_err(|e| db_error("list strategies", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_error("read strategy row", e))
    }

    async fn delete_strategy(&self, id: &str) -> SwapResult<bool> {
        let conn = self.connection()?;
        let deleted = conn
            .execute("DELETE FROM swap_strategies WHERE id = ?1", params![id])
            .map_err(|e| db_error("delete strategy", e))?;
        Ok(deleted > 0)
    }
}
