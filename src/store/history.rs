/// `swap_history` table
use async_trait::async_trait;
use rusqlite::types::ToSql;
use rusqlite::{params, Row};

use super::database::{
    db_error, decode_error, from_db_int, parse_timestamp, to_db_int, SwapDatabase,
};
use super::{validate_delete, HistorySink};
use crate::errors::SwapResult;
use crate::logger::{self, LogTag};
use crate::volume::types::{
    AttemptStatus, DeleteScope, Direction, HistoryFilter, SwapAttempt,
};

const HISTORY_COLUMNS: &str = "timestamp, owner, wallet, pool_address, direction, status, \
     tx_reference, amount_in, amount_out, gas_total, gas_net, strategy_id, strategy_name, \
     task_id, job_name";

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<SwapAttempt> {
    let timestamp: String = row.get(0)?;
    let direction: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(SwapAttempt {
        timestamp: parse_timestamp(&timestamp),
        owner: row.get(1)?,
        wallet: row.get(2)?,
        pool_address: row.get(3)?,
        direction: Direction::from_db_value(&direction).ok_or_else(|| decode_error(4, &direction))?,
        status: AttemptStatus::from_db_value(&status).ok_or_else(|| decode_error(5, &status))?,
        tx_reference: row.get(6)?,
        amount_in: from_db_int(row.get(7)?),
        amount_out: from_db_int(row.get(8)?),
        gas_total: from_db_int(row.get(9)?),
        gas_net: from_db_int(row.get(10)?),
        strategy_id: row.get(11)?,
        strategy_name: row.get(12)?,
        task_id: row.get(13)?,
        job_name: row.get(14)?,
    })
}

#[async_trait]
impl HistorySink for SwapDatabase {
    async fn append_batch(&self, records: &[SwapAttempt]) -> SwapResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_error("begin history transaction", e))?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO swap_history ({}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    HISTORY_COLUMNS
                ))
                .map_err(|e| db_error("prepare history insert", e))?;

            for record in records {
                stmt.execute(params![
                    record.timestamp.to_rfc3339(),
                    record.owner,
                    record.wallet,
                    record.pool_address,
                    record.direction.to_db_value(),
                    record.status.to_db_value(),
                    record.tx_reference,
                    to_db_int(record.amount_in, "amount_in")?,
                    to_db_int(record.amount_out, "amount_out")?,
                    to_db_int(record.gas_total, "gas_total")?,
                    to_db_int(record.gas_net, "gas_net")?,
                    record.strategy_id,
                    record.strategy_name,
                    record.task_id,
                    record.job_name,
                ])
                .map_err(|e| db_error("insert history record", e))?;
            }
        }
        tx.commit()
            .map_err(|e| db_error("commit history batch", e))?;

        logger::debug(
            LogTag::History,
            &format!("Stored {} history records", records.len()),
        );
        Ok(records.len())
    }

    async fn query_history(&self, filter: &HistoryFilter) -> SwapResult<Vec<SwapAttempt>> {
        let mut sql = format!(
            "SELECT {} FROM swap_history WHERE owner = ?",
            HISTORY_COLUMNS
        );
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(filter.owner.clone())];

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(Box::new(status.to_db_value()));
        }
        if let Some(wallet) = &filter.wallet {
            sql.push_str(" AND wallet = ?");
            args.push(Box::new(wallet.clone()));
        }
        if let Some(pool) = &filter.pool_address {
            sql.push_str(" AND pool_address = ?");
            args.push(Box::new(pool.clone()));
        }
        if let Some(direction) = filter.direction {
            sql.push_str(" AND direction = ?");
            args.push(Box::new(direction.to_db_value()));
        }
        if let Some(tx_reference) = &filter.tx_reference {
            sql.push_str(" AND tx_reference = ?");
            args.push(Box::new(tx_reference.clone()));
        }
        sql.push_str(" ORDER BY id DESC");

        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| db_error("prepare history query", e))?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                row_to_attempt,
            )
            .map_err(|e| db_error("query history", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_error("read history row", e))
    }

    async fn delete_failed_history(
        &self,
        owner: &str,
        scope: &DeleteScope,
    ) -> SwapResult<usize> {
        validate_delete(owner, scope)?;
        let owner = owner.to_lowercase();

        let conn = self.connection()?;
        let deleted = match scope {
            DeleteScope::AllPools => conn.execute(
                "DELETE FROM swap_history \
                 WHERE owner = ?1 AND status = 'failure' AND job_name IS NULL",
                params![owner],
            ),
            DeleteScope::Pool(pool) => conn.execute(
                "DELETE FROM swap_history \
                 WHERE owner = ?1 AND status = 'failure' AND job_name IS NULL \
                 AND pool_address = ?2",
                params![owner, pool],
            ),
        }
        .map_err(|e| db_error("delete failed history", e))?;

        logger::info(
            LogTag::History,
            &format!("Deleted {} failed history records for {}", deleted, owner),
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::database::test_support::temp_db;
    use chrono::Utc;

    fn attempt(wallet: &str, pool: &str, ok: bool, job: Option<&str>) -> SwapAttempt {
        SwapAttempt {
            timestamp: Utc::now(),
            owner: "0xowner".to_string(),
            wallet: wallet.to_string(),
            pool_address: pool.to_string(),
            direction: Direction::AToB,
            status: if ok {
                AttemptStatus::Success
            } else {
                AttemptStatus::Failure
            },
            tx_reference: ok.then(|| format!("tx-{}", wallet)),
            amount_in: if ok { 100 } else { 0 },
            amount_out: if ok { 95 } else { 0 },
            gas_total: if ok { 3_000 } else { 0 },
            gas_net: if ok { 1_500 } else { 0 },
            strategy_id: Some("s1".to_string()),
            strategy_name: Some("Preset".to_string()),
            task_id: job.map(|_| "t1".to_string()),
            job_name: job.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_batch_round_trip_newest_first() {
        let (_dir, db) = temp_db();
        let batch = vec![
            attempt("0xw1", "0xp1", true, None),
            attempt("0xw2", "0xp1", false, None),
            attempt("0xw3", "0xp2", true, None),
        ];
        assert_eq!(db.append_batch(&batch).await.unwrap(), 3);

        let all = db
            .query_history(&HistoryFilter::for_owner("0xowner"))
            .await
            .unwrap();
        let wallets: Vec<&str> = all.iter().map(|a| a.wallet.as_str()).collect();
        assert_eq!(wallets, vec!["0xw3", "0xw2", "0xw1"]);
        assert_eq!(all[2].gas_net, 1_500);
        assert_eq!(all[2].tx_reference.as_deref(), Some("tx-0xw1"));
    }

    #[tokio::test]
    async fn test_query_filters_combine() {
        let (_dir, db) = temp_db();
        db.append_batch(&[
            attempt("0xw1", "0xp1", true, None),
            attempt("0xw1", "0xp2", false, None),
            attempt("0xw2", "0xp1", false, None),
        ])
        .await
        .unwrap();

        let mut filter = HistoryFilter::for_owner("0xowner");
        filter.status = Some(AttemptStatus::Failure);
        assert_eq!(db.query_history(&filter).await.unwrap().len(), 2);

        filter.wallet = Some("0xw1".to_string());
        let rows = db.query_history(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pool_address, "0xp2");

        let mut by_tx = HistoryFilter::for_owner("0xowner");
        by_tx.tx_reference = Some("tx-0xw1".to_string());
        assert_eq!(db.query_history(&by_tx).await.unwrap().len(), 1);

        assert!(db
            .query_history(&HistoryFilter::for_owner("0xsomeoneelse"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_failed_keeps_successes_and_task_rows() {
        let (_dir, db) = temp_db();
        db.append_batch(&[
            attempt("0xw1", "0xp1", true, None),
            attempt("0xw2", "0xp1", false, None),
            attempt("0xw3", "0xp2", false, None),
            attempt("0xw4", "0xp1", false, Some("job-1")),
        ])
        .await
        .unwrap();

        let deleted = db
            .delete_failed_history("0xOwner", &DeleteScope::Pool("0xp1".to_string()))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let deleted = db
            .delete_failed_history("0xowner", &DeleteScope::AllPools)
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = db
            .query_history(&HistoryFilter::for_owner("0xowner"))
            .await
            .unwrap();
        let wallets: Vec<&str> = remaining.iter().map(|a| a.wallet.as_str()).collect();
        assert_eq!(wallets, vec!["0xw4", "0xw1"]);
    }

    #[tokio::test]
    async fn test_delete_rejects_invalid_input() {
        let (_dir, db) = temp_db();
        assert!(db
            .delete_failed_history("", &DeleteScope::AllPools)
            .await
            .unwrap_err()
            .is_configuration());
        assert!(db
            .delete_failed_history("0xowner", &DeleteScope::Pool(" ".to_string()))
            .await
            .is_err());
    }
}
