use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use tenderd_core::audit::{AuditAction, BidAuditRecord, BidSnapshot};
use tenderd_core::domain::actor::UserId;
use tenderd_core::domain::bid::BidId;

use super::{parse_timestamp, BidHistoryRepository, RepositoryError};
use crate::connection::ConnectionManager;

const HISTORY_COLUMNS: &str =
    "id, bid_id, action, old_values, new_values, performed_by, note, created_at";

/// Append-only journal over `bid_history`. There is deliberately no update
/// or delete path; corrections are new rows.
pub struct SqlBidHistoryRepository {
    manager: ConnectionManager,
}

impl SqlBidHistoryRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

/// Writes one history row on the supplied connection so repositories and
/// the award coordinator can journal inside their own transactions.
pub async fn append_tx(
    conn: &mut SqliteConnection,
    record: &BidAuditRecord,
) -> Result<(), RepositoryError> {
    let old_values = record
        .old_values
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(RepositoryError::decode)?;
    let new_values = record
        .new_values
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(RepositoryError::decode)?;

    sqlx::query(
        "INSERT INTO bid_history (id, bid_id, action, old_values, new_values,
                                  performed_by, note, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(record.bid_id.0)
    .bind(record.action.as_str())
    .bind(&old_values)
    .bind(&new_values)
    .bind(record.performed_by.0)
    .bind(&record.note)
    .bind(record.created_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

fn row_to_record(row: &SqliteRow) -> Result<BidAuditRecord, RepositoryError> {
    let action_raw: String = row.try_get("action")?;
    let action = AuditAction::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown audit action `{action_raw}`")))?;

    let old_values = row
        .try_get::<Option<String>, _>("old_values")?
        .map(|raw| serde_json::from_str::<BidSnapshot>(&raw))
        .transpose()
        .map_err(RepositoryError::decode)?;
    let new_values = row
        .try_get::<Option<String>, _>("new_values")?
        .map(|raw| serde_json::from_str::<BidSnapshot>(&raw))
        .transpose()
        .map_err(RepositoryError::decode)?;

    Ok(BidAuditRecord {
        id: row.try_get("id")?,
        bid_id: BidId(row.try_get("bid_id")?),
        action,
        old_values,
        new_values,
        performed_by: UserId(row.try_get("performed_by")?),
        note: row.try_get("note")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[async_trait]
impl BidHistoryRepository for SqlBidHistoryRepository {
    async fn append(&self, record: BidAuditRecord) -> Result<(), RepositoryError> {
        self.manager
            .with_transaction::<(), RepositoryError, _>(move |conn| {
                Box::pin(async move { append_tx(conn, &record).await })
            })
            .await
    }

    async fn list_for_bid(&self, bid_id: BidId) -> Result<Vec<BidAuditRecord>, RepositoryError> {
        let pool = self.manager.pool()?;
        let query = format!(
            "SELECT {HISTORY_COLUMNS} FROM bid_history WHERE bid_id = ? ORDER BY created_at, id"
        );
        let rows = sqlx::query(&query).bind(bid_id.0).fetch_all(&pool).await?;
        rows.iter().map(row_to_record).collect()
    }
}
