use sqlx::{Executor, Row};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_TENDER_IDS: &[i64] = &[1, 2, 3];
const SEED_BID_IDS: &[i64] = &[1, 2, 3, 4];
const SEED_HISTORY_IDS: &[&str] =
    &["seed-hist-001", "seed-hist-002", "seed-hist-003", "seed-hist-004", "seed-hist-005"];

/// Deterministic development dataset: three categories, an open tender with
/// competing bids, a draft and a closed tender, plus the matching history
/// rows. Loading is idempotent.
pub struct SeedDataset;

#[derive(Debug)]
pub struct SeedSummary {
    pub tenders: usize,
    pub bids: usize,
    pub history_rows: usize,
}

impl SeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedSummary {
            tenders: SEED_TENDER_IDS.len(),
            bids: SEED_BID_IDS.len(),
            history_rows: SEED_HISTORY_IDS.len(),
        })
    }

    /// Confirms the seed rows are present and still decodable through the
    /// repository row mappers.
    pub async fn verify(pool: &DbPool) -> Result<(), RepositoryError> {
        let tenders: i64 = sqlx::query("SELECT COUNT(*) AS count FROM tender WHERE id <= 3")
            .fetch_one(pool)
            .await?
            .get("count");
        if tenders != SEED_TENDER_IDS.len() as i64 {
            return Err(RepositoryError::Decode(format!(
                "expected {} seed tenders, found {tenders}",
                SEED_TENDER_IDS.len()
            )));
        }

        let rows = sqlx::query(
            "SELECT id, tender_id, vendor_id, amount, proposal, delivery_timeline,
                    attachments_json, status, submitted_at, evaluated_at, evaluated_by,
                    rejection_reason, updated_at
             FROM bid WHERE id <= 4",
        )
        .fetch_all(pool)
        .await?;
        if rows.len() != SEED_BID_IDS.len() {
            return Err(RepositoryError::Decode(format!(
                "expected {} seed bids, found {}",
                SEED_BID_IDS.len(),
                rows.len()
            )));
        }
        for row in &rows {
            crate::repositories::bid::row_to_bid(row)?;
        }

        let history: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM bid_history WHERE id LIKE 'seed-hist-%'")
                .fetch_one(pool)
                .await?
                .get("count");
        if history != SEED_HISTORY_IDS.len() as i64 {
            return Err(RepositoryError::Decode(format!(
                "expected {} seed history rows, found {history}",
                SEED_HISTORY_IDS.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SeedDataset;
    use crate::connection::{ConnectionManager, ConnectionSettings};
    use crate::migrations;

    #[tokio::test]
    async fn seed_loads_verifies_and_is_idempotent() {
        let manager = ConnectionManager::connect("sqlite::memory:", ConnectionSettings::default())
            .await
            .expect("connect");
        let pool = manager.pool().expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");

        let summary = SeedDataset::load(&pool).await.expect("load");
        assert_eq!(summary.tenders, 3);
        assert_eq!(summary.bids, 4);
        SeedDataset::verify(&pool).await.expect("verify");

        // Re-loading replaces rather than duplicates.
        SeedDataset::load(&pool).await.expect("reload");
        SeedDataset::verify(&pool).await.expect("verify after reload");
    }
}
