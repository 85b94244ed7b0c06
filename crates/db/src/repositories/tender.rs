use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, SqliteConnection};

use tenderd_core::domain::actor::{Actor, UserId};
use tenderd_core::domain::category::CategoryId;
use tenderd_core::domain::tender::{
    validate_budget, NewTender, Tender, TenderId, TenderPatch, TenderStatus,
};
use tenderd_core::errors::DomainError;
use tenderd_core::lifecycle::{tender_transition, TenderEvent};

use super::{
    parse_optional_decimal, parse_optional_timestamp, parse_timestamp, RepositoryError,
    TenderFilter, TenderRepository,
};
use crate::connection::ConnectionManager;

const TENDER_COLUMNS: &str = "id, title, description, category_id, budget_min, budget_max, \
     deadline, status, created_by, view_count, requirements, published_at, closing_date, \
     created_at, updated_at";

pub struct SqlTenderRepository {
    manager: ConnectionManager,
}

impl SqlTenderRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

pub(crate) fn row_to_tender(row: &SqliteRow) -> Result<Tender, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = TenderStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown tender status `{status_raw}`")))?;

    Ok(Tender {
        id: TenderId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category_id: row.try_get::<Option<i64>, _>("category_id")?.map(CategoryId),
        budget_min: parse_optional_decimal("budget_min", row.try_get("budget_min")?)?,
        budget_max: parse_optional_decimal("budget_max", row.try_get("budget_max")?)?,
        deadline: parse_timestamp("deadline", row.try_get("deadline")?)?,
        status,
        created_by: UserId(row.try_get("created_by")?),
        view_count: row.try_get("view_count")?,
        requirements: row.try_get("requirements")?,
        published_at: parse_optional_timestamp("published_at", row.try_get("published_at")?)?,
        closing_date: parse_optional_timestamp("closing_date", row.try_get("closing_date")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

/// Transaction-scoped read used by the award coordinator and the status
/// entry points; shares a view with the surrounding statements.
pub async fn fetch_tender_tx(
    conn: &mut SqliteConnection,
    id: TenderId,
) -> Result<Option<Tender>, RepositoryError> {
    let query = format!("SELECT {TENDER_COLUMNS} FROM tender WHERE id = ?");
    let row = sqlx::query(&query).bind(id.0).fetch_optional(conn).await?;
    row.as_ref().map(row_to_tender).transpose()
}

/// Writes an already-validated status, stamping `published_at` on the first
/// transition to open and `closing_date` when bidding terminates.
pub async fn apply_status_tx(
    conn: &mut SqliteConnection,
    id: TenderId,
    next: TenderStatus,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let now_str = now.to_rfc3339();
    let result = match next {
        TenderStatus::Open => {
            sqlx::query(
                "UPDATE tender SET status = ?, published_at = COALESCE(published_at, ?),
                        updated_at = ?
                 WHERE id = ?",
            )
            .bind(next.as_str())
            .bind(&now_str)
            .bind(&now_str)
            .bind(id.0)
            .execute(conn)
            .await?
        }
        TenderStatus::Closed | TenderStatus::Awarded => {
            sqlx::query(
                "UPDATE tender SET status = ?, closing_date = COALESCE(closing_date, ?),
                        updated_at = ?
                 WHERE id = ?",
            )
            .bind(next.as_str())
            .bind(&now_str)
            .bind(&now_str)
            .bind(id.0)
            .execute(conn)
            .await?
        }
        _ => {
            sqlx::query("UPDATE tender SET status = ?, updated_at = ? WHERE id = ?")
                .bind(next.as_str())
                .bind(&now_str)
                .bind(id.0)
                .execute(conn)
                .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(DomainError::TenderNotFound(id).into());
    }
    Ok(())
}

async fn bid_count_tx(conn: &mut SqliteConnection, id: TenderId) -> Result<i64, RepositoryError> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM bid WHERE tender_id = ?")
        .bind(id.0)
        .fetch_one(conn)
        .await?;
    Ok(row.get("count"))
}

#[async_trait]
impl TenderRepository for SqlTenderRepository {
    async fn create(&self, tender: NewTender) -> Result<Tender, RepositoryError> {
        let now = Utc::now();
        tender.validate(now)?;

        let status = if tender.publish { TenderStatus::Open } else { TenderStatus::Draft };
        let published_at = tender.publish.then(|| now.to_rfc3339());
        let now_str = now.to_rfc3339();

        let pool = self.manager.pool()?;
        let result = sqlx::query(
            "INSERT INTO tender (title, description, category_id, budget_min, budget_max,
                                 deadline, status, created_by, view_count, requirements,
                                 published_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
        )
        .bind(&tender.title)
        .bind(&tender.description)
        .bind(tender.category_id.map(|c| c.0))
        .bind(tender.budget_min.map(|d| d.to_string()))
        .bind(tender.budget_max.map(|d| d.to_string()))
        .bind(tender.deadline.to_rfc3339())
        .bind(status.as_str())
        .bind(tender.created_by.0)
        .bind(&tender.requirements)
        .bind(&published_at)
        .bind(&now_str)
        .bind(&now_str)
        .execute(&pool)
        .await?;

        let id = TenderId(result.last_insert_rowid());
        self.find_by_id(id).await?.ok_or_else(|| DomainError::TenderNotFound(id).into())
    }

    async fn find_by_id(&self, id: TenderId) -> Result<Option<Tender>, RepositoryError> {
        let pool = self.manager.pool()?;
        let query = format!("SELECT {TENDER_COLUMNS} FROM tender WHERE id = ?");
        let row = sqlx::query(&query).bind(id.0).fetch_optional(&pool).await?;
        row.as_ref().map(row_to_tender).transpose()
    }

    async fn find_all(&self, filter: &TenderFilter) -> Result<Vec<Tender>, RepositoryError> {
        let pool = self.manager.pool()?;

        let mut builder = QueryBuilder::new(format!("SELECT {TENDER_COLUMNS} FROM tender WHERE 1=1"));

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(category_id) = filter.category_id {
            builder.push(" AND category_id = ").push_bind(category_id.0);
        }
        if let Some(created_by) = filter.created_by {
            builder.push(" AND created_by = ").push_bind(created_by.0);
        }
        if let Some(budget_min) = filter.budget_min {
            builder
                .push(" AND budget_max IS NOT NULL AND CAST(budget_max AS REAL) >= CAST(")
                .push_bind(budget_min.to_string())
                .push(" AS REAL)");
        }
        if let Some(budget_max) = filter.budget_max {
            builder
                .push(" AND budget_min IS NOT NULL AND CAST(budget_min AS REAL) <= CAST(")
                .push_bind(budget_max.to_string())
                .push(" AS REAL)");
        }
        if let Some(search) = &filter.search {
            let needle = format!("%{}%", search.to_lowercase());
            builder
                .push(" AND (LOWER(title) LIKE ")
                .push_bind(needle.clone())
                .push(" OR LOWER(description) LIKE ")
                .push_bind(needle)
                .push(")");
        }
        if filter.active_only {
            builder
                .push(" AND status = 'open' AND deadline > ")
                .push_bind(Utc::now().to_rfc3339());
        }
        builder.push(" ORDER BY created_at DESC, id DESC");

        let rows = builder.build().fetch_all(&pool).await?;
        rows.iter().map(row_to_tender).collect()
    }

    async fn update(
        &self,
        id: TenderId,
        patch: TenderPatch,
        actor: &Actor,
    ) -> Result<Tender, RepositoryError> {
        let actor = *actor;
        self.manager
            .with_transaction::<Tender, RepositoryError, _>(move |conn| {
                Box::pin(async move {
                    let tender = fetch_tender_tx(conn, id)
                        .await?
                        .ok_or(DomainError::TenderNotFound(id))?;
                    if !actor.can_manage(&tender) {
                        return Err(DomainError::forbidden(actor.id, "update this tender").into());
                    }

                    // Once bids exist, every substantive field is frozen
                    // for everyone but admins; only status changes (via
                    // set_status) remain open to the owner.
                    if !patch.is_empty() && !actor.is_admin() {
                        let bids = bid_count_tx(conn, id).await?;
                        if bids > 0 {
                            return Err(DomainError::forbidden(
                                actor.id,
                                "edit a tender that has already received bids",
                            )
                            .into());
                        }
                    }

                    let merged_min = patch.budget_min.or(tender.budget_min);
                    let merged_max = patch.budget_max.or(tender.budget_max);
                    validate_budget(merged_min, merged_max)?;

                    let title = patch.title.unwrap_or(tender.title);
                    let description = patch.description.unwrap_or(tender.description);
                    let category_id = patch.category_id.or(tender.category_id);
                    let deadline = patch.deadline.unwrap_or(tender.deadline);
                    let requirements = patch.requirements.or(tender.requirements);

                    sqlx::query(
                        "UPDATE tender SET title = ?, description = ?, category_id = ?,
                                budget_min = ?, budget_max = ?, deadline = ?, requirements = ?,
                                updated_at = ?
                         WHERE id = ?",
                    )
                    .bind(&title)
                    .bind(&description)
                    .bind(category_id.map(|c| c.0))
                    .bind(merged_min.map(|d| d.to_string()))
                    .bind(merged_max.map(|d| d.to_string()))
                    .bind(deadline.to_rfc3339())
                    .bind(&requirements)
                    .bind(Utc::now().to_rfc3339())
                    .bind(id.0)
                    .execute(&mut *conn)
                    .await?;

                    fetch_tender_tx(conn, id)
                        .await?
                        .ok_or_else(|| DomainError::TenderNotFound(id).into())
                })
            })
            .await
    }

    async fn set_status(
        &self,
        id: TenderId,
        event: TenderEvent,
        actor: &Actor,
    ) -> Result<Tender, RepositoryError> {
        let actor = *actor;
        self.manager
            .with_transaction::<Tender, RepositoryError, _>(move |conn| {
                Box::pin(async move {
                    let tender = fetch_tender_tx(conn, id)
                        .await?
                        .ok_or(DomainError::TenderNotFound(id))?;
                    if !actor.can_manage(&tender) {
                        return Err(
                            DomainError::forbidden(actor.id, "change tender status").into()
                        );
                    }

                    let now = Utc::now();
                    let next = tender_transition(tender.status, event)
                        .map_err(DomainError::from)?;
                    if event == TenderEvent::Publish && tender.deadline <= now {
                        return Err(DomainError::DeadlinePassed { tender: Some(id) }.into());
                    }

                    apply_status_tx(conn, id, next, now).await?;
                    fetch_tender_tx(conn, id)
                        .await?
                        .ok_or_else(|| DomainError::TenderNotFound(id).into())
                })
            })
            .await
    }

    async fn record_view(&self, id: TenderId) -> Result<(), RepositoryError> {
        let pool = self.manager.pool()?;
        sqlx::query("UPDATE tender SET view_count = view_count + 1 WHERE id = ?")
            .bind(id.0)
            .execute(&pool)
            .await?;
        Ok(())
    }
}
