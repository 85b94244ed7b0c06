use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, SqliteConnection};

use tenderd_core::audit::{AuditAction, BidAuditRecord};
use tenderd_core::domain::actor::{Actor, UserId};
use tenderd_core::domain::bid::{Attachment, Bid, BidId, BidPatch, BidStatus, NewBid};
use tenderd_core::domain::tender::{TenderId, TenderStatus};
use tenderd_core::errors::DomainError;
use tenderd_core::lifecycle::{bid_transition, BidEvent};

use super::history::append_tx;
use super::tender::fetch_tender_tx;
use super::{parse_decimal, parse_optional_timestamp, parse_timestamp, BidFilter, BidRepository, RepositoryError};
use crate::connection::ConnectionManager;

const BID_COLUMNS: &str = "id, tender_id, vendor_id, amount, proposal, delivery_timeline, \
     attachments_json, status, submitted_at, evaluated_at, evaluated_by, rejection_reason, \
     updated_at";

pub struct SqlBidRepository {
    manager: ConnectionManager,
}

impl SqlBidRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

pub(crate) fn row_to_bid(row: &SqliteRow) -> Result<Bid, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = BidStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown bid status `{status_raw}`")))?;

    let attachments_raw: String = row.try_get("attachments_json")?;
    let attachments: Vec<Attachment> =
        serde_json::from_str(&attachments_raw).map_err(RepositoryError::decode)?;

    let amount_raw: String = row.try_get("amount")?;

    Ok(Bid {
        id: BidId(row.try_get("id")?),
        tender_id: TenderId(row.try_get("tender_id")?),
        vendor_id: UserId(row.try_get("vendor_id")?),
        amount: parse_decimal("amount", &amount_raw)?,
        proposal: row.try_get("proposal")?,
        delivery_timeline: row.try_get("delivery_timeline")?,
        attachments,
        status,
        submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
        evaluated_at: parse_optional_timestamp("evaluated_at", row.try_get("evaluated_at")?)?,
        evaluated_by: row.try_get::<Option<i64>, _>("evaluated_by")?.map(UserId),
        rejection_reason: row.try_get("rejection_reason")?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub async fn fetch_bid_tx(
    conn: &mut SqliteConnection,
    id: BidId,
) -> Result<Option<Bid>, RepositoryError> {
    let query = format!("SELECT {BID_COLUMNS} FROM bid WHERE id = ?");
    let row = sqlx::query(&query).bind(id.0).fetch_optional(conn).await?;
    row.as_ref().map(row_to_bid).transpose()
}

/// Transactional tender gate for submissions and amendments. The service
/// runs the same checks on a pool read to fail fast; this one shares the
/// transaction's view, so a concurrent close or award cannot slip a bid
/// write past it.
async fn require_open_for_bids_tx(
    conn: &mut SqliteConnection,
    tender_id: TenderId,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let tender = fetch_tender_tx(conn, tender_id)
        .await?
        .ok_or(DomainError::TenderNotFound(tender_id))?;
    if tender.status != TenderStatus::Open {
        return Err(DomainError::TenderNotOpen { tender: tender.id, status: tender.status }.into());
    }
    if tender.deadline <= now {
        return Err(DomainError::DeadlinePassed { tender: Some(tender.id) }.into());
    }
    Ok(())
}

async fn fetch_by_tender_and_vendor_tx(
    conn: &mut SqliteConnection,
    tender_id: TenderId,
    vendor_id: UserId,
) -> Result<Option<Bid>, RepositoryError> {
    let query = format!("SELECT {BID_COLUMNS} FROM bid WHERE tender_id = ? AND vendor_id = ?");
    let row = sqlx::query(&query)
        .bind(tender_id.0)
        .bind(vendor_id.0)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(row_to_bid).transpose()
}

/// Pending bids on a tender, ordered by id for deterministic award sweeps.
pub async fn list_pending_tx(
    conn: &mut SqliteConnection,
    tender_id: TenderId,
) -> Result<Vec<Bid>, RepositoryError> {
    let query =
        format!("SELECT {BID_COLUMNS} FROM bid WHERE tender_id = ? AND status = 'pending' ORDER BY id");
    let rows = sqlx::query(&query).bind(tender_id.0).fetch_all(conn).await?;
    rows.iter().map(row_to_bid).collect()
}

/// Writes an already-validated bid status. Evaluation columns are stamped
/// for accept and reject; withdrawal leaves them untouched.
pub async fn mark_status_tx(
    conn: &mut SqliteConnection,
    id: BidId,
    next: BidStatus,
    evaluated_by: Option<UserId>,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let now_str = now.to_rfc3339();
    let result = match next {
        BidStatus::Accepted | BidStatus::Rejected => {
            sqlx::query(
                "UPDATE bid SET status = ?, evaluated_at = ?, evaluated_by = ?,
                        rejection_reason = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(next.as_str())
            .bind(&now_str)
            .bind(evaluated_by.map(|u| u.0))
            .bind(reason)
            .bind(&now_str)
            .bind(id.0)
            .execute(conn)
            .await?
        }
        _ => {
            sqlx::query("UPDATE bid SET status = ?, updated_at = ? WHERE id = ?")
                .bind(next.as_str())
                .bind(&now_str)
                .bind(id.0)
                .execute(conn)
                .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(DomainError::BidNotFound(id).into());
    }
    Ok(())
}

fn action_for(event: BidEvent) -> AuditAction {
    match event {
        BidEvent::Accept => AuditAction::Accepted,
        BidEvent::Reject => AuditAction::Rejected,
        BidEvent::Withdraw => AuditAction::Withdrawn,
    }
}

#[async_trait]
impl BidRepository for SqlBidRepository {
    /// Inserts the bid and its submission history row in one transaction;
    /// a second bid from the same vendor on the same tender is refused.
    async fn create(&self, bid: NewBid) -> Result<Bid, RepositoryError> {
        bid.validate()?;

        self.manager
            .with_transaction::<Bid, RepositoryError, _>(move |conn| {
                Box::pin(async move {
                    let now = Utc::now();
                    require_open_for_bids_tx(conn, bid.tender_id, now).await?;

                    if let Some(existing) =
                        fetch_by_tender_and_vendor_tx(conn, bid.tender_id, bid.vendor_id).await?
                    {
                        return Err(DomainError::DuplicateBid {
                            tender: existing.tender_id,
                            vendor: existing.vendor_id,
                        }
                        .into());
                    }

                    let attachments =
                        serde_json::to_string(&bid.attachments).map_err(RepositoryError::decode)?;
                    let now_str = now.to_rfc3339();

                    let result = sqlx::query(
                        "INSERT INTO bid (tender_id, vendor_id, amount, proposal,
                                          delivery_timeline, attachments_json, status,
                                          submitted_at, updated_at)
                         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
                    )
                    .bind(bid.tender_id.0)
                    .bind(bid.vendor_id.0)
                    .bind(bid.amount.to_string())
                    .bind(&bid.proposal)
                    .bind(&bid.delivery_timeline)
                    .bind(&attachments)
                    .bind(&now_str)
                    .bind(&now_str)
                    .execute(&mut *conn)
                    .await?;

                    let id = BidId(result.last_insert_rowid());
                    let stored =
                        fetch_bid_tx(conn, id).await?.ok_or(DomainError::BidNotFound(id))?;

                    append_tx(conn, &BidAuditRecord::submission(&stored)).await?;
                    Ok(stored)
                })
            })
            .await
    }

    async fn find_by_id(&self, id: BidId) -> Result<Option<Bid>, RepositoryError> {
        let pool = self.manager.pool()?;
        let query = format!("SELECT {BID_COLUMNS} FROM bid WHERE id = ?");
        let row = sqlx::query(&query).bind(id.0).fetch_optional(&pool).await?;
        row.as_ref().map(row_to_bid).transpose()
    }

    async fn find_by_tender_and_vendor(
        &self,
        tender_id: TenderId,
        vendor_id: UserId,
    ) -> Result<Option<Bid>, RepositoryError> {
        let pool = self.manager.pool()?;
        let query = format!("SELECT {BID_COLUMNS} FROM bid WHERE tender_id = ? AND vendor_id = ?");
        let row = sqlx::query(&query)
            .bind(tender_id.0)
            .bind(vendor_id.0)
            .fetch_optional(&pool)
            .await?;
        row.as_ref().map(row_to_bid).transpose()
    }

    async fn find_all(&self, filter: &BidFilter) -> Result<Vec<Bid>, RepositoryError> {
        let pool = self.manager.pool()?;

        let mut builder = QueryBuilder::new(format!("SELECT {BID_COLUMNS} FROM bid WHERE 1=1"));
        if let Some(tender_id) = filter.tender_id {
            builder.push(" AND tender_id = ").push_bind(tender_id.0);
        }
        if let Some(vendor_id) = filter.vendor_id {
            builder.push(" AND vendor_id = ").push_bind(vendor_id.0);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY submitted_at ASC, id ASC");

        let rows = builder.build().fetch_all(&pool).await?;
        rows.iter().map(row_to_bid).collect()
    }

    /// Vendor amendment; only a pending bid can be reshaped. The amendment
    /// is journalled with before and after snapshots.
    async fn update(&self, id: BidId, patch: BidPatch) -> Result<Bid, RepositoryError> {
        patch.validate()?;

        self.manager
            .with_transaction::<Bid, RepositoryError, _>(move |conn| {
                Box::pin(async move {
                    let before =
                        fetch_bid_tx(conn, id).await?.ok_or(DomainError::BidNotFound(id))?;
                    if before.status.is_terminal() {
                        return Err(DomainError::AlreadyProcessed {
                            bid: id,
                            status: before.status,
                        }
                        .into());
                    }
                    require_open_for_bids_tx(conn, before.tender_id, Utc::now()).await?;
                    if patch.is_empty() {
                        return Ok(before);
                    }

                    let amount = patch.amount.unwrap_or(before.amount);
                    let proposal = patch.proposal.clone().unwrap_or_else(|| before.proposal.clone());
                    let delivery_timeline =
                        patch.delivery_timeline.clone().or_else(|| before.delivery_timeline.clone());
                    let attachments = patch.attachments.as_ref().unwrap_or(&before.attachments);
                    let attachments_json =
                        serde_json::to_string(attachments).map_err(RepositoryError::decode)?;

                    sqlx::query(
                        "UPDATE bid SET amount = ?, proposal = ?, delivery_timeline = ?,
                                attachments_json = ?, updated_at = ?
                         WHERE id = ?",
                    )
                    .bind(amount.to_string())
                    .bind(&proposal)
                    .bind(&delivery_timeline)
                    .bind(&attachments_json)
                    .bind(Utc::now().to_rfc3339())
                    .bind(id.0)
                    .execute(&mut *conn)
                    .await?;

                    let after =
                        fetch_bid_tx(conn, id).await?.ok_or(DomainError::BidNotFound(id))?;
                    append_tx(
                        conn,
                        &BidAuditRecord::transition(
                            &before,
                            &after,
                            AuditAction::Amended,
                            before.vendor_id,
                            None,
                        ),
                    )
                    .await?;
                    Ok(after)
                })
            })
            .await
    }

    /// Single-bid transition with its history row in one transaction. A
    /// repeated or conflicting evaluation surfaces as `already_processed`
    /// and leaves the row untouched.
    async fn set_status(
        &self,
        id: BidId,
        event: BidEvent,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<Bid, RepositoryError> {
        let actor = *actor;
        self.manager
            .with_transaction::<Bid, RepositoryError, _>(move |conn| {
                Box::pin(async move {
                    let before =
                        fetch_bid_tx(conn, id).await?.ok_or(DomainError::BidNotFound(id))?;
                    let next = bid_transition(before.status, event).map_err(DomainError::from)?;

                    // A withdrawal cannot cross an evaluation already in
                    // flight; rejecting or accepting after close is what
                    // evaluation is.
                    if event == BidEvent::Withdraw {
                        let tender = fetch_tender_tx(conn, before.tender_id)
                            .await?
                            .ok_or(DomainError::TenderNotFound(before.tender_id))?;
                        if matches!(tender.status, TenderStatus::Closed | TenderStatus::Awarded) {
                            return Err(DomainError::TenderNotOpen {
                                tender: tender.id,
                                status: tender.status,
                            }
                            .into());
                        }
                    }

                    let evaluated_by = match event {
                        BidEvent::Accept | BidEvent::Reject => Some(actor.id),
                        BidEvent::Withdraw => None,
                    };
                    let rejection_reason = match event {
                        BidEvent::Reject => reason.clone(),
                        _ => None,
                    };

                    mark_status_tx(
                        conn,
                        id,
                        next,
                        evaluated_by,
                        rejection_reason.as_deref(),
                        Utc::now(),
                    )
                    .await?;

                    let after =
                        fetch_bid_tx(conn, id).await?.ok_or(DomainError::BidNotFound(id))?;
                    append_tx(
                        conn,
                        &BidAuditRecord::transition(
                            &before,
                            &after,
                            action_for(event),
                            actor.id,
                            reason,
                        ),
                    )
                    .await?;
                    Ok(after)
                })
            })
            .await
    }
}
