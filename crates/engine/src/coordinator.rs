use chrono::Utc;
use tracing::info;

use tenderd_core::audit::{AuditAction, BidAuditRecord};
use tenderd_core::domain::actor::Actor;
use tenderd_core::domain::bid::{Bid, BidId, BidStatus};
use tenderd_core::errors::DomainError;
use tenderd_core::lifecycle::{bid_transition, tender_transition, BidEvent, TenderEvent};
use tenderd_db::connection::ConnectionManager;
use tenderd_db::repositories::bid::{fetch_bid_tx, list_pending_tx, mark_status_tx};
use tenderd_db::repositories::history::append_tx;
use tenderd_db::repositories::tender::{apply_status_tx, fetch_tender_tx};
use tenderd_db::repositories::RepositoryError;

use crate::errors::EngineError;

const SIBLING_REJECTION_NOTE: &str = "tender awarded to another bidder";

/// Drives the multi-row award: accept one bid, reject its pending
/// siblings, move the tender to `awarded` and journal every touched row,
/// all inside a single transaction on the shared session.
pub struct AwardCoordinator {
    manager: ConnectionManager,
}

/// Statement-level failures abort the award and surface as
/// `transaction_failed`. The coordinator never retries; the caller decides
/// whether to run the award again.
fn in_tx(error: RepositoryError) -> EngineError {
    match error {
        RepositoryError::Domain(inner) => EngineError::Domain(inner),
        RepositoryError::Connection(inner) => EngineError::from(inner),
        other => EngineError::TransactionFailed(other.to_string()),
    }
}

impl AwardCoordinator {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Awards the tender to `bid_id` on behalf of `actor`.
    ///
    /// Preconditions are checked once on the live pool to fail fast, then
    /// re-checked inside the transaction; the serialized transaction slot
    /// means the second check is authoritative. Returns the accepted bid
    /// re-read after commit.
    pub async fn award(&self, bid_id: BidId, actor: &Actor) -> Result<Bid, EngineError> {
        self.precheck(bid_id, actor).await?;

        let actor = *actor;
        let awarded = self
            .manager
            .with_transaction::<Bid, EngineError, _>(move |conn| {
                Box::pin(async move {
                    let now = Utc::now();

                    let before = fetch_bid_tx(conn, bid_id)
                        .await
                        .map_err(in_tx)?
                        .ok_or(DomainError::BidNotFound(bid_id))?;
                    bid_transition(before.status, BidEvent::Accept)
                        .map_err(DomainError::from)?;

                    let tender = fetch_tender_tx(conn, before.tender_id)
                        .await
                        .map_err(in_tx)?
                        .ok_or(DomainError::TenderNotFound(before.tender_id))?;
                    if !actor.can_manage(&tender) {
                        return Err(
                            DomainError::forbidden(actor.id, "award this tender").into()
                        );
                    }
                    let awarded_status = tender_transition(tender.status, TenderEvent::Award)
                        .map_err(DomainError::from)?;

                    mark_status_tx(conn, bid_id, BidStatus::Accepted, Some(actor.id), None, now)
                        .await
                        .map_err(in_tx)?;
                    let accepted = fetch_bid_tx(conn, bid_id)
                        .await
                        .map_err(in_tx)?
                        .ok_or(DomainError::BidNotFound(bid_id))?;
                    append_tx(
                        conn,
                        &BidAuditRecord::transition(
                            &before,
                            &accepted,
                            AuditAction::Accepted,
                            actor.id,
                            None,
                        ),
                    )
                    .await
                    .map_err(in_tx)?;

                    // Withdrawn bids are left untouched; only the still
                    // pending siblings are swept into rejection.
                    for sibling in
                        list_pending_tx(conn, before.tender_id).await.map_err(in_tx)?
                    {
                        mark_status_tx(
                            conn,
                            sibling.id,
                            BidStatus::Rejected,
                            Some(actor.id),
                            Some(SIBLING_REJECTION_NOTE),
                            now,
                        )
                        .await
                        .map_err(in_tx)?;
                        let rejected = fetch_bid_tx(conn, sibling.id)
                            .await
                            .map_err(in_tx)?
                            .ok_or(DomainError::BidNotFound(sibling.id))?;
                        append_tx(
                            conn,
                            &BidAuditRecord::transition(
                                &sibling,
                                &rejected,
                                AuditAction::Rejected,
                                actor.id,
                                Some(SIBLING_REJECTION_NOTE.to_string()),
                            ),
                        )
                        .await
                        .map_err(in_tx)?;
                    }

                    apply_status_tx(conn, tender.id, awarded_status, now)
                        .await
                        .map_err(in_tx)?;
                    Ok(accepted)
                })
            })
            .await?;

        info!(
            event_name = "engine.award.committed",
            bid_id = %awarded.id,
            tender_id = %awarded.tender_id,
            actor = %actor.id,
            "tender awarded"
        );

        // Fresh read outside the transaction so callers see committed state.
        let pool = self.manager.pool().map_err(EngineError::from)?;
        let mut conn = pool.acquire().await.map_err(|e| EngineError::Storage(e.to_string()))?;
        fetch_bid_tx(&mut conn, bid_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| DomainError::BidNotFound(bid_id).into())
    }

    async fn precheck(&self, bid_id: BidId, actor: &Actor) -> Result<(), EngineError> {
        let pool = self.manager.pool().map_err(EngineError::from)?;
        let mut conn = pool.acquire().await.map_err(|e| EngineError::Storage(e.to_string()))?;

        let bid = fetch_bid_tx(&mut conn, bid_id)
            .await
            .map_err(EngineError::from)?
            .ok_or(DomainError::BidNotFound(bid_id))?;
        bid_transition(bid.status, BidEvent::Accept).map_err(DomainError::from)?;

        let tender = fetch_tender_tx(&mut conn, bid.tender_id)
            .await
            .map_err(EngineError::from)?
            .ok_or(DomainError::TenderNotFound(bid.tender_id))?;
        if !actor.can_manage(&tender) {
            return Err(DomainError::forbidden(actor.id, "award this tender").into());
        }
        tender_transition(tender.status, TenderEvent::Award).map_err(DomainError::from)?;
        Ok(())
    }
}
