use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use tenderd_core::audit::BidAuditRecord;
use tenderd_core::domain::actor::{Actor, UserId};
use tenderd_core::domain::bid::{Bid, BidId, BidPatch, BidStatus, NewBid};
use tenderd_core::domain::tender::{NewTender, Tender, TenderId, TenderPatch, TenderStatus};
use tenderd_core::errors::DomainError;
use tenderd_core::lifecycle::{BidEvent, TenderEvent};
use tenderd_core::notify::{Notification, NotificationKind, Notifier};
use tenderd_db::connection::ConnectionManager;
use tenderd_db::repositories::{
    BidFilter, BidHistoryRepository, BidRepository, SqlBidHistoryRepository, SqlBidRepository,
    SqlTenderRepository, TenderFilter, TenderRepository,
};

use crate::coordinator::AwardCoordinator;
use crate::errors::EngineError;

/// Buyer verdict on a pending bid. Accepting routes through the award
/// coordinator so the whole tender settles in one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BidDecision {
    Accept,
    Reject { reason: Option<String> },
}

/// The controller-facing surface of the lifecycle engine. One instance per
/// process; all clones of the underlying manager share the single session.
pub struct LifecycleService {
    tenders: SqlTenderRepository,
    bids: SqlBidRepository,
    history: SqlBidHistoryRepository,
    coordinator: AwardCoordinator,
    notifier: Arc<dyn Notifier>,
}

impl LifecycleService {
    pub fn new(manager: ConnectionManager, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            tenders: SqlTenderRepository::new(manager.clone()),
            bids: SqlBidRepository::new(manager.clone()),
            history: SqlBidHistoryRepository::new(manager.clone()),
            coordinator: AwardCoordinator::new(manager),
            notifier,
        }
    }

    // ----- tender entry points -----

    pub async fn create_tender(&self, tender: NewTender) -> Result<Tender, EngineError> {
        let created = self.tenders.create(tender).await?;
        info!(
            event_name = "engine.tender.created",
            tender_id = %created.id,
            status = created.status.as_str(),
            actor = %created.created_by,
            "tender created"
        );
        Ok(created)
    }

    pub async fn update_tender(
        &self,
        id: TenderId,
        patch: TenderPatch,
        actor: &Actor,
    ) -> Result<Tender, EngineError> {
        Ok(self.tenders.update(id, patch, actor).await?)
    }

    pub async fn publish_tender(&self, id: TenderId, actor: &Actor) -> Result<Tender, EngineError> {
        let tender = self.transition_tender(id, TenderEvent::Publish, actor).await?;
        self.dispatch(
            tender.created_by,
            NotificationKind::TenderPublished,
            serde_json::json!({ "tender_id": tender.id.0, "deadline": tender.deadline }),
        );
        Ok(tender)
    }

    /// Closing stops further submissions; pending bidders are told the
    /// evaluation phase has started.
    pub async fn close_tender(&self, id: TenderId, actor: &Actor) -> Result<Tender, EngineError> {
        let tender = self.transition_tender(id, TenderEvent::Close, actor).await?;
        self.notify_pending_bidders(id, NotificationKind::TenderClosed).await?;
        Ok(tender)
    }

    pub async fn cancel_tender(&self, id: TenderId, actor: &Actor) -> Result<Tender, EngineError> {
        let tender = self.transition_tender(id, TenderEvent::Cancel, actor).await?;
        self.notify_pending_bidders(id, NotificationKind::TenderCancelled).await?;
        Ok(tender)
    }

    pub async fn archive_tender(&self, id: TenderId, actor: &Actor) -> Result<Tender, EngineError> {
        self.transition_tender(id, TenderEvent::Archive, actor).await
    }

    // ----- bid entry points -----

    /// Submits a bid; the owning tender must be open with its deadline
    /// still ahead. The duplicate-per-vendor rule is enforced inside the
    /// repository transaction, so two concurrent submissions race safely.
    pub async fn submit_bid(&self, bid: NewBid) -> Result<Bid, EngineError> {
        let tender = self.require_tender(bid.tender_id).await?;
        let now = Utc::now();
        if tender.status != TenderStatus::Open {
            return Err(DomainError::TenderNotOpen {
                tender: tender.id,
                status: tender.status,
            }
            .into());
        }
        if tender.deadline <= now {
            return Err(DomainError::DeadlinePassed { tender: Some(tender.id) }.into());
        }

        let created = self.bids.create(bid).await?;
        info!(
            event_name = "engine.bid.submitted",
            bid_id = %created.id,
            tender_id = %created.tender_id,
            actor = %created.vendor_id,
            "bid submitted"
        );
        self.dispatch(
            tender.created_by,
            NotificationKind::BidSubmitted,
            serde_json::json!({ "tender_id": tender.id.0, "bid_id": created.id.0 }),
        );
        Ok(created)
    }

    /// Vendor amendment; legal only while the bid is pending and the
    /// tender is still open for bids.
    pub async fn amend_bid(
        &self,
        id: BidId,
        patch: BidPatch,
        actor: &Actor,
    ) -> Result<Bid, EngineError> {
        let bid = self.require_bid(id).await?;
        if bid.vendor_id != actor.id && !actor.is_admin() {
            return Err(DomainError::forbidden(actor.id, "amend this bid").into());
        }

        let tender = self.require_tender(bid.tender_id).await?;
        let now = Utc::now();
        if tender.status != TenderStatus::Open {
            return Err(DomainError::TenderNotOpen {
                tender: tender.id,
                status: tender.status,
            }
            .into());
        }
        if tender.deadline <= now {
            return Err(DomainError::DeadlinePassed { tender: Some(tender.id) }.into());
        }

        Ok(self.bids.update(id, patch).await?)
    }

    /// Vendor-initiated exit. Refused once the tender has moved past open;
    /// at that point the bid is part of an evaluation in progress.
    pub async fn withdraw_bid(
        &self,
        id: BidId,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<Bid, EngineError> {
        let bid = self.require_bid(id).await?;
        if bid.vendor_id != actor.id && !actor.is_admin() {
            return Err(DomainError::forbidden(actor.id, "withdraw this bid").into());
        }

        let tender = self.require_tender(bid.tender_id).await?;
        if matches!(tender.status, TenderStatus::Closed | TenderStatus::Awarded) {
            return Err(DomainError::TenderNotOpen {
                tender: tender.id,
                status: tender.status,
            }
            .into());
        }

        let withdrawn = self.bids.set_status(id, BidEvent::Withdraw, actor, reason).await?;
        info!(
            event_name = "engine.bid.withdrawn",
            bid_id = %withdrawn.id,
            tender_id = %withdrawn.tender_id,
            actor = %actor.id,
            "bid withdrawn"
        );
        self.dispatch(
            tender.created_by,
            NotificationKind::BidWithdrawn,
            serde_json::json!({ "tender_id": tender.id.0, "bid_id": withdrawn.id.0 }),
        );
        Ok(withdrawn)
    }

    /// Buyer verdict. A rejection settles one bid; an acceptance settles
    /// the whole tender through the award coordinator.
    pub async fn evaluate_bid(
        &self,
        id: BidId,
        actor: &Actor,
        decision: BidDecision,
    ) -> Result<Bid, EngineError> {
        match decision {
            BidDecision::Accept => self.award_bid(id, actor).await,
            BidDecision::Reject { reason } => {
                let bid = self.require_bid(id).await?;
                let tender = self.require_tender(bid.tender_id).await?;
                if !actor.can_manage(&tender) {
                    return Err(DomainError::forbidden(actor.id, "evaluate this bid").into());
                }

                let rejected =
                    self.bids.set_status(id, BidEvent::Reject, actor, reason).await?;
                info!(
                    event_name = "engine.bid.rejected",
                    bid_id = %rejected.id,
                    tender_id = %rejected.tender_id,
                    actor = %actor.id,
                    "bid rejected"
                );
                self.dispatch(
                    rejected.vendor_id,
                    NotificationKind::BidRejected,
                    serde_json::json!({
                        "tender_id": rejected.tender_id.0,
                        "bid_id": rejected.id.0,
                        "reason": rejected.rejection_reason,
                    }),
                );
                Ok(rejected)
            }
        }
    }

    /// Accepts `id`, rejects its pending siblings and moves the tender to
    /// awarded, atomically.
    pub async fn award_bid(&self, id: BidId, actor: &Actor) -> Result<Bid, EngineError> {
        let accepted = self.coordinator.award(id, actor).await?;
        self.dispatch(
            accepted.vendor_id,
            NotificationKind::BidAccepted,
            serde_json::json!({ "tender_id": accepted.tender_id.0, "bid_id": accepted.id.0 }),
        );
        for rejected in self
            .bids
            .find_all(&BidFilter {
                tender_id: Some(accepted.tender_id),
                status: Some(BidStatus::Rejected),
                ..BidFilter::default()
            })
            .await?
        {
            self.dispatch(
                rejected.vendor_id,
                NotificationKind::BidRejected,
                serde_json::json!({
                    "tender_id": rejected.tender_id.0,
                    "bid_id": rejected.id.0,
                    "reason": rejected.rejection_reason,
                }),
            );
        }
        Ok(accepted)
    }

    // ----- read-throughs -----

    pub async fn tender(&self, id: TenderId) -> Result<Tender, EngineError> {
        self.require_tender(id).await
    }

    pub async fn find_tenders(&self, filter: &TenderFilter) -> Result<Vec<Tender>, EngineError> {
        Ok(self.tenders.find_all(filter).await?)
    }

    pub async fn record_view(&self, id: TenderId) -> Result<(), EngineError> {
        Ok(self.tenders.record_view(id).await?)
    }

    pub async fn bid(&self, id: BidId) -> Result<Bid, EngineError> {
        self.require_bid(id).await
    }

    pub async fn bids_for_tender(&self, id: TenderId) -> Result<Vec<Bid>, EngineError> {
        Ok(self
            .bids
            .find_all(&BidFilter { tender_id: Some(id), ..BidFilter::default() })
            .await?)
    }

    pub async fn history_for_bid(&self, id: BidId) -> Result<Vec<BidAuditRecord>, EngineError> {
        Ok(self.history.list_for_bid(id).await?)
    }

    // ----- internals -----

    async fn transition_tender(
        &self,
        id: TenderId,
        event: TenderEvent,
        actor: &Actor,
    ) -> Result<Tender, EngineError> {
        let tender = self.tenders.set_status(id, event, actor).await?;
        info!(
            event_name = "engine.tender.status",
            tender_id = %tender.id,
            status = tender.status.as_str(),
            actor = %actor.id,
            "tender status changed"
        );
        Ok(tender)
    }

    async fn notify_pending_bidders(
        &self,
        id: TenderId,
        kind: NotificationKind,
    ) -> Result<(), EngineError> {
        let pending = self
            .bids
            .find_all(&BidFilter {
                tender_id: Some(id),
                status: Some(BidStatus::Pending),
                ..BidFilter::default()
            })
            .await?;
        for bid in pending {
            self.dispatch(
                bid.vendor_id,
                kind,
                serde_json::json!({ "tender_id": id.0, "bid_id": bid.id.0 }),
            );
        }
        Ok(())
    }

    async fn require_tender(&self, id: TenderId) -> Result<Tender, EngineError> {
        Ok(self
            .tenders
            .find_by_id(id)
            .await?
            .ok_or(DomainError::TenderNotFound(id))?)
    }

    async fn require_bid(&self, id: BidId) -> Result<Bid, EngineError> {
        Ok(self.bids.find_by_id(id).await?.ok_or(DomainError::BidNotFound(id))?)
    }

    /// Delivery failures are logged and swallowed; notifications never
    /// abort a lifecycle operation.
    fn dispatch(&self, user_id: UserId, kind: NotificationKind, payload: serde_json::Value) {
        let notification = Notification { user_id, kind, payload };
        if let Err(error) = self.notifier.notify(notification) {
            warn!(
                event_name = "engine.notify.failed",
                user = %user_id,
                error = %error,
                "notification dropped"
            );
        }
    }
}
