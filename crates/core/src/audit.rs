use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::actor::UserId;
use crate::domain::bid::{Bid, BidId, BidStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Submitted,
    Amended,
    Accepted,
    Rejected,
    Withdrawn,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Amended => "amended",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "submitted" => Some(Self::Submitted),
            "amended" => Some(Self::Amended),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }
}

/// The slice of a bid captured in history rows. Attachments and timestamps
/// are deliberately left out; the row itself is dated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidSnapshot {
    pub status: BidStatus,
    pub amount: rust_decimal::Decimal,
    pub proposal: String,
    pub delivery_timeline: Option<String>,
    pub rejection_reason: Option<String>,
}

impl From<&Bid> for BidSnapshot {
    fn from(bid: &Bid) -> Self {
        Self {
            status: bid.status,
            amount: bid.amount,
            proposal: bid.proposal.clone(),
            delivery_timeline: bid.delivery_timeline.clone(),
            rejection_reason: bid.rejection_reason.clone(),
        }
    }
}

/// One append-only history row. Never updated or deleted once written; a
/// multi-bid transition (an award) produces one record per affected bid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidAuditRecord {
    pub id: String,
    pub bid_id: BidId,
    pub action: AuditAction,
    pub old_values: Option<BidSnapshot>,
    pub new_values: Option<BidSnapshot>,
    pub performed_by: UserId,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BidAuditRecord {
    /// Record for a status transition, snapshotting both sides.
    pub fn transition(
        before: &Bid,
        after: &Bid,
        action: AuditAction,
        performed_by: UserId,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bid_id: after.id,
            action,
            old_values: Some(BidSnapshot::from(before)),
            new_values: Some(BidSnapshot::from(after)),
            performed_by,
            note,
            created_at: Utc::now(),
        }
    }

    /// Record for a bid's creation; there is no prior state to snapshot.
    pub fn submission(bid: &Bid) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bid_id: bid.id,
            action: AuditAction::Submitted,
            old_values: None,
            new_values: Some(BidSnapshot::from(bid)),
            performed_by: bid.vendor_id,
            note: None,
            created_at: Utc::now(),
        }
    }
}
