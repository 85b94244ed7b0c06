use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::tender::TenderId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BidId(pub i64);

impl std::fmt::Display for BidId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }

    /// `accepted`, `rejected` and `withdrawn` admit no further vendor edits.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// File metadata attached to a bid. Storage lives behind an external
/// collaborator; the lifecycle engine treats this as inert data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub size: i64,
    pub mime_type: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub tender_id: TenderId,
    pub vendor_id: UserId,
    pub amount: Decimal,
    pub proposal: String,
    pub delivery_timeline: Option<String>,
    pub attachments: Vec<Attachment>,
    pub status: BidStatus,
    pub submitted_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub evaluated_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Input for `BidRepository::create`; the repository assigns the id and
/// sets the bid pending.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewBid {
    pub tender_id: TenderId,
    pub vendor_id: UserId,
    pub amount: Decimal,
    pub proposal: String,
    pub delivery_timeline: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl NewBid {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "bid amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Vendor amendment while a bid is still pending.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BidPatch {
    pub amount: Option<Decimal>,
    pub proposal: Option<String>,
    pub delivery_timeline: Option<String>,
    pub attachments: Option<Vec<Attachment>>,
}

impl BidPatch {
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(amount) = self.amount {
            if amount <= Decimal::ZERO {
                return Err(DomainError::InvariantViolation(format!(
                    "bid amount must be positive, got {amount}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
