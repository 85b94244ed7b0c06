use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::category::CategoryId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenderId(pub i64);

impl std::fmt::Display for TenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    Draft,
    Open,
    Closed,
    Cancelled,
    Awarded,
    Archived,
}

impl TenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::Awarded => "awarded",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "cancelled" => Some(Self::Cancelled),
            "awarded" => Some(Self::Awarded),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// `awarded` is represented explicitly; `closed` still refuses new bids
    /// but may be awarded afterwards.
    pub fn is_terminal_for_bidding(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    pub id: TenderId,
    pub title: String,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub deadline: DateTime<Utc>,
    pub status: TenderStatus,
    pub created_by: UserId,
    pub view_count: i64,
    pub requirements: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub closing_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tender {
    /// A tender accepts bid submissions only while open with a deadline
    /// strictly in the future.
    pub fn is_open_for_bids(&self, now: DateTime<Utc>) -> bool {
        self.status == TenderStatus::Open && self.deadline > now
    }
}

/// Input for `TenderRepository::create`. The repository assigns the id and
/// the audit timestamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTender {
    pub title: String,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub deadline: DateTime<Utc>,
    pub created_by: UserId,
    pub requirements: Option<String>,
    /// `true` publishes immediately instead of starting in draft.
    pub publish: bool,
}

impl NewTender {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        validate_budget(self.budget_min, self.budget_max)?;
        if self.title.trim().is_empty() {
            return Err(DomainError::InvariantViolation("tender title must not be empty".into()));
        }
        if self.publish && self.deadline <= now {
            return Err(DomainError::DeadlinePassed { tender: None });
        }
        Ok(())
    }
}

/// Partial update applied through `TenderRepository::update`. Fields left
/// as `None` are untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TenderPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub deadline: Option<DateTime<Utc>>,
    pub requirements: Option<String>,
}

impl TenderPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub fn validate_budget(min: Option<Decimal>, max: Option<Decimal>) -> Result<(), DomainError> {
    if let (Some(min), Some(max)) = (min, max) {
        if max < min {
            return Err(DomainError::InvariantViolation(format!(
                "budget_max ({max}) must not be below budget_min ({min})"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::actor::UserId;
    use crate::errors::DomainError;

    use super::{validate_budget, NewTender, Tender, TenderId, TenderPatch, TenderStatus};

    fn tender(status: TenderStatus, deadline_offset: Duration) -> Tender {
        let now = Utc::now();
        Tender {
            id: TenderId(1),
            title: "Warehouse logistics".to_string(),
            description: String::new(),
            category_id: None,
            budget_min: Some(Decimal::new(100_000, 2)),
            budget_max: Some(Decimal::new(500_000, 2)),
            deadline: now + deadline_offset,
            status,
            created_by: UserId(3),
            view_count: 0,
            requirements: None,
            published_at: None,
            closing_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn open_tender_with_future_deadline_accepts_bids() {
        let tender = tender(TenderStatus::Open, Duration::hours(1));
        assert!(tender.is_open_for_bids(Utc::now()));
    }

    #[test]
    fn expired_or_closed_tender_refuses_bids() {
        let expired = tender(TenderStatus::Open, Duration::hours(-1));
        assert!(!expired.is_open_for_bids(Utc::now()));

        let closed = tender(TenderStatus::Closed, Duration::hours(1));
        assert!(!closed.is_open_for_bids(Utc::now()));
    }

    #[test]
    fn inverted_budget_range_is_rejected() {
        let error = validate_budget(Some(Decimal::new(500, 0)), Some(Decimal::new(100, 0)))
            .expect_err("max below min");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn publishing_with_past_deadline_is_rejected() {
        let draft = NewTender {
            title: "Fleet maintenance".to_string(),
            description: String::new(),
            category_id: None,
            budget_min: None,
            budget_max: None,
            deadline: Utc::now() - Duration::hours(1),
            created_by: UserId(3),
            requirements: None,
            publish: true,
        };
        assert!(matches!(
            draft.validate(Utc::now()),
            Err(DomainError::DeadlinePassed { tender: None })
        ));
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(TenderPatch::default().is_empty());

        let patch = TenderPatch { deadline: Some(Utc::now()), ..TenderPatch::default() };
        assert!(!patch.is_empty());
    }
}
