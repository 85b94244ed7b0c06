use thiserror::Error;

use crate::domain::actor::UserId;
use crate::domain::bid::{BidId, BidStatus};
use crate::domain::tender::{TenderId, TenderStatus};
use crate::lifecycle::TransitionError;

/// Business-rule violations. Every variant carries a stable machine-readable
/// code (`code()`) alongside the human message, so controllers never have to
/// translate a generic internal error into a user-facing one.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("tender {0} not found")]
    TenderNotFound(TenderId),
    #[error("bid {0} not found")]
    BidNotFound(BidId),
    #[error("actor {actor} may not {action}")]
    Forbidden { actor: UserId, action: String },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("bid {bid} was already processed (status {status:?})")]
    AlreadyProcessed { bid: BidId, status: BidStatus },
    #[error("vendor {vendor} already holds a bid on tender {tender}")]
    DuplicateBid { tender: TenderId, vendor: UserId },
    #[error("deadline has passed")]
    DeadlinePassed { tender: Option<TenderId> },
    #[error("tender {tender} is not open for bidding (status {status:?})")]
    TenderNotOpen { tender: TenderId, status: TenderStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn forbidden(actor: UserId, action: impl Into<String>) -> Self {
        Self::Forbidden { actor, action: action.into() }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::TenderNotFound(_) | Self::BidNotFound(_) => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Transition(TransitionError::Tender { .. }) => "invalid_transition",
            Self::Transition(TransitionError::BidTerminal { .. }) => "already_processed",
            Self::AlreadyProcessed { .. } => "already_processed",
            Self::DuplicateBid { .. } => "duplicate_bid",
            Self::DeadlinePassed { .. } => "deadline_passed",
            Self::TenderNotOpen { .. } => "tender_not_open",
            Self::InvariantViolation(_) => "invalid_input",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::bid::BidStatus;
    use crate::domain::tender::TenderStatus;
    use crate::lifecycle::{BidEvent, TenderEvent, TransitionError};

    use super::DomainError;

    #[test]
    fn codes_are_stable_per_variant() {
        let terminal = DomainError::from(TransitionError::BidTerminal {
            from: BidStatus::Rejected,
            event: BidEvent::Accept,
        });
        assert_eq!(terminal.code(), "already_processed");

        let illegal_edge = DomainError::from(TransitionError::Tender {
            from: TenderStatus::Awarded,
            event: TenderEvent::Publish,
        });
        assert_eq!(illegal_edge.code(), "invalid_transition");

        assert_eq!(DomainError::DeadlinePassed { tender: None }.code(), "deadline_passed");
    }

    #[test]
    fn messages_name_the_offending_ids() {
        let error = DomainError::DuplicateBid {
            tender: crate::domain::tender::TenderId(12),
            vendor: crate::domain::actor::UserId(7),
        };
        let message = error.to_string();
        assert!(message.contains("12"));
        assert!(message.contains('7'));
    }
}
