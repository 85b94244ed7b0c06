//! The legal-transition graphs for tenders and bids, in one place.
//!
//! Every entry point that mutates a status goes through `tender_transition`
//! or `bid_transition`; nothing else in the workspace compares statuses to
//! decide legality.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::bid::BidStatus;
use crate::domain::tender::TenderStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderEvent {
    Publish,
    Close,
    Award,
    Cancel,
    Archive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidEvent {
    Accept,
    Reject,
    Withdraw,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid tender transition from {from:?} on {event:?}")]
    Tender { from: TenderStatus, event: TenderEvent },
    #[error("bid is terminal in {from:?}; {event:?} is not allowed")]
    BidTerminal { from: BidStatus, event: BidEvent },
}

/// Maps `(current status, event)` to the next tender status.
///
/// Award is legal from `open` as well as from `closed` (the lenient policy)
/// and always lands on the explicit `awarded` terminal status. Cancel and
/// archive are reachable from any non-identical state; archiving preserves
/// bids and is purely a soft-hide.
pub fn tender_transition(
    current: TenderStatus,
    event: TenderEvent,
) -> Result<TenderStatus, TransitionError> {
    use TenderEvent::{Archive, Award, Cancel, Close, Publish};
    use TenderStatus::{Archived, Awarded, Cancelled, Closed, Draft, Open};

    let next = match (current, event) {
        (Draft, Publish) => Open,
        (Open, Close) => Closed,
        (Open, Award) | (Closed, Award) => Awarded,
        (Archived, Cancel) | (Cancelled, Cancel) => {
            return Err(TransitionError::Tender { from: current, event });
        }
        (_, Cancel) => Cancelled,
        (Archived, Archive) => {
            return Err(TransitionError::Tender { from: current, event });
        }
        (_, Archive) => Archived,
        _ => return Err(TransitionError::Tender { from: current, event }),
    };
    Ok(next)
}

/// Maps `(current status, event)` to the next bid status.
///
/// `pending` is the only state with outgoing edges; one transition out of it
/// is all a bid ever gets.
pub fn bid_transition(current: BidStatus, event: BidEvent) -> Result<BidStatus, TransitionError> {
    match (current, event) {
        (BidStatus::Pending, BidEvent::Accept) => Ok(BidStatus::Accepted),
        (BidStatus::Pending, BidEvent::Reject) => Ok(BidStatus::Rejected),
        (BidStatus::Pending, BidEvent::Withdraw) => Ok(BidStatus::Withdrawn),
        (from, event) => Err(TransitionError::BidTerminal { from, event }),
    }
}
