//! Lifecycle engine for tenders and their bids.
//!
//! The service surface (`LifecycleService`) is what a controller layer
//! calls: submit, amend, withdraw and evaluate bids; publish, close,
//! cancel, archive and award tenders. Multi-row settlement lives in the
//! `AwardCoordinator`, which runs on the single shared database session
//! owned by `tenderd_db::ConnectionManager`.

pub mod coordinator;
pub mod errors;
pub mod service;
pub mod telemetry;

pub use coordinator::AwardCoordinator;
pub use errors::EngineError;
pub use service::{BidDecision, LifecycleService};
