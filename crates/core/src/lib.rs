pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod notify;

pub use audit::{AuditAction, BidAuditRecord, BidSnapshot};
pub use domain::actor::{Actor, ActorRole, UserId};
pub use domain::bid::{Attachment, Bid, BidId, BidPatch, BidStatus, NewBid};
pub use domain::category::{Category, CategoryId, CategoryResolver, StaticCategoryResolver};
pub use domain::tender::{NewTender, Tender, TenderId, TenderPatch, TenderStatus};
pub use errors::DomainError;
pub use lifecycle::{bid_transition, tender_transition, BidEvent, TenderEvent, TransitionError};
pub use notify::{
    FailingNotifier, InMemoryNotifier, Notification, NotificationKind, Notifier, NoopNotifier,
    NotifyError,
};

pub use chrono;
