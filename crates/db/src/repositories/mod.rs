use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use tenderd_core::audit::BidAuditRecord;
use tenderd_core::domain::actor::{Actor, UserId};
use tenderd_core::domain::bid::{Bid, BidId, BidPatch, BidStatus, NewBid};
use tenderd_core::domain::category::CategoryId;
use tenderd_core::domain::tender::{NewTender, Tender, TenderId, TenderPatch, TenderStatus};
use tenderd_core::errors::DomainError;
use tenderd_core::lifecycle::{BidEvent, TenderEvent};

use crate::connection::ConnectionError;

pub mod bid;
pub mod history;
pub mod tender;

pub use bid::SqlBidRepository;
pub use history::SqlBidHistoryRepository;
pub use tender::SqlTenderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepositoryError {
    pub(crate) fn decode(error: impl std::fmt::Display) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Filter for `TenderRepository::find_all`. All criteria are conjunctive.
#[derive(Clone, Debug, Default)]
pub struct TenderFilter {
    pub status: Option<TenderStatus>,
    pub category_id: Option<CategoryId>,
    pub created_by: Option<UserId>,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    /// Case-insensitive substring over title and description.
    pub search: Option<String>,
    /// open AND deadline strictly in the future.
    pub active_only: bool,
}

#[derive(Clone, Debug, Default)]
pub struct BidFilter {
    pub tender_id: Option<TenderId>,
    pub vendor_id: Option<UserId>,
    pub status: Option<BidStatus>,
}

#[async_trait]
pub trait TenderRepository: Send + Sync {
    async fn create(&self, tender: NewTender) -> Result<Tender, RepositoryError>;
    async fn find_by_id(&self, id: TenderId) -> Result<Option<Tender>, RepositoryError>;
    async fn find_all(&self, filter: &TenderFilter) -> Result<Vec<Tender>, RepositoryError>;
    async fn update(
        &self,
        id: TenderId,
        patch: TenderPatch,
        actor: &Actor,
    ) -> Result<Tender, RepositoryError>;
    async fn set_status(
        &self,
        id: TenderId,
        event: TenderEvent,
        actor: &Actor,
    ) -> Result<Tender, RepositoryError>;
    async fn record_view(&self, id: TenderId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BidRepository: Send + Sync {
    async fn create(&self, bid: NewBid) -> Result<Bid, RepositoryError>;
    async fn find_by_id(&self, id: BidId) -> Result<Option<Bid>, RepositoryError>;
    async fn find_by_tender_and_vendor(
        &self,
        tender_id: TenderId,
        vendor_id: UserId,
    ) -> Result<Option<Bid>, RepositoryError>;
    async fn find_all(&self, filter: &BidFilter) -> Result<Vec<Bid>, RepositoryError>;
    async fn update(&self, id: BidId, patch: BidPatch) -> Result<Bid, RepositoryError>;
    async fn set_status(
        &self,
        id: BidId,
        event: BidEvent,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<Bid, RepositoryError>;
}

#[async_trait]
pub trait BidHistoryRepository: Send + Sync {
    async fn append(&self, record: BidAuditRecord) -> Result<(), RepositoryError>;
    async fn list_for_bid(&self, bid_id: BidId) -> Result<Vec<BidAuditRecord>, RepositoryError>;
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&chrono::Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        })
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    use std::str::FromStr;
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|raw| parse_decimal(column, &raw)).transpose()
}
