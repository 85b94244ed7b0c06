pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{ConnectionError, ConnectionManager, ConnectionSettings, DbPool, ManagerState};
pub use fixtures::{SeedDataset, SeedSummary};
pub use repositories::{
    BidFilter, BidHistoryRepository, BidRepository, RepositoryError, SqlBidHistoryRepository,
    SqlBidRepository, SqlTenderRepository, TenderFilter, TenderRepository,
};
