pub mod actor;
pub mod bid;
pub mod category;
pub mod tender;
