pub mod api;
pub mod places;
pub mod storage;
