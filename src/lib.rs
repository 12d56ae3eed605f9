pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod storage;
