//! Database layer for cartsync

mod connection;
mod device_repository;
mod location_repository;
mod log_repository;
mod migrations;
mod save_repository;
mod user_repository;
mod version_repository;

pub use connection::Database;
pub use device_repository::LibSqlDeviceRepository;
pub use location_repository::LibSqlLocationRepository;
pub use log_repository::LibSqlLogRepository;
pub use save_repository::LibSqlSaveRepository;
pub use user_repository::LibSqlUserRepository;
pub use version_repository::LibSqlVersionRepository;
