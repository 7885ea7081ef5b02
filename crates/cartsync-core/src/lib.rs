//! cartsync-core - Core library for cartsync
//!
//! This crate contains the shared models, database layer, blob storage layer,
//! and the save reconciliation engine used by the cartsync backend.

pub mod db;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod services;
pub mod storage;

pub use error::{Error, Result};
pub use models::{Save, SaveId, SaveVersion, SaveVersionId};
