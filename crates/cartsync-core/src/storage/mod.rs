//! Blob storage layer
//!
//! Save bytes live in an opaque content-addressed object store keyed by an
//! immutable, globally-unique storage key per version. The store is behind a
//! trait so the service can run against S3-compatible object storage in
//! production and an in-memory map in tests.

mod memory;
mod s3;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryBlobStore;
pub use s3::{S3BlobStore, S3Config};

/// Object storage operations the sync engine needs.
///
/// Keys are opaque strings; the engine never lists or globs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write object bytes, overwriting any existing object at `key`
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read object bytes
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete the object at `key`
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether an object exists at `key`
    async fn head_exists(&self, key: &str) -> Result<bool>;
}
