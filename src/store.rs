use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::Stream;

use crate::{BlobPath, BlobProperties, Result, WriteOptions};

mod memory;
pub use memory::MemoryBlobStore;

/// Type alias for a stream of blob content chunks,
///
pub type BlobStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Type alias for a stream of listing pages,
///
/// Each item is a single page returned by the store, the store follows continuation
/// markers internally and the stream ends after the last page.
///
pub type PageStream<T> = BoxStream<'static, Result<Vec<T>>>;

/// Blob content fetched in one response,
///
#[derive(Debug, Clone)]
pub struct BlobContent {
    pub properties: BlobProperties,
    pub data: Bytes,
}

/// Blob content fetched as a stream,
///
pub struct BlobContentStream {
    pub properties: BlobProperties,
    pub stream: BlobStream,
}

/// Container returned by a container listing,
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub last_modified: Option<SystemTime>,
}

/// Blob returned by a blob listing,
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub name: String,
    pub properties: BlobProperties,
}

/// Trait to enable different blob store clients,
///
/// Each method maps to a single request against the store. Not-found conditions must be
/// reported as `Error::ContainerNotFound` or `Error::BlobNotFound` so that callers can tell
/// them apart from transport failures.
///
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Creates or overwrites a blob w/ `data`,
    ///
    async fn put_blob(
        &self,
        path: &BlobPath,
        data: Bytes,
        options: &WriteOptions,
    ) -> Result<BlobProperties>;

    /// Stages a block for a blob, the block is not visible until it is committed,
    ///
    async fn put_block(&self, path: &BlobPath, block_id: &str, data: Bytes) -> Result<()>;

    /// Commits staged blocks in order, creating or overwriting the blob,
    ///
    /// `content_length` is the total size of the committed blocks and is reported in the
    /// returned properties.
    ///
    async fn put_block_list(
        &self,
        path: &BlobPath,
        block_ids: &[String],
        content_length: u64,
        options: &WriteOptions,
    ) -> Result<BlobProperties>;

    /// Fetches the full content and properties of a blob,
    ///
    async fn get_blob(&self, path: &BlobPath) -> Result<BlobContent>;

    /// Fetches the properties of a blob and a stream over its content,
    ///
    async fn get_blob_stream(&self, path: &BlobPath) -> Result<BlobContentStream>;

    /// Fetches the properties of a blob,
    ///
    async fn get_properties(&self, path: &BlobPath) -> Result<BlobProperties>;

    /// Deletes a blob,
    ///
    async fn delete_blob(&self, path: &BlobPath) -> Result<()>;

    /// Creates a container,
    ///
    async fn create_container(&self, container: &str) -> Result<()>;

    /// Deletes a container and every blob in it,
    ///
    async fn delete_container(&self, container: &str) -> Result<()>;

    /// Returns a stream of container pages,
    ///
    fn list_containers(&self) -> PageStream<ContainerInfo>;

    /// Returns a stream of blob pages for a container,
    ///
    fn list_blobs(&self, container: &str) -> PageStream<BlobInfo>;
}
