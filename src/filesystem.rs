use std::collections::BTreeMap;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::{BlobProperties, FileMetadata, ListEntry, Result, Visibility, WriteOptions};

/// Type alias for a source stream passed to streaming writes,
///
pub type WriteSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Trait for the abstract filesystem contract,
///
/// Paths are `<container>/<blob-name>`, directories are containers. Consumers should expect
/// the same behavior from every backend implementing this trait.
///
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Writes a new file, overwriting an existing one,
    ///
    async fn write(&self, path: &str, contents: Bytes, options: &WriteOptions)
        -> Result<FileMetadata>;

    /// Writes a new file from a stream,
    ///
    async fn write_stream(
        &self,
        path: &str,
        source: WriteSource<'_>,
        options: &WriteOptions,
    ) -> Result<FileMetadata>;

    /// Updates an existing file,
    ///
    async fn update(&self, path: &str, contents: Bytes, options: &WriteOptions)
        -> Result<FileMetadata>;

    /// Updates an existing file from a stream,
    ///
    async fn update_stream(
        &self,
        path: &str,
        source: WriteSource<'_>,
        options: &WriteOptions,
    ) -> Result<FileMetadata>;

    /// Moves a file to `new_path`,
    ///
    async fn rename(&self, path: &str, new_path: &str) -> Result<()>;

    /// Copies a file to `new_path`,
    ///
    async fn copy(&self, path: &str, new_path: &str) -> Result<()>;

    /// Deletes a file, deleting a file that does not exist is not an error,
    ///
    async fn delete(&self, path: &str) -> Result<()>;

    /// Deletes a directory and everything in it,
    ///
    async fn delete_dir(&self, dir_name: &str) -> Result<()>;

    /// Creates a directory,
    ///
    async fn create_dir(&self, dir_name: &str, options: &WriteOptions) -> Result<FileMetadata>;

    /// Sets the visibility of a file,
    ///
    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<FileMetadata>;

    /// Returns the file's properties if it exists, `None` if it does not,
    ///
    /// Failures other than not-found are returned as errors.
    ///
    async fn has(&self, path: &str) -> Result<Option<BlobProperties>>;

    /// Reads a file into memory,
    ///
    async fn read(&self, path: &str) -> Result<FileMetadata>;

    /// Reads a file as a stream,
    ///
    async fn read_stream(&self, path: &str) -> Result<FileMetadata>;

    /// Lists the contents of a directory, an empty directory lists every directory,
    ///
    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<ListEntry>>;

    /// Returns all metadata of a file as a string mapping,
    ///
    async fn get_metadata(&self, path: &str) -> Result<BTreeMap<String, String>>;

    async fn get_size(&self, path: &str) -> Result<u64>;

    async fn get_mimetype(&self, path: &str) -> Result<String>;

    /// Returns the last modified time of a file,
    ///
    async fn get_timestamp(&self, path: &str) -> Result<SystemTime>;

    async fn get_visibility(&self, path: &str) -> Result<Visibility>;
}
