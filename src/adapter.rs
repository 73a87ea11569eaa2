use std::collections::BTreeMap;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::{event, Level};

use crate::filesystem::WriteSource;
use crate::path::container_name;
use crate::store::BlobContentStream;
use crate::{
    BlobPath, BlobProperties, BlobStore, Contents, Error, FileKind, FileMetadata, Filesystem,
    ListEntry, Result, Visibility, WriteOptions,
};

/// Default size of blocks staged by streaming writes, 4 MiB,
///
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Options for the adapter,
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterOptions {
    /// Size of blocks staged by streaming writes,
    ///
    /// Streams shorter than one block are uploaded w/ a single put.
    ///
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl AdapterOptions {
    /// Returns options w/ a block size, a block size of 0 is treated as 1,
    ///
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }
}

/// Adapter translating filesystem operations into blob store calls,
///
/// The first segment of a path names the container, the rest names the blob. Directories
/// are containers.
///
/// # Consistency
///
/// `rename` and `copy` are read-then-write (then delete, for rename) and are not atomic.
/// If rename cannot delete the source after writing the destination, the destination is
/// deleted again before the error is returned. If that delete fails too, both blobs remain.
///
/// Concurrent callers working on overlapping paths can race, no coordination is provided.
///
pub struct BlobPathAdapter<S> {
    store: S,
    options: AdapterOptions,
}

impl<S: BlobStore> BlobPathAdapter<S> {
    /// Returns a new adapter over `store`,
    ///
    pub fn new(store: S) -> Self {
        Self::with_options(store, AdapterOptions::default())
    }

    /// Returns a new adapter over `store` w/ options,
    ///
    /// A block size of 0 is treated as 1.
    ///
    pub fn with_options(store: S, options: AdapterOptions) -> Self {
        let block_size = options.block_size;
        let options = options.with_block_size(block_size);
        Self { store, options }
    }

    /// Returns a reference to the underlying store,
    ///
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the adapter options,
    ///
    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Reads `from` and writes its content and properties to `to`,
    ///
    async fn transfer(&self, from: &BlobPath, to: &BlobPath) -> Result<BlobProperties> {
        let source = self.store.get_blob(from).await?;

        let options = WriteOptions {
            content_type: source.properties.content_type,
            metadata: source.properties.metadata,
        };

        self.store.put_blob(to, source.data, &options).await
    }

    /// Uploads `source` as staged blocks and commits them,
    ///
    async fn upload_blocks(
        &self,
        path: &BlobPath,
        first: Bytes,
        source: WriteSource<'_>,
        options: &WriteOptions,
    ) -> Result<(BlobProperties, u64)> {
        let mut block_ids = vec![];
        let mut written = 0;
        let mut block = first;

        while !block.is_empty() {
            let block_id = format!("block-{:08}", block_ids.len());
            written += block.len() as u64;
            self.store.put_block(path, &block_id, block).await?;
            block_ids.push(block_id);

            block = read_block(source, self.options.block_size).await?;
        }

        event!(
            Level::TRACE,
            "Committing {} blocks for {path}",
            block_ids.len()
        );
        let properties = self
            .store
            .put_block_list(path, &block_ids, written, options)
            .await?;
        Ok((properties, written))
    }
}

/// Reads up to `block_size` bytes from `source`, returns fewer only at the end of the stream,
///
async fn read_block(source: WriteSource<'_>, block_size: usize) -> Result<Bytes> {
    let mut buf = vec![0; block_size];
    let mut filled = 0;

    while filled < block_size {
        let read = source.read(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

#[async_trait]
impl<S: BlobStore> Filesystem for BlobPathAdapter<S> {
    async fn write(
        &self,
        path: &str,
        contents: Bytes,
        options: &WriteOptions,
    ) -> Result<FileMetadata> {
        let blob_path = BlobPath::parse(path)?;
        event!(Level::DEBUG, "Writing {} bytes to {blob_path}", contents.len());

        let properties = self
            .store
            .put_blob(&blob_path, contents.clone(), options)
            .await?;

        Ok(FileMetadata::file(
            blob_path.to_string(),
            Contents::Buffered(contents),
            properties.last_modified,
        ))
    }

    async fn write_stream(
        &self,
        path: &str,
        source: WriteSource<'_>,
        options: &WriteOptions,
    ) -> Result<FileMetadata> {
        let blob_path = BlobPath::parse(path)?;
        event!(Level::DEBUG, "Streaming to {blob_path}");

        let first = read_block(source, self.options.block_size).await?;
        let (properties, bytes_written) = if first.len() < self.options.block_size {
            let written = first.len() as u64;
            let properties = self.store.put_blob(&blob_path, first, options).await?;
            (properties, written)
        } else {
            self.upload_blocks(&blob_path, first, source, options)
                .await?
        };

        Ok(FileMetadata::file(
            blob_path.to_string(),
            Contents::Streamed { bytes_written },
            properties.last_modified,
        ))
    }

    async fn update(&self, _: &str, _: Bytes, _: &WriteOptions) -> Result<FileMetadata> {
        Err(Error::Unsupported("update"))
    }

    async fn update_stream(
        &self,
        _: &str,
        _: WriteSource<'_>,
        _: &WriteOptions,
    ) -> Result<FileMetadata> {
        Err(Error::Unsupported("update_stream"))
    }

    async fn rename(&self, path: &str, new_path: &str) -> Result<()> {
        let from = BlobPath::parse(path)?;
        let to = BlobPath::parse(new_path)?;
        event!(Level::DEBUG, "Renaming {from} to {to}");

        if from == to {
            self.store.get_properties(&from).await?;
            return Ok(());
        }

        self.transfer(&from, &to).await?;

        match self.store.delete_blob(&from).await {
            Ok(()) => Ok(()),
            // Already removed by someone else, `to` is now the only copy
            Err(err) if err.is_not_found() => {
                event!(Level::WARN, "{from} was removed before rename finished");
                Ok(())
            }
            Err(err) => {
                event!(
                    Level::WARN,
                    "Could not delete {from} after writing {to}, rolling back, {err}"
                );
                if let Err(rollback) = self.store.delete_blob(&to).await {
                    event!(
                        Level::ERROR,
                        "Could not roll back {to}, both {from} and {to} exist, {rollback}"
                    );
                }
                Err(err)
            }
        }
    }

    async fn copy(&self, path: &str, new_path: &str) -> Result<()> {
        let from = BlobPath::parse(path)?;
        let to = BlobPath::parse(new_path)?;
        event!(Level::DEBUG, "Copying {from} to {to}");

        self.transfer(&from, &to).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let blob_path = BlobPath::parse(path)?;
        event!(Level::DEBUG, "Deleting {blob_path}");

        match self.store.delete_blob(&blob_path).await {
            Err(err) if err.is_not_found() => {
                event!(Level::TRACE, "{blob_path} does not exist, {err}");
                Ok(())
            }
            result => result,
        }
    }

    async fn delete_dir(&self, dir_name: &str) -> Result<()> {
        let container = container_name(dir_name)?;
        event!(Level::DEBUG, "Deleting container {container}");

        self.store.delete_container(container).await
    }

    async fn create_dir(&self, dir_name: &str, _: &WriteOptions) -> Result<FileMetadata> {
        let container = container_name(dir_name)?;
        event!(Level::DEBUG, "Creating container {container}");

        self.store.create_container(container).await?;
        Ok(FileMetadata::directory(container))
    }

    async fn set_visibility(&self, _: &str, _: Visibility) -> Result<FileMetadata> {
        Err(Error::Unsupported("set_visibility"))
    }

    async fn has(&self, path: &str) -> Result<Option<BlobProperties>> {
        let blob_path = BlobPath::parse(path)?;

        match self.store.get_properties(&blob_path).await {
            Ok(properties) => Ok(Some(properties)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn read(&self, path: &str) -> Result<FileMetadata> {
        let blob_path = BlobPath::parse(path)?;
        let content = self.store.get_blob(&blob_path).await?;

        Ok(FileMetadata::file(
            blob_path.to_string(),
            Contents::Buffered(content.data),
            content.properties.last_modified,
        ))
    }

    async fn read_stream(&self, path: &str) -> Result<FileMetadata> {
        let blob_path = BlobPath::parse(path)?;
        let BlobContentStream { properties, stream } =
            self.store.get_blob_stream(&blob_path).await?;

        Ok(FileMetadata::file(
            blob_path.to_string(),
            Contents::Stream(Box::new(StreamReader::new(stream))),
            properties.last_modified,
        ))
    }

    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<ListEntry>> {
        // The blob namespace is flat, listing a container already returns every blob in it
        event!(
            Level::DEBUG,
            "Listing `{directory}`, recursive: {recursive}"
        );

        let mut entries = vec![];

        if directory.trim_matches('/').is_empty() {
            let mut pages = self.store.list_containers();
            while let Some(page) = pages.try_next().await? {
                entries.extend(page.into_iter().map(|container| ListEntry {
                    kind: FileKind::Directory,
                    path: container.name,
                    timestamp: container.last_modified,
                    size: None,
                }));
            }
        } else {
            let container = container_name(directory)?;
            let mut pages = self.store.list_blobs(container);
            while let Some(page) = pages.try_next().await? {
                entries.extend(page.into_iter().map(|blob| ListEntry {
                    kind: FileKind::File,
                    path: format!("{container}/{}", blob.name),
                    timestamp: Some(blob.properties.last_modified),
                    size: Some(blob.properties.content_length),
                }));
            }
        }

        Ok(entries)
    }

    async fn get_metadata(&self, path: &str) -> Result<BTreeMap<String, String>> {
        let blob_path = BlobPath::parse(path)?;
        self.store.get_properties(&blob_path).await?.to_map()
    }

    async fn get_size(&self, _: &str) -> Result<u64> {
        Err(Error::Unsupported("get_size"))
    }

    async fn get_mimetype(&self, _: &str) -> Result<String> {
        Err(Error::Unsupported("get_mimetype"))
    }

    async fn get_timestamp(&self, path: &str) -> Result<SystemTime> {
        let blob_path = BlobPath::parse(path)?;
        Ok(self.store.get_properties(&blob_path).await?.last_modified)
    }

    async fn get_visibility(&self, _: &str) -> Result<Visibility> {
        Err(Error::Unsupported("get_visibility"))
    }
}
