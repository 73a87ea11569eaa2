use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{event, Level};

use super::{BlobContent, BlobContentStream, BlobInfo, BlobStore, ContainerInfo, PageStream};
use crate::{BlobPath, BlobProperties, Error, Result, WriteOptions};

/// Default number of items per listing page, matches the remote store's maximum,
///
const DEFAULT_PAGE_SIZE: usize = 5000;

/// Size of chunks yielded by streaming reads,
///
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// In-memory blob store, useful for testing and local use,
///
/// Containers, blobs and staged blocks live in a map behind a mutex. Clones share the same
/// state. Errors mirror the remote store, ex. writing into a missing container fails w/
/// `Error::ContainerNotFound`.
///
#[derive(Clone)]
pub struct MemoryBlobStore {
    state: Arc<Mutex<State>>,
    page_size: usize,
}

#[derive(Default)]
struct State {
    containers: BTreeMap<String, Container>,
    /// Incremented on every write, used for etags,
    ///
    sequence: u64,
}

struct Container {
    created: SystemTime,
    blobs: BTreeMap<String, StoredBlob>,
    /// Uncommitted blocks, keyed by blob name then block id,
    ///
    staged: HashMap<String, HashMap<String, Bytes>>,
}

#[derive(Clone)]
struct StoredBlob {
    data: Bytes,
    properties: BlobProperties,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl MemoryBlobStore {
    /// Returns a new empty store,
    ///
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns self w/ a page size for listings,
    ///
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl State {
    fn container(&self, name: &str) -> Result<&Container> {
        self.containers
            .get(name)
            .ok_or_else(|| Error::ContainerNotFound(name.to_string()))
    }

    fn container_mut(&mut self, name: &str) -> Result<&mut Container> {
        self.containers
            .get_mut(name)
            .ok_or_else(|| Error::ContainerNotFound(name.to_string()))
    }

    fn blob(&self, path: &BlobPath) -> Result<&StoredBlob> {
        self.container(path.container())?
            .blobs
            .get(path.blob())
            .ok_or_else(|| Error::BlobNotFound(path.to_string()))
    }

    /// Returns a page of containers starting at `marker`, and the marker of the next page,
    ///
    fn container_page(
        &self,
        marker: &str,
        page_size: usize,
    ) -> (Vec<ContainerInfo>, Option<String>) {
        let mut range = self.containers.range(marker.to_string()..);
        let page = range
            .by_ref()
            .take(page_size)
            .map(|(name, container)| ContainerInfo {
                name: name.clone(),
                last_modified: Some(container.created),
            })
            .collect::<Vec<_>>();

        (page, range.next().map(|(name, _)| name.clone()))
    }

    /// Returns a page of blobs starting at `marker`, and the marker of the next page,
    ///
    fn blob_page(
        &self,
        container: &str,
        marker: &str,
        page_size: usize,
    ) -> Result<(Vec<BlobInfo>, Option<String>)> {
        let mut range = self.container(container)?.blobs.range(marker.to_string()..);
        let page = range
            .by_ref()
            .take(page_size)
            .map(|(name, blob)| BlobInfo {
                name: name.clone(),
                properties: blob.properties.clone(),
            })
            .collect::<Vec<_>>();

        Ok((page, range.next().map(|(name, _)| name.clone())))
    }

    /// Stores a blob and returns its new properties,
    ///
    fn store(
        &mut self,
        path: &BlobPath,
        data: Bytes,
        options: &WriteOptions,
    ) -> Result<BlobProperties> {
        self.sequence += 1;
        let properties = BlobProperties {
            last_modified: SystemTime::now(),
            content_length: data.len() as u64,
            content_type: options.content_type.clone(),
            etag: Some(format!("\"0x{:016X}\"", self.sequence)),
            metadata: options.metadata.clone(),
        };

        let container = self.container_mut(path.container())?;
        container.staged.remove(path.blob());
        container.blobs.insert(
            path.blob().to_string(),
            StoredBlob {
                data,
                properties: properties.clone(),
            },
        );

        Ok(properties)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_blob(
        &self,
        path: &BlobPath,
        data: Bytes,
        options: &WriteOptions,
    ) -> Result<BlobProperties> {
        self.state.lock().await.store(path, data, options)
    }

    async fn put_block(&self, path: &BlobPath, block_id: &str, data: Bytes) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .container_mut(path.container())?
            .staged
            .entry(path.blob().to_string())
            .or_default()
            .insert(block_id.to_string(), data);
        Ok(())
    }

    async fn put_block_list(
        &self,
        path: &BlobPath,
        block_ids: &[String],
        _: u64,
        options: &WriteOptions,
    ) -> Result<BlobProperties> {
        let mut state = self.state.lock().await;

        let staged = state
            .container(path.container())?
            .staged
            .get(path.blob());

        let mut data = BytesMut::new();
        for block_id in block_ids {
            match staged.and_then(|blocks| blocks.get(block_id)) {
                Some(block) => data.extend_from_slice(block),
                None => {
                    return Err(Error::Service {
                        status: 400,
                        message: format!(
                            "InvalidBlockList, block `{block_id}` was not staged for {path}"
                        ),
                    });
                }
            }
        }

        state.store(path, data.freeze(), options)
    }

    async fn get_blob(&self, path: &BlobPath) -> Result<BlobContent> {
        let state = self.state.lock().await;
        let blob = state.blob(path)?;
        Ok(BlobContent {
            properties: blob.properties.clone(),
            data: blob.data.clone(),
        })
    }

    async fn get_blob_stream(&self, path: &BlobPath) -> Result<BlobContentStream> {
        let blob = self.state.lock().await.blob(path)?.clone();

        let data = blob.data;
        let chunks = (0..data.len())
            .step_by(STREAM_CHUNK_SIZE)
            .map(|start| {
                let end = (start + STREAM_CHUNK_SIZE).min(data.len());
                Ok::<_, std::io::Error>(data.slice(start..end))
            })
            .collect::<Vec<_>>();

        Ok(BlobContentStream {
            properties: blob.properties,
            stream: Box::pin(stream::iter(chunks)),
        })
    }

    async fn get_properties(&self, path: &BlobPath) -> Result<BlobProperties> {
        let state = self.state.lock().await;
        Ok(state.blob(path)?.properties.clone())
    }

    async fn delete_blob(&self, path: &BlobPath) -> Result<()> {
        let mut state = self.state.lock().await;
        let container = state.container_mut(path.container())?;
        container.staged.remove(path.blob());
        match container.blobs.remove(path.blob()) {
            Some(_) => Ok(()),
            None => Err(Error::BlobNotFound(path.to_string())),
        }
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.containers.contains_key(container) {
            return Err(Error::AlreadyExists(container.to_string()));
        }

        state.containers.insert(
            container.to_string(),
            Container {
                created: SystemTime::now(),
                blobs: BTreeMap::new(),
                staged: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.containers.remove(container) {
            Some(removed) => {
                event!(
                    Level::TRACE,
                    "Removed container {container} w/ {} blobs",
                    removed.blobs.len()
                );
                Ok(())
            }
            None => Err(Error::ContainerNotFound(container.to_string())),
        }
    }

    fn list_containers(&self) -> PageStream<ContainerInfo> {
        let state = self.state.clone();
        let page_size = self.page_size;

        stream::try_unfold(Some(String::new()), move |marker| {
            let state = state.clone();
            async move {
                let Some(marker) = marker else {
                    return Ok(None);
                };

                let state = state.lock().await;
                Ok::<_, Error>(Some(state.container_page(&marker, page_size)))
            }
        })
        .boxed()
    }

    fn list_blobs(&self, container: &str) -> PageStream<BlobInfo> {
        let state = self.state.clone();
        let page_size = self.page_size;
        let container = container.to_string();

        stream::try_unfold(Some(String::new()), move |marker| {
            let state = state.clone();
            let container = container.clone();
            async move {
                let Some(marker) = marker else {
                    return Ok(None);
                };

                let state = state.lock().await;
                state.blob_page(&container, &marker, page_size).map(Some)
            }
        })
        .boxed()
    }
}
