use std::time::SystemTime;

use async_trait::async_trait;
use azure_core::error::ErrorKind;
use azure_core::request_options::Metadata;
use azure_core::StatusCode;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::blob::{Blob, BlobBlockType, BlockList};
use azure_storage_blobs::prelude::*;
use blobfs::store::{BlobContent, BlobContentStream, BlobInfo, BlobStore, ContainerInfo, PageStream};
use blobfs::{BlobPath, BlobProperties, Error, Result, WriteOptions};
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use tracing::{event, Level};

use crate::{AccountConfig, Protocol};

/// Blob store backed by an Azure storage account,
///
/// The service client is created once and shared by every call, clones share the same
/// client. Retry policy and connection handling belong to the azure sdk.
///
#[derive(Clone)]
pub struct AzureBlobStore {
    service: BlobServiceClient,
}

impl AzureBlobStore {
    /// Returns a new store for the account,
    ///
    pub fn new(config: &AccountConfig) -> Self {
        let credentials = StorageCredentials::access_key(
            config.account_name.clone(),
            config.account_key.clone(),
        );

        let location = match (config.protocol, config.blob_endpoint.as_ref()) {
            (Protocol::Https, None) => CloudLocation::Public {
                account: config.account_name.clone(),
            },
            _ => CloudLocation::Custom {
                account: config.account_name.clone(),
                uri: config.endpoint(),
            },
        };

        event!(
            Level::DEBUG,
            "Creating blob service client for {}",
            config.endpoint()
        );
        let service = ClientBuilder::with_location(location, credentials).blob_service_client();
        Self { service }
    }

    /// Returns a new store from a connection descriptor,
    ///
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let config = connection_string.parse::<AccountConfig>()?;
        Ok(Self::new(&config))
    }

    /// Returns a new store w/ account settings read from the environment,
    ///
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(&AccountConfig::from_env()?))
    }

    fn blob_client(&self, path: &BlobPath) -> BlobClient {
        self.service
            .container_client(path.container())
            .blob_client(path.blob())
    }
}

/// Maps an azure sdk error to a store error,
///
/// `container` and `target` name what the request was addressing, they are used for the
/// not-found and conflict variants.
///
pub(crate) fn map_error(err: azure_core::Error, container: &str, target: &str) -> Error {
    match err.kind() {
        ErrorKind::HttpResponse {
            status, error_code, ..
        } => {
            let status = *status;
            if status == StatusCode::NotFound {
                match error_code.as_deref() {
                    Some("ContainerNotFound") => Error::ContainerNotFound(container.to_string()),
                    _ => Error::BlobNotFound(target.to_string()),
                }
            } else if status == StatusCode::Conflict {
                Error::AlreadyExists(target.to_string())
            } else {
                Error::Service {
                    status: status as u16,
                    message: err.to_string(),
                }
            }
        }
        _ => Error::Transport(err.to_string()),
    }
}

/// Returns store properties from a blob returned by the service,
///
fn properties(blob: &Blob) -> BlobProperties {
    BlobProperties {
        last_modified: SystemTime::from(blob.properties.last_modified),
        content_length: blob.properties.content_length,
        content_type: Some(blob.properties.content_type.clone()).filter(|c| !c.is_empty()),
        etag: Some(blob.properties.etag.to_string()),
        metadata: blob
            .metadata
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect(),
    }
}

fn metadata(options: &WriteOptions) -> Metadata {
    let mut metadata = Metadata::new();
    for (name, value) in options.metadata.iter() {
        metadata.insert(name.clone(), value.clone());
    }
    metadata
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn put_blob(
        &self,
        path: &BlobPath,
        data: Bytes,
        options: &WriteOptions,
    ) -> Result<BlobProperties> {
        let content_length = data.len() as u64;

        let mut request = self
            .blob_client(path)
            .put_block_blob(data)
            .metadata(metadata(options));
        if let Some(content_type) = options.content_type.clone() {
            request = request.content_type(content_type);
        }

        let response = request
            .await
            .map_err(|err| map_error(err, path.container(), &path.to_string()))?;

        Ok(BlobProperties {
            last_modified: SystemTime::from(response.last_modified),
            content_length,
            content_type: options.content_type.clone(),
            etag: Some(response.etag.to_string()),
            metadata: options.metadata.clone(),
        })
    }

    async fn put_block(&self, path: &BlobPath, block_id: &str, data: Bytes) -> Result<()> {
        self.blob_client(path)
            .put_block(Bytes::from(block_id.to_string()), data)
            .await
            .map_err(|err| map_error(err, path.container(), &path.to_string()))?;
        Ok(())
    }

    async fn put_block_list(
        &self,
        path: &BlobPath,
        block_ids: &[String],
        content_length: u64,
        options: &WriteOptions,
    ) -> Result<BlobProperties> {
        let mut block_list = BlockList::default();
        for block_id in block_ids {
            block_list
                .blocks
                .push(BlobBlockType::new_uncommitted(Bytes::from(block_id.clone())));
        }

        let client = self.blob_client(path);
        let mut request = client.put_block_list(block_list).metadata(metadata(options));
        if let Some(content_type) = options.content_type.clone() {
            request = request.content_type(content_type);
        }

        let response = request
            .await
            .map_err(|err| map_error(err, path.container(), &path.to_string()))?;

        Ok(BlobProperties {
            last_modified: SystemTime::from(response.last_modified),
            content_length,
            content_type: options.content_type.clone(),
            etag: Some(response.etag.to_string()),
            metadata: options.metadata.clone(),
        })
    }

    async fn get_blob(&self, path: &BlobPath) -> Result<BlobContent> {
        let target = path.to_string();
        let mut pages = self.blob_client(path).get().into_stream();

        let mut data = BytesMut::new();
        let mut blob_properties = None;
        while let Some(response) = pages.next().await {
            let response = response.map_err(|err| map_error(err, path.container(), &target))?;
            if blob_properties.is_none() {
                blob_properties = Some(properties(&response.blob));
            }

            let chunk = response
                .data
                .collect()
                .await
                .map_err(|err| map_error(err, path.container(), &target))?;
            data.extend_from_slice(&chunk);
        }

        match blob_properties {
            Some(properties) => Ok(BlobContent {
                properties,
                data: data.freeze(),
            }),
            None => Err(Error::Transport(format!("No response while reading {target}"))),
        }
    }

    async fn get_blob_stream(&self, path: &BlobPath) -> Result<BlobContentStream> {
        let target = path.to_string();
        let mut pages = self.blob_client(path).get().into_stream();

        let first = match pages.next().await {
            Some(response) => response.map_err(|err| map_error(err, path.container(), &target))?,
            None => return Err(Error::Transport(format!("No response while reading {target}"))),
        };

        let properties = properties(&first.blob);
        let stream = first
            .data
            .chain(pages.map_ok(|response| response.data).try_flatten())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));

        Ok(BlobContentStream {
            properties,
            stream: Box::pin(stream),
        })
    }

    async fn get_properties(&self, path: &BlobPath) -> Result<BlobProperties> {
        let response = self
            .blob_client(path)
            .get_properties()
            .await
            .map_err(|err| map_error(err, path.container(), &path.to_string()))?;

        Ok(properties(&response.blob))
    }

    async fn delete_blob(&self, path: &BlobPath) -> Result<()> {
        self.blob_client(path)
            .delete()
            .await
            .map_err(|err| map_error(err, path.container(), &path.to_string()))?;
        Ok(())
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        self.service
            .container_client(container)
            .create()
            .await
            .map_err(|err| map_error(err, container, container))?;
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        self.service
            .container_client(container)
            .delete()
            .await
            .map_err(|err| map_error(err, container, container))?;
        Ok(())
    }

    fn list_containers(&self) -> PageStream<ContainerInfo> {
        self.service
            .list_containers()
            .into_stream()
            .map_ok(|page| {
                page.containers
                    .into_iter()
                    .map(|container| ContainerInfo {
                        name: container.name,
                        last_modified: None,
                    })
                    .collect::<Vec<_>>()
            })
            .map_err(|err| map_error(err, "", "containers"))
            .boxed()
    }

    fn list_blobs(&self, container: &str) -> PageStream<BlobInfo> {
        let name = container.to_string();

        self.service
            .container_client(container)
            .list_blobs()
            .into_stream()
            .map_ok(|page| {
                page.blobs
                    .blobs()
                    .map(|blob| BlobInfo {
                        name: blob.name.clone(),
                        properties: properties(blob),
                    })
                    .collect::<Vec<_>>()
            })
            .map_err(move |err| map_error(err, &name, &name))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use azure_core::error::ErrorKind;
    use azure_core::StatusCode;
    use blobfs::Error;

    use super::map_error;

    fn http_error(status: StatusCode, error_code: &str) -> azure_core::Error {
        azure_core::Error::message(
            ErrorKind::HttpResponse {
                status,
                error_code: Some(error_code.to_string()),
            },
            "request failed",
        )
    }

    #[test]
    fn test_map_not_found() {
        let err = map_error(
            http_error(StatusCode::NotFound, "ContainerNotFound"),
            "docs",
            "docs/report.txt",
        );
        assert!(matches!(err, Error::ContainerNotFound(name) if name == "docs"));

        let err = map_error(
            http_error(StatusCode::NotFound, "BlobNotFound"),
            "docs",
            "docs/report.txt",
        );
        assert!(matches!(err, Error::BlobNotFound(name) if name == "docs/report.txt"));
    }

    #[test]
    fn test_map_other_errors() {
        let err = map_error(
            http_error(StatusCode::Conflict, "ContainerAlreadyExists"),
            "docs",
            "docs",
        );
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err = map_error(
            http_error(StatusCode::Forbidden, "AuthenticationFailed"),
            "docs",
            "docs/report.txt",
        );
        assert!(matches!(err, Error::Service { status: 403, .. }));

        let err = map_error(
            azure_core::Error::message(ErrorKind::Io, "connection reset"),
            "docs",
            "docs/report.txt",
        );
        assert!(matches!(err, Error::Transport(_)));
        assert!(!err.is_not_found());
    }
}
