use std::collections::BTreeSet;
use std::time::SystemTime;

use async_trait::async_trait;
use blobfs::store::{BlobContent, BlobContentStream, BlobInfo, ContainerInfo, PageStream};
use blobfs::{
    AdapterOptions, BlobPath, BlobPathAdapter, BlobProperties, BlobStore, Contents, Error,
    FileKind, Filesystem, MemoryAdapter, MemoryBlobStore, Visibility, WriteOptions,
};
use bytes::Bytes;
use tokio::io::AsyncReadExt;

/// Returns an adapter w/ a `docs` container,
///
async fn docs_adapter() -> MemoryAdapter {
    let adapter = BlobPathAdapter::new(MemoryBlobStore::new());
    adapter
        .create_dir("docs", &WriteOptions::default())
        .await
        .expect("should create container");
    adapter
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_write_then_read() {
    let adapter = docs_adapter().await;

    let written = adapter
        .write("docs/report.txt", "hello".into(), &WriteOptions::default())
        .await
        .expect("should write");
    assert_eq!(written.kind, FileKind::File);
    assert_eq!(written.path, "docs/report.txt");
    assert_eq!(written.bytes().map(|b| b.as_ref()), Some(&b"hello"[..]));

    let read = adapter.read("docs/report.txt").await.expect("should read");
    assert_eq!(read.bytes().map(|b| b.as_ref()), Some(&b"hello"[..]));
    assert_eq!(read.timestamp, written.timestamp);

    // Nested blob names round trip
    adapter
        .write("docs/2023/q1.csv", "a,b".into(), &WriteOptions::default())
        .await
        .expect("should write");
    let read = adapter.read("docs/2023/q1.csv").await.expect("should read");
    assert_eq!(read.path, "docs/2023/q1.csv");
    assert_eq!(read.bytes().map(|b| b.as_ref()), Some(&b"a,b"[..]));
}

#[tokio::test]
async fn test_write_to_missing_container() {
    let adapter = BlobPathAdapter::new(MemoryBlobStore::new());

    let result = adapter
        .write("missing/report.txt", "hello".into(), &WriteOptions::default())
        .await;
    assert!(matches!(result, Err(Error::ContainerNotFound(name)) if name == "missing"));

    let result = adapter
        .write("report.txt", "hello".into(), &WriteOptions::default())
        .await;
    assert!(matches!(result, Err(Error::InvalidPath(_))));
}

#[tokio::test]
async fn test_metadata_and_timestamp() {
    let adapter = docs_adapter().await;

    let written = adapter
        .write(
            "docs/report.txt",
            "hello".into(),
            &WriteOptions::default()
                .with_content_type("text/plain")
                .with_metadata("owner", "finance"),
        )
        .await
        .expect("should write");

    let metadata = adapter
        .get_metadata("docs/report.txt")
        .await
        .expect("should return metadata");
    assert!(metadata.contains_key("last-modified"));
    assert_eq!(metadata.get("content-length").map(String::as_str), Some("5"));
    assert_eq!(metadata.get("content-type").map(String::as_str), Some("text/plain"));
    assert_eq!(metadata.get("owner").map(String::as_str), Some("finance"));

    let timestamp = adapter
        .get_timestamp("docs/report.txt")
        .await
        .expect("should return timestamp");
    assert_eq!(Some(timestamp), written.timestamp);

    assert!(matches!(
        adapter.get_timestamp("docs/missing.txt").await,
        Err(Error::BlobNotFound(_))
    ));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_copy() {
    let adapter = docs_adapter().await;
    adapter
        .create_dir("archive", &WriteOptions::default())
        .await
        .expect("should create container");
    adapter
        .write(
            "docs/report.txt",
            "hello".into(),
            &WriteOptions::default().with_content_type("text/plain"),
        )
        .await
        .expect("should write");

    adapter
        .copy("docs/report.txt", "archive/2023/report.txt")
        .await
        .expect("should copy");

    let original = adapter.read("docs/report.txt").await.expect("should still read");
    let copied = adapter
        .read("archive/2023/report.txt")
        .await
        .expect("should read copy");
    assert_eq!(original.bytes(), copied.bytes());

    let copied = adapter
        .has("archive/2023/report.txt")
        .await
        .expect("should probe")
        .expect("should exist");
    assert_eq!(copied.content_type.as_deref(), Some("text/plain"));

    assert!(matches!(
        adapter.copy("docs/missing.txt", "archive/missing.txt").await,
        Err(Error::BlobNotFound(_))
    ));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_rename() {
    let adapter = docs_adapter().await;
    adapter
        .write("docs/draft.txt", "hello".into(), &WriteOptions::default())
        .await
        .expect("should write");

    adapter
        .rename("docs/draft.txt", "docs/final.txt")
        .await
        .expect("should rename");

    let read = adapter.read("docs/final.txt").await.expect("should read");
    assert_eq!(read.bytes().map(|b| b.as_ref()), Some(&b"hello"[..]));
    assert!(adapter.has("docs/draft.txt").await.expect("should probe").is_none());
    assert!(adapter.has("docs/final.txt").await.expect("should probe").is_some());

    // Renaming onto itself keeps the blob
    adapter
        .rename("docs/final.txt", "docs/final.txt")
        .await
        .expect("should rename");
    assert!(adapter.has("docs/final.txt").await.expect("should probe").is_some());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let adapter = docs_adapter().await;
    adapter
        .write("docs/report.txt", "hello".into(), &WriteOptions::default())
        .await
        .expect("should write");

    adapter.delete("docs/report.txt").await.expect("should delete");
    assert!(adapter.has("docs/report.txt").await.expect("should probe").is_none());

    adapter
        .delete("docs/report.txt")
        .await
        .expect("deleting again should not be an error");
}

#[tokio::test]
async fn test_directories() {
    let adapter = docs_adapter().await;

    let created = adapter
        .create_dir("archive", &WriteOptions::default())
        .await
        .expect("should create");
    assert_eq!(created.kind, FileKind::Directory);
    assert_eq!(created.path, "archive");

    assert!(matches!(
        adapter.create_dir("archive", &WriteOptions::default()).await,
        Err(Error::AlreadyExists(_))
    ));

    adapter
        .write("archive/old.txt", "old".into(), &WriteOptions::default())
        .await
        .expect("should write");
    adapter.delete_dir("archive").await.expect("should delete");

    assert!(adapter.has("archive/old.txt").await.expect("should probe").is_none());
    assert!(matches!(
        adapter.delete_dir("archive").await,
        Err(Error::ContainerNotFound(_))
    ));
}

#[tokio::test]
async fn test_list_contents() {
    let adapter = BlobPathAdapter::new(MemoryBlobStore::new().with_page_size(2));
    for container in ["archive", "docs", "images"] {
        adapter
            .create_dir(container, &WriteOptions::default())
            .await
            .expect("should create");
    }
    for name in ["a.txt", "b.txt", "c/d.txt", "e.txt", "f.txt"] {
        adapter
            .write(&format!("docs/{name}"), name.to_string().into(), &WriteOptions::default())
            .await
            .expect("should write");
    }
    adapter
        .write("images/logo.png", "png".into(), &WriteOptions::default())
        .await
        .expect("should write");

    let containers = adapter.list_contents("", false).await.expect("should list");
    assert_eq!(
        containers.iter().map(|e| e.path.as_str()).collect::<Vec<_>>(),
        vec!["archive", "docs", "images"]
    );
    assert!(containers.iter().all(|e| e.kind == FileKind::Directory));

    // Spans three pages
    let blobs = adapter.list_contents("docs", false).await.expect("should list");
    assert_eq!(
        blobs.iter().map(|e| e.path.as_str()).collect::<Vec<_>>(),
        vec![
            "docs/a.txt",
            "docs/b.txt",
            "docs/c/d.txt",
            "docs/e.txt",
            "docs/f.txt"
        ]
    );
    assert!(blobs.iter().all(|e| e.kind == FileKind::File));
    assert_eq!(blobs[2].size, Some(7));

    // The recursive flag does not change a flat listing
    let recursive = adapter.list_contents("docs/", true).await.expect("should list");
    assert_eq!(recursive, blobs);

    let empty = adapter.list_contents("archive", false).await.expect("should list");
    assert!(empty.is_empty());

    assert!(matches!(
        adapter.list_contents("missing", false).await,
        Err(Error::ContainerNotFound(_))
    ));
}

#[tokio::test]
async fn test_unsupported_operations() {
    let adapter = docs_adapter().await;
    adapter
        .write("docs/report.txt", "hello".into(), &WriteOptions::default())
        .await
        .expect("should write");

    let result = adapter
        .update("docs/report.txt", "updated".into(), &WriteOptions::default())
        .await;
    assert!(matches!(result, Err(Error::Unsupported("update"))));

    let mut source: &[u8] = b"updated";
    let result = adapter
        .update_stream("docs/report.txt", &mut source, &WriteOptions::default())
        .await;
    assert!(matches!(result, Err(Error::Unsupported("update_stream"))));

    assert!(adapter.get_size("docs/report.txt").await.is_err_and(|e| e.is_unsupported()));
    assert!(adapter.get_mimetype("docs/report.txt").await.is_err_and(|e| e.is_unsupported()));
    assert!(adapter
        .get_visibility("docs/report.txt")
        .await
        .is_err_and(|e| e.is_unsupported()));
    assert!(adapter
        .set_visibility("docs/report.txt", Visibility::Public)
        .await
        .is_err_and(|e| e.is_unsupported()));

    // Update never touches the blob
    let read = adapter.read("docs/report.txt").await.expect("should read");
    assert_eq!(read.bytes().map(|b| b.as_ref()), Some(&b"hello"[..]));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_write_stream() {
    let adapter = BlobPathAdapter::with_options(
        MemoryBlobStore::new(),
        AdapterOptions::default().with_block_size(4),
    );
    adapter
        .create_dir("docs", &WriteOptions::default())
        .await
        .expect("should create");

    // Shorter than a block, single put
    let mut source: &[u8] = b"abc";
    let written = adapter
        .write_stream("docs/short.txt", &mut source, &WriteOptions::default())
        .await
        .expect("should write");
    assert!(matches!(written.contents, Contents::Streamed { bytes_written: 3 }));
    assert!(written.bytes().is_none());

    // Staged as 3 blocks
    let mut source: &[u8] = b"hello world";
    let written = adapter
        .write_stream(
            "docs/long.txt",
            &mut source,
            &WriteOptions::default().with_content_type("text/plain"),
        )
        .await
        .expect("should write");
    assert!(matches!(written.contents, Contents::Streamed { bytes_written: 11 }));

    let read = adapter.read("docs/long.txt").await.expect("should read");
    assert_eq!(read.bytes().map(|b| b.as_ref()), Some(&b"hello world"[..]));
    assert_eq!(read.timestamp, written.timestamp);

    let metadata = adapter.get_metadata("docs/long.txt").await.expect("should read");
    assert_eq!(metadata.get("content-type").map(String::as_str), Some("text/plain"));

    let properties = adapter
        .has("docs/long.txt")
        .await
        .expect("should probe")
        .expect("should exist");
    assert_eq!(properties.content_length, 11);

    let mut source: &[u8] = b"";
    adapter
        .write_stream("docs/empty.txt", &mut source, &WriteOptions::default())
        .await
        .expect("should write");
    let read = adapter.read("docs/empty.txt").await.expect("should read");
    assert_eq!(read.bytes().map(|b| b.len()), Some(0));
}

#[tokio::test]
async fn test_write_stream_with_zero_block_size() {
    let adapter = BlobPathAdapter::with_options(
        MemoryBlobStore::new(),
        AdapterOptions { block_size: 0 },
    );
    assert_eq!(adapter.options().block_size, 1);
    adapter
        .create_dir("docs", &WriteOptions::default())
        .await
        .expect("should create");

    let mut source: &[u8] = b"hello world";
    let written = adapter
        .write_stream("docs/a.txt", &mut source, &WriteOptions::default())
        .await
        .expect("should write");
    assert!(matches!(written.contents, Contents::Streamed { bytes_written: 11 }));

    let read = adapter.read("docs/a.txt").await.expect("should read");
    assert_eq!(read.bytes().map(|b| b.as_ref()), Some(&b"hello world"[..]));
}

#[tokio::test]
async fn test_read_stream() {
    let adapter = docs_adapter().await;
    let data = (0..200_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    let written = adapter
        .write("docs/data.bin", Bytes::from(data.clone()), &WriteOptions::default())
        .await
        .expect("should write");

    let record = adapter.read_stream("docs/data.bin").await.expect("should read");
    assert_eq!(record.timestamp, written.timestamp);

    let mut stream = record.into_stream().expect("should be a stream");
    let mut read = vec![];
    stream.read_to_end(&mut read).await.expect("should read to end");
    assert_eq!(read, data);
}

/// Store that injects failures around an in-memory store,
///
#[derive(Clone, Default)]
struct FaultyStore {
    inner: MemoryBlobStore,
    /// Deletes of these paths fail w/ a transport error,
    ///
    failing_delete: BTreeSet<String>,
    /// Deletes of these paths find the blob already removed by another caller,
    ///
    vanished_delete: BTreeSet<String>,
    /// Property lookups fail w/ a transport error,
    ///
    offline: bool,
}

impl FaultyStore {
    fn transport_error() -> Error {
        Error::Transport("connection reset by peer".to_string())
    }
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn put_blob(
        &self,
        path: &BlobPath,
        data: Bytes,
        options: &WriteOptions,
    ) -> blobfs::Result<BlobProperties> {
        self.inner.put_blob(path, data, options).await
    }

    async fn put_block(&self, path: &BlobPath, block_id: &str, data: Bytes) -> blobfs::Result<()> {
        self.inner.put_block(path, block_id, data).await
    }

    async fn put_block_list(
        &self,
        path: &BlobPath,
        block_ids: &[String],
        content_length: u64,
        options: &WriteOptions,
    ) -> blobfs::Result<BlobProperties> {
        self.inner
            .put_block_list(path, block_ids, content_length, options)
            .await
    }

    async fn get_blob(&self, path: &BlobPath) -> blobfs::Result<BlobContent> {
        self.inner.get_blob(path).await
    }

    async fn get_blob_stream(&self, path: &BlobPath) -> blobfs::Result<BlobContentStream> {
        self.inner.get_blob_stream(path).await
    }

    async fn get_properties(&self, path: &BlobPath) -> blobfs::Result<BlobProperties> {
        if self.offline {
            return Err(Self::transport_error());
        }
        self.inner.get_properties(path).await
    }

    async fn delete_blob(&self, path: &BlobPath) -> blobfs::Result<()> {
        let target = path.to_string();
        if self.failing_delete.contains(&target) {
            return Err(Self::transport_error());
        }
        if self.vanished_delete.contains(&target) {
            self.inner.delete_blob(path).await?;
            return Err(Error::BlobNotFound(target));
        }
        self.inner.delete_blob(path).await
    }

    async fn create_container(&self, container: &str) -> blobfs::Result<()> {
        self.inner.create_container(container).await
    }

    async fn delete_container(&self, container: &str) -> blobfs::Result<()> {
        self.inner.delete_container(container).await
    }

    fn list_containers(&self) -> PageStream<ContainerInfo> {
        self.inner.list_containers()
    }

    fn list_blobs(&self, container: &str) -> PageStream<BlobInfo> {
        self.inner.list_blobs(container)
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_rename_rolls_back_when_delete_fails() {
    let store = FaultyStore {
        failing_delete: BTreeSet::from(["docs/draft.txt".to_string()]),
        ..Default::default()
    };
    let adapter = BlobPathAdapter::new(store);
    adapter
        .create_dir("docs", &WriteOptions::default())
        .await
        .expect("should create");
    adapter
        .write("docs/draft.txt", "hello".into(), &WriteOptions::default())
        .await
        .expect("should write");

    let result = adapter.rename("docs/draft.txt", "docs/final.txt").await;
    assert!(matches!(result, Err(Error::Transport(_))));

    // The destination was rolled back, the source is untouched
    assert!(adapter.has("docs/final.txt").await.expect("should probe").is_none());
    let read = adapter.read("docs/draft.txt").await.expect("should read");
    assert_eq!(read.bytes().map(|b| b.as_ref()), Some(&b"hello"[..]));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_rename_keeps_both_when_rollback_fails() {
    let store = FaultyStore {
        failing_delete: BTreeSet::from(["docs/draft.txt".to_string(), "docs/final.txt".to_string()]),
        ..Default::default()
    };
    let adapter = BlobPathAdapter::new(store);
    adapter
        .create_dir("docs", &WriteOptions::default())
        .await
        .expect("should create");
    adapter
        .write("docs/draft.txt", "hello".into(), &WriteOptions::default())
        .await
        .expect("should write");

    let result = adapter.rename("docs/draft.txt", "docs/final.txt").await;
    assert!(matches!(result, Err(Error::Transport(_))));

    for path in ["docs/draft.txt", "docs/final.txt"] {
        let read = adapter.read(path).await.expect("should read");
        assert_eq!(read.bytes().map(|b| b.as_ref()), Some(&b"hello"[..]));
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_rename_when_source_vanishes() {
    let store = FaultyStore {
        vanished_delete: BTreeSet::from(["docs/draft.txt".to_string()]),
        ..Default::default()
    };
    let adapter = BlobPathAdapter::new(store);
    adapter
        .create_dir("docs", &WriteOptions::default())
        .await
        .expect("should create");
    adapter
        .write("docs/draft.txt", "hello".into(), &WriteOptions::default())
        .await
        .expect("should write");

    adapter
        .rename("docs/draft.txt", "docs/final.txt")
        .await
        .expect("should rename");

    // The destination is the only copy left and is kept
    assert!(adapter.has("docs/draft.txt").await.expect("should probe").is_none());
    let read = adapter.read("docs/final.txt").await.expect("should read");
    assert_eq!(read.bytes().map(|b| b.as_ref()), Some(&b"hello"[..]));
}

#[tokio::test]
async fn test_has_surfaces_transport_errors() {
    let store = FaultyStore {
        offline: true,
        ..Default::default()
    };
    let adapter = BlobPathAdapter::new(store);

    let result = adapter.has("docs/report.txt").await;
    assert!(matches!(result, Err(Error::Transport(_))));

    // Missing containers are reported as not found, not as failures
    let adapter = BlobPathAdapter::new(MemoryBlobStore::new());
    assert!(adapter
        .has("missing/report.txt")
        .await
        .expect("should probe")
        .is_none());
}

#[tokio::test]
async fn test_shared_across_tasks() {
    let adapter = std::sync::Arc::new(docs_adapter().await);

    let tasks = (0..8)
        .map(|i| {
            let adapter = adapter.clone();
            tokio::spawn(async move {
                adapter
                    .write(&format!("docs/{i}.txt"), i.to_string().into(), &WriteOptions::default())
                    .await
                    .map(|record| record.timestamp)
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        let timestamp = task.await.expect("should join").expect("should write");
        assert!(timestamp.is_some_and(|t| t <= SystemTime::now()));
    }

    let listed = adapter.list_contents("docs", false).await.expect("should list");
    assert_eq!(listed.len(), 8);
}
