mod error;
pub use error::Error;
pub use error::Result;

mod path;
pub use path::BlobPath;

mod metadata;
pub use metadata::BlobProperties;
pub use metadata::Contents;
pub use metadata::FileKind;
pub use metadata::FileMetadata;
pub use metadata::ListEntry;
pub use metadata::ReadStream;
pub use metadata::Visibility;
pub use metadata::WriteOptions;

pub mod store;
pub use store::BlobStore;
pub use store::MemoryBlobStore;

mod filesystem;
pub use filesystem::Filesystem;
pub use filesystem::WriteSource;

mod adapter;
pub use adapter::AdapterOptions;
pub use adapter::BlobPathAdapter;
pub use adapter::DEFAULT_BLOCK_SIZE;

/// Type alias for an adapter over the in-memory store,
///
pub type MemoryAdapter = BlobPathAdapter<MemoryBlobStore>;
