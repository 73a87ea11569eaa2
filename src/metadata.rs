use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::SystemTime;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncRead;

use crate::Result;

/// Type alias for a readable stream handle returned by streaming reads,
///
pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Kind of entry in the filesystem,
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// A blob,
    File,
    /// A container,
    Directory,
}

/// Visibility of a file,
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Contents carried by a file metadata record,
///
pub enum Contents {
    /// No contents, ex. directories,
    ///
    None,
    /// Buffered contents,
    ///
    Buffered(Bytes),
    /// Stream handle to read the contents from the store,
    ///
    Stream(ReadStream),
    /// Contents were streamed to the store, the source stream was consumed,
    ///
    Streamed { bytes_written: u64 },
}

impl Debug for Contents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Contents::None => write!(f, "None"),
            Contents::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Contents::Stream(_) => write!(f, "Stream(..)"),
            Contents::Streamed { bytes_written } => f
                .debug_struct("Streamed")
                .field("bytes_written", bytes_written)
                .finish(),
        }
    }
}

/// Struct for the result of read and write operations,
///
#[derive(Debug)]
pub struct FileMetadata {
    /// Kind of entry,
    ///
    pub kind: FileKind,
    /// Path of the entry, `<container>/<blob-name>` for files and `<container>` for directories,
    ///
    pub path: String,
    /// Contents of the entry,
    ///
    pub contents: Contents,
    /// Last modified time reported by the store, directories do not carry one,
    ///
    pub timestamp: Option<SystemTime>,
}

impl FileMetadata {
    /// Returns a file record,
    ///
    pub fn file(path: impl Into<String>, contents: Contents, timestamp: SystemTime) -> Self {
        Self {
            kind: FileKind::File,
            path: path.into(),
            contents,
            timestamp: Some(timestamp),
        }
    }

    /// Returns a directory record,
    ///
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            kind: FileKind::Directory,
            path: path.into(),
            contents: Contents::None,
            timestamp: None,
        }
    }

    /// Returns buffered contents if this record carries them,
    ///
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.contents {
            Contents::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Consumes the record and returns the stream handle if it carries one,
    ///
    pub fn into_stream(self) -> Option<ReadStream> {
        match self.contents {
            Contents::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

/// Options passed along with write calls,
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Content type to store with the blob,
    ///
    #[serde(default)]
    pub content_type: Option<String>,
    /// User metadata to store with the blob,
    ///
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WriteOptions {
    /// Returns options w/ a content type,
    ///
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns options w/ a user metadata entry,
    ///
    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }
}

/// Store-side properties of a blob,
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobProperties {
    pub last_modified: SystemTime,
    pub content_length: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    /// User metadata,
    ///
    pub metadata: BTreeMap<String, String>,
}

impl BlobProperties {
    /// Returns properties as a string mapping,
    ///
    /// The mapping always has a `last-modified` entry formatted as RFC 3339. User metadata
    /// entries are included under their own names but never replace the store properties.
    ///
    pub fn to_map(&self) -> Result<BTreeMap<String, String>> {
        let mut map = self.metadata.clone();

        map.insert(
            "last-modified".to_string(),
            OffsetDateTime::from(self.last_modified).format(&Rfc3339)?,
        );
        map.insert(
            "content-length".to_string(),
            self.content_length.to_string(),
        );
        if let Some(content_type) = self.content_type.as_ref() {
            map.insert("content-type".to_string(), content_type.clone());
        }
        if let Some(etag) = self.etag.as_ref() {
            map.insert("etag".to_string(), etag.clone());
        }

        Ok(map)
    }
}

/// Entry returned by a listing,
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub kind: FileKind,
    pub path: String,
    pub timestamp: Option<SystemTime>,
    pub size: Option<u64>,
}
