use thiserror::Error;

/// Result type returned by filesystem and store operations,
///
pub type Result<T> = std::result::Result<T, Error>;

/// Enumeration of errors surfaced by the adapter and the stores it drives,
///
/// Store errors are passed through to the caller unchanged. The adapter itself only
/// produces `Unsupported` and `InvalidPath`.
///
#[derive(Debug, Error)]
pub enum Error {
    /// The operation is declared but not implemented by this adapter,
    ///
    #[error("Operation `{0}` is not supported")]
    Unsupported(&'static str),
    /// The path could not be split into a container and a blob name,
    ///
    #[error("Invalid path `{0}`, expected `<container>/<blob-name>`")]
    InvalidPath(String),
    /// The container does not exist,
    ///
    #[error("Container `{0}` does not exist")]
    ContainerNotFound(String),
    /// The blob does not exist,
    ///
    #[error("Blob `{0}` does not exist")]
    BlobNotFound(String),
    /// The container or blob already exists,
    ///
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    /// The store rejected the request,
    ///
    #[error("Store rejected the request, status: {status}, {message}")]
    Service { status: u16, message: String },
    /// The request never produced a response from the store, ex. network or credential failure,
    ///
    #[error("Could not reach the store, {0}")]
    Transport(String),
    /// Reading a local stream failed,
    ///
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A timestamp could not be formatted,
    ///
    #[error("Could not format timestamp, {0}")]
    Timestamp(#[from] time::error::Format),
    /// Account configuration is missing or malformed,
    ///
    #[error("Invalid configuration, {0}")]
    Config(String),
}

impl Error {
    /// Returns true if this error means the container or blob does not exist,
    ///
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ContainerNotFound(_) | Error::BlobNotFound(_))
    }

    /// Returns true if this error is a declared-unsupported operation,
    ///
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }
}
