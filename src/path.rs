use std::fmt::Display;
use std::str::FromStr;

use crate::Error;

/// Struct for a path split into a container and a blob name,
///
/// The first segment of the path is the container, everything after the first `/` is the
/// blob name. Blob names may contain further `/` characters, the store treats them as part
/// of the key.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobPath {
    /// Container name,
    ///
    container: String,
    /// Blob name within the container,
    ///
    blob: String,
}

impl BlobPath {
    /// Returns a new blob path from its parts,
    ///
    pub fn new(container: impl Into<String>, blob: impl Into<String>) -> Result<Self, Error> {
        let container = container.into();
        let blob = blob.into();

        if container.is_empty() || container.contains('/') || blob.is_empty() {
            return Err(Error::InvalidPath(format!("{container}/{blob}")));
        }

        Ok(Self { container, blob })
    }

    /// Splits a path into container and blob name,
    ///
    /// A single leading `/` is ignored.
    ///
    pub fn parse(path: impl AsRef<str>) -> Result<Self, Error> {
        let path = path.as_ref();
        let trimmed = path.strip_prefix('/').unwrap_or(path);

        match trimmed.split_once('/') {
            Some((container, blob)) if !container.is_empty() && !blob.is_empty() => Ok(Self {
                container: container.to_string(),
                blob: blob.to_string(),
            }),
            _ => Err(Error::InvalidPath(path.to_string())),
        }
    }

    /// Returns the container name,
    ///
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Returns the blob name,
    ///
    pub fn blob(&self) -> &str {
        &self.blob
    }
}

impl Display for BlobPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.container, self.blob)
    }
}

impl FromStr for BlobPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlobPath::parse(s)
    }
}

/// Validates a directory name, which maps to a container,
///
pub(crate) fn container_name(dir_name: &str) -> Result<&str, Error> {
    let name = dir_name.trim_matches('/');
    if name.is_empty() || name.contains('/') {
        Err(Error::InvalidPath(dir_name.to_string()))
    } else {
        Ok(name)
    }
}
