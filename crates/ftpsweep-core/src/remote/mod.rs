mod ftp;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::ConnectionParams;
use crate::Result;

pub use ftp::FtpConnector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One record of a listing snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub full_path: String,
    pub kind: EntryKind,
    pub modified_at: DateTime<Utc>,
}

impl RemoteEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Number of path segments, used to order directories deepest-first
    pub fn depth(&self) -> usize {
        self.full_path.split('/').filter(|s| !s.is_empty()).count()
    }
}

/// Opens sessions against a storage server
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn RemoteSession>>;
}

/// A logged-in session; calls complete in the order they are awaited
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn directory_exists(&self, path: &str) -> Result<bool>;

    /// Everything beneath `path` in pre-order, excluding `path` itself
    async fn list_recursive(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    async fn delete_file(&self, path: &str) -> Result<()>;

    async fn delete_directory(&self, path: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Join a remote directory and an entry name with '/'
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}
