//! In-memory storage server for exercising the sweep without a network

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{EntryKind, RemoteConnector, RemoteEntry, RemoteSession};
use crate::config::ConnectionParams;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    DirectoryExists(String),
    List(String),
    DeleteFile(String),
    DeleteDirectory(String),
    Close,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, DateTime<Utc>>,
    dirs: BTreeMap<String, DateTime<Utc>>,
    failing: HashSet<String>,
    refuse_connect: Option<String>,
    calls: Vec<Call>,
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_dir(&self, path: &str, modified_at: DateTime<Utc>) -> &Self {
        self.state().dirs.insert(path.to_string(), modified_at);
        self
    }

    pub fn add_file(&self, path: &str, modified_at: DateTime<Utc>) -> &Self {
        self.state().files.insert(path.to_string(), modified_at);
        self
    }

    /// Make deletes of `path` fail
    pub fn fail_on(&self, path: &str) -> &Self {
        self.state().failing.insert(path.to_string());
        self
    }

    pub fn refuse_connections(&self, message: &str) -> &Self {
        self.state().refuse_connect = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn deletes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::DeleteFile(_) | Call::DeleteDirectory(_)))
            .collect()
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.state().files.contains_key(path)
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state().dirs.contains_key(path)
    }
}

fn is_beneath(path: &str, dir: &str) -> bool {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    path.starts_with(&prefix)
}

#[async_trait]
impl RemoteConnector for MemoryStorage {
    async fn connect(&self, _params: &ConnectionParams) -> Result<Box<dyn RemoteSession>> {
        let mut state = self.state();
        state.calls.push(Call::Connect);
        if let Some(message) = state.refuse_connect.clone() {
            return Err(Error::Connection(message));
        }
        drop(state);
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl RemoteSession for MemoryStorage {
    async fn directory_exists(&self, path: &str) -> Result<bool> {
        let mut state = self.state();
        state.calls.push(Call::DirectoryExists(path.to_string()));
        Ok(path == "/" || state.dirs.contains_key(path))
    }

    async fn list_recursive(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let mut state = self.state();
        state.calls.push(Call::List(path.to_string()));
        if path != "/" && !state.dirs.contains_key(path) {
            return Err(Error::Remote(format!("550 {}: No such directory", path)));
        }

        let dirs = state.dirs.iter().map(|(p, m)| (p, m, EntryKind::Directory));
        let files = state.files.iter().map(|(p, m)| (p, m, EntryKind::File));
        let mut entries: Vec<RemoteEntry> = dirs
            .chain(files)
            .filter(|(p, _, _)| is_beneath(p, path))
            .map(|(p, m, kind)| RemoteEntry {
                full_path: p.clone(),
                kind,
                modified_at: *m,
            })
            .collect();
        entries.sort_by(|a, b| a.full_path.cmp(&b.full_path));
        Ok(entries)
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteFile(path.to_string()));
        if state.failing.contains(path) {
            return Err(Error::Remote(format!("550 {}: Permission denied", path)));
        }
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::Remote(format!("550 {}: No such file", path)))
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteDirectory(path.to_string()));
        if state.failing.contains(path) {
            return Err(Error::Remote(format!("550 {}: Permission denied", path)));
        }
        let occupied = state.files.keys().chain(state.dirs.keys()).any(|p| is_beneath(p, path));
        if occupied {
            return Err(Error::Remote(format!("550 {}: Directory not empty", path)));
        }
        state
            .dirs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::Remote(format!("550 {}: No such directory", path)))
    }

    async fn close(&self) -> Result<()> {
        self.state().calls.push(Call::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rmdir_requires_empty_directory() {
        let now = Utc::now();
        let storage = MemoryStorage::new();
        storage.add_dir("/a", now).add_dir("/a/b", now);

        assert!(storage.delete_directory("/a").await.is_err());
        storage.delete_directory("/a/b").await.unwrap();
        storage.delete_directory("/a").await.unwrap();
        assert!(!storage.has_dir("/a"));
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_directory() {
        let now = Utc::now();
        let storage = MemoryStorage::new();
        storage
            .add_dir("/a", now)
            .add_dir("/ab", now)
            .add_file("/a/x", now)
            .add_file("/ab/y", now);

        let listed: Vec<String> = storage
            .list_recursive("/a")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.full_path)
            .collect();
        assert_eq!(listed, vec!["/a/x".to_string()]);
    }
}
