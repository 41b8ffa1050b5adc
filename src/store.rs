//! Document store collaborator.
//!
//! Payloads are opaque JSON blobs. The store only assigns ids and creation
//! timestamps; callers own the shape of what they save.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: std::io::Error },
    Corrupt { path: PathBuf, source: serde_json::Error },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => {
                write!(f, "Store I/O error at {}: {}", path.display(), source)
            }
            StoreError::Corrupt { path, source } => {
                write!(f, "Store file {} is not valid JSON: {}", path.display(), source)
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Corrupt { source, .. } => Some(source),
        }
    }
}

/// `artifacts/{namespace}/...` collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(namespace: &str, segments: &[&str]) -> Self {
        let mut path = format!("artifacts/{}", namespace);
        for segment in segments {
            path.push('/');
            path.push_str(segment);
        }
        Self(path)
    }

    pub fn meal_history(namespace: &str) -> Self {
        Self::new(namespace, &["public", "data", "meal_history"])
    }

    pub fn recipes(namespace: &str) -> Self {
        Self::new(namespace, &["public", "data", "recipes"])
    }

    pub fn doc(&self, id: &str) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocumentPath {
    pub fn user_settings(namespace: &str, user_id: &str) -> Self {
        CollectionPath::new(namespace, &["users", user_id, "settings"]).doc("config")
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    /// Seconds since the Unix epoch, assigned by the store on `add`.
    #[serde(rename = "createdAt")]
    pub created_at: Option<u64>,
    pub data: Value,
}

/// Orders documents newest first. Missing timestamps sort as 0.
pub fn sort_newest_first(documents: &mut [StoredDocument]) {
    documents.sort_by(|a, b| b.created_at.unwrap_or(0).cmp(&a.created_at.unwrap_or(0)));
}

pub trait DocumentStore {
    /// Inserts with a store-assigned id and creation timestamp; returns the id.
    fn add(&mut self, collection: &CollectionPath, data: Value) -> Result<String, StoreError>;
    fn set(&mut self, path: &DocumentPath, data: Value) -> Result<(), StoreError>;
    fn get(&self, path: &DocumentPath) -> Result<Option<StoredDocument>, StoreError>;
    /// Documents in insertion order.
    fn list(&self, collection: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError>;
}

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InMemoryStore {
    collections: BTreeMap<String, Vec<StoredDocument>>,
    next_id: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&mut self) -> String {
        self.next_id += 1;
        format!("doc-{:08}", self.next_id)
    }
}

impl DocumentStore for InMemoryStore {
    fn add(&mut self, collection: &CollectionPath, data: Value) -> Result<String, StoreError> {
        let id = self.assign_id();
        self.collections
            .entry(collection.as_str().to_string())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                created_at: Some(now_seconds()),
                data,
            });
        Ok(id)
    }

    fn set(&mut self, path: &DocumentPath, data: Value) -> Result<(), StoreError> {
        let documents = self
            .collections
            .entry(path.collection.as_str().to_string())
            .or_default();
        match documents.iter_mut().find(|doc| doc.id == path.id) {
            Some(existing) => existing.data = data,
            None => documents.push(StoredDocument {
                id: path.id.clone(),
                created_at: Some(now_seconds()),
                data,
            }),
        }
        Ok(())
    }

    fn get(&self, path: &DocumentPath) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self
            .collections
            .get(path.collection.as_str())
            .and_then(|docs| docs.iter().find(|doc| doc.id == path.id))
            .cloned())
    }

    fn list(&self, collection: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self
            .collections
            .get(collection.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

/// An [`InMemoryStore`] snapshotted to a JSON file after every write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: InMemoryStore,
}

impl JsonFileStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let inner = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => InMemoryStore::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        debug!(path = %path.display(), "document store opened");
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `snapshot` to a sibling temp file, then renames it over the store file.
    fn write_snapshot(&self, snapshot: &InMemoryStore) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(snapshot).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        if let Err(source) = std::fs::write(&tmp_path, text) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(io_err(source));
        }
        std::fs::rename(&tmp_path, &self.path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp_path);
            io_err(source)
        })
    }

    /// Applies `change` to a copy; memory is only updated once the copy is on disk.
    fn commit<T>(
        &mut self,
        change: impl FnOnce(&mut InMemoryStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut next = self.inner.clone();
        let outcome = change(&mut next)?;
        self.write_snapshot(&next)?;
        self.inner = next;
        Ok(outcome)
    }
}

impl DocumentStore for JsonFileStore {
    fn add(&mut self, collection: &CollectionPath, data: Value) -> Result<String, StoreError> {
        self.commit(|store| store.add(collection, data))
    }

    fn set(&mut self, path: &DocumentPath, data: Value) -> Result<(), StoreError> {
        self.commit(|store| store.set(path, data))
    }

    fn get(&self, path: &DocumentPath) -> Result<Option<StoredDocument>, StoreError> {
        self.inner.get(path)
    }

    fn list(&self, collection: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError> {
        self.inner.list(collection)
    }
}
