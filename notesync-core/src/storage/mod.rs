/// Durable key-value storage backing the local note store
///
/// Every backend exposes the same small surface: point reads, full keyspace
/// scans and atomic multi-key commits. The note store and the instance
/// registry are written purely in terms of this trait.

use crate::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod file;

pub use file::FileStorage;

/// Independent key spaces within one storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Keyspace {
    /// Note records keyed by note id
    Notes,
    /// Pending tombstones keyed by note id
    Tombstones,
    /// Instance registry entries
    Registry,
    /// Sync bookkeeping
    Meta,
}

impl Keyspace {
    pub const ALL: [Keyspace; 4] = [
        Keyspace::Notes,
        Keyspace::Tombstones,
        Keyspace::Registry,
        Keyspace::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyspace::Notes => "notes",
            Keyspace::Tombstones => "tombstones",
            Keyspace::Registry => "registry",
            Keyspace::Meta => "meta",
        }
    }
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mutation inside a write batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    Put {
        space: Keyspace,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        space: Keyspace,
        key: String,
    },
}

/// Ordered set of mutations applied as one atomic commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, space: Keyspace, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            space,
            key: key.into(),
            value,
        });
        self
    }

    pub fn delete(&mut self, space: Keyspace, key: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            space,
            key: key.into(),
        });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Durable key-value medium.
///
/// `commit` is all-or-nothing: after an error none of the batch is visible,
/// and after success all of it is visible and (for durable backends) on disk.
pub trait Storage: Send + Sync {
    /// Read one value
    fn get(&self, space: Keyspace, key: &str) -> Result<Option<Vec<u8>>>;

    /// Read every entry of a keyspace, ordered by key
    fn scan(&self, space: Keyspace) -> Result<Vec<(String, Vec<u8>)>>;

    /// Apply a batch atomically
    fn commit(&self, batch: WriteBatch) -> Result<()>;
}

/// Materialized keyspace contents shared by the storage backends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Tables {
    spaces: BTreeMap<Keyspace, BTreeMap<String, Vec<u8>>>,
}

impl Tables {
    pub(crate) fn get(&self, space: Keyspace, key: &str) -> Option<Vec<u8>> {
        self.spaces.get(&space).and_then(|t| t.get(key)).cloned()
    }

    pub(crate) fn scan(&self, space: Keyspace) -> Vec<(String, Vec<u8>)> {
        self.spaces
            .get(&space)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub(crate) fn apply(&mut self, batch: &WriteBatch) {
        for op in batch.ops() {
            match op {
                BatchOp::Put { space, key, value } => {
                    self.spaces
                        .entry(*space)
                        .or_default()
                        .insert(key.clone(), value.clone());
                }
                BatchOp::Delete { space, key } => {
                    if let Some(table) = self.spaces.get_mut(space) {
                        table.remove(key);
                    }
                }
            }
        }
    }

    /// Full contents as one batch of puts
    pub(crate) fn snapshot(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (space, table) in &self.spaces {
            for (key, value) in table {
                batch.put(*space, key.clone(), value.clone());
            }
        }
        batch
    }
}

/// In-process storage for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    commits: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty batches committed so far
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, space: Keyspace, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.read().get(space, key))
    }

    fn scan(&self, space: Keyspace) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self.tables.read().scan(space))
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.tables.write().apply(&batch);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
