pub mod error;
pub mod types;
pub mod config;
pub mod retry;
pub mod preview;
pub mod storage;
pub mod store;
pub mod registry; // instance id resolution per user

pub use config::StorageConfig;
pub use error::{Error, Result};
pub use registry::InstanceRegistry;
pub use retry::RetryPolicy;
pub use storage::{BatchOp, FileStorage, Keyspace, MemoryStorage, Storage, WriteBatch};
pub use store::{LocalNoteStore, RemoteApply, StoreStats, Tombstone};
pub use types::*;
