/// Instance registry (identity resolver)
///
/// Maps human-readable user keys to opaque instance ids, the partition key of
/// every sync call, and remembers the device's current user. Entries live in
/// the `registry` keyspace of a device-wide storage.

use crate::retry::{retry_with_policy, RetryPolicy};
use crate::storage::{Keyspace, Storage, WriteBatch};
use crate::types::InstanceId;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

const USER_PREFIX: &str = "user#";
const CURRENT_USER_KEY: &str = "current_user";

pub struct InstanceRegistry {
    storage: Arc<dyn Storage>,
    lock: Mutex<()>,
    commit_retry: RetryPolicy,
}

impl InstanceRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
            commit_retry: RetryPolicy::fast(),
        }
    }

    /// Retry policy for busy storage commits
    pub fn with_commit_retry(mut self, policy: RetryPolicy) -> Self {
        self.commit_retry = policy;
        self
    }

    /// Look up the instance id registered for a user
    pub fn get_instance_id(&self, user_key: &str) -> Result<Option<InstanceId>> {
        let user_key = validate_user_key(user_key)?;
        match self.storage.get(Keyspace::Registry, &user_entry(user_key))? {
            Some(value) => {
                let raw = String::from_utf8(value).map_err(|e| {
                    Error::Corruption(format!("registry entry for {}: {}", user_key, e))
                })?;
                InstanceId::parse(&raw).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Register `id` for a user. Returns false (and writes nothing) when the
    /// same id is already registered.
    pub fn set_instance(&self, user_key: &str, id: &InstanceId) -> Result<bool> {
        let _guard = self.lock.lock();
        if self.get_instance_id(user_key)?.as_ref() == Some(id) {
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        batch.put(
            Keyspace::Registry,
            user_entry(user_key.trim()),
            id.as_str().as_bytes().to_vec(),
        );
        self.commit(batch)?;

        tracing::info!(user = %user_key.trim(), instance_id = %id, "registered instance");
        Ok(true)
    }

    /// Return the user's instance id, creating one on first login.
    pub fn resolve_or_create(&self, user_key: &str) -> Result<InstanceId> {
        let _guard = self.lock.lock();
        if let Some(id) = self.get_instance_id(user_key)? {
            return Ok(id);
        }

        let id = InstanceId::generate();
        let mut batch = WriteBatch::new();
        batch.put(
            Keyspace::Registry,
            user_entry(user_key.trim()),
            id.as_str().as_bytes().to_vec(),
        );
        self.commit(batch)?;

        tracing::info!(user = %user_key.trim(), instance_id = %id, "created instance");
        Ok(id)
    }

    /// Forget a user's instance id. Clears the current user if it was them.
    pub fn remove_instance(&self, user_key: &str) -> Result<bool> {
        let user_key = validate_user_key(user_key)?;
        let _guard = self.lock.lock();
        if self.get_instance_id(user_key)?.is_none() {
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        batch.delete(Keyspace::Registry, user_entry(user_key));
        if self.current_user()?.as_deref() == Some(user_key) {
            batch.delete(Keyspace::Registry, CURRENT_USER_KEY);
        }
        self.commit(batch)?;
        Ok(true)
    }

    /// Drop every registry entry including the current user
    pub fn clear_instances(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        let entries = self.storage.scan(Keyspace::Registry)?;

        let mut batch = WriteBatch::new();
        let mut removed = 0;
        for (key, _) in entries {
            if key.starts_with(USER_PREFIX) {
                removed += 1;
            }
            batch.delete(Keyspace::Registry, key);
        }
        self.commit(batch)?;
        Ok(removed)
    }

    /// All registered users with their instance ids, ordered by user key
    pub fn list_instances(&self) -> Result<Vec<(String, InstanceId)>> {
        let mut instances = Vec::new();
        for (key, value) in self.storage.scan(Keyspace::Registry)? {
            let Some(user_key) = key.strip_prefix(USER_PREFIX) else {
                continue;
            };
            let raw = String::from_utf8(value)
                .map_err(|e| Error::Corruption(format!("registry entry for {}: {}", user_key, e)))?;
            instances.push((user_key.to_string(), InstanceId::parse(&raw)?));
        }
        Ok(instances)
    }

    pub fn set_current_user(&self, user_key: &str) -> Result<()> {
        let user_key = validate_user_key(user_key)?;
        let _guard = self.lock.lock();
        if self.current_user()?.as_deref() == Some(user_key) {
            return Ok(());
        }

        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Registry, CURRENT_USER_KEY, user_key.as_bytes().to_vec());
        self.commit(batch)
    }

    pub fn current_user(&self) -> Result<Option<String>> {
        match self.storage.get(Keyspace::Registry, CURRENT_USER_KEY)? {
            Some(value) => String::from_utf8(value)
                .map(Some)
                .map_err(|e| Error::Corruption(format!("current user entry: {}", e))),
            None => Ok(None),
        }
    }

    pub fn clear_current_user(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let mut batch = WriteBatch::new();
        batch.delete(Keyspace::Registry, CURRENT_USER_KEY);
        self.commit(batch)
    }
}

impl InstanceRegistry {
    fn commit(&self, batch: WriteBatch) -> Result<()> {
        retry_with_policy(&self.commit_retry, || self.storage.commit(batch.clone()))
    }
}

fn user_entry(user_key: &str) -> String {
    format!("{}{}", USER_PREFIX, user_key)
}

fn validate_user_key(user_key: &str) -> Result<&str> {
    let trimmed = user_key.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument("user key is empty".to_string()));
    }
    Ok(trimmed)
}
