//! Sled-backed key-value port: one tree holding the client's persisted state.

use super::KvPort;
use crate::error::StoreError;
use sled::Db;
use std::path::Path;

const DEFAULT_PATH: &str = "./data/switchboard_client";
const TREE_NAME: &str = "client_state";

/// Durable port for credentials and conversation ids.
pub struct SledKv {
    db: Db,
}

impl SledKv {
    /// Opens or creates the store at `./data/switchboard_client`.
    pub fn new() -> Result<Self, StoreError> {
        Self::open_path(DEFAULT_PATH)
    }

    /// Opens or creates the store at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn tree(&self) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(TREE_NAME)?)
    }
}

impl KvPort for SledKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(bytes) = self.tree()?.get(key.as_bytes())? else {
            return Ok(None);
        };
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let tree = self.tree()?;
        tree.insert(key.as_bytes(), value.as_bytes())?;
        tree.flush()?;
        tracing::trace!(target: "switchboard::store", key = %key, "stored value");
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let tree = self.tree()?;
        tree.remove(key.as_bytes())?;
        tree.flush()?;
        Ok(())
    }
}
