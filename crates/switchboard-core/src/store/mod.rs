//! Key-value port behind the credential store and session registry.
//!
//! | Implementation | Backing            | Use                                   |
//! |----------------|--------------------|---------------------------------------|
//! | [`SledKv`]     | sled tree on disk  | client state that survives a restart  |
//! | [`MemoryKv`]   | `DashMap`          | tests, ephemeral clients              |

mod sled_kv;

pub use sled_kv::SledKv;

use crate::error::StoreError;
use dashmap::DashMap;

/// Minimal string key-value storage. Every operation is atomic on its own key.
pub trait KvPort: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`; absent keys are not an error.
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory port; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvPort for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
