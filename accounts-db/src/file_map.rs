//! The authoritative map from file-id to open account file.
//!
//! Readers take the map's read lock only long enough to clone out an `Arc`
//! to the entry they want, then release it before touching the mmap'd
//! bytes. `AccountStorageEntry`'s counters are plain atomics, so mutating
//! `dead_bytes` needs no separate per-file lock; publishing or retiring a
//! whole entry (flush / shrink / delete) is a single `HashMap` insert or
//! remove under the map's write lock.

use {
    crate::account_storage_entry::AccountStorageEntry,
    crate::{account_info::AccountsFileId, error::LookupError},
    dashmap::DashMap,
    solana_clock::Slot,
    std::sync::Arc,
};

#[derive(Default)]
pub struct AccountStorage {
    map: DashMap<AccountsFileId, Arc<AccountStorageEntry>>,
}

impl AccountStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: AccountStorageEntry) {
        let id = entry.id();
        self.map.insert(id, Arc::new(entry));
    }

    pub fn get(&self, file_id: AccountsFileId) -> Result<Arc<AccountStorageEntry>, LookupError> {
        self.map
            .get(&file_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LookupError::FileIdNotFound(file_id))
    }

    /// Atomically swap in a new entry for an id that may already be
    /// present (used by shrink to replace a file in place conceptually —
    /// callers pass the new entry's own id, obtained from file creation,
    /// and separately remove the old id).
    pub fn replace(&self, old_id: AccountsFileId, new_entry: AccountStorageEntry) {
        self.map.remove(&old_id);
        self.map.insert(new_entry.id(), Arc::new(new_entry));
    }

    pub fn remove(&self, file_id: AccountsFileId) -> Option<Arc<AccountStorageEntry>> {
        self.map.remove(&file_id).map(|(_, v)| v)
    }

    pub fn contains(&self, file_id: AccountsFileId) -> bool {
        self.map.contains_key(&file_id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all_ids(&self) -> Vec<AccountsFileId> {
        self.map.iter().map(|entry| *entry.key()).collect()
    }

    /// The slot of the entry with the largest file-id, used only to seed
    /// `largest_root_slot` at load time before the real rooted slot is
    /// known (§9 design note — callers must overwrite this afterwards).
    pub fn slot_of_largest_file_id(&self) -> Option<Slot> {
        self.map
            .iter()
            .max_by_key(|entry| entry.key().as_u64())
            .map(|entry| entry.value().slot())
    }
}
