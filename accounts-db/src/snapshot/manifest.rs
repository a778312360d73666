//! Bincode-serialized snapshot manifest structures (§6): the contents of
//! `snapshots/<slot>/<slot>` inside a snapshot archive.

use {
    crate::account_info::AccountsFileId,
    serde::{Deserialize, Serialize},
    solana_clock::Slot,
    solana_hash::Hash,
    std::collections::HashMap,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankFields {
    pub slot: Slot,
    pub parent_slot: Slot,
    pub capitalization: u64,
}

/// One accounts file's identity, as recorded in the manifest's file map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ManifestFileEntry {
    pub id: AccountsFileId,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsDbFields {
    pub file_map: HashMap<Slot, Vec<ManifestFileEntry>>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BankHashInfo {
    pub accounts_hash: Hash,
    pub capitalization: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BankIncrementalSnapshotPersistence {
    pub full_slot: Slot,
    pub incremental_hash: Hash,
    pub incremental_capitalization: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub bank_fields: BankFields,
    pub accounts_db_fields: AccountsDbFields,
    pub bank_hash_info: BankHashInfo,
    pub incremental: Option<BankIncrementalSnapshotPersistence>,
}

impl SnapshotManifest {
    /// Every `(slot, file_id)` pair the manifest expects to find under
    /// `accounts/`, used by the loader's plan step to skip unreferenced
    /// files.
    pub fn referenced_files(&self) -> HashMap<(Slot, u64), usize> {
        let mut out = HashMap::new();
        for (slot, entries) in &self.accounts_db_fields.file_map {
            for entry in entries {
                out.insert((*slot, entry.id.as_u64()), entry.length);
            }
        }
        out
    }
}
