//! The snapshot-generator contract: given a root slot, walk the file map
//! and index to emit `accounts/<slot>.<id>` files plus a manifest (§6) to a
//! staging directory, then atomically rename the finished archive into
//! place. Produces archives `snapshot::loader` can read back.

use {
    crate::{
        accounts_db::AccountsDb,
        error::SnapshotLoadError,
        snapshot::manifest::{
            AccountsDbFields, BankFields, BankHashInfo, BankIncrementalSnapshotPersistence,
            ManifestFileEntry, SnapshotManifest,
        },
    },
    solana_clock::Slot,
    std::{
        collections::HashMap,
        fs::File,
        path::Path,
    },
};

/// Walks an `AccountsDb`'s file map to produce a snapshot archive.
pub struct SnapshotGenerator<'a> {
    engine: &'a AccountsDb,
}

impl<'a> SnapshotGenerator<'a> {
    pub fn new(engine: &'a AccountsDb) -> Self {
        Self { engine }
    }

    /// Emit a full snapshot archive covering every file at or below
    /// `root_slot`.
    pub fn generate_full_snapshot(
        &self,
        root_slot: Slot,
        parent_slot: Slot,
        staging_dir: &Path,
        archive_path: &Path,
    ) -> Result<(), SnapshotLoadError> {
        let (accounts_hash, capitalization) = self.engine.calculate_accounts_hash(root_slot);
        let manifest = SnapshotManifest {
            bank_fields: BankFields {
                slot: root_slot,
                parent_slot,
                capitalization,
            },
            accounts_db_fields: self.collect_file_map(root_slot),
            bank_hash_info: BankHashInfo {
                accounts_hash,
                capitalization,
            },
            incremental: None,
        };
        self.write_archive(root_slot, &manifest, staging_dir, archive_path)
    }

    /// Emit an incremental snapshot archive: still a full file listing
    /// through `root_slot`, but the bank-hash-info is paired with an
    /// incremental hash computed over slots strictly greater than
    /// `base_slot`.
    pub fn generate_incremental_snapshot(
        &self,
        root_slot: Slot,
        parent_slot: Slot,
        base_slot: Slot,
        staging_dir: &Path,
        archive_path: &Path,
    ) -> Result<(), SnapshotLoadError> {
        let (accounts_hash, capitalization) = self.engine.calculate_accounts_hash(root_slot);
        let (incremental_hash, incremental_capitalization) =
            self.engine.calculate_incremental_accounts_hash(base_slot);
        let manifest = SnapshotManifest {
            bank_fields: BankFields {
                slot: root_slot,
                parent_slot,
                capitalization,
            },
            accounts_db_fields: self.collect_file_map(root_slot),
            bank_hash_info: BankHashInfo {
                accounts_hash,
                capitalization,
            },
            incremental: Some(BankIncrementalSnapshotPersistence {
                full_slot: base_slot,
                incremental_hash,
                incremental_capitalization,
            }),
        };
        self.write_archive(root_slot, &manifest, staging_dir, archive_path)
    }

    /// Every file in the map at or below `root_slot`, grouped by slot.
    fn collect_file_map(&self, root_slot: Slot) -> AccountsDbFields {
        let mut file_map: HashMap<Slot, Vec<ManifestFileEntry>> = HashMap::new();
        for id in self.engine.storage.all_ids() {
            let Ok(entry) = self.engine.storage.get(id) else {
                continue;
            };
            if entry.slot() > root_slot {
                continue;
            }
            file_map
                .entry(entry.slot())
                .or_default()
                .push(ManifestFileEntry {
                    id: entry.id(),
                    length: entry.length(),
                });
        }
        AccountsDbFields {
            file_map,
            version: 1,
        }
    }

    fn write_archive(
        &self,
        root_slot: Slot,
        manifest: &SnapshotManifest,
        staging_dir: &Path,
        archive_path: &Path,
    ) -> Result<(), SnapshotLoadError> {
        std::fs::create_dir_all(staging_dir)?;
        let accounts_dir = staging_dir.join("accounts");
        std::fs::create_dir_all(&accounts_dir)?;
        for (slot, entries) in &manifest.accounts_db_fields.file_map {
            for file_entry in entries {
                let entry = self.engine.storage.get(file_entry.id).map_err(|_| {
                    SnapshotLoadError::MissingAccountFile {
                        slot: *slot,
                        id: file_entry.id.as_u64(),
                    }
                })?;
                let dest = accounts_dir.join(format!("{slot}.{}", file_entry.id.as_u64()));
                std::fs::copy(entry.path(), &dest)?;
            }
        }

        let snapshots_dir = staging_dir.join("snapshots").join(root_slot.to_string());
        std::fs::create_dir_all(&snapshots_dir)?;
        let manifest_bytes = bincode::serialize(manifest)?;
        std::fs::write(snapshots_dir.join(root_slot.to_string()), manifest_bytes)?;

        let staging_archive = staging_dir.join("snapshot.tar.zst.tmp");
        {
            let file = File::create(&staging_archive)?;
            let encoder = zstd::stream::write::Encoder::new(file, 0)?.auto_finish();
            let mut builder = tar::Builder::new(encoder);
            builder.append_dir_all("accounts", &accounts_dir)?;
            builder.append_dir_all("snapshots", staging_dir.join("snapshots"))?;
            builder.finish()?;
        }
        std::fs::rename(&staging_archive, archive_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            accounts_db::accounts_db_config::ACCOUNTS_DB_CONFIG_FOR_TESTING,
            snapshot::loader::load_from_snapshot_archive,
        },
        solana_account::AccountSharedData,
        solana_pubkey::Pubkey,
    };

    fn pk(b: u8) -> Pubkey {
        Pubkey::from([b; 32])
    }

    fn account(lamports: u64, data: Vec<u8>) -> AccountSharedData {
        AccountSharedData::create(lamports, data, Pubkey::default(), false, 0)
    }

    #[test]
    fn generated_snapshot_loads_back_and_validates() {
        let data_dir = tempfile::tempdir().unwrap();
        let mut config = ACCOUNTS_DB_CONFIG_FOR_TESTING;
        config.number_of_index_shards = 4;
        let engine = AccountsDb::new(data_dir.path().to_path_buf(), config.clone()).unwrap();

        let pubkeys: Vec<_> = (0..5).map(pk).collect();
        let accounts: Vec<_> = (0..5).map(|i| account(100 + i as u64, vec![i])).collect();
        engine.put_batch(10, pubkeys.clone(), accounts);
        engine.flush_slot(10).unwrap();
        engine.advance_root(10);

        let staging_dir = tempfile::tempdir().unwrap();
        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("full.tar.zst");

        SnapshotGenerator::new(&engine)
            .generate_full_snapshot(10, 9, staging_dir.path(), &archive_path)
            .unwrap();
        assert!(archive_path.exists());

        let unpack_dir = tempfile::tempdir().unwrap();
        let loaded =
            load_from_snapshot_archive(&archive_path, None, unpack_dir.path(), &config).unwrap();
        for pubkey in &pubkeys {
            assert!(loaded.accounts_index.get_reference(pubkey).is_some());
        }
        assert_eq!(loaded.manifest.bank_fields.slot, 10);
    }
}
