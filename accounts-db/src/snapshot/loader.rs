//! The parallel snapshot-load pipeline (§4.7): unpack, plan, parallel
//! parse, merge, validate.
//!
//! Worker assignment groups every account file for a given slot onto the
//! same worker, so the version chain a worker builds for any pubkey never
//! interleaves with another worker's; the merge step then only has to
//! splice each pubkey's per-worker chain segments together and transfer
//! arena ownership wholesale, exactly as §4.7 step 4 describes.

use {
    crate::{
        account_info::{AccountRef, AccountsFileId, Location},
        account_storage_entry::AccountStorageEntry,
        accounts_db::accounts_db_config::AccountsDbConfig,
        accounts_hash::{self, Contribution},
        accounts_index::AccountsIndex,
        append_vec::{parse_file_name, AccountsFile},
        error::SnapshotLoadError,
        file_map::AccountStorage,
        snapshot::manifest::SnapshotManifest,
    },
    log::info,
    rayon::prelude::*,
    solana_clock::Slot,
    solana_hash::Hash,
    std::{
        collections::HashMap,
        fs::File,
        path::{Path, PathBuf},
    },
};

pub struct LoadedSnapshot {
    pub accounts_index: AccountsIndex,
    pub storage: AccountStorage,
    pub manifest: SnapshotManifest,
}

/// Decompress and unpack one `zstd`-compressed tar archive into `dest_dir`.
pub fn unpack_archive(archive_path: &Path, dest_dir: &Path) -> Result<(), SnapshotLoadError> {
    std::fs::create_dir_all(dest_dir)?;
    let file = File::open(archive_path)?;
    let decoder = zstd::stream::read::Decoder::new(file)?;
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest_dir)?;
    Ok(())
}

fn read_manifest(snapshot_root: &Path) -> Result<SnapshotManifest, SnapshotLoadError> {
    let snapshots_dir = snapshot_root.join("snapshots");
    let slot_dir = std::fs::read_dir(&snapshots_dir)?
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.path().is_dir())
        .ok_or_else(|| {
            SnapshotLoadError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no slot directory under snapshots/",
            ))
        })?
        .path();
    let slot_name = slot_dir
        .file_name()
        .expect("read_dir entries always have a file name")
        .to_string_lossy()
        .into_owned();
    let bytes = std::fs::read(slot_dir.join(slot_name))?;
    Ok(bincode::deserialize(&bytes)?)
}

fn list_account_files(accounts_dir: &Path) -> std::io::Result<Vec<(Slot, u64, PathBuf)>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(accounts_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some((slot, id)) = parse_file_name(&name.to_string_lossy()) {
            out.push((slot, id, entry.path()));
        }
    }
    Ok(out)
}

struct WorkerOutput {
    index: AccountsIndex,
    entries: Vec<AccountStorageEntry>,
}

fn run_worker(
    slots: &[Slot],
    by_slot: &HashMap<Slot, Vec<(AccountsFileId, PathBuf, usize)>>,
    config: &AccountsDbConfig,
) -> Result<WorkerOutput, SnapshotLoadError> {
    let index = AccountsIndex::new(config.number_of_index_shards);
    let mut entries = Vec::new();

    for &slot in slots {
        let files = &by_slot[&slot];
        let estimate = files
            .len()
            .saturating_mul(config.accounts_per_file_estimate)
            .max(1);
        index.alloc_reference_block(slot, estimate);

        for (file_id, path, declared_length) in files {
            let file = AccountsFile::open_existing(path, *declared_length)?;
            file.validate()?;
            for (offset, view) in file.iter() {
                let account_ref = AccountRef::new(
                    view.pubkey,
                    slot,
                    Location::InFile {
                        file_id: *file_id,
                        offset,
                    },
                );
                if index.try_index_ref(account_ref).is_none() {
                    return Err(SnapshotLoadError::OutOfReferenceMemory {
                        allocated: estimate,
                        files: files.len(),
                    });
                }
            }
            let entry = AccountStorageEntry::new(slot, *file_id, file);
            entry.populate_metadata();
            entries.push(entry);
        }
    }

    Ok(WorkerOutput { index, entries })
}

fn hash_and_lamports(storage: &AccountStorage, node: AccountRef) -> Result<(Hash, u64), SnapshotLoadError> {
    let Location::InFile { file_id, offset } = node.location else {
        unreachable!("every node produced by snapshot load is InFile");
    };
    let entry = storage.get(file_id).map_err(|_| SnapshotLoadError::MissingAccountFile {
        slot: node.slot,
        id: file_id.as_u64(),
    })?;
    let view = entry.accounts.read_account(offset)?;
    let hash = if view.hash == Hash::default() {
        accounts_hash::hash_account(
            &view.pubkey,
            &view.owner,
            view.lamports,
            view.rent_epoch,
            view.executable,
            view.data,
        )
    } else {
        view.hash
    };
    Ok((hash, view.lamports))
}

/// Load an already-unpacked snapshot directory (§4.7 steps 2-5).
pub fn load_from_unpacked_snapshot(
    snapshot_root: &Path,
    config: &AccountsDbConfig,
) -> Result<LoadedSnapshot, SnapshotLoadError> {
    let manifest = read_manifest(snapshot_root)?;

    if config.snapshot_metadata_only {
        return Ok(LoadedSnapshot {
            accounts_index: AccountsIndex::new(config.number_of_index_shards),
            storage: AccountStorage::new(),
            manifest,
        });
    }

    let referenced = manifest.referenced_files();
    let accounts_dir = snapshot_root.join("accounts");
    let mut by_slot: HashMap<Slot, Vec<(AccountsFileId, PathBuf, usize)>> = HashMap::new();
    for (slot, id, path) in list_account_files(&accounts_dir)? {
        if let Some(&declared_length) = referenced.get(&(slot, id)) {
            by_slot
                .entry(slot)
                .or_default()
                .push((AccountsFileId::new(id), path, declared_length));
        }
    }

    let mut slots: Vec<Slot> = by_slot.keys().copied().collect();
    slots.sort_unstable();
    let num_workers = config.num_threads_snapshot_load.max(1).min(slots.len().max(1));
    let mut worker_slots: Vec<Vec<Slot>> = vec![Vec::new(); num_workers];
    for (i, slot) in slots.into_iter().enumerate() {
        worker_slots[i % num_workers].push(slot);
    }

    info!(
        "snapshot load: {} workers over {} slots",
        worker_slots.len(),
        by_slot.len()
    );

    let worker_outputs: Vec<WorkerOutput> = worker_slots
        .into_par_iter()
        .map(|slots| run_worker(&slots, &by_slot, config))
        .collect::<Result<Vec<_>, _>>()?;

    let merged_index = AccountsIndex::new(config.number_of_index_shards);
    for output in &worker_outputs {
        if output.index.number_of_bins() != merged_index.number_of_bins() {
            return Err(SnapshotLoadError::BinCountMismatch {
                workers: output.index.number_of_bins(),
                merged: merged_index.number_of_bins(),
            });
        }
    }

    (0..merged_index.number_of_bins())
        .into_par_iter()
        .for_each(|bin| {
            for output in &worker_outputs {
                output.index.for_each_in_bin(bin, |pubkey, head| {
                    merged_index.splice_worker_chain(*pubkey, head);
                });
            }
        });

    let merged_storage = AccountStorage::new();
    for output in worker_outputs {
        for entry in output.entries {
            merged_storage.insert(entry);
        }
        merged_index.absorb_worker_arenas(output.index.into_arenas());
    }

    let (full_hash, full_cap) = accounts_hash::reduce_bins(merged_index.number_of_bins(), |bin, out| {
        merged_index.for_each_in_bin(bin, |pubkey, _head| {
            let Some(node_ref) = merged_index.max_in_range(pubkey, None, Some(manifest.bank_fields.slot))
            else {
                return;
            };
            let node = merged_index.node(node_ref);
            let Ok((hash, lamports)) = hash_and_lamports(&merged_storage, node) else {
                return;
            };
            if lamports == 0 {
                return;
            }
            out.push(Contribution {
                pubkey: *pubkey,
                hash,
                lamports,
            });
        });
    });

    if full_hash != manifest.bank_hash_info.accounts_hash {
        return Err(SnapshotLoadError::IncorrectAccountsHash {
            expected: manifest.bank_hash_info.accounts_hash,
            actual: full_hash,
        });
    }
    if full_cap != manifest.bank_hash_info.capitalization {
        return Err(SnapshotLoadError::IncorrectTotalLamports {
            expected: manifest.bank_hash_info.capitalization,
            actual: full_cap,
        });
    }

    if let Some(incremental) = &manifest.incremental {
        let (incr_hash, incr_cap) =
            accounts_hash::reduce_bins(merged_index.number_of_bins(), |bin, out| {
                merged_index.for_each_in_bin(bin, |pubkey, _head| {
                    let Some(node_ref) =
                        merged_index.max_in_range(pubkey, Some(incremental.full_slot), None)
                    else {
                        return;
                    };
                    let node = merged_index.node(node_ref);
                    let Ok((hash, lamports)) = hash_and_lamports(&merged_storage, node) else {
                        return;
                    };
                    let hash = if lamports == 0 {
                        accounts_hash::zero_lamport_contribution(pubkey)
                    } else {
                        hash
                    };
                    out.push(Contribution {
                        pubkey: *pubkey,
                        hash,
                        lamports,
                    });
                });
            });

        if incr_hash != incremental.incremental_hash {
            return Err(SnapshotLoadError::IncorrectAccountsDeltaHash);
        }
        if incr_cap != incremental.incremental_capitalization {
            return Err(SnapshotLoadError::IncorrectIncrementalLamports {
                expected: incremental.incremental_capitalization,
                actual: incr_cap,
            });
        }
    }

    Ok(LoadedSnapshot {
        accounts_index: merged_index,
        storage: merged_storage,
        manifest,
    })
}

/// Unpack a full snapshot archive (and optional incremental archive) into
/// `staging_dir`, then run the load pipeline over it.
pub fn load_from_snapshot_archive(
    full_archive: &Path,
    incremental_archive: Option<&Path>,
    staging_dir: &Path,
    config: &AccountsDbConfig,
) -> Result<LoadedSnapshot, SnapshotLoadError> {
    unpack_archive(full_archive, staging_dir)?;
    if let Some(incremental) = incremental_archive {
        unpack_archive(incremental, staging_dir)?;
    }
    load_from_unpacked_snapshot(staging_dir, config)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            accounts_db::accounts_db_config::ACCOUNTS_DB_CONFIG_FOR_TESTING,
            accounts_hash,
            append_vec::write_batch,
            snapshot::manifest::{AccountsDbFields, BankFields, BankHashInfo, ManifestFileEntry},
        },
        solana_pubkey::Pubkey,
        std::fs,
    };

    fn pk(b: u8) -> Pubkey {
        Pubkey::from([b; 32])
    }

    fn write_manifest(snapshot_root: &Path, manifest: &SnapshotManifest) {
        let slot = manifest.bank_fields.slot;
        let dir = snapshot_root.join("snapshots").join(slot.to_string());
        fs::create_dir_all(&dir).unwrap();
        let bytes = bincode::serialize(manifest).unwrap();
        fs::write(dir.join(slot.to_string()), bytes).unwrap();
    }

    #[test]
    fn loads_and_validates_a_minimal_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let accounts_dir = dir.path().join("accounts");
        fs::create_dir_all(&accounts_dir).unwrap();

        let pubkeys = vec![pk(1), pk(2), pk(3)];
        let owners = vec![Pubkey::default(); 3];
        let lamports = vec![10u64, 20, 30];
        let rent_epochs = vec![0u64; 3];
        let executables = vec![false; 3];
        let datas: Vec<Vec<u8>> = vec![vec![1], vec![2, 2], vec![3, 3, 3]];
        let hashes: Vec<Hash> = (0..3)
            .map(|i| {
                accounts_hash::hash_account(
                    &pubkeys[i],
                    &owners[i],
                    lamports[i],
                    rent_epochs[i],
                    executables[i],
                    &datas[i],
                )
            })
            .collect();

        let file_path = accounts_dir.join("10.0");
        let (file, _offsets) = write_batch(
            &file_path,
            0,
            &pubkeys,
            &owners,
            &lamports,
            &rent_epochs,
            &executables,
            &hashes,
            &datas,
        )
        .unwrap();
        let length = file.len();
        drop(file);

        let (expected_hash, expected_cap) = accounts_hash::reduce_bins(1, |_bin, out| {
            for i in 0..3 {
                out.push(Contribution {
                    pubkey: pubkeys[i],
                    hash: hashes[i],
                    lamports: lamports[i],
                });
            }
        });

        let manifest = SnapshotManifest {
            bank_fields: BankFields {
                slot: 10,
                parent_slot: 0,
                capitalization: expected_cap,
            },
            accounts_db_fields: AccountsDbFields {
                file_map: HashMap::from([(
                    10,
                    vec![ManifestFileEntry {
                        id: AccountsFileId::new(0),
                        length,
                    }],
                )]),
                version: 1,
            },
            bank_hash_info: BankHashInfo {
                accounts_hash: expected_hash,
                capitalization: expected_cap,
            },
            incremental: None,
        };
        write_manifest(dir.path(), &manifest);

        let mut config = ACCOUNTS_DB_CONFIG_FOR_TESTING;
        config.number_of_index_shards = 1;
        config.num_threads_snapshot_load = 2;

        let loaded = load_from_unpacked_snapshot(dir.path(), &config).unwrap();
        for pubkey in &pubkeys {
            assert!(loaded.accounts_index.get_reference(pubkey).is_some());
        }
        assert_eq!(loaded.storage.len(), 1);
    }

    #[test]
    fn rejects_a_tampered_capitalization() {
        let dir = tempfile::tempdir().unwrap();
        let accounts_dir = dir.path().join("accounts");
        fs::create_dir_all(&accounts_dir).unwrap();

        let pubkeys = vec![pk(9)];
        let owners = vec![Pubkey::default()];
        let lamports = vec![100u64];
        let rent_epochs = vec![0u64];
        let executables = vec![false];
        let datas: Vec<Vec<u8>> = vec![vec![9]];
        let hash = accounts_hash::hash_account(&pubkeys[0], &owners[0], 100, 0, false, &datas[0]);

        let file_path = accounts_dir.join("5.0");
        let (file, _) = write_batch(
            &file_path,
            0,
            &pubkeys,
            &owners,
            &lamports,
            &rent_epochs,
            &executables,
            &[hash],
            &datas,
        )
        .unwrap();
        let length = file.len();
        drop(file);

        let manifest = SnapshotManifest {
            bank_fields: BankFields {
                slot: 5,
                parent_slot: 0,
                capitalization: 999,
            },
            accounts_db_fields: AccountsDbFields {
                file_map: HashMap::from([(
                    5,
                    vec![ManifestFileEntry {
                        id: AccountsFileId::new(0),
                        length,
                    }],
                )]),
                version: 1,
            },
            bank_hash_info: BankHashInfo {
                accounts_hash: hash,
                capitalization: 999,
            },
            incremental: None,
        };
        write_manifest(dir.path(), &manifest);

        let mut config = ACCOUNTS_DB_CONFIG_FOR_TESTING;
        config.number_of_index_shards = 1;
        config.num_threads_snapshot_load = 1;

        let result = load_from_unpacked_snapshot(dir.path(), &config);
        assert!(matches!(
            result,
            Err(SnapshotLoadError::IncorrectTotalLamports { .. })
        ));
    }
}
