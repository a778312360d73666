//! The engine itself: ties the cache, index, and file map together behind
//! the public read/write contract (§4.9), and drives the flush / clean /
//! shrink / delete maintenance cycle (§4.8).

pub mod accounts_db_config;

use {
    crate::{
        account_info::{AccountRef, AccountsFileId, Location, NodeRef},
        account_storage_entry::AccountStorageEntry,
        accounts_cache::AccountsCache,
        accounts_hash::{self, Contribution, HashMode},
        accounts_index::AccountsIndex,
        append_vec::{padded_record_size, write_batch, AccountsFile},
        error::{AccountsFileError, LookupError},
        file_map::AccountStorage,
        measure::Measure,
    },
    accounts_db_config::AccountsDbConfig,
    log::debug,
    solana_account::{AccountSharedData, ReadableAccount},
    solana_clock::Slot,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::{
        collections::HashSet,
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc, Mutex,
        },
        thread,
        time::Duration,
    },
};

/// A file whose dead bytes reach this percentage of its length is queued
/// for shrink rather than left in place.
pub const ACCOUNT_FILE_SHRINK_THRESHOLD: usize = 70;

/// Upper bound on how many cached slots one maintenance iteration flushes.
pub const MAX_FLUSH_SLOTS_PER_ITER: usize = 256;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanReport {
    pub old: usize,
    pub zero_lamport: usize,
}

pub struct AccountsDb {
    pub accounts_index: AccountsIndex,
    pub storage: AccountStorage,
    pub accounts_cache: AccountsCache,
    accounts_dir: PathBuf,
    config: AccountsDbConfig,
    next_file_id: AtomicU64,
    next_write_version: AtomicU64,
    largest_root_slot: AtomicU64,
    unclean_files: Mutex<HashSet<AccountsFileId>>,
    shrink_queue: Mutex<HashSet<AccountsFileId>>,
    delete_queue: Mutex<HashSet<AccountsFileId>>,
}

impl AccountsDb {
    pub fn new(accounts_dir: PathBuf, config: AccountsDbConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&accounts_dir)?;
        Ok(Self {
            accounts_index: AccountsIndex::new(config.number_of_index_shards),
            storage: AccountStorage::new(),
            accounts_cache: AccountsCache::new(),
            accounts_dir,
            config,
            next_file_id: AtomicU64::new(0),
            next_write_version: AtomicU64::new(0),
            largest_root_slot: AtomicU64::new(0),
            unclean_files: Mutex::new(HashSet::new()),
            shrink_queue: Mutex::new(HashSet::new()),
            delete_queue: Mutex::new(HashSet::new()),
        })
    }

    pub fn config(&self) -> &AccountsDbConfig {
        &self.config
    }

    pub fn accounts_dir(&self) -> &Path {
        &self.accounts_dir
    }

    fn account_file_path(&self, slot: Slot, id: AccountsFileId) -> PathBuf {
        self.accounts_dir.join(AccountsFile::file_name(slot, id))
    }

    pub fn largest_root_slot(&self) -> Slot {
        self.largest_root_slot.load(Ordering::Acquire)
    }

    /// Advance the rooted-slot watermark. Never moves it backwards (§3
    /// invariant: "the largest rooted slot seen by maintenance never
    /// decreases").
    pub fn advance_root(&self, slot: Slot) {
        self.largest_root_slot.fetch_max(slot, Ordering::AcqRel);
    }

    /// Seed `largest_root_slot` from the file-map's highest file-id at
    /// snapshot-load time (Open Question 3). Callers must `advance_root`
    /// with the real rooted slot before the maintenance loop starts.
    pub fn seed_largest_root_slot_from_storage(&self) {
        if let Some(slot) = self.storage.slot_of_largest_file_id() {
            self.advance_root(slot);
        }
    }

    // ---- §4.9 public read contract ----------------------------------

    pub fn get_account(&self, pubkey: &Pubkey) -> Result<AccountSharedData, LookupError> {
        let node_ref = self
            .accounts_index
            .max_in_range(pubkey, None, None)
            .ok_or(LookupError::PubkeyNotInIndex)?;
        self.resolve_account(node_ref)
    }

    pub fn get_type_from_account<T: serde::de::DeserializeOwned>(
        &self,
        pubkey: &Pubkey,
    ) -> Result<T, LookupError> {
        let account = self.get_account(pubkey)?;
        bincode::deserialize(account.data()).map_err(|_| LookupError::PubkeyNotInIndex)
    }

    fn resolve_account(&self, node_ref: NodeRef) -> Result<AccountSharedData, LookupError> {
        let node = self.accounts_index.node(node_ref);
        match node.location {
            Location::InCache { index } => self
                .accounts_cache
                .account_at(node.slot, index)
                .map(|(_, account)| account)
                .ok_or(LookupError::SlotNotFound(node.slot)),
            Location::InFile { file_id, offset } => {
                let entry = self.storage.get(file_id)?;
                entry
                    .accounts
                    .read_account(offset)
                    .map(|view| view.to_account_shared_data())
                    .map_err(|_| LookupError::AccountFileEmpty)
            }
        }
    }

    fn lamports_of(&self, node_ref: NodeRef) -> u64 {
        let node = self.accounts_index.node(node_ref);
        match node.location {
            Location::InCache { index } => self
                .accounts_cache
                .account_at(node.slot, index)
                .map(|(_, account)| account.lamports())
                .unwrap_or(0),
            Location::InFile { file_id, offset } => self
                .storage
                .get(file_id)
                .ok()
                .and_then(|entry| entry.accounts.read_account(offset).ok())
                .map(|view| view.lamports)
                .unwrap_or(0),
        }
    }

    fn hash_and_lamports_of(&self, node_ref: NodeRef) -> (Hash, u64) {
        let node = self.accounts_index.node(node_ref);
        match node.location {
            Location::InCache { index } => {
                let (pubkey, account) = self
                    .accounts_cache
                    .account_at(node.slot, index)
                    .unwrap_or((Pubkey::default(), AccountSharedData::default()));
                let hash = accounts_hash::hash_account(
                    &pubkey,
                    account.owner(),
                    account.lamports(),
                    account.rent_epoch(),
                    account.executable(),
                    account.data(),
                );
                (hash, account.lamports())
            }
            Location::InFile { file_id, offset } => {
                let Ok(entry) = self.storage.get(file_id) else {
                    return (Hash::default(), 0);
                };
                let Ok(view) = entry.accounts.read_account(offset) else {
                    return (Hash::default(), 0);
                };
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
                (hash, view.lamports)
            }
        }
    }

    // ---- writes -------------------------------------------------------

    /// Insert a whole slot's batch into the cache and index it immediately
    /// (as `InCache` locations), so the accounts are readable before any
    /// flush happens. Panics if `slot` is already cached.
    pub fn put_batch(&self, slot: Slot, pubkeys: Vec<Pubkey>, accounts: Vec<AccountSharedData>) {
        let n = pubkeys.len();
        self.accounts_cache
            .put_batch(slot, pubkeys.clone(), accounts);
        self.accounts_index.alloc_reference_block(slot, n);
        for (i, pubkey) in pubkeys.into_iter().enumerate() {
            self.accounts_index.index_ref(AccountRef::new(
                pubkey,
                slot,
                Location::InCache { index: i },
            ));
        }
    }

    /// Remove a slot's cache entry and every index reference into it,
    /// freeing its arena. Used for cache-only slots that never reached
    /// consensus (§8 scenario 3).
    pub fn purge_slot(&self, slot: Slot) {
        let mut pubkeys = Vec::new();
        self.accounts_index
            .for_each_in_slot(slot, |_, node| pubkeys.push(node.pubkey));
        for pubkey in pubkeys {
            self.accounts_index.remove_reference(&pubkey, slot);
        }
        self.accounts_index.free_reference_block(slot);
        self.accounts_cache.purge_slot(slot);
    }

    /// Flush one cached slot into a new account file. Fatal (panics) on
    /// failure per §7 class 5 — loss of a rooted slot's writes is
    /// unrecoverable and the engine must not continue silently.
    pub fn flush_slot(&self, slot: Slot) -> Result<(), AccountsFileError> {
        let Some(batch) = self.accounts_cache.flush_slot(slot) else {
            return Ok(());
        };
        let n = batch.pubkeys.len();
        let owners: Vec<Pubkey> = batch.accounts.iter().map(|a| *a.owner()).collect();
        let lamports: Vec<u64> = batch.accounts.iter().map(|a| a.lamports()).collect();
        let rent_epochs: Vec<u64> = batch.accounts.iter().map(|a| a.rent_epoch()).collect();
        let executables: Vec<bool> = batch.accounts.iter().map(|a| a.executable()).collect();
        let datas: Vec<Vec<u8>> = batch.accounts.iter().map(|a| a.data().to_vec()).collect();
        let hashes: Vec<Hash> = (0..n)
            .map(|i| {
                accounts_hash::hash_account(
                    &batch.pubkeys[i],
                    &owners[i],
                    lamports[i],
                    rent_epochs[i],
                    executables[i],
                    &datas[i],
                )
            })
            .collect();

        let file_id = AccountsFileId::new(self.next_file_id.fetch_add(1, Ordering::Relaxed));
        let path = self.account_file_path(slot, file_id);
        let write_version_start = self
            .next_write_version
            .fetch_add(n as u64, Ordering::Relaxed);
        let (file, offsets) = write_batch(
            &path,
            write_version_start,
            &batch.pubkeys,
            &owners,
            &lamports,
            &rent_epochs,
            &executables,
            &hashes,
            &datas,
        )?;

        for i in 0..n {
            let node_ref = self
                .accounts_index
                .get_slot_reference(&batch.pubkeys[i], slot)
                .expect("flushed pubkey must already be indexed from put_batch");
            self.accounts_index.set_location(
                node_ref,
                Location::InFile {
                    file_id,
                    offset: offsets[i],
                },
            );
        }

        let entry = AccountStorageEntry::new(slot, file_id, file);
        entry.populate_metadata();
        self.storage.insert(entry);
        self.unclean_files.lock().unwrap().insert(file_id);
        Ok(())
    }

    // ---- §4.8 clean / shrink / delete ----------------------------------

    /// For every file flushed since the last clean, re-examine the full
    /// version chain of each of its pubkeys: nodes strictly older than the
    /// greatest rooted slot are dead ("old"); if the greatest rooted node
    /// itself has zero lamports, it is dead too ("zero-lamport").
    pub fn clean_account_files(&self, rooted_slot: Slot) -> CleanReport {
        let files_to_clean: Vec<AccountsFileId> =
            self.unclean_files.lock().unwrap().drain().collect();

        let mut report = CleanReport::default();
        let mut dead: Vec<(Pubkey, Slot)> = Vec::new();
        let mut considered: HashSet<Pubkey> = HashSet::new();

        for file_id in &files_to_clean {
            let Ok(entry) = self.storage.get(*file_id) else {
                continue;
            };
            let slot = entry.slot();
            let mut pubkeys = Vec::new();
            self.accounts_index
                .for_each_in_slot(slot, |_, node| pubkeys.push(node.pubkey));

            for pubkey in pubkeys {
                if !considered.insert(pubkey) {
                    continue;
                }
                let Some(head) = self.accounts_index.get_reference(&pubkey) else {
                    continue;
                };

                let mut chain = Vec::new();
                let mut cursor = Some(head);
                while let Some(node_ref) = cursor {
                    let node = self.accounts_index.node(node_ref);
                    chain.push((node.slot, node_ref));
                    cursor = node.next;
                }

                let Some(&(greatest_slot, greatest_node_ref)) = chain
                    .iter()
                    .filter(|(slot, _)| *slot <= rooted_slot)
                    .max_by_key(|(slot, _)| *slot)
                else {
                    continue;
                };

                for &(node_slot, _) in &chain {
                    if node_slot < greatest_slot {
                        dead.push((pubkey, node_slot));
                        report.old += 1;
                    }
                }
                if self.lamports_of(greatest_node_ref) == 0 {
                    dead.push((pubkey, greatest_slot));
                    report.zero_lamport += 1;
                }
            }
        }

        for (pubkey, slot) in dead {
            self.mark_node_dead(&pubkey, slot);
        }

        report
    }

    fn mark_node_dead(&self, pubkey: &Pubkey, slot: Slot) {
        let Some(node_ref) = self.accounts_index.get_slot_reference(pubkey, slot) else {
            return;
        };
        let node = self.accounts_index.node(node_ref);
        if let Location::InFile { file_id, offset } = node.location {
            if let Ok(entry) = self.storage.get(file_id) {
                if let Ok(view) = entry.accounts.read_account(offset) {
                    entry.mark_dead(view.stored_size());
                }
                if entry.is_fully_dead() {
                    self.delete_queue.lock().unwrap().insert(file_id);
                } else if entry.dead_ratio_percent() >= ACCOUNT_FILE_SHRINK_THRESHOLD {
                    self.shrink_queue.lock().unwrap().insert(file_id);
                }
            }
        }
        self.accounts_index.remove_reference(pubkey, slot);
    }

    /// Rewrite one file, compacting its still-alive records into a fresh
    /// file and re-pointing the index at the new offsets. A no-op if the
    /// file turned out fully dead in the meantime (delete handles it).
    pub fn shrink_account_file(&self, file_id: AccountsFileId) -> Result<(), AccountsFileError> {
        let Ok(old_entry) = self.storage.get(file_id) else {
            return Ok(());
        };
        let slot = old_entry.slot();

        let mut alive: Vec<(NodeRef, AccountRef)> = Vec::new();
        self.accounts_index.for_each_in_slot(slot, |idx, node| {
            if self.accounts_index.get_slot_reference(&node.pubkey, slot) == Some((slot, idx)) {
                alive.push(((slot, idx), *node));
            }
        });
        if alive.is_empty() {
            return Ok(());
        }

        let mut pubkeys = Vec::with_capacity(alive.len());
        let mut owners = Vec::with_capacity(alive.len());
        let mut lamports = Vec::with_capacity(alive.len());
        let mut rent_epochs = Vec::with_capacity(alive.len());
        let mut executables = Vec::with_capacity(alive.len());
        let mut hashes = Vec::with_capacity(alive.len());
        let mut datas = Vec::with_capacity(alive.len());
        for (_, node) in &alive {
            let Location::InFile { offset, .. } = node.location else {
                continue;
            };
            let view = old_entry.accounts.read_account(offset)?;
            pubkeys.push(view.pubkey);
            owners.push(view.owner);
            lamports.push(view.lamports);
            rent_epochs.push(view.rent_epoch);
            executables.push(view.executable);
            hashes.push(view.hash);
            datas.push(view.data.to_vec());
        }

        let new_file_id = AccountsFileId::new(self.next_file_id.fetch_add(1, Ordering::Relaxed));
        let path = self.account_file_path(slot, new_file_id);
        let write_version_start = self
            .next_write_version
            .fetch_add(pubkeys.len() as u64, Ordering::Relaxed);
        let (new_file, offsets) = write_batch(
            &path,
            write_version_start,
            &pubkeys,
            &owners,
            &lamports,
            &rent_epochs,
            &executables,
            &hashes,
            &datas,
        )?;
        let new_entry = AccountStorageEntry::new(slot, new_file_id, new_file);
        new_entry.populate_metadata();

        let replacements: Vec<(NodeRef, AccountRef)> = alive
            .iter()
            .zip(offsets.iter())
            .map(|((old_node_ref, node), &offset)| {
                let mut new_node = *node;
                new_node.location = Location::InFile {
                    file_id: new_file_id,
                    offset,
                };
                (*old_node_ref, new_node)
            })
            .collect();
        self.accounts_index.swap_slot_arena(slot, replacements);

        self.storage.insert(new_entry);
        self.storage.remove(file_id);
        let old_path = old_entry.path().to_path_buf();
        drop(old_entry);
        let _ = std::fs::remove_file(old_path);
        Ok(())
    }

    /// Remove a fully-dead file from the file-map, free its slot's arena,
    /// and unlink it from disk.
    pub fn delete_account_file(&self, file_id: AccountsFileId) {
        let Some(entry) = self.storage.remove(file_id) else {
            return;
        };
        let slot = entry.slot();
        let path = entry.path().to_path_buf();
        drop(entry);
        self.accounts_index.free_reference_block(slot);
        let _ = std::fs::remove_file(path);
    }

    fn run_shrink_queue(&self) -> usize {
        let queued: Vec<_> = self.shrink_queue.lock().unwrap().drain().collect();
        let mut count = 0;
        for file_id in queued {
            if self.shrink_account_file(file_id).is_ok() {
                count += 1;
            } else {
                debug!("shrink of {file_id:?} failed; left for a later iteration");
            }
        }
        count
    }

    fn run_delete_queue(&self) -> usize {
        let queued: Vec<_> = self.delete_queue.lock().unwrap().drain().collect();
        for &file_id in &queued {
            self.delete_account_file(file_id);
        }
        queued.len()
    }

    /// Flush every cached slot at or below the rooted watermark, up to
    /// `MAX_FLUSH_SLOTS_PER_ITER` per iteration.
    fn flush_rooted_slots(&self) -> usize {
        let rooted = self.largest_root_slot();
        let mut candidates: Vec<Slot> = self
            .accounts_cache
            .cached_slots()
            .into_iter()
            .filter(|slot| *slot <= rooted)
            .collect();
        candidates.sort_unstable();
        candidates.truncate(MAX_FLUSH_SLOTS_PER_ITER);

        let mut flushed: Vec<Slot> = Vec::new();
        for slot in candidates {
            self.flush_slot(slot)
                .expect("flush failure is fatal: a rooted slot's writes would be lost");
            flushed.push(slot);
        }
        flushed.len()
    }

    /// Run one flush/clean/shrink/delete cycle and return a summary.
    pub fn run_maintenance_iteration(&self) -> MaintenanceReport {
        let mut flush_time = Measure::start("flush");
        let flushed = self.flush_rooted_slots();
        flush_time.stop();

        let cleaned = if flushed > 0 {
            let mut clean_time = Measure::start("clean");
            let report = self.clean_account_files(self.largest_root_slot());
            clean_time.stop();
            debug!("{clean_time}");
            report
        } else {
            CleanReport::default()
        };

        let mut shrink_time = Measure::start("shrink");
        let shrunk = self.run_shrink_queue();
        shrink_time.stop();

        let mut delete_time = Measure::start("delete");
        let deleted = self.run_delete_queue();
        delete_time.stop();

        debug!("{flush_time} {shrink_time} {delete_time}");
        MaintenanceReport {
            flushed,
            cleaned,
            shrunk,
            deleted,
        }
    }

    // ---- §4.7.1 hash + capitalization -----------------------------------

    pub fn calculate_accounts_hash(&self, max_slot: Slot) -> (Hash, u64) {
        self.calculate_hash(HashMode::Full { max_slot })
    }

    pub fn calculate_incremental_accounts_hash(&self, min_slot: Slot) -> (Hash, u64) {
        self.calculate_hash(HashMode::Incremental { min_slot })
    }

    fn calculate_hash(&self, mode: HashMode) -> (Hash, u64) {
        accounts_hash::reduce_bins(self.accounts_index.number_of_bins(), |bin, out| {
            self.accounts_index.for_each_in_bin(bin, |pubkey, head| {
                let node_ref = match mode {
                    HashMode::Full { max_slot } => {
                        self.accounts_index.max_in_range(pubkey, None, Some(max_slot))
                    }
                    HashMode::Incremental { min_slot } => {
                        self.accounts_index.max_in_range(pubkey, Some(min_slot), None)
                    }
                };
                let Some(node_ref) = node_ref else { return };
                debug_assert_eq!(self.accounts_index.get_reference(pubkey), Some(head));
                let (hash, lamports) = self.hash_and_lamports_of(node_ref);
                match mode {
                    HashMode::Full { .. } => {
                        if lamports == 0 {
                            return;
                        }
                        out.push(Contribution {
                            pubkey: *pubkey,
                            hash,
                            lamports,
                        });
                    }
                    HashMode::Incremental { .. } => {
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
                    }
                }
            });
        })
    }

    // ---- maintenance thread ---------------------------------------------

    pub fn spawn_maintenance_loop(self: &Arc<Self>, interval: Duration) -> MaintenanceHandle {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let engine = Arc::clone(self);
        let join_handle = thread::Builder::new()
            .name("accounts-maintenance".to_string())
            .spawn(move || loop {
                let report = engine.run_maintenance_iteration();
                debug!(
                    "maintenance: flushed={} old={} zero_lamport={} shrunk={} deleted={}",
                    report.flushed,
                    report.cleaned.old,
                    report.cleaned.zero_lamport,
                    report.shrunk,
                    report.deleted
                );
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                }
            })
            .expect("failed to spawn the accounts maintenance thread");
        MaintenanceHandle {
            shutdown: shutdown_tx,
            join_handle: Some(join_handle),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MaintenanceReport {
    pub flushed: usize,
    pub cleaned: CleanReport,
    pub shrunk: usize,
    pub deleted: usize,
}

pub struct MaintenanceHandle {
    shutdown: crossbeam_channel::Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl MaintenanceHandle {
    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{accounts_db_config::ACCOUNTS_DB_CONFIG_FOR_TESTING, *};

    fn pk(b: u8) -> Pubkey {
        Pubkey::from([b; 32])
    }

    fn account(lamports: u64, data: Vec<u8>) -> AccountSharedData {
        AccountSharedData::create(lamports, data, Pubkey::default(), false, 0)
    }

    fn new_engine() -> (tempfile::TempDir, AccountsDb) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ACCOUNTS_DB_CONFIG_FOR_TESTING;
        config.number_of_index_shards = 4;
        let engine = AccountsDb::new(dir.path().to_path_buf(), config).unwrap();
        (dir, engine)
    }

    #[test]
    fn scenario_simple_put_get() {
        let (_dir, engine) = new_engine();
        let pubkey = pk(1);
        engine.put_batch(19, vec![pubkey], vec![account(100, vec![1, 2, 3])]);
        assert_eq!(engine.get_account(&pubkey).unwrap().lamports(), 100);
        engine.put_batch(28, vec![pubkey], vec![account(20, vec![4])]);
        assert_eq!(engine.get_account(&pubkey).unwrap().lamports(), 20);
    }

    #[test]
    fn scenario_flush_works() {
        let (_dir, engine) = new_engine();
        let pubkeys: Vec<_> = (0..3).map(pk).collect();
        let accounts: Vec<_> = (0..3).map(|i| account(10 + i as u64, vec![i])).collect();
        engine.put_batch(200, pubkeys.clone(), accounts);
        engine.flush_slot(200).unwrap();

        assert_eq!(engine.storage.len(), 1);
        let file_id = engine.storage.all_ids()[0];
        let entry = engine.storage.get(file_id).unwrap();
        assert_eq!(entry.number_of_accounts(), 3);
        assert!(engine.unclean_files.lock().unwrap().contains(&file_id));
    }

    #[test]
    fn scenario_purge_cache_only_slot() {
        let (_dir, engine) = new_engine();
        let pubkeys: Vec<_> = (0..3).map(pk).collect();
        let accounts: Vec<_> = (0..3).map(|i| account(1 + i as u64, vec![])).collect();
        engine.put_batch(200, pubkeys.clone(), accounts);
        engine.purge_slot(200);

        assert!(engine.accounts_cache.is_empty());
        assert!(!engine.accounts_index.has_reference_block(200));
        for pubkey in &pubkeys {
            assert_eq!(engine.accounts_index.get_reference(pubkey), None);
        }
    }

    #[test]
    fn scenario_clean_then_shrink() {
        let (_dir, engine) = new_engine();
        let pubkeys: Vec<_> = (0..10).map(pk).collect();
        let accounts: Vec<_> = (0..10).map(|i| account(100 + i as u64, vec![])).collect();
        engine.put_batch(200, pubkeys.clone(), accounts);
        engine.flush_slot(200).unwrap();

        let overwritten: Vec<_> = pubkeys[0..9].to_vec();
        let new_accounts: Vec<_> = (0..9).map(|i| account(500 + i as u64, vec![9])).collect();
        engine.put_batch(500, overwritten, new_accounts);
        engine.flush_slot(500).unwrap();

        let report = engine.clean_account_files(600);
        assert_eq!(report.old, 9);
        assert_eq!(report.zero_lamport, 0);

        let slot200_file = engine
            .storage
            .all_ids()
            .into_iter()
            .find(|id| engine.storage.get(*id).unwrap().slot() == 200)
            .unwrap();
        assert!(engine.shrink_queue.lock().unwrap().contains(&slot200_file));
        assert!(!engine.delete_queue.lock().unwrap().contains(&slot200_file));

        engine.shrink_account_file(slot200_file).unwrap();
        assert_eq!(
            engine.get_account(&pubkeys[9]).unwrap().lamports(),
            109
        );
    }

    #[test]
    fn scenario_clean_then_full_delete() {
        let (_dir, engine) = new_engine();
        let pubkeys: Vec<_> = (0..3).map(pk).collect();
        let accounts: Vec<_> = (0..3).map(|i| account(100 + i as u64, vec![])).collect();
        engine.put_batch(200, pubkeys.clone(), accounts);
        engine.flush_slot(200).unwrap();

        let new_accounts: Vec<_> = (0..3).map(|i| account(900 + i as u64, vec![1])).collect();
        engine.put_batch(500, pubkeys.clone(), new_accounts);
        engine.flush_slot(500).unwrap();

        let report = engine.clean_account_files(600);
        assert_eq!(report.old, 3);

        let slot200_file = engine
            .storage
            .all_ids()
            .into_iter()
            .find(|id| engine.storage.get(*id).unwrap().slot() == 200)
            .unwrap();
        assert!(engine.delete_queue.lock().unwrap().contains(&slot200_file));

        engine.delete_account_file(slot200_file);
        assert!(engine.storage.get(slot200_file).is_err());
    }

    #[test]
    fn scenario_zero_lamport_collapse() {
        let (_dir, engine) = new_engine();
        let pubkeys: Vec<_> = (0..10).map(pk).collect();
        let accounts: Vec<_> = (0..10).map(|i| account(100 + i as u64, vec![])).collect();
        engine.put_batch(200, pubkeys.clone(), accounts);
        engine.flush_slot(200).unwrap();

        let overwritten: Vec<_> = pubkeys[0..9].to_vec();
        let zeroed: Vec<_> = (0..9).map(|_| account(0, vec![])).collect();
        engine.put_batch(500, overwritten, zeroed);
        engine.flush_slot(500).unwrap();

        let report = engine.clean_account_files(600);
        assert_eq!(report.old, 9);
        assert_eq!(report.zero_lamport, 9);

        for pubkey in &pubkeys[0..9] {
            assert_eq!(engine.accounts_index.get_reference(pubkey), None);
        }
        assert_eq!(
            engine.get_account(&pubkeys[9]).unwrap().lamports(),
            109
        );
    }

    #[test]
    fn maintenance_iteration_drives_full_cycle() {
        let (_dir, engine) = new_engine();
        let pubkeys: Vec<_> = (0..10).map(pk).collect();
        let accounts: Vec<_> = (0..10).map(|i| account(100 + i as u64, vec![])).collect();
        engine.put_batch(200, pubkeys.clone(), accounts);
        engine.advance_root(200);
        let report = engine.run_maintenance_iteration();
        assert_eq!(report.flushed, 1);

        let overwritten: Vec<_> = pubkeys[0..3].to_vec();
        let new_accounts: Vec<_> = (0..3).map(|i| account(900 + i as u64, vec![])).collect();
        engine.put_batch(500, overwritten, new_accounts);
        engine.advance_root(600);
        let report = engine.run_maintenance_iteration();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.cleaned.old, 3);
    }
}
