//! Persistent storage structure holding one slot's flushed accounts, plus
//! the liveness counters (`alive_bytes`, `dead_bytes`, `number_of_accounts`)
//! the maintenance loop reads and updates.

use {
    crate::{account_info::AccountsFileId, append_vec::AccountsFile},
    solana_clock::Slot,
    std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    },
};

#[derive(Debug)]
pub struct AccountStorageEntry {
    id: AccountsFileId,
    slot: Slot,
    pub accounts: AccountsFile,
    number_of_accounts: AtomicUsize,
    alive_bytes: AtomicUsize,
    dead_bytes: AtomicUsize,
}

impl AccountStorageEntry {
    pub fn new(slot: Slot, id: AccountsFileId, accounts: AccountsFile) -> Self {
        Self {
            id,
            slot,
            accounts,
            number_of_accounts: AtomicUsize::new(0),
            alive_bytes: AtomicUsize::new(0),
            dead_bytes: AtomicUsize::new(0),
        }
    }

    /// Run the account-file codec's one-pass scan and seed the counters
    /// from it. `dead_bytes` always starts at zero (§4.2 `populateMetadata`).
    pub fn populate_metadata(&self) {
        let (count, alive_bytes) = self.accounts.populate_metadata();
        self.number_of_accounts.store(count, Ordering::Release);
        self.alive_bytes.store(alive_bytes, Ordering::Release);
        self.dead_bytes.store(0, Ordering::Release);
    }

    pub fn id(&self) -> AccountsFileId {
        self.id
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn number_of_accounts(&self) -> usize {
        self.number_of_accounts.load(Ordering::Acquire)
    }

    pub fn alive_bytes(&self) -> usize {
        self.alive_bytes.load(Ordering::Acquire)
    }

    pub fn dead_bytes(&self) -> usize {
        self.dead_bytes.load(Ordering::Acquire)
    }

    pub fn length(&self) -> usize {
        self.accounts.len()
    }

    pub fn path(&self) -> &Path {
        self.accounts.path()
    }

    /// Mark one record dead: move `padded_record_size` bytes from the alive
    /// count to the dead count. Invariant: `alive_bytes + dead_bytes <= length`.
    pub fn mark_dead(&self, padded_record_size: usize) {
        let prev_alive_bytes = self.alive_bytes.fetch_sub(padded_record_size, Ordering::AcqRel);
        assert!(
            padded_record_size <= prev_alive_bytes,
            "mark_dead: {padded_record_size} bytes exceeds {prev_alive_bytes} alive bytes"
        );
        self.dead_bytes
            .fetch_add(padded_record_size, Ordering::AcqRel);
        self.number_of_accounts.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(self.alive_bytes() + self.dead_bytes() <= self.length());
    }

    pub fn is_fully_dead(&self) -> bool {
        self.dead_bytes() >= self.length()
    }

    pub fn dead_ratio_percent(&self) -> usize {
        if self.length() == 0 {
            0
        } else {
            self.dead_bytes() * 100 / self.length()
        }
    }
}
