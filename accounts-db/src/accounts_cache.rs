//! Write-back buffer of un-flushed per-slot batches.
//!
//! A slot's batch is inserted whole and removed whole; there is no partial
//! mutation of a cached slot. `put_batch` panics if the slot is already
//! cached — callers must purge it first — mirroring the source's contract
//! that a slot's cache entry and file-map entry are mutually exclusive.

use {
    dashmap::DashMap, solana_account::AccountSharedData, solana_clock::Slot,
    solana_pubkey::Pubkey,
};

/// One slot's un-flushed batch: parallel vectors of keys and accounts,
/// indexed identically (`InCache { index }` points into this pair).
pub struct CachedSlot {
    pub pubkeys: Vec<Pubkey>,
    pub accounts: Vec<AccountSharedData>,
}

impl CachedSlot {
    pub fn len(&self) -> usize {
        self.pubkeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pubkeys.is_empty()
    }
}

#[derive(Default)]
pub struct AccountsCache {
    slots: DashMap<Slot, CachedSlot>,
}

impl AccountsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a whole slot batch. Panics if `slot` is already cached.
    pub fn put_batch(&self, slot: Slot, pubkeys: Vec<Pubkey>, accounts: Vec<AccountSharedData>) {
        assert_eq!(
            pubkeys.len(),
            accounts.len(),
            "put_batch: pubkeys/accounts length mismatch"
        );
        let previous = self.slots.insert(slot, CachedSlot { pubkeys, accounts });
        assert!(
            previous.is_none(),
            "accounts cache: slot {slot} was already cached; purge it before re-putting"
        );
    }

    /// Remove and return the whole batch for `slot`, if cached.
    pub fn flush_slot(&self, slot: Slot) -> Option<CachedSlot> {
        self.slots.remove(&slot).map(|(_, v)| v)
    }

    /// Remove a slot without returning it, used by `purgeSlot`.
    pub fn purge_slot(&self, slot: Slot) -> Option<CachedSlot> {
        self.slots.remove(&slot).map(|(_, v)| v)
    }

    pub fn contains_slot(&self, slot: Slot) -> bool {
        self.slots.contains_key(&slot)
    }

    pub fn account_at(&self, slot: Slot, index: usize) -> Option<(Pubkey, AccountSharedData)> {
        let cached = self.slots.get(&slot)?;
        Some((cached.pubkeys.get(index).copied()?, cached.accounts.get(index)?.clone()))
    }

    /// All cached slots, for the maintenance loop's flushable-slot scan.
    pub fn cached_slots(&self) -> Vec<Slot> {
        self.slots.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(b: u8) -> Pubkey {
        Pubkey::from([b; 32])
    }

    fn account(lamports: u64) -> AccountSharedData {
        AccountSharedData::create(lamports, vec![1, 2, 3], Pubkey::default(), false, 0)
    }

    #[test]
    fn put_then_flush_round_trips() {
        let cache = AccountsCache::new();
        cache.put_batch(200, vec![pk(1), pk(2)], vec![account(10), account(20)]);
        assert!(cache.contains_slot(200));
        let batch = cache.flush_slot(200).unwrap();
        assert_eq!(batch.pubkeys, vec![pk(1), pk(2)]);
        assert!(!cache.contains_slot(200));
    }

    #[test]
    #[should_panic(expected = "already cached")]
    fn put_batch_panics_on_duplicate_slot() {
        let cache = AccountsCache::new();
        cache.put_batch(1, vec![pk(1)], vec![account(1)]);
        cache.put_batch(1, vec![pk(2)], vec![account(2)]);
    }

    #[test]
    fn purge_drops_without_returning_to_caller_site() {
        let cache = AccountsCache::new();
        cache.put_batch(5, vec![pk(3)], vec![account(3)]);
        assert!(cache.purge_slot(5).is_some());
        assert!(cache.flush_slot(5).is_none());
    }
}
