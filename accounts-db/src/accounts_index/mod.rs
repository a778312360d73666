//! The sharded account index: one open-addressed map per bin holding the
//! head of each pubkey's version chain, plus the per-slot reference arenas
//! ("reference memory") that own the chain nodes themselves.

use {
    crate::{
        account_info::{AccountRef, Location, NodeRef},
        pubkey_bins::PubkeyBinCalculator24,
    },
    bucket_map::BucketTable,
    solana_clock::Slot,
    solana_pubkey::Pubkey,
    std::collections::HashMap,
    std::sync::RwLock,
};

/// A contiguous block of chain nodes allocated together for one slot.
/// Pointers into it (`NodeRef`s) are stable until the block is freed.
#[derive(Debug, Default)]
pub struct ReferenceArena {
    pub slot: Slot,
    nodes: Vec<AccountRef>,
}

impl ReferenceArena {
    fn with_capacity(slot: Slot, capacity: usize) -> Self {
        Self {
            slot,
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    /// Push a node, returning its stable `NodeRef`. `OutOfReferenceMemory`
    /// is the caller's responsibility to detect (arena is pre-sized by the
    /// caller; this only asserts it never silently reallocates past the
    /// estimate during snapshot load).
    fn push(&mut self, node: AccountRef) -> Option<NodeRef> {
        if self.nodes.len() == self.nodes.capacity() && self.nodes.capacity() != 0 {
            return None;
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(node);
        Some((self.slot, idx))
    }

    fn get(&self, idx: u32) -> &AccountRef {
        &self.nodes[idx as usize]
    }

    fn get_mut(&mut self, idx: u32) -> &mut AccountRef {
        &mut self.nodes[idx as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &AccountRef)> {
        self.nodes.iter().enumerate().map(|(i, n)| (i as u32, n))
    }
}

/// A fixed array of bins (each an independently lockable open-addressed
/// map) plus the arenas they point into.
pub struct AccountsIndex {
    bin_calculator: PubkeyBinCalculator24,
    bins: Vec<RwLock<BucketTable<NodeRef>>>,
    arenas: RwLock<HashMap<Slot, ReferenceArena>>,
}

impl AccountsIndex {
    pub fn new(number_of_bins: usize) -> Self {
        let bin_calculator = PubkeyBinCalculator24::new(number_of_bins);
        let bins = (0..number_of_bins)
            .map(|_| RwLock::new(BucketTable::with_capacity(1024)))
            .collect();
        Self {
            bin_calculator,
            bins,
            arenas: RwLock::new(HashMap::new()),
        }
    }

    pub fn number_of_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn bin_calculator(&self) -> &PubkeyBinCalculator24 {
        &self.bin_calculator
    }

    fn bin_index(&self, pubkey: &Pubkey) -> usize {
        self.bin_calculator.bin_from_pubkey(pubkey)
    }

    /// Allocate a per-slot arena of capacity `n`. Panics if `slot` already
    /// has a live arena (callers must purge/free first).
    pub fn alloc_reference_block(&self, slot: Slot, n: usize) {
        let mut arenas = self.arenas.write().unwrap();
        let prev = arenas.insert(slot, ReferenceArena::with_capacity(slot, n));
        assert!(
            prev.is_none() || prev.as_ref().unwrap().is_empty(),
            "slot {slot} already has a live reference arena"
        );
    }

    /// Free the per-slot arena. A no-op if the slot has no arena (matches
    /// the redesigned, non-panicking behavior for an already-empty or
    /// never-allocated block).
    pub fn free_reference_block(&self, slot: Slot) {
        self.arenas.write().unwrap().remove(&slot);
    }

    pub fn has_reference_block(&self, slot: Slot) -> bool {
        self.arenas.read().unwrap().contains_key(&slot)
    }

    fn node_copy(&self, node_ref: NodeRef) -> Option<AccountRef> {
        let arenas = self.arenas.read().unwrap();
        arenas.get(&node_ref.0).map(|a| *a.get(node_ref.1))
    }

    /// Mutate the location of an already-indexed node in place (used by
    /// flush to move `InCache` -> `InFile`, and by shrink to rewrite
    /// offsets into the freshly compacted file).
    pub fn set_location(&self, node_ref: NodeRef, location: Location) {
        let mut arenas = self.arenas.write().unwrap();
        let arena = arenas
            .get_mut(&node_ref.0)
            .expect("set_location on a freed arena");
        arena.get_mut(node_ref.1).location = location;
    }

    /// Append `new_ref` into its slot's arena and link it as the new tail
    /// of `new_ref.pubkey`'s version chain, creating the chain if absent.
    /// The caller guarantees no existing chain node shares `new_ref.slot`.
    /// Panics if the slot's arena has no room left; callers that must
    /// instead surface `OutOfReferenceMemory` (parallel snapshot load) use
    /// `try_index_ref`.
    pub fn index_ref(&self, new_ref: AccountRef) -> NodeRef {
        self.try_index_ref(new_ref)
            .expect("reference arena exhausted; caller under-estimated capacity")
    }

    /// As `index_ref`, but returns `None` rather than panicking when the
    /// slot's arena is full.
    pub fn try_index_ref(&self, new_ref: AccountRef) -> Option<NodeRef> {
        let pubkey = new_ref.pubkey;
        let node_ref = {
            let mut arenas = self.arenas.write().unwrap();
            let arena = arenas
                .get_mut(&new_ref.slot)
                .expect("index_ref requires a pre-allocated arena for this slot");
            arena.push(new_ref)?
        };

        let bin = &self.bins[self.bin_index(&pubkey)];
        let mut table = bin.write().unwrap();
        let is_new_chain = {
            let mut created = false;
            table.get_or_put(pubkey, || {
                created = true;
                node_ref
            });
            created
        };
        drop(table);

        if !is_new_chain {
            // Walk to the tail (under the arenas write lock, so no other
            // writer can race us into producing two tails).
            let mut arenas = self.arenas.write().unwrap();
            let head = {
                let table = bin.read().unwrap();
                *table.get(&pubkey).expect("chain must exist")
            };
            let mut cursor = head;
            loop {
                let next = arenas
                    .get(&cursor.0)
                    .expect("chain node's arena missing")
                    .get(cursor.1)
                    .next;
                match next {
                    Some(n) => cursor = n,
                    None => break,
                }
            }
            arenas
                .get_mut(&cursor.0)
                .unwrap()
                .get_mut(cursor.1)
                .next = Some(node_ref);
        }

        Some(node_ref)
    }

    /// As `index_ref`, but returns `false` and does nothing if the chain
    /// already contains a node for `new_ref.slot`. Used by parallel
    /// snapshot load to tolerate duplicate records across files.
    pub fn index_ref_if_not_duplicate_slot(&self, new_ref: AccountRef) -> bool {
        if self
            .get_slot_reference(&new_ref.pubkey, new_ref.slot)
            .is_some()
        {
            return false;
        }
        self.index_ref(new_ref);
        true
    }

    /// The head of `pubkey`'s version chain, if any.
    pub fn get_reference(&self, pubkey: &Pubkey) -> Option<NodeRef> {
        let bin = &self.bins[self.bin_index(pubkey)];
        bin.read().unwrap().get(pubkey).copied()
    }

    /// Linear walk of the chain for the node whose slot is exactly `slot`.
    pub fn get_slot_reference(&self, pubkey: &Pubkey, slot: Slot) -> Option<NodeRef> {
        let mut cursor = self.get_reference(pubkey)?;
        let arenas = self.arenas.read().unwrap();
        loop {
            let node = arenas.get(&cursor.0)?.get(cursor.1);
            if node.slot == slot {
                return Some(cursor);
            }
            cursor = node.next?;
        }
    }

    /// The node with the greatest `slot` in `(min_slot, max_slot]`; either
    /// bound may be omitted to leave that side open.
    pub fn max_in_range(
        &self,
        pubkey: &Pubkey,
        min_slot: Option<Slot>,
        max_slot: Option<Slot>,
    ) -> Option<NodeRef> {
        let head = self.get_reference(pubkey)?;
        let arenas = self.arenas.read().unwrap();
        let mut cursor = Some(head);
        let mut best: Option<(Slot, NodeRef)> = None;
        while let Some(node_ref) = cursor {
            let node = arenas.get(&node_ref.0)?.get(node_ref.1);
            let in_lower = min_slot.map(|min| node.slot > min).unwrap_or(true);
            let in_upper = max_slot.map(|max| node.slot <= max).unwrap_or(true);
            if in_lower && in_upper {
                let is_better = match best {
                    Some((best_slot, _)) => node.slot > best_slot,
                    None => true,
                };
                if is_better {
                    best = Some((node.slot, node_ref));
                }
            }
            cursor = node.next;
        }
        best.map(|(_, node_ref)| node_ref)
    }

    /// Unlink and drop the chain node for `(pubkey, slot)`. Removes the
    /// bin entry entirely if the chain becomes empty.
    pub fn remove_reference(&self, pubkey: &Pubkey, slot: Slot) -> bool {
        let bin = &self.bins[self.bin_index(pubkey)];
        let mut table = bin.write().unwrap();
        let Some(&head) = table.get(pubkey) else {
            return false;
        };
        let mut arenas = self.arenas.write().unwrap();

        if arenas
            .get(&head.0)
            .map(|a| a.get(head.1).slot)
            .unwrap_or(Slot::MAX)
            == slot
        {
            let next = arenas.get(&head.0).unwrap().get(head.1).next;
            match next {
                Some(n) => {
                    table.remove(pubkey);
                    table.insert(*pubkey, n);
                }
                None => {
                    table.remove(pubkey);
                }
            }
            return true;
        }

        let mut prev = head;
        loop {
            let prev_next = arenas.get(&prev.0).unwrap().get(prev.1).next;
            let Some(cur) = prev_next else {
                return false;
            };
            let cur_node_slot = arenas.get(&cur.0).unwrap().get(cur.1).slot;
            if cur_node_slot == slot {
                let cur_next = arenas.get(&cur.0).unwrap().get(cur.1).next;
                arenas.get_mut(&prev.0).unwrap().get_mut(prev.1).next = cur_next;
                return true;
            }
            prev = cur;
        }
    }

    pub fn node(&self, node_ref: NodeRef) -> AccountRef {
        self.node_copy(node_ref).expect("dangling NodeRef")
    }

    /// Run `f` over every chain node in `slot`'s arena (used by clean).
    pub fn for_each_in_slot(&self, slot: Slot, mut f: impl FnMut(u32, &AccountRef)) {
        let arenas = self.arenas.read().unwrap();
        if let Some(arena) = arenas.get(&slot) {
            for (idx, node) in arena.iter() {
                f(idx, node);
            }
        }
    }

    /// Iterate every pubkey currently indexed in `bin`, yielding the head
    /// of its chain. Used by the snapshot hasher and the merge step.
    pub fn for_each_in_bin(&self, bin: usize, mut f: impl FnMut(&Pubkey, NodeRef)) {
        let table = self.bins[bin].read().unwrap();
        for (pubkey, node_ref) in table.iter() {
            f(pubkey, *node_ref);
        }
    }

    /// Splice a worker's already-linked local chain segment for `pubkey`
    /// onto this (merged) index, used by snapshot load's merge step.
    /// Walks to the tail of any existing chain for `pubkey` and attaches
    /// `worker_head` there, or installs it as the chain head if this is
    /// the pubkey's first appearance.
    pub fn splice_worker_chain(&self, pubkey: Pubkey, worker_head: NodeRef) {
        let bin = &self.bins[self.bin_index(&pubkey)];
        let mut table = bin.write().unwrap();
        let existing_head = table.get(&pubkey).copied();
        match existing_head {
            None => {
                table.get_or_put(pubkey, || worker_head);
            }
            Some(head) => {
                drop(table);
                let mut arenas = self.arenas.write().unwrap();
                let mut cursor = head;
                loop {
                    let next = arenas
                        .get(&cursor.0)
                        .expect("chain node's arena missing")
                        .get(cursor.1)
                        .next;
                    match next {
                        Some(n) => cursor = n,
                        None => break,
                    }
                }
                arenas.get_mut(&cursor.0).unwrap().get_mut(cursor.1).next = Some(worker_head);
            }
        }
    }

    /// Take ownership of a worker's per-slot arenas wholesale, as the
    /// merge step's arena-transfer (§4.7 step 4). Panics if a slot was
    /// assigned to more than one worker, which would mean the file-split
    /// plan violated the one-worker-per-slot invariant merge relies on.
    pub fn absorb_worker_arenas(&self, worker_arenas: HashMap<Slot, ReferenceArena>) {
        let mut arenas = self.arenas.write().unwrap();
        for (slot, arena) in worker_arenas {
            let prev = arenas.insert(slot, arena);
            assert!(
                prev.is_none() || prev.unwrap().is_empty(),
                "slot {slot} assigned to more than one snapshot-load worker"
            );
        }
    }

    /// Drain this worker index's per-slot arenas, consuming it. Used by
    /// the merge step after splicing every bin's chains onto the merged
    /// index, to hand the arenas themselves over to `absorb_worker_arenas`.
    pub fn into_arenas(self) -> HashMap<Slot, ReferenceArena> {
        self.arenas.into_inner().unwrap()
    }

    /// Rebuild `slot`'s arena from scratch with `replacements`, each pairing
    /// the node's previous identity with its freshly relocated content
    /// (`next` already carried over by the caller). Relinks every chain
    /// that pointed at an old node to point at its replacement, updating
    /// the bin entry directly when the old node was the chain head. Used
    /// by shrink, which compacts a file and must re-point every surviving
    /// node at its new `InFile` offset without disturbing chains that
    /// thread through other slots.
    pub fn swap_slot_arena(
        &self,
        slot: Slot,
        replacements: Vec<(NodeRef, AccountRef)>,
    ) -> Vec<NodeRef> {
        let mut arenas = self.arenas.write().unwrap();
        arenas.remove(&slot);
        let mut new_arena = ReferenceArena::with_capacity(slot, replacements.len());
        let mut new_refs = Vec::with_capacity(replacements.len());
        for (_, new_ref) in &replacements {
            let node_ref = new_arena
                .push(*new_ref)
                .expect("shrink arena sized exactly to its alive-record count");
            new_refs.push(node_ref);
        }
        arenas.insert(slot, new_arena);

        for ((old_node_ref, new_ref), new_node_ref) in replacements.iter().zip(new_refs.iter()) {
            let pubkey = new_ref.pubkey;
            let bin = &self.bins[self.bin_index(&pubkey)];
            let mut table = bin.write().unwrap();
            let head = *table.get(&pubkey).expect("chain must exist for a rewritten node");
            if head == *old_node_ref {
                *table.get_mut(&pubkey).unwrap() = *new_node_ref;
                continue;
            }
            let mut cursor = head;
            loop {
                let cur_next = arenas
                    .get(&cursor.0)
                    .expect("chain node's arena missing")
                    .get(cursor.1)
                    .next;
                match cur_next {
                    Some(n) if n == *old_node_ref => {
                        arenas.get_mut(&cursor.0).unwrap().get_mut(cursor.1).next =
                            Some(*new_node_ref);
                        break;
                    }
                    Some(n) => cursor = n,
                    None => panic!("old node ref not found in its own chain"),
                }
            }
        }
        new_refs
    }
}
