//! The physical-location half of the data model: where a given version of
//! an account's bytes currently live.

use {serde::{Deserialize, Serialize}, solana_clock::Slot};

/// Identifies one account file in the file map. Monotonically assigned by
/// the engine; never reused while the engine is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountsFileId(pub u64);

impl AccountsFileId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Byte offset of one record's header from the start of its account file.
pub type Offset = usize;

/// Where a particular version of an account currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Flushed: `offset` is the byte offset of the record header inside
    /// account file `file_id`.
    InFile {
        file_id: AccountsFileId,
        offset: Offset,
    },
    /// Still in the write-back cache, at `index` within that slot's batch.
    InCache { index: usize },
}

/// Identifies one node in the arena-backed version chain: which slot's
/// arena owns it, and the node's position within that arena. Using
/// `(slot, local_index)` instead of a raw pointer sidesteps lifetime
/// bookkeeping, per the storage-engine design notes.
pub type NodeRef = (Slot, u32);

/// One version node ("AccountRef") in a pubkey's singly linked version
/// chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRef {
    pub pubkey: solana_pubkey::Pubkey,
    pub slot: Slot,
    pub location: Location,
    pub next: Option<NodeRef>,
}

impl AccountRef {
    pub fn new(pubkey: solana_pubkey::Pubkey, slot: Slot, location: Location) -> Self {
        Self {
            pubkey,
            slot,
            location,
            next: None,
        }
    }
}
