//! Account hashing and the Merkle tree used to validate a loaded snapshot
//! and to compute the capitalization reported alongside it (§4.7.1).

use {solana_clock::Slot, solana_hash::Hash, solana_pubkey::Pubkey};

pub const MERKLE_FANOUT: usize = 16;

/// The account-hash function used both when flushing a freshly written
/// record and when a loaded record's stored hash is the default value and
/// must be recomputed.
pub fn hash_account(
    pubkey: &Pubkey,
    owner: &Pubkey,
    lamports: u64,
    rent_epoch: u64,
    executable: bool,
    data: &[u8],
) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&lamports.to_le_bytes());
    hasher.update(&rent_epoch.to_le_bytes());
    hasher.update(data);
    hasher.update(&[executable as u8]);
    hasher.update(owner.as_ref());
    hasher.update(pubkey.as_ref());
    Hash::from(*hasher.finalize().as_bytes())
}

/// The zero-lamport fallback contribution used by incremental hashing:
/// `blake3(pubkey)`.
pub fn zero_lamport_contribution(pubkey: &Pubkey) -> Hash {
    Hash::from(*blake3::hash(pubkey.as_ref()).as_bytes())
}

/// Fanout-`MERKLE_FANOUT` Merkle root over an ordered slice of leaf hashes.
/// An empty slice roots to the default (zero) hash.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::default();
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(MERKLE_FANOUT)
            .map(|chunk| {
                let mut hasher = blake3::Hasher::new();
                for hash in chunk {
                    hasher.update(hash.as_ref());
                }
                Hash::from(*hasher.finalize().as_bytes())
            })
            .collect();
    }
    level[0]
}

/// One pubkey's contribution to a hash/capitalization pass: its account
/// hash (or the zero-lamport fallback) and its lamports.
#[derive(Clone, Copy)]
pub struct Contribution {
    pub pubkey: Pubkey,
    pub hash: Hash,
    pub lamports: u64,
}

/// Collects per-bin contributions (already sorted within each bin by
/// pubkey), flattens them in bin-index order, and returns the Merkle root
/// plus summed capitalization. `accumulate` is called once per bin with a
/// mutable vector to fill; this keeps the sort and memory-layout concerns
/// here rather than duplicated at each call site (full hash, incremental
/// hash, and snapshot-generator validation all need exactly this shape).
pub fn reduce_bins(
    number_of_bins: usize,
    mut collect_bin: impl FnMut(usize, &mut Vec<Contribution>),
) -> (Hash, u64) {
    let mut leaves = Vec::new();
    let mut capitalization = 0u64;
    for bin in 0..number_of_bins {
        let mut bin_contributions = Vec::new();
        collect_bin(bin, &mut bin_contributions);
        bin_contributions.sort_unstable_by(|a, b| a.pubkey.as_ref().cmp(b.pubkey.as_ref()));
        for contribution in bin_contributions {
            capitalization = capitalization.saturating_add(contribution.lamports);
            leaves.push(contribution.hash);
        }
    }
    (merkle_root(&leaves), capitalization)
}

pub enum HashMode {
    /// Pick the greatest slot `<= max_slot`; zero-lamport accounts are
    /// skipped entirely.
    Full { max_slot: Slot },
    /// Pick the greatest slot strictly greater than `min_slot`;
    /// zero-lamport accounts contribute `blake3(pubkey)` instead of being
    /// skipped.
    Incremental { min_slot: Slot },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_root_is_deterministic_and_order_sensitive() {
        let a = Hash::from([1u8; 32]);
        let b = Hash::from([2u8; 32]);
        let root_ab = merkle_root(&[a, b]);
        let root_ba = merkle_root(&[b, a]);
        assert_ne!(root_ab, root_ba);
        assert_eq!(root_ab, merkle_root(&[a, b]));
    }

    #[test]
    fn empty_root_is_default() {
        assert_eq!(merkle_root(&[]), Hash::default());
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let a = Hash::from([7u8; 32]);
        assert_eq!(merkle_root(&[a]), a);
    }

    #[test]
    fn reduce_bins_sums_capitalization_and_sorts_within_bin() {
        let pk = |b: u8| Pubkey::from([b; 32]);
        let (_, cap) = reduce_bins(2, |bin, out| {
            if bin == 0 {
                out.push(Contribution {
                    pubkey: pk(2),
                    hash: Hash::default(),
                    lamports: 10,
                });
                out.push(Contribution {
                    pubkey: pk(1),
                    hash: Hash::default(),
                    lamports: 20,
                });
            }
        });
        assert_eq!(cap, 30);
    }
}
