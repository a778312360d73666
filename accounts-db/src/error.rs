//! Error taxonomy, grouped per the storage engine's error-handling design:
//! not-found, transient race, input corruption, configuration violation,
//! and invariant violation (the last is fatal and is not represented as a
//! `Result` — callers are expected to abort the process).

use {crate::account_info::AccountsFileId, solana_clock::Slot, std::path::PathBuf, thiserror::Error};

/// Errors reading or writing an individual account file.
#[derive(Debug, Error)]
pub enum AccountsFileError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("account file {path:?} declares length {declared} but is only {actual} bytes")]
    InvalidAccountFileLength {
        path: PathBuf,
        declared: usize,
        actual: usize,
    },
    #[error("record at offset {offset} is not a valid record boundary")]
    InvalidRecordOffset { offset: usize },
    #[error("account data length {0} exceeds MAX_PERMITTED_DATA_LENGTH")]
    DataTooLong(usize),
    #[error("file has no room for {needed} bytes (capacity {capacity})")]
    OutOfSpace { needed: usize, capacity: usize },
    #[error("file scan ended at {actual_end}, expected {expected_end}")]
    TrailingGarbage {
        expected_end: usize,
        actual_end: usize,
    },
}

/// Not-found / transient-race errors surfaced to callers; the engine
/// remains valid after any of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("pubkey not present in the account index")]
    PubkeyNotInIndex,
    #[error("slot {0} not found")]
    SlotNotFound(Slot),
    #[error("file id {0:?} not found in the file map")]
    FileIdNotFound(AccountsFileId),
    #[error("account file was observed empty mid-read")]
    AccountFileEmpty,
    #[error("reference memory for slot {0} not found")]
    MemoryNotFound(Slot),
}

/// Errors surfaced during snapshot load; any of these tears the load down.
#[derive(Debug, Error)]
pub enum SnapshotLoadError {
    #[error(transparent)]
    AccountsFile(#[from] AccountsFileError),
    #[error("bincode error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "computed account hash does not match manifest (expected {expected}, got {actual})"
    )]
    IncorrectAccountsHash {
        expected: solana_hash::Hash,
        actual: solana_hash::Hash,
    },
    #[error("computed total lamports {actual} does not match manifest capitalization {expected}")]
    IncorrectTotalLamports { expected: u64, actual: u64 },
    #[error(
        "computed incremental lamports {actual} does not match manifest value {expected}"
    )]
    IncorrectIncrementalLamports { expected: u64, actual: u64 },
    #[error("incremental accounts delta hash mismatch")]
    IncorrectAccountsDeltaHash,
    #[error("worker bin count {workers} does not match merged index bin count {merged}")]
    BinCountMismatch { workers: usize, merged: usize },
    #[error(
        "worker ran out of pre-allocated reference memory ({allocated} nodes for {files} files)"
    )]
    OutOfReferenceMemory { allocated: usize, files: usize },
    #[error("manifest referenced file {slot}.{id} which was not found on disk")]
    MissingAccountFile { slot: Slot, id: u64 },
}
