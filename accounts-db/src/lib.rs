//! A content-addressed, append-only account storage engine: an on-disk
//! codec for batches of accounts ("AppendVec"), a sharded open-addressed
//! index over version chains, a write-back cache, a file map, a parallel
//! snapshot loader/generator, and the flush/clean/shrink/delete
//! maintenance loop that keeps it all bounded.

pub mod account_info;
pub mod account_storage_entry;
pub mod accounts_cache;
pub mod accounts_db;
pub mod accounts_hash;
pub mod accounts_index;
pub mod append_vec;
pub mod error;
pub mod file_map;
pub mod measure;
pub mod pubkey_bins;
pub mod snapshot;

pub use {
    account_info::{AccountRef, AccountsFileId, Location, NodeRef},
    accounts_db::{accounts_db_config::AccountsDbConfig, AccountsDb, MaintenanceReport},
    error::{AccountsFileError, LookupError, SnapshotLoadError},
    snapshot::{LoadedSnapshot, SnapshotGenerator, SnapshotManifest},
};
