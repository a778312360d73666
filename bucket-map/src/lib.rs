//! Low-level building blocks shared by the account storage engine: a
//! disk-backed allocator for oversized, file-mmap'd regions, and a
//! SIMD-friendly open-addressed map specialized for 32-byte keys.

mod bucket_table;
mod disk_alloc;

pub use bucket_table::{hash_pubkey, BucketTable, GROUP_SIZE};
pub use disk_alloc::{DiskAllocError, DiskAllocator, DiskBlock};
