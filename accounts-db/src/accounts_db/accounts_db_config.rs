//! Configuration surface handed in by the external CLI collaborator (§6).

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AccountsDbConfig {
    /// Base directory for snapshot archives and unpacked account files.
    pub snapshot_dir: PathBuf,
    /// If true, the index's bins and arenas are backed by the disk allocator
    /// instead of plain heap allocations.
    pub use_disk_index: bool,
    /// Power of two <= 2^24; count of index bins.
    pub number_of_index_shards: usize,
    /// Worker-pool size for the parallel snapshot parse stage.
    pub num_threads_snapshot_load: usize,
    /// Worker-pool size for the parallel tarball unpack stage.
    pub num_threads_snapshot_unpack: usize,
    /// Pre-allocation multiplier for per-worker reference arenas during
    /// snapshot load.
    pub accounts_per_file_estimate: usize,
    /// Re-unpack even if an unpacked snapshot directory is already present.
    pub force_unpack_snapshot: bool,
    /// Re-download even if a snapshot archive is already present.
    pub force_new_snapshot_download: bool,
    /// Download-retry policy: minimum acceptable transfer rate.
    pub min_snapshot_download_speed_mbs: u64,
    /// Download-retry policy: attempts before giving up.
    pub max_number_of_snapshot_download_attempts: usize,
    /// Load the previous run's saved index rather than rebuilding from the
    /// account files.
    pub fastload: bool,
    /// Persist the index to the disk allocator's backing files on shutdown
    /// so `fastload` has something to read next run.
    pub save_index: bool,
    /// Load only the manifest, skipping account-file ingest entirely.
    pub snapshot_metadata_only: bool,
}

impl Default for AccountsDbConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            snapshot_dir: PathBuf::new(),
            use_disk_index: false,
            number_of_index_shards: 8192,
            num_threads_snapshot_load: cpus,
            num_threads_snapshot_unpack: cpus,
            accounts_per_file_estimate: 1024,
            force_unpack_snapshot: false,
            force_new_snapshot_download: false,
            min_snapshot_download_speed_mbs: 10,
            max_number_of_snapshot_download_attempts: 5,
            fastload: false,
            save_index: false,
            snapshot_metadata_only: false,
        }
    }
}

pub const ACCOUNTS_DB_CONFIG_FOR_TESTING: AccountsDbConfig = AccountsDbConfig {
    snapshot_dir: PathBuf::new(),
    use_disk_index: false,
    number_of_index_shards: 4,
    num_threads_snapshot_load: 2,
    num_threads_snapshot_unpack: 2,
    accounts_per_file_estimate: 16,
    force_unpack_snapshot: false,
    force_new_snapshot_download: false,
    min_snapshot_download_speed_mbs: 10,
    max_number_of_snapshot_download_attempts: 3,
    fastload: false,
    save_index: false,
    snapshot_metadata_only: false,
};

pub const ACCOUNTS_DB_CONFIG_FOR_BENCHMARKS: AccountsDbConfig = AccountsDbConfig {
    snapshot_dir: PathBuf::new(),
    use_disk_index: true,
    number_of_index_shards: 8192,
    num_threads_snapshot_load: 32,
    num_threads_snapshot_unpack: 32,
    accounts_per_file_estimate: 2048,
    force_unpack_snapshot: false,
    force_new_snapshot_download: false,
    min_snapshot_download_speed_mbs: 10,
    max_number_of_snapshot_download_attempts: 3,
    fastload: true,
    save_index: true,
    snapshot_metadata_only: false,
};
