//! A disk-memory allocator: arbitrarily large aligned allocations backed by
//! memory-mapped files, used to place the account index and per-slot
//! reference arenas on disk when they do not fit comfortably in RAM.

use {
    memmap2::MmapMut,
    std::{
        fs::OpenOptions,
        io,
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicU64, Ordering},
            Mutex,
        },
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum DiskAllocError {
    #[error("io error creating backing file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn page_size() -> usize {
    4096
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// One allocation backed by its own file. Dropping it unmaps the memory but
/// leaves the backing file on disk; the file is only unlinked when the
/// owning [`DiskAllocator`] is torn down.
pub struct DiskBlock {
    mmap: MmapMut,
}

impl DiskBlock {
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// A reusable allocator whose backing store is a sequence of files
/// `<path>_<N>`, `N` monotonically increasing. `resize` is intentionally
/// unsupported: callers that need growth must allocate a new block and
/// migrate their contents.
pub struct DiskAllocator {
    base_path: PathBuf,
    next_id: AtomicU64,
    // Guards file creation so two threads never race on the same `<path>_<N>`.
    create_lock: Mutex<()>,
    live_paths: Mutex<Vec<PathBuf>>,
}

impl DiskAllocator {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            next_id: AtomicU64::new(0),
            create_lock: Mutex::new(()),
            live_paths: Mutex::new(Vec::new()),
        }
    }

    /// Create a new file-backed allocation of at least `size` bytes, rounded
    /// up to the next page boundary, and mmap it read/write.
    ///
    /// `align` is accepted for API symmetry with an in-memory allocator, but
    /// mmap'd pages are always page-aligned, which satisfies every alignment
    /// this engine ever requests (<= page size).
    pub fn alloc(&self, size: usize, _align: usize) -> Result<DiskBlock, DiskAllocError> {
        let _guard = self.create_lock.lock().unwrap();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = self.path_for(id);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| DiskAllocError::Io {
                path: path.clone(),
                source,
            })?;

        let rounded = align_up(size.max(1), page_size());
        file.set_len(rounded as u64)
            .map_err(|source| DiskAllocError::Io {
                path: path.clone(),
                source,
            })?;

        // SAFETY: the file was just created by us and sized above; no other
        // process holds it open concurrently.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| DiskAllocError::Io {
            path: path.clone(),
            source,
        })?;

        self.live_paths.lock().unwrap().push(path);
        Ok(DiskBlock { mmap })
    }

    /// Unmap `block`. The backing file remains on disk until this allocator
    /// is dropped.
    pub fn free(&self, block: DiskBlock) {
        drop(block);
    }

    fn path_for(&self, id: u64) -> PathBuf {
        let file_name = format!(
            "{}_{id}",
            self.base_path.file_name().unwrap_or_default().to_string_lossy()
        );
        let mut path = self.base_path.clone();
        path.set_file_name(file_name);
        path
    }

    fn dir(&self) -> &Path {
        self.base_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

impl Drop for DiskAllocator {
    fn drop(&mut self) {
        for path in self.live_paths.lock().unwrap().drain(..) {
            if let Err(err) = std::fs::remove_file(&path) {
                log::warn!("failed to remove disk-allocator backing file {path:?}: {err}");
            }
        }
        let _ = self.dir();
    }
}
