//! The on-disk account-file ("AppendVec") codec: read/write the fixed
//! layout of a batch of accounts flushed for one slot, iterate and
//! validate it, and address into it by byte offset.

use {
    crate::{account_info::Offset, error::AccountsFileError},
    memmap2::{MmapMut, MmapOptions},
    solana_account::AccountSharedData,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::{
        fs::{File, OpenOptions},
        io::Write,
        path::{Path, PathBuf},
    },
};

/// Accounts whose `data` exceeds this are rejected; matches the limit the
/// runtime enforces on writes (10 MiB).
pub const MAX_PERMITTED_DATA_LENGTH: usize = 10 * 1024 * 1024;

/// `write_version (u64) + data_len (u64) + pubkey (32) + owner (32) +
/// lamports (u64) + rent_epoch (u64) + executable (u8) + hash (32)`.
pub const STATIC_RECORD_SIZE: usize = 8 + 8 + 32 + 32 + 8 + 8 + 1 + 32;

static_assertions::const_assert_eq!(STATIC_RECORD_SIZE, 129);

#[inline]
pub fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[inline]
pub fn padded_record_size(data_len: usize) -> usize {
    align_up(STATIC_RECORD_SIZE + data_len, 8)
}

/// A zero-copy view into one record's bytes.
pub struct StoredAccountView<'a> {
    pub write_version: u64,
    pub pubkey: Pubkey,
    pub owner: Pubkey,
    pub lamports: u64,
    pub rent_epoch: u64,
    pub executable: bool,
    pub hash: Hash,
    pub data: &'a [u8],
}

impl<'a> StoredAccountView<'a> {
    pub fn stored_size(&self) -> usize {
        padded_record_size(self.data.len())
    }

    pub fn to_account_shared_data(&self) -> AccountSharedData {
        AccountSharedData::create(
            self.lamports,
            self.data.to_vec(),
            self.owner,
            self.executable,
            self.rent_epoch,
        )
    }
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(b)
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_pubkey(buf: &[u8], offset: usize) -> Pubkey {
    let mut b = [0u8; 32];
    b.copy_from_slice(&buf[offset..offset + 32]);
    Pubkey::from(b)
}

/// Parse a record's fixed-size header & body at `offset`, without copying
/// `data`. Returns `None` if `offset` isn't 8-byte aligned or the record
/// does not fit within `limit`.
fn parse_record(buf: &[u8], offset: usize, limit: usize) -> Option<StoredAccountView<'_>> {
    if offset % 8 != 0 {
        return None;
    }
    if offset.checked_add(STATIC_RECORD_SIZE)? > limit {
        return None;
    }
    let write_version = read_u64(buf, offset);
    let data_len = read_u64(buf, offset + 8) as usize;
    if data_len > MAX_PERMITTED_DATA_LENGTH {
        return None;
    }
    let pubkey = read_pubkey(buf, offset + 16);
    let owner = read_pubkey(buf, offset + 48);
    let lamports = read_u64(buf, offset + 80);
    let rent_epoch = read_u64(buf, offset + 88);
    let executable = buf[offset + 96] != 0;
    let mut hash_bytes = [0u8; 32];
    hash_bytes.copy_from_slice(&buf[offset + 97..offset + 129]);
    let hash = Hash::from(hash_bytes);

    let data_start = offset + STATIC_RECORD_SIZE;
    let data_end = data_start.checked_add(data_len)?;
    if data_end > limit {
        return None;
    }
    let data = &buf[data_start..data_end];

    Some(StoredAccountView {
        write_version,
        pubkey,
        owner,
        lamports,
        rent_epoch,
        executable,
        hash,
        data,
    })
}

/// The immutable-after-flush, memory-mapped container for one slot's batch
/// of accounts.
pub struct AccountsFile {
    path: PathBuf,
    mmap: MmapMut,
    /// Bytes actually written; may be less than `mmap.len()` if the backing
    /// file was preallocated larger than its final content.
    length: usize,
}

impl AccountsFile {
    pub fn file_name(slot: solana_clock::Slot, id: crate::account_info::AccountsFileId) -> String {
        format!("{slot}.{}", id.as_u64())
    }

    /// Create a brand-new, writable account file sized to hold `capacity`
    /// bytes.
    pub fn create_new(path: &Path, capacity: usize) -> Result<Self, AccountsFileError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| AccountsFileError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let capacity = capacity.max(8);
        file.set_len(capacity as u64)
            .map_err(|source| AccountsFileError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        // SAFETY: file was just created by this process and sized above.
        let mmap = unsafe { MmapOptions::new().map_mut(&file) }.map_err(|source| {
            AccountsFileError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            length: 0,
        })
    }

    /// `open(file, {id,length}, slot)`: mmap an existing file read/write,
    /// retaining its already-declared `length`. Fails if the file is
    /// shorter than `length`.
    pub fn open_existing(path: &Path, length: usize) -> Result<Self, AccountsFileError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| AccountsFileError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let actual_len = file
            .metadata()
            .map_err(|source| AccountsFileError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len() as usize;
        if actual_len < length {
            return Err(AccountsFileError::InvalidAccountFileLength {
                path: path.to_path_buf(),
                declared: length,
                actual: actual_len,
            });
        }
        // SAFETY: file is opened above and not concurrently truncated by us.
        let mmap = unsafe { MmapOptions::new().map_mut(&file) }.map_err(|source| {
            AccountsFileError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            length,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn capacity(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Append one account record starting at the current end of the file.
    /// Returns the byte offset the record was written at.
    pub fn append_account(
        &mut self,
        write_version: u64,
        pubkey: &Pubkey,
        owner: &Pubkey,
        lamports: u64,
        rent_epoch: u64,
        executable: bool,
        hash: &Hash,
        data: &[u8],
    ) -> Result<Offset, AccountsFileError> {
        if data.len() > MAX_PERMITTED_DATA_LENGTH {
            return Err(AccountsFileError::DataTooLong(data.len()));
        }
        let offset = self.length;
        let record_len = padded_record_size(data.len());
        if offset + record_len > self.mmap.len() {
            return Err(AccountsFileError::OutOfSpace {
                needed: offset + record_len,
                capacity: self.mmap.len(),
            });
        }
        let buf = &mut self.mmap[..];
        write_u64(buf, offset, write_version);
        write_u64(buf, offset + 8, data.len() as u64);
        buf[offset + 16..offset + 48].copy_from_slice(pubkey.as_ref());
        buf[offset + 48..offset + 80].copy_from_slice(owner.as_ref());
        write_u64(buf, offset + 80, lamports);
        write_u64(buf, offset + 88, rent_epoch);
        buf[offset + 96] = executable as u8;
        buf[offset + 97..offset + 129].copy_from_slice(hash.as_ref());
        let data_start = offset + STATIC_RECORD_SIZE;
        buf[data_start..data_start + data.len()].copy_from_slice(data);
        for b in &mut buf[data_start + data.len()..offset + record_len] {
            *b = 0;
        }
        self.length = offset + record_len;
        Ok(offset)
    }

    pub fn flush(&self) -> Result<(), AccountsFileError> {
        self.mmap
            .flush()
            .map_err(|source| AccountsFileError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Return a view into the record at `offset`, without copying `data`.
    pub fn read_account(&self, offset: Offset) -> Result<StoredAccountView<'_>, AccountsFileError> {
        parse_record(&self.mmap[..], offset, self.length)
            .ok_or(AccountsFileError::InvalidRecordOffset { offset })
    }

    /// Iterate every record from offset 0.
    pub fn iter(&self) -> AccountsFileIter<'_> {
        AccountsFileIter {
            file: self,
            offset: 0,
        }
    }

    /// Validate the file end-to-end per the codec contract: every record
    /// must fit, have a sane `data_len`, and the scan must land exactly on
    /// `align_up(length, 8)`.
    pub fn validate(&self) -> Result<(), AccountsFileError> {
        let mut offset = 0usize;
        while offset < self.length {
            let view = parse_record(&self.mmap[..], offset, self.length)
                .ok_or(AccountsFileError::InvalidRecordOffset { offset })?;
            offset += view.stored_size();
        }
        if offset != align_up(self.length, 8) {
            return Err(AccountsFileError::TrailingGarbage {
                expected_end: align_up(self.length, 8),
                actual_end: offset,
            });
        }
        Ok(())
    }

    /// One-pass scan filling `number_of_accounts` and `alive_bytes`;
    /// `dead_bytes` always starts at zero for a freshly flushed/loaded file.
    pub fn populate_metadata(&self) -> (usize, usize) {
        let mut number_of_accounts = 0usize;
        let mut alive_bytes = 0usize;
        for view in self.iter() {
            number_of_accounts += 1;
            alive_bytes += view.stored_size();
        }
        (number_of_accounts, alive_bytes)
    }

    pub fn calculate_stored_size(&self, data_len: usize) -> usize {
        padded_record_size(data_len)
    }
}

pub struct AccountsFileIter<'a> {
    file: &'a AccountsFile,
    offset: usize,
}

impl<'a> Iterator for AccountsFileIter<'a> {
    type Item = (Offset, StoredAccountView<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.file.length {
            return None;
        }
        let offset = self.offset;
        let view = parse_record(&self.file.mmap[..], offset, self.file.length)?;
        self.offset += view.stored_size();
        Some((offset, view))
    }
}

/// Flush one in-order batch of accounts into a freshly created file, and
/// return the offsets each account landed at (in input order).
pub fn write_batch(
    path: &Path,
    write_version_start: u64,
    pubkeys: &[Pubkey],
    owners: &[Pubkey],
    lamports: &[u64],
    rent_epochs: &[u64],
    executables: &[bool],
    hashes: &[Hash],
    datas: &[Vec<u8>],
) -> Result<(AccountsFile, Vec<Offset>), AccountsFileError> {
    let total: usize = datas.iter().map(|d| padded_record_size(d.len())).sum();
    let mut file = AccountsFile::create_new(path, total)?;
    let mut offsets = Vec::with_capacity(pubkeys.len());
    for i in 0..pubkeys.len() {
        let offset = file.append_account(
            write_version_start + i as u64,
            &pubkeys[i],
            &owners[i],
            lamports[i],
            rent_epochs[i],
            executables[i],
            &hashes[i],
            &datas[i],
        )?;
        offsets.push(offset);
    }
    file.flush()?;
    Ok((file, offsets))
}

/// `<slot>.<id>` as used both inside the unpacked snapshot and for files
/// this engine flushes itself.
pub fn parse_file_name(name: &str) -> Option<(solana_clock::Slot, u64)> {
    let mut parts = name.splitn(2, '.');
    let slot = parts.next()?.parse().ok()?;
    let id = parts.next()?.parse().ok()?;
    Some((slot, id))
}

#[allow(dead_code)]
fn touch(_: &File) {}
