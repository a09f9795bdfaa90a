//! SSTable builder, reader, and iterator.
//!
//! # On-disk layout (little-endian)
//!
//! ```text
//! [ block_1 ][ block_2 ]...[ block_k ]
//! [ index: per block, in order:
//!     u32 ksize; user_key; u64 seq; u8 type;          <- largest key of the block
//!     u64 block_offset; u64 block_size; u64 block_count ]
//! [ u32 bf_size; bloom_filter bytes ]
//! [ u32 sksize; smallest_user_key; u64 seq; u8 type ]
//! [ u32 lksize; largest_user_key;  u64 seq; u8 type ]
//! ```
//!
//! `index_offset`, `bloom_filter_offset`, `size`, `count`, and `sst_id`
//! live in an [`SstInfo`] sidecar written next to the file (suffix
//! `.info`, CRC32 trailer). The table bytes themselves carry no checksums;
//! integrity of the metadata needed to interpret them is covered by the
//! sidecar.
//!
//! # Concurrency
//!
//! SSTables are immutable once written. Readers share them via
//! `Arc<SSTable>`; a remove tag set by compaction causes the file (and its
//! sidecar) to be unlinked when the last reference is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use tracing::{trace, warn};

use crate::bloom;
use crate::encoding;
use crate::lsm::block::{BlockBuilder, BlockIterator};
use crate::lsm::format::{
    BlockHandle, GetResult, IndexEntry, InternalKey, Record, RecordType, SeqNum, SstInfo,
};
use crate::lsm::LsmError;

/// Path of the metadata sidecar for an SSTable file.
pub fn sidecar_path(sst_path: &Path) -> PathBuf {
    let mut os = sst_path.as_os_str().to_owned();
    os.push(".info");
    PathBuf::from(os)
}

// ------------------------------------------------------------------------------------------------
// Sidecar I/O
// ------------------------------------------------------------------------------------------------

/// Writes the sidecar: encoded [`SstInfo`] followed by a CRC32 trailer.
pub fn store_sidecar(info: &SstInfo) -> Result<(), LsmError> {
    let bytes = encoding::encode_to_vec(info)?;
    let mut hasher = Crc32::new();
    hasher.update(&bytes);
    let crc = hasher.finalize();

    let mut file = File::create(sidecar_path(&info.path))?;
    file.write_all(&bytes)?;
    file.write_all(&crc.to_le_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Reads and verifies a sidecar. A checksum or decode failure is
/// [`LsmError::Corruption`].
pub fn load_sidecar(sst_path: &Path) -> Result<SstInfo, LsmError> {
    let bytes = fs::read(sidecar_path(sst_path))?;
    if bytes.len() < 4 {
        return Err(LsmError::Corruption("sidecar shorter than its trailer".into()));
    }
    let (payload, trailer) = bytes.split_at(bytes.len() - 4);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);

    let mut hasher = Crc32::new();
    hasher.update(payload);
    if hasher.finalize() != stored {
        return Err(LsmError::Corruption("sidecar checksum mismatch".into()));
    }

    let (info, _) = encoding::decode_from_slice::<SstInfo>(payload)?;
    Ok(info)
}

// ------------------------------------------------------------------------------------------------
// SstBuilder
// ------------------------------------------------------------------------------------------------

/// Streams internal-key-ordered records into a complete SSTable file.
///
/// Input must be sorted by internal key (user key ascending, sequence
/// descending within a key). The builder is written to `<path>.tmp` and
/// renamed on [`finish`](Self::finish), so a crash cannot leave a
/// half-written table under the final name.
pub struct SstBuilder {
    writer: BufWriter<File>,
    path: PathBuf,
    tmp_path: PathBuf,
    sst_id: u64,
    block_size: usize,
    bloom_bits_per_key: usize,

    block: BlockBuilder,
    index: Vec<IndexEntry>,
    key_hashes: Vec<u64>,
    smallest: Option<InternalKey>,
    largest: Option<InternalKey>,
    block_last_key: Option<InternalKey>,
    count: u64,
    current_offset: u64,
}

impl SstBuilder {
    pub fn new(
        path: impl Into<PathBuf>,
        sst_id: u64,
        block_size: usize,
        bloom_bits_per_key: usize,
    ) -> Result<Self, LsmError> {
        let path = path.into();
        let tmp_path = path.with_extension("tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            tmp_path,
            sst_id,
            block_size,
            bloom_bits_per_key,
            block: BlockBuilder::new(block_size),
            index: Vec::new(),
            key_hashes: Vec::new(),
            smallest: None,
            largest: None,
            block_last_key: None,
            count: 0,
            current_offset: 0,
        })
    }

    /// Appends one record. When the current block rejects it, the block is
    /// flushed (recording its index entry) and a fresh block takes the
    /// record.
    pub fn append(&mut self, key: InternalKey, value: &[u8]) -> Result<(), LsmError> {
        if !self.block.append(&key.user_key, key.seq, key.ty, value) {
            self.flush_block()?;
            if !self.block.append(&key.user_key, key.seq, key.ty, value) {
                // A fresh block accepts any first record.
                return Err(LsmError::Internal(
                    "empty block rejected a record".into(),
                ));
            }
        }

        if self.smallest.is_none() {
            self.smallest = Some(key.clone());
        }
        // Largest by user key ascending; within one user key the smaller
        // sequence sorts later, so it wins the tie.
        let supersedes = match &self.largest {
            None => true,
            Some(largest) => {
                key.user_key > largest.user_key
                    || (key.user_key == largest.user_key && key.seq < largest.seq)
            }
        };
        if supersedes {
            self.largest = Some(key.clone());
        }

        self.key_hashes.push(bloom::bloom_hash(&key.user_key));
        self.block_last_key = Some(key);
        self.count += 1;
        Ok(())
    }

    /// Number of records appended so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Bytes of finished blocks plus the current partial block.
    pub fn estimated_size(&self) -> u64 {
        self.current_offset + self.block.size() as u64
    }

    fn flush_block(&mut self) -> Result<(), LsmError> {
        if self.block.is_empty() {
            return Ok(());
        }
        let block = std::mem::replace(&mut self.block, BlockBuilder::new(self.block_size));
        let count = block.count() as u64;
        let bytes = block.finish();

        let key = self
            .block_last_key
            .take()
            .ok_or_else(|| LsmError::Internal("non-empty block without a last key".into()))?;
        self.index.push(IndexEntry {
            key,
            handle: BlockHandle {
                offset: self.current_offset,
                size: bytes.len() as u64,
                count,
            },
        });

        self.writer.write_all(&bytes)?;
        self.current_offset += bytes.len() as u64;
        Ok(())
    }

    /// Flushes the last block, writes index, bloom filter, and bounds,
    /// renames the file into place, and stores the sidecar.
    pub fn finish(mut self) -> Result<SstInfo, LsmError> {
        self.flush_block()?;

        let (smallest, largest) = match (self.smallest.take(), self.largest.take()) {
            (Some(s), Some(l)) => (s, l),
            _ => return Err(LsmError::Internal("cannot finish an empty SSTable".into())),
        };

        let index_offset = self.current_offset;
        let mut trailer = Vec::new();
        for entry in &self.index {
            encode_key_into(&entry.key, &mut trailer);
            trailer.extend_from_slice(&entry.handle.offset.to_le_bytes());
            trailer.extend_from_slice(&entry.handle.size.to_le_bytes());
            trailer.extend_from_slice(&entry.handle.count.to_le_bytes());
        }
        let bloom_filter_offset = index_offset + trailer.len() as u64;

        let mut filter = bloom::create(self.key_hashes.len(), self.bloom_bits_per_key);
        for hash in &self.key_hashes {
            bloom::add(*hash, &mut filter);
        }
        trailer.extend_from_slice(&(filter.len() as u32).to_le_bytes());
        trailer.extend_from_slice(&filter);

        encode_key_into(&smallest, &mut trailer);
        encode_key_into(&largest, &mut trailer);

        self.writer.write_all(&trailer)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        drop(self.writer);

        fs::rename(&self.tmp_path, &self.path)?;

        let info = SstInfo {
            size: self.current_offset + trailer.len() as u64,
            count: self.count,
            sst_id: self.sst_id,
            index_offset,
            bloom_filter_offset,
            path: self.path,
        };
        store_sidecar(&info)?;

        trace!(
            sst_id = info.sst_id,
            size = info.size,
            count = info.count,
            blocks = self.index.len(),
            "finished SSTable"
        );
        Ok(info)
    }
}

fn encode_key_into(key: &InternalKey, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(key.user_key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&key.user_key);
    buf.extend_from_slice(&key.seq.to_le_bytes());
    buf.push(key.ty as u8);
}

// ------------------------------------------------------------------------------------------------
// SSTable — immutable reader
// ------------------------------------------------------------------------------------------------

/// A memory-mapped, immutable SSTable.
pub struct SSTable {
    info: SstInfo,
    mmap: Mmap,
    index: Vec<IndexEntry>,
    bloom: Vec<u8>,
    smallest: InternalKey,
    largest: InternalKey,
    remove_tag: AtomicBool,
}

impl SSTable {
    /// Opens the file described by `info`, decoding the index, bloom
    /// filter, and key bounds from `index_offset` onward.
    ///
    /// Structural mismatches (wrong file size, truncated index, bloom
    /// length out of range) are [`LsmError::Corruption`].
    pub fn open(info: SstInfo) -> Result<Self, LsmError> {
        let file = File::open(&info.path)?;
        // Safety: the file is immutable once renamed into place and the
        // map is read-only.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() as u64 != info.size {
            return Err(LsmError::Corruption(format!(
                "SSTable size mismatch: sidecar says {}, file has {}",
                info.size,
                mmap.len()
            )));
        }
        if info.index_offset > info.bloom_filter_offset || info.bloom_filter_offset > info.size {
            return Err(LsmError::Corruption("SSTable offsets out of order".into()));
        }

        let mut cursor = info.index_offset as usize;
        let mut index = Vec::new();
        while (cursor as u64) < info.bloom_filter_offset {
            let key = decode_key_at(&mmap, &mut cursor)?;
            let offset = decode_u64_at(&mmap, &mut cursor)?;
            let size = decode_u64_at(&mmap, &mut cursor)?;
            let count = decode_u64_at(&mmap, &mut cursor)?;
            index.push(IndexEntry {
                key,
                handle: BlockHandle {
                    offset,
                    size,
                    count,
                },
            });
        }

        let bf_size = decode_u32_at(&mmap, &mut cursor)? as usize;
        let bloom = mmap
            .get(cursor..cursor + bf_size)
            .ok_or_else(|| LsmError::Corruption("bloom filter size mismatch".into()))?
            .to_vec();
        cursor += bf_size;

        let smallest = decode_key_at(&mmap, &mut cursor)?;
        let largest = decode_key_at(&mmap, &mut cursor)?;

        Ok(Self {
            info,
            mmap,
            index,
            bloom,
            smallest,
            largest,
            remove_tag: AtomicBool::new(false),
        })
    }

    pub fn info(&self) -> &SstInfo {
        &self.info
    }

    pub fn smallest(&self) -> &InternalKey {
        &self.smallest
    }

    pub fn largest(&self) -> &InternalKey {
        &self.largest
    }

    /// Marks the file (and sidecar) for deletion when the last reference
    /// is dropped.
    pub fn set_remove_tag(&self, remove: bool) {
        self.remove_tag.store(remove, Ordering::Release);
    }

    /// Point lookup for the newest record of `user_key` with sequence
    /// ≤ `seq`.
    pub fn get(&self, user_key: &[u8], seq: SeqNum) -> Result<GetResult, LsmError> {
        if !bloom::may_contain(user_key, &self.bloom) {
            return Ok(GetResult::NotFound);
        }
        if self.index.is_empty() {
            return Ok(GetResult::NotFound);
        }

        // First block whose largest key is ≥ the lookup target.
        let target_block = self
            .index
            .partition_point(|e| e.key.cmp_parts(user_key, seq, RecordType::Value).is_lt());
        if target_block == self.index.len() {
            return Ok(GetResult::NotFound);
        }

        // When the user key straddles the previous block boundary, the
        // previous block holds the newer versions — probe it first.
        if target_block > 0 && self.index[target_block - 1].key.user_key == user_key {
            let result = self.scan_block_for(target_block - 1, user_key, seq)?;
            if result != GetResult::NotFound {
                return Ok(result);
            }
        }

        self.scan_block_for(target_block, user_key, seq)
    }

    fn scan_block_for(
        &self,
        block_idx: usize,
        user_key: &[u8],
        seq: SeqNum,
    ) -> Result<GetResult, LsmError> {
        let (data, count) = self.block_region(block_idx)?;

        let mut iter = BlockIterator::new(data, count);
        while iter.valid() {
            let Some(rec) = iter.current() else {
                return Err(LsmError::Corruption(format!(
                    "malformed record in block {block_idx} of {:?}",
                    self.info.path
                )));
            };
            if rec.user_key > user_key {
                break;
            }
            if rec.user_key == user_key && rec.seq <= seq {
                // Records within one user key are ordered newest-first,
                // so the first visible record decides.
                return Ok(match rec.ty {
                    RecordType::Value => GetResult::Found(rec.value.to_vec()),
                    RecordType::Deletion => GetResult::Deleted,
                });
            }
            iter.next();
        }
        Ok(GetResult::NotFound)
    }

    /// Bytes and record count of one block, for [`BlockIterator`].
    fn block_region(&self, block_idx: usize) -> Result<(&[u8], usize), LsmError> {
        let handle = &self.index[block_idx].handle;
        let start = handle.offset as usize;
        let end = start + handle.size as usize;
        let data = self
            .mmap
            .get(start..end)
            .ok_or_else(|| LsmError::Corruption("block handle out of range".into()))?;
        Ok((data, handle.count as usize))
    }

    /// Iterator over the whole table in internal-key order.
    pub fn iter(self: &Arc<Self>) -> SstIterator {
        SstIterator {
            sst: Arc::clone(self),
            block_idx: 0,
            pos: 0,
        }
    }

    /// Iterator positioned at the first record ≥ `(user_key, seq, Value)`.
    pub fn seek(self: &Arc<Self>, user_key: &[u8], seq: SeqNum) -> SstIterator {
        let block_idx = self
            .index
            .partition_point(|e| e.key.cmp_parts(user_key, seq, RecordType::Value).is_lt());
        let mut iter = SstIterator {
            sst: Arc::clone(self),
            block_idx,
            pos: 0,
        };
        iter.skip_until(user_key, seq);
        iter
    }
}

impl Drop for SSTable {
    fn drop(&mut self) {
        if self.remove_tag.load(Ordering::Acquire) {
            trace!(sst_id = self.info.sst_id, path = ?self.info.path, "unlinking retired SSTable");
            if let Err(e) = fs::remove_file(&self.info.path) {
                warn!(path = ?self.info.path, %e, "failed to unlink retired SSTable");
            }
            if let Err(e) = fs::remove_file(sidecar_path(&self.info.path)) {
                warn!(path = ?self.info.path, %e, "failed to unlink SSTable sidecar");
            }
        }
    }
}

fn decode_key_at(mmap: &Mmap, cursor: &mut usize) -> Result<InternalKey, LsmError> {
    let ksize = decode_u32_at(mmap, cursor)? as usize;
    let user_key = mmap
        .get(*cursor..*cursor + ksize)
        .ok_or_else(|| LsmError::Corruption("truncated key".into()))?
        .to_vec();
    *cursor += ksize;
    let seq = decode_u64_at(mmap, cursor)?;
    let ty_byte = *mmap
        .get(*cursor)
        .ok_or_else(|| LsmError::Corruption("truncated record type".into()))?;
    *cursor += 1;
    let ty = RecordType::from_u8(ty_byte)
        .ok_or_else(|| LsmError::Corruption(format!("invalid record type byte {ty_byte}")))?;
    Ok(InternalKey { user_key, seq, ty })
}

fn decode_u32_at(mmap: &Mmap, cursor: &mut usize) -> Result<u32, LsmError> {
    let bytes = mmap
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| LsmError::Corruption("truncated u32".into()))?;
    *cursor += 4;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn decode_u64_at(mmap: &Mmap, cursor: &mut usize) -> Result<u64, LsmError> {
    let bytes = mmap
        .get(*cursor..*cursor + 8)
        .ok_or_else(|| LsmError::Corruption("truncated u64".into()))?;
    *cursor += 8;
    Ok(u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

// ------------------------------------------------------------------------------------------------
// SstIterator
// ------------------------------------------------------------------------------------------------

/// Owning iterator over one SSTable, advancing across block boundaries.
pub struct SstIterator {
    sst: Arc<SSTable>,
    block_idx: usize,
    pos: usize,
}

impl SstIterator {
    fn skip_until(&mut self, user_key: &[u8], seq: SeqNum) {
        self.pos = 0;
        while self.block_idx < self.sst.index.len() {
            let Ok((data, count)) = self.sst.block_region(self.block_idx) else {
                self.block_idx = self.sst.index.len();
                return;
            };
            let mut iter = BlockIterator::new(data, count);
            iter.seek(user_key, seq);
            if iter.valid() {
                self.pos = iter.pos();
                return;
            }
            self.block_idx += 1;
        }
    }
}

impl Iterator for SstIterator {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if self.block_idx >= self.sst.index.len() {
                return None;
            }
            let (data, count) = self.sst.block_region(self.block_idx).ok()?;
            let mut iter = BlockIterator::at(data, count, self.pos);
            if !iter.valid() {
                self.block_idx += 1;
                self.pos = 0;
                continue;
            }
            let rec = iter.current()?;
            let record = Record {
                key: InternalKey::new(rec.user_key.to_vec(), rec.seq, rec.ty),
                value: rec.value.to_vec(),
            };
            iter.next();
            self.pos = iter.pos();
            return Some(record);
        }
    }
}
