//! Fixed-size data blocks.
//!
//! A block is a contiguous byte region holding encoded records followed by
//! a `u32` offset array (one entry per record, giving each record's start
//! offset). The offset array is counted against the block's target size:
//! appending a record costs its encoded bytes plus one `u32` slot.
//!
//! The first record of an empty block is always accepted, so a record
//! larger than the target size still lands in a (oversized) block of its
//! own rather than being rejected forever.

use crate::lsm::format::{internal_cmp, RecordType, SeqNum};

// ------------------------------------------------------------------------------------------------
// Record parsing
// ------------------------------------------------------------------------------------------------

/// A record parsed in place from block bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRecord<'a> {
    pub user_key: &'a [u8],
    pub seq: SeqNum,
    pub ty: RecordType,
    pub value: &'a [u8],
}

/// Parses the record starting at `pos` within `data`, returning the record
/// and the offset of the next one. `None` on truncated or malformed bytes.
fn parse_record(data: &[u8], pos: usize) -> Option<(ParsedRecord<'_>, usize)> {
    let mut cur = pos;

    let ksize = read_u32(data, cur)? as usize;
    cur += 4;
    let user_key = data.get(cur..cur + ksize)?;
    cur += ksize;

    let seq = read_u64(data, cur)?;
    cur += 8;
    let ty = RecordType::from_u8(*data.get(cur)?)?;
    cur += 1;

    let vsize = read_u32(data, cur)? as usize;
    cur += 4;
    let value = data.get(cur..cur + vsize)?;
    cur += vsize;

    Some((
        ParsedRecord {
            user_key,
            seq,
            ty,
            value,
        },
        cur,
    ))
}

fn read_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(data: &[u8], pos: usize) -> Option<u64> {
    data.get(pos..pos + 8)
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

// ------------------------------------------------------------------------------------------------
// BlockBuilder
// ------------------------------------------------------------------------------------------------

/// Accumulates records into one block.
pub struct BlockBuilder {
    buf: Vec<u8>,
    offsets: Vec<u32>,
    block_size: usize,
}

impl BlockBuilder {
    pub fn new(block_size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(block_size),
            offsets: Vec::new(),
            block_size,
        }
    }

    /// Appends one record, returning `false` when the block is full.
    ///
    /// Fullness counts the record's encoded bytes plus its `u32` slot in
    /// the trailing offset array; an empty block accepts any record.
    pub fn append(&mut self, user_key: &[u8], seq: SeqNum, ty: RecordType, value: &[u8]) -> bool {
        let record_len = 4 + user_key.len() + 8 + 1 + 4 + value.len();
        let used = self.buf.len() + self.offsets.len() * 4;
        if !self.offsets.is_empty() && used + record_len + 4 > self.block_size {
            return false;
        }

        self.offsets.push(self.buf.len() as u32);
        self.buf.extend_from_slice(&(user_key.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(user_key);
        self.buf.extend_from_slice(&seq.to_le_bytes());
        self.buf.push(ty as u8);
        self.buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(value);
        true
    }

    /// Number of records appended so far.
    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    /// Total encoded size of the finished block, offset array included.
    pub fn size(&self) -> usize {
        self.buf.len() + self.offsets.len() * 4
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Writes the offset array and returns the finished block bytes.
    pub fn finish(mut self) -> Vec<u8> {
        for offset in &self.offsets {
            self.buf.extend_from_slice(&offset.to_le_bytes());
        }
        self.buf
    }
}

// ------------------------------------------------------------------------------------------------
// BlockIterator
// ------------------------------------------------------------------------------------------------

/// Forward iterator over the records of one block.
///
/// `data` must be a full block as produced by [`BlockBuilder::finish`];
/// `count` is the record count from the block's handle, used to locate the
/// boundary between record bytes and the offset array.
pub struct BlockIterator<'a> {
    data: &'a [u8],
    limit: usize,
    pos: usize,
}

impl<'a> BlockIterator<'a> {
    pub fn new(data: &'a [u8], count: usize) -> Self {
        let limit = data.len().saturating_sub(count * 4);
        Self {
            data,
            limit,
            pos: 0,
        }
    }

    /// Re-creates an iterator over the same block bytes at a saved cursor
    /// position. Used by the SSTable iterator, which carries its
    /// `(block, pos)` state across pulls.
    pub(crate) fn at(data: &'a [u8], count: usize, pos: usize) -> Self {
        let mut iter = Self::new(data, count);
        iter.pos = pos;
        iter
    }

    /// Byte offset of the cursor within the block.
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Whether the cursor is before the offset-array region.
    pub fn valid(&self) -> bool {
        self.pos < self.limit
    }

    /// The record under the cursor. `None` when invalid or malformed.
    pub fn current(&self) -> Option<ParsedRecord<'a>> {
        if !self.valid() {
            return None;
        }
        parse_record(&self.data[..self.limit], self.pos).map(|(rec, _)| rec)
    }

    /// Advances to the next record.
    pub fn next(&mut self) {
        if let Some((_, next)) = parse_record(&self.data[..self.limit], self.pos) {
            self.pos = next;
        } else {
            self.pos = self.limit;
        }
    }

    pub fn seek_to_first(&mut self) {
        self.pos = 0;
    }

    /// Positions the cursor on the first record whose internal key is
    /// ≥ `(user_key, seq, Value)`, scanning forward from the start.
    pub fn seek(&mut self, user_key: &[u8], seq: SeqNum) {
        self.seek_to_first();
        while let Some(rec) = self.current() {
            let at_or_past = internal_cmp(
                (rec.user_key, rec.seq, rec.ty),
                (user_key, seq, RecordType::Value),
            )
            .is_ge();
            if at_or_past {
                break;
            }
            self.next();
        }
    }
}
