//! Variable-size heap for string tails
//!
//! A [`StrHeap`] is an append-only byte arena. Each stored string occupies an
//! 8-byte-aligned slot `[u64 tag][u32 len][bytes][pad]`; columns reference
//! slots by byte offset through an [`OffsetArray`] that widens from 1-byte to
//! 8-byte entries as the heap grows. Offset 0 is the reserved nil slot, so a
//! zero offset always means nil.
//!
//! Insertion deduplicates through a tag dictionary: equal strings share a
//! slot, which is what makes the same-offset probe in the mutation engine
//! work. Heaps are shared between columns behind `Arc`; the first mutation of
//! a shared heap copies it (see [`crate::mutate`]).

use std::collections::HashMap;

use xxhash_rust::xxh3::xxh3_64;

use crate::bat::FixedSlice;
use crate::error::{Error, Result};

/// Tag stored in the nil slot; any fixed value works, it only has to be
/// consistent so nil rows hash alike
const NIL_TAG: u64 = 0x9e37_79b9_7f4a_7c15;

const SLOT_HEADER: usize = 12;
const SLOT_ALIGN: usize = 8;

/// Append-only deduplicating string arena
#[derive(Debug, Clone)]
pub struct StrHeap {
    bytes: Vec<u8>,
    /// tag -> candidate slot offsets (collisions are verified by bytes)
    dict: HashMap<u64, Vec<u64>>,
    /// Every slot went through the dictionary, so equal strings share one
    /// offset; cleared by bulk copies
    dedup_complete: bool,
}

impl Default for StrHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl StrHeap {
    /// Offset of the reserved nil slot
    pub const NIL_OFFSET: u64 = 0;

    /// New heap containing only the nil slot
    pub fn new() -> Self {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(&NIL_TAG.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.resize(SLOT_ALIGN * 2, 0);
        Self {
            bytes,
            dict: HashMap::new(),
            dedup_complete: true,
        }
    }

    /// Whether equal strings are guaranteed to share one slot; when true,
    /// string equality reduces to offset equality
    pub fn doubles_eliminated(&self) -> bool {
        self.dedup_complete
    }

    /// Bytes currently used
    pub fn used(&self) -> usize {
        self.bytes.len()
    }

    /// Store a string, reusing an existing slot when the bytes match
    pub fn put(&mut self, s: &str) -> u64 {
        let tag = xxh3_64(s.as_bytes());
        if let Some(cands) = self.dict.get(&tag) {
            for &off in cands {
                if self.slot_str(off) == Some(s) {
                    return off;
                }
            }
        }
        let off = self.bytes.len() as u64;
        self.bytes.extend_from_slice(&tag.to_le_bytes());
        self.bytes
            .extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(s.as_bytes());
        let slot = SLOT_HEADER + s.len();
        self.bytes
            .resize(off as usize + slot.next_multiple_of(SLOT_ALIGN), 0);
        self.dict.entry(tag).or_default().push(off);
        off
    }

    /// Fallible variant of [`put`](Self::put) for bulk insert paths
    pub fn try_put(&mut self, s: &str) -> Result<u64> {
        let need = (SLOT_HEADER + s.len()).next_multiple_of(SLOT_ALIGN);
        self.bytes.try_reserve(need).map_err(Error::from)?;
        Ok(self.put(s))
    }

    /// Look up a slot offset the way [`put`](Self::put) would, without
    /// inserting
    pub fn probe(&self, s: &str) -> Option<u64> {
        let tag = xxh3_64(s.as_bytes());
        self.dict
            .get(&tag)?
            .iter()
            .copied()
            .find(|&off| self.slot_str(off) == Some(s))
    }

    /// The string at `off`; `None` for the nil slot
    pub fn get(&self, off: u64) -> Option<&str> {
        if off == Self::NIL_OFFSET {
            return None;
        }
        self.slot_str(off)
    }

    /// Slot tag at `off`, used as the hash of the row
    pub fn tag_or_hash(&self, off: u64) -> u64 {
        if off == Self::NIL_OFFSET {
            return NIL_TAG;
        }
        let p = off as usize;
        u64::from_le_bytes(self.bytes[p..p + 8].try_into().expect("slot header"))
    }

    fn slot_len(&self, off: u64) -> usize {
        let p = off as usize + 8;
        u32::from_le_bytes(self.bytes[p..p + 4].try_into().expect("slot header")) as usize
    }

    fn slot_str(&self, off: u64) -> Option<&str> {
        let len = self.slot_len(off);
        if len == u32::MAX as usize {
            return None;
        }
        let p = off as usize + SLOT_HEADER;
        std::str::from_utf8(&self.bytes[p..p + len]).ok()
    }

    /// Copy another heap's slots wholesale, returning the translation offset
    /// to add to every incoming slot offset
    ///
    /// The dictionary is not extended with the copied slots; later `put`
    /// calls may store a duplicate, which costs space but never correctness.
    pub fn bulk_copy_from(&mut self, other: &StrHeap) -> Result<u64> {
        let toff = self.bytes.len() as u64;
        debug_assert_eq!(toff % SLOT_ALIGN as u64, 0);
        self.bytes
            .try_reserve(other.bytes.len())
            .map_err(Error::from)?;
        self.bytes.extend_from_slice(&other.bytes);
        self.dedup_complete = false;
        Ok(toff)
    }
}

/// Per-row slot offsets, stored at the narrowest width that fits
#[derive(Debug, Clone)]
pub enum OffsetArray {
    /// 1-byte offsets
    W1(FixedSlice<u8>),
    /// 2-byte offsets
    W2(FixedSlice<u16>),
    /// 4-byte offsets
    W4(FixedSlice<u32>),
    /// 8-byte offsets
    W8(FixedSlice<u64>),
}

impl Default for OffsetArray {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetArray {
    /// New empty array at the narrowest width
    pub fn new() -> Self {
        OffsetArray::W1(FixedSlice::new())
    }

    /// Row count
    pub fn len(&self) -> usize {
        match self {
            OffsetArray::W1(s) => s.len(),
            OffsetArray::W2(s) => s.len(),
            OffsetArray::W4(s) => s.len(),
            OffsetArray::W8(s) => s.len(),
        }
    }

    /// True if no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offset of row `pos`
    pub fn get(&self, pos: usize) -> u64 {
        match self {
            OffsetArray::W1(s) => s.as_slice()[pos] as u64,
            OffsetArray::W2(s) => s.as_slice()[pos] as u64,
            OffsetArray::W4(s) => s.as_slice()[pos] as u64,
            OffsetArray::W8(s) => s.as_slice()[pos],
        }
    }

    /// Append one offset, widening the storage when it does not fit
    pub fn push(&mut self, off: u64) {
        self.widen_for(off);
        match self {
            OffsetArray::W1(s) => s.with_mut(|v| v.push(off as u8)),
            OffsetArray::W2(s) => s.with_mut(|v| v.push(off as u16)),
            OffsetArray::W4(s) => s.with_mut(|v| v.push(off as u32)),
            OffsetArray::W8(s) => s.with_mut(|v| v.push(off)),
        }
    }

    /// Reverse the row order in place
    pub fn reverse(&mut self) {
        match self {
            OffsetArray::W1(s) => s.with_mut(|v| v.reverse()),
            OffsetArray::W2(s) => s.with_mut(|v| v.reverse()),
            OffsetArray::W4(s) => s.with_mut(|v| v.reverse()),
            OffsetArray::W8(s) => s.with_mut(|v| v.reverse()),
        }
    }

    /// Overwrite the offset of row `pos`, widening the storage when needed
    pub fn set(&mut self, pos: usize, off: u64) {
        self.widen_for(off);
        match self {
            OffsetArray::W1(s) => s.with_mut(|v| v[pos] = off as u8),
            OffsetArray::W2(s) => s.with_mut(|v| v[pos] = off as u16),
            OffsetArray::W4(s) => s.with_mut(|v| v[pos] = off as u32),
            OffsetArray::W8(s) => s.with_mut(|v| v[pos] = off),
        }
    }

    /// Reserve room for `additional` rows
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        match self {
            OffsetArray::W1(s) => s.try_reserve(additional),
            OffsetArray::W2(s) => s.try_reserve(additional),
            OffsetArray::W4(s) => s.try_reserve(additional),
            OffsetArray::W8(s) => s.try_reserve(additional),
        }
    }

    /// Zero-copy view of rows `[lo, hi)`
    pub fn view(&self, lo: usize, hi: usize) -> Self {
        match self {
            OffsetArray::W1(s) => OffsetArray::W1(s.view(lo, hi)),
            OffsetArray::W2(s) => OffsetArray::W2(s.view(lo, hi)),
            OffsetArray::W4(s) => OffsetArray::W4(s.view(lo, hi)),
            OffsetArray::W8(s) => OffsetArray::W8(s.view(lo, hi)),
        }
    }

    /// Append rows `[lo, hi)` of `other`, adding `toff` to each offset
    pub fn extend_translated(&mut self, other: &OffsetArray, lo: usize, hi: usize, toff: u64) {
        for pos in lo..hi {
            let off = other.get(pos);
            // the nil slot never translates
            if off == StrHeap::NIL_OFFSET {
                self.push(off);
            } else {
                self.push(off + toff);
            }
        }
    }

    /// Iterate all offsets
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len()).map(move |p| self.get(p))
    }

    fn widen_for(&mut self, off: u64) {
        let target = if off <= u8::MAX as u64 {
            1
        } else if off <= u16::MAX as u64 {
            2
        } else if off <= u32::MAX as u64 {
            4
        } else {
            8
        };
        while self.width() < target {
            *self = match std::mem::replace(self, OffsetArray::new()) {
                OffsetArray::W1(s) => OffsetArray::W2(FixedSlice::from_vec(
                    s.as_slice().iter().map(|&v| v as u16).collect(),
                )),
                OffsetArray::W2(s) => OffsetArray::W4(FixedSlice::from_vec(
                    s.as_slice().iter().map(|&v| v as u32).collect(),
                )),
                OffsetArray::W4(s) => OffsetArray::W8(FixedSlice::from_vec(
                    s.as_slice().iter().map(|&v| v as u64).collect(),
                )),
                w8 => w8,
            };
        }
    }

    fn width(&self) -> usize {
        match self {
            OffsetArray::W1(_) => 1,
            OffsetArray::W2(_) => 2,
            OffsetArray::W4(_) => 4,
            OffsetArray::W8(_) => 8,
        }
    }
}
