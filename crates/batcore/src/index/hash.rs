//! Chained-bucket hash index for equality selects
//!
//! Rows are indexed by a 64-bit hash of their tail value (xxh3; string rows
//! reuse the heap slot tag so equal strings hash alike for free). Each
//! bucket heads a chain threaded through `links`, newest row first, so a
//! probe yields positions in descending row order and the caller sorts or
//! reverses as needed. Probing only narrows by hash; the caller verifies
//! the actual value.

use crate::error::{Error, Result};

const EMPTY: u32 = u32::MAX;
const MIN_BUCKETS: usize = 8;

/// Hash index over the rows of one column
pub struct HashIndex {
    mask: u64,
    buckets: Vec<u32>,
    links: Vec<u32>,
    hashes: Vec<u64>,
}

impl HashIndex {
    /// Build over the per-row hashes of a column
    pub fn build(hashes: impl ExactSizeIterator<Item = u64>) -> Result<Self> {
        let count = hashes.len();
        if count >= EMPTY as usize {
            return Err(Error::capacity("column too large for a hash index"));
        }
        let nbuckets = count.max(MIN_BUCKETS).next_power_of_two();
        let mut idx = HashIndex {
            mask: (nbuckets - 1) as u64,
            buckets: Vec::new(),
            links: Vec::new(),
            hashes: Vec::new(),
        };
        idx.buckets.try_reserve(nbuckets).map_err(Error::from)?;
        idx.links.try_reserve(count).map_err(Error::from)?;
        idx.hashes.try_reserve(count).map_err(Error::from)?;
        idx.buckets.resize(nbuckets, EMPTY);
        for h in hashes {
            idx.insert(h);
        }
        Ok(idx)
    }

    /// Indexed row count
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True if no rows are indexed
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Append the hash of the next row, growing the bucket table when the
    /// chains get long
    pub fn push(&mut self, hash: u64) -> Result<()> {
        if self.len() >= EMPTY as usize {
            return Err(Error::capacity("column too large for a hash index"));
        }
        if self.len() >= self.buckets.len() * 2 {
            self.rehash(self.buckets.len() * 2)?;
        }
        self.insert(hash);
        Ok(())
    }

    /// Iterate the row positions whose hash matches, newest first
    pub fn probe(&self, hash: u64) -> Chain<'_> {
        Chain {
            idx: self,
            next: self.buckets[(hash & self.mask) as usize],
        }
    }

    fn insert(&mut self, hash: u64) {
        let row = self.links.len() as u32;
        let b = (hash & self.mask) as usize;
        self.links.push(self.buckets[b]);
        self.buckets[b] = row;
        self.hashes.push(hash);
    }

    fn rehash(&mut self, nbuckets: usize) -> Result<()> {
        let mut buckets = Vec::new();
        buckets.try_reserve(nbuckets).map_err(Error::from)?;
        buckets.resize(nbuckets, EMPTY);
        self.buckets = buckets;
        self.mask = (nbuckets - 1) as u64;
        for (row, &h) in self.hashes.iter().enumerate() {
            let b = (h & self.mask) as usize;
            self.links[row] = self.buckets[b];
            self.buckets[b] = row as u32;
        }
        Ok(())
    }
}

/// Bucket chain walk, newest row first
pub struct Chain<'a> {
    idx: &'a HashIndex,
    next: u32,
}

impl Iterator for Chain<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next == EMPTY {
            return None;
        }
        let row = self.next as usize;
        self.next = self.idx.links[row];
        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;

    fn build_over(vals: &[i32]) -> HashIndex {
        HashIndex::build(vals.iter().map(|v| v.hash64())).unwrap()
    }

    #[test]
    fn probe_yields_matches_newest_first() {
        let vals = [5, 7, 5, 9, 5];
        let idx = build_over(&vals);
        let hits: Vec<usize> = idx
            .probe(5i32.hash64())
            .filter(|&p| vals[p] == 5)
            .collect();
        assert_eq!(hits, vec![4, 2, 0]);
    }

    #[test]
    fn probe_misses_cleanly() {
        let idx = build_over(&[1, 2, 3]);
        let hits: Vec<usize> = idx
            .probe(42i32.hash64())
            .filter(|&p| [1, 2, 3][p] == 42)
            .collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn incremental_push_matches_fresh_build() {
        let mut vals: Vec<i32> = (0..100).map(|i| i % 13).collect();
        let mut idx = build_over(&vals);
        for v in [3, 100, 3, 200] {
            vals.push(v);
            idx.push(v.hash64()).unwrap();
        }
        let expect: Vec<usize> = (0..vals.len()).rev().filter(|&p| vals[p] == 3).collect();
        let hits: Vec<usize> = idx
            .probe(3i32.hash64())
            .filter(|&p| vals[p] == 3)
            .collect();
        assert_eq!(hits, expect);
    }

    #[test]
    fn rehash_grows_buckets() {
        let mut idx = build_over(&[1, 2]);
        let before = idx.buckets.len();
        for v in 0..1000i32 {
            idx.push(v.hash64()).unwrap();
        }
        assert!(idx.buckets.len() > before);
        assert_eq!(idx.len(), 1002);
    }
}
