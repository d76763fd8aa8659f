//! Column imprints: per-cache-page bin bitmasks for range selects
//!
//! The value domain is split into at most 64 bins whose boundaries come from
//! a random sample of the column. For every cache page (64 bytes of tail
//! data) a bitmask records which bins occur on that page; consecutive equal
//! masks are run-length compressed through a small dictionary. A range
//! select turns its bounds into an outer mask (bins touching the range) and
//! an inner mask (bins fully inside it): pages whose mask misses the outer
//! mask are skipped wholesale, pages entirely within the inner mask are
//! emitted without looking at a single value, and only boundary pages get
//! scanned.
//!
//! Bin 0 is open below and also absorbs nils, so it can never be part of an
//! inner mask; nil rows therefore always face a per-value check and never
//! leak into a range result.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::atom::Atom;
use crate::bat::{with_fixed, Bat, FixedAtom};
use crate::error::{Error, Result};

/// Sample size used to place the bin boundaries
const BIN_SAMPLE: usize = 2048;

/// Bytes of tail data summarized by one mask
const PAGE_BYTES: usize = 64;

/// One run in the mask dictionary
#[derive(Debug, Clone, Copy)]
struct PageRun {
    /// Pages covered by this run
    count: u32,
    /// True when all pages share a single mask entry
    repeat: bool,
}

/// Imprints summary over one fixed-width column
pub struct Imprints<T: FixedAtom> {
    /// Ascending bin lower bounds; bin `i` covers `[bins[i], bins[i+1])`,
    /// the first and last bins are open-ended
    bins: Vec<T>,
    /// Distinct consecutive page masks
    imps: Vec<u64>,
    /// Run-length dictionary expanding `imps` back to one mask per page
    dict: Vec<PageRun>,
    values_per_page: usize,
    pages: usize,
    col_min: T,
    col_max: T,
    has_nil: bool,
}

impl<T: FixedAtom> Imprints<T> {
    /// Build the summary over a column tail
    pub fn build(vals: &[T]) -> Result<Self> {
        let values_per_page = (PAGE_BYTES / std::mem::size_of::<T>()).max(1);
        let bins = pick_bins(vals)?;
        debug_assert!(bins.len() <= 64);

        let mut imp = Imprints {
            bins,
            imps: Vec::new(),
            dict: Vec::new(),
            values_per_page,
            pages: 0,
            col_min: T::NIL,
            col_max: T::NIL,
            has_nil: false,
        };
        imp.imps
            .try_reserve(vals.len() / values_per_page + 1)
            .map_err(Error::from)?;

        for page in vals.chunks(values_per_page) {
            let mut mask = 0u64;
            for &v in page {
                if v.is_nil() {
                    imp.has_nil = true;
                } else {
                    if imp.col_min.is_nil() || v.atom_cmp(imp.col_min) == Ordering::Less {
                        imp.col_min = v;
                    }
                    if imp.col_max.is_nil() || v.atom_cmp(imp.col_max) == Ordering::Greater {
                        imp.col_max = v;
                    }
                }
                mask |= 1u64 << imp.bin_of(v);
            }
            imp.push_mask(mask);
        }
        debug!(
            rows = vals.len(),
            bins = imp.bins.len(),
            pages = imp.pages,
            masks = imp.imps.len(),
            "imprints built"
        );
        Ok(imp)
    }

    /// Smallest non-nil value, nil sentinel when the column is all nil
    pub fn col_min(&self) -> T {
        self.col_min
    }

    /// Largest non-nil value, nil sentinel when the column is all nil
    pub fn col_max(&self) -> T {
        self.col_max
    }

    /// True when at least one nil row was seen
    pub fn has_nil(&self) -> bool {
        self.has_nil
    }

    /// Rows summarized per page
    pub fn values_per_page(&self) -> usize {
        self.values_per_page
    }

    /// Outer and inner masks for the closed value range `[lo, hi]`
    ///
    /// A page mask that misses `outer` holds no qualifying value; a page
    /// mask with no bit outside `inner` holds only qualifying values.
    pub fn range_masks(&self, lo: T, hi: T) -> (u64, u64) {
        let lob = self.bin_of(lo);
        let hib = self.bin_of(hi);
        let outer = bit_range(lob, hib + 1);
        // boundary bins are only partially covered, so they stay outside
        // the inner mask; this also keeps bin 0 (and its nils) out
        let inner = if hib > lob + 1 {
            bit_range(lob + 1, hib)
        } else {
            0
        };
        (outer, inner)
    }

    /// Iterate one mask per page, in page order
    pub fn page_masks(&self) -> PageMasks<'_> {
        PageMasks {
            imps: &self.imps,
            dict: &self.dict,
            dict_pos: 0,
            within: 0,
            imp_pos: 0,
        }
    }

    /// The bin a value falls into; nil maps to bin 0
    fn bin_of(&self, v: T) -> usize {
        if v.is_nil() {
            return 0;
        }
        self.bins
            .partition_point(|b| b.atom_cmp(v) != Ordering::Greater)
            .saturating_sub(1)
    }

    fn push_mask(&mut self, mask: u64) {
        self.pages += 1;
        match (self.imps.last().copied(), self.dict.last_mut()) {
            (Some(prev), Some(run)) if prev == mask => {
                if run.repeat {
                    run.count += 1;
                } else if run.count == 1 {
                    run.repeat = true;
                    run.count = 2;
                } else {
                    // split the trailing page off into a fresh repeat run;
                    // the mask entry it used is shared by the new run
                    run.count -= 1;
                    self.dict.push(PageRun {
                        count: 2,
                        repeat: true,
                    });
                }
            }
            (_, Some(run)) if !run.repeat => {
                run.count += 1;
                self.imps.push(mask);
            }
            _ => {
                self.imps.push(mask);
                self.dict.push(PageRun {
                    count: 1,
                    repeat: false,
                });
            }
        }
    }
}

/// Iterator expanding the run-length dictionary to one mask per page
pub struct PageMasks<'a> {
    imps: &'a [u64],
    dict: &'a [PageRun],
    dict_pos: usize,
    within: u32,
    imp_pos: usize,
}

impl Iterator for PageMasks<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let run = *self.dict.get(self.dict_pos)?;
        let mask = if run.repeat {
            self.imps[self.imp_pos]
        } else {
            self.imps[self.imp_pos + self.within as usize]
        };
        self.within += 1;
        if self.within == run.count {
            self.imp_pos += if run.repeat { 1 } else { run.count as usize };
            self.dict_pos += 1;
            self.within = 0;
        }
        Some(mask)
    }
}

fn pick_bins<T: FixedAtom>(vals: &[T]) -> Result<Vec<T>> {
    let mut sample: Vec<T> = Vec::new();
    sample.try_reserve(BIN_SAMPLE.min(vals.len())).map_err(Error::from)?;
    if vals.len() <= BIN_SAMPLE {
        sample.extend(vals.iter().copied().filter(|v| !v.is_nil()));
    } else {
        let mut rng = StdRng::seed_from_u64(vals.len() as u64);
        for _ in 0..BIN_SAMPLE {
            let v = vals[rng.gen_range(0..vals.len())];
            if !v.is_nil() {
                sample.push(v);
            }
        }
    }
    sample.sort_unstable_by(|a, b| a.atom_cmp(*b));
    sample.dedup_by(|a, b| a.atom_cmp(*b) == Ordering::Equal);
    if sample.is_empty() {
        // all-nil or empty column: a single open bin
        return Ok(vec![T::MIN_VALUE]);
    }
    let nbins = match sample.len() {
        0..=16 => 8,
        17..=64 => 16,
        65..=256 => 32,
        _ => 64,
    }
    .min(sample.len());
    let mut bins = Vec::with_capacity(nbins);
    for i in 0..nbins {
        bins.push(sample[i * sample.len() / nbins]);
    }
    bins.dedup_by(|a, b| a.atom_cmp(*b) == Ordering::Equal);
    Ok(bins)
}

/// Bits `[lo, hi)` set
fn bit_range(lo: usize, hi: usize) -> u64 {
    debug_assert!(lo <= hi && hi <= 64);
    if hi - lo == 64 {
        return u64::MAX;
    }
    ((1u64 << (hi - lo)) - 1) << lo
}

/// Type-erased imprints, cached on the column
pub enum ImprintsAny {
    /// 8-bit integers
    I8(Imprints<i8>),
    /// 16-bit integers
    I16(Imprints<i16>),
    /// 32-bit integers
    I32(Imprints<i32>),
    /// 64-bit integers
    I64(Imprints<i64>),
    /// 32-bit floats
    F32(Imprints<f32>),
    /// 64-bit floats
    F64(Imprints<f64>),
    /// Position identifiers
    Oid(Imprints<crate::atom::Oid>),
}

impl ImprintsAny {
    /// Build over a fixed-width column tail
    pub(crate) fn build(b: &Bat) -> Result<Self> {
        with_fixed!(
            b.tail(),
            |s, T| Ok(<T as ImprintAtom>::wrap(Imprints::build(s.as_slice())?)),
            Err(Error::selection(
                "imprints require a fixed-width column tail",
            ))
        )
    }
}

/// Per-type plumbing between [`Imprints`] and the type-erased cache
pub(crate) trait ImprintAtom: FixedAtom {
    fn wrap(imp: Imprints<Self>) -> ImprintsAny;
    fn unwrap_ref(any: &ImprintsAny) -> Option<&Imprints<Self>>;
}

macro_rules! impl_imprint_atom {
    ($t:ty, $variant:ident) => {
        impl ImprintAtom for $t {
            fn wrap(imp: Imprints<Self>) -> ImprintsAny {
                ImprintsAny::$variant(imp)
            }

            fn unwrap_ref(any: &ImprintsAny) -> Option<&Imprints<Self>> {
                match any {
                    ImprintsAny::$variant(imp) => Some(imp),
                    _ => None,
                }
            }
        }
    };
}

impl_imprint_atom!(i8, I8);
impl_imprint_atom!(i16, I16);
impl_imprint_atom!(i32, I32);
impl_imprint_atom!(i64, I64);
impl_imprint_atom!(f32, F32);
impl_imprint_atom!(f64, F64);
impl_imprint_atom!(crate::atom::Oid, Oid);
