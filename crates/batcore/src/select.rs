//! Adaptive selection engine
//!
//! [`select`] evaluates a range or equality predicate over one column and
//! returns the qualifying rows as a candidate list. The entry point first
//! normalizes the predicate: open bounds become closed ones through
//! successor/predecessor arithmetic, nil bounds mean unbounded, and an
//! anti-range is rewritten into (at most) two ordinary ranges. Each closed
//! range then picks a physical strategy:
//!
//! - virtual arithmetic for void tails,
//! - binary search when the column is (reverse) sorted,
//! - the equality hash index when one exists, the column is persistent and
//!   large, or a sample estimates the predicate selective enough to repay
//!   building one,
//! - column imprints for ranges over large persistent fixed-width columns,
//! - otherwise a scan, preallocated from a sampled estimate and grown by
//!   extrapolating the hit rate seen so far.
//!
//! Nil is never part of a range result; the only predicate that selects nil
//! rows is the closed nil-to-nil equality.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::atom::{Atom, Oid, Value};
use crate::bat::{with_fixed, Bat, Role, TailStorage};
use crate::candidates::Candidates;
use crate::error::{Error, Result};
use crate::heap::{OffsetArray, StrHeap};
use crate::index::imprints::ImprintAtom;

/// Knobs of the strategy choice
#[derive(Debug, Clone)]
pub struct SelectTuning {
    /// Rows sampled when estimating selectivity
    pub sample_size: usize,
    /// Windows the sample is spread over
    pub sample_windows: usize,
    /// Below this row count a plain scan is never worth beating
    pub small_input_cutoff: usize,
    /// Equality builds a hash when the estimate is under `count / this`
    pub hash_selectivity_div: usize,
    /// Upper bound on speculative result preallocation
    pub prealloc_cap: usize,
}

impl Default for SelectTuning {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            sample_windows: 3,
            small_input_cutoff: 10_000,
            hash_selectivity_div: 100,
            prealloc_cap: 1_000_000,
        }
    }
}

/// Range select with default tuning; see [`select_with`]
pub fn select(
    b: &Bat,
    cands: Option<&Candidates>,
    lo: &Value,
    hi: &Value,
    li: bool,
    hi_incl: bool,
    anti: bool,
) -> Result<Candidates> {
    select_with(b, cands, lo, hi, li, hi_incl, anti, &SelectTuning::default())
}

/// Select the rows of `b` (restricted to `cands` when given) whose value
/// lies in the range `lo..hi` with the given bound inclusivity, or outside
/// it when `anti`
///
/// A nil bound is unbounded on that side. Nil rows never qualify, with one
/// exception: both bounds nil and inclusive selects exactly the nil rows
/// (and with `anti`, exactly the non-nil rows).
pub fn select_with(
    b: &Bat,
    cands: Option<&Candidates>,
    lo: &Value,
    hi: &Value,
    li: bool,
    hi_incl: bool,
    anti: bool,
    tuning: &SelectTuning,
) -> Result<Candidates> {
    let base = b.hseqbase();
    let full = Candidates::dense(base, b.count());
    let cand = match cands {
        Some(c) => c.intersect(&full),
        None => full,
    };
    if cand.is_empty() {
        return Ok(Candidates::empty());
    }
    match b.tail() {
        TailStorage::Void { seq } => select_void(b, *seq, &cand, lo, hi, li, hi_incl, anti),
        TailStorage::Str { offsets, heap } => {
            select_str(b, offsets, heap, &cand, lo, hi, li, hi_incl, anti, tuning)
        }
        tail => with_fixed!(
            tail,
            |s, T| {
                let lo_t = bound::<T>(lo)?;
                let hi_t = bound::<T>(hi)?;
                select_fixed::<T>(b, s.as_slice(), &cand, lo_t, hi_t, li, hi_incl, anti, tuning)
            },
            unreachable!()
        ),
    }
}

/// Single-operator select: `op` is one of `=`, `==`, `<`, `<=`, `>`, `>=`,
/// `<>`, `!=`
pub fn theta_select(b: &Bat, cands: Option<&Candidates>, v: &Value, op: &str) -> Result<Candidates> {
    match op {
        "=" | "==" => select(b, cands, v, v, true, true, false),
        "<>" | "!=" => select(b, cands, v, v, true, true, true),
        "<" => select(b, cands, &Value::Nil, v, true, false, false),
        "<=" => select(b, cands, &Value::Nil, v, true, true, false),
        ">" => select(b, cands, v, &Value::Nil, false, true, false),
        ">=" => select(b, cands, v, &Value::Nil, true, true, false),
        _ => Err(Error::invalid_argument(format!(
            "unknown comparison operator {op:?}"
        ))),
    }
}

fn bound<T: Atom>(v: &Value) -> Result<Option<T>> {
    match v {
        Value::Nil => Ok(None),
        _ => {
            let t = T::from_value(v).ok_or_else(|| {
                Error::type_mismatch(
                    T::atom_type().name(),
                    v.atom_type().map(|t| t.name()).unwrap_or("nil"),
                )
            })?;
            // a typed nil bound is the same as no bound
            Ok(if t.is_nil() { None } else { Some(t) })
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn select_fixed<T: ImprintAtom>(
    b: &Bat,
    vals: &[T],
    cand: &Candidates,
    lo: Option<T>,
    hi: Option<T>,
    li: bool,
    hi_incl: bool,
    anti: bool,
    tuning: &SelectTuning,
) -> Result<Candidates> {
    if lo.is_none() && hi.is_none() {
        if !(li && hi_incl) {
            return Err(Error::invalid_argument(
                "nil-to-nil select requires inclusive bounds",
            ));
        }
        if !anti {
            return select_nils(b, vals, cand);
        }
        // anti nil-to-nil: everything that is not nil
        return range_select(b, vals, cand, T::MIN_VALUE, T::MAX_VALUE, tuning);
    }

    // close the range: open bounds step to the next representable value
    let mut lo_v = lo.unwrap_or(T::MIN_VALUE);
    let mut hi_v = hi.unwrap_or(T::MAX_VALUE);
    let li = li || lo.is_none();
    let hi_incl = hi_incl || hi.is_none();
    if !li {
        if lo_v.atom_cmp(T::MAX_VALUE) == Ordering::Equal {
            return empty_or_all_non_nil(b, vals, cand, anti, tuning);
        }
        lo_v = lo_v.next_up();
    }
    if !hi_incl {
        if hi_v.atom_cmp(T::MIN_VALUE) == Ordering::Equal {
            return empty_or_all_non_nil(b, vals, cand, anti, tuning);
        }
        hi_v = hi_v.next_down();
    }
    if lo_v.atom_cmp(hi_v) == Ordering::Greater {
        return empty_or_all_non_nil(b, vals, cand, anti, tuning);
    }

    if anti {
        // complement of a closed range: up to two closed ranges
        let mut out = Candidates::empty();
        if lo_v.atom_cmp(T::MIN_VALUE) == Ordering::Greater {
            out = range_select(b, vals, cand, T::MIN_VALUE, lo_v.next_down(), tuning)?;
        }
        if hi_v.atom_cmp(T::MAX_VALUE) == Ordering::Less {
            let upper = range_select(b, vals, cand, hi_v.next_up(), T::MAX_VALUE, tuning)?;
            out = out.merge(&upper);
        }
        return Ok(out);
    }
    range_select(b, vals, cand, lo_v, hi_v, tuning)
}

fn empty_or_all_non_nil<T: ImprintAtom>(
    b: &Bat,
    vals: &[T],
    cand: &Candidates,
    anti: bool,
    tuning: &SelectTuning,
) -> Result<Candidates> {
    if anti {
        range_select(b, vals, cand, T::MIN_VALUE, T::MAX_VALUE, tuning)
    } else {
        Ok(Candidates::empty())
    }
}

/// Closed-range kernel with strategy choice; `lo <= hi`, both non-nil
fn range_select<T: ImprintAtom>(
    b: &Bat,
    vals: &[T],
    cand: &Candidates,
    lo: T,
    hi: T,
    tuning: &SelectTuning,
) -> Result<Candidates> {
    let base = b.hseqbase();
    let n = vals.len();

    // min/max hints rule the whole range in or out without touching data
    if let (Some(min), Some(max)) = (
        b.hints().min.as_ref().and_then(|v| T::from_value(v)),
        b.hints().max.as_ref().and_then(|v| T::from_value(v)),
    ) {
        if hi.atom_cmp(min) == Ordering::Less || lo.atom_cmp(max) == Ordering::Greater {
            return Ok(Candidates::empty());
        }
        if lo.atom_cmp(min) != Ordering::Greater
            && hi.atom_cmp(max) != Ordering::Less
            && b.props().nonil
        {
            return Ok(cand.clone());
        }
    }

    let p = b.props();
    if p.sorted || p.revsorted {
        let (s, e) = if p.sorted {
            (
                partition(vals, |v| v.atom_cmp(lo) == Ordering::Less),
                partition(vals, |v| v.atom_cmp(hi) != Ordering::Greater),
            )
        } else {
            (
                partition(vals, |v| v.atom_cmp(hi) == Ordering::Greater),
                partition(vals, |v| v.atom_cmp(lo) != Ordering::Less),
            )
        };
        debug!(strategy = "sorted", rows = e.saturating_sub(s), "range select");
        return Ok(Candidates::dense(base + s as Oid, e.saturating_sub(s)).intersect(cand));
    }

    if lo.atom_cmp(hi) == Ordering::Equal {
        return equi_select(b, vals, cand, lo, tuning);
    }

    if b.role() == Role::Persistent && n >= tuning.small_input_cutoff {
        return imprint_select(b, vals, cand, lo, hi, tuning);
    }

    let pred = |v: T| v.atom_cmp(lo) != Ordering::Less && v.atom_cmp(hi) != Ordering::Greater;
    let est = estimate(vals, pred, tuning);
    debug!(strategy = "scan", estimate = est, "range select");
    scan_collect(cand, est, tuning, |oid| pred(vals[(oid - base) as usize]))
}

fn equi_select<T: ImprintAtom>(
    b: &Bat,
    vals: &[T],
    cand: &Candidates,
    v: T,
    tuning: &SelectTuning,
) -> Result<Candidates> {
    let base = b.hseqbase();
    let n = vals.len();
    let pred = |x: T| x.atom_cmp(v) == Ordering::Equal;

    let hash = match b.hash_index() {
        Some(h) => Some(h),
        None if n < tuning.small_input_cutoff => None,
        None if b.role() == Role::Persistent => Some(b.ensure_hash()?),
        None => {
            // transient and large: only pay for a hash when a sample says
            // the predicate is selective enough to repay it
            let est = estimate(vals, pred, tuning);
            if est.saturating_mul(tuning.hash_selectivity_div) < n {
                Some(b.ensure_hash()?)
            } else {
                None
            }
        }
    };

    if let Some(h) = hash {
        debug!(strategy = "hash", "equality select");
        let mut hits: Vec<Oid> = Vec::new();
        for pos in h.probe(v.hash64()) {
            if pos < n && pred(vals[pos]) {
                let oid = base + pos as Oid;
                if cand.contains(oid) {
                    hits.push(oid);
                }
            }
        }
        // chains yield newest first
        hits.reverse();
        return Ok(Candidates::from_sorted(hits));
    }
    let est = estimate(vals, pred, tuning);
    debug!(strategy = "scan", estimate = est, "equality select");
    scan_collect(cand, est, tuning, |oid| pred(vals[(oid - base) as usize]))
}

fn imprint_select<T: ImprintAtom>(
    b: &Bat,
    vals: &[T],
    cand: &Candidates,
    lo: T,
    hi: T,
    tuning: &SelectTuning,
) -> Result<Candidates> {
    let base = b.hseqbase();
    let any = b.ensure_imprints()?;
    let imp = T::unwrap_ref(&any).ok_or_else(|| Error::internal("imprints type drift"))?;

    if !imp.col_min().is_nil() {
        if hi.atom_cmp(imp.col_min()) == Ordering::Less
            || lo.atom_cmp(imp.col_max()) == Ordering::Greater
        {
            return Ok(Candidates::empty());
        }
        if lo.atom_cmp(imp.col_min()) != Ordering::Greater
            && hi.atom_cmp(imp.col_max()) != Ordering::Less
            && !imp.has_nil()
        {
            return Ok(cand.clone());
        }
    }

    let (outer, inner) = imp.range_masks(lo, hi);
    let vpp = imp.values_per_page();
    let pred = |v: T| v.atom_cmp(lo) != Ordering::Less && v.atom_cmp(hi) != Ordering::Greater;
    let mut out = OutBuf::with_estimate(estimate(vals, pred, tuning), tuning)?;
    let n = vals.len();
    let mut skipped = 0usize;
    for (p, mask) in imp.page_masks().enumerate() {
        if mask & outer == 0 {
            skipped += 1;
            continue;
        }
        let plo = p * vpp;
        let phi = (plo + vpp).min(n);
        if mask & !inner == 0 {
            // every bin on this page lies strictly inside the range
            for pos in plo..phi {
                out.push(base + pos as Oid, phi, n)?;
            }
        } else {
            for pos in plo..phi {
                if pred(vals[pos]) {
                    out.push(base + pos as Oid, phi, n)?;
                }
            }
        }
    }
    debug!(
        strategy = "imprints",
        pages_skipped = skipped,
        "range select"
    );
    let hits = out.into_candidates();
    Ok(if cand == &Candidates::dense(base, n) {
        hits
    } else {
        hits.intersect(cand)
    })
}

fn select_nils<T: ImprintAtom>(b: &Bat, vals: &[T], cand: &Candidates) -> Result<Candidates> {
    if b.props().nonil {
        return Ok(Candidates::empty());
    }
    if let Some(any) = b.imprints() {
        if T::unwrap_ref(&any).is_some_and(|imp| !imp.has_nil()) {
            return Ok(Candidates::empty());
        }
    }
    let base = b.hseqbase();
    let mut hits = Vec::new();
    for oid in cand.iter() {
        if vals[(oid - base) as usize].is_nil() {
            hits.push(oid);
        }
    }
    Ok(Candidates::from_sorted(hits))
}

fn select_void(
    b: &Bat,
    seq: Oid,
    cand: &Candidates,
    lo: &Value,
    hi: &Value,
    li: bool,
    hi_incl: bool,
    anti: bool,
) -> Result<Candidates> {
    let base = b.hseqbase();
    let n = b.count();
    let lo_t = bound::<Oid>(lo)?;
    let hi_t = bound::<Oid>(hi)?;

    if lo_t.is_none() && hi_t.is_none() {
        if !(li && hi_incl) {
            return Err(Error::invalid_argument(
                "nil-to-nil select requires inclusive bounds",
            ));
        }
        let nil_rows = seq.is_nil();
        return Ok(if nil_rows != anti {
            cand.clone()
        } else {
            Candidates::empty()
        });
    }
    if seq.is_nil() {
        // every row is nil; no range matches
        return Ok(Candidates::empty());
    }

    let mut lo_v = lo_t.unwrap_or(Oid::MIN_VALUE);
    let mut hi_v = hi_t.unwrap_or(Oid::MAX_VALUE);
    let li = li || lo_t.is_none();
    let hi_incl = hi_incl || hi_t.is_none();
    if !li {
        if lo_v == Oid::MAX_VALUE {
            return Ok(void_complement(base, n, 0, 0, anti).intersect(cand));
        }
        lo_v += 1;
    }
    if !hi_incl {
        if hi_v == 0 {
            return Ok(void_complement(base, n, 0, 0, anti).intersect(cand));
        }
        hi_v -= 1;
    }
    if lo_v > hi_v {
        return Ok(void_complement(base, n, 0, 0, anti).intersect(cand));
    }

    // tail value at position p is seq + p; solve for positions
    let s = lo_v.saturating_sub(seq).min(n as Oid) as usize;
    let e = if hi_v < seq {
        0
    } else {
        ((hi_v - seq).saturating_add(1)).min(n as Oid) as usize
    };
    let e = e.max(s);
    Ok(void_complement(base, n, s, e, anti).intersect(cand))
}

/// Positions `[s, e)` qualify; invert to the two flanking runs when `anti`
fn void_complement(base: Oid, n: usize, s: usize, e: usize, anti: bool) -> Candidates {
    if !anti {
        return Candidates::dense(base + s as Oid, e - s);
    }
    let below = Candidates::dense(base, s);
    let above = Candidates::dense(base + e as Oid, n - e);
    below.merge(&above)
}

#[allow(clippy::too_many_arguments)]
fn select_str(
    b: &Bat,
    offsets: &OffsetArray,
    heap: &Arc<StrHeap>,
    cand: &Candidates,
    lo: &Value,
    hi: &Value,
    li: bool,
    hi_incl: bool,
    anti: bool,
    tuning: &SelectTuning,
) -> Result<Candidates> {
    let base = b.hseqbase();
    let n = b.count();
    let lo_s = str_bound(lo)?;
    let hi_s = str_bound(hi)?;

    if lo_s.is_none() && hi_s.is_none() {
        if !(li && hi_incl) {
            return Err(Error::invalid_argument(
                "nil-to-nil select requires inclusive bounds",
            ));
        }
        let mut hits = Vec::new();
        for oid in cand.iter() {
            let is_nil = offsets.get((oid - base) as usize) == StrHeap::NIL_OFFSET;
            if is_nil != anti {
                hits.push(oid);
            }
        }
        return Ok(Candidates::from_sorted(hits));
    }

    // no successor arithmetic for strings: bound inclusivity stays in the
    // comparator instead of being normalized away
    let in_range = |s: &str| {
        let ge_lo = match lo_s {
            None => true,
            Some(l) => match s.cmp(l) {
                Ordering::Greater => true,
                Ordering::Equal => li,
                Ordering::Less => false,
            },
        };
        let le_hi = match hi_s {
            None => true,
            Some(h) => match s.cmp(h) {
                Ordering::Less => true,
                Ordering::Equal => hi_incl,
                Ordering::Greater => false,
            },
        };
        ge_lo && le_hi
    };
    let pred = |pos: usize| match heap.get(offsets.get(pos)) {
        Some(s) => in_range(s) != anti,
        None => false,
    };

    // point lookup through the hash index
    let equi = !anti && li && hi_incl && lo_s.is_some() && lo_s == hi_s;
    if equi {
        let needle = lo_s.unwrap_or_default();
        // a fully deduplicated heap makes equality a pure offset compare
        if heap.doubles_eliminated() {
            let Some(target) = heap.probe(needle) else {
                debug!(strategy = "offset", "string equality select misses the heap");
                return Ok(Candidates::empty());
            };
            debug!(strategy = "offset", "string equality select");
            let mut out = OutBuf::with_estimate(cand.len() / 8 + 16, tuning)?;
            let total = cand.len();
            let mut scanned = 0;
            for oid in cand.iter() {
                scanned += 1;
                if offsets.get((oid - base) as usize) == target {
                    out.push(oid, scanned, total)?;
                }
            }
            return Ok(out.into_candidates());
        }
        let use_hash = b.hash_index().is_some()
            || (b.role() == Role::Persistent && n >= tuning.small_input_cutoff);
        if use_hash {
            debug!(strategy = "hash", "string equality select");
            let h = b.ensure_hash()?;
            let mut hits: Vec<Oid> = Vec::new();
            for pos in h.probe(xxhash_rust::xxh3::xxh3_64(needle.as_bytes())) {
                if pos < n && heap.get(offsets.get(pos)) == Some(needle) {
                    let oid = base + pos as Oid;
                    if cand.contains(oid) {
                        hits.push(oid);
                    }
                }
            }
            hits.reverse();
            return Ok(Candidates::from_sorted(hits));
        }
    }

    if (b.props().sorted || b.props().revsorted) && !anti {
        let key = |pos: usize| heap.get(offsets.get(pos));
        let (s, e) = if b.props().sorted {
            (
                lower_bound(n, |p| match (key(p), lo_s) {
                    (None, _) => true,
                    (Some(_), None) => false,
                    (Some(v), Some(l)) => v < l || (!li && v == l),
                }),
                lower_bound(n, |p| match (key(p), hi_s) {
                    (None, _) => true,
                    (Some(_), None) => true,
                    (Some(v), Some(h)) => v < h || (hi_incl && v == h),
                }),
            )
        } else {
            (
                lower_bound(n, |p| match (key(p), hi_s) {
                    (None, _) => false,
                    (Some(_), None) => false,
                    (Some(v), Some(h)) => v > h || (!hi_incl && v == h),
                }),
                lower_bound(n, |p| match (key(p), lo_s) {
                    (None, _) => false,
                    (Some(_), None) => true,
                    (Some(v), Some(l)) => v > l || (li && v == l),
                }),
            )
        };
        debug!(strategy = "sorted", "string range select");
        return Ok(Candidates::dense(base + s as Oid, e.saturating_sub(s)).intersect(cand));
    }

    debug!(strategy = "scan", "string range select");
    let mut out = OutBuf::with_estimate(cand.len() / 8 + 16, tuning)?;
    let total = cand.len();
    let mut scanned = 0;
    for oid in cand.iter() {
        scanned += 1;
        if pred((oid - base) as usize) {
            out.push(oid, scanned, total)?;
        }
    }
    Ok(out.into_candidates())
}

fn str_bound(v: &Value) -> Result<Option<&str>> {
    match v {
        Value::Nil => Ok(None),
        Value::Str(s) => Ok(Some(s.as_str())),
        _ => Err(Error::type_mismatch(
            "str",
            v.atom_type().map(|t| t.name()).unwrap_or("nil"),
        )),
    }
}

/// First index for which `f` is false; `f` must be monotone (all-true then
/// all-false)
fn lower_bound(n: usize, f: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0usize, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if f(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

fn partition<T: Atom>(vals: &[T], f: impl Fn(T) -> bool) -> usize {
    vals.partition_point(|&v| f(v))
}

/// Windowed sampling estimator: count hits over a few windows spread across
/// the column and extrapolate
fn estimate<T: Atom>(vals: &[T], pred: impl Fn(T) -> bool, tuning: &SelectTuning) -> usize {
    let n = vals.len();
    if n <= tuning.sample_size {
        return vals.iter().filter(|&&v| pred(v)).count();
    }
    let windows = tuning.sample_windows.max(1);
    let per = (tuning.sample_size / windows).max(1);
    let mut hits = 0usize;
    let mut sampled = 0usize;
    for w in 0..windows {
        let start = if windows == 1 {
            0
        } else {
            w * (n - per) / (windows - 1)
        };
        for &v in &vals[start..start + per] {
            if pred(v) {
                hits += 1;
            }
        }
        sampled += per;
    }
    hits.saturating_mul(n) / sampled.max(1)
}

/// Result buffer with sampled preallocation and hit-rate-extrapolating
/// growth; every allocation is fallible
struct OutBuf {
    v: Vec<Oid>,
}

impl OutBuf {
    fn with_estimate(est: usize, tuning: &SelectTuning) -> Result<Self> {
        let mut v = Vec::new();
        v.try_reserve(est.min(tuning.prealloc_cap)).map_err(Error::from)?;
        Ok(Self { v })
    }

    fn push(&mut self, o: Oid, scanned: usize, total: usize) -> Result<()> {
        if self.v.len() == self.v.capacity() {
            let remaining = total.saturating_sub(scanned);
            let extra = self.v.len().saturating_mul(remaining) / scanned.max(1);
            let extra = extra + extra / 10 + 1024;
            self.v.try_reserve(extra).map_err(Error::from)?;
        }
        self.v.push(o);
        Ok(())
    }

    fn into_candidates(self) -> Candidates {
        Candidates::from_sorted(self.v)
    }
}

fn scan_collect(
    cand: &Candidates,
    est: usize,
    tuning: &SelectTuning,
    pred: impl Fn(Oid) -> bool,
) -> Result<Candidates> {
    let mut out = OutBuf::with_estimate(est.min(cand.len()), tuning)?;
    let total = cand.len();
    let mut scanned = 0;
    for oid in cand.iter() {
        scanned += 1;
        if pred(oid) {
            out.push(oid, scanned, total)?;
        }
    }
    Ok(out.into_candidates())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomType;

    #[test]
    fn dense_range_is_arithmetic() {
        let b = Bat::dense(0, 100);
        let r = select(&b, None, &Value::Oid(10), &Value::Oid(20), true, false, false).unwrap();
        assert_eq!(r, Candidates::dense(10, 10));
    }

    #[test]
    fn void_anti_yields_two_runs() {
        let b = Bat::dense(0, 10);
        let r = select(&b, None, &Value::Oid(3), &Value::Oid(6), true, true, true).unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![0, 1, 2, 7, 8, 9]);
    }

    #[test]
    fn open_bounds_normalize_to_closed() {
        let b = Bat::from_vec(vec![1i32, 2, 3, 4, 5]);
        // (1, 4) == [2, 3]
        let r = select(&b, None, &Value::I32(1), &Value::I32(4), false, false, false).unwrap();
        assert_eq!(r, Candidates::dense(1, 2));
    }

    #[test]
    fn float_open_bound_uses_successor() {
        let b = Bat::from_vec(vec![1.0f64, 1.0 + f64::EPSILON, 2.0]);
        let r = select(
            &b,
            None,
            &Value::F64(1.0),
            &Value::F64(3.0),
            false,
            true,
            false,
        )
        .unwrap();
        // 1.0 itself is excluded, its successor is not
        assert_eq!(r, Candidates::dense(1, 2));
    }

    #[test]
    fn nil_rows_never_match_ranges() {
        let b = Bat::from_vec(vec![i32::NIL, 5, i32::NIL, 10]);
        let r = select(
            &b,
            None,
            &Value::Nil,
            &Value::Nil,
            true,
            true,
            false,
        )
        .unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![0, 2]);

        let r = theta_select(&b, None, &Value::I32(0), ">=").unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![1, 3]);

        // anti range also excludes nils
        let r = select(&b, None, &Value::I32(6), &Value::I32(7), true, true, true).unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn equi_nil_on_nonil_column_is_empty() {
        let b = Bat::from_vec(vec![1i32, 2, 3]);
        let r = select(&b, None, &Value::Nil, &Value::Nil, true, true, false).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn sorted_column_uses_binary_search_bounds() {
        let b = Bat::from_vec(vec![1i64, 3, 5, 7, 9, 11]);
        assert!(b.props().sorted);
        let r = select(&b, None, &Value::I64(4), &Value::I64(9), true, true, false).unwrap();
        assert_eq!(r, Candidates::dense(2, 3));
    }

    #[test]
    fn candidate_restriction_applies() {
        let b = Bat::from_vec(vec![5i32, 6, 7, 8, 9]);
        let cand = Candidates::from_vec(vec![0, 2, 4]).unwrap();
        let r = select(
            &b,
            Some(&cand),
            &Value::I32(6),
            &Value::I32(9),
            true,
            true,
            false,
        )
        .unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![2, 4]);
    }

    #[test]
    fn equality_via_hash_matches_scan() {
        let data: Vec<i32> = (0..30_000).map(|i| i % 97).collect();
        let mut b = Bat::from_vec(data.clone());
        b.set_role(Role::Persistent);
        let r = theta_select(&b, None, &Value::I32(13), "=").unwrap();
        let expect: Vec<Oid> = (0..data.len())
            .filter(|&i| data[i] == 13)
            .map(|i| i as Oid)
            .collect();
        assert_eq!(r.iter().collect::<Vec<_>>(), expect);
        // second call hits the cached index
        let r2 = theta_select(&b, None, &Value::I32(13), "=").unwrap();
        assert_eq!(r2.iter().collect::<Vec<_>>(), expect);
    }

    #[test]
    fn range_via_imprints_matches_scan() {
        let data: Vec<i64> = (0..40_000).map(|i| (i * 7919) % 10_000).collect();
        let mut b = Bat::from_vec(data.clone());
        b.set_role(Role::Persistent);
        let r = select(
            &b,
            None,
            &Value::I64(100),
            &Value::I64(220),
            true,
            false,
            false,
        )
        .unwrap();
        let expect: Vec<Oid> = (0..data.len())
            .filter(|&i| data[i] >= 100 && data[i] < 220)
            .map(|i| i as Oid)
            .collect();
        assert_eq!(r.iter().collect::<Vec<_>>(), expect);
    }

    #[test]
    fn string_selects() {
        let b = Bat::from_strs(vec![
            Some("cherry"),
            Some("apple"),
            None,
            Some("banana"),
            Some("apple"),
        ]);
        let apple = Value::Str("apple".into());
        let r = theta_select(&b, None, &apple, "=").unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![1, 4]);

        let r = theta_select(&b, None, &Value::Str("banana".into()), "<=").unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![1, 3, 4]);

        // anti excludes nils
        let r = theta_select(&b, None, &apple, "!=").unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![0, 3]);

        // nil-to-nil selects exactly the nil row
        let r = select(&b, None, &Value::Nil, &Value::Nil, true, true, false).unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn theta_operators() {
        let b = Bat::from_vec(vec![10i32, 20, 30]);
        assert_eq!(
            theta_select(&b, None, &Value::I32(20), "<").unwrap(),
            Candidates::dense(0, 1)
        );
        assert_eq!(
            theta_select(&b, None, &Value::I32(20), "<=").unwrap(),
            Candidates::dense(0, 2)
        );
        assert_eq!(
            theta_select(&b, None, &Value::I32(20), ">").unwrap(),
            Candidates::dense(2, 1)
        );
        assert!(theta_select(&b, None, &Value::I32(20), "~").is_err());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let b = Bat::from_vec(vec![1i32]);
        assert!(matches!(
            theta_select(&b, None, &Value::I64(1), "="),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn empty_input_short_circuits() {
        let b = Bat::new(AtomType::I32);
        let r = theta_select(&b, None, &Value::I32(1), "=").unwrap();
        assert!(r.is_empty());
    }
}
