//! Ordering engine: slicing, reversal, projection and chainable sorting
//!
//! Slices are always zero-copy: tail storage is `Arc`-windowed, so a slice
//! shares the parent's bytes and any later mutation of either side copies
//! first. Sorting is indirect (an order permutation is sorted, then applied
//! by projection) and chainable in the refinement style: the order and
//! groups outputs of one [`subsort`] feed the next call to sort on a second
//! column within the ties of the first.

use tracing::debug;

use crate::atom::{value_cmp, Atom, Oid, Value, OID_NIL};
use crate::bat::{with_fixed, Bat, FixedAtom, Props, TailStorage};
use crate::error::{Error, Result};
use crate::heap::StrHeap;

/// Zero-copy view of rows `[lo, hi)`; the head stays aligned, so row `lo`
/// keeps its oid
pub fn slice(b: &Bat, lo: usize, hi: usize) -> Result<Bat> {
    if lo > hi || hi > b.count() {
        return Err(Error::invalid_argument("slice bounds out of range"));
    }
    let n = hi - lo;
    let mut out = match b.tail() {
        TailStorage::Void { seq } => {
            if seq.is_nil() {
                Bat::dense(OID_NIL, n)
            } else {
                Bat::dense(seq + lo as Oid, n)
            }
        }
        TailStorage::Str { offsets, heap } => {
            let mut out = Bat::new(crate::atom::AtomType::Str);
            out.set_tail(TailStorage::Str {
                offsets: offsets.view(lo, hi),
                heap: std::sync::Arc::clone(heap),
            });
            out.set_count(n);
            out.set_props(Props::for_slice(b.props(), n));
            out
        }
        tail => with_fixed!(
            tail,
            |s, T| {
                let mut out = Bat::new(<T as Atom>::atom_type());
                out.set_tail(<T as FixedAtom>::wrap_slice(s.view(lo, hi)));
                out.set_count(n);
                out.set_props(Props::for_slice(b.props(), n));
                out
            },
            unreachable!()
        ),
    };
    out.set_hseqbase(b.hseqbase() + lo as Oid);
    Ok(out)
}

/// Reverse the row order in place
pub fn revert(b: &mut Bat) -> Result<()> {
    if b.is_readonly() {
        return Err(Error::read_only("cannot revert a read-only column"));
    }
    if b.is_void() {
        b.materialize()?;
    }
    match b.tail_mut() {
        TailStorage::Void { .. } => return Err(Error::internal("void survived materialize")),
        TailStorage::Str { offsets, .. } => offsets.reverse(),
        tail => with_fixed!(tail, |s, _T| s.with_mut(|v| v.reverse()), unreachable!()),
    }
    b.set_props(b.props().reversed());
    b.drop_caches();
    Ok(())
}

/// Positional join: `out[i] = r[l[i]]`, with `l` an oid or void column
/// addressing the head of `r`; a nil oid projects a nil value
pub fn project(l: &Bat, r: &Bat) -> Result<Bat> {
    let base = r.hseqbase();
    let n = l.count();

    // dense map over a dense tail stays dense
    if let (Some(lseq), TailStorage::Void { seq: rseq }) = (l.tseq(), r.tail()) {
        if !lseq.is_nil() && !rseq.is_nil() {
            check_range(lseq, n, base, r.count())?;
            let mut out = Bat::dense(rseq + (lseq - base), n);
            out.set_hseqbase(l.hseqbase());
            return Ok(out);
        }
    }
    if !matches!(
        l.tail_type(),
        crate::atom::AtomType::Void | crate::atom::AtomType::Oid
    ) {
        return Err(Error::type_mismatch("oid", l.tail_type().name()));
    }

    let mut out = match r.tail() {
        TailStorage::Void { seq } => {
            let rseq = *seq;
            let mut v: Vec<Oid> = Vec::new();
            v.try_reserve(n)?;
            for i in 0..n {
                match row_oid(l, i)? {
                    Some(o) => {
                        check_range(o, 1, base, r.count())?;
                        v.push(if rseq.is_nil() { OID_NIL } else { rseq + (o - base) });
                    }
                    None => v.push(OID_NIL),
                }
            }
            Bat::from_vec(v)
        }
        TailStorage::Str { offsets, heap } => {
            // gather offsets and share the heap; no string is copied
            let mut gathered = crate::heap::OffsetArray::new();
            gathered.try_reserve(n)?;
            for i in 0..n {
                match row_oid(l, i)? {
                    Some(o) => {
                        check_range(o, 1, base, r.count())?;
                        gathered.push(offsets.get((o - base) as usize));
                    }
                    None => gathered.push(StrHeap::NIL_OFFSET),
                }
            }
            let mut out = Bat::new(crate::atom::AtomType::Str);
            out.set_tail(TailStorage::Str {
                offsets: gathered,
                heap: std::sync::Arc::clone(heap),
            });
            out.set_count(n);
            let p = crate::bat::props::derive_str(&out);
            out.set_props(p);
            out
        }
        tail => with_fixed!(
            tail,
            |s, T| {
                let vals = s.as_slice();
                let mut v: Vec<T> = Vec::new();
                v.try_reserve(n)?;
                for i in 0..n {
                    match row_oid(l, i)? {
                        Some(o) => {
                            check_range(o, 1, base, r.count())?;
                            v.push(vals[(o - base) as usize]);
                        }
                        None => v.push(<T as Atom>::NIL),
                    }
                }
                Bat::from_vec(v)
            },
            unreachable!()
        ),
    };
    out.set_hseqbase(l.hseqbase());
    Ok(out)
}

/// Outputs of one [`subsort`] step
pub struct SortResult {
    /// The input rows in sorted order
    pub sorted: Bat,
    /// Oid permutation into the input's head; feed it to the next step
    pub order: Bat,
    /// Group ids refined by this step's ties; feed them to the next step
    pub groups: Bat,
}

/// Sort a column, optionally within an existing order and grouping
///
/// With `order`/`groups` from a previous call on another column, this sorts
/// only inside each run of equal group ids, refining the ordering the way a
/// multi-column sort does. `stable` preserves the incoming relative order of
/// ties; `reverse` sorts descending with nils last.
pub fn subsort(
    b: &Bat,
    order: Option<&Bat>,
    groups: Option<&Bat>,
    reverse: bool,
    stable: bool,
) -> Result<SortResult> {
    let n = b.count();
    if let Some(o) = order {
        if o.count() != n {
            return Err(Error::ordering("order list must align with the input"));
        }
    }
    if let Some(g) = groups {
        if g.count() != n {
            return Err(Error::ordering("group ids must align with the input"));
        }
    }
    let base = b.hseqbase();
    // an input already in the requested order needs no comparisons; one in
    // the opposite order only a symmetric reversal
    if order.is_none() && groups.is_none() {
        let p = *b.props();
        let (forward, backward) = if reverse {
            (p.revsorted, p.sorted)
        } else {
            (p.sorted, p.revsorted)
        };
        if forward {
            return presorted(b, base, n, false);
        }
        // ties would flip under reversal, so stability demands unique keys
        if backward && (!stable || p.key) {
            return presorted(b, base, n, true);
        }
    }
    let mut positions: Vec<usize> = Vec::new();
    positions.try_reserve(n)?;
    match order {
        Some(o) => {
            for i in 0..n {
                match row_oid(o, i)? {
                    Some(x) if x >= base && ((x - base) as usize) < n => {
                        positions.push((x - base) as usize)
                    }
                    _ => {
                        return Err(Error::ordering(
                            "order list must reference rows of the input",
                        ))
                    }
                }
            }
        }
        None => positions.extend(0..n),
    }

    // runs of equal group ids delimit the regions we may reorder
    let mut runs: Vec<(usize, usize)> = Vec::new();
    match groups {
        Some(g) => {
            let mut s = 0;
            while s < n {
                let mut e = s + 1;
                while e < n && g.value(e) == g.value(s) {
                    e += 1;
                }
                runs.push((s, e));
                s = e;
            }
        }
        None => {
            if n > 0 {
                runs.push((0, n));
            }
        }
    }
    debug!(rows = n, runs = runs.len(), reverse, stable, "subsort");
    for &(s, e) in &runs {
        sort_run(b, &mut positions[s..e], reverse, stable);
    }

    let order_out = {
        let mut o = Bat::from_vec(
            positions
                .iter()
                .map(|&p| base + p as Oid)
                .collect::<Vec<Oid>>(),
        );
        // a permutation is always keyed and nil-free even when the scan
        // cannot see it
        let mut p = *o.props();
        p.key = true;
        p.nonil = true;
        p.nil = false;
        o.set_props(p);
        o
    };
    let sorted = project(&order_out, b)?;

    let mut gids: Vec<Oid> = Vec::new();
    gids.try_reserve(n)?;
    let mut gid: Oid = 0;
    let mut run_idx = 0;
    for i in 0..n {
        if i > 0 {
            let new_run = run_idx + 1 < runs.len() && runs[run_idx + 1].0 == i;
            if new_run {
                run_idx += 1;
            }
            if new_run || !rows_equal(b, positions[i - 1], positions[i]) {
                gid += 1;
            }
        }
        gids.push(gid);
    }
    let groups_out = Bat::from_vec(gids);

    Ok(SortResult {
        sorted,
        order: order_out,
        groups: groups_out,
    })
}

/// Plain ascending sort of one column
pub fn sort(b: &Bat) -> Result<Bat> {
    Ok(subsort(b, None, None, false, false)?.sorted)
}

/// Descending sort, nils last
pub fn sort_reverse(b: &Bat) -> Result<Bat> {
    Ok(subsort(b, None, None, true, false)?.sorted)
}

/// Ascending sort keeping the incoming relative order of ties
pub fn stable_sort(b: &Bat) -> Result<Bat> {
    Ok(subsort(b, None, None, false, true)?.sorted)
}

/// Descending sort keeping the incoming relative order of ties
pub fn stable_sort_reverse(b: &Bat) -> Result<Bat> {
    Ok(subsort(b, None, None, true, true)?.sorted)
}

fn presorted(b: &Bat, base: Oid, n: usize, reversed: bool) -> Result<SortResult> {
    let order_out = if reversed {
        let mut o = Bat::from_vec((0..n).rev().map(|p| base + p as Oid).collect::<Vec<Oid>>());
        let mut p = *o.props();
        p.key = true;
        p.nonil = true;
        p.nil = false;
        o.set_props(p);
        o
    } else {
        Bat::dense(base, n)
    };
    let mut sorted = b.clone();
    if reversed {
        revert(&mut sorted)?;
    }
    sorted.set_hseqbase(0);
    let mut gids: Vec<Oid> = Vec::new();
    gids.try_reserve(n)?;
    let mut gid: Oid = 0;
    for i in 0..n {
        if i > 0 && !rows_equal(&sorted, i - 1, i) {
            gid += 1;
        }
        gids.push(gid);
    }
    debug!(rows = n, reversed, "subsort fast path");
    Ok(SortResult {
        sorted,
        order: order_out,
        groups: Bat::from_vec(gids),
    })
}

fn sort_run(b: &Bat, positions: &mut [usize], reverse: bool, stable: bool) {
    if positions.len() <= 1 {
        return;
    }
    match b.tail() {
        // void values ascend with position, nothing to compare
        TailStorage::Void { .. } => {
            positions.sort_unstable();
            if reverse {
                positions.reverse();
            }
        }
        TailStorage::Str { offsets, heap } => {
            let key = |p: usize| heap.get(offsets.get(p));
            // None (nil) sorts first ascending, last descending
            let cmp = |a: &usize, b: &usize| {
                let c = key(*a).cmp(&key(*b));
                if reverse {
                    c.reverse()
                } else {
                    c
                }
            };
            if stable {
                positions.sort_by(cmp);
            } else {
                positions.sort_unstable_by(cmp);
            }
        }
        tail => with_fixed!(
            tail,
            |s, _T| {
                let vals = s.as_slice();
                let cmp = |a: &usize, b: &usize| {
                    let c = vals[*a].atom_cmp(vals[*b]);
                    if reverse {
                        c.reverse()
                    } else {
                        c
                    }
                };
                if stable {
                    positions.sort_by(cmp);
                } else {
                    positions.sort_unstable_by(cmp);
                }
            },
            unreachable!()
        ),
    }
}

fn rows_equal(b: &Bat, p1: usize, p2: usize) -> bool {
    match (b.value(p1), b.value(p2)) {
        (Some(x), Some(y)) => value_cmp(&x, &y) == Some(std::cmp::Ordering::Equal),
        _ => false,
    }
}

fn row_oid(l: &Bat, i: usize) -> Result<Option<Oid>> {
    match l.value(i) {
        Some(Value::Oid(o)) if !o.is_nil() => Ok(Some(o)),
        Some(Value::Nil) | Some(Value::Oid(_)) => Ok(None),
        _ => Err(Error::type_mismatch("oid", l.tail_type().name())),
    }
}

fn check_range(o: Oid, n: usize, base: Oid, count: usize) -> Result<()> {
    if o < base || (o - base) as usize + n > count {
        return Err(Error::invalid_argument(
            "projection oid out of the target's range",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_is_zero_copy_and_aligned() {
        let b = Bat::from_vec(vec![10i32, 20, 30, 40, 50]);
        let s = slice(&b, 1, 4).unwrap();
        assert_eq!(s.count(), 3);
        assert_eq!(s.hseqbase(), 1);
        assert_eq!(s.fixed_slice::<i32>().unwrap(), &[20, 30, 40]);
        assert!(s.props().sorted);
    }

    #[test]
    fn slice_of_void_shifts_the_run() {
        let b = Bat::dense(100, 10);
        let s = slice(&b, 3, 7).unwrap();
        assert!(s.is_void());
        assert_eq!(s.value(0), Some(Value::Oid(103)));
        assert_eq!(s.hseqbase(), 3);
    }

    #[test]
    fn revert_swaps_order_props() {
        let mut b = Bat::from_vec(vec![1i32, 2, 3]);
        revert(&mut b).unwrap();
        assert_eq!(b.fixed_slice::<i32>().unwrap(), &[3, 2, 1]);
        assert!(b.props().revsorted && !b.props().sorted);
    }

    #[test]
    fn sort_orders_with_nils_first() {
        let b = Bat::from_vec(vec![3i32, i32::NIL, 1, 2]);
        let s = sort(&b).unwrap();
        assert_eq!(s.fixed_slice::<i32>().unwrap(), &[i32::NIL, 1, 2, 3]);
        assert!(s.props().sorted && s.props().nil);
    }

    #[test]
    fn sort_variants_cover_both_directions() {
        let b = Bat::from_vec(vec![2i32, i32::NIL, 3, 1]);
        assert_eq!(
            sort_reverse(&b).unwrap().fixed_slice::<i32>().unwrap(),
            &[3, 2, 1, i32::NIL]
        );
        assert_eq!(
            stable_sort(&b).unwrap().fixed_slice::<i32>().unwrap(),
            &[i32::NIL, 1, 2, 3]
        );
        assert_eq!(
            stable_sort_reverse(&b).unwrap().fixed_slice::<i32>().unwrap(),
            &[3, 2, 1, i32::NIL]
        );
    }

    #[test]
    fn subsort_outputs_are_consistent() {
        let b = Bat::from_vec(vec![5i32, 1, 5, 2]);
        let r = subsort(&b, None, None, false, true).unwrap();
        assert_eq!(r.sorted.fixed_slice::<i32>().unwrap(), &[1, 2, 5, 5]);
        assert_eq!(r.order.fixed_slice::<Oid>().unwrap(), &[1, 3, 0, 2]);
        assert_eq!(r.groups.fixed_slice::<Oid>().unwrap(), &[0, 1, 2, 2]);
        // applying the permutation reproduces the sorted column
        let again = project(&r.order, &b).unwrap();
        assert_eq!(again.fixed_slice::<i32>().unwrap(), &[1, 2, 5, 5]);
    }

    #[test]
    fn chained_subsort_refines_within_groups() {
        // sort by a, then by b within ties of a
        let a = Bat::from_vec(vec![2i32, 1, 2, 1]);
        let b = Bat::from_vec(vec![9i32, 8, 7, 6]);
        let first = subsort(&a, None, None, false, true).unwrap();
        let second = subsort(&b, Some(&first.order), Some(&first.groups), false, true).unwrap();
        assert_eq!(second.sorted.fixed_slice::<i32>().unwrap(), &[6, 8, 7, 9]);
        let a_by_second = project(&second.order, &a).unwrap();
        assert_eq!(a_by_second.fixed_slice::<i32>().unwrap(), &[1, 1, 2, 2]);
    }

    #[test]
    fn reverse_sort_puts_nils_last() {
        let b = Bat::from_vec(vec![3i64, i64::NIL, 7]);
        let r = subsort(&b, None, None, true, false).unwrap();
        assert_eq!(
            r.sorted.fixed_slice::<i64>().unwrap(),
            &[7, 3, i64::NIL]
        );
        assert!(r.sorted.props().revsorted);
    }

    #[test]
    fn project_gathers_and_handles_nil_oids() {
        let r = Bat::from_vec(vec![10i32, 20, 30]);
        let mut l = Bat::from_vec(vec![2 as Oid, 0]);
        crate::mutate::append_value(&mut l, &Value::Nil, false).unwrap();
        let out = project(&l, &r).unwrap();
        assert_eq!(
            out.fixed_slice::<i32>().unwrap(),
            &[30, 10, i32::NIL]
        );
    }

    #[test]
    fn project_strings_shares_heap() {
        let r = Bat::from_strs(vec![Some("a"), Some("b"), Some("c")]);
        let l = Bat::from_vec(vec![2 as Oid, 2, 0]);
        let out = project(&l, &r).unwrap();
        assert_eq!(out.str_at(0), Some(Some("c")));
        assert_eq!(out.str_at(2), Some(Some("a")));
        let (TailStorage::Str { heap: h1, .. }, TailStorage::Str { heap: h2, .. }) =
            (out.tail(), r.tail())
        else {
            panic!("string tails expected");
        };
        assert!(std::sync::Arc::ptr_eq(h1, h2));
    }

    #[test]
    fn project_dense_over_dense_stays_dense() {
        let r = Bat::dense(50, 10);
        let l = Bat::dense(2, 5); // rows 2..7 of r
        let out = project(&l, &r).unwrap();
        assert!(out.is_void());
        assert_eq!(out.value(0), Some(Value::Oid(52)));
    }

    #[test]
    fn project_rejects_out_of_range() {
        let r = Bat::from_vec(vec![1i32]);
        let l = Bat::from_vec(vec![7 as Oid]);
        assert!(project(&l, &r).is_err());
    }
}
