//! Mutation engine: append, positional insert, delete, and in-place replace
//!
//! Appends maintain structural properties with the boundary rule: only the
//! junction between the existing tail and the appended chunk is compared,
//! never the whole column. String appends pick between three strategies
//! (share the source heap outright, copy it wholesale with offset
//! translation, or insert row by row) based on a small sample of the
//! incoming strings. Imprints are dropped on every mutation; a cached hash
//! index is extended in place when it is exclusively owned and dropped
//! otherwise.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::atom::{value_cmp, Atom, AtomType, Oid, Value, OID_NIL};
use crate::bat::props::{self, Boundary};
use crate::bat::{check_head_overflow, with_fixed, Bat, FixedAtom, Props, Role, TailStorage};
use crate::candidates::Candidates;
use crate::error::{Error, Result};
use crate::heap::{OffsetArray, StrHeap};

/// Incoming strings sampled to choose an append strategy
const STR_SAMPLE: usize = 1024;
/// Sampled-match cutoff (out of [`STR_SAMPLE`]) below which a heap bulk copy
/// is considered
const STR_MATCH_CUTOFF: usize = 768;

/// Append all rows of `src` to `dst`
///
/// `force` overrides the read-only check; views handed out earlier keep
/// seeing the old data because shared storage is copied before writing.
pub fn append(dst: &mut Bat, src: &Bat, force: bool) -> Result<()> {
    check_writable(dst, force, "append")?;
    if src.is_empty() {
        return Ok(());
    }
    check_head_overflow(dst.hseqbase(), dst.count() + src.count())?;
    check_key_append(dst, src)?;

    // a void destination stays void when the source continues its run
    if let (TailStorage::Void { seq: d }, TailStorage::Void { seq: s }) = (dst.tail(), src.tail())
    {
        let (d, s) = (*d, *s);
        let continues = dst.is_empty()
            || (d.is_nil() && s.is_nil())
            || (!d.is_nil() && !s.is_nil() && s == d + dst.count() as Oid);
        if continues {
            let seq = if dst.is_empty() { s } else { d };
            let n = dst.count() + src.count();
            dst.set_tail(TailStorage::Void { seq });
            dst.set_count(n);
            dst.set_props(Props::for_void(seq, n));
            finish_append(dst, src.count());
            return Ok(());
        }
    }
    if dst.is_void() {
        dst.materialize()?;
    }

    let old_count = dst.count();
    let old_props = *dst.props();
    let boundary = boundary_of(dst, src);
    let chunk = *src.props();

    match (dst.tail_type(), src.tail_type()) {
        (a, b) if a == b && a.is_fixed() => append_fixed(dst, src)?,
        (AtomType::Oid, AtomType::Void) => append_void_rows(dst, src)?,
        (AtomType::Str, AtomType::Str) => append_str(dst, src)?,
        (a, b) => return Err(Error::type_mismatch(a.name(), b.name())),
    }

    dst.set_count(old_count + src.count());
    dst.set_props(props::after_append(
        old_props,
        old_count,
        chunk,
        src.count(),
        boundary,
    ));
    finish_append(dst, src.count());
    Ok(())
}

/// Append a single value; its type must match the destination tail
pub fn append_value(dst: &mut Bat, v: &Value, force: bool) -> Result<()> {
    let chunk = singleton_like(dst, v)?;
    append(dst, &chunk, force)
}

/// Overwrite the rows at `positions` (an oid or void column) with the
/// aligned rows of `values`
pub fn replace(dst: &mut Bat, positions: &Bat, values: &Bat, force: bool) -> Result<()> {
    check_writable(dst, force, "replace")?;
    if positions.count() != values.count() {
        return Err(Error::invalid_argument(
            "update positions and values must align",
        ));
    }
    if positions.is_empty() {
        return Ok(());
    }
    if !matches!(positions.tail_type(), AtomType::Void | AtomType::Oid) {
        return Err(Error::type_mismatch("oid", positions.tail_type().name()));
    }
    if dst.is_void() {
        return Err(Error::mutation("cannot update a void column in place"));
    }

    let base = dst.hseqbase();
    let mut targets: Vec<usize> = Vec::with_capacity(positions.count());
    for i in 0..positions.count() {
        let o = match positions.value(i) {
            Some(Value::Oid(o)) if !o.is_nil() => o,
            _ => return Err(Error::invalid_argument("nil update position")),
        };
        if o < base || (o - base) as usize >= dst.count() {
            return Err(Error::invalid_argument("update position out of range"));
        }
        targets.push((o - base) as usize);
    }
    check_key_replace(dst, &targets, values)?;

    let mut p = *dst.props();
    p.dense = false;
    if dst.count() > 1 {
        p.key = false;
    }
    // the replaced row may have been the only nil; presence is unknown now
    p.nil = false;
    for (i, &pos) in targets.iter().enumerate() {
        let v = values.value(i).unwrap_or(Value::Nil);
        set_row(dst, pos, &v)?;
        if v.is_nil() {
            p.nil = true;
            p.nonil = false;
        }
        // order survives only if the new value still fits its neighbors
        if pos > 0 {
            note_pair(&mut p, dst.value(pos - 1), Some(v.clone()));
        }
        if pos + 1 < dst.count() {
            note_pair(&mut p, Some(v), dst.value(pos + 1));
        }
    }
    dst.set_props(p);
    dst.drop_caches();
    dst.clear_hints();
    Ok(())
}

/// Insert the rows of `src` before position `at`, shifting later rows down
///
/// The column is rebuilt as head + src + tail; each junction goes through
/// the append path, so property maintenance and the string heap strategies
/// apply unchanged.
pub fn insert_at(dst: &mut Bat, at: usize, src: &Bat, force: bool) -> Result<()> {
    check_writable(dst, force, "insert")?;
    if at > dst.count() {
        return Err(Error::invalid_argument("insert position out of range"));
    }
    if at == dst.count() {
        return append(dst, src, force);
    }
    if src.is_empty() {
        return Ok(());
    }
    let head = crate::order::slice(dst, 0, at)?;
    let tail = crate::order::slice(dst, at, dst.count())?;
    let mut merged = Bat::new(dst.tail_type());
    merged.set_key_constraint(dst.key_constraint());
    append(&mut merged, &head, false)?;
    append(&mut merged, src, false)?;
    append(&mut merged, &tail, false)?;
    merged.set_hseqbase(dst.hseqbase());
    merged.set_role(dst.role());
    merged.set_access(dst.access());
    debug!(rows = src.count(), at, "insert");
    *dst = merged;
    Ok(())
}

/// Remove the rows at `positions`; later rows shift up to close the gaps
///
/// `positions` must be a sorted, duplicate-free oid (or void) column within
/// the destination's head range.
pub fn delete(dst: &mut Bat, positions: &Bat, force: bool) -> Result<()> {
    check_writable(dst, force, "delete")?;
    if positions.is_empty() {
        return Ok(());
    }
    let cand = Candidates::from_bat(positions)?;
    let base = dst.hseqbase();
    let n = dst.count();
    let (Some(first), Some(last)) = (cand.first(), cand.last()) else {
        return Ok(());
    };
    if first < base || (last - base) as usize >= n {
        return Err(Error::invalid_argument("delete position out of range"));
    }
    let removed = cand.len();

    // a void column survives losing a prefix or a suffix of its run
    if let TailStorage::Void { seq } = dst.tail() {
        let seq = *seq;
        if let Candidates::Dense { first, count } = &cand {
            let prefix = *first == base;
            let suffix = (*first - base) as usize + count == n;
            if prefix || suffix {
                let seq = if prefix && !seq.is_nil() {
                    seq + *count as Oid
                } else {
                    seq
                };
                let keep = n - count;
                dst.set_tail(TailStorage::Void { seq });
                dst.set_count(keep);
                dst.set_props(Props::for_void(seq, keep));
                dst.drop_caches();
                return Ok(());
            }
        }
        dst.materialize()?;
    }

    match dst.tail_mut() {
        TailStorage::Str { offsets, .. } => {
            // dropped slots stay in the heap; that costs space, never
            // correctness
            let mut kept = OffsetArray::new();
            kept.try_reserve(n - removed)?;
            for i in 0..n {
                if !cand.contains(base + i as Oid) {
                    kept.push(offsets.get(i));
                }
            }
            *offsets = kept;
        }
        tail => with_fixed!(
            tail,
            |s, _T| {
                let mut kept = Vec::new();
                kept.try_reserve(n - removed)?;
                for (i, v) in s.as_slice().iter().enumerate() {
                    if !cand.contains(base + i as Oid) {
                        kept.push(*v);
                    }
                }
                *s = crate::bat::FixedSlice::from_vec(kept);
                Ok::<(), Error>(())
            },
            Err(Error::internal("delete on a void tail"))
        )?,
    }

    // row removal keeps order and uniqueness; nil presence becomes unknown
    let mut p = *dst.props();
    p.dense = false;
    p.nil = false;
    dst.set_count(n - removed);
    dst.set_props(p);
    dst.drop_caches();
    debug!(rows = removed, "delete");
    Ok(())
}

fn note_pair(p: &mut Props, a: Option<Value>, b: Option<Value>) {
    match (a, b) {
        (Some(a), Some(b)) => match value_cmp(&a, &b) {
            Some(std::cmp::Ordering::Greater) => p.sorted = false,
            Some(std::cmp::Ordering::Less) => p.revsorted = false,
            Some(std::cmp::Ordering::Equal) => {}
            None => {
                p.sorted = false;
                p.revsorted = false;
            }
        },
        _ => {
            p.sorted = false;
            p.revsorted = false;
        }
    }
}

fn check_writable(b: &Bat, force: bool, what: &str) -> Result<()> {
    if b.is_readonly() && !force {
        return Err(Error::read_only(format!(
            "{what} on a read-only column requires force"
        )));
    }
    Ok(())
}

fn boundary_of(dst: &Bat, src: &Bat) -> Boundary {
    let (Some(last), Some(first)) = (
        dst.count().checked_sub(1).and_then(|p| dst.value(p)),
        src.value(0),
    ) else {
        return Boundary::none();
    };
    let consecutive = matches!(
        (&last, &first),
        (Value::Oid(x), Value::Oid(y)) if !x.is_nil() && *y == x + 1
    );
    Boundary {
        cmp: value_cmp(&last, &first),
        consecutive,
    }
}

fn append_fixed(dst: &mut Bat, src: &Bat) -> Result<()> {
    with_fixed!(
        dst.tail_mut(),
        |s, T| {
            let other = <T as FixedAtom>::fixed(src.tail())
                .ok_or_else(|| Error::internal("append_fixed type drift"))?;
            s.with_mut(|v| -> Result<()> {
                v.try_reserve(other.len())?;
                v.extend_from_slice(other.as_slice());
                Ok(())
            })
        },
        Err(Error::internal("append_fixed on non-fixed tail"))
    )
}

fn append_void_rows(dst: &mut Bat, src: &Bat) -> Result<()> {
    let Some(seq) = src.tseq() else {
        return Err(Error::internal("void source expected"));
    };
    let n = src.count();
    let Some(s) = <Oid as FixedAtom>::fixed_mut(dst.tail_mut()) else {
        return Err(Error::internal("oid destination expected"));
    };
    s.with_mut(|v| -> Result<()> {
        v.try_reserve(n)?;
        if seq.is_nil() {
            v.resize(v.len() + n, OID_NIL);
        } else {
            v.extend(seq..seq + n as Oid);
        }
        Ok(())
    })
}

fn append_str(dst: &mut Bat, src: &Bat) -> Result<()> {
    let TailStorage::Str {
        offsets: soff,
        heap: sheap,
    } = src.tail()
    else {
        return Err(Error::internal("string source expected"));
    };
    let n = src.count();

    // empty transient destination: adopt the source heap by reference
    if dst.is_empty() && dst.role() == Role::Transient {
        debug!(rows = n, "string append shares the source heap");
        dst.set_tail(TailStorage::Str {
            offsets: soff.view(0, n),
            heap: Arc::clone(sheap),
        });
        return Ok(());
    }

    let TailStorage::Str { offsets, heap } = dst.tail_mut() else {
        return Err(Error::internal("string destination expected"));
    };

    // sample the incoming strings: if few already exist here and they make
    // up most of the source heap, copying that heap wholesale is cheaper
    // than inserting row by row
    let samples = n.min(STR_SAMPLE);
    let mut rng = StdRng::seed_from_u64(n as u64 ^ sheap.used() as u64);
    let mut matches = 0usize;
    let mut sampled_bytes = 0usize;
    for _ in 0..samples {
        let pos = rng.gen_range(0..n);
        match sheap.get(soff.get(pos)) {
            Some(s) => {
                sampled_bytes += s.len();
                if heap.probe(s).is_some() {
                    matches += 1;
                }
            }
            None => matches += 1,
        }
    }
    let extrapolated = sampled_bytes * n / samples;
    offsets.try_reserve(n)?;
    if matches * STR_SAMPLE < samples * STR_MATCH_CUTOFF && extrapolated >= sheap.used() / 2 {
        debug!(rows = n, bytes = sheap.used(), "string append bulk-copies the source heap");
        let toff = Arc::make_mut(heap).bulk_copy_from(sheap)?;
        offsets.extend_translated(soff, 0, n, toff);
    } else {
        debug!(rows = n, "string append inserts row by row");
        let h = Arc::make_mut(heap);
        for pos in 0..n {
            match sheap.get(soff.get(pos)) {
                Some(s) => offsets.push(h.try_put(s)?),
                None => offsets.push(StrHeap::NIL_OFFSET),
            }
        }
    }
    Ok(())
}

fn set_row(dst: &mut Bat, pos: usize, v: &Value) -> Result<()> {
    match dst.tail_mut() {
        TailStorage::Void { .. } => Err(Error::mutation("cannot update a void column in place")),
        TailStorage::Str { offsets, heap } => match v {
            Value::Str(s) => {
                let off = Arc::make_mut(heap).try_put(s)?;
                offsets.set(pos, off);
                Ok(())
            }
            Value::Nil => {
                offsets.set(pos, StrHeap::NIL_OFFSET);
                Ok(())
            }
            _ => Err(Error::type_mismatch("str", value_type_name(v))),
        },
        tail => with_fixed!(
            tail,
            |s, T| match <T as Atom>::from_value(v) {
                Some(x) => {
                    s.with_mut(|vec| vec[pos] = x);
                    Ok(())
                }
                None => Err(Error::type_mismatch(
                    <T as Atom>::atom_type().name(),
                    value_type_name(v)
                )),
            },
            unreachable!()
        ),
    }
}

fn singleton_like(dst: &Bat, v: &Value) -> Result<Bat> {
    match dst.tail_type() {
        AtomType::Void => match v {
            Value::Oid(o) => Ok(Bat::dense(*o, 1)),
            Value::Nil => Ok(Bat::dense(OID_NIL, 1)),
            _ => Err(Error::type_mismatch("void", value_type_name(v))),
        },
        AtomType::Str => match v {
            Value::Str(s) => Ok(Bat::from_strs([Some(s.as_str())])),
            Value::Nil => Ok(Bat::from_strs([None])),
            _ => Err(Error::type_mismatch("str", value_type_name(v))),
        },
        _ => with_fixed!(
            dst.tail(),
            |_s, T| match <T as Atom>::from_value(v) {
                Some(x) => Ok(Bat::from_vec(vec![x])),
                None => Err(Error::type_mismatch(
                    <T as Atom>::atom_type().name(),
                    value_type_name(v)
                )),
            },
            unreachable!()
        ),
    }
}

fn value_type_name(v: &Value) -> &'static str {
    v.atom_type().map(|t| t.name()).unwrap_or("nil")
}

fn rows_equal(a: &Bat, ap: usize, b: &Bat, bp: usize) -> bool {
    match (a.value(ap), b.value(bp)) {
        (Some(x), Some(y)) => value_cmp(&x, &y) == Some(std::cmp::Ordering::Equal),
        _ => false,
    }
}

fn check_key_append(dst: &Bat, src: &Bat) -> Result<()> {
    if !dst.key_constraint() {
        return Ok(());
    }
    let hash = match dst.tail() {
        TailStorage::Void { .. } => None,
        _ if dst.is_empty() => None,
        _ => Some(dst.ensure_hash()?),
    };
    let mut local: HashMap<u64, Vec<usize>> = HashMap::new();
    for i in 0..src.count() {
        // dense destinations answer membership by arithmetic
        if let Some(seq) = dst.tseq() {
            let dup = if seq.is_nil() {
                dst.count() > 0 && src.value(i).is_some_and(|v| v.is_nil())
            } else {
                matches!(
                    src.value(i),
                    Some(Value::Oid(o)) if o >= seq && o < seq + dst.count() as Oid
                )
            };
            if dup {
                return Err(Error::ConstraintViolation(
                    "append would duplicate a key value".into(),
                ));
            }
        }
        let h = src.row_hash(i);
        if let Some(hx) = &hash {
            for pos in hx.probe(h) {
                if rows_equal(dst, pos, src, i) {
                    return Err(Error::ConstraintViolation(
                        "append would duplicate a key value".into(),
                    ));
                }
            }
        }
        if let Some(list) = local.get(&h) {
            for &j in list {
                if rows_equal(src, j, src, i) {
                    return Err(Error::ConstraintViolation(
                        "appended rows duplicate each other under a key constraint".into(),
                    ));
                }
            }
        }
        local.entry(h).or_default().push(i);
    }
    Ok(())
}

fn check_key_replace(dst: &Bat, targets: &[usize], values: &Bat) -> Result<()> {
    if !dst.key_constraint() {
        return Ok(());
    }
    let replaced: HashSet<usize> = targets.iter().copied().collect();
    let hash = dst.ensure_hash()?;
    let mut local: HashMap<u64, Vec<usize>> = HashMap::new();
    for i in 0..values.count() {
        let h = values.row_hash(i);
        for pos in hash.probe(h) {
            if !replaced.contains(&pos) && rows_equal(dst, pos, values, i) {
                return Err(Error::ConstraintViolation(
                    "update would duplicate a key value".into(),
                ));
            }
        }
        if let Some(list) = local.get(&h) {
            for &j in list {
                if rows_equal(values, j, values, i) {
                    return Err(Error::ConstraintViolation(
                        "updated rows duplicate each other under a key constraint".into(),
                    ));
                }
            }
        }
        local.entry(h).or_default().push(i);
    }
    Ok(())
}

fn finish_append(dst: &mut Bat, added: usize) {
    dst.drop_imprints();
    let start = dst.count() - added;
    dst.hash_push_or_drop((start..dst.count()).map(|p| dst.row_hash(p)));
    dst.clear_hints();
}
