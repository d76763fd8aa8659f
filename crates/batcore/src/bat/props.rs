//! Structural property derivation, centralized
//!
//! Properties are one-sided: a set flag is a promise (the engines rely on
//! it), a cleared flag only means "not known". Every rule that sets or
//! clears a flag lives here so mutators and constructors cannot drift
//! apart. Appends use the boundary rule: only the junction between old tail
//! and new chunk is inspected, never the full column.

use std::cmp::Ordering;

use crate::atom::{Atom, AtomType, Oid};
use crate::bat::Bat;

/// Structural facts about a column tail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Props {
    /// Non-decreasing, nils first
    pub sorted: bool,
    /// Non-increasing, nils last
    pub revsorted: bool,
    /// All rows distinct
    pub key: bool,
    /// Consecutive oid run (void, or materialized equivalent)
    pub dense: bool,
    /// Known to contain no nil
    pub nonil: bool,
    /// Known to contain at least one nil
    pub nil: bool,
}

impl Props {
    /// Properties of an empty tail: vacuously ordered, keyed, nil-free
    pub fn empty() -> Self {
        Props {
            sorted: true,
            revsorted: true,
            key: true,
            dense: false,
            nonil: true,
            nil: false,
        }
    }

    /// Properties of a void tail `(seq, count)`
    pub fn for_void(seq: Oid, count: usize) -> Self {
        if seq.is_nil() {
            // every row reads as nil; all rows equal
            Props {
                sorted: true,
                revsorted: true,
                key: count <= 1,
                dense: false,
                nonil: count == 0,
                nil: count > 0,
            }
        } else {
            Props {
                sorted: true,
                revsorted: count <= 1,
                key: true,
                dense: true,
                nonil: true,
                nil: false,
            }
        }
    }

    /// Properties of `count` copies of a single value
    pub fn for_constant(is_nil: bool, count: usize) -> Self {
        Props {
            sorted: true,
            revsorted: true,
            key: count <= 1,
            dense: false,
            nonil: count == 0 || !is_nil,
            nil: count > 0 && is_nil,
        }
    }

    /// Properties inherited by a contiguous slice of a column
    ///
    /// Order, keyness and density survive slicing. Nil presence does not:
    /// the slice may have skipped every nil, so only `nonil` carries over.
    pub fn for_slice(parent: &Props, count: usize) -> Self {
        Props {
            sorted: parent.sorted || count <= 1,
            revsorted: parent.revsorted || count <= 1,
            key: parent.key || count <= 1,
            dense: parent.dense,
            nonil: parent.nonil,
            nil: false,
        }
    }

    /// Properties after reversing the row order in place
    pub fn reversed(&self) -> Self {
        Props {
            sorted: self.revsorted,
            revsorted: self.sorted,
            key: self.key,
            dense: false,
            nonil: self.nonil,
            nil: self.nil,
        }
    }
}

/// What the junction between an existing tail and an appended chunk looks
/// like. `cmp` is `None` when either side is empty.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Boundary {
    /// Order of (last existing value, first appended value)
    pub cmp: Option<Ordering>,
    /// First appended oid is exactly last existing oid + 1
    pub consecutive: bool,
}

impl Boundary {
    pub(crate) fn none() -> Self {
        Boundary {
            cmp: None,
            consecutive: false,
        }
    }
}

/// Boundary rule: combine the properties of the existing tail and the
/// appended chunk by looking only at the junction
pub(crate) fn after_append(
    dst: Props,
    dst_count: usize,
    chunk: Props,
    chunk_count: usize,
    boundary: Boundary,
) -> Props {
    if dst_count == 0 {
        return chunk;
    }
    if chunk_count == 0 {
        return dst;
    }
    let asc = boundary.cmp.is_some_and(|c| c != Ordering::Greater);
    let desc = boundary.cmp.is_some_and(|c| c != Ordering::Less);
    let strict_asc = boundary.cmp == Some(Ordering::Less);
    let strict_desc = boundary.cmp == Some(Ordering::Greater);
    let sorted = dst.sorted && chunk.sorted && asc;
    let revsorted = dst.revsorted && chunk.revsorted && desc;
    Props {
        sorted,
        revsorted,
        // keyness is only cheap to maintain along a monotone junction
        key: dst.key
            && chunk.key
            && ((sorted && strict_asc) || (revsorted && strict_desc)),
        dense: dst.dense && chunk.dense && boundary.consecutive,
        nonil: dst.nonil && chunk.nonil,
        nil: dst.nil || chunk.nil,
    }
}

/// Full-scan derivation for a fixed-width tail
pub(crate) fn derive_fixed<T: Atom>(vals: &[T]) -> Props {
    let mut sorted = true;
    let mut revsorted = true;
    let mut strict_asc = true;
    let mut strict_desc = true;
    let mut nil = false;
    if !vals.is_empty() && vals[0].is_nil() {
        nil = true;
    }
    for w in vals.windows(2) {
        if w[1].is_nil() {
            nil = true;
        }
        match w[0].atom_cmp(w[1]) {
            Ordering::Less => {
                revsorted = false;
                strict_desc = false;
            }
            Ordering::Greater => {
                sorted = false;
                strict_asc = false;
            }
            Ordering::Equal => {
                strict_asc = false;
                strict_desc = false;
            }
        }
    }
    let key = vals.len() <= 1 || (sorted && strict_asc) || (revsorted && strict_desc);
    let dense = T::atom_type() == AtomType::Oid
        && !nil
        && !vals.is_empty()
        && vals
            .windows(2)
            .all(|w| !w[0].is_nil() && w[0].next_up() == w[1] && w[0] < w[1]);
    Props {
        sorted,
        revsorted,
        key,
        dense,
        nonil: !nil,
        nil,
    }
}

/// Full-scan derivation for a string tail
pub(crate) fn derive_str(b: &Bat) -> Props {
    let mut sorted = true;
    let mut revsorted = true;
    let mut strict = true;
    let mut nil = false;
    let mut prev: Option<Option<&str>> = None;
    for pos in 0..b.count() {
        let cur = b.str_at(pos).unwrap_or(None);
        if cur.is_none() {
            nil = true;
        }
        if let Some(p) = prev {
            // nil sorts before every string
            let cmp = match (p, cur) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            };
            match cmp {
                Ordering::Less => revsorted = false,
                Ordering::Greater => sorted = false,
                Ordering::Equal => strict = false,
            }
        }
        prev = Some(cur);
    }
    let key = b.count() <= 1 || (strict && (sorted || revsorted));
    Props {
        sorted,
        revsorted,
        key,
        dense: false,
        nonil: !nil,
        nil,
    }
}
