//! Candidate lists: sorted, duplicate-free oid sets handed between operators
//!
//! A candidate list is either a dense run `[first, first+count)` with no
//! backing storage, or a materialized strictly ascending oid vector. Every
//! constructor virtualizes: a materialized list whose oids happen to form a
//! consecutive run is collapsed to the dense form, so downstream operators
//! can rely on `Dense` meaning "no storage, pure arithmetic". Nil oids never
//! appear in a candidate list.

use crate::atom::{Atom, Oid};
use crate::bat::{Bat, FixedAtom, Props, TailStorage};
use crate::error::{Error, Result};

/// A sorted, duplicate-free set of row oids
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    /// The consecutive run `[first, first + count)`
    Dense {
        /// First oid of the run
        first: Oid,
        /// Run length
        count: usize,
    },
    /// Strictly ascending oids; never consecutive end to end (that form is
    /// collapsed to `Dense` on construction)
    Materialized(Vec<Oid>),
}

impl Candidates {
    /// The empty list
    pub fn empty() -> Self {
        Candidates::Dense { first: 0, count: 0 }
    }

    /// The dense run `[first, first + count)`
    pub fn dense(first: Oid, count: usize) -> Self {
        Candidates::Dense { first, count }
    }

    /// Build from an oid vector, verifying it is strictly ascending and
    /// nil-free, then virtualizing
    pub fn from_vec(v: Vec<Oid>) -> Result<Self> {
        if v.last().is_some_and(|l| l.is_nil()) {
            return Err(Error::invalid_argument("candidate list contains nil"));
        }
        if v.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::invalid_argument(
                "candidate list must be strictly ascending",
            ));
        }
        Ok(Self::from_sorted(v))
    }

    /// Build from a vector the caller guarantees strictly ascending and
    /// nil-free
    pub(crate) fn from_sorted(v: Vec<Oid>) -> Self {
        debug_assert!(v.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(!v.last().is_some_and(|l| l.is_nil()));
        match (v.first(), v.last()) {
            (Some(&first), Some(&last)) if last - first == (v.len() - 1) as Oid => {
                Candidates::Dense {
                    first,
                    count: v.len(),
                }
            }
            (None, _) => Self::empty(),
            _ => Candidates::Materialized(v),
        }
    }

    /// Element count
    pub fn len(&self) -> usize {
        match self {
            Candidates::Dense { count, .. } => *count,
            Candidates::Materialized(v) => v.len(),
        }
    }

    /// True if the list is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest oid, if any
    pub fn first(&self) -> Option<Oid> {
        match self {
            Candidates::Dense { count: 0, .. } => None,
            Candidates::Dense { first, .. } => Some(*first),
            Candidates::Materialized(v) => v.first().copied(),
        }
    }

    /// Largest oid, if any
    pub fn last(&self) -> Option<Oid> {
        match self {
            Candidates::Dense { count: 0, .. } => None,
            Candidates::Dense { first, count } => Some(first + (count - 1) as Oid),
            Candidates::Materialized(v) => v.last().copied(),
        }
    }

    /// Oid at list position `i`
    ///
    /// # Panics
    /// When `i` is out of range.
    pub fn get(&self, i: usize) -> Oid {
        match self {
            Candidates::Dense { first, count } => {
                assert!(i < *count);
                first + i as Oid
            }
            Candidates::Materialized(v) => v[i],
        }
    }

    /// Iterate the oids in ascending order
    pub fn iter(&self) -> CandIter<'_> {
        match self {
            Candidates::Dense { first, count } => CandIter::Range(*first..*first + *count as Oid),
            Candidates::Materialized(v) => CandIter::Slice(v.iter()),
        }
    }

    /// Membership test; dense lists answer by arithmetic, materialized by
    /// binary search
    pub fn contains(&self, oid: Oid) -> bool {
        match self {
            Candidates::Dense { first, count } => {
                oid >= *first && oid - *first < *count as Oid
            }
            Candidates::Materialized(v) => v.binary_search(&oid).is_ok(),
        }
    }

    /// Number of list positions before the first oid `>= oid`
    pub fn rank(&self, oid: Oid) -> usize {
        match self {
            Candidates::Dense { first, count } => {
                if oid <= *first {
                    0
                } else {
                    ((oid - *first) as usize).min(*count)
                }
            }
            Candidates::Materialized(v) => v.partition_point(|&x| x < oid),
        }
    }

    /// The sub-list of positions `[lo, hi)`
    pub fn slice(&self, lo: usize, hi: usize) -> Self {
        let hi = hi.min(self.len());
        let lo = lo.min(hi);
        match self {
            Candidates::Dense { first, .. } => Candidates::Dense {
                first: first + lo as Oid,
                count: hi - lo,
            },
            Candidates::Materialized(v) => Self::from_sorted(v[lo..hi].to_vec()),
        }
    }

    /// Set union; two dense lists that overlap or touch stay dense without
    /// materializing
    pub fn merge(&self, other: &Candidates) -> Candidates {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        if let (
            Candidates::Dense { first: a, count: n },
            Candidates::Dense { first: b, count: m },
        ) = (self, other)
        {
            let (a, n, b, m) = if a <= b { (*a, *n, *b, *m) } else { (*b, *m, *a, *n) };
            if b <= a + n as Oid {
                let end = (a + n as Oid).max(b + m as Oid);
                return Candidates::Dense {
                    first: a,
                    count: (end - a) as usize,
                };
            }
        }
        let mut out = Vec::with_capacity(self.len() + other.len());
        let mut x = self.iter().peekable();
        let mut y = other.iter().peekable();
        loop {
            match (x.peek(), y.peek()) {
                (Some(&a), Some(&b)) => {
                    if a < b {
                        out.push(a);
                        x.next();
                    } else if b < a {
                        out.push(b);
                        y.next();
                    } else {
                        out.push(a);
                        x.next();
                        y.next();
                    }
                }
                (Some(_), None) => {
                    out.extend(x);
                    break;
                }
                (None, Some(_)) => {
                    out.extend(y);
                    break;
                }
                (None, None) => break,
            }
        }
        Self::from_sorted(out)
    }

    /// Set intersection; dense inputs intersect by arithmetic
    pub fn intersect(&self, other: &Candidates) -> Candidates {
        match (self, other) {
            (
                Candidates::Dense { first: a, count: n },
                Candidates::Dense { first: b, count: m },
            ) => {
                let lo = (*a).max(*b);
                let hi = (a + *n as Oid).min(b + *m as Oid);
                if lo >= hi {
                    Self::empty()
                } else {
                    Candidates::Dense {
                        first: lo,
                        count: (hi - lo) as usize,
                    }
                }
            }
            (Candidates::Dense { first, count }, Candidates::Materialized(v))
            | (Candidates::Materialized(v), Candidates::Dense { first, count }) => {
                // clip the materialized side to the dense window
                let lo = v.partition_point(|&x| x < *first);
                let hi = v.partition_point(|&x| x < first + *count as Oid);
                Self::from_sorted(v[lo..hi].to_vec())
            }
            (Candidates::Materialized(x), Candidates::Materialized(y)) => {
                let mut out = Vec::with_capacity(x.len().min(y.len()));
                let (mut i, mut j) = (0, 0);
                while i < x.len() && j < y.len() {
                    match x[i].cmp(&y[j]) {
                        std::cmp::Ordering::Less => i += 1,
                        std::cmp::Ordering::Greater => j += 1,
                        std::cmp::Ordering::Equal => {
                            out.push(x[i]);
                            i += 1;
                            j += 1;
                        }
                    }
                }
                Self::from_sorted(out)
            }
        }
    }

    /// Materialize as a column: void-tailed for dense lists, oid-tailed
    /// otherwise; always sorted, keyed and nil-free
    pub fn into_bat(self) -> Bat {
        match self {
            Candidates::Dense { first, count } => Bat::dense(first, count),
            Candidates::Materialized(v) => {
                let count = v.len();
                let mut b = Bat::new(crate::atom::AtomType::Oid);
                b.set_tail(<Oid as FixedAtom>::make_storage(v));
                b.set_count(count);
                b.set_props(Props {
                    sorted: true,
                    revsorted: count <= 1,
                    key: true,
                    dense: false,
                    nonil: true,
                    nil: false,
                });
                b
            }
        }
    }

    /// Interpret a column as a candidate list
    ///
    /// The column must be a non-nil void, or a sorted keyed nil-free oid
    /// column.
    pub fn from_bat(b: &Bat) -> Result<Self> {
        match b.tail() {
            TailStorage::Void { seq } => {
                if seq.is_nil() && b.count() > 0 {
                    Err(Error::invalid_argument(
                        "candidate list cannot hold nil oids",
                    ))
                } else {
                    Ok(Candidates::Dense {
                        first: *seq,
                        count: b.count(),
                    })
                }
            }
            TailStorage::Oid(s) => {
                let p = b.props();
                if !(p.sorted && p.key && p.nonil) {
                    return Err(Error::invalid_argument(
                        "candidate column must be sorted, keyed and nil-free",
                    ));
                }
                Ok(Self::from_sorted(s.as_slice().to_vec()))
            }
            _ => Err(Error::type_mismatch("oid", b.tail_type().name())),
        }
    }
}

/// Iterator over a candidate list
pub enum CandIter<'a> {
    /// Dense run
    Range(std::ops::Range<Oid>),
    /// Materialized oids
    Slice(std::slice::Iter<'a, Oid>),
}

impl Iterator for CandIter<'_> {
    type Item = Oid;

    fn next(&mut self) -> Option<Oid> {
        match self {
            CandIter::Range(r) => r.next(),
            CandIter::Slice(it) => it.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            CandIter::Range(r) => r.size_hint(),
            CandIter::Slice(it) => it.size_hint(),
        }
    }
}

impl ExactSizeIterator for CandIter<'_> {}
