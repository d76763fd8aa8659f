//! Column store: the BAT entity, its tail storage, and cached properties
//!
//! A [`Bat`] is a dense, position-addressable sequence of values. The head is
//! implicit: position `p` carries the oid `hseqbase + p`. The tail is one of:
//! - `Void`: a dense integer run `(seq, count)` with no backing array,
//! - a fixed-width vector per [`Atom`] type,
//! - `Str`: an offset array into a shared variable heap.
//!
//! Storage is `Arc`-windowed ([`FixedSlice`]), so a slice of a read-only
//! column is a zero-copy view that keeps the parent storage alive by
//! reference count, and a mutation of shared storage transparently breaks the
//! sharing (copy-on-write). Hash and imprint indexes are caches hanging off
//! the column behind `RwLock`s; dropping them never affects correctness.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::atom::{Atom, AtomType, Oid, Value, OID_NIL};
use crate::error::{Error, Result};
use crate::heap::{OffsetArray, StrHeap};
use crate::index::hash::HashIndex;
use crate::index::imprints::ImprintsAny;

pub mod props;

pub use props::Props;

/// Lifetime role of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Scratch column, may use zero-copy tricks freely
    Transient,
    /// Long-lived column, worth building indexes for
    Persistent,
}

/// Access mode of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Mutable by the engines
    ReadWrite,
    /// Frozen; slicing yields zero-copy views
    ReadOnly,
}

/// An `Arc`-backed window over a typed vector
///
/// Views share the `Arc` and narrow the window; mutation re-materializes the
/// window into exclusively owned storage first.
#[derive(Debug, Clone)]
pub struct FixedSlice<T> {
    data: Arc<Vec<T>>,
    off: usize,
    len: usize,
}

impl<T: Copy> FixedSlice<T> {
    /// New empty storage
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Take ownership of a vector
    pub fn from_vec(v: Vec<T>) -> Self {
        let len = v.len();
        Self {
            data: Arc::new(v),
            off: 0,
            len,
        }
    }

    /// Element count of the window
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the window is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The window as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.data[self.off..self.off + self.len]
    }

    /// Zero-copy sub-window `[lo, hi)` of this window
    pub fn view(&self, lo: usize, hi: usize) -> Self {
        debug_assert!(lo <= hi && hi <= self.len);
        Self {
            data: Arc::clone(&self.data),
            off: self.off + lo,
            len: hi - lo,
        }
    }

    /// Run a mutation against exclusively owned storage
    ///
    /// Breaks `Arc` sharing and collapses any view window first, so views
    /// handed out earlier keep seeing the old data.
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        if self.off != 0 || self.len != self.data.len() {
            let owned: Vec<T> = self.as_slice().to_vec();
            self.data = Arc::new(owned);
            self.off = 0;
        }
        let v = Arc::make_mut(&mut self.data);
        let r = f(v);
        self.len = v.len();
        r
    }

    /// Reserve room for `additional` elements, failing only on allocation
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.with_mut(|v| v.try_reserve(additional))
            .map_err(Error::from)
    }
}

impl<T: Copy> Default for FixedSlice<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Tail storage of a column
#[derive(Debug, Clone)]
pub enum TailStorage {
    /// Dense integer run; `seq == OID_NIL` means every row is nil
    Void {
        /// First tail value
        seq: Oid,
    },
    /// 8-bit integers
    I8(FixedSlice<i8>),
    /// 16-bit integers
    I16(FixedSlice<i16>),
    /// 32-bit integers
    I32(FixedSlice<i32>),
    /// 64-bit integers
    I64(FixedSlice<i64>),
    /// 32-bit floats
    F32(FixedSlice<f32>),
    /// 64-bit floats
    F64(FixedSlice<f64>),
    /// Position identifiers
    Oid(FixedSlice<Oid>),
    /// Offsets into a shared variable heap
    Str {
        /// Per-row heap offsets (1/2/4/8-byte width)
        offsets: OffsetArray,
        /// The shared string heap
        heap: Arc<StrHeap>,
    },
}

impl TailStorage {
    /// Runtime type tag
    pub fn atom_type(&self) -> AtomType {
        match self {
            TailStorage::Void { .. } => AtomType::Void,
            TailStorage::I8(_) => AtomType::I8,
            TailStorage::I16(_) => AtomType::I16,
            TailStorage::I32(_) => AtomType::I32,
            TailStorage::I64(_) => AtomType::I64,
            TailStorage::F32(_) => AtomType::F32,
            TailStorage::F64(_) => AtomType::F64,
            TailStorage::Oid(_) => AtomType::Oid,
            TailStorage::Str { .. } => AtomType::Str,
        }
    }

    fn empty_of(ty: AtomType) -> Self {
        match ty {
            AtomType::Void => TailStorage::Void { seq: 0 },
            AtomType::I8 => TailStorage::I8(FixedSlice::new()),
            AtomType::I16 => TailStorage::I16(FixedSlice::new()),
            AtomType::I32 => TailStorage::I32(FixedSlice::new()),
            AtomType::I64 => TailStorage::I64(FixedSlice::new()),
            AtomType::F32 => TailStorage::F32(FixedSlice::new()),
            AtomType::F64 => TailStorage::F64(FixedSlice::new()),
            AtomType::Oid => TailStorage::Oid(FixedSlice::new()),
            AtomType::Str => TailStorage::Str {
                offsets: OffsetArray::new(),
                heap: Arc::new(StrHeap::new()),
            },
        }
    }
}

/// An [`Atom`] that has a fixed-width tail storage variant
pub trait FixedAtom: Atom {
    /// Wrap a vector into the matching storage variant
    fn make_storage(v: Vec<Self>) -> TailStorage;
    /// Wrap an existing window into the matching storage variant
    fn wrap_slice(s: FixedSlice<Self>) -> TailStorage;
    /// Borrow the matching storage variant
    fn fixed(tail: &TailStorage) -> Option<&FixedSlice<Self>>;
    /// Mutably borrow the matching storage variant
    fn fixed_mut(tail: &mut TailStorage) -> Option<&mut FixedSlice<Self>>;
}

macro_rules! impl_fixed_atom {
    ($t:ty, $variant:ident) => {
        impl FixedAtom for $t {
            fn make_storage(v: Vec<Self>) -> TailStorage {
                TailStorage::$variant(FixedSlice::from_vec(v))
            }

            fn wrap_slice(s: FixedSlice<Self>) -> TailStorage {
                TailStorage::$variant(s)
            }

            fn fixed(tail: &TailStorage) -> Option<&FixedSlice<Self>> {
                match tail {
                    TailStorage::$variant(s) => Some(s),
                    _ => None,
                }
            }

            fn fixed_mut(tail: &mut TailStorage) -> Option<&mut FixedSlice<Self>> {
                match tail {
                    TailStorage::$variant(s) => Some(s),
                    _ => None,
                }
            }
        }
    };
}

impl_fixed_atom!(i8, I8);
impl_fixed_atom!(i16, I16);
impl_fixed_atom!(i32, I32);
impl_fixed_atom!(i64, I64);
impl_fixed_atom!(f32, F32);
impl_fixed_atom!(f64, F64);
impl_fixed_atom!(Oid, Oid);

/// Expands to `$body` with `$s` bound to the typed [`FixedSlice`] and `$t`
/// to the concrete element type, for each fixed-width storage variant.
/// `$fallback` handles void and str tails. Keeps the per-width kernels
/// monomorphized without stamping them out by hand.
macro_rules! with_fixed {
    ($tail:expr, |$s:ident, $t:ident| $body:expr, $fallback:expr $(,)?) => {
        match $tail {
            $crate::bat::TailStorage::I8($s) => {
                #[allow(dead_code)]
                type $t = i8;
                $body
            }
            $crate::bat::TailStorage::I16($s) => {
                #[allow(dead_code)]
                type $t = i16;
                $body
            }
            $crate::bat::TailStorage::I32($s) => {
                #[allow(dead_code)]
                type $t = i32;
                $body
            }
            $crate::bat::TailStorage::I64($s) => {
                #[allow(dead_code)]
                type $t = i64;
                $body
            }
            $crate::bat::TailStorage::F32($s) => {
                #[allow(dead_code)]
                type $t = f32;
                $body
            }
            $crate::bat::TailStorage::F64($s) => {
                #[allow(dead_code)]
                type $t = f64;
                $body
            }
            $crate::bat::TailStorage::Oid($s) => {
                #[allow(dead_code)]
                type $t = $crate::atom::Oid;
                $body
            }
            _ => $fallback,
        }
    };
}
pub(crate) use with_fixed;

/// Lazily built index caches; absence only costs performance
#[derive(Default)]
pub(crate) struct Caches {
    pub(crate) hash: RwLock<Option<Arc<HashIndex>>>,
    pub(crate) imprints: RwLock<Option<Arc<ImprintsAny>>>,
}

/// Cached scalar property hints (observed min/max of the tail)
#[derive(Debug, Clone, Default)]
pub struct Hints {
    /// Smallest non-nil tail value seen, if known
    pub min: Option<Value>,
    /// Largest non-nil tail value seen, if known
    pub max: Option<Value>,
}

/// A column: dense positional head, typed tail, cached structural properties
pub struct Bat {
    hseqbase: Oid,
    count: usize,
    role: Role,
    access: Access,
    key_constraint: bool,
    tail: TailStorage,
    props: Props,
    hints: Hints,
    pub(crate) caches: Caches,
}

impl std::fmt::Debug for Bat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bat")
            .field("hseqbase", &self.hseqbase)
            .field("count", &self.count)
            .field("type", &self.tail.atom_type())
            .field("props", &self.props)
            .finish()
    }
}

impl Clone for Bat {
    /// Cheap clone: storage is shared by `Arc`; index caches are not carried
    /// over and will be rebuilt on demand.
    fn clone(&self) -> Self {
        Self {
            hseqbase: self.hseqbase,
            count: self.count,
            role: self.role,
            access: self.access,
            key_constraint: self.key_constraint,
            tail: self.tail.clone(),
            props: self.props,
            hints: self.hints.clone(),
            caches: Caches::default(),
        }
    }
}

impl Bat {
    /// New empty transient column of the given tail type
    pub fn new(ty: AtomType) -> Self {
        Self {
            hseqbase: 0,
            count: 0,
            role: Role::Transient,
            access: Access::ReadWrite,
            key_constraint: false,
            tail: TailStorage::empty_of(ty),
            props: Props::empty(),
            hints: Hints::default(),
            caches: Caches::default(),
        }
    }

    /// New empty column with pre-reserved capacity
    pub fn with_capacity(ty: AtomType, cap: usize) -> Result<Self> {
        let mut b = Self::new(ty);
        b.reserve(cap)?;
        Ok(b)
    }

    /// Dense (void-tailed) column `(seq, count)`; `seq == OID_NIL` makes an
    /// all-nil column
    pub fn dense(seq: Oid, count: usize) -> Self {
        let mut b = Self::new(AtomType::Void);
        b.tail = TailStorage::Void { seq };
        b.count = count;
        b.props = Props::for_void(seq, count);
        b
    }

    /// Column holding `count` copies of `value`, dense head starting at 0
    pub fn constant(value: &Value, count: usize) -> Result<Self> {
        let mut b = match value {
            Value::I8(v) => Self::from_vec(vec![*v; count]),
            Value::I16(v) => Self::from_vec(vec![*v; count]),
            Value::I32(v) => Self::from_vec(vec![*v; count]),
            Value::I64(v) => Self::from_vec(vec![*v; count]),
            Value::F32(v) => Self::from_vec(vec![*v; count]),
            Value::F64(v) => Self::from_vec(vec![*v; count]),
            Value::Oid(v) => Self::from_vec(vec![*v; count]),
            Value::Str(s) => Self::from_strs((0..count).map(|_| Some(s.as_str()))),
            Value::Nil => {
                return Err(Error::invalid_argument(
                    "constant: a typed value is required",
                ))
            }
        };
        b.props = Props::for_constant(value.is_nil(), count);
        Ok(b)
    }

    /// Column from a typed vector; properties are derived by a full scan
    pub fn from_vec<T: FixedAtom>(v: Vec<T>) -> Self {
        let count = v.len();
        let mut b = Self::new(T::atom_type());
        b.tail = T::make_storage(v);
        b.count = count;
        b.props = props::derive_fixed(T::fixed(&b.tail).expect("just built").as_slice());
        b
    }

    /// String column from an iterator; `None` items become nil
    pub fn from_strs<'a>(items: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let mut heap = StrHeap::new();
        let mut offsets = OffsetArray::new();
        let mut count = 0;
        for item in items {
            let off = match item {
                Some(s) => heap.put(s),
                None => StrHeap::NIL_OFFSET,
            };
            offsets.push(off);
            count += 1;
        }
        let mut b = Self::new(AtomType::Str);
        b.tail = TailStorage::Str {
            offsets,
            heap: Arc::new(heap),
        };
        b.count = count;
        b.props = props::derive_str(&b);
        b
    }

    /// Logical row count
    pub fn count(&self) -> usize {
        self.count
    }

    /// True if the column has no rows
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// First head oid
    pub fn hseqbase(&self) -> Oid {
        self.hseqbase
    }

    /// Set the head sequence base
    pub fn set_hseqbase(&mut self, seq: Oid) {
        self.hseqbase = seq;
    }

    /// Tail sequence base for void columns
    pub fn tseq(&self) -> Option<Oid> {
        match &self.tail {
            TailStorage::Void { seq } => Some(*seq),
            _ => None,
        }
    }

    /// Lifetime role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Set the lifetime role
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    /// Access mode
    pub fn access(&self) -> Access {
        self.access
    }

    /// Set the access mode
    pub fn set_access(&mut self, access: Access) {
        self.access = access;
    }

    /// True if the column is frozen
    pub fn is_readonly(&self) -> bool {
        self.access == Access::ReadOnly
    }

    /// True if per-row uniqueness must be enforced by mutators
    pub fn key_constraint(&self) -> bool {
        self.key_constraint
    }

    /// Enable or disable per-row uniqueness enforcement
    pub fn set_key_constraint(&mut self, on: bool) {
        self.key_constraint = on;
    }

    /// Tail type tag
    pub fn tail_type(&self) -> AtomType {
        self.tail.atom_type()
    }

    /// Tail storage
    pub fn tail(&self) -> &TailStorage {
        &self.tail
    }

    pub(crate) fn tail_mut(&mut self) -> &mut TailStorage {
        &mut self.tail
    }

    pub(crate) fn set_tail(&mut self, tail: TailStorage) {
        self.tail = tail;
    }

    pub(crate) fn set_count(&mut self, count: usize) {
        self.count = count;
    }

    /// Cached structural properties
    pub fn props(&self) -> &Props {
        &self.props
    }

    pub(crate) fn props_mut(&mut self) -> &mut Props {
        &mut self.props
    }

    pub(crate) fn set_props(&mut self, props: Props) {
        self.props = props;
    }

    /// Cached min/max hints
    pub fn hints(&self) -> &Hints {
        &self.hints
    }

    /// Set the cached min hint
    pub fn set_hint_min(&mut self, v: Option<Value>) {
        self.hints.min = v;
    }

    /// Set the cached max hint
    pub fn set_hint_max(&mut self, v: Option<Value>) {
        self.hints.max = v;
    }

    pub(crate) fn clear_hints(&mut self) {
        self.hints = Hints::default();
    }

    /// True if the tail is a dense integer run
    pub fn is_void(&self) -> bool {
        matches!(self.tail, TailStorage::Void { .. })
    }

    /// The typed tail slice, if the tail has that fixed type
    pub fn fixed_slice<T: FixedAtom>(&self) -> Option<&[T]> {
        T::fixed(&self.tail).map(|s| s.as_slice())
    }

    /// Value at position `pos`, `None` when out of range
    ///
    /// Fixed-width nils come back as their typed sentinel; void-nil and
    /// string nils come back as [`Value::Nil`].
    pub fn value(&self, pos: usize) -> Option<Value> {
        if pos >= self.count {
            return None;
        }
        Some(match &self.tail {
            TailStorage::Void { seq } => {
                if seq.is_nil() {
                    Value::Nil
                } else {
                    Value::Oid(seq + pos as Oid)
                }
            }
            TailStorage::Str { offsets, heap } => match heap.get(offsets.get(pos)) {
                Some(s) => Value::Str(s.to_owned()),
                None => Value::Nil,
            },
            tail => with_fixed!(tail, |s, T| s.as_slice()[pos].into_value(), unreachable!()),
        })
    }

    /// String at position `pos` for str-tailed columns; inner `None` is nil
    pub fn str_at(&self, pos: usize) -> Option<Option<&str>> {
        match &self.tail {
            TailStorage::Str { offsets, heap } if pos < self.count => {
                Some(heap.get(offsets.get(pos)))
            }
            _ => None,
        }
    }

    /// Reserve room for `additional` rows, failing only on allocation
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        match &mut self.tail {
            TailStorage::Void { .. } => Ok(()),
            TailStorage::Str { offsets, .. } => offsets.try_reserve(additional),
            tail => with_fixed!(tail, |s, T| s.try_reserve(additional), unreachable!()),
        }
    }

    /// Highest head oid + 1; capacity guard for appends
    pub(crate) fn head_end(&self) -> Oid {
        self.hseqbase + self.count as Oid
    }

    pub(crate) fn drop_imprints(&self) {
        *self.caches.imprints.write() = None;
    }

    pub(crate) fn drop_hash(&self) {
        *self.caches.hash.write() = None;
    }

    pub(crate) fn drop_caches(&self) {
        self.drop_imprints();
        self.drop_hash();
    }

    /// The cached hash index, if one has been built
    pub(crate) fn hash_index(&self) -> Option<Arc<HashIndex>> {
        self.caches.hash.read().clone()
    }

    /// Build (or fetch) the equality hash index over the tail
    ///
    /// Void tails are never hashed; their selects are arithmetic.
    pub(crate) fn ensure_hash(&self) -> Result<Arc<HashIndex>> {
        if let Some(h) = self.caches.hash.read().clone() {
            return Ok(h);
        }
        let mut guard = self.caches.hash.write();
        if let Some(h) = guard.clone() {
            return Ok(h);
        }
        let built = match &self.tail {
            TailStorage::Void { .. } => {
                return Err(Error::internal("hash index requested for void tail"))
            }
            TailStorage::Str { offsets, heap } => {
                HashIndex::build((0..self.count).map(|p| heap.tag_or_hash(offsets.get(p))))
            }
            tail => with_fixed!(
                tail,
                |s, T| HashIndex::build(s.as_slice().iter().map(|v| v.hash64())),
                unreachable!()
            ),
        }?;
        let built = Arc::new(built);
        *guard = Some(Arc::clone(&built));
        Ok(built)
    }

    /// Fetch or lazily build the imprints summary index
    pub(crate) fn ensure_imprints(&self) -> Result<Arc<ImprintsAny>> {
        if let Some(i) = self.caches.imprints.read().clone() {
            return Ok(i);
        }
        let mut guard = self.caches.imprints.write();
        if let Some(i) = guard.clone() {
            return Ok(i);
        }
        let built = Arc::new(ImprintsAny::build(self)?);
        *guard = Some(Arc::clone(&built));
        Ok(built)
    }

    /// The cached imprints index, if one has been built
    pub(crate) fn imprints(&self) -> Option<Arc<ImprintsAny>> {
        self.caches.imprints.read().clone()
    }

    /// 64-bit hash of the row at `pos`, as the hash index sees it
    pub(crate) fn row_hash(&self, pos: usize) -> u64 {
        debug_assert!(pos < self.count);
        match &self.tail {
            TailStorage::Void { seq } => {
                if seq.is_nil() {
                    OID_NIL.hash64()
                } else {
                    (seq + pos as Oid).hash64()
                }
            }
            TailStorage::Str { offsets, heap } => heap.tag_or_hash(offsets.get(pos)),
            tail => with_fixed!(tail, |s, T| s.as_slice()[pos].hash64(), unreachable!()),
        }
    }

    /// Feed freshly appended row hashes into a cached hash index, or drop
    /// the cache when it is shared and cannot be extended in place
    pub(crate) fn hash_push_or_drop(&self, hashes: impl Iterator<Item = u64>) {
        let mut guard = self.caches.hash.write();
        match guard.as_mut().map(Arc::get_mut) {
            Some(Some(h)) => {
                for x in hashes {
                    if h.push(x).is_err() {
                        *guard = None;
                        return;
                    }
                }
            }
            Some(None) => *guard = None,
            None => {}
        }
    }

    /// Turn a void tail into an explicit oid tail; no-op for other tails
    pub fn materialize(&mut self) -> Result<()> {
        let TailStorage::Void { seq } = self.tail else {
            return Ok(());
        };
        let mut v: Vec<Oid> = Vec::new();
        v.try_reserve(self.count)?;
        if seq.is_nil() {
            v.resize(self.count, OID_NIL);
        } else {
            v.extend(seq..seq + self.count as Oid);
        }
        // props carry over unchanged: the rows are identical
        self.tail = <Oid as FixedAtom>::make_storage(v);
        Ok(())
    }
}

/// Guard against the combined row count exceeding the addressable range
pub(crate) fn check_head_overflow(seq: Oid, extra: usize) -> Result<()> {
    let end = seq.checked_add(extra as Oid).ok_or_else(|| {
        Error::capacity("combined columns exceed the addressable position range")
    })?;
    if end >= OID_NIL {
        return Err(Error::capacity(
            "combined columns exceed the addressable position range",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_column_has_no_storage() {
        let b = Bat::dense(5, 10);
        assert_eq!(b.count(), 10);
        assert!(b.is_void());
        assert_eq!(b.value(0), Some(Value::Oid(5)));
        assert_eq!(b.value(9), Some(Value::Oid(14)));
        assert_eq!(b.value(10), None);
        assert!(b.props().sorted && b.props().key && b.props().dense);
    }

    #[test]
    fn from_vec_derives_props() {
        let b = Bat::from_vec(vec![1i32, 2, 3]);
        assert!(b.props().sorted);
        assert!(!b.props().revsorted);
        assert!(b.props().key);
        assert!(b.props().nonil);

        let b = Bat::from_vec(vec![3i32, 2, 2]);
        assert!(!b.props().sorted);
        assert!(b.props().revsorted);
        assert!(!b.props().key);
    }

    #[test]
    fn view_survives_parent_mutation() {
        let mut s = FixedSlice::from_vec(vec![1i32, 2, 3, 4]);
        let v = s.view(1, 3);
        s.with_mut(|d| d[1] = 99);
        // the view kept the pre-mutation data
        assert_eq!(v.as_slice(), &[2, 3]);
        assert_eq!(s.as_slice()[1], 99);
    }

    #[test]
    fn str_column_roundtrip() {
        let b = Bat::from_strs(vec![Some("foo"), None, Some("bar"), Some("foo")]);
        assert_eq!(b.str_at(0), Some(Some("foo")));
        assert_eq!(b.str_at(1), Some(None));
        assert_eq!(b.str_at(3), Some(Some("foo")));
        assert!(b.props().nil);
        assert!(!b.props().nonil);
    }

    #[test]
    fn head_overflow_guard() {
        assert!(check_head_overflow(0, 100).is_ok());
        assert!(check_head_overflow(OID_NIL - 1, 2).is_err());
    }
}
