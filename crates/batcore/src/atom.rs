//! Atom types: the fixed-width primitive values a column tail can hold
//!
//! The [`Atom`] trait packages everything the engines need to stay generic
//! over tail width: the nil sentinel, the smallest/largest non-nil
//! representable values, successor/predecessor computation (`nextafter`
//! semantics for floats), hashing, and a nil-aware total order. The selection
//! and mutation kernels are written once against this trait instead of being
//! stamped out per width.

use std::cmp::Ordering;
use xxhash_rust::xxh3::xxh3_64;

/// Position identifier: the implicit dense head of every column
pub type Oid = u64;

/// The nil sentinel for [`Oid`] values
pub const OID_NIL: Oid = u64::MAX;

/// Tail type tags for runtime dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomType {
    /// Dense integer sequence, no backing array
    Void,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Position identifier
    Oid,
    /// Variable-size string, stored via offset into a variable heap
    Str,
}

impl AtomType {
    /// Width in bytes of the fixed storage, `None` for void/str
    pub fn width(self) -> Option<usize> {
        match self {
            AtomType::I8 => Some(1),
            AtomType::I16 => Some(2),
            AtomType::I32 | AtomType::F32 => Some(4),
            AtomType::I64 | AtomType::F64 | AtomType::Oid => Some(8),
            AtomType::Void | AtomType::Str => None,
        }
    }

    /// True for the fixed-width numeric types
    pub fn is_fixed(self) -> bool {
        self.width().is_some()
    }

    /// Printable name
    pub fn name(self) -> &'static str {
        match self {
            AtomType::Void => "void",
            AtomType::I8 => "i8",
            AtomType::I16 => "i16",
            AtomType::I32 => "i32",
            AtomType::I64 => "i64",
            AtomType::F32 => "f32",
            AtomType::F64 => "f64",
            AtomType::Oid => "oid",
            AtomType::Str => "str",
        }
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An untyped value crossing the kernel API boundary
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The nil of whatever type the column carries
    Nil,
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Position identifier
    Oid(Oid),
    /// String value
    Str(String),
}

impl Value {
    /// The type this value belongs to, `None` for the typeless nil
    pub fn atom_type(&self) -> Option<AtomType> {
        match self {
            Value::Nil => None,
            Value::I8(_) => Some(AtomType::I8),
            Value::I16(_) => Some(AtomType::I16),
            Value::I32(_) => Some(AtomType::I32),
            Value::I64(_) => Some(AtomType::I64),
            Value::F32(_) => Some(AtomType::F32),
            Value::F64(_) => Some(AtomType::F64),
            Value::Oid(_) => Some(AtomType::Oid),
            Value::Str(_) => Some(AtomType::Str),
        }
    }

    /// True if the value is nil, either the typeless [`Value::Nil`] or a
    /// typed value equal to its type's nil sentinel
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::I8(v) => v.is_nil(),
            Value::I16(v) => v.is_nil(),
            Value::I32(v) => v.is_nil(),
            Value::I64(v) => v.is_nil(),
            Value::F32(v) => v.is_nil(),
            Value::F64(v) => v.is_nil(),
            Value::Oid(v) => v.is_nil(),
            Value::Str(_) => false,
        }
    }
}

/// A fixed-width primitive tail value
///
/// Nil sentinels follow the storage convention: `MIN` for the signed integer
/// widths, NaN for floats, `u64::MAX` for oids. `next_up`/`next_down`
/// saturate at the largest/smallest non-nil representable value.
pub trait Atom: Copy + PartialOrd + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// The nil sentinel
    const NIL: Self;
    /// Smallest non-nil representable value
    const MIN_VALUE: Self;
    /// Largest non-nil representable value
    const MAX_VALUE: Self;

    /// Runtime type tag
    fn atom_type() -> AtomType;

    /// True if this is the nil sentinel
    fn is_nil(self) -> bool;

    /// Successor representable value, saturating at `MAX_VALUE`
    fn next_up(self) -> Self;

    /// Predecessor representable value, saturating at `MIN_VALUE`
    fn next_down(self) -> Self;

    /// xxh3 of the value's raw bytes
    fn hash64(self) -> u64;

    /// Lossy conversion for cost estimation
    fn to_f64(self) -> f64;

    /// Extract a typed value from the untyped API surface
    fn from_value(v: &Value) -> Option<Self>;

    /// Wrap into the untyped API surface
    fn into_value(self) -> Value;

    /// Total order with nil smallest (floats: nil == NaN sorts first)
    fn atom_cmp(self, other: Self) -> Ordering {
        match (self.is_nil(), other.is_nil()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.partial_cmp(&other).unwrap_or(Ordering::Equal),
        }
    }

    /// Span `hi - lo` as an exact row-count estimate, `None` on overflow
    /// or for types where the span is not meaningful (floats)
    fn span(lo: Self, hi: Self) -> Option<usize>;
}

macro_rules! impl_int_atom {
    ($t:ty, $tag:ident, $variant:ident) => {
        impl Atom for $t {
            const NIL: Self = <$t>::MIN;
            const MIN_VALUE: Self = <$t>::MIN + 1;
            const MAX_VALUE: Self = <$t>::MAX;

            fn atom_type() -> AtomType {
                AtomType::$tag
            }

            fn is_nil(self) -> bool {
                self == Self::NIL
            }

            fn next_up(self) -> Self {
                self.saturating_add(1)
            }

            fn next_down(self) -> Self {
                if self <= Self::MIN_VALUE {
                    Self::MIN_VALUE
                } else {
                    self - 1
                }
            }

            fn hash64(self) -> u64 {
                xxh3_64(bytemuck::bytes_of(&self))
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_value(v: &Value) -> Option<Self> {
                match v {
                    Value::Nil => Some(Self::NIL),
                    Value::$variant(x) => Some(*x),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn span(lo: Self, hi: Self) -> Option<usize> {
                if hi < lo {
                    return Some(0);
                }
                usize::try_from((hi as i128) - (lo as i128)).ok()
            }
        }
    };
}

impl_int_atom!(i8, I8, I8);
impl_int_atom!(i16, I16, I16);
impl_int_atom!(i32, I32, I32);
impl_int_atom!(i64, I64, I64);

impl Atom for Oid {
    const NIL: Self = OID_NIL;
    const MIN_VALUE: Self = 0;
    const MAX_VALUE: Self = OID_NIL - 1;

    fn atom_type() -> AtomType {
        AtomType::Oid
    }

    fn is_nil(self) -> bool {
        self == OID_NIL
    }

    fn next_up(self) -> Self {
        if self >= Self::MAX_VALUE {
            Self::MAX_VALUE
        } else {
            self + 1
        }
    }

    fn next_down(self) -> Self {
        self.saturating_sub(1)
    }

    fn hash64(self) -> u64 {
        xxh3_64(bytemuck::bytes_of(&self))
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Nil => Some(Self::NIL),
            Value::Oid(x) => Some(*x),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Oid(self)
    }

    fn span(lo: Self, hi: Self) -> Option<usize> {
        if hi < lo {
            return Some(0);
        }
        usize::try_from(hi - lo).ok()
    }
}

macro_rules! impl_float_atom {
    ($t:ty, $bits:ty, $tag:ident, $variant:ident) => {
        impl Atom for $t {
            const NIL: Self = <$t>::NAN;
            const MIN_VALUE: Self = <$t>::MIN;
            const MAX_VALUE: Self = <$t>::MAX;

            fn atom_type() -> AtomType {
                AtomType::$tag
            }

            fn is_nil(self) -> bool {
                self.is_nan()
            }

            fn next_up(self) -> Self {
                // nextafter toward +inf, saturating at the largest finite
                if self.is_nan() || self >= Self::MAX_VALUE {
                    return Self::MAX_VALUE;
                }
                let bits = self.to_bits();
                let next = if self == 0.0 {
                    1 // smallest positive subnormal
                } else if bits >> (<$bits>::BITS - 1) == 0 {
                    bits + 1
                } else {
                    bits - 1
                };
                <$t>::from_bits(next)
            }

            fn next_down(self) -> Self {
                if self.is_nan() || self <= Self::MIN_VALUE {
                    return Self::MIN_VALUE;
                }
                let bits = self.to_bits();
                let next = if self == 0.0 {
                    (1 as $bits) | (1 << (<$bits>::BITS - 1)) // -subnormal
                } else if bits >> (<$bits>::BITS - 1) == 0 {
                    bits - 1
                } else {
                    bits + 1
                };
                <$t>::from_bits(next)
            }

            fn hash64(self) -> u64 {
                xxh3_64(bytemuck::bytes_of(&self))
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_value(v: &Value) -> Option<Self> {
                match v {
                    Value::Nil => Some(Self::NIL),
                    Value::$variant(x) => Some(*x),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn span(_lo: Self, _hi: Self) -> Option<usize> {
                None
            }
        }
    };
}

impl_float_atom!(f32, u32, F32, F32);
impl_float_atom!(f64, u64, F64, F64);

/// Compare two same-typed values, nil smallest; `None` on type mismatch
pub fn value_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Some(Ordering::Equal),
        (Value::Nil, x) => Some(if x.is_nil() {
            Ordering::Equal
        } else {
            Ordering::Less
        }),
        (x, Value::Nil) => Some(if x.is_nil() {
            Ordering::Equal
        } else {
            Ordering::Greater
        }),
        (Value::I8(x), Value::I8(y)) => Some(x.atom_cmp(*y)),
        (Value::I16(x), Value::I16(y)) => Some(x.atom_cmp(*y)),
        (Value::I32(x), Value::I32(y)) => Some(x.atom_cmp(*y)),
        (Value::I64(x), Value::I64(y)) => Some(x.atom_cmp(*y)),
        (Value::F32(x), Value::F32(y)) => Some(x.atom_cmp(*y)),
        (Value::F64(x), Value::F64(y)) => Some(x.atom_cmp(*y)),
        (Value::Oid(x), Value::Oid(y)) => Some(x.atom_cmp(*y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_next_up_down() {
        assert_eq!(5i32.next_up(), 6);
        assert_eq!(5i32.next_down(), 4);
        assert_eq!(i32::MAX_VALUE.next_up(), i32::MAX_VALUE);
        assert_eq!(i32::MIN_VALUE.next_down(), i32::MIN_VALUE);
    }

    #[test]
    fn float_next_up_is_successor() {
        let x = 1.0f64;
        let up = x.next_up();
        assert!(up > x);
        assert!(x.next_down() < x);
        // nothing representable in between
        assert_eq!(up.next_down(), x);
        assert!(0.0f32.next_up() > 0.0);
        assert!(0.0f32.next_down() < 0.0);
    }

    #[test]
    fn nil_sentinels() {
        assert!(i32::NIL.is_nil());
        assert!(f64::NIL.is_nil());
        assert!(OID_NIL.is_nil());
        assert!(!0i32.is_nil());
    }

    #[test]
    fn nil_sorts_first() {
        assert_eq!(i32::NIL.atom_cmp(0), Ordering::Less);
        assert_eq!(f32::NIL.atom_cmp(-1.0e30), Ordering::Less);
        assert_eq!(3i16.atom_cmp(3), Ordering::Equal);
    }

    #[test]
    fn span_counts_range() {
        assert_eq!(i32::span(10, 20), Some(10));
        assert_eq!(i32::span(20, 10), Some(0));
        assert_eq!(f64::span(0.0, 1.0), None);
    }
}
