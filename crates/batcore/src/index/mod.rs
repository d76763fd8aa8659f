//! Secondary index structures backing the selection engine
//!
//! Both index kinds are caches: they accelerate lookups but are never
//! required for correctness, and any mutation that cannot maintain one
//! cheaply just drops it.
//!
//! - [`hash::HashIndex`]: chained bucket index over 64-bit value hashes,
//!   for equality selects.
//! - [`imprints::Imprints`]: per-cache-page bin bitmasks with run-length
//!   compression, for range selects over fixed-width persistent columns.

pub mod hash;
pub mod imprints;

pub use hash::HashIndex;
pub use imprints::{Imprints, ImprintsAny};
