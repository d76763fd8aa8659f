//! Batcore - Column Storage and Query Execution Kernel
//!
//! This crate provides the storage kernel of a column-oriented analytical
//! engine, implementing:
//! - Binary association tables (BATs): a virtual dense head paired with a
//!   typed tail column
//! - Variable-size string heaps with offset columns and deduplication
//! - Copy-on-write column buffers, so slices and views are zero-copy
//! - A candidate algebra (dense ranges and materialized oid vectors) that
//!   threads intermediate results through every operator
//! - Mutation (append, replace) with incremental property maintenance
//! - Ordering (slice, revert, project, chained refinement sort)
//! - Adaptive selection choosing between positional arithmetic, binary
//!   search, hash probe, column imprints, and plain scans
//! - A range join driven by the selection engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │         Operator Layer                      │
//! │   (Select, Theta-select, Sort, Range join)  │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │         Candidate Algebra                   │
//! │    (Dense runs, oid vectors, set algebra)   │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │         Index Layer                         │
//! │     (Hash chains, column imprints)          │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │         Storage Layer                       │
//! │  (BAT descriptors, fixed tails, str heaps)  │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atom;
pub mod bat;
pub mod candidates;
pub mod error;
pub mod heap;
pub mod index;
pub mod join;
pub mod mutate;
pub mod order;
pub mod select;

pub use atom::{Atom, AtomType, Oid, Value, OID_NIL};
pub use bat::{Access, Bat, FixedAtom, FixedSlice, Role, TailStorage};
pub use bat::{Hints, Props};
pub use candidates::Candidates;
pub use error::{Error, Result};
pub use heap::{OffsetArray, StrHeap};
pub use index::{HashIndex, Imprints, ImprintsAny};
pub use join::{range_join, range_join_with, JoinResult};
pub use mutate::{append, append_value, delete, insert_at, replace};
pub use order::{
    project, revert, slice, sort, sort_reverse, stable_sort, stable_sort_reverse, subsort,
    SortResult,
};
pub use select::{select, select_with, theta_select, SelectTuning};
