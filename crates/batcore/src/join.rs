//! Range join: pair left rows with the right rows whose bound columns
//! bracket them
//!
//! For every right row `i`, the rows of `l` whose value lies between
//! `rl[i]` and `rh[i]` (with configurable bound inclusivity) are emitted as
//! `(left oid, right oid)` pairs. Each right row reuses the selection
//! engine on the left column, so a sorted left side degenerates to binary
//! searches and a large persistent left side gets its imprints built once
//! and probed for every right row. A nil bound on either side matches
//! nothing for that row.

use tracing::debug;

use crate::atom::Oid;
use crate::bat::Bat;
use crate::candidates::Candidates;
use crate::error::{Error, Result};
use crate::select::{select_with, SelectTuning};

/// Aligned pair columns produced by a join
pub struct JoinResult {
    /// Oids into the left column's head
    pub left: Bat,
    /// Oids into the right columns' head
    pub right: Bat,
}

/// Range join with default tuning; see [`range_join_with`]
pub fn range_join(
    l: &Bat,
    rl: &Bat,
    rh: &Bat,
    lcand: Option<&Candidates>,
    rcand: Option<&Candidates>,
    li: bool,
    hi: bool,
) -> Result<JoinResult> {
    range_join_with(l, rl, rh, lcand, rcand, li, hi, &SelectTuning::default())
}

/// Join `l` against the per-row ranges `[rl[i], rh[i]]`
///
/// `rl` and `rh` must be aligned. The outputs are aligned with each other:
/// row `k` of `left` matches row `k` of `right`. Within one right row the
/// left oids come out ascending, and the right oids are globally
/// non-descending.
#[allow(clippy::too_many_arguments)]
pub fn range_join_with(
    l: &Bat,
    rl: &Bat,
    rh: &Bat,
    lcand: Option<&Candidates>,
    rcand: Option<&Candidates>,
    li: bool,
    hi: bool,
    tuning: &SelectTuning,
) -> Result<JoinResult> {
    if rl.count() != rh.count() || rl.hseqbase() != rh.hseqbase() {
        return Err(Error::invalid_argument(
            "range join bound columns must align",
        ));
    }
    let rbase = rl.hseqbase();
    let rfull = Candidates::dense(rbase, rl.count());
    let rcand = match rcand {
        Some(c) => c.intersect(&rfull),
        None => rfull,
    };

    let mut left: Vec<Oid> = Vec::new();
    let mut right: Vec<Oid> = Vec::new();
    let mut skipped_nil = 0usize;
    for roid in rcand.iter() {
        let pos = (roid - rbase) as usize;
        let (Some(lo), Some(hi_v)) = (rl.value(pos), rh.value(pos)) else {
            continue;
        };
        // a nil bound brackets nothing
        if lo.is_nil() || hi_v.is_nil() {
            skipped_nil += 1;
            continue;
        }
        let matches = select_with(l, lcand, &lo, &hi_v, li, hi, false, tuning)?;
        if matches.is_empty() {
            continue;
        }
        left.try_reserve(matches.len())?;
        right.try_reserve(matches.len())?;
        for loid in matches.iter() {
            left.push(loid);
            right.push(roid);
        }
    }
    debug!(
        pairs = left.len(),
        right_rows = rcand.len(),
        skipped_nil,
        "range join"
    );
    Ok(JoinResult {
        left: Bat::from_vec(left),
        right: Bat::from_vec(right),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;

    fn pairs(r: &JoinResult) -> Vec<(Oid, Oid)> {
        let l = r.left.fixed_slice::<Oid>().unwrap();
        let rr = r.right.fixed_slice::<Oid>().unwrap();
        l.iter().copied().zip(rr.iter().copied()).collect()
    }

    #[test]
    fn brackets_rows_inclusively() {
        let l = Bat::from_vec(vec![5i32, 15, 25, 35]);
        let rl = Bat::from_vec(vec![10i32, 0]);
        let rh = Bat::from_vec(vec![30i32, 5]);
        let r = range_join(&l, &rl, &rh, None, None, true, true).unwrap();
        assert_eq!(pairs(&r), vec![(1, 0), (2, 0), (0, 1)]);
    }

    #[test]
    fn exclusive_bounds() {
        let l = Bat::from_vec(vec![10i32, 20, 30]);
        let rl = Bat::from_vec(vec![10i32]);
        let rh = Bat::from_vec(vec![30i32]);
        let r = range_join(&l, &rl, &rh, None, None, false, false).unwrap();
        assert_eq!(pairs(&r), vec![(1, 0)]);
    }

    #[test]
    fn nil_bounds_match_nothing() {
        let l = Bat::from_vec(vec![1i64, 2, 3]);
        let rl = Bat::from_vec(vec![i64::NIL, 1]);
        let rh = Bat::from_vec(vec![3i64, 2]);
        let r = range_join(&l, &rl, &rh, None, None, true, true).unwrap();
        assert_eq!(pairs(&r), vec![(0, 1), (1, 1)]);
    }

    #[test]
    fn nil_left_rows_never_join() {
        let l = Bat::from_vec(vec![i32::NIL, 5, i32::NIL]);
        let rl = Bat::from_vec(vec![0i32]);
        let rh = Bat::from_vec(vec![100i32]);
        let r = range_join(&l, &rl, &rh, None, None, true, true).unwrap();
        assert_eq!(pairs(&r), vec![(1, 0)]);
    }

    #[test]
    fn sorted_left_matches_nested_loop() {
        let lv: Vec<i32> = (0..200).map(|i| i * 3).collect();
        let l = Bat::from_vec(lv.clone());
        assert!(l.props().sorted);
        let rlv = vec![10i32, 400, 0];
        let rhv = vec![40i32, 500, 2];
        let rl = Bat::from_vec(rlv.clone());
        let rh = Bat::from_vec(rhv.clone());
        let r = range_join(&l, &rl, &rh, None, None, true, true).unwrap();
        let mut expect = Vec::new();
        for (i, (&lo, &hi)) in rlv.iter().zip(&rhv).enumerate() {
            for (j, &v) in lv.iter().enumerate() {
                if v >= lo && v <= hi {
                    expect.push((j as Oid, i as Oid));
                }
            }
        }
        assert_eq!(pairs(&r), expect);
    }

    #[test]
    fn candidate_restrictions_apply_on_both_sides() {
        let l = Bat::from_vec(vec![1i32, 2, 3, 4]);
        let rl = Bat::from_vec(vec![0i32, 0]);
        let rh = Bat::from_vec(vec![10i32, 10]);
        let lcand = Candidates::from_vec(vec![1, 3]).unwrap();
        let rcand = Candidates::from_vec(vec![1]).unwrap();
        let r = range_join(&l, &rl, &rh, Some(&lcand), Some(&rcand), true, true).unwrap();
        assert_eq!(pairs(&r), vec![(1, 1), (3, 1)]);
    }

    #[test]
    fn misaligned_bounds_rejected() {
        let l = Bat::from_vec(vec![1i32]);
        let rl = Bat::from_vec(vec![1i32, 2]);
        let rh = Bat::from_vec(vec![3i32]);
        assert!(range_join(&l, &rl, &rh, None, None, true, true).is_err());
    }
}
