//! End-to-end tests driving the kernel the way an operator pipeline would
//!
//! Each test builds columns through the public constructors, mutates and
//! queries them through the operator layer, and checks both the values and
//! the maintained properties.

use batcore::{
    append, append_value, range_join, replace, select, select_with, slice, sort, subsort,
    theta_select, Atom, Bat, Candidates, Oid, Role, SelectTuning, TailStorage, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("batcore=debug")
        .try_init();
}

fn oids(c: &Candidates) -> Vec<Oid> {
    c.iter().collect()
}

fn i32_values(b: &Bat) -> Vec<i32> {
    b.fixed_slice::<i32>().unwrap().to_vec()
}

#[test]
fn test_descending_appends_keep_revsorted_without_rescan() {
    init_tracing();
    // A column loaded in descending chunks stays revsorted through the
    // boundary rule alone; only chunk junctions are ever compared.
    let mut col = Bat::new(batcore::AtomType::I32);
    let total: i32 = 1_000_000;
    let chunk = 10_000;
    let mut next = total;
    while next > 0 {
        let lo = next - chunk;
        let vals: Vec<i32> = (lo..next).rev().collect();
        next = lo;
        append(&mut col, &Bat::from_vec(vals), false).unwrap();
    }
    assert_eq!(col.count(), total as usize);
    assert!(col.props().revsorted);
    assert!(!col.props().sorted);
    assert!(col.props().nonil);

    // the maintained property feeds straight into a binary-search select
    let res = select(
        &col,
        None,
        &Value::I32(10),
        &Value::I32(19),
        true,
        true,
        false,
    )
    .unwrap();
    assert_eq!(res.len(), 10);
}

#[test]
fn test_select_on_void_is_pure_arithmetic() {
    let b = Bat::dense(0, 100);
    let res = select(
        &b,
        None,
        &Value::Oid(10),
        &Value::Oid(20),
        true,
        false,
        false,
    )
    .unwrap();
    assert_eq!(res, Candidates::dense(10, 10));
    assert!(matches!(res, Candidates::Dense { .. }));
}

#[test]
fn test_candidate_merge_virtualizes_overlapping_runs() {
    let a = Candidates::dense(5, 5); // [5, 10)
    let b = Candidates::dense(8, 7); // [8, 15)
    let m = a.merge(&b);
    assert_eq!(m, Candidates::dense(5, 10));
    assert!(matches!(m, Candidates::Dense { .. }));
}

#[test]
fn test_string_append_into_empty_transient_shares_heap() {
    let src = Bat::from_strs(vec![Some("alpha"), Some("beta"), None, Some("alpha")]);
    let mut dst = Bat::new(batcore::AtomType::Str);
    append(&mut dst, &src, false).unwrap();

    let (TailStorage::Str { heap: sh, .. }, TailStorage::Str { heap: dh, .. }) =
        (src.tail(), dst.tail())
    else {
        panic!("expected string tails");
    };
    assert!(std::sync::Arc::ptr_eq(sh, dh));
    assert_eq!(dst.str_at(0), Some(Some("alpha")));
    assert_eq!(dst.str_at(2), Some(None));
    assert_eq!(dst.str_at(3), Some(Some("alpha")));
}

#[test]
fn test_equality_with_nil_on_nonil_column_is_empty() {
    let b = Bat::from_vec(vec![3i64, 1, 4, 1, 5]);
    assert!(b.props().nonil);
    let res = select(&b, None, &Value::Nil, &Value::Nil, true, true, false).unwrap();
    assert!(res.is_empty());
}

#[test]
fn test_nil_equality_and_its_complement() {
    let b = Bat::from_vec(vec![1i32, i32::NIL, 3, i32::NIL]);
    let nils = select(&b, None, &Value::Nil, &Value::Nil, true, true, false).unwrap();
    assert_eq!(oids(&nils), vec![1, 3]);
    let non_nils = select(&b, None, &Value::Nil, &Value::Nil, true, true, true).unwrap();
    assert_eq!(oids(&non_nils), vec![0, 2]);
}

#[test]
fn test_anti_select_excludes_range_and_nils() {
    let b = Bat::from_vec(vec![5i32, i32::NIL, 15, 25, 35]);
    let res = select(&b, None, &Value::I32(10), &Value::I32(30), true, true, true).unwrap();
    assert_eq!(oids(&res), vec![0, 4]);
}

#[test]
fn test_select_respects_candidate_restriction() {
    let b = Bat::from_vec(vec![1i32, 2, 3, 4, 5, 6]);
    let cand = Candidates::from_vec(vec![0, 2, 4]).unwrap();
    let res = select(
        &b,
        Some(&cand),
        &Value::I32(2),
        &Value::I32(6),
        true,
        true,
        false,
    )
    .unwrap();
    assert_eq!(oids(&res), vec![2, 4]);
}

#[test]
fn test_hash_and_imprint_paths_agree_with_scan() {
    init_tracing();
    // Large persistent column: equality goes through the hash index and
    // ranges through imprints. Force a scan via tuning and compare.
    let vals: Vec<i64> = (0..50_000).map(|i| (i * 7919) % 1000).collect();
    let mut b = Bat::from_vec(vals.clone());
    b.set_role(Role::Persistent);

    let scan_only = SelectTuning {
        small_input_cutoff: usize::MAX,
        ..SelectTuning::default()
    };

    let eq = Value::I64(42);
    let scanned = select_with(&b, None, &eq, &eq, true, true, false, &scan_only).unwrap();
    let indexed = select(&b, None, &eq, &eq, true, true, false).unwrap();
    assert_eq!(indexed, scanned);
    assert_eq!(indexed.len(), 50);

    let (lo, hi) = (Value::I64(100), Value::I64(200));
    let scanned = select_with(&b, None, &lo, &hi, true, false, false, &scan_only).unwrap();
    let indexed = select(&b, None, &lo, &hi, true, false, false).unwrap();
    assert_eq!(indexed, scanned);
}

#[test]
fn test_append_then_equality_reuses_maintained_hash() {
    let mut b = Bat::from_vec((0..20_000i64).collect::<Vec<_>>());
    b.set_role(Role::Persistent);
    let eq = Value::I64(7);
    let before = select(&b, None, &eq, &eq, true, true, false).unwrap();
    assert_eq!(oids(&before), vec![7]);

    // the cached hash is extended, not rebuilt, and keeps answering
    append(&mut b, &Bat::from_vec(vec![7i64, 8]), false).unwrap();
    let after = select(&b, None, &eq, &eq, true, true, false).unwrap();
    assert_eq!(oids(&after), vec![7, 20_000]);
}

#[test]
fn test_replace_then_select_sees_new_values() {
    let mut b = Bat::from_vec(vec![10i32, 20, 30, 40]);
    let positions = Bat::from_vec(vec![1u64, 3]);
    let values = Bat::from_vec(vec![99i32, 100]);
    replace(&mut b, &positions, &values, false).unwrap();
    assert_eq!(i32_values(&b), vec![10, 99, 30, 100]);
    assert!(!b.props().sorted);

    let res = theta_select(&b, None, &Value::I32(99), ">=").unwrap();
    assert_eq!(oids(&res), vec![1, 3]);
}

#[test]
fn test_append_value_and_theta_operators() {
    let mut b = Bat::from_vec(vec![1i32, 5, 9]);
    append_value(&mut b, &Value::I32(5), false).unwrap();
    append_value(&mut b, &Value::Nil, false).unwrap();
    assert_eq!(b.count(), 5);
    assert!(b.props().nil);

    assert_eq!(oids(&theta_select(&b, None, &Value::I32(5), "=").unwrap()), vec![1, 3]);
    assert_eq!(
        oids(&theta_select(&b, None, &Value::I32(5), "<>").unwrap()),
        vec![0, 2]
    );
    assert_eq!(oids(&theta_select(&b, None, &Value::I32(5), "<").unwrap()), vec![0]);
    assert_eq!(
        oids(&theta_select(&b, None, &Value::I32(5), ">=").unwrap()),
        vec![1, 2, 3]
    );
}

#[test]
fn test_slice_keeps_head_alignment_and_shares_storage() {
    let b = Bat::from_vec(vec![10i32, 11, 12, 13, 14]);
    let s = slice(&b, 2, 4).unwrap();
    assert_eq!(s.hseqbase(), 2);
    assert_eq!(i32_values(&s), vec![12, 13]);

    // selecting on the slice yields oids in the original head space
    let res = select(&s, None, &Value::I32(13), &Value::I32(13), true, true, false).unwrap();
    assert_eq!(oids(&res), vec![3]);
}

#[test]
fn test_slice_is_idempotent_and_view_equals_copy() {
    let b = Bat::from_vec(vec![10i32, 20, 30, 40, 50]);
    let once = slice(&b, 1, 4).unwrap();
    let twice = slice(&once, 0, once.count()).unwrap();
    assert_eq!(i32_values(&once), i32_values(&twice));
    assert_eq!(once.hseqbase(), twice.hseqbase());
    assert_eq!(once.props(), twice.props());

    // the zero-copy view reads the same rows as a freshly built column
    let fresh = Bat::from_vec(vec![20i32, 30, 40]);
    assert_eq!(i32_values(&once), i32_values(&fresh));
}

#[test]
fn test_string_slice_view_equals_copy() {
    let b = Bat::from_strs(vec![Some("ada"), None, Some("bob"), Some("cyd"), Some("ada")]);
    let view = slice(&b, 1, 4).unwrap();
    let fresh = Bat::from_strs(vec![None, Some("bob"), Some("cyd")]);
    for i in 0..3 {
        assert_eq!(view.str_at(i), fresh.str_at(i));
    }

    // the view shares the parent heap; no string is copied
    let (TailStorage::Str { heap: hv, .. }, TailStorage::Str { heap: hp, .. }) =
        (view.tail(), b.tail())
    else {
        panic!("string tails expected");
    };
    assert!(std::sync::Arc::ptr_eq(hv, hp));

    // re-slicing the full extent changes nothing
    let again = slice(&view, 0, view.count()).unwrap();
    for i in 0..3 {
        assert_eq!(again.str_at(i), view.str_at(i));
    }
    assert_eq!(again.hseqbase(), view.hseqbase());
    assert_eq!(again.props(), view.props());
}

#[test]
fn test_minmax_hints_short_circuit_selects() {
    let mut b = Bat::from_vec(vec![5i32, 3, 9, 7, 1]);
    b.set_hint_min(Some(Value::I32(1)));
    b.set_hint_max(Some(Value::I32(9)));

    // range entirely above the hinted max is ruled out without a scan
    let r = select(&b, None, &Value::I32(20), &Value::I32(30), true, true, false).unwrap();
    assert!(r.is_empty());

    // range covering [min, max] on a nil-free column rules every row in
    let r = select(&b, None, &Value::I32(0), &Value::I32(10), true, true, false).unwrap();
    assert_eq!(oids(&r), vec![0, 1, 2, 3, 4]);

    // mutation invalidates the hints; the new row becomes visible
    append(&mut b, &Bat::from_vec(vec![100i32]), false).unwrap();
    assert!(b.hints().min.is_none() && b.hints().max.is_none());
    let r = select(&b, None, &Value::I32(20), &Value::I32(30), true, true, false).unwrap();
    assert_eq!(oids(&r), vec![5]);
}

#[test]
fn test_two_column_sort_via_refinement() {
    // ORDER BY city, age over parallel columns
    let city = Bat::from_strs(vec![Some("oslo"), Some("bergen"), Some("oslo"), Some("bergen")]);
    let age = Bat::from_vec(vec![30i32, 25, 20, 35]);

    let first = subsort(&city, None, None, false, true).unwrap();
    let second = subsort(&age, Some(&first.order), Some(&first.groups), false, true).unwrap();

    let city_sorted = batcore::project(&second.order, &city).unwrap();
    let age_sorted = batcore::project(&second.order, &age).unwrap();
    let cities: Vec<_> = (0..4).map(|i| city_sorted.str_at(i).unwrap().unwrap()).collect();
    assert_eq!(cities, vec!["bergen", "bergen", "oslo", "oslo"]);
    assert_eq!(i32_values(&age_sorted), vec![25, 35, 20, 30]);
}

#[test]
fn test_sort_puts_nils_first() {
    let b = Bat::from_vec(vec![3i64, i64::NIL, 1, i64::NIL, 2]);
    let s = sort(&b).unwrap();
    let got = s.fixed_slice::<i64>().unwrap();
    assert_eq!(&got[..2], &[i64::NIL, i64::NIL]);
    assert_eq!(&got[2..], &[1, 2, 3]);
    assert!(s.props().sorted);
}

#[test]
fn test_range_join_over_selected_candidates() {
    let temp = Bat::from_vec(vec![12i32, 55, 23, 41, 8]);
    let lo = Bat::from_vec(vec![10i32, 40]);
    let hi = Bat::from_vec(vec![25i32, 60]);

    // restrict the left side first, the way a pipeline would
    let lcand = theta_select(&temp, None, &Value::I32(10), ">=").unwrap();
    let r = range_join(&temp, &lo, &hi, Some(&lcand), None, true, true).unwrap();
    let l: Vec<Oid> = r.left.fixed_slice::<Oid>().unwrap().to_vec();
    let rr: Vec<Oid> = r.right.fixed_slice::<Oid>().unwrap().to_vec();
    assert_eq!(l, vec![0, 2, 1, 3]);
    assert_eq!(rr, vec![0, 0, 1, 1]);
}

#[test]
fn test_string_pipeline_select_and_project() {
    let names = Bat::from_strs(vec![
        Some("ada"),
        Some("grace"),
        None,
        Some("alan"),
        Some("ada"),
    ]);
    let res = theta_select(&names, None, &Value::Str("ada".into()), "=").unwrap();
    assert_eq!(oids(&res), vec![0, 4]);

    let picked = batcore::project(&res.into_bat(), &names).unwrap();
    assert_eq!(picked.str_at(0), Some(Some("ada")));
    assert_eq!(picked.str_at(1), Some(Some("ada")));

    // projection shares the source heap instead of copying strings
    let (TailStorage::Str { heap: nh, .. }, TailStorage::Str { heap: ph, .. }) =
        (names.tail(), picked.tail())
    else {
        panic!("expected string tails");
    };
    assert!(std::sync::Arc::ptr_eq(nh, ph));
}

#[test]
fn test_readonly_columns_reject_mutation_unless_forced() {
    let mut b = Bat::from_vec(vec![1i32, 2]);
    b.set_access(batcore::Access::ReadOnly);
    let src = Bat::from_vec(vec![3i32]);
    assert!(append(&mut b, &src, false).is_err());
    append(&mut b, &src, true).unwrap();
    assert_eq!(b.count(), 3);
}

#[test]
fn test_key_constraint_rejects_duplicate_append() {
    let mut b = Bat::from_vec(vec![1i64, 2, 3]);
    b.set_key_constraint(true);
    assert!(append(&mut b, &Bat::from_vec(vec![2i64]), false).is_err());
    append(&mut b, &Bat::from_vec(vec![4i64]), false).unwrap();
    assert_eq!(b.count(), 4);
}

#[test]
fn test_float_range_with_open_bounds() {
    let b = Bat::from_vec(vec![1.0f64, 1.5, 2.0, f64::NAN, 2.5]);
    // (1.0, 2.5): exclusive on both sides, nil (NaN) never qualifies
    let res = select(
        &b,
        None,
        &Value::F64(1.0),
        &Value::F64(2.5),
        false,
        false,
        false,
    )
    .unwrap();
    assert_eq!(oids(&res), vec![1, 2]);
}
