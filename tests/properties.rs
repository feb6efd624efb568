//! Property tests: random operation sequences preserve the container's
//! observable invariants and agree with a simple model.

use proptest::prelude::*;

use nexus_hive::{Hive, Limits};

#[derive(Debug, Clone)]
enum Op {
    Insert(u16),
    EraseNth(usize),
    Fill(u8, u16),
    Reserve(u16),
    Clear,
    Trim,
    Shrink,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => any::<u16>().prop_map(Op::Insert),
        6 => any::<usize>().prop_map(Op::EraseNth),
        2 => (any::<u8>(), any::<u16>()).prop_map(|(n, v)| Op::Fill(n % 40, v)),
        1 => any::<u16>().prop_map(|n| Op::Reserve(n % 512)),
        1 => Just(Op::Clear),
        1 => Just(Op::Trim),
        1 => Just(Op::Shrink),
    ]
}

fn check<S: nexus_hive::SkipIndex>(h: &Hive<u16, S>, model: &mut Vec<u16>) {
    assert_eq!(h.len(), model.len());
    assert_eq!(h.is_empty(), model.is_empty());
    assert!(h.capacity() >= h.len());
    assert_eq!(h.iter().count(), h.len());

    let mut got: Vec<u16> = h.iter().copied().collect();
    let mut rev: Vec<u16> = h.iter().rev().copied().collect();
    rev.reverse();
    assert_eq!(got, rev, "reverse iteration is the mirror of forward");

    got.sort_unstable();
    model.sort_unstable();
    assert_eq!(&got, model, "hive holds exactly the model's multiset");

    unsafe {
        assert_eq!(
            h.begin_cursor().distance(&h.end_cursor()),
            h.len() as isize
        );
        if !h.is_empty() {
            assert_eq!(h.begin_cursor().next(h.len()), h.end_cursor());
            assert_eq!(h.end_cursor().prev(h.len()), h.begin_cursor());
        }
    }
}

fn run_ops<S: nexus_hive::SkipIndex>(limits: Limits, ops: &[Op]) {
    let mut h: Hive<u16, S> = Hive::with_limits(limits);
    let mut model: Vec<u16> = Vec::new();

    for op in ops {
        match op {
            Op::Insert(v) => {
                h.insert(*v);
                model.push(*v);
            }
            Op::EraseNth(raw) => {
                if !model.is_empty() {
                    let nth = raw % h.len();
                    let cursor = unsafe { h.begin_cursor().next(nth) };
                    let value = unsafe { *h.get(cursor) };
                    unsafe {
                        h.erase(cursor);
                    }
                    let pos = model.iter().position(|&v| v == value).unwrap();
                    model.swap_remove(pos);
                }
            }
            Op::Fill(n, v) => {
                h.insert_fill(*n as usize, *v);
                model.extend(std::iter::repeat(*v).take(*n as usize));
            }
            Op::Reserve(n) => {
                h.reserve(*n as usize);
            }
            Op::Clear => {
                h.clear();
                model.clear();
            }
            Op::Trim => {
                h.trim();
            }
            Op::Shrink => {
                h.shrink_to_fit();
            }
        }
        check(&h, &mut model);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_ops_u16_index(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        run_ops::<u16>(Limits::new(4, 16), &ops);
    }

    #[test]
    fn random_ops_u8_index(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        run_ops::<u8>(Limits::new(3, 9), &ops);
    }

    #[test]
    fn advance_and_distance_agree(
        len in 0..60usize,
        holes in proptest::collection::vec(any::<usize>(), 0..30),
    ) {
        let mut h: Hive<usize> = Hive::with_limits(Limits::new(4, 8));
        for i in 0..len {
            h.insert(i);
        }
        for raw in holes {
            if h.is_empty() {
                break;
            }
            let nth = raw % h.len();
            unsafe {
                h.erase(h.begin_cursor().next(nth));
            }
        }

        let n = h.len();
        unsafe {
            for i in 0..=n {
                let it = h.begin_cursor().next(i);
                prop_assert_eq!(h.begin_cursor().distance(&it), i as isize);
                prop_assert_eq!(it.distance(&h.end_cursor()), (n - i) as isize);
                prop_assert_eq!(it.prev(i), h.begin_cursor());
                prop_assert_eq!(it.next(n - i), h.end_cursor());
            }
        }
    }

    #[test]
    fn splice_is_concatenation_of_multisets(
        a in proptest::collection::vec(any::<u16>(), 0..40),
        b in proptest::collection::vec(any::<u16>(), 0..40),
    ) {
        let mut h1: Hive<u16> = Hive::with_limits(Limits::new(4, 8));
        let mut h2: Hive<u16> = Hive::with_limits(Limits::new(4, 8));
        h1.extend(a.iter().copied());
        h2.extend(b.iter().copied());

        h1.splice(&mut h2).unwrap();
        prop_assert!(h2.is_empty());
        prop_assert_eq!(h1.len(), a.len() + b.len());

        let mut got: Vec<u16> = h1.iter().copied().collect();
        let mut expected = a;
        expected.extend(b);
        got.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(got, expected);
    }
}
