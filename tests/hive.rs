//! End-to-end behavior tests against the public surface.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

use nexus_hive::{Hive, Limits};

/// The observable invariants every operation must preserve.
fn check_invariants<T, S: nexus_hive::SkipIndex>(h: &Hive<T, S>) {
    assert_eq!(h.is_empty(), h.len() == 0);
    assert_eq!(h.len() == 0, h.begin_cursor() == h.end_cursor());
    assert!(h.max_len() >= h.capacity());
    assert!(h.capacity() >= h.len());
    assert_eq!(h.iter().count(), h.len());
    assert_eq!(h.iter().rev().count(), h.len());
    unsafe {
        let begin = h.begin_cursor();
        let end = h.end_cursor();
        assert_eq!(begin.distance(&end), h.len() as isize);
        assert_eq!(end.distance(&begin), -(h.len() as isize));
        if h.len() != 0 {
            assert_eq!(begin.next(h.len()), end);
            assert_eq!(end.prev(h.len()), begin);
        }
    }
}

#[test]
fn single_insert() {
    let mut h: Hive<i32> = Hive::new();
    h.insert(42);
    assert_eq!(h.len(), 1);
    assert_eq!(h.iter().next(), Some(&42));
    unsafe {
        assert_eq!(h.begin_cursor().next(1), h.end_cursor());
    }
    check_invariants(&h);
}

#[test]
fn erase_two_insert_one() {
    let mut h: Hive<i32> = [1, 2, 3, 4, 5].into_iter().collect();
    unsafe {
        h.erase(h.begin_cursor());
        h.erase(h.begin_cursor());
    }
    h.insert(6);
    assert_eq!(h.len(), 4);

    let mut values: Vec<i32> = h.iter().copied().collect();
    values.sort_unstable();
    assert_eq!(values, vec![3, 4, 5, 6]);
    check_invariants(&h);

    // Positions reachable from begin are pairwise distinct.
    unsafe {
        let positions: Vec<_> = (0..4).map(|i| h.begin_cursor().next(i)).collect();
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(positions[i] == positions[j], i == j);
            }
        }
    }
}

#[test]
fn advance_distance_laws_on_fixed_blocks() {
    for n in 0..15usize {
        let mut h: Hive<char> = Hive::with_limits(Limits::new(4, 4));
        h.insert_fill(n, 'x');
        assert_eq!(h.len(), n);
        check_invariants(&h);

        unsafe {
            for i in 0..=n {
                let it = h.begin_cursor().next(i);
                for j in 0..=(n - i) {
                    let jt = it.next(j);
                    assert_eq!(it.distance(&jt), j as isize);
                    assert_eq!(jt.distance(&it), -(j as isize));
                    assert_eq!(jt.prev(j), it);
                }
                // Symmetrically from the end.
                let rt = h.end_cursor().prev(i);
                assert_eq!(rt.distance(&h.end_cursor()), i as isize);
                assert_eq!(rt.next(i), h.end_cursor());
            }
        }
    }
}

#[test]
fn half_million_churn() {
    let mut h: Hive<u64> = Hive::new();
    for i in 0..500_000u64 {
        h.insert(i);
    }
    assert_eq!(h.len(), 500_000);

    // Erase every other element by stepping past each survivor.
    unsafe {
        let mut cur = h.begin_cursor();
        while cur != h.end_cursor() {
            cur = h.erase(cur);
            if cur == h.end_cursor() {
                break;
            }
            cur = cur.next(1);
        }
    }
    assert_eq!(h.len(), 250_000);

    let expected: u64 = (0..500_000u64).filter(|v| v % 2 == 1).sum();
    let total: u64 = h.iter().sum();
    assert_eq!(total, expected);
    check_invariants(&h);
}

#[test]
fn splice_two_hives() {
    let mut h1: Hive<i32> = (1..=10).collect();
    let mut h2: Hive<i32> = (11..=20).collect();
    h1.splice(&mut h2).unwrap();

    assert!(h2.is_empty());
    assert_eq!(h1.len(), 20);
    let mut values: Vec<i32> = h1.iter().copied().collect();
    values.sort_unstable();
    assert_eq!(values, (1..=20).collect::<Vec<_>>());
    check_invariants(&h1);
    check_invariants(&h2);
}

#[derive(Debug)]
struct Brittle {
    #[allow(dead_code)]
    value: i32,
    budget: Arc<AtomicIsize>,
}

impl Clone for Brittle {
    fn clone(&self) -> Self {
        if self.budget.fetch_sub(1, Ordering::SeqCst) <= 0 {
            panic!("construction failed");
        }
        Brittle { value: self.value, budget: self.budget.clone() }
    }
}

#[test]
fn failed_assign_leaves_empty() {
    let budget = Arc::new(AtomicIsize::new(isize::MAX));
    let mut h: Hive<Brittle> = Hive::new();
    for i in 0..4 {
        h.insert(Brittle { value: i, budget: budget.clone() });
    }

    // The third construction of the incoming range fails.
    budget.store(2, Ordering::SeqCst);
    let template: Vec<Brittle> =
        (0..5).map(|i| Brittle { value: i, budget: budget.clone() }).collect();
    let result = catch_unwind(AssertUnwindSafe(|| {
        h.assign_iter(template.iter().cloned());
    }));
    assert!(result.is_err());
    assert_eq!(h.len(), 0);
    check_invariants(&h);
}

// -----------------------------------------------------------------------------
// Behaviors carried over from long-lived usage patterns
// -----------------------------------------------------------------------------

#[test]
fn insert_erase_refill_cycles() {
    let mut h: Hive<u32> = Hive::with_limits(Limits::new(4, 32));
    for round in 0..10u32 {
        for i in 0..200 {
            h.insert(round * 1000 + i);
        }
        check_invariants(&h);

        // Erase a scattered two-thirds.
        unsafe {
            let mut cur = h.begin_cursor();
            let mut k = 0u32;
            while cur != h.end_cursor() {
                if k % 3 != 0 {
                    cur = h.erase(cur);
                } else {
                    cur = cur.next(1);
                }
                k += 1;
            }
        }
        check_invariants(&h);
    }
    assert!(h.len() > 0);
}

#[test]
fn iteration_matches_multiset_after_random_churn() {
    // Deterministic pseudo-random churn (prime multiplier).
    let mut h: Hive<usize> = Hive::with_limits(Limits::new(8, 64));
    let mut expected: Vec<usize> = Vec::new();

    for i in 0..1000 {
        h.insert(i);
        expected.push(i);
    }
    for step in 0..500 {
        let target = (step * 7919) % expected.len();
        let value = expected.swap_remove(target);
        let elem_cursor = {
            let elem = h.iter().find(|&&v| v == value).unwrap();
            h.cursor_of(elem).unwrap()
        };
        unsafe {
            h.erase(elem_cursor);
        }
    }
    assert_eq!(h.len(), 500);

    let mut got: Vec<usize> = h.iter().copied().collect();
    got.sort_unstable();
    expected.sort_unstable();
    assert_eq!(got, expected);
    check_invariants(&h);
}

#[test]
fn reserve_then_trim_restores_capacity() {
    let mut h: Hive<u32> = Hive::with_limits(Limits::new(10, 10));
    for i in 0..100 {
        h.insert(i);
    }
    // Punch holes so blocks stay live but partially filled.
    unsafe {
        let mut cur = h.begin_cursor();
        let mut k = 0;
        while cur != h.end_cursor() {
            if k % 3 == 0 {
                cur = h.erase(cur);
            } else {
                cur = cur.next(1);
            }
            k += 1;
        }
    }
    let old_capacity = h.capacity();
    h.reserve(old_capacity + 100);
    assert!(h.capacity() >= old_capacity + 100);
    h.trim();
    assert!(h.capacity() <= old_capacity, "trim never touches live blocks");
    check_invariants(&h);
}

#[test]
fn retain_even_values() {
    let mut h: Hive<u32> = (0..1000).collect();
    h.retain(|&v| v % 2 == 0);
    assert_eq!(h.len(), 500);
    assert!(h.iter().all(|&v| v % 2 == 0));
    check_invariants(&h);
}

#[test]
fn reverse_iteration_after_churn() {
    let mut h: Hive<u32> = Hive::with_limits(Limits::new(4, 4));
    for i in 0..50 {
        h.insert(i);
    }
    unsafe {
        let mut cur = h.begin_cursor();
        let mut k = 0;
        while cur != h.end_cursor() {
            if k % 2 == 1 {
                cur = h.erase(cur);
            } else {
                cur = cur.next(1);
            }
            k += 1;
        }
    }
    let forward: Vec<u32> = h.iter().copied().collect();
    let mut backward: Vec<u32> = h.iter().rev().copied().collect();
    backward.reverse();
    assert_eq!(forward, backward);
    check_invariants(&h);
}

#[test]
fn clone_equality_and_independence() {
    let mut h: Hive<String> = (0..100).map(|i| i.to_string()).collect();
    unsafe {
        let c = h.begin_cursor().next(37);
        h.erase(c);
    }
    let mut copy = h.clone();
    assert_eq!(h, copy);

    copy.insert("extra".to_string());
    assert_ne!(h, copy);
    check_invariants(&h);
    check_invariants(&copy);
}

#[test]
fn reshape_preserves_contents() {
    let mut h: Hive<u32> = Hive::with_limits(Limits::new(4, 4));
    for i in 0..40 {
        h.insert(i);
    }
    let before: Vec<u32> = h.iter().copied().collect();
    h.reshape(Limits::new(16, 64)).unwrap();
    assert_eq!(h.iter().copied().collect::<Vec<_>>(), before);
    assert_eq!(h.limits(), Limits::new(16, 64));
    check_invariants(&h);
}

#[test]
fn cursor_ordering_follows_iteration() {
    let mut h: Hive<u32> = Hive::with_limits(Limits::new(4, 4));
    for i in 0..30 {
        h.insert(i);
    }
    unsafe {
        let mut prev = h.begin_cursor();
        let mut cur = prev.next(1);
        while cur != h.end_cursor() {
            assert!(prev.precedes(&cur));
            assert!(!cur.precedes(&prev));
            prev = cur;
            cur = cur.next(1);
        }
    }
}

#[test]
fn bulk_fill_equals_repeated_insert() {
    let mut a: Hive<u8> = Hive::with_limits(Limits::new(4, 16));
    let mut b: Hive<u8> = Hive::with_limits(Limits::new(4, 16));
    a.insert_fill(100, 7);
    for _ in 0..100 {
        b.insert(7);
    }
    assert_eq!(a.len(), b.len());
    assert_eq!(a, b);
    check_invariants(&a);
    check_invariants(&b);
}

#[test]
fn empty_operations_are_noops() {
    let mut h: Hive<u32> = Hive::new();
    h.clear();
    h.trim();
    h.retain(|_| true);
    h.insert_fill(0, 1);
    assert!(h.is_empty());
    assert_eq!(h.capacity(), 0);
    check_invariants(&h);
}
