//! Byte fidelity of the range allocator under randomized load

use proptest::prelude::*;
use segheap::stress::{StressConfig, StressRun, TestHeap};

#[derive(Debug, Clone)]
enum HeapOp {
    Alloc {
        size: usize,
        movable: bool,
        allow_defrag: bool,
    },
    Realloc {
        pick: usize,
        size: usize,
        movable: bool,
        allow_defrag: bool,
    },
    Free(usize),
    Lock(usize),
    Unlock(usize),
    Defrag,
}

fn heap_op() -> impl Strategy<Value = HeapOp> {
    prop_oneof![
        5 => (1usize..200, any::<bool>(), any::<bool>()).prop_map(|(size, movable, allow_defrag)| {
            HeapOp::Alloc { size, movable, allow_defrag }
        }),
        2 => (any::<usize>(), 1usize..300, any::<bool>(), any::<bool>()).prop_map(
            |(pick, size, movable, allow_defrag)| HeapOp::Realloc { pick, size, movable, allow_defrag }
        ),
        3 => any::<usize>().prop_map(HeapOp::Free),
        1 => any::<usize>().prop_map(HeapOp::Lock),
        1 => any::<usize>().prop_map(HeapOp::Unlock),
        1 => Just(HeapOp::Defrag),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every live allocation keeps its bytes through any operation sequence
    #[test]
    fn bytes_survive_any_sequence(ops in prop::collection::vec(heap_op(), 1..300)) {
        let mut heap = TestHeap::with_limit(512, 4096);
        let mut live: Vec<u32> = Vec::new();

        for op in ops {
            match op {
                HeapOp::Alloc { size, movable, allow_defrag } => {
                    if let Some(id) = heap.alloc(size, movable, allow_defrag) {
                        let allocation = heap.allocation(id).unwrap();
                        prop_assert_eq!(allocation.size, size);
                        prop_assert_eq!(allocation.movable, movable);
                        live.push(id);
                    }
                }
                HeapOp::Realloc { pick, size, movable, allow_defrag } if !live.is_empty() => {
                    let id = live[pick % live.len()];
                    let before = heap.allocation(id).unwrap().clone();
                    if heap.realloc(id, size, movable, allow_defrag) {
                        let range = heap.allocator().allocations()
                            .find(|(_, range)| *range.owner() == id)
                            .map(|(_, range)| range.clone())
                            .unwrap();
                        prop_assert_eq!(range.size(), size);
                        prop_assert_eq!(range.movable(), movable);
                        prop_assert_eq!(range.allow_defrag(), allow_defrag);
                        if before.locked {
                            prop_assert_eq!(range.position(), before.position);
                        }
                    } else {
                        prop_assert_eq!(heap.allocation(id).unwrap(), &before);
                    }
                }
                HeapOp::Free(pick) if !live.is_empty() => {
                    let id = live.swap_remove(pick % live.len());
                    prop_assert!(heap.free(id));
                }
                HeapOp::Lock(pick) if !live.is_empty() => {
                    let id = live[pick % live.len()];
                    prop_assert!(heap.lock(id));
                }
                HeapOp::Unlock(pick) if !live.is_empty() => {
                    let id = live[pick % live.len()];
                    heap.unlock(id);
                }
                HeapOp::Defrag => {
                    let pinned: Vec<(u32, usize)> = live
                        .iter()
                        .filter_map(|&id| heap.allocation(id))
                        .filter(|a| a.locked || !a.movable)
                        .map(|a| (a.id, a.position))
                        .collect();
                    heap.defrag();
                    for (id, position) in pinned {
                        prop_assert_eq!(heap.allocation(id).unwrap().position, position);
                    }
                }
                _ => {}
            }

            if let Err(e) = heap.verify_all() {
                return Err(TestCaseError::fail(e.to_string()));
            }
        }
    }
}

#[test]
fn test_seeded_run_stays_clean() {
    let mut run = StressRun::new(StressConfig {
        seed: 0,
        operations: 20_000,
        verify_every: 500,
        ..StressConfig::default()
    })
    .unwrap();
    let stats = run.run().unwrap();

    assert_eq!(run.steps(), 20_000);
    assert!(stats.defrags > 0);
    assert!(stats.reallocs > 0);
    assert!(stats.locks > 0);
    assert!(run.heap().address_space_size() <= 0x10000);
}

#[test]
fn test_many_seeds_short_runs() {
    for seed in 0..16 {
        let mut run = StressRun::new(StressConfig {
            seed,
            operations: 3000,
            initial_size: 2048,
            ramp: 1000,
            verify_every: 50,
            ..StressConfig::default()
        })
        .unwrap();
        if let Err(e) = run.run() {
            panic!("seed {} corrupted the heap at step {}: {}", seed, run.steps(), e);
        }
    }
}
