// Property-based tests for the buffer pool
//
// Random sequences of take/release/compact against a recording protocol,
// checking the leasing invariants after every step.

mod common;

use std::collections::HashSet;

use proptest::prelude::*;

use common::{RecordingProtocol, Request};
use lumen::protocol::BufferId;
use lumen::{BufferPool, Size};

#[derive(Debug, Clone)]
enum Op {
    Take(usize),
    Release(usize),
    ReleaseAll,
    Compact,
}

const SIZES: [Size; 3] = [
    Size {
        width: 16,
        height: 8,
    },
    Size {
        width: 32,
        height: 8,
    },
    Size {
        width: 16,
        height: 16,
    },
];

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..SIZES.len()).prop_map(Op::Take),
        3 => any::<usize>().prop_map(Op::Release),
        1 => Just(Op::ReleaseAll),
        1 => Just(Op::Compact),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pool_never_leases_twice(ops in prop::collection::vec(op(), 1..40), max_free in 0usize..4) {
        let protocol = RecordingProtocol::new();
        let mut pool = BufferPool::new(max_free);
        prop_assert_eq!(pool.max_free(), max_free.max(1));
        // Buffers handed out and not yet released by the "compositor"
        let mut leased: Vec<BufferId> = Vec::new();

        for op in ops {
            match op {
                Op::Take(i) => {
                    let size = SIZES[i];
                    let buffer = pool.take(protocol.as_ref(), size).unwrap();
                    let id = buffer.id();

                    prop_assert_eq!(buffer.size(), size);
                    prop_assert!(!buffer.is_free());
                    prop_assert!(!leased.contains(&id), "{:?} leased twice", id);
                    leased.push(id);

                    // No pooled buffer of a stale size survives
                    prop_assert!(pool.buffers().all(|b| b.size() == size));
                    prop_assert!(pool.free_count() <= pool.max_free());
                }
                Op::Release(i) => {
                    if !leased.is_empty() {
                        let id = leased.remove(i % leased.len());
                        protocol.release(id);
                    }
                }
                Op::ReleaseAll => {
                    for id in leased.drain(..) {
                        protocol.release(id);
                    }
                }
                Op::Compact => {
                    pool.compact(protocol.as_ref());
                    prop_assert!(pool.free_count() <= pool.max_free());
                }
            }
        }

        // Every pooled buffer was created and not destroyed
        let requests = protocol.requests();
        let destroyed: HashSet<BufferId> = requests
            .iter()
            .filter_map(|r| match r {
                Request::DestroyBuffer(id) => Some(*id),
                _ => None,
            })
            .collect();
        for buffer in pool.buffers() {
            prop_assert!(!destroyed.contains(&buffer.id()));
        }

        pool.destroy_all(protocol.as_ref());
        prop_assert!(pool.is_empty());
        let created = protocol.count(|r| matches!(r, Request::CreateBuffer(..)));
        let destroyed = protocol.count(|r| matches!(r, Request::DestroyBuffer(..)));
        prop_assert_eq!(created, destroyed);
    }
}
