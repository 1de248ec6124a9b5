//! Randomized sequences of append/pop against `InputQueue`, checking the
//! invariants of spec.md §8 hold no matter the interleaving: bounded size
//! and the sticky round-trip law.

use std::num::NonZeroUsize;

use flowgraph::queue::InputQueue;
use flowgraph::record::RecordBox;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn randomized_append_pop_never_exceeds_capacity_plus_pending_sync() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    for trial in 0..200 {
        let capacity = NonZeroUsize::new(1 + (trial % 5)).unwrap();
        let sticky = trial % 2 == 0;
        let queue = InputQueue::new(capacity, sticky);
        let mut value = 0i32;

        for _ in 0..500 {
            if rng.random_bool(0.6) {
                let sync = rng.random_bool(0.2);
                queue.append(RecordBox::new(value), sync);
                value += 1;
            } else {
                queue.pop();
            }
            assert!(
                queue.len() <= capacity.get() + queue.pending_sync(),
                "size invariant violated: len={} capacity={} pending_sync={}",
                queue.len(),
                capacity.get(),
                queue.pending_sync()
            );
        }
    }
}

#[test]
fn sticky_queue_round_trip_law_holds_under_random_single_item_runs() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    for _ in 0..100 {
        let queue = InputQueue::new(NonZeroUsize::new(1).unwrap(), true);
        let value = rng.random::<i32>();
        queue.append(RecordBox::new(value), false);

        let rereads = 1 + rng.random_range(0..5);
        for _ in 0..rereads {
            let popped = queue.pop().expect("sticky queue retains its last item");
            assert_eq!(popped.downcast_ref::<i32>(), Some(&value));
        }
        assert!(!queue.is_empty(), "sticky queue must not empty out on its own");
    }
}
